use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crosswind_core::prelude::{format_scenario_error, ResultRecord, ScenarioError, TaskContext};
use crosswind_instruments::prelude::Timer;

use crate::catalog::ScenarioRef;
use crate::context::ScenarioContext;
use crate::selector::ContextSelector;
use crate::types::{ScenarioArgs, ScenarioResult};

/// Everything needed to run one iteration, owned so that it can be moved onto a worker.
#[derive(Debug, Clone)]
pub struct Iteration {
    /// Position of the iteration in the run, counting from 0.
    pub index: usize,
    pub task_uuid: Arc<str>,
    pub scenario: ScenarioRef,
    pub context: TaskContext,
    pub args: ScenarioArgs,
}

/// Run a single scenario iteration and turn its outcome into a result record.
///
/// Scenario failures, including panics, are captured in the record and never returned.
pub fn invoke(iteration: Iteration) -> ResultRecord {
    let Iteration {
        index,
        task_uuid,
        scenario,
        context,
        args,
    } = iteration;
    let n = index + 1;

    log::info!("Task {task_uuid} | ITER: {n} START");

    let mut instance = ScenarioContext::new(index, task_uuid.clone(), context);
    let timer = Timer::start();
    let outcome: ScenarioResult = match scenario.method() {
        Some(method) => panic::catch_unwind(AssertUnwindSafe(|| method(&mut instance, &args)))
            .unwrap_or_else(|payload| {
                Err(ScenarioError::new("Panic", panic_message(payload.as_ref())).into())
            }),
        None => Err(ScenarioError::new(
            "NoSuchScenario",
            format!("Scenario {} does not exist", scenario.full_name()),
        )
        .into()),
    };
    let wall = timer.elapsed();

    let (idle, atomic_actions) = instance.finish();
    let mut record = ResultRecord {
        duration: wall.saturating_sub(idle).as_secs_f64(),
        idle_duration: idle.as_secs_f64(),
        atomic_actions,
        ..Default::default()
    };

    match outcome {
        Ok(output) => {
            record.scenario_output = output.unwrap_or_default();
            log::info!("Task {task_uuid} | ITER: {n} END: OK");
        }
        Err(e) => {
            record.error = format_scenario_error(&e);
            log::info!(
                "Task {task_uuid} | ITER: {n} END: Error {}: {}",
                record.error[0],
                record.error[1]
            );
            log::debug!("Task {task_uuid} | ITER: {n} {}", record.error[2]);
        }
    }

    record
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Scenario panicked".to_string()
    }
}

/// Produces the iterations of a run. Clones share the iteration counter, so iterations taken from
/// different workers are numbered without gaps or repeats.
#[derive(Clone)]
pub struct IterationSource {
    task_uuid: Arc<str>,
    scenario: ScenarioRef,
    context: TaskContext,
    args: ScenarioArgs,
    selector: ContextSelector,
    counter: Arc<AtomicUsize>,
}

impl IterationSource {
    pub fn new(
        task_uuid: Arc<str>,
        scenario: ScenarioRef,
        context: TaskContext,
        args: ScenarioArgs,
        selector: ContextSelector,
    ) -> Self {
        Self {
            task_uuid,
            scenario,
            context,
            args,
            selector,
            counter: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn scenario(&self) -> &ScenarioRef {
        &self.scenario
    }

    pub fn context(&self) -> &TaskContext {
        &self.context
    }

    /// Build iteration `index` without moving the counter.
    pub fn iteration(&self, index: usize) -> Iteration {
        Iteration {
            index,
            task_uuid: self.task_uuid.clone(),
            scenario: self.scenario.clone(),
            context: self.selector.derive(&self.context, index),
            args: self.args.clone(),
        }
    }

    pub fn next_iteration(&self) -> Iteration {
        let index = self.counter.fetch_add(1, Ordering::Relaxed);
        self.iteration(index)
    }

    /// How many iterations have been taken with [IterationSource::next_iteration].
    pub fn dispatched(&self) -> usize {
        self.counter.load(Ordering::Relaxed)
    }
}

impl Debug for IterationSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IterationSource")
            .field("task_uuid", &self.task_uuid)
            .field("scenario", &self.scenario.full_name())
            .field("selector", &self.selector)
            .field("dispatched", &self.dispatched())
            .finish()
    }
}
