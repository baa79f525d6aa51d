use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crosswind_core::prelude::{
    merge_config, AbortHandle, AbortListener, ResultQueue, ResultRecord, RunnerError, TaskContext,
};
use crosswind_instruments::prelude::Timer;
use crosswind_summary_model::RunSummary;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::catalog::ScenarioCatalog;
use crate::clock::{Clock, SystemClock};
use crate::invoker::IterationSource;
use crate::selector::ContextSelector;
use crate::strategy::RunnerStrategy;
use crate::types::ScenarioArgs;

/// The task a runner belongs to. Carries the task uuid used in logs and the scenarios the task can
/// run.
#[derive(Debug, Clone)]
pub struct Task {
    uuid: Arc<str>,
    catalog: Arc<ScenarioCatalog>,
}

impl Task {
    pub fn new(catalog: Arc<ScenarioCatalog>) -> Self {
        Self::with_uuid(&nanoid::nanoid!(), catalog)
    }

    pub fn with_uuid(uuid: &str, catalog: Arc<ScenarioCatalog>) -> Self {
        Self {
            uuid: Arc::from(uuid),
            catalog,
        }
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn catalog(&self) -> &Arc<ScenarioCatalog> {
        &self.catalog
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Created,
    Running,
    Completed,
    Aborted,
}

/// Runs one scenario under a runner strategy and collects the results.
///
/// A runner is used for a single run. It can be shared across threads, so that another thread can
/// call [ScenarioRunner::abort] or [ScenarioRunner::drain_results] while [ScenarioRunner::run] is
/// in progress.
#[derive(Debug)]
pub struct ScenarioRunner {
    task: Task,
    config: Value,
    strategy: Box<dyn RunnerStrategy>,
    abort_handle: AbortHandle,
    results: ResultQueue,
    clock: Arc<dyn Clock>,
    state: Mutex<RunState>,
    run_duration: Mutex<Option<Duration>>,
    started_at: Mutex<Option<DateTime<Utc>>>,
}

impl ScenarioRunner {
    pub fn new(task: Task, strategy: Box<dyn RunnerStrategy>, config: Value) -> Self {
        Self {
            task,
            config,
            strategy,
            abort_handle: AbortHandle::new(),
            results: ResultQueue::new(),
            clock: Arc::new(SystemClock),
            state: Mutex::new(RunState::Created),
            run_duration: Mutex::new(None),
            started_at: Mutex::new(None),
        }
    }

    /// Replace the clock that pacing strategies sleep and measure time with.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn execution_type(&self) -> &'static str {
        self.strategy.execution_type()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    /// Wall clock duration of the run, once it has finished.
    pub fn run_duration(&self) -> Option<Duration> {
        *self.run_duration.lock()
    }

    /// Stop starting new iterations. Iterations already running are left to finish and their results
    /// are still returned.
    pub fn abort(&self) {
        self.abort_handle.abort();
    }

    pub fn is_aborted(&self) -> bool {
        self.abort_handle.is_aborted()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    pub fn abort_listener(&self) -> AbortListener {
        self.abort_handle.new_listener()
    }

    /// Check a result and queue it for the caller.
    pub fn send_result(&self, record: ResultRecord) -> Result<(), RunnerError> {
        record.validate()?;
        self.results.push(record);
        Ok(())
    }

    /// Take the results queued so far. Results taken here are not returned by
    /// [ScenarioRunner::run].
    pub fn drain_results(&self) -> Vec<ResultRecord> {
        self.results.drain()
    }

    /// A handle to the result queue, for consuming results from another thread during a run.
    pub fn results(&self) -> ResultQueue {
        self.results.clone()
    }

    /// Run the scenario `scenario_name`, given as `<Family>.<method>`, and return every result that
    /// was not drained during the run.
    ///
    /// The context must contain `admin`. The scenario family's default context is merged under the
    /// context's `config`.
    pub fn run(
        &self,
        scenario_name: &str,
        context: TaskContext,
        args: ScenarioArgs,
    ) -> Result<Vec<ResultRecord>, RunnerError> {
        {
            let mut state = self.state.lock();
            if *state != RunState::Created {
                return Err(RunnerError::AlreadyRun);
            }
            *state = RunState::Running;
        }

        let outcome = self.run_scenario(scenario_name, context, args);

        *self.state.lock() = if self.is_aborted() {
            RunState::Aborted
        } else {
            RunState::Completed
        };

        outcome
    }

    fn run_scenario(
        &self,
        scenario_name: &str,
        mut context: TaskContext,
        args: ScenarioArgs,
    ) -> Result<Vec<ResultRecord>, RunnerError> {
        let scenario = self
            .task
            .catalog()
            .resolve(scenario_name)
            .ok_or_else(|| RunnerError::NoSuchScenario {
                name: scenario_name.to_string(),
            })?;

        if context.admin().is_none() {
            return Err(RunnerError::InvalidContext {
                reason: "the context has no 'admin' entry".to_string(),
            });
        }

        let defaults = Value::Object(scenario.family().default_context().clone());
        let config = match context.config() {
            Some(overlay) => merge_config(defaults, overlay),
            None => defaults,
        };
        context.insert("config", config);
        context.insert("task", json!({"uuid": self.task.uuid()}));
        context.insert("scenario_name", json!(scenario_name));

        let selector = ContextSelector::from_context(&context)?;

        log::info!(
            "Task {} | Starting {} runner for {scenario_name}",
            self.task.uuid(),
            self.execution_type()
        );
        log::debug!(
            "Task {} | Runner config: {}, args: {}, user choice: {:?}",
            self.task.uuid(),
            self.config,
            Value::Object(args.clone()),
            selector.method()
        );

        let source = IterationSource::new(
            Arc::from(self.task.uuid()),
            scenario,
            context,
            args,
            selector,
        );

        *self.started_at.lock() = Some(Utc::now());
        let timer = Timer::start();
        let outcome = self.strategy.execute(self, source);
        let elapsed = timer.elapsed();
        *self.run_duration.lock() = Some(elapsed);

        log::info!(
            "Task {} | Runner finished in {:.3}s{}",
            self.task.uuid(),
            elapsed.as_secs_f64(),
            if self.is_aborted() { " (aborted)" } else { "" }
        );

        outcome?;

        let results = self.results.drain();
        for (index, record) in results.iter().enumerate() {
            record
                .validate()
                .map_err(|source| RunnerError::InvalidRunnerResult { index, source })?;
        }

        Ok(results)
    }

    /// Summarise a finished run of `scenario_name` with the given results.
    pub fn summarize(
        &self,
        scenario_name: &str,
        args: &ScenarioArgs,
        results: &[ResultRecord],
    ) -> RunSummary {
        let started_at = self.started_at.lock().unwrap_or_else(Utc::now);

        let mut summary = RunSummary::new(
            nanoid::nanoid!(),
            self.task.uuid().to_string(),
            scenario_name.to_string(),
            self.execution_type().to_string(),
            started_at.timestamp(),
            env!("CARGO_PKG_VERSION").to_string(),
        )
        .with_runner_config(self.config.clone())
        .with_scenario_args(Value::Object(args.clone()));
        summary.set_outcome(
            self.run_duration().unwrap_or_default().as_secs_f64(),
            results.len(),
            results.iter().filter(|r| r.is_error()).count(),
            self.state() == RunState::Aborted,
        );

        summary
    }
}
