use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crosswind_core::prelude::{
    AbortListener, ConfigSchema, PropertySchema, ResultRecord, RunnerError, SchemaError,
};
use parking_lot::{Condvar, Mutex};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use super::{default_timeout, parse_config, seconds, RunnerStrategy};
use crate::executor::Executor;
use crate::invoker::{invoke, IterationSource};
use crate::registry::RunnerPlugin;
use crate::runner::ScenarioRunner;

pub const EXECUTION_TYPE: &str = "rps";

/// How long the orchestrator waits on a worker before forwarding the results that arrived so far.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on a single wait inside a worker's pacing loop.
const STALL_WAIT: Duration = Duration::from_millis(1);

/// How often a worker waiting out its start stagger checks for an abort.
const STAGGER_STEP: Duration = Duration::from_millis(10);

pub const CONFIG_SCHEMA: ConfigSchema = ConfigSchema {
    properties: &[
        PropertySchema::string("type"),
        PropertySchema::integer("times")
            .minimum(1.0)
            .description("Total number of iterations to run"),
        PropertySchema::number("rps")
            .exclusive_minimum(0.0)
            .description("Iterations to start per second"),
        PropertySchema::number("timeout")
            .minimum(1.0)
            .description("Seconds to wait for a single iteration"),
        PropertySchema::integer("max_concurrency")
            .minimum(1.0)
            .description("Limit on iterations in flight across all workers"),
        PropertySchema::integer("max_cpu_count")
            .minimum(1.0)
            .description("Limit on the number of workers"),
    ],
    required: &["times", "rps"],
    additional_properties: false,
};

pub(crate) const PLUGIN: RunnerPlugin = RunnerPlugin {
    execution_type: EXECUTION_TYPE,
    config_schema: &CONFIG_SCHEMA,
    check: None,
    build,
};

fn build(config: &Value) -> Result<Box<dyn RunnerStrategy>, RunnerError> {
    Ok(Box::new(RpsRunner::from_config(config)?))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RpsConfig {
    #[serde(default, rename = "type")]
    pub execution_type: Option<String>,
    pub times: usize,
    pub rps: f64,
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub max_cpu_count: Option<usize>,
}

/// Starts iterations at a fixed rate, spreading the work over several pacing workers.
///
/// Each worker starts one thread per iteration and throttles itself to its share of the rate and
/// of the concurrency limit.
#[derive(Debug, Clone)]
pub struct RpsRunner {
    times: usize,
    rps: f64,
    timeout: Duration,
    max_concurrency: Option<usize>,
    max_cpu_count: Option<usize>,
}

impl RpsRunner {
    pub fn new(config: RpsConfig) -> Result<Self, RunnerError> {
        if !(config.rps.is_finite() && config.rps > 0.0) {
            return Err(SchemaError::NotAboveMinimum {
                path: "rps".to_string(),
                minimum: 0.0,
                actual: config.rps,
            }
            .into());
        }
        for (path, limit) in [
            ("max_concurrency", config.max_concurrency),
            ("max_cpu_count", config.max_cpu_count),
        ] {
            if limit == Some(0) {
                return Err(SchemaError::BelowMinimum {
                    path: path.to_string(),
                    minimum: 1.0,
                    actual: 0.0,
                }
                .into());
            }
        }

        Ok(Self {
            times: config.times,
            rps: config.rps,
            timeout: seconds("timeout", config.timeout)?,
            max_concurrency: config.max_concurrency,
            max_cpu_count: config.max_cpu_count,
        })
    }

    pub fn from_config(config: &Value) -> Result<Self, RunnerError> {
        Self::new(parse_config(config)?)
    }

    /// Split the run over workers, given how many CPUs are available.
    fn plan(&self, available_cpus: usize) -> Vec<WorkerPlan> {
        if self.times == 0 {
            return Vec::new();
        }

        let workers = [
            Some(self.times),
            Some(available_cpus.max(1)),
            self.max_cpu_count,
            self.max_concurrency,
        ]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(1);

        let rate = self.rps / workers as f64;
        (0..workers)
            .map(|index| WorkerPlan {
                index,
                times: fair_share(self.times, workers, index),
                rate,
                max_in_flight: self
                    .max_concurrency
                    .map_or(usize::MAX, |max| fair_share(max, workers, index).max(1)),
                stagger: Duration::try_from_secs_f64((1.0 / rate) * index as f64 / workers as f64)
                    .unwrap_or(Duration::MAX),
                timeout: self.timeout,
            })
            .collect()
    }
}

/// Share of `total` for worker `index` of `workers`, with the remainder going to the first workers.
fn fair_share(total: usize, workers: usize, index: usize) -> usize {
    total / workers + usize::from(index < total % workers)
}

impl RunnerStrategy for RpsRunner {
    fn execution_type(&self) -> &'static str {
        EXECUTION_TYPE
    }

    fn execute(&self, runner: &ScenarioRunner, source: IterationSource) -> Result<(), RunnerError> {
        let available_cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let plans = self.plan(available_cpus);
        if plans.is_empty() {
            return Ok(());
        }
        log::debug!(
            "Running {} iterations at {} rps over {} workers with timeout {:?}",
            self.times,
            self.rps,
            plans.len(),
            self.timeout
        );

        let executor = Executor::new()?;
        let mut workers = Vec::with_capacity(plans.len());
        let mut receivers = Vec::with_capacity(plans.len());
        for plan in plans {
            let (sender, receiver) = unbounded_channel();
            let source = source.clone();
            let abort = runner.abort_listener();
            workers.push((
                plan.index,
                executor.spawn_blocking(move || pace_worker(plan, source, abort, sender)),
            ));
            receivers.push(receiver);
        }

        let mut worker_failed = false;
        let outcome = executor.execute_in_place(async {
            for (index, handle) in workers.iter_mut() {
                loop {
                    match tokio::time::timeout(POLL_INTERVAL, &mut *handle).await {
                        Ok(Ok(())) => break,
                        Ok(Err(e)) => {
                            worker_failed = true;
                            log::error!("Pacing worker {index} failed: {e:?}");
                            break;
                        }
                        Err(_) => forward_results(runner, &mut receivers)?,
                    }
                }
                forward_results(runner, &mut receivers)?;
            }

            forward_results(runner, &mut receivers)
        });

        executor.shutdown(!worker_failed && outcome.is_ok());

        outcome
    }
}

fn forward_results(
    runner: &ScenarioRunner,
    receivers: &mut [UnboundedReceiver<ResultRecord>],
) -> Result<(), RunnerError> {
    for receiver in receivers.iter_mut() {
        while let Ok(record) = receiver.try_recv() {
            runner.send_result(record)?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct WorkerPlan {
    index: usize,
    times: usize,
    rate: f64,
    max_in_flight: usize,
    stagger: Duration,
    timeout: Duration,
}

/// The single result slot of one iteration. Whoever delivers first, the iteration itself or its
/// timeout, wins and later deliveries are dropped.
#[derive(Debug, Default)]
struct TaskSlot {
    delivered: Mutex<bool>,
    done: Condvar,
}

impl TaskSlot {
    fn deliver(&self, record: ResultRecord, results: &UnboundedSender<ResultRecord>) -> bool {
        let mut delivered = self.delivered.lock();
        if *delivered {
            return false;
        }
        *delivered = true;
        if results.send(record).is_err() {
            log::warn!("Result arrived after the run finished collecting results");
        }
        self.done.notify_all();
        true
    }

    fn is_delivered(&self) -> bool {
        *self.delivered.lock()
    }

    fn wait(&self, max_wait: Duration) {
        let mut delivered = self.delivered.lock();
        if !*delivered {
            self.done.wait_for(&mut delivered, max_wait);
        }
    }
}

#[derive(Debug)]
struct Outstanding {
    index: usize,
    slot: Arc<TaskSlot>,
    deadline: Instant,
}

/// Drop finished iterations from `pool` and deliver a timeout for any that are past their deadline.
fn reap(pool: &mut VecDeque<Outstanding>, timeout_s: f64, results: &UnboundedSender<ResultRecord>) {
    let now = Instant::now();
    pool.retain(|task| {
        if task.slot.is_delivered() {
            return false;
        }
        if now >= task.deadline {
            if task
                .slot
                .deliver(ResultRecord::on_timeout(task.index, timeout_s), results)
            {
                log::warn!(
                    "Iteration {} did not finish within {timeout_s}s, recording a timeout",
                    task.index + 1
                );
            }
            return false;
        }
        true
    });
}

/// Wait a short, bounded time for the oldest outstanding iteration.
fn wait_on_oldest(pool: &VecDeque<Outstanding>) {
    match pool.front() {
        Some(oldest) => {
            let until_deadline = oldest.deadline.saturating_duration_since(Instant::now());
            oldest.slot.wait(STALL_WAIT.min(until_deadline));
        }
        None => std::thread::sleep(STALL_WAIT),
    }
}

/// Sleep for `delay`, waking early if the run is aborted.
fn sleep_unless_aborted(delay: Duration, abort: &AbortListener) {
    let started = Instant::now();
    loop {
        let left = delay.saturating_sub(started.elapsed());
        if left.is_zero() || abort.is_aborted() {
            break;
        }
        std::thread::sleep(left.min(STAGGER_STEP));
    }
}

fn pace_worker(
    plan: WorkerPlan,
    source: IterationSource,
    abort: AbortListener,
    results: UnboundedSender<ResultRecord>,
) {
    let timeout_s = plan.timeout.as_secs_f64();
    sleep_unless_aborted(plan.stagger, &abort);

    let start = Instant::now();
    let mut pool = VecDeque::new();
    let mut started = 0usize;

    while started < plan.times {
        if abort.is_aborted() {
            log::debug!("Pacing worker {} aborted after {started} iterations", plan.index);
            break;
        }

        let iteration = source.next_iteration();
        let index = iteration.index;
        let slot = Arc::new(TaskSlot::default());
        let task_slot = slot.clone();
        let task_results = results.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("rps-iteration-{index}"))
            .spawn(move || {
                let record = invoke(iteration);
                if !task_slot.deliver(record, &task_results) {
                    log::debug!("Discarding late result of iteration {}", index + 1);
                }
            });
        started += 1;

        if let Err(e) = spawned {
            log::error!("Pacing worker {} could not start a thread: {e:?}", plan.index);
            slot.deliver(
                ResultRecord::from_failure(&anyhow::Error::new(e).context("Failed to start iteration")),
                &results,
            );
            break;
        }

        pool.push_back(Outstanding {
            index,
            slot,
            deadline: Instant::now() + plan.timeout,
        });
        reap(&mut pool, timeout_s, &results);

        while !abort.is_aborted()
            && (started as f64 / start.elapsed().as_secs_f64() > plan.rate
                || pool.len() >= plan.max_in_flight)
        {
            wait_on_oldest(&pool);
            reap(&mut pool, timeout_s, &results);
        }
    }

    while !pool.is_empty() {
        wait_on_oldest(&pool);
        reap(&mut pool, timeout_s, &results);
    }
}
