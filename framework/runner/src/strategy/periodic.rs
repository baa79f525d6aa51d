use std::time::Duration;

use crosswind_core::prelude::{ConfigSchema, PropertySchema, ResultRecord, RunnerError};
use serde::Deserialize;
use serde_json::Value;

use super::{default_timeout, default_times, parse_config, seconds, RunnerStrategy};
use crate::executor::Executor;
use crate::invoker::IterationSource;
use crate::registry::RunnerPlugin;
use crate::runner::ScenarioRunner;

pub const EXECUTION_TYPE: &str = "periodic";

pub const CONFIG_SCHEMA: ConfigSchema = ConfigSchema {
    properties: &[
        PropertySchema::string("type"),
        PropertySchema::integer("times")
            .minimum(1.0)
            .description("Total number of iterations to run"),
        PropertySchema::number("period")
            .exclusive_minimum(0.0)
            .description("Seconds between the starts of two iterations"),
        PropertySchema::number("timeout")
            .minimum(1.0)
            .description("Seconds to wait for a single iteration"),
    ],
    required: &["period"],
    additional_properties: false,
};

pub(crate) const PLUGIN: RunnerPlugin = RunnerPlugin {
    execution_type: EXECUTION_TYPE,
    config_schema: &CONFIG_SCHEMA,
    check: None,
    build,
};

fn build(config: &Value) -> Result<Box<dyn RunnerStrategy>, RunnerError> {
    Ok(Box::new(PeriodicRunner::from_config(config)?))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeriodicConfig {
    #[serde(default, rename = "type")]
    pub execution_type: Option<String>,
    #[serde(default = "default_times")]
    pub times: usize,
    pub period: f64,
    #[serde(default = "default_timeout")]
    pub timeout: f64,
}

/// Starts an iteration every `period` seconds without waiting for earlier ones to finish.
#[derive(Debug, Clone)]
pub struct PeriodicRunner {
    times: usize,
    period: Duration,
    timeout: Duration,
}

impl PeriodicRunner {
    pub fn new(config: PeriodicConfig) -> Result<Self, RunnerError> {
        Ok(Self {
            times: config.times,
            period: seconds("period", config.period)?,
            timeout: seconds("timeout", config.timeout)?,
        })
    }

    pub fn from_config(config: &Value) -> Result<Self, RunnerError> {
        Self::new(parse_config(config)?)
    }
}

impl RunnerStrategy for PeriodicRunner {
    fn execution_type(&self) -> &'static str {
        EXECUTION_TYPE
    }

    fn execute(&self, runner: &ScenarioRunner, source: IterationSource) -> Result<(), RunnerError> {
        log::debug!(
            "Running {} iterations every {:?} with timeout {:?}",
            self.times,
            self.period,
            self.timeout
        );

        let executor = Executor::new()?;
        let clock = runner.clock();
        let mut abort = runner.abort_listener();
        let timeout_s = self.timeout.as_secs_f64();
        let mut timed_out = 0usize;

        let outcome = executor.execute_in_place(async {
            let mut launched = Vec::with_capacity(self.times);
            for i in 0..self.times {
                if abort.is_aborted() {
                    break;
                }

                let iteration = source.next_iteration();
                launched.push((iteration.index, executor.spawn_iteration(iteration)));

                if i + 1 < self.times {
                    tokio::select! {
                        _ = clock.sleep(self.period) => {}
                        _ = abort.wait_for_abort() => {
                            log::debug!("Periodic runner aborted while waiting for the next period");
                        }
                    }
                }
            }

            // Results are collected in launch order.
            for (index, handle) in launched {
                let record = match tokio::time::timeout(self.timeout, handle).await {
                    Ok(Ok(record)) => record,
                    Ok(Err(e)) => {
                        log::error!("Worker for iteration {} failed: {e:?}", index + 1);
                        ResultRecord::from_failure(&anyhow::Error::new(e))
                    }
                    Err(_) => {
                        timed_out += 1;
                        log::warn!(
                            "Iteration {} did not finish within {timeout_s}s, recording a timeout",
                            index + 1
                        );
                        ResultRecord::on_timeout(index, timeout_s)
                    }
                };
                runner.send_result(record)?;
            }

            Ok::<_, RunnerError>(())
        });

        executor.shutdown(timed_out == 0 && !abort.is_aborted());

        outcome
    }
}
