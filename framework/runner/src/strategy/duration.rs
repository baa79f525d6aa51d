use std::time::Duration;

use crosswind_core::prelude::{ConfigSchema, PropertySchema, RunnerError};
use serde::Deserialize;
use serde_json::Value;

use super::pool::run_pool;
use super::{
    at_least_one, default_concurrency, default_timeout, optional_at_least_one, parse_config,
    seconds, worker_bound, RunnerStrategy,
};
use crate::invoker::IterationSource;
use crate::registry::RunnerPlugin;
use crate::runner::ScenarioRunner;

pub const EXECUTION_TYPE: &str = "constant_for_duration";

pub const CONFIG_SCHEMA: ConfigSchema = ConfigSchema {
    properties: &[
        PropertySchema::string("type"),
        PropertySchema::number("duration")
            .minimum(0.0)
            .description("Seconds to keep starting new iterations for"),
        PropertySchema::integer("concurrency")
            .minimum(1.0)
            .description("Number of iterations to keep in flight"),
        PropertySchema::number("timeout")
            .minimum(1.0)
            .description("Seconds to wait for a single iteration"),
        PropertySchema::integer("max_cpu_count")
            .minimum(1.0)
            .description("Limit on the number of workers"),
    ],
    required: &["duration"],
    additional_properties: false,
};

pub(crate) const PLUGIN: RunnerPlugin = RunnerPlugin {
    execution_type: EXECUTION_TYPE,
    config_schema: &CONFIG_SCHEMA,
    check: None,
    build,
};

fn build(config: &Value) -> Result<Box<dyn RunnerStrategy>, RunnerError> {
    Ok(Box::new(ConstantForDurationRunner::from_config(config)?))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstantForDurationConfig {
    #[serde(default, rename = "type")]
    pub execution_type: Option<String>,
    pub duration: f64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    #[serde(default)]
    pub max_cpu_count: Option<usize>,
}

/// Keeps a constant number of iterations in flight until a wall clock deadline.
///
/// The first iteration is always started. Later iterations are only started before the deadline,
/// and iterations still running at the deadline are waited for.
#[derive(Debug, Clone)]
pub struct ConstantForDurationRunner {
    duration: Duration,
    concurrency: usize,
    timeout: Duration,
    max_cpu_count: Option<usize>,
}

impl ConstantForDurationRunner {
    pub fn new(config: ConstantForDurationConfig) -> Result<Self, RunnerError> {
        Ok(Self {
            duration: seconds("duration", config.duration)?,
            concurrency: at_least_one("concurrency", config.concurrency)?,
            timeout: seconds("timeout", config.timeout)?,
            max_cpu_count: optional_at_least_one("max_cpu_count", config.max_cpu_count)?,
        })
    }

    pub fn from_config(config: &Value) -> Result<Self, RunnerError> {
        Self::new(parse_config(config)?)
    }
}

impl RunnerStrategy for ConstantForDurationRunner {
    fn execution_type(&self) -> &'static str {
        EXECUTION_TYPE
    }

    fn execute(&self, runner: &ScenarioRunner, source: IterationSource) -> Result<(), RunnerError> {
        log::debug!(
            "Running iterations for {:?} with concurrency {} and timeout {:?}",
            self.duration,
            self.concurrency,
            self.timeout
        );
        log::debug!(
            "Load is bounded to {} workers",
            worker_bound(self.max_cpu_count, &[self.concurrency])
        );

        let clock = runner.clock();
        let start = clock.now();
        let duration = self.duration;
        run_pool(runner, &source, self.concurrency, self.timeout, |dispatched| {
            dispatched == 0 || clock.now().saturating_duration_since(start) < duration
        })
    }
}
