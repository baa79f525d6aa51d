use std::time::Duration;

use crosswind_core::prelude::{ConfigSchema, PropertySchema, RunnerError, SchemaError};
use serde::Deserialize;
use serde_json::Value;

use super::pool::run_pool;
use super::{
    at_least_one, default_concurrency, default_timeout, default_times, optional_at_least_one,
    parse_config, seconds, worker_bound, RunnerStrategy,
};
use crate::invoker::IterationSource;
use crate::registry::RunnerPlugin;
use crate::runner::ScenarioRunner;

pub const EXECUTION_TYPE: &str = "constant";

pub const CONFIG_SCHEMA: ConfigSchema = ConfigSchema {
    properties: &[
        PropertySchema::string("type"),
        PropertySchema::integer("times")
            .minimum(1.0)
            .description("Total number of iterations to run"),
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
    required: &[],
    additional_properties: false,
};

pub(crate) const PLUGIN: RunnerPlugin = RunnerPlugin {
    execution_type: EXECUTION_TYPE,
    config_schema: &CONFIG_SCHEMA,
    check: Some(check),
    build,
};

fn build(config: &Value) -> Result<Box<dyn RunnerStrategy>, RunnerError> {
    Ok(Box::new(ConstantRunner::from_config(config)?))
}

/// Running more workers than iterations would leave workers with nothing to do.
fn check(config: &Value) -> Result<(), SchemaError> {
    let read = |key: &str, default: usize| {
        config
            .get(key)
            .and_then(Value::as_u64)
            .unwrap_or(default as u64)
    };
    let times = read("times", default_times());
    let concurrency = read("concurrency", default_concurrency());

    if concurrency > times {
        return Err(SchemaError::Invalid {
            path: "concurrency".to_string(),
            reason: format!("concurrency ({concurrency}) must not be greater than times ({times})"),
        });
    }

    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstantConfig {
    #[serde(default, rename = "type")]
    pub execution_type: Option<String>,
    #[serde(default = "default_times")]
    pub times: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    #[serde(default)]
    pub max_cpu_count: Option<usize>,
}

/// Runs a fixed number of iterations, keeping a constant number of them in flight.
#[derive(Debug, Clone)]
pub struct ConstantRunner {
    times: usize,
    concurrency: usize,
    timeout: Duration,
    max_cpu_count: Option<usize>,
}

impl ConstantRunner {
    pub fn new(config: ConstantConfig) -> Result<Self, RunnerError> {
        Ok(Self {
            times: config.times,
            concurrency: at_least_one("concurrency", config.concurrency)?,
            timeout: seconds("timeout", config.timeout)?,
            max_cpu_count: optional_at_least_one("max_cpu_count", config.max_cpu_count)?,
        })
    }

    pub fn from_config(config: &Value) -> Result<Self, RunnerError> {
        Self::new(parse_config(config)?)
    }
}

impl RunnerStrategy for ConstantRunner {
    fn execution_type(&self) -> &'static str {
        EXECUTION_TYPE
    }

    fn execute(&self, runner: &ScenarioRunner, source: IterationSource) -> Result<(), RunnerError> {
        log::debug!(
            "Running {} iterations with concurrency {} and timeout {:?}",
            self.times,
            self.concurrency,
            self.timeout
        );
        log::debug!(
            "Load is bounded to {} workers",
            worker_bound(self.max_cpu_count, &[self.times, self.concurrency])
        );

        let times = self.times;
        run_pool(runner, &source, self.concurrency, self.timeout, |dispatched| {
            dispatched < times
        })
    }
}
