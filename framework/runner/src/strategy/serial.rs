use crosswind_core::prelude::{ConfigSchema, PropertySchema, RunnerError};
use serde::Deserialize;
use serde_json::Value;

use super::{default_times, parse_config, RunnerStrategy};
use crate::invoker::{invoke, IterationSource};
use crate::registry::RunnerPlugin;
use crate::runner::ScenarioRunner;

pub const EXECUTION_TYPE: &str = "serial";

pub const CONFIG_SCHEMA: ConfigSchema = ConfigSchema {
    properties: &[
        PropertySchema::string("type"),
        PropertySchema::integer("times")
            .minimum(1.0)
            .description("Total number of iterations to run"),
    ],
    required: &[],
    additional_properties: false,
};

pub(crate) const PLUGIN: RunnerPlugin = RunnerPlugin {
    execution_type: EXECUTION_TYPE,
    config_schema: &CONFIG_SCHEMA,
    check: None,
    build,
};

fn build(config: &Value) -> Result<Box<dyn RunnerStrategy>, RunnerError> {
    Ok(Box::new(SerialRunner::from_config(config)?))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerialConfig {
    #[serde(default, rename = "type")]
    pub execution_type: Option<String>,
    #[serde(default = "default_times")]
    pub times: usize,
}

/// Runs iterations one after another on the calling thread.
///
/// Useful for debugging scenarios, since there is no concurrency and no timeout.
#[derive(Debug, Clone)]
pub struct SerialRunner {
    times: usize,
}

impl SerialRunner {
    pub fn new(config: SerialConfig) -> Self {
        Self {
            times: config.times,
        }
    }

    pub fn from_config(config: &Value) -> Result<Self, RunnerError> {
        Ok(Self::new(parse_config(config)?))
    }
}

impl RunnerStrategy for SerialRunner {
    fn execution_type(&self) -> &'static str {
        EXECUTION_TYPE
    }

    fn execute(&self, runner: &ScenarioRunner, source: IterationSource) -> Result<(), RunnerError> {
        for _ in 0..self.times {
            if runner.is_aborted() {
                log::debug!("Serial runner aborted after {} iterations", source.dispatched());
                break;
            }

            runner.send_result(invoke(source.next_iteration()))?;
        }

        Ok(())
    }
}
