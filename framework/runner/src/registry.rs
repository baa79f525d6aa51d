use std::collections::HashMap;

use crosswind_core::prelude::{ConfigSchema, RunnerError, SchemaError};
use serde_json::Value;

use crate::runner::{ScenarioRunner, Task};
use crate::strategy::{self, RunnerStrategy};

/// The strategy used when a runner config has no `type`.
pub const DEFAULT_EXECUTION_TYPE: &str = "serial";

pub type StrategyBuilder = fn(&Value) -> Result<Box<dyn RunnerStrategy>, RunnerError>;

/// An extra check on a config that already matches the schema.
pub type ConfigCheck = fn(&Value) -> Result<(), SchemaError>;

/// Everything the registry knows about one strategy.
#[derive(Debug, Clone, Copy)]
pub struct RunnerPlugin {
    pub execution_type: &'static str,
    pub config_schema: &'static ConfigSchema,
    pub check: Option<ConfigCheck>,
    pub build: StrategyBuilder,
}

/// Runner strategies by execution type.
///
/// The default registry holds the built-in strategies. Others can be added with
/// [RunnerRegistry::register].
#[derive(Debug, Clone)]
pub struct RunnerRegistry {
    plugins: HashMap<&'static str, RunnerPlugin>,
}

impl Default for RunnerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for plugin in [
            strategy::serial::PLUGIN,
            strategy::constant::PLUGIN,
            strategy::duration::PLUGIN,
            strategy::rps::PLUGIN,
            strategy::periodic::PLUGIN,
        ] {
            registry.register(plugin);
        }
        registry
    }
}

impl RunnerRegistry {
    pub fn empty() -> Self {
        Self {
            plugins: HashMap::new(),
        }
    }

    pub fn register(&mut self, plugin: RunnerPlugin) {
        let previous = self.plugins.insert(plugin.execution_type, plugin);

        if previous.is_some() {
            panic!("Runner [{}] is already registered", plugin.execution_type);
        }
    }

    pub fn get(&self, execution_type: &str) -> Option<&RunnerPlugin> {
        self.plugins.get(execution_type)
    }

    pub fn execution_types(&self) -> Vec<&'static str> {
        let mut types = self.plugins.keys().copied().collect::<Vec<_>>();
        types.sort_unstable();
        types
    }

    fn plugin_for(&self, config: &Value) -> Result<&RunnerPlugin, RunnerError> {
        let execution_type = execution_type_of(config)?;
        self.get(execution_type).ok_or_else(|| RunnerError::NoSuchRunner {
            name: execution_type.to_string(),
        })
    }

    /// Check a runner config against the schema of the strategy it selects.
    pub fn validate_config(&self, config: &Value) -> Result<(), RunnerError> {
        let plugin = self.plugin_for(config)?;
        plugin.config_schema.validate(config)?;
        if let Some(check) = plugin.check {
            check(config)?;
        }
        Ok(())
    }

    /// Build a runner for the strategy a config selects.
    ///
    /// The config is parsed, with defaults applied, but not validated against the schema. Use
    /// [RunnerRegistry::validate_config] for that.
    pub fn get_runner(&self, task: Task, config: Value) -> Result<ScenarioRunner, RunnerError> {
        let plugin = self.plugin_for(&config)?;
        let strategy = (plugin.build)(&config)?;
        Ok(ScenarioRunner::new(task, strategy, config))
    }
}

/// The `type` of a runner config, or [DEFAULT_EXECUTION_TYPE] when it has none.
pub fn execution_type_of(config: &Value) -> Result<&str, RunnerError> {
    let Some(config) = config.as_object() else {
        return Err(SchemaError::WrongType {
            path: "<config>".to_string(),
            expected: "object",
        }
        .into());
    };

    match config.get("type") {
        None => Ok(DEFAULT_EXECUTION_TYPE),
        Some(Value::String(execution_type)) => Ok(execution_type),
        Some(_) => Err(SchemaError::WrongType {
            path: "type".to_string(),
            expected: "string",
        }
        .into()),
    }
}

/// Build a runner from the built-in strategies.
pub fn get_runner(task: Task, config: Value) -> Result<ScenarioRunner, RunnerError> {
    RunnerRegistry::default().get_runner(task, config)
}

/// Validate a runner config against the built-in strategies.
pub fn validate_config(config: &Value) -> Result<(), RunnerError> {
    RunnerRegistry::default().validate_config(config)
}
