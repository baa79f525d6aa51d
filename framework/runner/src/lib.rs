mod catalog;
mod clock;
mod context;
mod executor;
mod invoker;
mod registry;
mod runner;
mod selector;
pub mod strategy;
mod types;

pub mod prelude {
    pub use crate::catalog::{
        ScenarioCatalog, ScenarioCatalogBuilder, ScenarioFamily, ScenarioFamilyBuilder,
        ScenarioMethod, ScenarioRef,
    };
    pub use crate::clock::{Clock, SystemClock};
    pub use crate::context::{Clients, ScenarioContext};
    pub use crate::executor::Executor;
    pub use crate::invoker::{invoke, Iteration, IterationSource};
    pub use crate::registry::{
        execution_type_of, get_runner, validate_config, ConfigCheck, RunnerPlugin, RunnerRegistry,
        StrategyBuilder, DEFAULT_EXECUTION_TYPE,
    };
    pub use crate::runner::{RunState, ScenarioRunner, Task};
    pub use crate::selector::{ContextSelector, UnknownUserChoiceMethod, UserChoiceMethod};
    pub use crate::strategy::{
        ConstantConfig, ConstantForDurationConfig, ConstantForDurationRunner, ConstantRunner,
        PeriodicConfig, PeriodicRunner, RpsConfig, RpsRunner, RunnerStrategy, SerialConfig,
        SerialRunner,
    };
    pub use crate::types::{CrosswindResult, ScenarioArgs, ScenarioResult};

    pub use crosswind_core::prelude::*;
}
