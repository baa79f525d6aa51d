mod abort;
mod context;
mod error;
mod queue;
mod result;
mod schema;

pub mod prelude {
    pub use crate::abort::{AbortHandle, AbortListener};
    pub use crate::context::{merge_config, TaskContext};
    pub use crate::error::{
        format_error, format_scenario_error, IterationTimeout, RunnerError, ScenarioError,
    };
    pub use crate::queue::ResultQueue;
    pub use crate::result::{validate_result_value, AtomicActions, ResultRecord, ScenarioOutput};
    pub use crate::schema::{ConfigSchema, Minimum, PropertySchema, PropertyType, SchemaError};
}
