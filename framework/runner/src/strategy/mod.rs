pub mod constant;
pub mod duration;
pub mod periodic;
mod pool;
pub mod rps;
pub mod serial;

pub use constant::{ConstantConfig, ConstantRunner};
pub use duration::{ConstantForDurationConfig, ConstantForDurationRunner};
pub use periodic::{PeriodicConfig, PeriodicRunner};
pub use rps::{RpsConfig, RpsRunner, POLL_INTERVAL};
pub use serial::{SerialConfig, SerialRunner};

use std::fmt::Debug;
use std::time::Duration;

use crosswind_core::prelude::{RunnerError, SchemaError};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::invoker::IterationSource;
use crate::runner::ScenarioRunner;

/// A scheduling policy for the iterations of a run.
///
/// The strategy decides when iterations are started and hands every result to
/// [ScenarioRunner::send_result]. It must stop starting iterations once the runner is aborted.
pub trait RunnerStrategy: Debug + Send + Sync {
    /// The name this strategy is selected by in a runner config's `type`.
    fn execution_type(&self) -> &'static str;

    fn execute(&self, runner: &ScenarioRunner, source: IterationSource) -> Result<(), RunnerError>;
}

pub(crate) fn default_times() -> usize {
    1
}

pub(crate) fn default_concurrency() -> usize {
    1
}

pub(crate) fn default_timeout() -> f64 {
    600.0
}

/// Deserialize a runner config into its typed form, applying defaults.
pub(crate) fn parse_config<T: DeserializeOwned>(config: &Value) -> Result<T, RunnerError> {
    serde_json::from_value(config.clone()).map_err(|e| {
        SchemaError::Invalid {
            path: "<config>".to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

pub(crate) fn seconds(path: &str, value: f64) -> Result<Duration, RunnerError> {
    Duration::try_from_secs_f64(value).map_err(|e| {
        SchemaError::Invalid {
            path: path.to_string(),
            reason: format!("{value} is not a valid number of seconds: {e}"),
        }
        .into()
    })
}

/// A limit that may be left out, but must be at least 1 when given.
pub(crate) fn optional_at_least_one(
    path: &str,
    value: Option<usize>,
) -> Result<Option<usize>, RunnerError> {
    value.map(|v| at_least_one(path, v)).transpose()
}

/// The number of workers a run is spread over: the available CPUs, lowered by `max_cpu_count` and
/// by every limit in `limits`.
pub(crate) fn worker_bound(max_cpu_count: Option<usize>, limits: &[usize]) -> usize {
    let available = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    limits
        .iter()
        .copied()
        .chain(max_cpu_count)
        .fold(available, usize::min)
        .max(1)
}

pub(crate) fn at_least_one(path: &str, value: usize) -> Result<usize, RunnerError> {
    if value == 0 {
        return Err(SchemaError::BelowMinimum {
            path: path.to_string(),
            minimum: 1.0,
            actual: 0.0,
        }
        .into());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_bound_takes_the_lowest_limit() {
        assert_eq!(1, worker_bound(Some(1), &[8, 8]));
        assert!(worker_bound(None, &[2, 64]) <= 2);
        assert!(worker_bound(None, &[]) >= 1);
        assert_eq!(1, worker_bound(Some(4), &[0]));
    }

    #[test]
    fn optional_limit_must_be_positive() {
        assert_eq!(None, optional_at_least_one("max_cpu_count", None).unwrap());
        assert_eq!(Some(3), optional_at_least_one("max_cpu_count", Some(3)).unwrap());
        assert!(optional_at_least_one("max_cpu_count", Some(0)).is_err());
    }
}
