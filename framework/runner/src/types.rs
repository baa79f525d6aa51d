use crosswind_core::prelude::ScenarioOutput;
use serde_json::{Map, Value};

/// Recommended error type for scenario methods and any shared code that you write for them. This
/// type is compatible with [ScenarioResult] so you can use `?` to propagate errors.
pub type CrosswindResult<T> = anyhow::Result<T>;

/// Keyword arguments passed to every iteration of a scenario. Each iteration gets its own copy.
pub type ScenarioArgs = Map<String, Value>;

/// What a scenario method returns. `Ok(None)` is a success without output data.
pub type ScenarioResult = CrosswindResult<Option<ScenarioOutput>>;
