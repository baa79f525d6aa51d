use std::backtrace::BacktraceStatus;

use crate::schema::SchemaError;

/// Fatal errors from configuring or running a scenario runner.
///
/// Failures of individual iterations are never reported through this type. They are captured in
/// the `error` field of that iteration's [crate::prelude::ResultRecord] instead.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("There is no runner named '{name}'")]
    NoSuchRunner { name: String },
    #[error("Config schema validation failed: {0}")]
    SchemaValidation(#[from] SchemaError),
    #[error("There is no scenario named '{name}'")]
    NoSuchScenario { name: String },
    #[error("Invalid task context: {reason}")]
    InvalidContext { reason: String },
    #[error("Runner produced an invalid result for iteration {index}: {source}")]
    InvalidRunnerResult { index: usize, source: SchemaError },
    #[error("This runner has already been run")]
    AlreadyRun,
    #[error(transparent)]
    Executor(#[from] anyhow::Error),
}

/// Return this error from a scenario method to report a failure with a specific kind.
///
/// The kind ends up as the first element of the iteration's error triple. Any other error returned
/// by a scenario is reported with the kind `Error`.
#[derive(derive_more::Error, derive_more::Display, Debug, Clone, PartialEq, Eq)]
#[display("{message}")]
pub struct ScenarioError {
    kind: String,
    message: String,
}

impl ScenarioError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// An iteration did not finish within its configured timeout.
#[derive(derive_more::Error, derive_more::Display, Debug, Clone, PartialEq)]
#[display("Iteration {iteration} did not finish within {timeout_s} seconds")]
pub struct IterationTimeout {
    pub iteration: usize,
    pub timeout_s: f64,
}

pub(crate) const TIMEOUT_ERROR_KIND: &str = "TimeoutError";
pub(crate) const DEFAULT_ERROR_KIND: &str = "Error";

/// Format an error as the `[kind, message, trace]` triple stored on a result record.
///
/// The trace lists the error and its causes. It never includes a backtrace, so the same error
/// always formats the same way.
pub fn format_error(err: &anyhow::Error) -> Vec<String> {
    let kind = if let Some(e) = err.downcast_ref::<ScenarioError>() {
        e.kind().to_string()
    } else if err.downcast_ref::<IterationTimeout>().is_some() {
        TIMEOUT_ERROR_KIND.to_string()
    } else {
        DEFAULT_ERROR_KIND.to_string()
    };

    let mut trace = format!("{kind}: {err}");
    for cause in err.chain().skip(1) {
        trace.push_str(&format!("\nCaused by: {cause}"));
    }

    vec![kind, err.to_string(), trace]
}

/// Like [format_error], for errors raised by scenario code. The backtrace is appended to the trace
/// when one was captured.
pub fn format_scenario_error(err: &anyhow::Error) -> Vec<String> {
    let mut formatted = format_error(err);

    let backtrace = err.backtrace();
    if backtrace.status() == BacktraceStatus::Captured {
        formatted[2].push_str(&format!("\n\nStack backtrace:\n{backtrace}"));
    }

    formatted
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use pretty_assertions::assert_eq;

    #[test]
    fn scenario_error_kind_is_used() {
        let err = anyhow::Error::new(ScenarioError::new("ValueError", "boom"));

        let formatted = format_error(&err);

        assert_eq!(3, formatted.len());
        assert_eq!("ValueError", formatted[0]);
        assert_eq!("boom", formatted[1]);
        assert!(formatted[2].starts_with("ValueError: "));
    }

    #[test]
    fn scenario_error_kind_survives_context() {
        let err = Err::<(), _>(ScenarioError::new("KeyError", "missing"))
            .context("while looking up")
            .unwrap_err();

        let formatted = format_error(&err);

        assert_eq!("KeyError", formatted[0]);
        assert_eq!("while looking up", formatted[1]);
        assert!(formatted[2].contains("missing"));
    }

    #[test]
    fn timeout_kind() {
        let err = anyhow::Error::new(IterationTimeout {
            iteration: 3,
            timeout_s: 0.5,
        });

        let formatted = format_error(&err);

        assert_eq!("TimeoutError", formatted[0]);
        assert_eq!(
            "Iteration 3 did not finish within 0.5 seconds",
            formatted[1]
        );
    }

    #[test]
    fn trace_lists_causes_without_backtrace() {
        let err = Err::<(), _>(anyhow::anyhow!("disk full"))
            .context("writing volume")
            .unwrap_err();

        let formatted = format_error(&err);

        assert_eq!(
            "Error: writing volume\nCaused by: disk full",
            formatted[2]
        );
        assert_eq!(formatted, format_error(&err));
    }

    #[test]
    fn scenario_trace_starts_with_the_plain_trace() {
        let err = anyhow::Error::new(ScenarioError::new("ValueError", "boom"));

        let formatted = format_scenario_error(&err);

        assert_eq!(format_error(&err)[..2], formatted[..2]);
        assert!(formatted[2].starts_with("ValueError: boom"));
    }

    #[test]
    fn other_errors_get_generic_kind() {
        let formatted = format_error(&anyhow::anyhow!("plain failure"));

        assert_eq!("Error", formatted[0]);
        assert_eq!("plain failure", formatted[1]);
    }

    #[test]
    fn runner_error_from_schema_error() {
        let err: RunnerError = SchemaError::Missing {
            path: "rps".to_string(),
        }
        .into();

        assert!(matches!(err, RunnerError::SchemaValidation(_)));
        assert_eq!(
            "Config schema validation failed: 'rps' is a required property",
            err.to_string()
        );
    }
}
