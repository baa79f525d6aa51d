use std::collections::BTreeMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{format_error, IterationTimeout};
use crate::schema::SchemaError;

/// The output a scenario method may return from an iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioOutput {
    pub data: BTreeMap<String, f64>,
    pub errors: String,
}

impl ScenarioOutput {
    pub fn with_data(data: impl IntoIterator<Item = (String, f64)>) -> Self {
        Self {
            data: data.into_iter().collect(),
            errors: String::new(),
        }
    }
}

/// Named sub-action timings of one iteration, in the order the actions were started.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtomicActions(Vec<(String, f64)>);

impl AtomicActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the duration for an action, keeping its original position if it is already present.
    pub fn insert(&mut self, name: impl Into<String>, duration: f64) {
        let name = name.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = duration,
            None => self.0.push((name, duration)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, d)| *d)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(n, d)| (n.as_str(), *d))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, f64)> for AtomicActions {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        let mut actions = AtomicActions::new();
        for (name, duration) in iter {
            actions.insert(name, duration);
        }
        actions
    }
}

impl Serialize for AtomicActions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, duration) in &self.0 {
            map.serialize_entry(name, duration)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AtomicActions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AtomicActionsVisitor;

        impl<'de> Visitor<'de> for AtomicActionsVisitor {
            type Value = AtomicActions;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of action names to durations")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut actions = AtomicActions::new();
                while let Some((name, duration)) = access.next_entry::<String, f64>()? {
                    actions.insert(name, duration);
                }
                Ok(actions)
            }
        }

        deserializer.deserialize_map(AtomicActionsVisitor)
    }
}

/// The outcome of a single scenario iteration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResultRecord {
    /// Wall clock seconds spent in the iteration, not counting idle time.
    pub duration: f64,
    /// Seconds the scenario deliberately spent waiting.
    pub idle_duration: f64,
    /// Empty on success, otherwise `[kind, message, trace]`.
    pub error: Vec<String>,
    pub scenario_output: ScenarioOutput,
    pub atomic_actions: AtomicActions,
}

impl ResultRecord {
    /// The record used in place of an iteration that did not finish within `timeout_s` seconds.
    pub fn on_timeout(iteration: usize, timeout_s: f64) -> Self {
        let err = anyhow::Error::new(IterationTimeout {
            iteration,
            timeout_s,
        });
        Self {
            duration: timeout_s,
            error: format_error(&err),
            ..Default::default()
        }
    }

    /// The record used when an iteration could not report its own result.
    pub fn from_failure(err: &anyhow::Error) -> Self {
        Self {
            error: format_error(err),
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }

    pub fn error_kind(&self) -> Option<&str> {
        self.error.first().map(String::as_str)
    }

    /// Check the invariants of the result schema. The record is never modified.
    pub fn validate(&self) -> Result<(), SchemaError> {
        check_duration("duration", self.duration)?;
        check_duration("idle_duration", self.idle_duration)?;

        if !(self.error.is_empty() || self.error.len() == 3) {
            return Err(SchemaError::Invalid {
                path: "error".to_string(),
                reason: format!(
                    "expected 0 or 3 elements, got {}",
                    self.error.len()
                ),
            });
        }

        for (key, value) in &self.scenario_output.data {
            if !value.is_finite() {
                return Err(SchemaError::Invalid {
                    path: format!("scenario_output.data.{key}"),
                    reason: format!("{value} is not a finite number"),
                });
            }
        }

        for (name, duration) in self.atomic_actions.iter() {
            check_duration(&format!("atomic_actions.{name}"), duration)?;
        }

        Ok(())
    }
}

fn check_duration(path: &str, value: f64) -> Result<(), SchemaError> {
    if !value.is_finite() {
        return Err(SchemaError::Invalid {
            path: path.to_string(),
            reason: format!("{value} is not a finite number"),
        });
    }
    if value < 0.0 {
        return Err(SchemaError::BelowMinimum {
            path: path.to_string(),
            minimum: 0.0,
            actual: value,
        });
    }
    Ok(())
}

const RESULT_KEYS: [&str; 5] = [
    "duration",
    "idle_duration",
    "error",
    "scenario_output",
    "atomic_actions",
];

/// Validate a raw JSON value against the result schema and parse it into a [ResultRecord].
pub fn validate_result_value(value: &Value) -> Result<ResultRecord, SchemaError> {
    let Some(object) = value.as_object() else {
        return Err(SchemaError::WrongType {
            path: "<result>".to_string(),
            expected: "object",
        });
    };

    if let Some(missing) = RESULT_KEYS.iter().find(|k| !object.contains_key(**k)) {
        return Err(SchemaError::Missing {
            path: missing.to_string(),
        });
    }
    if let Some(extra) = object.keys().find(|k| !RESULT_KEYS.contains(&k.as_str())) {
        return Err(SchemaError::AdditionalProperty { path: extra.clone() });
    }

    let wrong_type = |path: &str, expected: &'static str| SchemaError::WrongType {
        path: path.to_string(),
        expected,
    };

    for key in ["duration", "idle_duration"] {
        if !object[key].is_number() {
            return Err(wrong_type(key, "number"));
        }
    }
    match object["error"].as_array() {
        Some(items) if items.iter().all(Value::is_string) => {}
        _ => return Err(wrong_type("error", "array of strings")),
    }
    match object["scenario_output"].as_object() {
        Some(output) => {
            if let Some(extra) = output.keys().find(|k| *k != "data" && *k != "errors") {
                return Err(SchemaError::AdditionalProperty {
                    path: format!("scenario_output.{extra}"),
                });
            }
            match output.get("data").map(Value::as_object) {
                Some(Some(data)) => {
                    if let Some((key, _)) = data.iter().find(|(_, v)| !v.is_number()) {
                        return Err(wrong_type(&format!("scenario_output.data.{key}"), "number"));
                    }
                }
                Some(None) => return Err(wrong_type("scenario_output.data", "object")),
                None => {
                    return Err(SchemaError::Missing {
                        path: "scenario_output.data".to_string(),
                    })
                }
            }
            match output.get("errors") {
                Some(Value::String(_)) => {}
                Some(_) => return Err(wrong_type("scenario_output.errors", "string")),
                None => {
                    return Err(SchemaError::Missing {
                        path: "scenario_output.errors".to_string(),
                    })
                }
            }
        }
        None => return Err(wrong_type("scenario_output", "object")),
    }
    match object["atomic_actions"].as_object() {
        Some(actions) => {
            if let Some((name, _)) = actions.iter().find(|(_, v)| !v.is_number()) {
                return Err(wrong_type(&format!("atomic_actions.{name}"), "number"));
            }
        }
        None => return Err(wrong_type("atomic_actions", "object")),
    }

    let record: ResultRecord =
        serde_json::from_value(value.clone()).map_err(|e| SchemaError::Invalid {
            path: "<result>".to_string(),
            reason: e.to_string(),
        })?;
    record.validate()?;

    Ok(record)
}
