use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RunnerError;

/// The prepared context a task runs its scenario in.
///
/// Values are held behind an [Arc] so that the per-iteration contexts derived from a task context
/// share everything they do not replace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskContext(BTreeMap<String, Arc<Value>>);

impl TaskContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).map(Arc::as_ref)
    }

    pub fn get_shared(&self, key: &str) -> Option<Arc<Value>> {
        self.0.get(key).cloned()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Arc<Value>> {
        self.0.insert(key.into(), Arc::new(value))
    }

    pub fn insert_shared(&mut self, key: impl Into<String>, value: Arc<Value>) -> Option<Arc<Value>> {
        self.0.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Arc<Value>> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<Value>)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The admin credential descriptor every task context must carry.
    pub fn admin(&self) -> Option<&Value> {
        self.get("admin")
    }

    pub fn users(&self) -> Option<&Vec<Value>> {
        self.get("users").and_then(Value::as_array)
    }

    pub fn tenants(&self) -> Option<&Map<String, Value>> {
        self.get("tenants").and_then(Value::as_object)
    }

    pub fn config(&self) -> Option<&Value> {
        self.get("config")
    }
}

impl FromIterator<(String, Value)> for TaskContext {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k, Arc::new(v))).collect())
    }
}

impl TryFrom<Value> for TaskContext {
    type Error = RunnerError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(RunnerError::InvalidContext {
                reason: format!("a task context must be an object, got {other}"),
            }),
        }
    }
}

/// Deep merge `overlay` onto `base`. Objects are merged key by key, any other value in `overlay`
/// replaces the one in `base`.
pub fn merge_config(base: Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(key) {
                    Some(existing) => merge_config(existing, value),
                    None => value.clone(),
                };
                base.insert(key.clone(), merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn from_json_object() {
        let context = TaskContext::try_from(json!({
            "admin": {"credential": "root"},
            "users": [{"id": "u1", "tenant_id": "t1"}],
        }))
        .unwrap();

        assert_eq!(Some(&json!({"credential": "root"})), context.admin());
        assert_eq!(1, context.users().unwrap().len());
        assert!(context.tenants().is_none());
    }

    #[test]
    fn from_non_object_is_rejected() {
        let err = TaskContext::try_from(json!([1])).unwrap_err();
        assert!(matches!(err, RunnerError::InvalidContext { .. }));
    }

    #[test]
    fn clones_share_values() {
        let mut context = TaskContext::new();
        context.insert("admin", json!({"credential": "root"}));

        let copy = context.clone();

        assert!(Arc::ptr_eq(
            &context.get_shared("admin").unwrap(),
            &copy.get_shared("admin").unwrap()
        ));
    }

    #[test]
    fn serializes_as_plain_map() {
        let context: TaskContext = [("a".to_string(), json!(1))].into_iter().collect();

        assert_eq!(json!({"a": 1}), serde_json::to_value(&context).unwrap());
    }

    #[test]
    fn merge_overlay_wins() {
        let base = json!({
            "users": {"tenants": 2, "users_per_tenant": 1},
            "keep": true,
        });
        let overlay = json!({
            "users": {"tenants": 3, "user_choice_method": "round_robin"},
            "extra": [1],
        });

        let merged = merge_config(base, &overlay);

        assert_eq!(
            json!({
                "users": {"tenants": 3, "users_per_tenant": 1, "user_choice_method": "round_robin"},
                "keep": true,
                "extra": [1],
            }),
            merged
        );
    }

    #[test]
    fn merge_replaces_non_objects() {
        assert_eq!(json!(5), merge_config(json!({"a": 1}), &json!(5)));
        assert_eq!(json!({"a": 1}), merge_config(json!(null), &json!({"a": 1})));
    }
}
