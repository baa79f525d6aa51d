use std::str::FromStr;

use crosswind_core::prelude::{RunnerError, TaskContext};
use rand::seq::SliceRandom;
use serde_json::{Map, Value};

/// How the user for an iteration is picked from the context's users.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UserChoiceMethod {
    #[default]
    Random,
    RoundRobin,
}

#[derive(derive_more::Error, derive_more::Display, Debug, Clone, PartialEq, Eq)]
#[display("Unknown user choice method '{name}', expected 'random' or 'round_robin'")]
pub struct UnknownUserChoiceMethod {
    name: String,
}

impl FromStr for UserChoiceMethod {
    type Err = UnknownUserChoiceMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(UserChoiceMethod::Random),
            "round_robin" => Ok(UserChoiceMethod::RoundRobin),
            other => Err(UnknownUserChoiceMethod {
                name: other.to_string(),
            }),
        }
    }
}

/// Derives the context for a single iteration from the task context.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextSelector {
    method: UserChoiceMethod,
}

impl ContextSelector {
    pub fn new(method: UserChoiceMethod) -> Self {
        Self { method }
    }

    /// Read the user choice method from `config.users.user_choice_method`, defaulting to random.
    pub fn from_context(context: &TaskContext) -> Result<Self, RunnerError> {
        let configured = context
            .config()
            .and_then(|config| config.get("users"))
            .and_then(|users| users.get("user_choice_method"));

        let method = match configured {
            None | Some(Value::Null) => UserChoiceMethod::default(),
            Some(Value::String(name)) => {
                name.parse::<UserChoiceMethod>()
                    .map_err(|e| RunnerError::InvalidContext {
                        reason: e.to_string(),
                    })?
            }
            Some(other) => {
                return Err(RunnerError::InvalidContext {
                    reason: format!("user_choice_method must be a string, got {other}"),
                })
            }
        };

        Ok(Self::new(method))
    }

    pub fn method(&self) -> UserChoiceMethod {
        self.method
    }

    /// Build the context for iteration `index`, counting from 0.
    ///
    /// Without users the task context is returned as it is. Otherwise every key except `users` and
    /// `tenants` is shared with the task context, and the chosen `user` and its `tenant` are added.
    pub fn derive(&self, context: &TaskContext, index: usize) -> TaskContext {
        let Some(users) = context.users().filter(|users| !users.is_empty()) else {
            return context.clone();
        };
        let tenants = context.tenants().filter(|tenants| !tenants.is_empty());

        let mut derived = TaskContext::new();
        for (key, value) in context.iter() {
            if key != "users" && key != "tenants" {
                derived.insert_shared(key.clone(), value.clone());
            }
        }

        let (user, tenant) = match self.method {
            UserChoiceMethod::Random => {
                let user = users.choose(&mut rand::thread_rng());
                (user, user.and_then(|u| owning_tenant(u, tenants)))
            }
            UserChoiceMethod::RoundRobin => round_robin(users, tenants, index),
        };

        if let Some(user) = user {
            derived.insert("user", user.clone());
        }
        if let Some(tenant) = tenant {
            derived.insert("tenant", tenant.clone());
        }

        derived
    }
}

fn owning_tenant<'a>(user: &Value, tenants: Option<&'a Map<String, Value>>) -> Option<&'a Value> {
    let tenant_id = user.get("tenant_id")?.as_str()?;
    tenants?.get(tenant_id)
}

/// Walk tenants in id order, then the users within each tenant.
fn round_robin<'a>(
    users: &'a [Value],
    tenants: Option<&'a Map<String, Value>>,
    index: usize,
) -> (Option<&'a Value>, Option<&'a Value>) {
    let Some(tenants) = tenants else {
        return (users.get(index % users.len()), None);
    };

    let mut tenant_ids = tenants.keys().collect::<Vec<_>>();
    tenant_ids.sort();
    let tenant_id = tenant_ids[index % tenant_ids.len()];
    let tenant = &tenants[tenant_id];
    let round = index / tenant_ids.len();

    let tenant_users = match tenant.get("users").and_then(Value::as_array) {
        Some(tenant_users) if !tenant_users.is_empty() => tenant_users.iter().collect::<Vec<_>>(),
        _ => users
            .iter()
            .filter(|u| u.get("tenant_id").and_then(Value::as_str) == Some(tenant_id.as_str()))
            .collect(),
    };

    if tenant_users.is_empty() {
        let user = &users[index % users.len()];
        return (Some(user), owning_tenant(user, Some(tenants)));
    }

    (Some(tenant_users[round % tenant_users.len()]), Some(tenant))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn users_context(choice: &str) -> TaskContext {
        TaskContext::try_from(json!({
            "admin": {"credential": "admin"},
            "config": {"users": {"user_choice_method": choice}},
            "users": [
                {"id": "u1", "tenant_id": "t1"},
                {"id": "u2", "tenant_id": "t1"},
                {"id": "u3", "tenant_id": "t2"},
            ],
            "tenants": {
                "t2": {"id": "t2", "users": [{"id": "u3", "tenant_id": "t2"}]},
                "t1": {"id": "t1", "users": [
                    {"id": "u1", "tenant_id": "t1"},
                    {"id": "u2", "tenant_id": "t1"},
                ]},
            },
        }))
        .unwrap()
    }

    fn user_id(context: &TaskContext) -> &str {
        context.get("user").unwrap()["id"].as_str().unwrap()
    }

    #[test]
    fn identity_without_users() {
        let context = TaskContext::try_from(json!({
            "admin": {"credential": "admin"},
            "tenants": {"t1": {}},
            "other": [1, 2, 3],
        }))
        .unwrap();

        let derived = ContextSelector::default().derive(&context, 7);

        assert_eq!(context, derived);
    }

    #[test]
    fn random_choice_picks_a_known_user() {
        let context = users_context("random");
        let selector = ContextSelector::from_context(&context).unwrap();
        assert_eq!(UserChoiceMethod::Random, selector.method());

        for i in 0..20 {
            let derived = selector.derive(&context, i);

            assert!(["u1", "u2", "u3"].contains(&user_id(&derived)));
            assert!(!derived.contains_key("users"));
            assert!(!derived.contains_key("tenants"));
            assert_eq!(
                derived.get("user").unwrap()["tenant_id"],
                derived.get("tenant").unwrap()["id"]
            );
        }
    }

    #[test]
    fn round_robin_alternates_tenants() {
        let context = users_context("round_robin");
        let selector = ContextSelector::from_context(&context).unwrap();

        let picked = (0..6)
            .map(|i| user_id(&selector.derive(&context, i)).to_string())
            .collect::<Vec<_>>();

        assert_eq!(vec!["u1", "u3", "u2", "u3", "u1", "u3"], picked);
    }

    #[test]
    fn round_robin_without_tenants_cycles_users() {
        let context = TaskContext::try_from(json!({
            "admin": {},
            "users": [{"id": "u1"}, {"id": "u2"}],
        }))
        .unwrap();
        let selector = ContextSelector::new(UserChoiceMethod::RoundRobin);

        let picked = (0..3)
            .map(|i| user_id(&selector.derive(&context, i)).to_string())
            .collect::<Vec<_>>();

        assert_eq!(vec!["u1", "u2", "u1"], picked);
    }

    #[test]
    fn derived_context_shares_values() {
        let context = users_context("random");

        let derived = ContextSelector::default().derive(&context, 0);

        assert!(Arc::ptr_eq(
            &context.get_shared("admin").unwrap(),
            &derived.get_shared("admin").unwrap()
        ));
    }

    #[test]
    fn unknown_choice_method_is_rejected() {
        let err = ContextSelector::from_context(&users_context("first")).unwrap_err();

        assert!(matches!(err, RunnerError::InvalidContext { .. }));
    }

    #[test]
    fn missing_config_defaults_to_random() {
        let context = TaskContext::try_from(json!({"admin": {}})).unwrap();

        let selector = ContextSelector::from_context(&context).unwrap();

        assert_eq!(UserChoiceMethod::Random, selector.method());
    }
}
