use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::context::ScenarioContext;
use crate::types::{ScenarioArgs, ScenarioResult};

pub type ScenarioMethod =
    Arc<dyn Fn(&mut ScenarioContext, &ScenarioArgs) -> ScenarioResult + Send + Sync>;

/// The builder for a scenario family.
///
/// A family groups related scenario methods that share a default context and a set of validators.
/// Methods are addressed as `<Family>.<method>`.
pub struct ScenarioFamilyBuilder {
    /// The name of the family, which must be unique within a catalog.
    name: String,
    /// Context config that is merged under the caller's `config` before a run.
    default_context: Map<String, Value>,
    /// Names of the validators for this family's arguments.
    ///
    /// These are metadata for whoever validates scenario arguments, the runner never runs them.
    validators: Vec<String>,
    methods: HashMap<String, ScenarioMethod>,
}

impl ScenarioFamilyBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            default_context: Map::new(),
            validators: Vec::new(),
            methods: HashMap::new(),
        }
    }

    /// Set the default context [ScenarioFamilyBuilder::default_context] for this family.
    pub fn with_default_context(mut self, default_context: Map<String, Value>) -> Self {
        self.default_context = default_context;
        self
    }

    /// Set the validator names [ScenarioFamilyBuilder::validators] for this family.
    pub fn with_validators<S: Into<String>>(mut self, validators: impl IntoIterator<Item = S>) -> Self {
        self.validators = validators.into_iter().map(Into::into).collect();
        self
    }

    /// Add a named scenario method to this family.
    pub fn use_method(
        mut self,
        name: &str,
        method: impl Fn(&mut ScenarioContext, &ScenarioArgs) -> ScenarioResult + Send + Sync + 'static,
    ) -> Self {
        let previous = self.methods.insert(name.to_string(), Arc::new(method));

        if previous.is_some() {
            panic!("Method [{}.{}] is already defined", self.name, name);
        }

        self
    }

    pub(crate) fn build(self) -> ScenarioFamily {
        ScenarioFamily {
            name: self.name,
            default_context: self.default_context,
            validators: self.validators,
            methods: self.methods,
        }
    }
}

pub struct ScenarioFamily {
    name: String,
    default_context: Map<String, Value>,
    validators: Vec<String>,
    methods: HashMap<String, ScenarioMethod>,
}

impl ScenarioFamily {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_context(&self) -> &Map<String, Value> {
        &self.default_context
    }

    pub fn validators(&self) -> &[String] {
        &self.validators
    }

    pub fn method(&self, name: &str) -> Option<&ScenarioMethod> {
        self.methods.get(name)
    }

    pub fn method_names(&self) -> Vec<&str> {
        let mut names = self.methods.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }
}

impl Debug for ScenarioFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioFamily")
            .field("name", &self.name)
            .field("default_context", &self.default_context)
            .field("validators", &self.validators)
            .field("methods", &self.method_names())
            .finish()
    }
}

/// A reference to one method of a scenario family.
#[derive(Debug, Clone)]
pub struct ScenarioRef {
    family: Arc<ScenarioFamily>,
    method_name: String,
}

impl ScenarioRef {
    /// Refer to a method of `family`. The method is only looked up when the scenario is invoked.
    pub fn new(family: Arc<ScenarioFamily>, method_name: &str) -> Self {
        Self {
            family,
            method_name: method_name.to_string(),
        }
    }

    pub fn family(&self) -> &Arc<ScenarioFamily> {
        &self.family
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.family.name(), self.method_name)
    }

    pub fn method(&self) -> Option<ScenarioMethod> {
        self.family.method(&self.method_name).cloned()
    }
}

#[derive(Default)]
pub struct ScenarioCatalogBuilder {
    families: HashMap<String, Arc<ScenarioFamily>>,
}

impl ScenarioCatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_family(mut self, family: ScenarioFamilyBuilder) -> Self {
        let family = family.build();
        let name = family.name().to_string();
        let previous = self.families.insert(name.clone(), Arc::new(family));

        if previous.is_some() {
            panic!("Scenario family [{}] is already defined", name);
        }

        self
    }

    pub fn build(self) -> ScenarioCatalog {
        ScenarioCatalog {
            families: self.families,
        }
    }
}

/// The scenarios a task can run, looked up by `<Family>.<method>` name.
#[derive(Debug, Default)]
pub struct ScenarioCatalog {
    families: HashMap<String, Arc<ScenarioFamily>>,
}

impl ScenarioCatalog {
    pub fn family(&self, name: &str) -> Option<&Arc<ScenarioFamily>> {
        self.families.get(name)
    }

    /// Find the scenario with the given `<Family>.<method>` name.
    pub fn resolve(&self, full_name: &str) -> Option<ScenarioRef> {
        let (family_name, method_name) = full_name.split_once('.')?;
        let family = self.families.get(family_name)?;
        family.method(method_name)?;

        Some(ScenarioRef::new(family.clone(), method_name))
    }

    pub fn scenario_names(&self) -> Vec<String> {
        let mut names = self
            .families
            .values()
            .flat_map(|family| {
                family
                    .method_names()
                    .into_iter()
                    .map(|method| format!("{}.{}", family.name(), method))
            })
            .collect::<Vec<_>>();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn catalog() -> ScenarioCatalog {
        ScenarioCatalogBuilder::new()
            .add_family(
                ScenarioFamilyBuilder::new("Dummy")
                    .with_validators(["number"])
                    .use_method("dummy", |_, _| Ok(None))
                    .use_method("failure", |_, _| anyhow::bail!("failed")),
            )
            .add_family(ScenarioFamilyBuilder::new("Other").use_method("noop", |_, _| Ok(None)))
            .build()
    }

    #[test]
    fn resolve_known_scenario() {
        let scenario = catalog().resolve("Dummy.failure").unwrap();

        assert_eq!("Dummy", scenario.family().name());
        assert_eq!("failure", scenario.method_name());
        assert_eq!("Dummy.failure", scenario.full_name());
        assert!(scenario.method().is_some());
        assert_eq!(vec!["number".to_string()], scenario.family().validators());
    }

    #[test]
    fn resolve_unknown_scenario() {
        let catalog = catalog();

        assert!(catalog.resolve("Dummy.missing").is_none());
        assert!(catalog.resolve("Missing.dummy").is_none());
        assert!(catalog.resolve("Dummy").is_none());
    }

    #[test]
    fn lists_scenarios_sorted() {
        assert_eq!(
            vec!["Dummy.dummy", "Dummy.failure", "Other.noop"],
            catalog().scenario_names()
        );
    }

    #[test]
    #[should_panic(expected = "Method [Dummy.dummy] is already defined")]
    fn duplicate_method_panics() {
        let _ = ScenarioFamilyBuilder::new("Dummy")
            .use_method("dummy", |_, _| Ok(None))
            .use_method("dummy", |_, _| Ok(None));
    }
}
