use serde_json::{json, Map, Value};

/// The JSON type expected for a config property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    Integer,
    Number,
    String,
}

impl PropertyType {
    fn name(self) -> &'static str {
        match self {
            PropertyType::Integer => "integer",
            PropertyType::Number => "number",
            PropertyType::String => "string",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            PropertyType::Integer => value.is_i64() || value.is_u64(),
            PropertyType::Number => value.is_number(),
            PropertyType::String => value.is_string(),
        }
    }
}

/// Lower bound on a numeric property.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Minimum {
    Inclusive(f64),
    Exclusive(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropertySchema {
    pub name: &'static str,
    pub kind: PropertyType,
    pub minimum: Option<Minimum>,
    pub description: &'static str,
}

impl PropertySchema {
    pub const fn integer(name: &'static str) -> Self {
        Self::new(name, PropertyType::Integer)
    }

    pub const fn number(name: &'static str) -> Self {
        Self::new(name, PropertyType::Number)
    }

    pub const fn string(name: &'static str) -> Self {
        Self::new(name, PropertyType::String)
    }

    const fn new(name: &'static str, kind: PropertyType) -> Self {
        Self {
            name,
            kind,
            minimum: None,
            description: "",
        }
    }

    pub const fn minimum(self, minimum: f64) -> Self {
        Self {
            minimum: Some(Minimum::Inclusive(minimum)),
            ..self
        }
    }

    pub const fn exclusive_minimum(self, minimum: f64) -> Self {
        Self {
            minimum: Some(Minimum::Exclusive(minimum)),
            ..self
        }
    }

    pub const fn description(self, description: &'static str) -> Self {
        Self {
            description,
            ..self
        }
    }

    fn validate(&self, value: &Value) -> Result<(), SchemaError> {
        if !self.kind.matches(value) {
            return Err(SchemaError::WrongType {
                path: self.name.to_string(),
                expected: self.kind.name(),
            });
        }

        let (Some(minimum), Some(actual)) = (self.minimum, value.as_f64()) else {
            return Ok(());
        };

        match minimum {
            Minimum::Inclusive(minimum) if actual < minimum => Err(SchemaError::BelowMinimum {
                path: self.name.to_string(),
                minimum,
                actual,
            }),
            Minimum::Exclusive(minimum) if actual <= minimum => Err(SchemaError::NotAboveMinimum {
                path: self.name.to_string(),
                minimum,
                actual,
            }),
            _ => Ok(()),
        }
    }

    fn to_json(self) -> Value {
        let mut property = Map::new();
        property.insert("type".to_string(), json!(self.kind.name()));
        match self.minimum {
            Some(Minimum::Inclusive(minimum)) => {
                property.insert("minimum".to_string(), json!(minimum));
            }
            Some(Minimum::Exclusive(minimum)) => {
                property.insert("minimum".to_string(), json!(minimum));
                property.insert("exclusiveMinimum".to_string(), json!(true));
            }
            None => {}
        }
        if !self.description.is_empty() {
            property.insert("description".to_string(), json!(self.description));
        }
        Value::Object(property)
    }
}

/// A JSON-schema shaped description of an object config, as declared by every runner strategy.
///
/// Only the subset of JSON schema that runner configs use is supported: typed properties with an
/// optional lower bound, required properties and closing the object to additional properties.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfigSchema {
    pub properties: &'static [PropertySchema],
    pub required: &'static [&'static str],
    pub additional_properties: bool,
}

impl ConfigSchema {
    pub fn property(&self, name: &str) -> Option<&PropertySchema> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn validate(&self, config: &Value) -> Result<(), SchemaError> {
        let Some(config) = config.as_object() else {
            return Err(SchemaError::WrongType {
                path: "<config>".to_string(),
                expected: "object",
            });
        };

        if let Some(missing) = self.required.iter().find(|r| !config.contains_key(**r)) {
            return Err(SchemaError::Missing {
                path: missing.to_string(),
            });
        }

        for (key, value) in config {
            match self.property(key) {
                Some(property) => property.validate(value)?,
                None if self.additional_properties => {}
                None => {
                    return Err(SchemaError::AdditionalProperty { path: key.clone() });
                }
            }
        }

        Ok(())
    }

    /// Render the schema as a JSON schema document.
    pub fn to_json(&self) -> Value {
        let properties = self
            .properties
            .iter()
            .map(|p| (p.name.to_string(), p.to_json()))
            .collect::<Map<_, _>>();

        let mut schema = json!({
            "type": "object",
            "$schema": "http://json-schema.org/draft-04/schema",
            "properties": properties,
            "additionalProperties": self.additional_properties,
        });
        if !self.required.is_empty() {
            schema["required"] = json!(self.required);
        }
        schema
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("'{path}' is a required property")]
    Missing { path: String },
    #[error("'{path}' has the wrong type, expected {expected}")]
    WrongType { path: String, expected: &'static str },
    #[error("'{path}' must be greater than or equal to {minimum}, got {actual}")]
    BelowMinimum {
        path: String,
        minimum: f64,
        actual: f64,
    },
    #[error("'{path}' must be greater than {minimum}, got {actual}")]
    NotAboveMinimum {
        path: String,
        minimum: f64,
        actual: f64,
    },
    #[error("Additional property '{path}' is not allowed")]
    AdditionalProperty { path: String },
    #[error("'{path}' is invalid: {reason}")]
    Invalid { path: String, reason: String },
}
