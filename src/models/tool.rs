use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Primitive argument types a capability may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Integer,
    Number,
    Boolean,
}

impl ParameterType {
    /// Whether a JSON value is acceptable for this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParameterType::String => value.is_string(),
            ParameterType::Integer => value.is_i64() || value.is_u64(),
            ParameterType::Number => value.is_number(),
            ParameterType::Boolean => value.is_boolean(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    #[serde(rename = "type")]
    pub kind: ParameterType,
    pub description: String,
}

/// JSON schema of a function signature, restricted to a flat object of
/// primitive properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: BTreeMap<String, Property>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl Default for ParameterSchema {
    fn default() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a property the model must always supply
    pub fn required<N, D>(mut self, name: N, kind: ParameterType, description: D) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        let name = name.into();
        self.required.push(name.clone());
        self.property(name, kind, description)
    }

    /// Declare a property the model may leave out
    pub fn optional<N, D>(self, name: N, kind: ParameterType, description: D) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        self.property(name.into(), kind, description)
    }

    fn property<D: Into<String>>(mut self, name: String, kind: ParameterType, description: D) -> Self {
        self.properties.insert(
            name,
            Property {
                kind,
                description: description.into(),
            },
        );
        self
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }
}

/// The declaration of a capability as it is advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// The name of the tool
    pub name: String,
    /// A description of what the tool does
    pub description: String,
    /// Parameters that the tool accepts
    pub parameters: ParameterSchema,
}

impl ToolDeclaration {
    pub fn new<N, D>(name: N, description: D, parameters: ParameterSchema) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        ToolDeclaration {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}
