use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::errors::{CapabilityError, CapabilityResult, RegistryError};
use crate::models::tool::{ParameterSchema, ToolDeclaration};
use crate::tool::{Arguments, Capability};

lazy_static! {
    static ref CAPABILITY_NAME: Regex = Regex::new(r"^[a-zA-Z0-9_-]{1,64}$").unwrap();
}

/// Lookup table from capability name to handler.
///
/// Registration order is preserved so the manifest sent to the model is
/// stable between runs.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    capabilities: Vec<Capability>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a capability. A failed registration leaves the registry unchanged.
    pub fn register(&mut self, capability: Capability) -> Result<(), RegistryError> {
        let name = capability.name().to_string();
        if !CAPABILITY_NAME.is_match(&name) {
            return Err(RegistryError::InvalidCapabilityName(name));
        }
        if self.index.contains_key(&name) {
            return Err(RegistryError::DuplicateCapability(name));
        }
        validate_schema(&name, capability.parameters())?;

        debug!(capability = %name, "registered capability");
        self.index.insert(name, self.capabilities.len());
        self.capabilities.push(capability);
        Ok(())
    }

    /// Builder-style [`register`](Self::register)
    pub fn with(mut self, capability: Capability) -> Result<Self, RegistryError> {
        self.register(capability)?;
        Ok(self)
    }

    /// Declarations of every registered capability, in registration order.
    pub fn schema_manifest(&self) -> Vec<ToolDeclaration> {
        self.capabilities
            .iter()
            .map(|c| c.declaration().clone())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.index.get(name).map(|&i| &self.capabilities[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Resolve `name`, bind the raw `arguments` payload against its schema and
    /// run the handler.
    ///
    /// Every failure comes back as a [`CapabilityError`] value; nothing here
    /// panics or propagates past the registry.
    pub fn invoke(&self, name: &str, arguments: &str) -> CapabilityResult<Value> {
        let capability = self
            .get(name)
            .ok_or_else(|| CapabilityError::UnknownCapability(name.to_string()))?;
        let bound = bind_arguments(name, capability.parameters(), arguments)?;
        capability.call(&bound)
    }
}

fn validate_schema(name: &str, schema: &ParameterSchema) -> Result<(), RegistryError> {
    if schema.schema_type != "object" {
        return Err(RegistryError::InvalidSchema {
            name: name.to_string(),
            reason: format!("schema type must be 'object', got '{}'", schema.schema_type),
        });
    }
    if let Some(missing) = schema
        .required
        .iter()
        .find(|r| !schema.properties.contains_key(*r))
    {
        return Err(RegistryError::InvalidSchema {
            name: name.to_string(),
            reason: format!("required argument '{}' is not a declared property", missing),
        });
    }
    Ok(())
}

/// Parse an untrusted payload into exactly the declared arguments.
///
/// Undeclared keys are dropped, `null` counts as absent, and declared values
/// must match their primitive type.
fn bind_arguments(name: &str, schema: &ParameterSchema, payload: &str) -> CapabilityResult<Arguments> {
    let malformed = |reason: String| CapabilityError::MalformedArguments {
        name: name.to_string(),
        reason,
    };

    let parsed = if payload.trim().is_empty() {
        Value::Object(Arguments::new())
    } else {
        serde_json::from_str::<Value>(payload)
            .map_err(|e| malformed(format!("could not parse arguments: {}", e)))?
    };
    let mut supplied = match parsed {
        Value::Object(map) => map,
        other => {
            return Err(malformed(format!(
                "arguments must be a JSON object, got {}",
                other
            )))
        }
    };

    let mut bound = Arguments::new();
    for (arg, property) in &schema.properties {
        match supplied.remove(arg) {
            None | Some(Value::Null) => {
                if schema.is_required(arg) {
                    return Err(malformed(format!("missing required argument '{}'", arg)));
                }
            }
            Some(value) => {
                if !property.kind.accepts(&value) {
                    return Err(malformed(format!(
                        "argument '{}' must be of type {:?}, got {}",
                        arg, property.kind, value
                    )));
                }
                bound.insert(arg.clone(), value);
            }
        }
    }

    if !supplied.is_empty() {
        let ignored: Vec<&String> = supplied.keys().collect();
        debug!(capability = name, ignored = ?ignored, "dropping undeclared arguments");
    }
    Ok(bound)
}
