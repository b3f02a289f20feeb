use serde_json::{Map, Value};
use std::any::Any;
use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};

use crate::errors::{CapabilityError, CapabilityResult};
use crate::models::tool::{ParameterSchema, ToolDeclaration};

/// Named arguments handed to a capability handler
pub type Arguments = Map<String, Value>;

/// The function that powers a capability
pub type Handler = Box<dyn Fn(&Arguments) -> anyhow::Result<Value> + Send + Sync>;

/// A locally-defined function the model can ask to run.
pub struct Capability {
    declaration: ToolDeclaration,
    handler: Handler,
}

impl Capability {
    pub fn new<N, D>(
        name: N,
        description: D,
        parameters: ParameterSchema,
        handler: impl Fn(&Arguments) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Capability {
            declaration: ToolDeclaration::new(name, description, parameters),
            handler: Box::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.declaration.name
    }

    pub fn description(&self) -> &str {
        &self.declaration.description
    }

    pub fn parameters(&self) -> &ParameterSchema {
        &self.declaration.parameters
    }

    pub fn declaration(&self) -> &ToolDeclaration {
        &self.declaration
    }

    /// Run the handler, turning an error return or a panic into
    /// [`CapabilityError::ExecutionFailed`].
    ///
    /// The process panic hook still runs before the panic is caught, so
    /// binaries that draw to the terminal should install a quiet hook.
    pub fn call(&self, arguments: &Arguments) -> CapabilityResult<Value> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.handler)(arguments))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CapabilityError::ExecutionFailed {
                name: self.name().to_string(),
                reason: format!("{:#}", e),
            }),
            Err(payload) => Err(CapabilityError::ExecutionFailed {
                name: self.name().to_string(),
                reason: format!("handler panicked: {}", panic_message(&*payload)),
            }),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability")
            .field("name", &self.declaration.name)
            .field("description", &self.declaration.description)
            .field("parameters", &self.declaration.parameters)
            .field("handler", &"<function>")
            .finish()
    }
}
