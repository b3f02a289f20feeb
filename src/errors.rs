use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::models::message::Message;

/// Round-local failures of a single capability invocation.
///
/// These never abort a run: the dispatch loop records them as error-shaped
/// tool results so the model can react in the next round.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum CapabilityError {
    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    #[error("Malformed arguments for {name}: {reason}")]
    MalformedArguments { name: String, reason: String },

    #[error("Capability {name} failed: {reason}")]
    ExecutionFailed { name: String, reason: String },
}

pub type CapabilityResult<T> = Result<T, CapabilityError>;

/// Registration-time failures; fatal to setup.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Capability already registered: {0}")]
    DuplicateCapability(String),

    #[error("Invalid capability name '{0}', it must match [a-zA-Z0-9_-]{{1,64}}")]
    InvalidCapabilityName(String),

    #[error("Invalid schema for {name}: {reason}")]
    InvalidSchema { name: String, reason: String },
}

/// The point of a run at which a fatal error happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FirstRound,
    ToolExecution,
    SecondRound,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::FirstRound => write!(f, "first round"),
            Stage::ToolExecution => write!(f, "tool execution"),
            Stage::SecondRound => write!(f, "second round"),
        }
    }
}

/// Fatal failures that end a run without an answer.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Model service unavailable during {stage}: {source}")]
    ServiceUnavailable {
        stage: Stage,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("Protocol violation during {stage}: {reason}")]
    ProtocolViolation { stage: Stage, reason: String },
}

impl DispatchError {
    pub fn stage(&self) -> Stage {
        match self {
            DispatchError::ServiceUnavailable { stage, .. } => *stage,
            DispatchError::ProtocolViolation { stage, .. } => *stage,
        }
    }

    /// Short name of the error kind, for user-facing reports.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::ServiceUnavailable { .. } => "service unavailable",
            DispatchError::ProtocolViolation { .. } => "protocol violation",
        }
    }
}

/// A failed run, together with everything that was recorded before it failed.
#[derive(Error, Debug)]
#[error("Run failed: {error}")]
pub struct RunFailure {
    #[source]
    pub error: DispatchError,
    pub transcript: Vec<Message>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_error_serializes() -> anyhow::Result<()> {
        let error = CapabilityError::MalformedArguments {
            name: "lookup".to_string(),
            reason: "missing required argument 'key'".to_string(),
        };
        let value = serde_json::to_value(&error)?;
        let back: CapabilityError = serde_json::from_value(value)?;
        assert_eq!(back, error);
        assert_eq!(
            error.to_string(),
            "Malformed arguments for lookup: missing required argument 'key'"
        );
        Ok(())
    }

    #[test]
    fn test_dispatch_error_reports_stage_and_kind() {
        let error = DispatchError::ServiceUnavailable {
            stage: Stage::FirstRound,
            source: "connection refused".into(),
        };
        assert_eq!(error.stage(), Stage::FirstRound);
        assert_eq!(error.kind(), "service unavailable");
        assert_eq!(
            error.to_string(),
            "Model service unavailable during first round: connection refused"
        );

        let error = DispatchError::ProtocolViolation {
            stage: Stage::ToolExecution,
            reason: "duplicate call id 'x'".to_string(),
        };
        assert_eq!(error.stage(), Stage::ToolExecution);
        assert!(error.to_string().contains("tool execution"));
    }
}
