use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

use crate::models::message::Message;
use crate::models::tool::ToolDeclaration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

fn add_counts(a: Option<i32>, b: Option<i32>) -> Option<i32> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.saturating_add(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, other: Self) {
        self.input_tokens = add_counts(self.input_tokens, other.input_tokens);
        self.output_tokens = add_counts(self.output_tokens, other.output_tokens);
        self.total_tokens = add_counts(self.total_tokens, other.total_tokens);
    }
}

/// Client for a remote chat model that supports function calling.
///
/// One call is one round: the transcript so far goes out, and the reply comes
/// back as an assistant [`Message`] holding text and/or tool requests. An
/// empty `tools` slice means no tools are offered for this round.
pub trait Provider {
    /// Create a provider instance from environment variables
    fn from_env() -> Result<Self>
    where
        Self: Sized;

    /// Generate the next message
    fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolDeclaration],
    ) -> Result<(Message, Usage)>;
}
