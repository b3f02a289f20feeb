use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::models::message::Message;
use crate::models::tool::ToolDeclaration;
use crate::providers::base::{Provider, Usage};
use crate::providers::utils::MalformedResponseError;

/// One scripted reply of a [`MockProvider`]
#[derive(Debug, Clone)]
pub enum MockResponse {
    Message(Message),
    /// Fail as if the service could not be reached
    Unavailable(String),
    /// Fail as if the service answered with an unreadable body
    Malformed(String),
}

impl From<Message> for MockResponse {
    fn from(message: Message) -> Self {
        MockResponse::Message(message)
    }
}

/// What the provider was asked for on one call
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDeclaration>,
}

/// A mock provider that returns pre-configured responses for testing
#[derive(Debug, Default)]
pub struct MockProvider {
    responses: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new<R: Into<MockResponse>>(responses: Vec<R>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request received so far, oldest first
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Provider for MockProvider {
    fn from_env() -> Result<Self> {
        Ok(Self::default())
    }

    fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolDeclaration],
    ) -> Result<(Message, Usage)> {
        self.requests
            .lock()
            .map_err(|_| anyhow!("mock provider lock poisoned"))?
            .push(RecordedRequest {
                system: system.to_string(),
                messages: messages.to_vec(),
                tools: tools.to_vec(),
            });

        let next = self
            .responses
            .lock()
            .map_err(|_| anyhow!("mock provider lock poisoned"))?
            .pop_front();

        match next {
            Some(MockResponse::Message(message)) => Ok((message, Usage::default())),
            Some(MockResponse::Unavailable(reason)) => Err(anyhow!(reason)),
            Some(MockResponse::Malformed(reason)) => Err(MalformedResponseError(reason).into()),
            // Return empty response if no more pre-configured responses
            None => Ok((Message::assistant("")?, Usage::default())),
        }
    }
}
