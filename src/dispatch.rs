//! The two-round tool-call protocol.
//!
//! Round one sends the user's question together with the registry's manifest.
//! If the model asks for tool calls they are executed in order, one result
//! message per request, and round two sends the whole transcript back without
//! any tools so the model has to answer in text. A model that asks for more
//! calls in round two is not served; its text is taken as the answer.

use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::errors::{DispatchError, RunFailure, Stage};
use crate::models::content::{Content, ToolRequest, ToolResult};
use crate::models::message::{Message, Role};
use crate::models::tool::ToolDeclaration;
use crate::providers::base::{Provider, Usage};
use crate::providers::utils::MalformedResponseError;
use crate::registry::ToolRegistry;

/// The outcome of a successful run
#[derive(Debug, Clone)]
pub struct Reply {
    pub answer: String,
    pub transcript: Vec<Message>,
    pub usage: Usage,
    /// Number of service round-trips made: 1 or 2
    pub rounds: usize,
}

impl Reply {
    /// Each executed tool request paired with the result recorded for it.
    pub fn tool_exchanges(&self) -> Vec<(ToolRequest, ToolResult)> {
        let results: Vec<ToolResult> = self
            .transcript
            .iter()
            .flat_map(|m| m.tool_results())
            .collect();

        self.transcript
            .iter()
            .flat_map(|m| m.tool_requests())
            .filter_map(|request| {
                results
                    .iter()
                    .find(|r| r.tool_call_id == request.id)
                    .map(|result| (request, result.clone()))
            })
            .collect()
    }
}

/// Drives one conversation against a model service.
///
/// An instance owns the transcript of exactly one run; [`run`](Self::run)
/// consumes it.
pub struct DispatchLoop<'a> {
    provider: &'a dyn Provider,
    registry: &'a ToolRegistry,
    system_prompt: String,
    transcript: Vec<Message>,
    usage: Usage,
    rounds: usize,
}

impl<'a> DispatchLoop<'a> {
    pub fn new(provider: &'a dyn Provider, registry: &'a ToolRegistry) -> Self {
        Self {
            provider,
            registry,
            system_prompt: String::new(),
            transcript: Vec::new(),
            usage: Usage::default(),
            rounds: 0,
        }
    }

    /// Instructions sent ahead of the conversation; omitted when empty.
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Answer `question`, calling tools if the model asks for them.
    pub fn run(mut self, question: &str) -> Result<Reply, RunFailure> {
        match self.drive(question) {
            Ok(answer) => {
                info!(rounds = self.rounds, usage = ?self.usage, "run complete");
                Ok(Reply {
                    answer,
                    transcript: self.transcript,
                    usage: self.usage,
                    rounds: self.rounds,
                })
            }
            Err(error) => {
                warn!(stage = %error.stage(), kind = error.kind(), "run failed: {}", error);
                Err(RunFailure {
                    error,
                    transcript: self.transcript,
                })
            }
        }
    }

    fn drive(&mut self, question: &str) -> Result<String, DispatchError> {
        let user = Message::user(question).map_err(|e| DispatchError::ProtocolViolation {
            stage: Stage::FirstRound,
            reason: e.to_string(),
        })?;
        self.transcript.push(user);

        let manifest = self.registry.schema_manifest();
        info!(round = 1, tools = manifest.len(), "submitting conversation");
        let first = self.complete(Stage::FirstRound, &manifest)?;

        let requests = first.tool_requests();
        if requests.is_empty() {
            let answer = first.text();
            self.transcript.push(first);
            return Ok(answer);
        }

        // Recorded before the id check so a failed run still shows what was asked
        self.transcript.push(first);
        check_call_ids(&requests)?;
        self.execute_tools(&requests)?;

        info!(round = 2, results = requests.len(), "submitting tool results");
        let second = self.complete(Stage::SecondRound, &[])?;

        let ignored = second.tool_requests().len();
        if ignored > 0 {
            warn!(ignored, "model requested more tools in the final round, ignoring them");
        }
        let final_message = final_answer(second)?;
        let answer = final_message.text();
        self.transcript.push(final_message);
        Ok(answer)
    }

    fn complete(
        &mut self,
        stage: Stage,
        tools: &[ToolDeclaration],
    ) -> Result<Message, DispatchError> {
        let (message, usage) = self
            .provider
            .complete(&self.system_prompt, &self.transcript, tools)
            .map_err(|e| classify_service_error(stage, e))?;

        self.rounds += 1;
        self.usage += usage;
        debug!(%stage, "received {}", message.summary());

        if message.role != Role::Assistant {
            return Err(DispatchError::ProtocolViolation {
                stage,
                reason: format!("expected an assistant message, got {:?}", message.role),
            });
        }
        Ok(message)
    }

    /// Run every request in order, appending one tool message per request.
    fn execute_tools(&mut self, requests: &[ToolRequest]) -> Result<(), DispatchError> {
        for request in requests {
            info!(call_id = %request.id, capability = %request.name, "invoking capability");

            let result = match self.registry.invoke(&request.name, &request.arguments) {
                Ok(output) => ToolResult {
                    tool_call_id: request.id.clone(),
                    name: request.name.clone(),
                    output,
                    is_error: false,
                },
                Err(e) => {
                    warn!(call_id = %request.id, capability = %request.name, "{}", e);
                    ToolResult {
                        tool_call_id: request.id.clone(),
                        name: request.name.clone(),
                        output: json!({ "error": e.to_string() }),
                        is_error: true,
                    }
                }
            };

            let message = Message::tool(result).map_err(|e| DispatchError::ProtocolViolation {
                stage: Stage::ToolExecution,
                reason: e.to_string(),
            })?;
            self.transcript.push(message);
        }
        Ok(())
    }
}

/// Results are matched to requests by call id, so ids must be present and
/// distinct.
fn check_call_ids(requests: &[ToolRequest]) -> Result<(), DispatchError> {
    let mut seen = HashSet::new();
    for request in requests {
        if request.id.is_empty() {
            return Err(DispatchError::ProtocolViolation {
                stage: Stage::ToolExecution,
                reason: format!("tool request for '{}' has no call id", request.name),
            });
        }
        if !seen.insert(request.id.as_str()) {
            return Err(DispatchError::ProtocolViolation {
                stage: Stage::ToolExecution,
                reason: format!("call id '{}' is used by more than one request", request.id),
            });
        }
    }
    Ok(())
}

/// Keep only the text of the last response
fn final_answer(message: Message) -> Result<Message, DispatchError> {
    if !message.has_tool_request() {
        return Ok(message);
    }
    let text: Vec<Content> = message
        .content
        .into_iter()
        .filter(|c| matches!(c, Content::Text(_)))
        .collect();
    let stripped = if text.is_empty() {
        Message::assistant("")
    } else {
        Message::new(Role::Assistant, text)
    };
    stripped.map_err(|e| DispatchError::ProtocolViolation {
        stage: Stage::SecondRound,
        reason: e.to_string(),
    })
}

fn classify_service_error(stage: Stage, error: anyhow::Error) -> DispatchError {
    if let Some(malformed) = error.downcast_ref::<MalformedResponseError>() {
        return DispatchError::ProtocolViolation {
            stage,
            reason: malformed.to_string(),
        };
    }
    DispatchError::ServiceUnavailable {
        stage,
        source: error.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tool::{ParameterSchema, ParameterType};
    use crate::providers::mock::{MockProvider, MockResponse};
    use crate::tool::Capability;

    fn echo_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry
            .register(Capability::new(
                "echo",
                "Echoes back the input",
                ParameterSchema::new().required("message", ParameterType::String, "Text"),
                |args| Ok(json!({ "echo": args["message"] })),
            ))
            .unwrap();
        registry
    }

    fn requesting(calls: &[(&str, &str, &str)]) -> Message {
        Message::new(
            Role::Assistant,
            calls
                .iter()
                .map(|(id, name, args)| Content::ToolRequest(ToolRequest::new(*id, *name, *args)))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_system_prompt_is_forwarded() {
        let registry = echo_registry();
        let provider = MockProvider::new(vec![Message::assistant("Hi").unwrap()]);

        let reply = DispatchLoop::new(&provider, &registry)
            .with_system_prompt("Be terse.")
            .run("Hello")
            .unwrap();

        assert_eq!(reply.answer, "Hi");
        assert_eq!(provider.requests()[0].system, "Be terse.");
    }

    #[test]
    fn test_duplicate_call_ids_are_a_protocol_violation() {
        let registry = echo_registry();
        let provider = MockProvider::new(vec![requesting(&[
            ("same", "echo", r#"{"message": "a"}"#),
            ("same", "echo", r#"{"message": "b"}"#),
        ])]);

        let failure = DispatchLoop::new(&provider, &registry)
            .run("Echo twice")
            .unwrap_err();

        assert!(matches!(
            failure.error,
            DispatchError::ProtocolViolation {
                stage: Stage::ToolExecution,
                ..
            }
        ));
        // user message and the offending assistant message are both kept
        assert_eq!(failure.transcript.len(), 2);
        assert_eq!(provider.call_count(), 1);
    }

    #[test]
    fn test_missing_call_id_is_a_protocol_violation() {
        let registry = echo_registry();
        let provider = MockProvider::new(vec![requesting(&[("", "echo", "{}")])]);

        let failure = DispatchLoop::new(&provider, &registry).run("Echo").unwrap_err();
        assert_eq!(failure.error.stage(), Stage::ToolExecution);
        assert!(failure.error.to_string().contains("no call id"));
    }

    #[test]
    fn test_malformed_response_is_a_protocol_violation() {
        let registry = echo_registry();
        let provider = MockProvider::new(vec![MockResponse::Malformed("no choices".into())]);

        let failure = DispatchLoop::new(&provider, &registry).run("Hi").unwrap_err();
        assert!(matches!(
            failure.error,
            DispatchError::ProtocolViolation {
                stage: Stage::FirstRound,
                ..
            }
        ));
    }

    #[test]
    fn test_final_answer_strips_tool_requests() {
        let mut content = vec![Content::text("Here you go.")];
        content.push(Content::ToolRequest(ToolRequest::new("x", "echo", "{}")));
        let message = Message::new(Role::Assistant, content).unwrap();

        let stripped = final_answer(message).unwrap();
        assert_eq!(stripped.text(), "Here you go.");
        assert!(!stripped.has_tool_request());

        let only_calls = requesting(&[("y", "echo", "{}")]);
        let stripped = final_answer(only_calls).unwrap();
        assert_eq!(stripped.text(), "");
        assert!(!stripped.has_tool_request());
    }

    #[test]
    fn test_tool_exchanges_pairs_requests_with_results() {
        let registry = echo_registry();
        let provider = MockProvider::new(vec![
            requesting(&[
                ("1", "echo", r#"{"message": "first"}"#),
                ("2", "missing", "{}"),
            ]),
            Message::assistant("Done").unwrap(),
        ]);

        let reply = DispatchLoop::new(&provider, &registry)
            .run("Go")
            .unwrap();
        let exchanges = reply.tool_exchanges();

        assert_eq!(exchanges.len(), 2);
        assert_eq!(exchanges[0].0.id, "1");
        assert_eq!(exchanges[0].1.output, json!({"echo": "first"}));
        assert_eq!(exchanges[1].0.name, "missing");
        assert!(exchanges[1].1.is_error);
    }
}
