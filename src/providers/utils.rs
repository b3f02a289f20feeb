use anyhow::{anyhow, Result};
use serde_json::{json, Value};

use crate::models::{
    content::{Content, ToolRequest},
    message::{Message, Role},
    tool::ToolDeclaration,
};

/// Convert internal Message format to OpenAI's API message specification
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec = Vec::new();

    for message in messages {
        match message.role {
            Role::Tool => {
                for result in message.tool_results() {
                    messages_spec.push(json!({
                        "role": "tool",
                        "tool_call_id": result.tool_call_id,
                        "name": result.name,
                        "content": result.output.to_string(),
                    }));
                }
            }
            Role::User | Role::Assistant => {
                let mut converted = json!({
                    "role": message.role,
                });

                let tool_calls: Vec<Value> = message
                    .tool_requests()
                    .iter()
                    .map(|request| {
                        json!({
                            "id": request.id,
                            "type": "function",
                            "function": {
                                "name": request.name,
                                "arguments": request.arguments,
                            }
                        })
                    })
                    .collect();

                if message.has_text() {
                    converted["content"] = json!(message.text());
                } else {
                    converted["content"] = Value::Null;
                }
                if !tool_calls.is_empty() {
                    converted["tool_calls"] = json!(tool_calls);
                }
                messages_spec.push(converted);
            }
        }
    }

    messages_spec
}

/// Convert internal tool declarations to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[ToolDeclaration]) -> Result<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
            }
        }));
    }

    Ok(result)
}

/// Convert OpenAI's API response to internal Message format
pub fn openai_response_to_message(response: &Value) -> Result<Message> {
    let original = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| MalformedResponseError("response has no choices[0].message".to_string()))?;
    let mut content = Vec::new();

    if let Some(text) = original.get("content").and_then(Value::as_str) {
        content.push(Content::text(text));
    }

    if let Some(tool_calls) = original.get("tool_calls").and_then(Value::as_array) {
        for tool_call in tool_calls {
            let id = tool_call["id"].as_str().unwrap_or_default();
            let function_name = tool_call["function"]["name"].as_str().unwrap_or_default();
            // Some compatible servers send the arguments as an object rather than a string
            let arguments = match &tool_call["function"]["arguments"] {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            content.push(Content::ToolRequest(ToolRequest::new(
                id,
                function_name,
                arguments,
            )));
        }
    }

    Message::new(Role::Assistant, content)
        .map_err(|e| MalformedResponseError(e.to_string()).into())
}

#[derive(Debug, thiserror::Error)]
#[error("Input message too long. Message: {0}")]
pub struct InitialMessageTooLargeError(String);

/// The service answered, but not with something that can be read as a message
#[derive(Debug, thiserror::Error)]
#[error("Malformed response from model service: {0}")]
pub struct MalformedResponseError(pub String);

pub fn check_openai_context_length_error(error: &Value) -> Option<InitialMessageTooLargeError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(InitialMessageTooLargeError(message))
    } else {
        None
    }
}
