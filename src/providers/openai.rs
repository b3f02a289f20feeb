use anyhow::{anyhow, Result};
use reqwest::blocking::Client; // we are using blocking API here to make sync calls
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::debug;

use super::{
    base::{Provider, Usage},
    configs::{OpenAiProviderConfig, ProviderConfig},
    utils::{
        check_openai_context_length_error, messages_to_openai_spec, openai_response_to_message,
        tools_to_openai_spec, MalformedResponseError,
    },
};
use crate::models::{message::Message, tool::ToolDeclaration};

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn get_usage(data: &Value) -> Usage {
        let Some(usage) = data.get("usage") else {
            return Usage::default();
        };

        let input_tokens = token_count(usage, "prompt_tokens");
        let output_tokens = token_count(usage, "completion_tokens");
        let total_tokens = token_count(usage, "total_tokens").or_else(|| {
            match (input_tokens, output_tokens) {
                (Some(input), Some(output)) => Some(input.saturating_add(output)),
                _ => None,
            }
        });

        Usage::new(input_tokens, output_tokens, total_tokens)
    }

    fn build_payload(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolDeclaration],
    ) -> Result<Value> {
        let mut messages_array = Vec::new();
        if !system.is_empty() {
            messages_array.push(json!({
                "role": "system",
                "content": system
            }));
        }
        messages_array.extend(messages_to_openai_spec(messages));

        let mut payload = json!({
            "model": self.config.model,
            "messages": messages_array
        });

        let tools_spec = tools_to_openai_spec(tools)?;
        if !tools_spec.is_empty() {
            payload["tools"] = json!(tools_spec);
            payload["tool_choice"] = json!("auto");
        }
        if let Some(temp) = self.config.temperature {
            payload["temperature"] = json!(temp);
        }

        Ok(payload)
    }

    fn post(&self, payload: Value) -> Result<Value> {
        let url = self.config.completions_url();
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&payload)
            .send()?;

        match response.status() {
            StatusCode::OK => {
                // a failed read stays a transport error; only an unparsable body is malformed
                let body = response.text()?;
                serde_json::from_str::<Value>(&body).map_err(|e| {
                    anyhow::Error::from(MalformedResponseError(format!(
                        "response body is not JSON: {}",
                        e
                    )))
                })
            }
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(anyhow!("Server error: {}", status))
            }
            status => {
                // Compatible servers put the reason in an `error` object; keep it if present
                let body: Value = response.json().unwrap_or(Value::Null);
                match body.get("error") {
                    Some(error) => Err(anyhow!("Request failed: {}: {}", status, error)),
                    None => Err(anyhow!("Request failed: {}", status)),
                }
            }
        }
    }
}

/// Counts beyond `i32::MAX` are clamped; negative or non-integer counts are dropped.
fn token_count(usage: &Value, key: &str) -> Option<i32> {
    usage
        .get(key)
        .and_then(|v| v.as_u64())
        .map(|v| i32::try_from(v).unwrap_or(i32::MAX))
}

impl Provider for OpenAiProvider {
    fn from_env() -> Result<Self> {
        let config = OpenAiProviderConfig::from_env()?;
        Self::new(config)
    }

    fn complete(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolDeclaration],
    ) -> Result<(Message, Usage)> {
        let payload = self.build_payload(system, messages, tools)?;
        debug!(model = %self.config.model, tools = tools.len(), "posting chat completion");

        let response = self.post(payload)?;

        if let Some(error) = response.get("error") {
            if messages.len() == 1 {
                if let Some(err) = check_openai_context_length_error(error) {
                    return Err(err.into());
                }
            }
            return Err(anyhow!("OpenAI API error: {}", error));
        }

        let message = openai_response_to_message(&response)?;
        let usage = Self::get_usage(&response);

        Ok((message, usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tool::{ParameterSchema, ParameterType};
    use crate::providers::utils::InitialMessageTooLargeError;
    use std::time::Duration;
    use mockito::{Matcher, Server};

    fn provider(host: &str) -> Result<OpenAiProvider> {
        OpenAiProvider::new(OpenAiProviderConfig::new(
            "test_key".to_string(),
            host.to_string(),
            "test-model".to_string(),
        ))
    }

    fn lookup() -> ToolDeclaration {
        ToolDeclaration::new(
            "lookup",
            "Look up a key",
            ParameterSchema::new().required("key", ParameterType::String, "The key"),
        )
    }

    #[test]
    fn test_get_usage() {
        let response = json!({
            "usage": {
                "prompt_tokens": 10,
                "completion_tokens": 20,
                "total_tokens": 30
            }
        });

        let usage = OpenAiProvider::get_usage(&response);
        assert_eq!(usage, Usage::new(Some(10), Some(20), Some(30)));
    }

    #[test]
    fn test_get_usage_calculated_total() {
        let response = json!({
            "usage": {
                "prompt_tokens": 10,
                "completion_tokens": 20
            }
        });

        let usage = OpenAiProvider::get_usage(&response);
        assert_eq!(usage.total_tokens, Some(30));
    }

    #[test]
    fn test_get_usage_out_of_range_counts() {
        let response = json!({
            "usage": {
                "prompt_tokens": 10_000_000_000u64,
                "completion_tokens": -4,
                "total_tokens": "many"
            }
        });

        let usage = OpenAiProvider::get_usage(&response);
        assert_eq!(usage, Usage::new(Some(i32::MAX), None, None));
    }

    #[test]
    fn test_get_usage_missing() {
        assert_eq!(OpenAiProvider::get_usage(&json!({})), Usage::default());
    }

    #[test]
    fn test_build_payload() -> Result<()> {
        let provider = provider("http://localhost")?;
        let messages = vec![Message::user("look up A")?];

        let payload = provider.build_payload("Be brief.", &messages, &[lookup()])?;
        assert_eq!(payload["model"], "test-model");
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][1]["content"], "look up A");
        assert_eq!(payload["tools"][0]["function"]["name"], "lookup");
        assert_eq!(payload["tool_choice"], "auto");
        assert!(payload.get("temperature").is_none());

        let payload = provider.build_payload("", &messages, &[])?;
        assert_eq!(payload["messages"].as_array().map(Vec::len), Some(1));
        assert!(payload.get("tools").is_none());
        assert!(payload.get("tool_choice").is_none());
        Ok(())
    }

    #[test]
    fn test_build_payload_with_temperature() -> Result<()> {
        let config = OpenAiProviderConfig::new(
            "test_key".to_string(),
            "http://localhost".to_string(),
            "test-model".to_string(),
        )
        .with_temperature(0.25)
        .with_timeout(Duration::from_secs(5));
        assert_eq!(config.timeout, Duration::from_secs(5));

        let provider = OpenAiProvider::new(config)?;
        let payload = provider.build_payload("", &[Message::user("Hi")?], &[])?;
        assert_eq!(payload["temperature"], json!(0.25));
        Ok(())
    }

    #[test]
    fn test_complete_with_tool_calls() -> Result<()> {
        let mut server = Server::new();
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer test_key")
            .match_body(Matcher::PartialJson(json!({
                "model": "test-model",
                "tool_choice": "auto"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "choices": [{
                        "message": {
                            "role": "assistant",
                            "content": null,
                            "tool_calls": [{
                                "id": "call_9",
                                "type": "function",
                                "function": {"name": "lookup", "arguments": "{\"key\":\"A\"}"}
                            }]
                        }
                    }],
                    "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
                })
                .to_string(),
            )
            .create();

        let provider = provider(&server.url())?;
        let (message, usage) =
            provider.complete("", &[Message::user("look up A")?], &[lookup()])?;

        mock.assert();
        let requests = message.tool_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].id, "call_9");
        assert_eq!(requests[0].arguments, r#"{"key":"A"}"#);
        assert_eq!(usage.total_tokens, Some(15));
        Ok(())
    }

    #[test]
    fn test_complete_text() -> Result<()> {
        let mut server = Server::new();
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": [{"message": {"role": "assistant", "content": "Hello!"}}]}"#)
            .create();

        let provider = provider(&server.url())?;
        let (message, usage) = provider.complete("", &[Message::user("Hi")?], &[])?;

        mock.assert();
        assert_eq!(message.text(), "Hello!");
        assert_eq!(usage, Usage::default());
        Ok(())
    }

    #[test]
    fn test_complete_server_error() -> Result<()> {
        let mut server = Server::new();
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(503)
            .create();

        let provider = provider(&server.url())?;
        let err = provider
            .complete("", &[Message::user("Hi")?], &[])
            .unwrap_err();
        assert!(err.to_string().contains("Server error"));
        Ok(())
    }

    #[test]
    fn test_complete_client_error_keeps_reason() -> Result<()> {
        let mut server = Server::new();
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": {"message": "No auth credentials found", "code": 401}}"#)
            .create();

        let provider = provider(&server.url())?;
        let err = provider
            .complete("", &[Message::user("Hi")?], &[])
            .unwrap_err();
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("No auth credentials found"));
        Ok(())
    }

    #[test]
    fn test_complete_context_length_error() -> Result<()> {
        let mut server = Server::new();
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"error": {"code": "context_length_exceeded", "message": "too long"}}"#,
            )
            .create();

        let provider = provider(&server.url())?;
        let err = provider
            .complete("", &[Message::user("Hi")?], &[])
            .unwrap_err();
        assert!(err.downcast_ref::<InitialMessageTooLargeError>().is_some());
        Ok(())
    }

    #[test]
    fn test_complete_malformed_body() -> Result<()> {
        let mut server = Server::new();
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"object": "chat.completion"}"#)
            .create();

        let provider = provider(&server.url())?;
        let err = provider
            .complete("", &[Message::user("Hi")?], &[])
            .unwrap_err();
        assert!(err.downcast_ref::<MalformedResponseError>().is_some());
        Ok(())
    }

    #[test]
    fn test_complete_huge_usage_counts() -> Result<()> {
        let mut server = Server::new();
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices": [{"message": {"role": "assistant", "content": "ok"}}],
                    "usage": {"prompt_tokens": 2147483647, "completion_tokens": 5}}"#,
            )
            .create();

        let provider = provider(&server.url())?;
        let (message, usage) = provider.complete("", &[Message::user("Hi")?], &[])?;

        assert_eq!(message.text(), "ok");
        assert_eq!(usage, Usage::new(Some(i32::MAX), Some(5), Some(i32::MAX)));
        Ok(())
    }

    #[test]
    fn test_complete_non_json_body() -> Result<()> {
        let mut server = Server::new();
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("not json")
            .create();

        let provider = provider(&server.url())?;
        let err = provider
            .complete("", &[Message::user("Hi")?], &[])
            .unwrap_err();
        assert!(err.downcast_ref::<MalformedResponseError>().is_some());
        Ok(())
    }
}
