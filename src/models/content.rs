use serde::{Deserialize, Serialize};
use serde_json::Value;

// Text content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub text: String,
}

/// A function call requested by the model.
///
/// `arguments` is kept exactly as the service sent it; it is only parsed when
/// the registry binds it against the capability's parameter schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolRequest {
    pub fn new<I, N, A>(id: I, name: N, arguments: A) -> Self
    where
        I: Into<String>,
        N: Into<String>,
        A: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// The outcome of executing one [`ToolRequest`], keyed by the request's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub name: String,
    pub output: Value,
    #[serde(default)]
    pub is_error: bool,
}

// Enum to handle all content types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Content {
    Text(Text),
    ToolRequest(ToolRequest),
    ToolResult(ToolResult),
}

impl Content {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Content::Text(Text { text: text.into() })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(&text.text),
            _ => None,
        }
    }

    pub fn as_tool_request(&self) -> Option<&ToolRequest> {
        match self {
            Content::ToolRequest(request) => Some(request),
            _ => None,
        }
    }

    pub fn as_tool_result(&self) -> Option<&ToolResult> {
        match self {
            Content::ToolResult(result) => Some(result),
            _ => None,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            Content::Text(t) => format!("content:text\n{}", t.text),
            Content::ToolRequest(t) => format!(
                "content:tool_request:{}:{}\narguments:{}",
                t.id, t.name, t.arguments
            ),
            Content::ToolResult(t) => format!(
                "content:tool_result:{}:error={}\noutput:{}",
                t.tool_call_id, t.is_error, t.output
            ),
        }
    }
}
