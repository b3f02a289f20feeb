use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::content::{Content, ToolRequest, ToolResult};
use super::objectid::create_object_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// One entry of a conversation transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub id: String,
    pub created: i64,
    pub content: Vec<Content>,
}

impl Message {
    pub fn new(role: Role, content: Vec<Content>) -> Result<Self> {
        let msg = Self {
            role,
            id: create_object_id("msg"),
            created: Utc::now().timestamp(),
            content,
        };
        msg.validate()?;
        Ok(msg)
    }

    fn validate(&self) -> Result<()> {
        match self.role {
            Role::User => {
                if !self.has_text() {
                    return Err(anyhow!("User message must include Text"));
                }
                if self.has_tool_request() || self.has_tool_result() {
                    return Err(anyhow!("User message only supports Text"));
                }
            }
            Role::Assistant => {
                if !self.has_text() && !self.has_tool_request() {
                    return Err(anyhow!(
                        "Assistant message must include a Text or ToolRequest"
                    ));
                }
                if self.has_tool_result() {
                    return Err(anyhow!("Assistant message does not support ToolResult"));
                }
            }
            Role::Tool => {
                if self.content.len() != 1 || !self.has_tool_result() {
                    return Err(anyhow!("Tool message must hold exactly one ToolResult"));
                }
            }
        }
        Ok(())
    }

    pub fn user(text: &str) -> Result<Self> {
        Self::new(Role::User, vec![Content::text(text)])
    }

    pub fn assistant(text: &str) -> Result<Self> {
        Self::new(Role::Assistant, vec![Content::text(text)])
    }

    pub fn tool(result: ToolResult) -> Result<Self> {
        Self::new(Role::Tool, vec![Content::ToolResult(result)])
    }

    /// All text parts joined by newlines; empty when the message has none.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(Content::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The requested calls, in the order the model issued them.
    pub fn tool_requests(&self) -> Vec<ToolRequest> {
        self.content
            .iter()
            .filter_map(Content::as_tool_request)
            .cloned()
            .collect()
    }

    pub fn tool_results(&self) -> Vec<ToolResult> {
        self.content
            .iter()
            .filter_map(Content::as_tool_result)
            .cloned()
            .collect()
    }

    pub fn has_text(&self) -> bool {
        self.content.iter().any(|c| matches!(c, Content::Text(_)))
    }

    pub fn has_tool_request(&self) -> bool {
        self.content
            .iter()
            .any(|c| matches!(c, Content::ToolRequest(_)))
    }

    pub fn has_tool_result(&self) -> bool {
        self.content
            .iter()
            .any(|c| matches!(c, Content::ToolResult(_)))
    }

    pub fn summary(&self) -> String {
        let content_summaries: Vec<String> = self.content.iter().map(|c| c.summary()).collect();
        format!("message:{:?}\n{}", self.role, content_summaries.join("\n"))
    }
}
