use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::model::LlmRole;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: LlmRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl LlmMessage {
    pub fn new(role: LlmRole, content: impl Into<String>) -> Result<Self> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(PipelineError::invalid_argument(format!(
                "{role} message content must not be empty"
            )));
        }
        Ok(Self {
            role,
            content,
            name: None,
        })
    }

    pub fn system(content: impl Into<String>) -> Result<Self> {
        Self::new(LlmRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Result<Self> {
        Self::new(LlmRole::User, content)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Token accounting reported by the model provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl LlmUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64, total_tokens: u64) -> Result<Self> {
        let usage = Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        };
        usage.validate()?;
        Ok(usage)
    }

    pub fn validate(&self) -> Result<()> {
        if self.prompt_tokens.checked_add(self.completion_tokens) != Some(self.total_tokens) {
            return Err(PipelineError::invalid_argument(format!(
                "total_tokens ({}) must equal prompt_tokens ({}) + completion_tokens ({})",
                self.total_tokens, self.prompt_tokens, self.completion_tokens
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    #[serde(default)]
    pub usage: Option<LlmUsage>,
    #[serde(default)]
    pub raw: Option<serde_json::Value>,
}

impl LlmResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
            raw: None,
        }
    }
}
