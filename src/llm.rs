use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{LlmMessage, LlmResponse};

/// Sampling knobs passed through to the model on every call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: None,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

impl SamplingParams {
    /// Defaults for block translation/segmentation, which wants stable output.
    pub fn pipeline() -> Self {
        Self {
            temperature: 0.3,
            ..Self::default()
        }
    }
}

/// Chat-style access to a language model.
///
/// Implementations own transport concerns (auth, timeouts, retries); callers
/// treat any error as a failed invocation.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(
        &self,
        messages: &[LlmMessage],
        params: &SamplingParams,
    ) -> anyhow::Result<LlmResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_params_only_lower_temperature() {
        let pipeline = SamplingParams::pipeline();
        let default = SamplingParams::default();
        assert_eq!(pipeline.temperature, 0.3);
        assert_eq!(
            SamplingParams {
                temperature: default.temperature,
                ..pipeline
            },
            default
        );
    }
}
