use std::sync::Arc;

use crate::error::{PipelineError, Result};
use crate::llm::{LlmClient, SamplingParams};
use crate::model::{Chapter, Scenario};
use crate::prompt::PromptTemplate;
use crate::response;

const RESPONSE_LOG_CHARS: usize = 200;

/// Describes the settings of a chapter from its translated narration with a
/// single LLM call.
pub struct ScenarioExtractor {
    client: Arc<dyn LlmClient>,
    template: Arc<dyn PromptTemplate>,
    sampling: SamplingParams,
}

impl ScenarioExtractor {
    pub fn new(client: Arc<dyn LlmClient>, template: Arc<dyn PromptTemplate>) -> Self {
        Self {
            client,
            template,
            sampling: SamplingParams::default(),
        }
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    /// Scenarios in the order the model reported them. A chapter without
    /// narration yields none and makes no call.
    pub async fn extract(&self, chapter: &Chapter) -> Result<Vec<Scenario>> {
        let narration_text = chapter.narration_text();
        if narration_text.is_empty() {
            tracing::warn!(chapter_id = %chapter.id, "no narration in chapter; skipping scenario extraction");
            return Ok(Vec::new());
        }

        tracing::info!(
            chapter_id = %chapter.id,
            chars = narration_text.chars().count(),
            "extract scenarios"
        );
        let payload = serde_json::json!({ "narration_text": narration_text });
        let messages = self
            .template
            .build_messages(&payload)
            .map_err(|err| PipelineError::llm(err.context("build prompt messages")))?;
        let reply = self
            .client
            .chat(&messages, &self.sampling)
            .await
            .map_err(PipelineError::llm)?;
        tracing::debug!(
            chapter_id = %chapter.id,
            response = response::preview(&reply.text, RESPONSE_LOG_CHARS),
            "llm response"
        );

        let scenarios = response::parse_scenarios(&reply.text)?;
        tracing::info!(chapter_id = %chapter.id, scenarios = scenarios.len(), "scenarios extracted");
        Ok(scenarios)
    }
}
