use anyhow::Context as _;
use serde_json::Value;

use crate::model::LlmMessage;

/// Turns a request payload into the messages sent to the model.
pub trait PromptTemplate: Send + Sync {
    fn build_messages(&self, payload: &Value) -> anyhow::Result<Vec<LlmMessage>>;
}

pub const DEFAULT_TARGET_LANGUAGE: &str = "Brazilian Portuguese";

/// Translation, segmentation, speaker classification and emotion detection
/// for one block of lines. The payload is sent verbatim as JSON.
#[derive(Debug, Clone)]
pub struct PipelinePrompt {
    target_language: String,
}

impl Default for PipelinePrompt {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_LANGUAGE)
    }
}

impl PipelinePrompt {
    pub fn new(target_language: impl Into<String>) -> Self {
        Self {
            target_language: target_language.into(),
        }
    }

    pub fn system_prompt(&self) -> String {
        let language = &self.target_language;
        format!(
            r#"You are an assistant specialized in literary analysis, translation, text segmentation, character classification and emotion detection.

You will receive a block of numbered lines from a literary work, each with its original text in another language.

For every line:

1. Translation
- Translate the full text into {language}, keeping the original style, natural dialogue and coherence.

2. Segmentation
- Split each translated line into distinct segments, each classified as:
  - narration: descriptive text or narration of actions and events
  - dialogue: ordinary speech by a character
  - highlight: emphatic speech (exclamations, interjections, surprise, dramatic actions)

3. Character classification
- For each dialogue or highlight segment, identify who is speaking.
- Use "Narrador" for narration and "Sistema" for automatic system messages.
- character_type: narrator | protagonist | supporting_male | supporting_female | system | unknown
- gender: male | female | unknown

4. Emotion detection
- For each segment pick one dominant emotion: neutral | joy | anger | surprise | hesitation | shout

Return a single valid JSON object with a list named "segments":
{{
  "segments": [
    {{
      "line_number": int,
      "segment_index": int,
      "original_text": str,
      "translated_text": str,
      "segment_type": "narration|dialogue|highlight",
      "speaker": str,
      "character_type": "narrator|protagonist|supporting_male|supporting_female|system|unknown",
      "gender": "male|female|unknown",
      "emotion": "neutral|joy|anger|surprise|hesitation|shout"
    }}
  ]
}}

Keep the original order of lines and segments. Never leave a field empty or null; always pick one of the listed options."#
        )
    }
}

impl PromptTemplate for PipelinePrompt {
    fn build_messages(&self, payload: &Value) -> anyhow::Result<Vec<LlmMessage>> {
        let payload = serde_json::to_string(payload).context("serialize pipeline payload")?;
        Ok(vec![
            LlmMessage::system(self.system_prompt())?,
            LlmMessage::user(payload)?,
        ])
    }
}

const SCENARIO_SYSTEM_PROMPT: &str = r#"You are an expert in literary analysis and in describing narrative settings.

You will receive the narration passages of one chapter of a literary work. Identify and describe the main settings or environments that appear in the text.

A setting is a physical or virtual place where events happen: classrooms, cities, streets, houses, fictional worlds, or elements such as weather and atmosphere.

For each setting found, provide:
- a short name for the place (for example "Classroom", "Ye Hong's Dream", "Zhicai School");
- a short description (2 to 3 sentences) with its perceptible details, style and mood;
- optionally, the names of the characters that appear in it.

Return a single valid JSON object:
{
  "scenarios": [
    {
      "index": 0,
      "text": "Description of the setting...",
      "location": "Name of the place (optional)",
      "characters": ["Ye Hong", "Zhang"]
    }
  ]
}

Do not repeat identical descriptions. Do not invent settings that are not mentioned or implied. Ignore speech or actions that add no detail about the place."#;

/// Setting extraction over a chapter's narration. The user message is the
/// payload's `narration_text`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScenarioPrompt;

impl PromptTemplate for ScenarioPrompt {
    fn build_messages(&self, payload: &Value) -> anyhow::Result<Vec<LlmMessage>> {
        let narration = payload
            .get("narration_text")
            .and_then(Value::as_str)
            .context("scenario payload has no `narration_text`")?;
        Ok(vec![
            LlmMessage::system(SCENARIO_SYSTEM_PROMPT)?,
            LlmMessage::user(narration)?,
        ])
    }
}
