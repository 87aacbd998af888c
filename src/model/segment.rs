use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::model::{CharacterHandle, Emotion, SegmentType};

/// One classified piece of a source line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub segment_index: usize,
    pub line_number: usize,
    pub text: String,
    #[serde(default)]
    pub translated_text: Option<String>,
    #[serde(default)]
    pub segment_type: SegmentType,
    #[serde(default)]
    pub speaker_hint: Option<String>,
    #[serde(default)]
    pub character: Option<CharacterHandle>,
    #[serde(default)]
    pub emotion: Emotion,
}

impl Segment {
    pub fn new(segment_index: usize, line_number: usize, text: impl Into<String>) -> Result<Self> {
        let segment = Self {
            segment_index,
            line_number,
            text: text.into(),
            translated_text: None,
            segment_type: SegmentType::default(),
            speaker_hint: None,
            character: None,
            emotion: Emotion::default(),
        };
        segment.validate()?;
        Ok(segment)
    }

    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(PipelineError::invalid_argument(format!(
                "segment {}/{} text must not be empty",
                self.line_number, self.segment_index
            )));
        }
        if let Some(character) = &self.character {
            character.snapshot().validate()?;
        }
        Ok(())
    }

    /// Sort key giving the global reading order.
    pub fn position(&self) -> (usize, usize) {
        (self.line_number, self.segment_index)
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!(self)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let segment: Self = serde_json::from_value(value).map_err(PipelineError::malformed)?;
        segment.validate()?;
        Ok(segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Character, CharacterType, Gender};

    #[test]
    fn rejects_blank_text() {
        assert!(Segment::new(0, 0, "  ").is_err());
    }

    #[test]
    fn negative_positions_do_not_deserialize() {
        let value = serde_json::json!({
            "segment_index": -1,
            "line_number": 0,
            "text": "Ele andou.",
        });
        assert!(Segment::from_value(value).is_err());
    }

    #[test]
    fn fully_populated_segment_round_trips() -> anyhow::Result<()> {
        let mut segment = Segment::new(1, 4, "\"Stop!\"")?;
        segment.translated_text = Some("\"Pare!\"".to_owned());
        segment.segment_type = SegmentType::Highlight;
        segment.speaker_hint = Some("Maria".to_owned());
        segment.emotion = Emotion::Shout;
        segment.character = Some(CharacterHandle::new(Character::new(
            "Maria",
            CharacterType::SupportingFemale,
            Gender::Female,
        )?));

        let value = segment.to_value();
        assert_eq!(value["segment_type"], "highlight");
        assert_eq!(value["character"]["name"], "Maria");
        assert_eq!(Segment::from_value(value)?, segment);
        Ok(())
    }
}
