use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::model::Segment;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub original_text: String,
    #[serde(default)]
    pub translated_text: Option<String>,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default = "Line::unassigned")]
    pub line_number: i64,
}

impl Line {
    pub const UNASSIGNED: i64 = -1;

    fn unassigned() -> i64 {
        Self::UNASSIGNED
    }

    pub fn new(line_number: i64, original_text: impl Into<String>) -> Result<Self> {
        let line = Self {
            original_text: original_text.into(),
            translated_text: None,
            segments: Vec::new(),
            line_number,
        };
        line.validate()?;
        Ok(line)
    }

    pub fn validate(&self) -> Result<()> {
        if self.original_text.trim().is_empty() {
            return Err(PipelineError::invalid_argument(
                "line original_text must not be empty",
            ));
        }
        if self.line_number < Self::UNASSIGNED {
            return Err(PipelineError::invalid_argument(format!(
                "line_number must be >= -1, got {}",
                self.line_number
            )));
        }
        for segment in &self.segments {
            segment.validate()?;
        }
        Ok(())
    }

    /// The line's position in its source file, if one was assigned.
    pub fn position(&self) -> Option<usize> {
        usize::try_from(self.line_number).ok()
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!(self)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let line: Self = serde_json::from_value(value).map_err(PipelineError::malformed)?;
        line.validate()?;
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Emotion, SegmentType};

    #[test]
    fn validates_text_and_sentinel() {
        assert!(Line::new(0, "   ").is_err());
        assert!(Line::new(-2, "text").is_err());

        let line = Line::new(Line::UNASSIGNED, "text").expect("sentinel is allowed");
        assert_eq!(line.position(), None);
        assert_eq!(Line::new(7, "text").expect("valid").position(), Some(7));
    }

    #[test]
    fn missing_line_number_reads_as_unassigned() -> anyhow::Result<()> {
        let line = Line::from_value(serde_json::json!({ "original_text": "He walked." }))?;
        assert_eq!(line.line_number, Line::UNASSIGNED);
        assert!(line.segments.is_empty());
        Ok(())
    }

    #[test]
    fn fully_populated_line_round_trips() -> anyhow::Result<()> {
        let mut segment = Segment::new(0, 3, "He walked.")?;
        segment.translated_text = Some("Ele andou.".to_owned());
        segment.segment_type = SegmentType::Narration;
        segment.emotion = Emotion::Neutral;

        let mut line = Line::new(3, "He walked.")?;
        line.translated_text = Some("Ele andou.".to_owned());
        line.segments.push(segment);

        assert_eq!(Line::from_value(line.to_value())?, line);
        Ok(())
    }
}
