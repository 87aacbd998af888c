use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::model::{Line, Segment, SegmentType};

/// A narrative setting detected in a chapter's narration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub index: usize,
    pub text: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub characters: Vec<String>,
}

impl Scenario {
    pub fn new(index: usize, text: impl Into<String>) -> Result<Self> {
        let scenario = Self {
            index,
            text: text.into(),
            location: None,
            characters: Vec::new(),
        };
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(PipelineError::invalid_argument(format!(
                "scenario {} text must not be empty",
                self.index
            )));
        }
        Ok(())
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!(self)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let scenario: Self = serde_json::from_value(value).map_err(PipelineError::malformed)?;
        scenario.validate()?;
        Ok(scenario)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub work_id: String,
    pub title: String,
    #[serde(default)]
    pub lines: Vec<Line>,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
}

impl Chapter {
    pub fn new(
        id: impl Into<String>,
        work_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self> {
        let chapter = Self {
            id: id.into(),
            work_id: work_id.into(),
            title: title.into(),
            lines: Vec::new(),
            scenarios: Vec::new(),
        };
        chapter.validate()?;
        Ok(chapter)
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("id", &self.id),
            ("work_id", &self.work_id),
            ("title", &self.title),
        ] {
            if value.trim().is_empty() {
                return Err(PipelineError::invalid_argument(format!(
                    "chapter `{field}` must not be empty"
                )));
            }
        }
        for line in &self.lines {
            line.validate()?;
        }
        for scenario in &self.scenarios {
            scenario.validate()?;
        }
        Ok(())
    }

    pub fn add_line(&mut self, line: Line) -> Result<()> {
        line.validate()?;
        self.lines.push(line);
        Ok(())
    }

    pub fn add_scenario(&mut self, scenario: Scenario) -> Result<()> {
        scenario.validate()?;
        self.scenarios.push(scenario);
        Ok(())
    }

    /// Segments of every line, in line order.
    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.lines.iter().flat_map(|line| line.segments.iter())
    }

    /// Translated narration of the whole chapter, one segment per line.
    pub fn narration_text(&self) -> String {
        self.segments()
            .filter(|segment| segment.segment_type == SegmentType::Narration)
            .map(|segment| segment.translated_text.as_deref().unwrap_or_default())
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_owned()
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!(self)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let chapter: Self = serde_json::from_value(value).map_err(PipelineError::malformed)?;
        chapter.validate()?;
        Ok(chapter)
    }
}
