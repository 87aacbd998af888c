use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::model::Chapter;

pub const UNDETERMINED_LANGUAGE: &str = "und";

fn undetermined_language() -> String {
    UNDETERMINED_LANGUAGE.to_owned()
}

/// A work (book, web novel, manhua...) and the chapters processed for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaWork {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default = "undetermined_language")]
    pub original_language: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

impl MediaWork {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Result<Self> {
        let work = Self {
            id: id.into(),
            title: title.into(),
            author: None,
            original_language: undetermined_language(),
            description: None,
            chapters: Vec::new(),
        };
        work.validate()?;
        Ok(work)
    }

    /// Identity fields are non-blank and every chapter belongs to this work.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(PipelineError::invalid_argument("work `id` must not be empty"));
        }
        if self.title.trim().is_empty() {
            return Err(PipelineError::invalid_argument("work `title` must not be empty"));
        }
        for chapter in &self.chapters {
            self.check_owner(chapter)?;
            chapter.validate()?;
        }
        Ok(())
    }

    pub fn add_chapter(&mut self, chapter: Chapter) -> Result<()> {
        self.check_owner(&chapter)?;
        chapter.validate()?;
        tracing::debug!(work_id = %self.id, chapter_id = %chapter.id, "add chapter");
        self.chapters.push(chapter);
        Ok(())
    }

    fn check_owner(&self, chapter: &Chapter) -> Result<()> {
        if chapter.work_id != self.id {
            return Err(PipelineError::invalid_argument(format!(
                "chapter `{}` belongs to work `{}`, not `{}`",
                chapter.id, chapter.work_id, self.id
            )));
        }
        Ok(())
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!(self)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let work: Self = serde_json::from_value(value).map_err(PipelineError::malformed)?;
        work.validate()?;
        Ok(work)
    }
}
