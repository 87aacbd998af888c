use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use unicode_normalization::UnicodeNormalization as _;

use crate::error::{PipelineError, Result};

pub const DEFAULT_LANGUAGE: &str = "zh-CN";
pub const DEFAULT_AUTHOR: &str = "Desconhecido";

/// `metadata.json` of a registered work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkMetadata {
    pub title: String,
    #[serde(default = "default_language")]
    pub original_language: String,
    #[serde(default = "default_author")]
    pub author: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_owned()
}

fn default_author() -> String {
    DEFAULT_AUTHOR.to_owned()
}

impl WorkMetadata {
    pub fn new(title: impl Into<String>) -> Result<Self> {
        let title = title.into().trim().to_owned();
        if title.is_empty() {
            return Err(PipelineError::invalid_argument("work title must not be empty"));
        }
        Ok(Self {
            title,
            original_language: default_language(),
            author: default_author(),
            tags: Vec::new(),
        })
    }

    /// Identifier derived from the title; see [`normalize_work_id`].
    pub fn work_id(&self) -> Result<String> {
        normalize_work_id(&self.title)
    }
}

/// Slug for a work title: accents stripped, ASCII lower-case, every run of
/// other characters collapsed to `_`.
pub fn normalize_work_id(title: &str) -> Result<String> {
    let folded = ascii_fold(title).to_ascii_lowercase();

    let mut slug = String::with_capacity(folded.len());
    let mut pending_sep = false;
    for c in folded.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(c);
        } else {
            pending_sep = true;
        }
    }

    if slug.is_empty() {
        return Err(PipelineError::invalid_argument(format!(
            "title {title:?} has no ASCII letters or digits to build a work id from"
        )));
    }
    Ok(slug)
}

/// Accepts only ids that [`normalize_work_id`] could have produced, so a work
/// id never names anything outside its own directories.
pub fn validate_work_id(work_id: &str) -> Result<&str> {
    match normalize_work_id(work_id) {
        Ok(normalized) if normalized == work_id => Ok(work_id),
        _ => Err(PipelineError::invalid_argument(format!(
            "invalid work id {work_id:?}: expected lower-case ASCII letters, digits and `_`"
        ))),
    }
}

/// Zero-padded chapter id, e.g. `5` -> `"005"`.
pub fn format_chapter_id(index: u32) -> String {
    format!("{index:03}")
}

/// Keeps `[A-Za-z0-9._-]`; everything else becomes `_`.
pub fn safe_filename(name: &str) -> String {
    ascii_fold(name)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Hex sha-256 of `text`.
pub fn checksum(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

fn ascii_fold(text: &str) -> String {
    text.nfkd().filter(char::is_ascii).collect()
}
