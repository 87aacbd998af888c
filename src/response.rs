//! Schema and validation for the JSON the model returns.
//!
//! Only two things fail a whole response: text that is not JSON
//! (`MalformedResponse`) and a top-level shape that is not an object holding a
//! list under the expected key (`SchemaViolation`). Classification fields
//! inside a record are coerced to defaults instead.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{PipelineError, Result};
use crate::model::{CharacterType, Emotion, Gender, Scenario, Segment, SegmentType};

/// Speaker assumed when a record names none.
pub const DEFAULT_SPEAKER: &str = "Narrador";

/// One segment as the model reported it, after lenient field coercion.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SegmentRecord {
    #[serde(default, deserialize_with = "lenient_index")]
    pub line_number: Option<usize>,
    #[serde(default, deserialize_with = "lenient_index")]
    pub segment_index: Option<usize>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub original_text: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub translated_text: Option<String>,
    #[serde(default)]
    pub segment_type: SegmentType,
    #[serde(default, deserialize_with = "lenient_string")]
    pub speaker: Option<String>,
    #[serde(default)]
    pub character_type: CharacterType,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default)]
    pub emotion: Emotion,
}

impl SegmentRecord {
    pub fn from_value(position: usize, value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(PipelineError::schema(format!(
                "segment record {position} is not an object"
            )));
        }
        serde_json::from_value(value).map_err(|err| {
            PipelineError::schema(format!("segment record {position}: {err}"))
        })
    }

    /// Speaker name to resolve through the registry.
    pub fn speaker(&self) -> &str {
        self.speaker
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_SPEAKER)
    }

    /// Builds the segment, leaving `character` for the registry to fill.
    pub fn to_segment(&self, position: usize) -> Result<Segment> {
        let line_number = self.line_number.ok_or_else(|| {
            PipelineError::schema(format!(
                "segment record {position} has no valid non-negative `line_number`"
            ))
        })?;
        let segment_index = self.segment_index.ok_or_else(|| {
            PipelineError::schema(format!(
                "segment record {position} has no valid non-negative `segment_index`"
            ))
        })?;

        let text = [&self.text, &self.original_text, &self.translated_text]
            .into_iter()
            .flatten()
            .find(|text| !text.trim().is_empty())
            .ok_or_else(|| {
                PipelineError::schema(format!("segment record {position} has no text"))
            })?;

        Ok(Segment {
            segment_index,
            line_number,
            text: text.clone(),
            translated_text: self.translated_text.clone(),
            segment_type: self.segment_type,
            speaker_hint: self.speaker.clone(),
            character: None,
            emotion: self.emotion,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScenarioRecord {
    #[serde(default, deserialize_with = "lenient_index")]
    pub index: Option<usize>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub characters: Vec<String>,
}

impl ScenarioRecord {
    /// `position` is the record's place in the response and stands in for a
    /// missing `index`.
    pub fn into_scenario(self, position: usize) -> Result<Scenario> {
        let text = self
            .text
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| {
                PipelineError::schema(format!("scenario record {position} has no text"))
            })?;

        Ok(Scenario {
            index: self.index.unwrap_or(position),
            text,
            location: self
                .location
                .map(|location| location.trim().to_owned())
                .filter(|location| !location.is_empty()),
            characters: self
                .characters
                .into_iter()
                .map(|name| name.trim().to_owned())
                .filter(|name| !name.is_empty())
                .collect(),
        })
    }
}

/// Parses response text as JSON.
///
/// Models sometimes wrap the object in a code fence or prose; when the whole
/// text does not parse, the outermost `{ ... }` span is tried before giving up.
pub fn parse_json(text: &str) -> Result<Value> {
    match serde_json::from_str(text) {
        Ok(value) => Ok(value),
        Err(err) => {
            if let Some(span) = json_object_span(text)
                && span.len() < text.trim().len()
                && let Ok(value) = serde_json::from_str(span)
            {
                tracing::debug!("parsed json object embedded in llm response");
                return Ok(value);
            }
            Err(PipelineError::malformed(err))
        }
    }
}

/// Raw records under `key` in a response object. An absent key is an empty list.
pub fn record_values(text: &str, key: &str) -> Result<Vec<Value>> {
    let value = parse_json(text)?;
    let Value::Object(mut object) = value else {
        return Err(PipelineError::schema(format!(
            "expected a JSON object with `{key}`, got {}",
            json_type(&value)
        )));
    };

    match object.remove(key) {
        None => {
            tracing::warn!(key, "llm response is missing its record list; treating as empty");
            Ok(Vec::new())
        }
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(PipelineError::schema(format!(
            "expected `{key}` to be a list, got {}",
            json_type(&other)
        ))),
    }
}

pub fn segment_records(values: Vec<Value>) -> Result<Vec<SegmentRecord>> {
    values
        .into_iter()
        .enumerate()
        .map(|(position, value)| SegmentRecord::from_value(position, value))
        .collect()
}

/// Full segment-response path: JSON, top-level shape, then each record.
pub fn parse_segments(text: &str) -> Result<Vec<SegmentRecord>> {
    segment_records(record_values(text, "segments")?)
}

pub fn parse_scenarios(text: &str) -> Result<Vec<Scenario>> {
    record_values(text, "scenarios")?
        .into_iter()
        .enumerate()
        .map(|(position, value)| {
            if !value.is_object() {
                return Err(PipelineError::schema(format!(
                    "scenario record {position} is not an object"
                )));
            }
            let record: ScenarioRecord = serde_json::from_value(value).map_err(|err| {
                PipelineError::schema(format!("scenario record {position}: {err}"))
            })?;
            record.into_scenario(position)
        })
        .collect()
}

/// At most `max_chars` characters of `text`, for logging raw responses.
pub(crate) fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

fn json_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

fn lenient_index<'de, D>(deserializer: D) -> std::result::Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(number) => number.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        _ => None,
    })
}

fn lenient_string_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}
