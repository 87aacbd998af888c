use std::collections::HashMap;

use crate::classification::ClassificationInput;
use crate::error::{PipelineError, Result};
use crate::model::{Character, CharacterHandle, CharacterType, Gender};

/// Name-keyed store of the speakers seen during one processing run.
///
/// Keys are the trimmed, lower-cased name, so "Zhang", " zhang " and
/// "ZHANG" all resolve to one character. The first spelling seen is kept as
/// the display name.
#[derive(Debug, Default)]
pub struct CharacterRegistry {
    by_key: HashMap<String, CharacterHandle>,
    order: Vec<CharacterHandle>,
}

impl CharacterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, name: &str) -> Result<CharacterHandle> {
        let key = normalize_key(name);
        if key.is_empty() {
            return Err(PipelineError::invalid_argument(
                "character name must not be empty",
            ));
        }

        if let Some(existing) = self.by_key.get(&key) {
            return Ok(existing.clone());
        }

        let handle = CharacterHandle::new(Character::new(
            name,
            CharacterType::Unknown,
            Gender::Unknown,
        )?);
        tracing::debug!(name = name.trim(), "register character");
        self.by_key.insert(key, handle.clone());
        self.order.push(handle.clone());
        Ok(handle)
    }

    /// Resolves `name` and overwrites its classification with the latest one.
    ///
    /// Raw labels outside the enum value sets become `unknown`; only an empty
    /// name is an error.
    pub fn upsert(
        &mut self,
        name: &str,
        character_type: impl Into<ClassificationInput<CharacterType>>,
        gender: impl Into<ClassificationInput<Gender>>,
    ) -> Result<CharacterHandle> {
        let handle = self.get_or_create(name)?;
        let character_type = character_type.into().resolve();
        let gender = gender.into().resolve();

        handle.update(|character| {
            if character.character_type != character_type || character.gender != gender {
                tracing::debug!(
                    name = %character.name,
                    from_type = %character.character_type,
                    to_type = %character_type,
                    from_gender = %character.gender,
                    to_gender = %gender,
                    "reclassify character"
                );
            }
            character.character_type = character_type;
            character.gender = gender;
        });

        Ok(handle)
    }

    /// Every character created so far, in creation order.
    pub fn list(&self) -> Vec<CharacterHandle> {
        self.order.clone()
    }

    pub fn exists(&self, name: &str) -> bool {
        let key = normalize_key(name);
        !key.is_empty() && self.by_key.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Owned copies of the current characters, for writing out.
    pub fn snapshot(&self) -> Vec<Character> {
        self.order.iter().map(CharacterHandle::snapshot).collect()
    }
}

fn normalize_key(name: &str) -> String {
    name.trim().to_lowercase()
}
