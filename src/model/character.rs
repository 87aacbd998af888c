use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{PipelineError, Result};
use crate::model::{CharacterType, Gender};

/// A synthesis voice that can be bound to a character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub id: String,
    pub name: String,
    pub vendor: String,
    pub language: String,
    pub gender: Gender,
}

impl VoiceProfile {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        vendor: impl Into<String>,
        language: impl Into<String>,
        gender: Gender,
    ) -> Result<Self> {
        let profile = Self {
            id: id.into(),
            name: name.into(),
            vendor: vendor.into(),
            language: language.into(),
            gender,
        };
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("id", &self.id),
            ("name", &self.name),
            ("vendor", &self.vendor),
            ("language", &self.language),
        ] {
            if value.trim().is_empty() {
                return Err(PipelineError::invalid_argument(format!(
                    "voice profile `{field}` must not be empty"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    #[serde(rename = "type")]
    pub character_type: CharacterType,
    #[serde(default)]
    pub gender: Gender,
    #[serde(default)]
    pub voice: Option<VoiceProfile>,
}

impl Character {
    pub fn new(name: &str, character_type: CharacterType, gender: Gender) -> Result<Self> {
        let character = Self {
            name: name.trim().to_owned(),
            character_type,
            gender,
            voice: None,
        };
        character.validate()?;
        Ok(character)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PipelineError::invalid_argument(
                "character name must not be empty",
            ));
        }
        if let Some(voice) = &self.voice {
            voice.validate()?;
        }
        Ok(())
    }

    /// Binds a voice. A profile with a definite gender must match the character's.
    pub fn assign_voice(&mut self, profile: VoiceProfile) -> Result<()> {
        if profile.gender != Gender::Unknown && profile.gender != self.gender {
            return Err(PipelineError::invalid_argument(format!(
                "voice `{}` is {} but character `{}` is {}",
                profile.id, profile.gender, self.name, self.gender
            )));
        }
        tracing::debug!(character = %self.name, voice_id = %profile.id, "assign voice");
        self.voice = Some(profile);
        Ok(())
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!(self)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let character: Self = serde_json::from_value(value).map_err(PipelineError::malformed)?;
        character.validate()?;
        Ok(character)
    }
}

/// Shared reference to a registry-owned character.
///
/// Clones point at the same character, so a reclassification made through
/// the registry is visible from every segment already holding the handle.
#[derive(Clone)]
pub struct CharacterHandle(Arc<RwLock<Character>>);

impl CharacterHandle {
    pub fn new(character: Character) -> Self {
        Self(Arc::new(RwLock::new(character)))
    }

    pub fn snapshot(&self) -> Character {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn name(&self) -> String {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .name
            .clone()
    }

    pub fn character_type(&self) -> CharacterType {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .character_type
    }

    pub fn gender(&self) -> Gender {
        self.0.read().unwrap_or_else(PoisonError::into_inner).gender
    }

    /// True when both handles refer to the same registry entry.
    pub fn same_as(&self, other: &CharacterHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut Character) -> R) -> R {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl fmt::Debug for CharacterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CharacterHandle")
            .field(&self.snapshot())
            .finish()
    }
}

impl PartialEq for CharacterHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other) || self.snapshot() == other.snapshot()
    }
}

impl Serialize for CharacterHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CharacterHandle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Character::deserialize(deserializer).map(Self::new)
    }
}

impl From<Character> for CharacterHandle {
    fn from(character: Character) -> Self {
        Self::new(character)
    }
}
