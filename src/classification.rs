//! Lenient string-to-enum coercion for labels produced by the LLM.
//!
//! The model is an untrusted source: a label outside an enum's value set
//! never fails a request, it collapses to that enum's declared default.

use std::fmt;

use serde::{Deserialize, Deserializer, Serializer};

pub trait Classification: Copy + PartialEq + fmt::Debug + 'static {
    /// Member used when the input is missing or not in `ALL`.
    const DEFAULT: Self;
    const ALL: &'static [Self];

    fn as_str(self) -> &'static str;

    /// Trims and case-folds `raw`, then maps it onto a member or `DEFAULT`.
    fn parse_or_default(raw: &str) -> Self {
        let key = raw.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|member| member.as_str() == key)
            .unwrap_or(Self::DEFAULT)
    }

    fn values() -> Vec<&'static str> {
        Self::ALL.iter().map(|member| member.as_str()).collect()
    }

    fn is_valid(raw: &str) -> bool {
        Self::ALL.iter().any(|member| member.as_str() == raw)
    }
}

/// A classification handed to the registry either already typed or as the
/// raw label the model emitted.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationInput<T> {
    Typed(T),
    Raw(String),
}

impl<T: Classification> ClassificationInput<T> {
    pub fn resolve(&self) -> T {
        match self {
            Self::Typed(value) => *value,
            Self::Raw(raw) => T::parse_or_default(raw),
        }
    }
}

impl<T: Classification> From<T> for ClassificationInput<T> {
    fn from(value: T) -> Self {
        Self::Typed(value)
    }
}

impl<T> From<&str> for ClassificationInput<T> {
    fn from(raw: &str) -> Self {
        Self::Raw(raw.to_owned())
    }
}

impl<T> From<String> for ClassificationInput<T> {
    fn from(raw: String) -> Self {
        Self::Raw(raw)
    }
}

/// Serde `serialize_with` helper writing the canonical lower-case label.
pub fn serialize<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Classification,
{
    serializer.serialize_str(value.as_str())
}

/// Serde `deserialize_with` helper: any JSON value is accepted, anything that
/// is not a recognised string becomes `T::DEFAULT`.
pub fn deserialize_lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Classification,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(raw) => T::parse_or_default(&raw),
        _ => T::DEFAULT,
    })
}

/// Declares a lower-case string enum together with its `Classification`
/// impl, `Display`, and lenient serde support.
macro_rules! classification_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident => $label:literal),+ $(,)?
        }
        default = $default:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $crate::classification::Classification for $name {
            const DEFAULT: Self = Self::$default;
            const ALL: &'static [Self] = &[$(Self::$variant),+];

            fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                <Self as $crate::classification::Classification>::DEFAULT
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str($crate::classification::Classification::as_str(*self))
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                $crate::classification::serialize(self, serializer)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                $crate::classification::deserialize_lenient(deserializer)
            }
        }
    };
}

pub(crate) use classification_enum;
