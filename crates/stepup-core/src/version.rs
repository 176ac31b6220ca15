use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use anyhow::{anyhow, Result};
use serde::{de, Deserialize, Deserializer, Serialize};

/// Opaque, order-comparable version token.
///
/// Integer-like tokens (ASCII digits only) compare numerically and sort before
/// every other token; anything else compares lexicographically. Leading zeros
/// are not significant, so `"02500"` and `"2500"` are the same version.
///
/// Tokens are stored trimmed. Deserialization goes through [`Version::parse`].
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(anyhow!("invalid version: must not be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Version recorded for a member that has never been upgraded.
    pub fn initial() -> Self {
        Self("0".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_initial(&self) -> bool {
        self.numeric_digits() == Some("")
    }

    // Significant digits of an integer-like token, `None` otherwise.
    fn numeric_digits(&self) -> Option<&str> {
        if !self.0.is_empty() && self.0.bytes().all(|byte| byte.is_ascii_digit()) {
            Some(self.0.trim_start_matches('0'))
        } else {
            None
        }
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::initial()
    }
}

// Infallible conversions trim like `parse`; a blank token is the initial version.
impl From<&str> for Version {
    fn from(value: &str) -> Self {
        Self::parse(value).unwrap_or_default()
    }
}

impl From<String> for Version {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(de::Error::custom)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric_digits(), other.numeric_digits()) {
            (Some(left), Some(right)) => left
                .len()
                .cmp(&right.len())
                .then_with(|| left.cmp(right)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.numeric_digits() {
            Some(digits) => {
                0_u8.hash(state);
                digits.hash(state);
            }
            None => {
                1_u8.hash(state);
                self.0.hash(state);
            }
        }
    }
}
