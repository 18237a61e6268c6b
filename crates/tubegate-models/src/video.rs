//! Canonical video identifier.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::url::NormalizeError;

/// Length of a canonical video id.
pub const VIDEO_ID_LEN: usize = 11;

/// Base watch URL the canonical reference is rebuilt against.
const WATCH_URL_BASE: &str = "https://www.youtube.com/watch?v=";

/// A validated 11-character video id.
///
/// The only way to obtain one is through [`VideoReference::parse`] (or the
/// normalizer built on top of it), so holding a value means the id matched
/// the platform grammar `[A-Za-z0-9_-]{11}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct VideoReference(String);

impl VideoReference {
    /// Validate a bare id.
    pub fn parse(id: &str) -> Result<Self, NormalizeError> {
        if id.is_empty() {
            return Err(NormalizeError::MissingVideoId);
        }
        if !is_valid_id(id) {
            return Err(NormalizeError::InvalidVideoId);
        }
        Ok(Self(id.to_string()))
    }

    /// Get the inner id.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical watch URL for this id.
    pub fn watch_url(&self) -> String {
        format!("{}{}", WATCH_URL_BASE, self.0)
    }
}

impl fmt::Display for VideoReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for VideoReference {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Check the id grammar: exactly 11 chars of alphanumerics, hyphen, underscore.
pub(crate) fn is_valid_id(id: &str) -> bool {
    id.len() == VIDEO_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
