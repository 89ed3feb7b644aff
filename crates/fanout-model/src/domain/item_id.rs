use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons an item identifier is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("identifier is empty")]
    Empty,
    #[error("identifier contains '..'")]
    ParentTraversal,
    #[error("identifier starts with a path separator")]
    AbsolutePath,
    #[error("identifier starts with a drive letter")]
    DriveLetter,
    #[error("identifier contains invalid character {ch:?} (allowed: A-Z a-z 0-9 _ -)")]
    InvalidChar { ch: char },
}

/// Validate an item identifier for use as a single filesystem path component.
///
/// Unsafe identifiers are rejected, never rewritten: callers correlate results
/// back to their input by this exact string.
pub fn validate_id(id: &str) -> Result<&str, IdError> {
    if id.is_empty() {
        return Err(IdError::Empty);
    }
    if id.contains("..") {
        return Err(IdError::ParentTraversal);
    }
    if id.starts_with('/') || id.starts_with('\\') {
        return Err(IdError::AbsolutePath);
    }
    let mut chars = id.chars();
    if let (Some(first), Some(':')) = (chars.next(), chars.next())
        && first.is_ascii_alphabetic()
    {
        return Err(IdError::DriveLetter);
    }
    if let Some(ch) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(IdError::InvalidChar { ch });
    }
    Ok(id)
}

/// Validated identifier of a work item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        validate_id(&id)?;
        Ok(Self(id))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ItemId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> Self {
        id.0
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
