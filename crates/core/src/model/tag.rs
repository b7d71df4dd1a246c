use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Label for the competency a question exercises (e.g. `fractions`).
///
/// Trimmed and non-empty. Tags compare case-sensitively; generators are expected
/// to emit a stable spelling per skill.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SkillTag(String);

impl SkillTag {
    /// Create a validated skill tag.
    ///
    /// # Errors
    ///
    /// Returns `TagError::EmptyName` if the name is empty after trimming.
    pub fn new(value: impl Into<String>) -> Result<Self, TagError> {
        let raw = value.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TagError::EmptyName);
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SkillTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for SkillTag {
    type Error = TagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SkillTag> for String {
    fn from(tag: SkillTag) -> Self {
        tag.0
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TagError {
    #[error("skill tag cannot be empty")]
    EmptyName,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_is_trimmed() {
        let tag = SkillTag::new(" fractions ").unwrap();
        assert_eq!(tag.as_str(), "fractions");
    }

    #[test]
    fn empty_tag_is_rejected() {
        assert_eq!(SkillTag::new("\t").unwrap_err(), TagError::EmptyName);
        assert!(serde_json::from_str::<SkillTag>("\"\"").is_err());
    }
}
