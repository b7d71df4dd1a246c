use thiserror::Error;

/// A stage payload that does not match its declared shape.
///
/// `field` is a path into the payload (e.g. `questions[2].options`), `expected`
/// describes the shape the field should have had.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("schema violation at `{field}`: expected {expected}")]
pub struct SchemaViolation {
    pub field: String,
    pub expected: String,
}

impl SchemaViolation {
    #[must_use]
    pub fn new(field: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            expected: expected.into(),
        }
    }

    /// Prefix the field path, used when a nested item fails validation.
    #[must_use]
    pub fn within(self, parent: &str) -> Self {
        Self {
            field: format!("{parent}.{}", self.field),
            expected: self.expected,
        }
    }
}

/// Reject blank text fields with a uniform violation.
pub(crate) fn require_text(field: &str, value: &str) -> Result<(), SchemaViolation> {
    if value.trim().is_empty() {
        return Err(SchemaViolation::new(field, "non-empty text"));
    }
    Ok(())
}
