use std::fmt;

/// A draft or status payload was rejected before any backend call.
///
/// The display text is what the user gets to see.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl fmt::Display) -> Self {
        Self {
            message: message.to_string(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Trimmed value of a required text field, or `message` when it is blank.
pub fn require(value: &str, message: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ValidationError::new(message))
    } else {
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_trims_and_rejects_blank() {
        assert_eq!(require("  Gin ", "x").unwrap(), "Gin");
        let err = require(" \t\n", "Product name is required.").unwrap_err();
        assert_eq!(err.to_string(), "Product name is required.");
    }
}
