use regex::Regex;
use std::sync::LazyLock;

use crate::error::{ChatError, Result};

/// Longest identifier accepted for items and users
pub const MAX_ID_LEN: usize = 128;
/// Longest message body accepted
pub const MAX_MESSAGE_LEN: usize = 4000;

static ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[^/\s\x00-\x1f]+$").unwrap()
});

/// Validation utilities for input sanitization and edge case handling
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate an item or user identifier
    pub fn validate_id(kind: &str, id: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(ChatError::InvalidInput(format!("{kind} id cannot be empty")));
        }

        if id.len() > MAX_ID_LEN {
            return Err(ChatError::InvalidInput(format!(
                "{kind} id too long (max {MAX_ID_LEN} characters)"
            )));
        }

        // Document keys cannot contain path separators or whitespace
        if !ID_PATTERN.is_match(id) {
            return Err(ChatError::InvalidInput(format!(
                "{kind} id contains invalid characters"
            )));
        }

        Ok(())
    }

    /// Validate the seller/buyer pair of a chat room
    pub fn validate_participants(seller_id: &str, buyer_id: &str) -> Result<()> {
        Self::validate_id("seller", seller_id)?;
        Self::validate_id("buyer", buyer_id)?;

        if seller_id == buyer_id {
            return Err(ChatError::InvalidInput(
                "seller and buyer must be different users".to_string(),
            ));
        }

        Ok(())
    }

    /// Sanitize text input
    #[must_use]
    pub fn sanitize_text(text: &str) -> String {
        text.chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
            .collect::<String>()
            .trim()
            .to_string()
    }

    /// Sanitize and validate a message body, returning the text to store
    pub fn validate_message_text(text: &str) -> Result<String> {
        let cleaned = Self::sanitize_text(text);

        if cleaned.is_empty() {
            return Err(ChatError::InvalidInput("Message cannot be empty".to_string()));
        }

        if cleaned.chars().count() > MAX_MESSAGE_LEN {
            return Err(ChatError::InvalidInput(format!(
                "Message too long (max {MAX_MESSAGE_LEN} characters)"
            )));
        }

        Ok(cleaned)
    }

    /// Validate database URL
    pub fn validate_database_url(url: &str) -> Result<()> {
        if url.trim().is_empty() {
            return Err(ChatError::InvalidConfig("Database URL cannot be empty".to_string()));
        }

        if !url.starts_with("sqlite:") && url != ":memory:" {
            return Err(ChatError::InvalidConfig(
                "Only SQLite databases are supported".to_string(),
            ));
        }

        Ok(())
    }
}
