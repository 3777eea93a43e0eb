//! Error types for the market-chat library.
//!
//! This module provides custom error types using `thiserror` so store, settings
//! and notification failures can be told apart by callers.

use thiserror::Error;

/// Errors that can occur in the market-chat library.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Chat room not found
    #[error("Chat room not found: {0}")]
    RoomNotFound(String),

    /// The user is not a participant of the chat room
    #[error("User {user} is not a participant of chat room {room}")]
    NotParticipant {
        /// Room key
        room: String,
        /// Offending user id
        user: String,
    },

    /// A stored room under the derived key belongs to a different
    /// item or participant pair
    #[error("Chat room {0} belongs to a different conversation")]
    RoomConflict(String),

    /// Rejected input (empty identifiers, empty message text, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Binary serialization errors
    #[error("Binary serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Local settings store errors
    #[error("Settings store error: {0}")]
    Settings(String),

    /// Notification scheduling failed
    #[error("Notification error: {0}")]
    Notification(String),

    /// A live subscription could not be established
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// General error with context
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Result with ChatError
pub type Result<T> = std::result::Result<T, ChatError>;

impl From<anyhow::Error> for ChatError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<sled::Error> for ChatError {
    fn from(err: sled::Error) -> Self {
        Self::Settings(err.to_string())
    }
}

impl ChatError {
    /// Short label used for error metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Database(_) | Self::Pool(_) => "database",
            Self::RoomNotFound(_) | Self::NotParticipant { .. } | Self::RoomConflict(_) => "room",
            Self::InvalidInput(_) => "validation",
            Self::Io(_) => "io",
            Self::InvalidConfig(_) => "config",
            Self::Serialization(_) | Self::Bincode(_) => "serialization",
            Self::Settings(_) => "settings",
            Self::Notification(_) => "notification",
            Self::Subscription(_) => "subscription",
            Self::Other(_) => "other",
        }
    }
}
