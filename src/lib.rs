//! Market Chat - chat rooms and local notifications for a classifieds app
//!
//! The chat core of a marketplace client: one room per item and buyer, live
//! message streams, unread bookkeeping and a notification policy that keeps
//! alerts away from the room the user is looking at.
//!
//! # Features
//!
//! - Deterministic room keys and get-or-create resolution
//! - SQLite-backed store with live, cancel-on-drop subscriptions
//! - Unread state tracking per viewer
//! - Notification suppression shared by the chat screen and a single
//!   app-wide listener
//! - Typed, versioned local notification preferences

/// Configuration management
pub mod config;
/// SQLite chat store
pub mod db;
/// Notification delivery shared by both observers
pub mod dispatcher;
/// Error types
pub mod error;
/// App-wide room listener
pub mod listener;
/// Logging setup and utilities
pub mod logging;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Notification policy and scheduling seam
pub mod notification;
/// Chat room identity
pub mod room;
/// Database schema definitions
pub mod schema;
/// Chat service facade
pub mod service;
/// Open room sessions
pub mod session;
/// Local notification preferences
pub mod settings;
/// Chat store abstraction
pub mod store;
/// Live subscription handles
pub mod subscription;
/// Input validation and sanitization
pub mod validation;
/// Viewing state
pub mod viewing;

// Re-export key components for easier access
pub use db::Database;
pub use error::{ChatError, Result};
pub use listener::{AuthState, GlobalListener};
pub use models::{ChatRoom, ItemSummary, Message, OpenRoomRequest, Role};
pub use room::resolve_room_key;
pub use service::ChatService;
pub use store::ChatStore;
