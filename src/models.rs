//! Data models for chat rooms, messages and notification settings
//!
//! These mirror the documents of the chat store: one `ChatRoom` per
//! (item, seller, buyer) and an append-only list of `Message`s under it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Side of a conversation a participant is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Owner of the listed item
    Seller,
    /// User who opened the chat about the item
    Buyer,
}

impl Role {
    /// The other side of the conversation
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Seller => Self::Buyer,
            Self::Buyer => Self::Seller,
        }
    }
}

/// The listing a chat room is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSummary {
    /// Listing id
    pub id: String,
    /// Listing title, used as the notification title
    pub title: String,
    /// Thumbnail URL
    pub image: Option<String>,
}

/// A chat room between the seller and one buyer of an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRoom {
    /// Derived room key, see [`crate::room::resolve_room_key`]
    pub id: String,
    pub item: ItemSummary,
    pub seller_id: String,
    pub seller_name: String,
    pub buyer_id: String,
    pub buyer_name: String,
    pub last_message: String,
    pub last_message_sender: Option<String>,
    pub last_message_id: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub seller_read: bool,
    pub buyer_read: bool,
    /// Reset to 1 on every send and to 0 on read; a flag rather than a count
    pub unread_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatRoom {
    /// A fresh room with no backlog: both sides read, no last message
    #[must_use]
    pub fn new(id: String, request: &OpenRoomRequest, now: DateTime<Utc>) -> Self {
        Self {
            id,
            item: request.item.clone(),
            seller_id: request.seller_id.clone(),
            seller_name: request.seller_name.clone(),
            buyer_id: request.buyer_id.clone(),
            buyer_name: request.buyer_name.clone(),
            last_message: String::new(),
            last_message_sender: None,
            last_message_id: None,
            last_message_at: None,
            seller_read: true,
            buyer_read: true,
            unread_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Both participant ids, seller first
    #[must_use]
    pub fn participants(&self) -> [&str; 2] {
        [self.seller_id.as_str(), self.buyer_id.as_str()]
    }

    #[must_use]
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.seller_id == user_id || self.buyer_id == user_id
    }

    /// Which side `user_id` is on, if any
    #[must_use]
    pub fn role_of(&self, user_id: &str) -> Option<Role> {
        if self.seller_id == user_id {
            Some(Role::Seller)
        } else if self.buyer_id == user_id {
            Some(Role::Buyer)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn read_flag(&self, role: Role) -> bool {
        match role {
            Role::Seller => self.seller_read,
            Role::Buyer => self.buyer_read,
        }
    }

    pub fn set_read_flag(&mut self, role: Role, read: bool) {
        match role {
            Role::Seller => self.seller_read = read,
            Role::Buyer => self.buyer_read = read,
        }
    }

    /// Apply a send by `role`: sender is read, the other side is unread and
    /// the counter is reset to exactly 1.
    pub fn record_send(&mut self, role: Role, message: &Message) {
        self.last_message = message.text.clone();
        self.last_message_sender = Some(message.sender_id.clone());
        self.last_message_id = Some(message.id.clone());
        self.last_message_at = Some(message.timestamp);
        self.set_read_flag(role, true);
        self.set_read_flag(role.other(), false);
        self.unread_count = 1;
        self.updated_at = message.timestamp;
    }

    /// Apply a read by `role`: that side is read and the counter is cleared.
    pub fn record_read(&mut self, role: Role, at: DateTime<Utc>) {
        self.set_read_flag(role, true);
        self.unread_count = 0;
        self.updated_at = at;
    }

    /// Display name of the given side
    #[must_use]
    pub fn display_name(&self, role: Role) -> &str {
        match role {
            Role::Seller => &self.seller_name,
            Role::Buyer => &self.buyer_name,
        }
    }
}

/// Input for resolving (or lazily creating) a chat room
#[derive(Debug, Clone)]
pub struct OpenRoomRequest {
    pub item: ItemSummary,
    pub seller_id: String,
    pub seller_name: String,
    pub buyer_id: String,
    pub buyer_name: String,
}

/// A stored chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Auto-generated document id
    pub id: String,
    /// Owning room key
    pub room_id: String,
    pub text: String,
    pub sender_id: String,
    pub sender_name: String,
    /// Store-assigned timestamp
    pub timestamp: DateTime<Utc>,
}

/// Data for appending a new message
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
}

/// Kind of document change delivered by a room subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Present in the initial snapshot or newly created
    Added,
    /// An existing room was updated
    Modified,
}

/// One document change from a multi-room subscription
#[derive(Debug, Clone)]
pub struct RoomChange {
    pub kind: ChangeKind,
    pub room: ChatRoom,
}

/// Server-side notification toggles for one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct NotificationSettings {
    pub chat: bool,
    pub comments: bool,
    pub marketplace: bool,
    pub jobs: bool,
    pub real_estate: bool,
    pub announcements: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            chat: true,
            comments: true,
            marketplace: true,
            jobs: true,
            real_estate: true,
            announcements: true,
        }
    }
}
