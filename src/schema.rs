//! Database schema definitions
//!
//! Table and column names used with rusqlite, plus the DDL applied on open.

/// Chat rooms table schema
pub mod chat_rooms {
    /// Table name
    pub const TABLE: &str = "chat_rooms";
    /// Derived room key (primary key)
    pub const ID: &str = "id";
    /// Listing id
    pub const ITEM_ID: &str = "item_id";
    /// Listing title
    pub const ITEM_TITLE: &str = "item_title";
    /// Listing thumbnail
    pub const ITEM_IMAGE: &str = "item_image";
    /// Seller user id
    pub const SELLER_ID: &str = "seller_id";
    /// Seller display name
    pub const SELLER_NAME: &str = "seller_name";
    /// Buyer user id
    pub const BUYER_ID: &str = "buyer_id";
    /// Buyer display name
    pub const BUYER_NAME: &str = "buyer_name";
    /// Cached last message text
    pub const LAST_MESSAGE: &str = "last_message";
    /// Cached last message sender id
    pub const LAST_MESSAGE_SENDER: &str = "last_message_sender";
    /// Cached last message id
    pub const LAST_MESSAGE_ID: &str = "last_message_id";
    /// Cached last message timestamp
    pub const LAST_MESSAGE_AT: &str = "last_message_at";
    /// Seller read flag
    pub const SELLER_READ: &str = "seller_read";
    /// Buyer read flag
    pub const BUYER_READ: &str = "buyer_read";
    /// Unread counter
    pub const UNREAD_COUNT: &str = "unread_count";
    /// Creation timestamp
    pub const CREATED_AT: &str = "created_at";
    /// Last update timestamp
    pub const UPDATED_AT: &str = "updated_at";
}

/// Messages table schema
pub mod messages {
    /// Table name
    pub const TABLE: &str = "messages";
    /// Insertion order, used to break timestamp ties
    pub const SEQ: &str = "seq";
    /// Message document id
    pub const ID: &str = "id";
    /// Owning room key
    pub const ROOM_ID: &str = "room_id";
    /// Message text
    pub const TEXT: &str = "text";
    /// Sender user id
    pub const SENDER_ID: &str = "sender_id";
    /// Sender display name
    pub const SENDER_NAME: &str = "sender_name";
    /// Store-assigned timestamp in milliseconds
    pub const TIMESTAMP_MS: &str = "timestamp_ms";
}

/// Per-user notification settings table schema
pub mod notification_settings {
    /// Table name
    pub const TABLE: &str = "notification_settings";
    /// User id (primary key)
    pub const USER_ID: &str = "user_id";
    /// JSON-encoded toggles
    pub const SETTINGS: &str = "settings";
}

/// DDL applied when a database is opened
pub const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS chat_rooms (
    id TEXT PRIMARY KEY,
    item_id TEXT NOT NULL,
    item_title TEXT NOT NULL,
    item_image TEXT,
    seller_id TEXT NOT NULL,
    seller_name TEXT NOT NULL,
    buyer_id TEXT NOT NULL,
    buyer_name TEXT NOT NULL,
    last_message TEXT NOT NULL DEFAULT '',
    last_message_sender TEXT,
    last_message_id TEXT,
    last_message_at INTEGER,
    seller_read INTEGER NOT NULL DEFAULT 1,
    buyer_read INTEGER NOT NULL DEFAULT 1,
    unread_count INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chat_rooms_seller ON chat_rooms(seller_id);
CREATE INDEX IF NOT EXISTS idx_chat_rooms_buyer ON chat_rooms(buyer_id);

CREATE TABLE IF NOT EXISTS messages (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    room_id TEXT NOT NULL REFERENCES chat_rooms(id),
    text TEXT NOT NULL,
    sender_id TEXT NOT NULL,
    sender_name TEXT NOT NULL,
    timestamp_ms INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_room_time ON messages(room_id, timestamp_ms, seq);

CREATE TABLE IF NOT EXISTS notification_settings (
    user_id TEXT PRIMARY KEY,
    settings TEXT NOT NULL
);
";
