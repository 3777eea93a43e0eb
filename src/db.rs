use std::fs;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rand::{distributions::Alphanumeric, Rng};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::config::StoreConfig;
use crate::error::{ChatError, Result};
use crate::metrics::{MetricsCollector, MetricsTimer};
use crate::models::{ChangeKind, ChatRoom, ItemSummary, Message, NewMessage, NotificationSettings, Role, RoomChange};
use crate::schema::{self, chat_rooms, messages, notification_settings};
use crate::store::ChatStore;
use crate::subscription::{Subscription, SUBSCRIPTION_BUFFER};
use crate::validation::InputValidator;

// Type alias for the database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Length of generated message ids
const MESSAGE_ID_LEN: usize = 20;
const DEFAULT_EVENT_BUFFER: usize = 256;

/// Change feed entry fanned out to live subscriptions
#[derive(Debug, Clone)]
enum StoreEvent {
    Room(ChangeKind, ChatRoom),
    MessageAdded(String),
}

/// SQLite-backed chat store
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    events: broadcast::Sender<StoreEvent>,
    metrics: MetricsCollector,
}

impl Database {
    /// Create a new database connection pool with default pool settings
    pub fn new(database_url: &str) -> Result<Self> {
        Self::with_options(database_url, 8, Duration::from_secs(30), DEFAULT_EVENT_BUFFER)
    }

    /// Create a database from the `store` configuration section
    pub fn from_config(config: &StoreConfig, database_url: &str) -> Result<Self> {
        Self::with_options(
            database_url,
            config.max_connections,
            Duration::from_secs(config.connection_timeout_secs),
            config.event_buffer,
        )
    }

    /// Private in-memory database, mainly for tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        Self::with_options(":memory:", 1, Duration::from_secs(30), DEFAULT_EVENT_BUFFER)
    }

    fn with_options(database_url: &str, max_connections: u32, timeout: Duration, event_buffer: usize) -> Result<Self> {
        InputValidator::validate_database_url(database_url)?;

        // Each in-memory connection is its own database, so keep exactly one
        let (manager, max_connections) = if database_url == ":memory:" {
            (SqliteConnectionManager::memory(), 1)
        } else {
            let path = Path::new(Self::strip_scheme(database_url));
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            (SqliteConnectionManager::file(path), max_connections)
        };

        let manager = manager.with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
        });

        let pool = Pool::builder()
            .max_size(max_connections)
            .connection_timeout(timeout)
            .build(manager)?;

        let conn = pool.get()?;
        Self::run_migrations(&conn)?;
        drop(conn);

        let (events, _) = broadcast::channel(event_buffer.max(1));

        Ok(Self {
            pool,
            events,
            metrics: MetricsCollector,
        })
    }

    fn strip_scheme(url: &str) -> &str {
        url.strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url)
    }

    /// Run database migrations
    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(schema::CREATE_TABLES)?;
        Ok(())
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    fn emit(&self, event: StoreEvent) {
        // No receivers simply means nobody is subscribed
        let _ = self.events.send(event);
    }

    fn timed<T>(&self, operation: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let timer = MetricsTimer::new(self.metrics, operation);
        let result = f();
        timer.finish(result.is_ok());
        result
    }

    /// Get a room by key
    pub fn get_room(&self, room_id: &str) -> Result<Option<ChatRoom>> {
        self.timed("get_room", || {
            let conn = self.get_connection()?;
            Self::load_room(&conn, room_id)
        })
    }

    fn load_room(conn: &Connection, room_id: &str) -> Result<Option<ChatRoom>> {
        let room = conn
            .query_row(
                &format!("SELECT * FROM {} WHERE {} = ?1", chat_rooms::TABLE, chat_rooms::ID),
                params![room_id],
                Self::map_room,
            )
            .optional()?;
        Ok(room)
    }

    /// Insert a room unless its key is taken
    pub fn insert_room_if_absent(&self, room: &ChatRoom) -> Result<(ChatRoom, bool)> {
        let (stored, created) = self.timed("insert_room", || {
            let conn = self.get_connection()?;
            let inserted = conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO {} ({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                    chat_rooms::TABLE,
                    chat_rooms::ID,
                    chat_rooms::ITEM_ID,
                    chat_rooms::ITEM_TITLE,
                    chat_rooms::ITEM_IMAGE,
                    chat_rooms::SELLER_ID,
                    chat_rooms::SELLER_NAME,
                    chat_rooms::BUYER_ID,
                    chat_rooms::BUYER_NAME,
                    chat_rooms::LAST_MESSAGE,
                    chat_rooms::LAST_MESSAGE_SENDER,
                    chat_rooms::LAST_MESSAGE_ID,
                    chat_rooms::LAST_MESSAGE_AT,
                    chat_rooms::SELLER_READ,
                    chat_rooms::BUYER_READ,
                    chat_rooms::UNREAD_COUNT,
                    chat_rooms::CREATED_AT,
                    chat_rooms::UPDATED_AT,
                ),
                params![
                    room.id,
                    room.item.id,
                    room.item.title,
                    room.item.image,
                    room.seller_id,
                    room.seller_name,
                    room.buyer_id,
                    room.buyer_name,
                    room.last_message,
                    room.last_message_sender,
                    room.last_message_id,
                    room.last_message_at.map(to_millis),
                    room.seller_read,
                    room.buyer_read,
                    room.unread_count,
                    to_millis(room.created_at),
                    to_millis(room.updated_at),
                ],
            )?;

            let stored = Self::load_room(&conn, &room.id)?
                .ok_or_else(|| ChatError::RoomNotFound(room.id.clone()))?;
            Ok((stored, inserted == 1))
        })?;

        if created {
            self.emit(StoreEvent::Room(ChangeKind::Added, stored.clone()));
        }
        Ok((stored, created))
    }

    /// Rooms a user takes part in, latest message first. Rooms without
    /// messages rank by creation time; reads do not reorder.
    pub fn get_rooms_for_user(&self, user_id: &str) -> Result<Vec<ChatRoom>> {
        self.timed("rooms_for_user", || {
            let conn = self.get_connection()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT * FROM {} WHERE {} = ?1 OR {} = ?1 ORDER BY COALESCE({}, {}) DESC, {} ASC",
                chat_rooms::TABLE,
                chat_rooms::SELLER_ID,
                chat_rooms::BUYER_ID,
                chat_rooms::LAST_MESSAGE_AT,
                chat_rooms::CREATED_AT,
                chat_rooms::ID
            ))?;
            let room_iter = stmt.query_map(params![user_id], Self::map_room)?;

            let mut results = Vec::new();
            for room in room_iter {
                results.push(room?);
            }
            Ok(results)
        })
    }

    /// Append a message and flip the room's read state in one transaction
    pub fn insert_message(&self, room_id: &str, new_message: &NewMessage) -> Result<(Message, ChatRoom)> {
        let (message, room) = self.timed("append_message", || {
            let mut conn = self.get_connection()?;
            let tx = conn.transaction()?;

            let mut room =
                Self::load_room(&tx, room_id)?.ok_or_else(|| ChatError::RoomNotFound(room_id.to_string()))?;
            let role = room.role_of(&new_message.sender_id).ok_or_else(|| ChatError::NotParticipant {
                room: room_id.to_string(),
                user: new_message.sender_id.clone(),
            })?;

            let timestamp = from_millis(to_millis(Utc::now()));
            let message = Message {
                id: generate_id(),
                room_id: room_id.to_string(),
                text: new_message.text.clone(),
                sender_id: new_message.sender_id.clone(),
                sender_name: new_message.sender_name.clone(),
                timestamp,
            };

            tx.execute(
                &format!(
                    "INSERT INTO {} ({}, {}, {}, {}, {}, {}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    messages::TABLE,
                    messages::ID,
                    messages::ROOM_ID,
                    messages::TEXT,
                    messages::SENDER_ID,
                    messages::SENDER_NAME,
                    messages::TIMESTAMP_MS
                ),
                params![
                    message.id,
                    message.room_id,
                    message.text,
                    message.sender_id,
                    message.sender_name,
                    to_millis(message.timestamp)
                ],
            )?;

            room.record_send(role, &message);
            Self::write_room_state(&tx, &room)?;
            tx.commit()?;

            Ok((message, room))
        })?;

        debug!(room_id, message_id = %message.id, "Appended message");
        self.emit(StoreEvent::MessageAdded(room_id.to_string()));
        self.emit(StoreEvent::Room(ChangeKind::Modified, room.clone()));
        Ok((message, room))
    }

    /// Mark one side of a room as read
    pub fn update_read_state(&self, room_id: &str, role: Role) -> Result<ChatRoom> {
        let room = self.timed("mark_read", || {
            let mut conn = self.get_connection()?;
            let tx = conn.transaction()?;
            let mut room =
                Self::load_room(&tx, room_id)?.ok_or_else(|| ChatError::RoomNotFound(room_id.to_string()))?;
            room.record_read(role, from_millis(to_millis(Utc::now())));
            Self::write_room_state(&tx, &room)?;
            tx.commit()?;
            Ok(room)
        })?;

        self.emit(StoreEvent::Room(ChangeKind::Modified, room.clone()));
        Ok(room)
    }

    fn write_room_state(conn: &Connection, room: &ChatRoom) -> Result<()> {
        conn.execute(
            &format!(
                "UPDATE {} SET {} = ?1, {} = ?2, {} = ?3, {} = ?4, {} = ?5, {} = ?6, {} = ?7, {} = ?8 WHERE {} = ?9",
                chat_rooms::TABLE,
                chat_rooms::LAST_MESSAGE,
                chat_rooms::LAST_MESSAGE_SENDER,
                chat_rooms::LAST_MESSAGE_ID,
                chat_rooms::LAST_MESSAGE_AT,
                chat_rooms::SELLER_READ,
                chat_rooms::BUYER_READ,
                chat_rooms::UNREAD_COUNT,
                chat_rooms::UPDATED_AT,
                chat_rooms::ID
            ),
            params![
                room.last_message,
                room.last_message_sender,
                room.last_message_id,
                room.last_message_at.map(to_millis),
                room.seller_read,
                room.buyer_read,
                room.unread_count,
                to_millis(room.updated_at),
                room.id
            ],
        )?;
        Ok(())
    }

    /// Messages of a room, oldest first
    pub fn get_messages(&self, room_id: &str) -> Result<Vec<Message>> {
        self.timed("messages", || {
            let conn = self.get_connection()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT * FROM {} WHERE {} = ?1 ORDER BY {} ASC, {} ASC",
                messages::TABLE,
                messages::ROOM_ID,
                messages::TIMESTAMP_MS,
                messages::SEQ
            ))?;
            let message_iter = stmt.query_map(params![room_id], Self::map_message)?;

            let mut results = Vec::new();
            for message in message_iter {
                results.push(message?);
            }
            Ok(results)
        })
    }

    pub fn get_notification_settings(&self, user_id: &str) -> Result<Option<NotificationSettings>> {
        let conn = self.get_connection()?;
        let raw: Option<String> = conn
            .query_row(
                &format!(
                    "SELECT {} FROM {} WHERE {} = ?1",
                    notification_settings::SETTINGS,
                    notification_settings::TABLE,
                    notification_settings::USER_ID
                ),
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|json| serde_json::from_str(&json).map_err(ChatError::from))
            .transpose()
    }

    pub fn put_notification_settings(&self, user_id: &str, settings: &NotificationSettings) -> Result<()> {
        let conn = self.get_connection()?;
        conn.execute(
            &format!(
                "INSERT INTO {table} ({user}, {settings}) VALUES (?1, ?2) \
                 ON CONFLICT({user}) DO UPDATE SET {settings} = excluded.{settings}",
                table = notification_settings::TABLE,
                user = notification_settings::USER_ID,
                settings = notification_settings::SETTINGS
            ),
            params![user_id, serde_json::to_string(settings)?],
        )?;
        Ok(())
    }

    /// Map a database row to a ChatRoom
    fn map_room(row: &Row) -> rusqlite::Result<ChatRoom> {
        Ok(ChatRoom {
            id: row.get(chat_rooms::ID)?,
            item: ItemSummary {
                id: row.get(chat_rooms::ITEM_ID)?,
                title: row.get(chat_rooms::ITEM_TITLE)?,
                image: row.get(chat_rooms::ITEM_IMAGE)?,
            },
            seller_id: row.get(chat_rooms::SELLER_ID)?,
            seller_name: row.get(chat_rooms::SELLER_NAME)?,
            buyer_id: row.get(chat_rooms::BUYER_ID)?,
            buyer_name: row.get(chat_rooms::BUYER_NAME)?,
            last_message: row.get(chat_rooms::LAST_MESSAGE)?,
            last_message_sender: row.get(chat_rooms::LAST_MESSAGE_SENDER)?,
            last_message_id: row.get(chat_rooms::LAST_MESSAGE_ID)?,
            last_message_at: row.get::<_, Option<i64>>(chat_rooms::LAST_MESSAGE_AT)?.map(from_millis),
            seller_read: row.get(chat_rooms::SELLER_READ)?,
            buyer_read: row.get(chat_rooms::BUYER_READ)?,
            unread_count: row.get(chat_rooms::UNREAD_COUNT)?,
            created_at: from_millis(row.get(chat_rooms::CREATED_AT)?),
            updated_at: from_millis(row.get(chat_rooms::UPDATED_AT)?),
        })
    }

    /// Map a database row to a Message
    fn map_message(row: &Row) -> rusqlite::Result<Message> {
        Ok(Message {
            id: row.get(messages::ID)?,
            room_id: row.get(messages::ROOM_ID)?,
            text: row.get(messages::TEXT)?,
            sender_id: row.get(messages::SENDER_ID)?,
            sender_name: row.get(messages::SENDER_NAME)?,
            timestamp: from_millis(row.get(messages::TIMESTAMP_MS)?),
        })
    }

    /// Send the current message list; false once the subscriber is gone
    async fn forward_messages(&self, room_id: &str, sender: &mpsc::Sender<Vec<Message>>) -> bool {
        match self.get_messages(room_id) {
            Ok(snapshot) => sender.send(snapshot).await.is_ok(),
            Err(e) => {
                error!(room_id, error = %e, "Failed to load message snapshot");
                !sender.is_closed()
            },
        }
    }

    /// Send every room of the user as one change each
    async fn forward_rooms(&self, user_id: &str, kind: ChangeKind, sender: &mpsc::Sender<RoomChange>) -> bool {
        match self.get_rooms_for_user(user_id) {
            Ok(rooms) => {
                for room in rooms {
                    if sender.send(RoomChange { kind, room }).await.is_err() {
                        return false;
                    }
                }
                true
            },
            Err(e) => {
                error!(user_id, error = %e, "Failed to load room snapshot");
                !sender.is_closed()
            },
        }
    }
}

#[async_trait]
impl ChatStore for Database {
    async fn room(&self, room_id: &str) -> Result<Option<ChatRoom>> {
        self.get_room(room_id)
    }

    async fn create_room_if_absent(&self, room: ChatRoom) -> Result<(ChatRoom, bool)> {
        self.insert_room_if_absent(&room)
    }

    async fn rooms_for_user(&self, user_id: &str) -> Result<Vec<ChatRoom>> {
        self.get_rooms_for_user(user_id)
    }

    async fn append_message(&self, room_id: &str, message: NewMessage) -> Result<(Message, ChatRoom)> {
        self.insert_message(room_id, &message)
    }

    async fn messages(&self, room_id: &str) -> Result<Vec<Message>> {
        self.get_messages(room_id)
    }

    async fn mark_read(&self, room_id: &str, role: Role) -> Result<ChatRoom> {
        self.update_read_state(room_id, role)
    }

    async fn notification_settings(&self, user_id: &str) -> Result<Option<NotificationSettings>> {
        self.get_notification_settings(user_id)
    }

    async fn save_notification_settings(&self, user_id: &str, settings: NotificationSettings) -> Result<()> {
        self.put_notification_settings(user_id, &settings)
    }

    fn subscribe_messages(&self, room_id: &str) -> Result<Subscription<Vec<Message>>> {
        // Register on the feed before the first read so no append is missed
        let mut events = self.events.subscribe();
        let db = self.clone();
        let room_id = room_id.to_string();

        Subscription::spawn(SUBSCRIPTION_BUFFER, move |sender| async move {
            if !db.forward_messages(&room_id, &sender).await {
                return;
            }
            loop {
                match events.recv().await {
                    Ok(StoreEvent::MessageAdded(changed)) if changed == room_id => {
                        if !db.forward_messages(&room_id, &sender).await {
                            break;
                        }
                    },
                    Ok(_) => {},
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(room_id = %room_id, skipped, "Message subscription lagged, resending snapshot");
                        if !db.forward_messages(&room_id, &sender).await {
                            break;
                        }
                    },
                    Err(RecvError::Closed) => break,
                }
            }
            debug!(room_id = %room_id, "Message subscription ended");
        })
    }

    fn subscribe_rooms(&self, user_id: &str) -> Result<Subscription<RoomChange>> {
        let mut events = self.events.subscribe();
        let db = self.clone();
        let user_id = user_id.to_string();

        Subscription::spawn(SUBSCRIPTION_BUFFER, move |sender| async move {
            if !db.forward_rooms(&user_id, ChangeKind::Added, &sender).await {
                return;
            }
            loop {
                match events.recv().await {
                    Ok(StoreEvent::Room(kind, room)) if room.has_participant(&user_id) => {
                        if sender.send(RoomChange { kind, room }).await.is_err() {
                            break;
                        }
                    },
                    Ok(_) => {},
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(user_id = %user_id, skipped, "Room subscription lagged, resending rooms");
                        if !db.forward_rooms(&user_id, ChangeKind::Modified, &sender).await {
                            break;
                        }
                    },
                    Err(RecvError::Closed) => break,
                }
            }
            debug!(user_id = %user_id, "Room subscription ended");
        })
    }
}

/// Random document id in the style of store auto-ids
fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(MESSAGE_ID_LEN)
        .map(char::from)
        .collect()
}

fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OpenRoomRequest;

    fn sample_room() -> ChatRoom {
        let request = OpenRoomRequest {
            item: ItemSummary {
                id: "X123".to_string(),
                title: "Rice cooker".to_string(),
                image: None,
            },
            seller_id: "alice".to_string(),
            seller_name: "Alice".to_string(),
            buyer_id: "bob".to_string(),
            buyer_name: "Bob".to_string(),
        };
        ChatRoom::new("X123_alice_bob".to_string(), &request, from_millis(to_millis(Utc::now())))
    }

    #[test]
    fn strips_sqlite_scheme() {
        assert_eq!(Database::strip_scheme("sqlite:data/chat.db"), "data/chat.db");
        assert_eq!(Database::strip_scheme("sqlite:///tmp/chat.db"), "/tmp/chat.db");
    }

    #[test]
    fn insert_room_is_idempotent() {
        let db = Database::open_in_memory().expect("open database");
        let room = sample_room();

        let (_, created) = db.insert_room_if_absent(&room).expect("first insert");
        let (stored, created_again) = db.insert_room_if_absent(&room).expect("second insert");

        assert!(created);
        assert!(!created_again);
        assert_eq!(stored, room);
    }

    #[test]
    fn non_participant_cannot_send() {
        let db = Database::open_in_memory().expect("open database");
        db.insert_room_if_absent(&sample_room()).expect("insert room");

        let result = db.insert_message(
            "X123_alice_bob",
            &NewMessage {
                sender_id: "mallory".to_string(),
                sender_name: "Mallory".to_string(),
                text: "hi".to_string(),
            },
        );

        assert!(matches!(result, Err(ChatError::NotParticipant { .. })));
    }

    #[test]
    fn generated_ids_are_alphanumeric() {
        let id = generate_id();
        assert_eq!(id.len(), MESSAGE_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
