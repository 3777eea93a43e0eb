use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ChatRoom, Message, NewMessage, NotificationSettings, Role, RoomChange};
use crate::subscription::Subscription;

/// Document store holding chat rooms, their messages and per-user
/// notification settings, with live subscriptions.
///
/// The `subscribe_*` methods spawn onto the current tokio runtime and must be
/// called from within one.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Look a room up by its derived key
    async fn room(&self, room_id: &str) -> Result<Option<ChatRoom>>;

    /// Insert `room` unless a room with the same key exists. Returns the
    /// stored room and whether this call created it.
    async fn create_room_if_absent(&self, room: ChatRoom) -> Result<(ChatRoom, bool)>;

    /// Rooms `user_id` participates in, most recently active first
    async fn rooms_for_user(&self, user_id: &str) -> Result<Vec<ChatRoom>>;

    /// Append a message and update the room's last-message and read state in
    /// one step. Returns the stored message and the updated room.
    async fn append_message(&self, room_id: &str, message: NewMessage) -> Result<(Message, ChatRoom)>;

    /// All messages of a room in ascending timestamp order
    async fn messages(&self, room_id: &str) -> Result<Vec<Message>>;

    /// Mark the `role` side as read and clear the unread counter
    async fn mark_read(&self, room_id: &str, role: Role) -> Result<ChatRoom>;

    async fn notification_settings(&self, user_id: &str) -> Result<Option<NotificationSettings>>;

    async fn save_notification_settings(&self, user_id: &str, settings: NotificationSettings) -> Result<()>;

    /// Full ordered message list on subscribe and after every append
    fn subscribe_messages(&self, room_id: &str) -> Result<Subscription<Vec<Message>>>;

    /// Every room of `user_id` as `Added`, then one change per room update
    fn subscribe_rooms(&self, user_id: &str) -> Result<Subscription<RoomChange>>;

    /// Number of rooms with unread messages for `user_id`
    async fn unread_room_count(&self, user_id: &str) -> Result<usize> {
        let rooms = self.rooms_for_user(user_id).await?;
        Ok(rooms
            .iter()
            .filter(|room| room.role_of(user_id).is_some_and(|role| !room.read_flag(role)))
            .count())
    }
}
