//! Open chat room sessions: the live message stream, unread bookkeeping and
//! sending.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::dispatcher::NotificationDispatcher;
use crate::error::{ChatError, Result};
use crate::metrics::MetricsCollector;
use crate::models::{ChatRoom, Message, NewMessage, Role};
use crate::notification::{ChatChange, DeliveryPath};
use crate::store::ChatStore;
use crate::subscription::Subscription;
use crate::validation::InputValidator;
use crate::viewing::{ViewingGuard, ViewingState};

/// Unread state of one room from one viewer's side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnreadState {
    NoMessages,
    CaughtUp,
    HasUnread,
}

/// Detects new incoming messages across successive snapshots
#[derive(Debug, Clone)]
pub struct UnreadTracker {
    user_id: String,
    observed: Option<usize>,
    state: UnreadState,
}

impl UnreadTracker {
    #[must_use]
    pub fn new(user_id: &str, initial: UnreadState) -> Self {
        Self {
            user_id: user_id.to_string(),
            observed: None,
            state: initial,
        }
    }

    /// Starting state for `user_id` in `room`, taken from the stored flags
    #[must_use]
    pub fn for_room(room: &ChatRoom, user_id: &str) -> Self {
        let initial = match room.role_of(user_id) {
            _ if room.last_message_sender.is_none() => UnreadState::NoMessages,
            Some(role) if !room.read_flag(role) => UnreadState::HasUnread,
            _ => UnreadState::CaughtUp,
        };
        Self::new(user_id, initial)
    }

    /// Feed a snapshot. Returns the newest message when it is an incoming one
    /// that grew the list since the previous snapshot. The first snapshot only
    /// sets the baseline.
    pub fn observe<'a>(&mut self, messages: &'a [Message]) -> Option<&'a Message> {
        let count = messages.len();
        let previous = self.observed.replace(count);

        let incoming = match (previous, messages.last()) {
            (Some(previous), Some(newest)) if count > previous && newest.sender_id != self.user_id => Some(newest),
            _ => None,
        };

        self.state = if count == 0 {
            UnreadState::NoMessages
        } else if incoming.is_some() {
            UnreadState::HasUnread
        } else if self.state == UnreadState::NoMessages {
            UnreadState::CaughtUp
        } else {
            self.state
        };

        incoming
    }

    /// The viewer has seen everything in the latest snapshot
    pub fn mark_caught_up(&mut self) {
        if self.state != UnreadState::NoMessages {
            self.state = UnreadState::CaughtUp;
        }
    }

    #[must_use]
    pub const fn state(&self) -> UnreadState {
        self.state
    }

    #[must_use]
    pub const fn observed(&self) -> Option<usize> {
        self.observed
    }
}

/// Append a message from `sender_id` to `room`, returning the stored message
/// and the updated room
pub async fn send_message(
    store: &dyn ChatStore,
    room: &ChatRoom,
    sender_id: &str,
    text: &str,
) -> Result<(Message, ChatRoom)> {
    let role = room.role_of(sender_id).ok_or_else(|| ChatError::NotParticipant {
        room: room.id.clone(),
        user: sender_id.to_string(),
    })?;
    let text = InputValidator::validate_message_text(text)?;

    let result = store
        .append_message(
            &room.id,
            NewMessage {
                sender_id: sender_id.to_string(),
                sender_name: room.display_name(role).to_string(),
                text,
            },
        )
        .await;

    let metrics = MetricsCollector;
    match &result {
        Ok((message, _)) => {
            debug!(room_id = %room.id, message_id = %message.id, "Message sent");
            metrics.record_message_sent();
        },
        Err(e) => metrics.record_error(e.kind(), "send_message"),
    }
    result
}

/// One user's open view of a chat room.
///
/// The room counts as on screen for as long as the session lives; dropping it
/// unsubscribes and clears the viewing state.
pub struct RoomSession {
    room: ChatRoom,
    user_id: String,
    role: Role,
    store: Arc<dyn ChatStore>,
    dispatcher: Arc<NotificationDispatcher>,
    viewing: ViewingState,
    tracker: UnreadTracker,
    messages: Vec<Message>,
    subscription: Subscription<Vec<Message>>,
    _guard: ViewingGuard,
}

impl RoomSession {
    pub fn open(
        store: Arc<dyn ChatStore>,
        dispatcher: Arc<NotificationDispatcher>,
        viewing: ViewingState,
        room: ChatRoom,
        user_id: &str,
    ) -> Result<Self> {
        let role = room.role_of(user_id).ok_or_else(|| ChatError::NotParticipant {
            room: room.id.clone(),
            user: user_id.to_string(),
        })?;

        let subscription = store.subscribe_messages(&room.id)?;
        let guard = viewing.enter(&room.id);
        let tracker = UnreadTracker::for_room(&room, user_id);

        debug!(room_id = %room.id, user_id, "Opened chat room session");

        Ok(Self {
            room,
            user_id: user_id.to_string(),
            role,
            store,
            dispatcher,
            viewing,
            tracker,
            messages: Vec::new(),
            subscription,
            _guard: guard,
        })
    }

    /// Wait for the next snapshot and apply it. `None` once the stream ends.
    pub async fn next_snapshot(&mut self) -> Option<Vec<Message>> {
        let snapshot = self.subscription.next().await?;
        self.apply_snapshot(snapshot).await;
        Some(self.messages.clone())
    }

    async fn apply_snapshot(&mut self, snapshot: Vec<Message>) {
        if let Some(incoming) = self.tracker.observe(&snapshot) {
            let change = ChatChange::from_message(&self.room, incoming);
            if self.viewing.is_foreground() {
                self.dispatcher.haptic().await;
            }
            self.dispatcher
                .dispatch(&self.user_id, &change, DeliveryPath::ChatScreen)
                .await;
        }

        if self.is_focused() {
            match self.store.mark_read(&self.room.id, self.role).await {
                Ok(room) => {
                    self.room = room;
                    self.tracker.mark_caught_up();
                },
                Err(e) => warn!(room_id = %self.room.id, error = %e, "Failed to mark room as read"),
            }
        }

        self.messages = snapshot;
    }

    /// Send a message as this session's user
    pub async fn send(&mut self, text: &str) -> Result<Message> {
        let (message, room) = send_message(self.store.as_ref(), &self.room, &self.user_id, text).await?;
        self.room = room;
        Ok(message)
    }

    /// True while this room is on screen and the app is in the foreground
    #[must_use]
    pub fn is_focused(&self) -> bool {
        self.viewing.is_viewing(&self.room.id)
    }

    #[must_use]
    pub const fn room(&self) -> &ChatRoom {
        &self.room
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub const fn state(&self) -> UnreadState {
        self.tracker.state()
    }

    /// Leave the room
    pub fn close(self) {}
}
