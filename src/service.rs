use std::sync::Arc;

use tracing::info;

use crate::config::NotificationConfig;
use crate::dispatcher::NotificationDispatcher;
use crate::error::{ChatError, Result};
use crate::listener::{AuthState, GlobalListener};
use crate::models::{ChatRoom, Message, OpenRoomRequest};
use crate::notification::Notifier;
use crate::room::RoomResolver;
use crate::session::{self, RoomSession};
use crate::settings::LocalSettings;
use crate::store::ChatStore;
use crate::viewing::ViewingState;

/// Owns the chat components of one signed-in app instance
pub struct ChatService {
    store: Arc<dyn ChatStore>,
    settings: Arc<LocalSettings>,
    viewing: ViewingState,
    dispatcher: Arc<NotificationDispatcher>,
    resolver: RoomResolver,
    listener: GlobalListener,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn ChatStore>,
        settings: Arc<LocalSettings>,
        notifier: Arc<dyn Notifier>,
        config: &NotificationConfig,
    ) -> Self {
        let viewing = ViewingState::new();
        let dispatcher = Arc::new(NotificationDispatcher::new(
            config,
            Arc::clone(&settings),
            Arc::clone(&store),
            notifier,
            viewing.clone(),
        ));

        Self {
            resolver: RoomResolver::new(Arc::clone(&store)),
            listener: GlobalListener::new(Arc::clone(&store), Arc::clone(&dispatcher)),
            store,
            settings,
            viewing,
            dispatcher,
        }
    }

    /// Resolve (or create) the room for `request`
    pub async fn resolve_room(&self, request: &OpenRoomRequest) -> Result<ChatRoom> {
        self.resolver.get_or_create(request).await
    }

    /// Resolve the room and open it on screen for `user_id`
    pub async fn open_chat(&self, request: &OpenRoomRequest, user_id: &str) -> Result<RoomSession> {
        let room = self.resolve_room(request).await?;
        self.open_session(room, user_id)
    }

    /// Open an existing room on screen for `user_id`
    pub async fn enter_room(&self, room_id: &str, user_id: &str) -> Result<RoomSession> {
        let room = self
            .store
            .room(room_id)
            .await?
            .ok_or_else(|| ChatError::RoomNotFound(room_id.to_string()))?;
        self.open_session(room, user_id)
    }

    fn open_session(&self, room: ChatRoom, user_id: &str) -> Result<RoomSession> {
        RoomSession::open(
            Arc::clone(&self.store),
            Arc::clone(&self.dispatcher),
            self.viewing.clone(),
            room,
            user_id,
        )
    }

    /// Send without opening the room
    pub async fn send_message(&self, room_id: &str, sender_id: &str, text: &str) -> Result<Message> {
        let room = self
            .store
            .room(room_id)
            .await?
            .ok_or_else(|| ChatError::RoomNotFound(room_id.to_string()))?;
        let (message, _) = session::send_message(self.store.as_ref(), &room, sender_id, text).await?;
        Ok(message)
    }

    /// Start or stop the global listener for an auth transition
    pub fn on_auth_state(&self, state: &AuthState) -> Result<()> {
        if let AuthState::SignedIn(user_id) = state {
            info!(user_id = %user_id, "User signed in");
        }
        self.listener.on_auth_state(state)
    }

    pub async fn rooms_for_user(&self, user_id: &str) -> Result<Vec<ChatRoom>> {
        self.store.rooms_for_user(user_id).await
    }

    pub async fn unread_room_count(&self, user_id: &str) -> Result<usize> {
        self.store.unread_room_count(user_id).await
    }

    #[must_use]
    pub const fn listener(&self) -> &GlobalListener {
        &self.listener
    }

    #[must_use]
    pub const fn viewing(&self) -> &ViewingState {
        &self.viewing
    }

    #[must_use]
    pub fn settings(&self) -> &LocalSettings {
        &self.settings
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ChatStore> {
        &self.store
    }
}
