//! The app-wide listener over all of a signed-in user's chat rooms.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::dispatcher::NotificationDispatcher;
use crate::error::Result;
use crate::models::{ChangeKind, RoomChange};
use crate::notification::{ChatChange, DeliveryPath};
use crate::store::ChatStore;
use crate::validation::InputValidator;

/// Authentication transitions that drive the listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    SignedIn(String),
    SignedOut,
}

struct ActiveListener {
    user_id: String,
    task: JoinHandle<()>,
}

impl Drop for ActiveListener {
    fn drop(&mut self) {
        // Aborting drops the task's subscription with it
        self.task.abort();
    }
}

/// Keeps at most one room subscription alive for the signed-in user
pub struct GlobalListener {
    store: Arc<dyn ChatStore>,
    dispatcher: Arc<NotificationDispatcher>,
    active: Mutex<Option<ActiveListener>>,
}

impl GlobalListener {
    pub fn new(store: Arc<dyn ChatStore>, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self {
            store,
            dispatcher,
            active: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveListener>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start listening for `user_id`, cancelling any existing subscription
    /// first. Must be called from within a tokio runtime.
    pub fn start(&self, user_id: &str) -> Result<()> {
        InputValidator::validate_id("user", user_id)?;

        let mut active = self.lock();
        if let Some(previous) = active.take() {
            info!(previous_user = %previous.user_id, user_id, "Replacing global chat listener");
        }

        let mut subscription = self.store.subscribe_rooms(user_id)?;
        let dispatcher = Arc::clone(&self.dispatcher);
        let user = user_id.to_string();

        let task = tokio::spawn(async move {
            while let Some(change) = subscription.next().await {
                handle_room_change(&dispatcher, &user, change).await;
            }
            debug!(user_id = %user, "Global chat listener stream ended");
        });

        *active = Some(ActiveListener {
            user_id: user_id.to_string(),
            task,
        });
        info!(user_id, "Global chat listener started");
        Ok(())
    }

    /// Cancel the subscription, if any
    pub fn stop(&self) {
        if let Some(previous) = self.lock().take() {
            info!(user_id = %previous.user_id, "Global chat listener stopped");
        }
    }

    /// Follow an auth transition: sign-in starts, sign-out stops
    pub fn on_auth_state(&self, state: &AuthState) -> Result<()> {
        match state {
            AuthState::SignedIn(user_id) => self.start(user_id),
            AuthState::SignedOut => {
                self.stop();
                Ok(())
            },
        }
    }

    /// The user whose rooms are being listened to
    #[must_use]
    pub fn active_user(&self) -> Option<String> {
        self.lock()
            .as_ref()
            .filter(|active| !active.task.is_finished())
            .map(|active| active.user_id.clone())
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.active_user().is_some()
    }
}

/// Turn one room change into a notification candidate. Only updates carrying
/// an unread message from the other side qualify; the initial snapshot never
/// notifies.
async fn handle_room_change(dispatcher: &NotificationDispatcher, user_id: &str, change: RoomChange) {
    if change.kind != ChangeKind::Modified {
        return;
    }

    let room = &change.room;
    let Some(role) = room.role_of(user_id) else {
        return;
    };
    if room.read_flag(role) {
        return;
    }

    let Some(chat_change) = ChatChange::from_room(room) else {
        return;
    };
    if chat_change.sender_id == user_id {
        return;
    }

    dispatcher
        .dispatch(user_id, &chat_change, DeliveryPath::Background)
        .await;
}
