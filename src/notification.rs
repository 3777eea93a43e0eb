//! Local notification policy and the platform scheduling seam.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::NotificationConfig;
use crate::error::Result;
use crate::models::{ChatRoom, Message};
use crate::settings::NotificationPreferences;

/// Target platform; only Android has notification channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Android,
    Ios,
}

/// Which observer produced a change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPath {
    /// The app-wide listener over all of a user's rooms
    Background,
    /// An open chat room session
    ChatScreen,
}

impl DeliveryPath {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Background => "background",
            Self::ChatScreen => "chat_screen",
        }
    }
}

/// A new message observed in some room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatChange {
    pub room_id: String,
    /// Id of the message, when known
    pub message_id: Option<String>,
    pub item_title: Option<String>,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    pub sent_at: Option<DateTime<Utc>>,
}

impl ChatChange {
    /// Build from a room's cached last message; `None` if nothing was sent yet
    #[must_use]
    pub fn from_room(room: &ChatRoom) -> Option<Self> {
        let sender_id = room.last_message_sender.clone()?;
        let sender_name = room
            .role_of(&sender_id)
            .map(|role| room.display_name(role).to_string())
            .unwrap_or_default();

        Some(Self {
            room_id: room.id.clone(),
            message_id: room.last_message_id.clone(),
            item_title: non_empty(&room.item.title),
            sender_id,
            sender_name,
            text: room.last_message.clone(),
            sent_at: room.last_message_at,
        })
    }

    #[must_use]
    pub fn from_message(room: &ChatRoom, message: &Message) -> Self {
        Self {
            room_id: room.id.clone(),
            message_id: Some(message.id.clone()),
            item_title: non_empty(&room.item.title),
            sender_id: message.sender_id.clone(),
            sender_name: message.sender_name.clone(),
            text: message.text.clone(),
            sent_at: Some(message.timestamp),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.trim().is_empty()).then(|| value.to_string())
}

/// What the user sees
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    pub sound: String,
    pub data: BTreeMap<String, String>,
}

/// When and where it is delivered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationTrigger {
    pub seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
}

/// Payload handed to the platform scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub content: NotificationContent,
    pub trigger: NotificationTrigger,
}

/// Why a change did not produce a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// The viewer sent the message
    OwnMessage,
    /// The room is on screen
    RoomOpen,
    /// Chat notifications are turned off
    Disabled,
    /// This message was already notified through another path
    AlreadyNotified,
}

impl SuppressReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OwnMessage => "own_message",
            Self::RoomOpen => "room_open",
            Self::Disabled => "disabled",
            Self::AlreadyNotified => "already_notified",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Notify(NotificationRequest),
    Suppress(SuppressReason),
}

impl Decision {
    #[must_use]
    pub const fn is_notify(&self) -> bool {
        matches!(self, Self::Notify(_))
    }
}

/// Decides whether a chat change is shown and builds the request
#[derive(Debug, Clone)]
pub struct NotificationPolicy {
    delay_secs: u64,
    fallback_title: String,
    platform: Platform,
}

impl NotificationPolicy {
    #[must_use]
    pub fn new(delay_secs: u64, fallback_title: &str, platform: Platform) -> Self {
        Self {
            delay_secs,
            fallback_title: fallback_title.to_string(),
            platform,
        }
    }

    #[must_use]
    pub fn from_config(config: &NotificationConfig) -> Self {
        Self::new(config.delay_secs, &config.fallback_title, config.platform)
    }

    /// Apply the decision rule: someone else sent it, its room is not on
    /// screen, and notifications are enabled.
    #[must_use]
    pub fn evaluate(
        &self,
        change: &ChatChange,
        viewer_id: &str,
        open_room: Option<&str>,
        preferences: &NotificationPreferences,
    ) -> Decision {
        if change.sender_id == viewer_id {
            return Decision::Suppress(SuppressReason::OwnMessage);
        }
        if open_room == Some(change.room_id.as_str()) {
            return Decision::Suppress(SuppressReason::RoomOpen);
        }
        if !preferences.enabled {
            return Decision::Suppress(SuppressReason::Disabled);
        }

        Decision::Notify(self.build_request(change, preferences))
    }

    fn build_request(&self, change: &ChatChange, preferences: &NotificationPreferences) -> NotificationRequest {
        let mut data = BTreeMap::new();
        data.insert("type".to_string(), "chat".to_string());
        data.insert("roomId".to_string(), change.room_id.clone());
        data.insert("senderId".to_string(), change.sender_id.clone());

        let channel_id = match self.platform {
            Platform::Android => Some(preferences.sound.channel().to_string()),
            Platform::Ios => None,
        };

        NotificationRequest {
            content: NotificationContent {
                title: change.item_title.clone().unwrap_or_else(|| self.fallback_title.clone()),
                body: change.text.clone(),
                sound: preferences.sound.file().to_string(),
                data,
            },
            trigger: NotificationTrigger {
                seconds: self.delay_secs,
                channel_id,
            },
        }
    }
}

/// Device notification scheduling and haptics
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Schedule a local notification, returning its identifier
    async fn schedule(&self, request: NotificationRequest) -> Result<String>;

    /// Play a vibration pattern (alternating wait/vibrate durations in ms)
    async fn vibrate(&self, pattern_ms: Vec<u64>) -> Result<()>;
}

/// Notifier that logs and keeps every request, for headless runs and tests
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    scheduled: Mutex<Vec<NotificationRequest>>,
    vibrations: AtomicUsize,
    next_id: AtomicU64,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests scheduled so far, oldest first
    pub fn scheduled(&self) -> Vec<NotificationRequest> {
        self.scheduled.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn scheduled_count(&self) -> usize {
        self.scheduled.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn vibration_count(&self) -> usize {
        self.vibrations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn schedule(&self, request: NotificationRequest) -> Result<String> {
        let id = format!("local-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        info!(
            notification_id = %id,
            title = %request.content.title,
            body = %request.content.body,
            sound = %request.content.sound,
            channel = ?request.trigger.channel_id,
            delay_secs = request.trigger.seconds,
            "Scheduled local notification"
        );
        self.scheduled.lock().unwrap_or_else(PoisonError::into_inner).push(request);
        Ok(id)
    }

    async fn vibrate(&self, pattern_ms: Vec<u64>) -> Result<()> {
        tracing::debug!(?pattern_ms, "Vibrate");
        self.vibrations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
