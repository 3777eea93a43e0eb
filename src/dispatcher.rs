use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use crate::config::NotificationConfig;
use crate::metrics::MetricsCollector;
use crate::notification::{ChatChange, Decision, DeliveryPath, NotificationPolicy, Notifier, SuppressReason};
use crate::settings::{LocalSettings, NotificationPreferences};
use crate::store::ChatStore;
use crate::viewing::ViewingState;

/// Shared delivery step for both notification paths.
///
/// Reads preferences, applies the policy against the current viewing state and
/// schedules through the [`Notifier`]. Every failure is logged and swallowed.
pub struct NotificationDispatcher {
    policy: NotificationPolicy,
    settings: Arc<LocalSettings>,
    store: Arc<dyn ChatStore>,
    notifier: Arc<dyn Notifier>,
    viewing: ViewingState,
    vibration_pattern: Vec<u64>,
    // Last notified message id per room, shared by both paths
    delivered: Mutex<HashMap<String, String>>,
    metrics: MetricsCollector,
}

impl NotificationDispatcher {
    pub fn new(
        config: &NotificationConfig,
        settings: Arc<LocalSettings>,
        store: Arc<dyn ChatStore>,
        notifier: Arc<dyn Notifier>,
        viewing: ViewingState,
    ) -> Self {
        Self {
            policy: NotificationPolicy::from_config(config),
            settings,
            store,
            notifier,
            viewing,
            vibration_pattern: config.vibration_pattern_ms.clone(),
            delivered: Mutex::new(HashMap::new()),
            metrics: MetricsCollector,
        }
    }

    /// Decide on `change` for `viewer_id` and schedule it if allowed
    pub async fn dispatch(&self, viewer_id: &str, change: &ChatChange, path: DeliveryPath) -> Decision {
        let preferences = self.effective_preferences(viewer_id).await;
        let open_room = self.viewing.open_room();

        let mut decision = self
            .policy
            .evaluate(change, viewer_id, open_room.as_deref(), &preferences);

        if decision.is_notify() && !self.claim(change) {
            decision = Decision::Suppress(SuppressReason::AlreadyNotified);
        }

        match &decision {
            Decision::Notify(request) => match self.notifier.schedule(request.clone()).await {
                Ok(id) => {
                    debug!(
                        notification_id = %id,
                        room_id = %change.room_id,
                        path = path.as_str(),
                        "Notification scheduled"
                    );
                    self.metrics.record_notification_scheduled(path.as_str());
                },
                Err(e) => {
                    warn!(room_id = %change.room_id, error = %e, "Failed to schedule notification");
                    self.metrics.record_error(e.kind(), "schedule_notification");
                },
            },
            Decision::Suppress(reason) => {
                debug!(
                    room_id = %change.room_id,
                    path = path.as_str(),
                    reason = reason.as_str(),
                    "Notification suppressed"
                );
                self.metrics.record_notification_suppressed(path.as_str(), reason.as_str());
            },
        }

        decision
    }

    /// Play the configured vibration pattern, ignoring failures
    pub async fn haptic(&self) {
        if let Err(e) = self.notifier.vibrate(self.vibration_pattern.clone()).await {
            warn!(error = %e, "Failed to vibrate");
            self.metrics.record_error(e.kind(), "vibrate");
        }
    }

    /// Local preferences, additionally gated by the store-side chat toggle.
    /// Unreadable settings count as enabled.
    pub async fn effective_preferences(&self, viewer_id: &str) -> NotificationPreferences {
        let mut preferences = self.settings.load_or_default();

        match self.store.notification_settings(viewer_id).await {
            Ok(Some(settings)) => preferences.enabled &= settings.chat,
            Ok(None) => {},
            Err(e) => {
                warn!(user_id = viewer_id, error = %e, "Failed to read notification settings, assuming enabled");
                self.metrics.record_error(e.kind(), "notification_settings");
            },
        }

        preferences
    }

    /// Record `change` as notified; false if this message already was
    fn claim(&self, change: &ChatChange) -> bool {
        let Some(message_id) = &change.message_id else {
            return true;
        };

        let mut delivered = self.delivered.lock().unwrap_or_else(PoisonError::into_inner);
        if delivered.get(&change.room_id) == Some(message_id) {
            return false;
        }
        delivered.insert(change.room_id.clone(), message_id.clone());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::Database;
    use crate::error::ChatError;
    use crate::notification::MockNotifier;

    fn change(message_id: Option<&str>) -> ChatChange {
        ChatChange {
            room_id: "X123_alice_bob".to_string(),
            message_id: message_id.map(str::to_string),
            item_title: Some("Rice cooker".to_string()),
            sender_id: "bob".to_string(),
            sender_name: "Bob".to_string(),
            text: "hello".to_string(),
            sent_at: None,
        }
    }

    fn dispatcher(notifier: MockNotifier) -> NotificationDispatcher {
        let config = AppConfig::default();
        NotificationDispatcher::new(
            &config.notifications,
            Arc::new(LocalSettings::temporary().expect("settings")),
            Arc::new(Database::open_in_memory().expect("database")),
            Arc::new(notifier),
            ViewingState::new(),
        )
    }

    #[tokio::test]
    async fn scheduling_failure_is_swallowed() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_schedule()
            .times(1)
            .returning(|_| Err(ChatError::Notification("permission denied".to_string())));

        let decision = dispatcher(notifier)
            .dispatch("alice", &change(None), DeliveryPath::Background)
            .await;

        assert!(decision.is_notify());
    }

    #[tokio::test]
    async fn same_message_is_notified_once() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_schedule()
            .times(1)
            .returning(|_| Ok("local-1".to_string()));

        let dispatcher = dispatcher(notifier);

        let first = dispatcher
            .dispatch("alice", &change(Some("m1")), DeliveryPath::ChatScreen)
            .await;
        let second = dispatcher
            .dispatch("alice", &change(Some("m1")), DeliveryPath::Background)
            .await;

        assert!(first.is_notify());
        assert_eq!(second, Decision::Suppress(SuppressReason::AlreadyNotified));
    }

    #[tokio::test]
    async fn distinct_messages_are_each_notified() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_schedule()
            .times(2)
            .returning(|_| Ok("local-1".to_string()));

        let dispatcher = dispatcher(notifier);

        for id in ["m1", "m2"] {
            let decision = dispatcher
                .dispatch("alice", &change(Some(id)), DeliveryPath::Background)
                .await;
            assert!(decision.is_notify());
        }
    }

    #[tokio::test]
    async fn server_side_toggle_disables_chat() {
        let notifier = MockNotifier::new();
        let dispatcher = dispatcher(notifier);
        dispatcher
            .store
            .save_notification_settings(
                "alice",
                crate::models::NotificationSettings {
                    chat: false,
                    ..Default::default()
                },
            )
            .await
            .expect("save settings");

        let decision = dispatcher
            .dispatch("alice", &change(None), DeliveryPath::Background)
            .await;

        assert_eq!(decision, Decision::Suppress(SuppressReason::Disabled));
    }
}
