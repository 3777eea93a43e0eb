use anyhow::Result;
use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Metric names
pub const MESSAGES_SENT_TOTAL: &str = "market_chat_messages_sent_total";
pub const ROOMS_CREATED_TOTAL: &str = "market_chat_rooms_created_total";
pub const NOTIFICATIONS_SCHEDULED_TOTAL: &str = "market_chat_notifications_scheduled_total";
pub const NOTIFICATIONS_SUPPRESSED_TOTAL: &str = "market_chat_notifications_suppressed_total";
pub const STORE_OPERATION_DURATION: &str = "market_chat_store_operation_duration_seconds";
pub const ACTIVE_SUBSCRIPTIONS: &str = "market_chat_active_subscriptions";
pub const ERRORS_TOTAL: &str = "market_chat_errors_total";

/// Metrics collection and management
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsCollector;

impl MetricsCollector {
    /// Initialize metrics collection
    pub fn init() -> Result<()> {
        metrics::set_global_recorder(metrics::NoopRecorder)
            .map_err(|e| anyhow::anyhow!("Failed to initialize metrics recorder: {}", e))?;

        Ok(())
    }

    /// Record a store operation and its latency
    pub fn record_store_operation(&self, operation: &'static str, duration: Duration, success: bool) {
        let status = if success { "success" } else { "error" };
        histogram!(STORE_OPERATION_DURATION, "operation" => operation, "status" => status)
            .record(duration.as_secs_f64());

        if !success {
            counter!(ERRORS_TOTAL, "type" => "database", "operation" => operation).increment(1);
        }
    }

    pub fn record_message_sent(&self) {
        counter!(MESSAGES_SENT_TOTAL).increment(1);
    }

    pub fn record_room_created(&self) {
        counter!(ROOMS_CREATED_TOTAL).increment(1);
    }

    /// Record a scheduled notification for the given delivery path
    pub fn record_notification_scheduled(&self, path: &'static str) {
        counter!(NOTIFICATIONS_SCHEDULED_TOTAL, "path" => path).increment(1);
    }

    /// Record a suppressed notification with its reason
    pub fn record_notification_suppressed(&self, path: &'static str, reason: &'static str) {
        counter!(NOTIFICATIONS_SUPPRESSED_TOTAL, "path" => path, "reason" => reason).increment(1);
    }

    /// Track the number of live subscriptions
    pub fn subscription_opened(&self) {
        gauge!(ACTIVE_SUBSCRIPTIONS).increment(1.0);
    }

    pub fn subscription_closed(&self) {
        gauge!(ACTIVE_SUBSCRIPTIONS).decrement(1.0);
    }

    /// Record error metrics
    pub fn record_error(&self, error_type: &'static str, operation: &'static str) {
        counter!(ERRORS_TOTAL, "type" => error_type, "operation" => operation).increment(1);
    }
}

/// Performance timing wrapper for store metrics
pub struct MetricsTimer {
    collector: MetricsCollector,
    operation: &'static str,
    start: std::time::Instant,
}

impl MetricsTimer {
    pub fn new(collector: MetricsCollector, operation: &'static str) -> Self {
        Self {
            collector,
            operation,
            start: std::time::Instant::now(),
        }
    }

    pub fn finish(self, success: bool) {
        let duration = self.start.elapsed();
        self.collector.record_store_operation(self.operation, duration, success);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let collector = MetricsCollector;
        collector.record_message_sent();
        collector.record_notification_suppressed("background", "room_open");
        MetricsTimer::new(collector, "append_message").finish(true);
    }
}
