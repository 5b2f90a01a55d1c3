//! Delivery targets for empty-slot notifications

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::EmptySlotNotification;

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Errors that can occur while delivering a notification
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Sink temporarily unavailable
    #[error("Sink temporarily unavailable: {0}")]
    Unavailable(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("Sink error: {0}")]
    Other(String),
}

/// Somewhere a notification can be delivered
///
/// Implement this trait to route notifications to a custom channel.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Sink name used in logs
    fn name(&self) -> &str;

    /// Deliver one notification
    async fn deliver(&self, notification: &EmptySlotNotification) -> SinkResult<()>;
}

/// Writes each notification to the log as structured JSON
#[derive(Debug, Default)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn deliver(&self, notification: &EmptySlotNotification) -> SinkResult<()> {
        let payload = serde_json::to_string(notification)?;
        tracing::warn!(
            slot_id = notification.slot_id,
            team_id = notification.team_id,
            hours_from_now = notification.hours_from_now,
            %payload,
            "Empty slot"
        );
        Ok(())
    }
}

/// Fans notifications out to live subscribers over a tokio broadcast channel
pub struct BroadcastSink {
    sender: broadcast::Sender<EmptySlotNotification>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EmptySlotNotification> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl NotificationSink for BroadcastSink {
    fn name(&self) -> &str {
        "broadcast"
    }

    async fn deliver(&self, notification: &EmptySlotNotification) -> SinkResult<()> {
        self.sender
            .send(notification.clone())
            .map(|receivers| {
                tracing::debug!(receivers, slot_id = notification.slot_id, "Notification broadcast");
            })
            .map_err(|_| SinkError::Unavailable("no subscribers".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Slot, Team, TeamPolicy};
    use chrono::{Duration, NaiveDate};

    fn sample() -> EmptySlotNotification {
        let now = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let team = Team {
            id: 1,
            name: "Platform".to_string(),
            policy: TeamPolicy::default(),
            is_active: true,
            created_at: now,
        };
        let slot = Slot {
            id: 5,
            team_id: 1,
            start_time: now + Duration::hours(2),
            end_time: now + Duration::hours(3),
            assigned_member: None,
            is_holiday: false,
        };
        EmptySlotNotification::new(&team, &slot, now)
    }

    #[tokio::test]
    async fn test_tracing_sink_always_delivers() {
        assert!(TracingSink.deliver(&sample()).await.is_ok());
    }

    #[tokio::test]
    async fn test_broadcast_sink_reaches_subscribers() {
        let sink = BroadcastSink::new(8);
        let mut rx = sink.subscribe();
        let n = sample();

        sink.deliver(&n).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), n);
    }

    #[tokio::test]
    async fn test_broadcast_sink_without_subscribers_is_unavailable() {
        let sink = BroadcastSink::new(8);
        let err = sink.deliver(&sample()).await.unwrap_err();
        assert!(matches!(err, SinkError::Unavailable(_)));
    }
}
