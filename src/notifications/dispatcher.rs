//! Retrying delivery of pending notifications

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{DeliveryState, NotificationSink, NotificationStore};
use crate::metrics;
use crate::utils::retry::{with_retry, RetryConfig};

/// Counters of one dispatch pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Drains the notification store into a sink
///
/// Each notification is retried with exponential backoff; once the retries
/// are exhausted it is logged as a permanent failure and dropped.
pub struct NotificationDispatcher {
    store: Arc<dyn NotificationStore>,
    sink: Arc<dyn NotificationSink>,
    retry: RetryConfig,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        sink: Arc<dyn NotificationSink>,
        retry: RetryConfig,
    ) -> Self {
        Self { store, sink, retry }
    }

    /// Deliver every pending notification, one at a time
    pub async fn dispatch_pending(&self, now: NaiveDateTime) -> DispatchReport {
        let _timer = metrics::start_job_timer("dispatch");
        let mut report = DispatchReport::default();

        for notification in self.store.pending(now) {
            let sink = Arc::clone(&self.sink);
            let result = with_retry(&self.retry, || {
                let sink = Arc::clone(&sink);
                let notification = notification.clone();
                async move {
                    sink.deliver(&notification)
                        .await
                        .map_err(anyhow::Error::from)
                }
            })
            .await;

            match result {
                Ok(()) => {
                    self.store.mark(notification.id, DeliveryState::Delivered);
                    metrics::record_notification("delivered");
                    report.delivered += 1;
                }
                Err(e) => {
                    self.store.mark(notification.id, DeliveryState::Dropped);
                    metrics::record_notification("dropped");
                    report.dropped += 1;
                    tracing::error!(
                        sink = self.sink.name(),
                        slot_id = notification.slot_id,
                        attempts = self.retry.max_retries + 1,
                        error = %e,
                        "Notification delivery failed permanently, dropping"
                    );
                }
            }
        }

        if report.delivered + report.dropped > 0 {
            tracing::info!(
                sink = self.sink.name(),
                delivered = report.delivered,
                dropped = report.dropped,
                "Notifications dispatched"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Slot, Team, TeamPolicy};
    use crate::notifications::{
        EmptySlotNotification, InMemoryNotificationStore, SinkError, SinkResult,
    };
    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` deliveries
    struct FlakySink {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl NotificationSink for FlakySink {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn deliver(&self, _notification: &EmptySlotNotification) -> SinkResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(SinkError::Unavailable("try later".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn queue(store: &InMemoryNotificationStore, slot_id: i64) {
        let team = Team {
            id: 1,
            name: "Platform".to_string(),
            policy: TeamPolicy::default(),
            is_active: true,
            created_at: now(),
        };
        let slot = Slot {
            id: slot_id,
            team_id: 1,
            start_time: now() + Duration::hours(4),
            end_time: now() + Duration::hours(5),
            assigned_member: None,
            is_holiday: false,
        };
        store.push(EmptySlotNotification::new(&team, &slot, now()), now());
    }

    fn dispatcher(
        store: &Arc<InMemoryNotificationStore>,
        sink: &Arc<FlakySink>,
    ) -> NotificationDispatcher {
        NotificationDispatcher::new(
            Arc::clone(store) as Arc<dyn NotificationStore>,
            Arc::clone(sink) as Arc<dyn NotificationSink>,
            RetryConfig::with_delays(3, 1, 4),
        )
    }

    #[tokio::test]
    async fn test_delivers_after_transient_failures() {
        let store = Arc::new(InMemoryNotificationStore::new(Duration::hours(24)));
        queue(&store, 1);
        let sink = Arc::new(FlakySink {
            failures: 2,
            calls: AtomicU32::new(0),
        });

        let report = dispatcher(&store, &sink).dispatch_pending(now()).await;
        assert_eq!(report, DispatchReport { delivered: 1, dropped: 0 });
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        assert!(store.pending(now()).is_empty());
    }

    #[tokio::test]
    async fn test_drops_after_retries_exhausted() {
        let store = Arc::new(InMemoryNotificationStore::new(Duration::hours(24)));
        queue(&store, 1);
        let sink = Arc::new(FlakySink {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        });

        let report = dispatcher(&store, &sink).dispatch_pending(now()).await;
        assert_eq!(report, DispatchReport { delivered: 0, dropped: 1 });
        // first try plus three retries
        assert_eq!(sink.calls.load(Ordering::SeqCst), 4);
        assert_eq!(store.recent(now())[0].1, DeliveryState::Dropped);

        // a dropped notification is not redelivered on the next pass
        let again = dispatcher(&store, &sink).dispatch_pending(now()).await;
        assert_eq!(again, DispatchReport::default());
    }
}
