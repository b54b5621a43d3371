//! Outbox-table dispatcher.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use super::{DispatchReceipt, DispatchRequest, NotificationDispatcher};
use crate::error::Result;
use crate::storage::{run_blocking, OutboxMessage, Storage};

/// Writes each notification into the store's `outbox` table.
///
/// Rows are keyed by the idempotency key, so a repeated dispatch of the
/// same (event, classification) pair leaves exactly one row behind even
/// across restarts. Delivery to LINE or SMS happens downstream.
#[derive(Debug)]
pub struct OutboxDispatcher {
    storage: Arc<Storage>,
}

impl OutboxDispatcher {
    /// Create a dispatcher writing to `storage`.
    #[must_use]
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl NotificationDispatcher for OutboxDispatcher {
    fn name(&self) -> &'static str {
        "outbox"
    }

    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchReceipt> {
        let row = OutboxMessage {
            idempotency_key: request.idempotency_key.clone(),
            event_id: request.event.event_id,
            classification: request.classification,
            message: request.message.clone(),
            created_at: Utc::now(),
            delivered_at: None,
        };

        let queued = row.clone();
        let accepted =
            run_blocking(&self.storage, move |storage| storage.enqueue_outbox(&queued)).await?;
        if accepted {
            info!(
                event_id = %row.event_id,
                classification = %row.classification,
                "Notification queued"
            );
        } else {
            debug!(key = %row.idempotency_key, "Notification already queued");
        }

        Ok(DispatchReceipt {
            idempotency_key: row.idempotency_key,
            accepted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EmergencyEvent, EventId, EventType, OperatorId, TriggeredBy};
    use crate::transition::Classification;

    fn request(id: i64, classification: Classification) -> DispatchRequest {
        let event = EmergencyEvent::new(
            EventId(id),
            OperatorId(1),
            EventType::DriverIncapacitated,
            TriggeredBy::Sensor,
        );
        DispatchRequest::new(event, classification, None, 0)
    }

    #[tokio::test]
    async fn test_dispatch_writes_outbox_row() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let dispatcher = OutboxDispatcher::new(Arc::clone(&storage));

        let receipt = dispatcher
            .dispatch(&request(7, Classification::Emergency))
            .await
            .unwrap();
        assert!(receipt.accepted);

        let rows = storage.list_outbox(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].event_id, EventId(7));
        assert_eq!(rows[0].classification, Classification::Emergency);
        assert!(rows[0].message.contains("Driver incapacitated"));
    }

    #[tokio::test]
    async fn test_repeat_dispatch_keeps_one_row() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let dispatcher = OutboxDispatcher::new(Arc::clone(&storage));
        let req = request(7, Classification::ConfirmedNormal);

        assert!(dispatcher.dispatch(&req).await.unwrap().accepted);
        assert!(!dispatcher.dispatch(&req).await.unwrap().accepted);
        assert_eq!(storage.list_outbox(10).unwrap().len(), 1);
        assert_eq!(dispatcher.name(), "outbox");
    }
}
