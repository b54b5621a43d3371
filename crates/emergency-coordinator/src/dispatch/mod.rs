//! Outbound notification dispatch.
//!
//! The coordinator hands every transition that carries a
//! [`Classification`] to a [`NotificationDispatcher`]. Dispatch is
//! fire-and-forget: a failure is reported once and never retried here.
//! Each request carries an idempotency key so a downstream delivery
//! worker can drop repeats that survive a restart.

mod message;
mod outbox;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::event::{EmergencyEvent, EventId};
use crate::transition::Classification;

pub use message::compose_message;
pub use outbox::OutboxDispatcher;

/// Idempotency key for one (event, classification) pair.
///
/// BLAKE3 of `"<event_id>:<classification>"`, hex encoded.
#[must_use]
pub fn dispatch_key(event_id: EventId, classification: Classification) -> String {
    blake3::hash(format!("{event_id}:{classification}").as_bytes())
        .to_hex()
        .to_string()
}

/// Everything a dispatcher needs to send one message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchRequest {
    /// The event as the coordinator holds it after the transition.
    pub event: EmergencyEvent,
    /// Kind of message.
    pub classification: Classification,
    /// Display name of the driver, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_name: Option<String>,
    /// See [`dispatch_key`].
    pub idempotency_key: String,
    /// Composed message text.
    pub message: String,
}

impl DispatchRequest {
    /// Build a request, composing the key and the message text.
    #[must_use]
    pub fn new(
        event: EmergencyEvent,
        classification: Classification,
        driver_name: Option<String>,
        utc_offset_minutes: i32,
    ) -> Self {
        let message = compose_message(
            &event,
            classification,
            driver_name.as_deref(),
            utc_offset_minutes,
        );
        Self {
            idempotency_key: dispatch_key(event.event_id, classification),
            event,
            classification,
            driver_name,
            message,
        }
    }
}

/// What a dispatcher reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReceipt {
    /// Key of the dispatched message.
    pub idempotency_key: String,
    /// `false` when the backend already had this key.
    pub accepted: bool,
}

/// Sends outbound notifications.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync + std::fmt::Debug {
    /// The name of this dispatcher (for logging).
    fn name(&self) -> &'static str;

    /// Send one message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message could not be handed off.
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchReceipt>;
}

/// Dispatcher that only writes the message to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

impl LogDispatcher {
    /// Create a new log dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchReceipt> {
        info!(
            event_id = %request.event.event_id,
            classification = %request.classification,
            key = %request.idempotency_key,
            "Notification: {}",
            request.message.replace('\n', " | ")
        );
        Ok(DispatchReceipt {
            idempotency_key: request.idempotency_key.clone(),
            accepted: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventType, OperatorId, TriggeredBy};

    fn event(id: i64) -> EmergencyEvent {
        EmergencyEvent::new(
            EventId(id),
            OperatorId(1),
            EventType::PanicButton,
            TriggeredBy::Driver,
        )
    }

    #[test]
    fn test_dispatch_key_is_stable_and_distinct() {
        let a = dispatch_key(EventId(1), Classification::Emergency);
        assert_eq!(a, dispatch_key(EventId(1), Classification::Emergency));
        assert_eq!(a.len(), 64);
        assert_ne!(a, dispatch_key(EventId(1), Classification::ConfirmedNormal));
        assert_ne!(a, dispatch_key(EventId(2), Classification::Emergency));
    }

    #[test]
    fn test_request_composes_key_and_message() {
        let request = DispatchRequest::new(
            event(5),
            Classification::Emergency,
            Some("Anan".to_string()),
            0,
        );
        assert_eq!(
            request.idempotency_key,
            dispatch_key(EventId(5), Classification::Emergency)
        );
        assert!(request.message.contains("Driver: Anan"));
        assert!(request.message.contains("#5"));
    }

    #[tokio::test]
    async fn test_log_dispatcher_accepts() {
        let dispatcher = LogDispatcher::new();
        let request = DispatchRequest::new(event(1), Classification::NewEmergency, None, 0);
        let receipt = dispatcher.dispatch(&request).await.unwrap();
        assert!(receipt.accepted);
        assert_eq!(dispatcher.name(), "log");
    }
}
