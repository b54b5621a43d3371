//! Response persistence.
//!
//! A recorder appends one row to the response log and then patches the
//! event's stored status. The patch is best-effort: the response log is the
//! source of truth and a failed patch is healed by the next feed update.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::event::{DriverResponse, EmergencyResponse, EventId, EventStatus, OperatorId, ResponseType};
use crate::storage::{run_blocking, Storage};

/// What the coordinator asks a recorder to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseRequest {
    /// Event being responded to.
    pub event_id: EventId,
    /// Operator responding.
    pub operator_id: OperatorId,
    /// The chosen response.
    pub response_type: ResponseType,
    /// Free-text notes.
    pub notes: Option<String>,
    /// Status the event moves to, as computed by the transition table.
    pub new_status: EventStatus,
}

/// Outcome of a successful record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordReceipt {
    /// The appended log entry.
    pub response: EmergencyResponse,
    /// Whether the event row was patched as well.
    pub status_patched: bool,
}

/// Persists operator responses.
#[async_trait]
pub trait ResponseRecorder: Send + Sync + std::fmt::Debug {
    /// Append the response and patch the event status.
    ///
    /// # Errors
    ///
    /// Returns an error only if the response could not be appended.
    async fn record(&self, request: &ResponseRequest) -> Result<RecordReceipt>;
}

/// Recorder backed by the reference [`Storage`].
///
/// The patch bumps the row's change sequence, so a [`PollingFeed`] on the
/// same store reports it back as an update.
///
/// [`PollingFeed`]: crate::feed::PollingFeed
#[derive(Debug)]
pub struct SqliteRecorder {
    storage: Arc<Storage>,
}

impl SqliteRecorder {
    /// Create a recorder writing to `storage`.
    #[must_use]
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl ResponseRecorder for SqliteRecorder {
    async fn record(&self, request: &ResponseRequest) -> Result<RecordReceipt> {
        let mut response = EmergencyResponse {
            id: None,
            event_id: request.event_id,
            operator_id: request.operator_id,
            response_type: request.response_type,
            response_time: Utc::now(),
            notes: request.notes.clone(),
        };
        let reply = DriverResponse {
            response_type: response.response_type,
            responded_at: response.response_time,
            notes: response.notes.clone(),
        };

        let entry = response.clone();
        let (event_id, new_status) = (request.event_id, request.new_status);
        let (id, patch) = run_blocking(&self.storage, move |storage| {
            let id = storage.append_response(&entry)?;
            Ok((id, storage.patch_event_status(event_id, new_status, &reply)))
        })
        .await?;
        response.id = Some(id);
        debug!(event_id = %request.event_id, response = %request.response_type, "Response appended");

        let status_patched = match patch {
            Ok(Some(_)) => true,
            Ok(None) => {
                warn!(event_id = %request.event_id, "Event row missing; status not patched");
                false
            }
            Err(e) => {
                warn!(event_id = %request.event_id, error = %e, "Failed to patch event status");
                false
            }
        };

        info!(
            event_id = %request.event_id,
            status = %request.new_status,
            status_patched,
            "Response recorded"
        );
        Ok(RecordReceipt {
            response,
            status_patched,
        })
    }
}
