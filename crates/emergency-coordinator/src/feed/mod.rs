//! Event feed adapters.
//!
//! A feed adapter turns a push channel of raw store changes into
//! [`FeedDelta`]s for one operator. Adapters never deduplicate and never
//! retry; both are the coordinator's concern.
//!
//! Two adapters ship with the crate:
//!
//! - [`BroadcastFeed`]: an in-process channel that a co-located store
//!   publishes into.
//! - [`PollingFeed`]: polls a [`Storage`](crate::storage::Storage) for rows
//!   whose change sequence moved.

mod broadcast;
mod normalize;
mod polling;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::Result;
use crate::event::{EmergencyEvent, OperatorId};

pub use broadcast::{BroadcastFeed, ChangeKind, RawChange};
pub use normalize::RawEventRow;
pub use polling::PollingFeed;

/// A normalized change delivered to the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedDelta {
    /// The store inserted an event.
    Created(EmergencyEvent),
    /// The store updated an event; carries the full record.
    Updated(EmergencyEvent),
    /// The push channel went away. The subscription is dead.
    Disconnected {
        /// Operator whose subscription dropped.
        operator_id: OperatorId,
        /// Human-readable cause.
        reason: String,
    },
}

impl FeedDelta {
    /// The event carried by this delta, if any.
    #[must_use]
    pub fn event(&self) -> Option<&EmergencyEvent> {
        match self {
            Self::Created(event) | Self::Updated(event) => Some(event),
            Self::Disconnected { .. } => None,
        }
    }
}

/// A source of normalized emergency events.
pub trait FeedAdapter: Send + Sync + std::fmt::Debug {
    /// The name of this adapter (for logging).
    fn name(&self) -> &'static str;

    /// Start delivering deltas for `operator_id` into `sink`.
    ///
    /// Returns `Ok(None)` without subscribing when the identity is not
    /// known yet. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the push channel cannot be reached.
    fn subscribe(
        &self,
        operator_id: Option<OperatorId>,
        sink: mpsc::Sender<FeedDelta>,
    ) -> Result<Option<Subscription>>;
}

/// A live feed subscription.
///
/// Dropping it unsubscribes. [`Subscription::unsubscribe`] may be called
/// any number of times.
#[derive(Debug)]
pub struct Subscription {
    operator_id: OperatorId,
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Wrap the forwarding task of an adapter.
    #[must_use]
    pub fn new(operator_id: OperatorId, cancelled: Arc<AtomicBool>, task: JoinHandle<()>) -> Self {
        Self {
            operator_id,
            cancelled,
            task,
        }
    }

    /// The operator this subscription is filtered by.
    #[must_use]
    pub fn operator_id(&self) -> OperatorId {
        self.operator_id
    }

    /// Stop delivering deltas.
    pub fn unsubscribe(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.task.abort();
            debug!(operator_id = %self.operator_id, "Unsubscribed from event feed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Normalize a raw change and push it into the sink.
///
/// Returns `false` once the sink is closed and forwarding should stop.
async fn forward(sink: &mpsc::Sender<FeedDelta>, kind: ChangeKind, row: &RawEventRow) -> bool {
    let event = match row.normalize() {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(event_id = row.id, error = %e, "Dropping malformed event row");
            return true;
        }
    };

    let delta = match kind {
        ChangeKind::Insert => FeedDelta::Created(event),
        ChangeKind::Update => FeedDelta::Updated(event),
    };

    if sink.send(delta).await.is_err() {
        debug!("Feed sink closed");
        return false;
    }
    true
}
