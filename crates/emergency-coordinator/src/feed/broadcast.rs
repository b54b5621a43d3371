//! In-process push channel.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::{forward, FeedAdapter, FeedDelta, RawEventRow, Subscription};
use crate::error::{Error, Result};
use crate::event::OperatorId;

/// Whether a raw change was an insert or an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A new row.
    Insert,
    /// A modified row.
    Update,
}

/// A raw change published by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct RawChange {
    /// Insert or update.
    pub kind: ChangeKind,
    /// The full row after the change.
    pub row: RawEventRow,
}

/// A push channel living in the same process as the store.
///
/// Publishers call [`BroadcastFeed::publish`]; every subscription receives
/// the changes for its operator. [`BroadcastFeed::close`] simulates the
/// channel going away.
#[derive(Debug)]
pub struct BroadcastFeed {
    sender: Mutex<Option<broadcast::Sender<RawChange>>>,
}

impl BroadcastFeed {
    /// Create a channel buffering up to `capacity` changes per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Mutex::new(Some(sender)),
        }
    }

    /// Publish a change. Returns how many subscribers received it.
    pub fn publish(&self, change: RawChange) -> usize {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            // No receivers is not a failure for a push channel.
            Some(sender) => sender.send(change).unwrap_or(0),
            None => {
                debug!(event_id = change.row.id, "Feed closed; change not published");
                0
            }
        }
    }

    /// Publish an inserted row.
    pub fn publish_insert(&self, row: RawEventRow) -> usize {
        self.publish(RawChange {
            kind: ChangeKind::Insert,
            row,
        })
    }

    /// Publish an updated row.
    pub fn publish_update(&self, row: RawEventRow) -> usize {
        self.publish(RawChange {
            kind: ChangeKind::Update,
            row,
        })
    }

    /// Drop the channel. Live subscriptions report a disconnect.
    pub fn close(&self) {
        let mut guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.take().is_some() {
            info!("Event feed closed");
        }
    }
}

impl FeedAdapter for BroadcastFeed {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    fn subscribe(
        &self,
        operator_id: Option<OperatorId>,
        sink: mpsc::Sender<FeedDelta>,
    ) -> Result<Option<Subscription>> {
        let Some(operator_id) = operator_id else {
            debug!("No operator identity yet; not subscribing");
            return Ok(None);
        };

        let mut rx = {
            let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
            guard
                .as_ref()
                .ok_or_else(|| Error::feed_subscribe("push channel is closed"))?
                .subscribe()
        };

        let cancelled = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(change) => {
                        if change.row.operator_id != operator_id.0 {
                            continue;
                        }
                        if !forward(&sink, change.kind, &change.row).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%operator_id, skipped, "Feed subscriber lagged; changes were lost");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!(%operator_id, "Push channel closed");
                        let _ = sink
                            .send(FeedDelta::Disconnected {
                                operator_id,
                                reason: "push channel closed".to_string(),
                            })
                            .await;
                        break;
                    }
                }
            }
        });

        info!(%operator_id, "Subscribed to broadcast feed");
        Ok(Some(Subscription::new(operator_id, cancelled, task)))
    }
}
