//! Change-sequence polling over the reference store.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::{forward, ChangeKind, FeedAdapter, FeedDelta, RawEventRow, Subscription};
use crate::error::Result;
use crate::event::{EventStatus, OperatorId};
use crate::storage::{run_blocking, Storage};

/// Polls a [`Storage`] for rows whose change sequence moved.
///
/// The first poll delivers every existing row of the operator as created.
/// Afterwards an id seen for the first time is created and a known id is
/// updated. Settled rows are forgotten once forwarded; if one changes again
/// it is reported as created, which the coordinator absorbs.
#[derive(Debug)]
pub struct PollingFeed {
    storage: Arc<Storage>,
    poll_interval: Duration,
}

impl PollingFeed {
    /// Create a feed polling `storage` every `poll_interval`.
    #[must_use]
    pub fn new(storage: Arc<Storage>, poll_interval: Duration) -> Self {
        Self {
            storage,
            poll_interval,
        }
    }

    /// The configured poll interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

impl FeedAdapter for PollingFeed {
    fn name(&self) -> &'static str {
        "polling"
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

        let storage = Arc::clone(&self.storage);
        let cancelled = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&cancelled);
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let task = tokio::spawn(async move {
            let mut cursor = 0_i64;
            let mut seen: HashSet<i64> = HashSet::new();

            while !stop.load(Ordering::SeqCst) {
                ticker.tick().await;

                let polled =
                    run_blocking(&storage, move |s| s.changes_since(operator_id, cursor)).await;
                let changes = match polled {
                    Ok(changes) => changes,
                    Err(e) => {
                        warn!(%operator_id, error = %e, "Polling the event store failed");
                        let _ = sink
                            .send(FeedDelta::Disconnected {
                                operator_id,
                                reason: e.to_string(),
                            })
                            .await;
                        break;
                    }
                };

                trace!(%operator_id, cursor, count = changes.len(), "Polled event store");
                for (seq, row) in changes {
                    cursor = cursor.max(seq);
                    let kind = if seen.insert(row.id) {
                        ChangeKind::Insert
                    } else {
                        ChangeKind::Update
                    };
                    if is_settled(&row) {
                        seen.remove(&row.id);
                    }
                    if !forward(&sink, kind, &row).await {
                        return;
                    }
                }
            }
            debug!(%operator_id, "Polling feed stopped");
        });

        info!(
            %operator_id,
            interval_ms = self.poll_interval.as_millis(),
            "Subscribed to polling feed"
        );
        Ok(Some(Subscription::new(operator_id, cancelled, task)))
    }
}

fn is_settled(row: &RawEventRow) -> bool {
    row.status
        .as_deref()
        .and_then(|status| status.parse::<EventStatus>().ok())
        .is_some_and(EventStatus::is_terminal)
}
