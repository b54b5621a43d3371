//! The coordinator loop.
//!
//! A [`Coordinator`] owns the [`CoordinatorState`] and is the only place it
//! is mutated. Feed deltas, operator commands and completions of spawned
//! work all arrive as messages on channels that one task drains in turn.
//! Recording and dispatch run in their own tasks so the loop never waits on
//! the network.
//!
//! Operators and the presentation surface talk to the loop through a
//! cloneable [`CoordinatorHandle`].

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dispatch::{DispatchRequest, NotificationDispatcher};
use crate::error::{Error, Result};
use crate::event::{EventId, OperatorIdentity, ResponseType};
use crate::feed::{FeedAdapter, FeedDelta, Subscription};
use crate::recorder::{RecordReceipt, ResponseRecorder};
use crate::state::{
    CoordinatorState, Effect, Notice, PendingResponse, Rejection, ResponseOutcome, Snapshot,
};
use crate::transition::Classification;

/// Runtime settings of a coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Capacity of the command channel.
    pub command_capacity: usize,
    /// Capacity of the feed delta channel.
    pub feed_capacity: usize,
    /// Capacity of the notice broadcast channel.
    pub notice_capacity: usize,
    /// Driver name used when the identity carries none.
    pub driver_name: Option<String>,
    /// Dispatch `NEW_EMERGENCY` on first ingest of non-student events.
    pub announce_new_events: bool,
    /// Offset used for times in message text.
    pub utc_offset_minutes: i32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            command_capacity: 64,
            feed_capacity: 256,
            notice_capacity: 64,
            driver_name: None,
            announce_new_events: false,
            utc_offset_minutes: 0,
        }
    }
}

type ResponseReply = oneshot::Sender<std::result::Result<ResponseOutcome, Rejection>>;

#[derive(Debug)]
enum Command {
    Start {
        identity: Option<OperatorIdentity>,
        reply: oneshot::Sender<Result<bool>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Respond {
        event_id: EventId,
        response_type: ResponseType,
        notes: Option<String>,
        reply: ResponseReply,
    },
    Dismiss {
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}

#[derive(Debug)]
enum Completion {
    Recorded {
        pending: PendingResponse,
        result: std::result::Result<RecordReceipt, String>,
        reply: ResponseReply,
    },
    DispatchFailed {
        event_id: EventId,
        classification: Classification,
        message: String,
    },
}

/// The single mutation loop.
#[derive(Debug)]
pub struct Coordinator {
    feed: Arc<dyn FeedAdapter>,
    recorder: Arc<dyn ResponseRecorder>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    config: CoordinatorConfig,
    state: CoordinatorState,
    commands: mpsc::Receiver<Command>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    subscription: Option<Subscription>,
    deltas: Option<mpsc::Receiver<FeedDelta>>,
    snapshot: watch::Sender<Snapshot>,
    notices: broadcast::Sender<Notice>,
}

impl Coordinator {
    /// Create a coordinator and the handle that drives it.
    ///
    /// Nothing happens until [`Coordinator::run`] is polled and
    /// [`CoordinatorHandle::start`] is called.
    #[must_use]
    pub fn new(
        feed: Arc<dyn FeedAdapter>,
        recorder: Arc<dyn ResponseRecorder>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        config: CoordinatorConfig,
    ) -> (Self, CoordinatorHandle) {
        let (commands_tx, commands) = mpsc::channel(config.command_capacity.max(1));
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (snapshot, snapshot_rx) = watch::channel(Snapshot::default());
        let (notices, _) = broadcast::channel(config.notice_capacity.max(1));

        let handle = CoordinatorHandle {
            commands: commands_tx,
            snapshot: snapshot_rx,
            notices: notices.clone(),
        };

        let coordinator = Self {
            feed,
            recorder,
            dispatcher,
            state: CoordinatorState::new(config.announce_new_events),
            config,
            commands,
            completions_tx,
            completions_rx,
            subscription: None,
            deltas: None,
            snapshot,
            notices,
        };
        (coordinator, handle)
    }

    /// Run the loop on a new task.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run until [`CoordinatorHandle::shutdown`] is called or every handle
    /// is dropped.
    pub async fn run(mut self) {
        info!(
            feed = self.feed.name(),
            dispatcher = self.dispatcher.name(),
            "Coordinator running"
        );

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(completion) = self.completions_rx.recv() => {
                    self.handle_completion(completion);
                }
                delta = next_delta(&mut self.deltas) => match delta {
                    Some(delta) => self.handle_delta(delta),
                    None => {
                        debug!("Feed channel closed");
                        self.deltas = None;
                    }
                },
            }
        }

        self.unsubscribe();
        info!("Coordinator stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { identity, reply } => {
                let result = self.start(identity);
                self.publish_snapshot();
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                self.unsubscribe();
                self.state.reset(None);
                info!("Coordinator idle");
                self.publish_snapshot();
                let _ = reply.send(());
            }
            Command::Respond {
                event_id,
                response_type,
                notes,
                reply,
            } => match self.state.begin_response(event_id, response_type, notes) {
                Ok(pending) => {
                    self.publish_snapshot();
                    self.spawn_record(pending, reply);
                }
                Err(rejection) => {
                    debug!(event_id = %event_id, %rejection, "Response rejected");
                    let _ = reply.send(Err(rejection));
                }
            },
            Command::Dismiss { reply } => {
                let effects = self.state.dismiss();
                self.apply(effects);
                self.publish_snapshot();
                let _ = reply.send(());
            }
            // Handled by the loop itself.
            Command::Shutdown => {}
        }
    }

    /// Unsubscribe, then subscribe for `identity`.
    ///
    /// A different identity clears the state first. The same identity keeps
    /// it, which makes this the reconnect path after a feed disconnect.
    fn start(&mut self, identity: Option<OperatorIdentity>) -> Result<bool> {
        self.unsubscribe();
        if self.state.begin_session(identity.clone()) {
            info!(
                session = self.state.session(),
                retired = self.state.retired_len(),
                dispatched = self.state.dispatched_len(),
                "Resubscribing with current state"
            );
        }

        let (sink, deltas) = mpsc::channel(self.config.feed_capacity.max(1));
        let operator_id = identity.map(|i| i.operator_id);
        match self.feed.subscribe(operator_id, sink)? {
            Some(subscription) => {
                info!(operator_id = %subscription.operator_id(), "Coordinator started");
                self.subscription = Some(subscription);
                self.deltas = Some(deltas);
                Ok(true)
            }
            None => {
                info!("Coordinator started without an operator identity");
                Ok(false)
            }
        }
    }

    fn unsubscribe(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.deltas = None;
    }

    fn handle_delta(&mut self, delta: FeedDelta) {
        let effects = match delta {
            FeedDelta::Created(event) => self.state.ingest_created(event),
            FeedDelta::Updated(event) => self.state.apply_updated(event),
            FeedDelta::Disconnected {
                operator_id,
                reason,
            } => {
                warn!(%operator_id, %reason, "Event feed disconnected");
                self.subscription = None;
                vec![Effect::Notify(Notice::FeedDisconnected {
                    operator_id,
                    reason,
                })]
            }
        };
        self.apply(effects);
        self.publish_snapshot();
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Recorded {
                pending,
                result,
                reply,
            } => {
                if let Err(message) = &result {
                    warn!(event_id = %pending.request.event_id, error = %message, "Failed to record response");
                }
                let (outcome, effects) = self.state.finish_response(pending, result);
                self.apply(effects);
                self.publish_snapshot();
                let _ = reply.send(Ok(outcome));
            }
            Completion::DispatchFailed {
                event_id,
                classification,
                message,
            } => {
                self.notify(Notice::DispatchFailed {
                    event_id,
                    classification,
                    message,
                });
            }
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Notify(notice) => self.notify(notice),
                Effect::Dispatch {
                    event,
                    classification,
                } => {
                    let driver_name = self
                        .state
                        .operator()
                        .and_then(|o| o.display_name.clone())
                        .or_else(|| self.config.driver_name.clone());
                    let request = DispatchRequest::new(
                        event,
                        classification,
                        driver_name,
                        self.config.utc_offset_minutes,
                    );
                    self.spawn_dispatch(request);
                }
            }
        }
    }

    fn notify(&self, notice: Notice) {
        // No subscribers is fine.
        let _ = self.notices.send(notice);
    }

    fn publish_snapshot(&self) {
        self.snapshot.send_replace(self.state.snapshot());
    }

    fn spawn_record(&self, pending: PendingResponse, reply: ResponseReply) {
        let recorder = Arc::clone(&self.recorder);
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = recorder
                .record(&pending.request)
                .await
                .map_err(|e| e.to_string());
            let _ = completions.send(Completion::Recorded {
                pending,
                result,
                reply,
            });
        });
    }

    fn spawn_dispatch(&self, request: DispatchRequest) {
        let dispatcher = Arc::clone(&self.dispatcher);
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let event_id = request.event.event_id;
            let classification = request.classification;
            match dispatcher.dispatch(&request).await {
                Ok(receipt) => {
                    debug!(%event_id, %classification, accepted = receipt.accepted, "Notification dispatched");
                }
                Err(e) => {
                    warn!(%event_id, %classification, error = %e, "Notification dispatch failed");
                    let _ = completions.send(Completion::DispatchFailed {
                        event_id,
                        classification,
                        message: e.to_string(),
                    });
                }
            }
        });
    }
}

async fn next_delta(deltas: &mut Option<mpsc::Receiver<FeedDelta>>) -> Option<FeedDelta> {
    match deltas {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Cloneable handle to a running [`Coordinator`].
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<Snapshot>,
    notices: broadcast::Sender<Notice>,
}

impl CoordinatorHandle {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| Error::CoordinatorStopped)?;
        rx.await.map_err(|_| Error::CoordinatorStopped)
    }

    /// Subscribe for `identity`.
    ///
    /// A different operator replaces the previous session. Calling this
    /// again with the current operator resubscribes and keeps the state,
    /// which is how an owner recovers from [`Notice::FeedDisconnected`].
    /// Returns `false` when no identity was given and nothing was
    /// subscribed.
    ///
    /// # Errors
    ///
    /// Returns an error if the loop is gone or the feed refused the
    /// subscription.
    pub async fn start(&self, identity: Option<OperatorIdentity>) -> Result<bool> {
        self.request(|reply| Command::Start { identity, reply })
            .await?
    }

    /// Unsubscribe and clear all state.
    ///
    /// # Errors
    ///
    /// Returns an error if the loop is gone.
    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Submit an operator response.
    ///
    /// Resolves once local state has settled; the notification it causes
    /// may still be in flight.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] if the response was refused before any side
    /// effect.
    pub async fn submit_response(
        &self,
        event_id: EventId,
        response_type: ResponseType,
        notes: Option<String>,
    ) -> std::result::Result<ResponseOutcome, Rejection> {
        self.request(|reply| Command::Respond {
            event_id,
            response_type,
            notes,
            reply,
        })
        .await
        .map_err(|_| Rejection::Unavailable)?
    }

    /// Acknowledge the displayed alert.
    ///
    /// # Errors
    ///
    /// Returns an error if the loop is gone.
    pub async fn dismiss(&self) -> Result<()> {
        self.request(|reply| Command::Dismiss { reply }).await
    }

    /// The latest snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// A receiver that wakes on every snapshot change.
    #[must_use]
    pub fn watch_snapshot(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }

    /// Subscribe to notices published from now on.
    #[must_use]
    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Ask the loop to exit. Does nothing if it already has.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }
}
