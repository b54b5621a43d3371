//! Coordinator state and its mutations.
//!
//! [`CoordinatorState`] is plain data owned by the coordinator loop. Every
//! method is synchronous and returns the [`Effect`]s the loop must carry
//! out, which keeps all ordering decisions testable without a runtime.
//!
//! Invariants held after every method returns:
//!
//! - the displayed event, if any, is unresolved;
//! - an event id appears at most once in the unresolved set;
//! - a retired id never re-enters the unresolved set while it is
//!   remembered (the most recent [`RETIRED_CAPACITY`] ids are);
//! - at most one dispatch per (event, classification) is emitted within a
//!   session, and resubscribing for the same operator keeps the session.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::event::{
    DriverResponse, EmergencyEvent, EventId, EventStatus, OperatorId, OperatorIdentity,
    ResponseType,
};
use crate::recorder::{RecordReceipt, ResponseRequest};
use crate::transition::{next_status, Classification, Transition, TransitionError};

/// Why a command was refused before any side effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// No operator identity is active.
    #[error("coordinator has no operator identity")]
    NotStarted,

    /// The event is not in the unresolved set.
    #[error("event {0} is not an unresolved event")]
    UnknownEvent(EventId),

    /// A response for this event is still being recorded.
    #[error("a response for event {0} is already being recorded")]
    InFlight(EventId),

    /// The transition table refused the response.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// The coordinator loop is gone.
    #[error("coordinator is not running")]
    Unavailable,
}

/// A user-visible, non-blocking message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// An event became the displayed alert.
    Alert {
        /// The displayed event.
        event: EmergencyEvent,
    },
    /// An event arrived while another was displayed.
    Queued {
        /// The queued event.
        event_id: EventId,
        /// Unread events after queueing.
        unread_count: usize,
    },
    /// A notification could not be sent.
    DispatchFailed {
        /// Event the notification described.
        event_id: EventId,
        /// Kind of notification.
        classification: Classification,
        /// Failure description.
        message: String,
    },
    /// A response could not be recorded; local state is unchanged.
    RecordFailed {
        /// Event the response was for.
        event_id: EventId,
        /// Failure description.
        message: String,
    },
    /// The event feed went away.
    FeedDisconnected {
        /// Operator whose subscription dropped.
        operator_id: OperatorId,
        /// Failure description.
        reason: String,
    },
}

/// Work the coordinator loop must do after a mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Broadcast a notice.
    Notify(Notice),
    /// Send a notification for `event`.
    Dispatch {
        /// The event after the transition.
        event: EmergencyEvent,
        /// Kind of notification.
        classification: Classification,
    },
}

/// A validated response waiting for the recorder.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingResponse {
    /// What to persist.
    pub request: ResponseRequest,
    /// The transition the response will apply.
    pub transition: Transition,
    /// The event as it was when the response was accepted.
    pub event: EmergencyEvent,
    /// Session the response was accepted in.
    pub session: u64,
}

/// How a submitted response settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// The response was recorded and applied.
    Applied {
        /// The event.
        event_id: EventId,
        /// Status after the transition.
        status: EventStatus,
        /// Whether the event left the unresolved set.
        retired: bool,
        /// Notification scheduled by this response.
        dispatch: Option<Classification>,
    },
    /// The recorder failed. Nothing changed.
    RecordFailed {
        /// The event.
        event_id: EventId,
        /// Failure description.
        message: String,
    },
    /// The session ended while the response was being recorded.
    Superseded {
        /// The event.
        event_id: EventId,
    },
}

/// Point-in-time view for the presentation surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    /// Active identity.
    pub operator: Option<OperatorIdentity>,
    /// Unresolved events in arrival order.
    pub events: Vec<EmergencyEvent>,
    /// Displayed event id.
    pub displayed: Option<EventId>,
    /// Unresolved events not yet acknowledged.
    pub unread_count: usize,
    /// Events with a response being recorded.
    pub in_flight: Vec<EventId>,
}

impl Snapshot {
    /// The displayed event, if any.
    #[must_use]
    pub fn displayed_event(&self) -> Option<&EmergencyEvent> {
        let id = self.displayed?;
        self.events.iter().find(|e| e.event_id == id)
    }

    /// Look up an unresolved event.
    #[must_use]
    pub fn event(&self, event_id: EventId) -> Option<&EmergencyEvent> {
        self.events.iter().find(|e| e.event_id == event_id)
    }
}

#[derive(Debug, Clone)]
struct Tracked {
    event: EmergencyEvent,
    arrival: u64,
}

/// How many retired ids are remembered for absorbing redeliveries.
pub const RETIRED_CAPACITY: usize = 4096;

/// Retired ids, oldest evicted first once [`RETIRED_CAPACITY`] is reached.
#[derive(Debug)]
struct RetiredIds {
    ids: HashSet<EventId>,
    order: VecDeque<EventId>,
    capacity: usize,
}

impl Default for RetiredIds {
    fn default() -> Self {
        Self::with_capacity(RETIRED_CAPACITY)
    }
}

impl RetiredIds {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn contains(&self, id: &EventId) -> bool {
        self.ids.contains(id)
    }

    fn insert(&mut self, id: EventId) {
        if !self.ids.insert(id) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

/// In-memory coordination state for one operator.
#[derive(Debug, Default)]
pub struct CoordinatorState {
    operator: Option<OperatorIdentity>,
    unresolved: HashMap<EventId, Tracked>,
    next_arrival: u64,
    read: HashSet<EventId>,
    displayed: Option<EventId>,
    retired: RetiredIds,
    in_flight: HashSet<EventId>,
    dispatched: HashSet<(EventId, Classification)>,
    session: u64,
    announce_new_events: bool,
}

impl CoordinatorState {
    /// Create an empty state.
    #[must_use]
    pub fn new(announce_new_events: bool) -> Self {
        Self {
            announce_new_events,
            ..Self::default()
        }
    }

    /// The active identity.
    #[must_use]
    pub fn operator(&self) -> Option<&OperatorIdentity> {
        self.operator.as_ref()
    }

    /// The current session generation.
    #[must_use]
    pub fn session(&self) -> u64 {
        self.session
    }

    /// Switch to `operator`.
    ///
    /// The same operator keeps everything, so a resubscribe after a
    /// disconnect neither replays alerts nor repeats dispatches, and
    /// responses in flight still settle. Any other identity starts a fresh
    /// session. Returns `true` when the state was kept.
    pub fn begin_session(&mut self, operator: Option<OperatorIdentity>) -> bool {
        let same_operator = matches!(
            (&self.operator, &operator),
            (Some(current), Some(next)) if current.operator_id == next.operator_id
        );
        if same_operator {
            self.operator = operator;
            return true;
        }
        self.reset(operator);
        false
    }

    /// Drop everything and start a new session for `operator`.
    ///
    /// Responses accepted before the reset settle as
    /// [`ResponseOutcome::Superseded`].
    pub fn reset(&mut self, operator: Option<OperatorIdentity>) {
        *self = Self {
            operator,
            session: self.session + 1,
            announce_new_events: self.announce_new_events,
            ..Self::default()
        };
    }

    /// The displayed event id.
    #[must_use]
    pub fn displayed(&self) -> Option<EventId> {
        self.displayed
    }

    /// Whether `event_id` is unresolved.
    #[must_use]
    pub fn contains(&self, event_id: EventId) -> bool {
        self.unresolved.contains_key(&event_id)
    }

    /// Number of unresolved events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.unresolved.len()
    }

    /// Whether there are no unresolved events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// Number of remembered retired ids.
    #[must_use]
    pub fn retired_len(&self) -> usize {
        self.retired.len()
    }

    /// Number of remembered (event, classification) dispatches.
    #[must_use]
    pub fn dispatched_len(&self) -> usize {
        self.dispatched.len()
    }

    /// Unresolved events not yet acknowledged.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        let read = self
            .read
            .iter()
            .filter(|id| self.unresolved.contains_key(*id))
            .count();
        self.unresolved.len() - read
    }

    /// Build a presentation snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let mut tracked: Vec<&Tracked> = self.unresolved.values().collect();
        tracked.sort_by_key(|t| t.arrival);
        let mut in_flight: Vec<EventId> = self.in_flight.iter().copied().collect();
        in_flight.sort();

        Snapshot {
            operator: self.operator.clone(),
            events: tracked.into_iter().map(|t| t.event.clone()).collect(),
            displayed: self.displayed,
            unread_count: self.unread_count(),
            in_flight,
        }
    }

    fn is_foreign(&self, event: &EmergencyEvent) -> bool {
        match &self.operator {
            Some(identity) => identity.operator_id != event.operator_id,
            None => true,
        }
    }

    /// Handle a `Created` delta.
    pub fn ingest_created(&mut self, event: EmergencyEvent) -> Vec<Effect> {
        if self.is_foreign(&event) {
            debug!(event_id = %event.event_id, operator_id = %event.operator_id, "Ignoring event for another operator");
            return Vec::new();
        }
        let id = event.event_id;
        if self.retired.contains(&id) || self.unresolved.contains_key(&id) {
            debug!(event_id = %id, "Duplicate delivery absorbed");
            return Vec::new();
        }
        if event.is_terminal() {
            debug!(event_id = %id, status = %event.status, "Event already settled; not tracking");
            self.retired.insert(id);
            return Vec::new();
        }
        self.track(event)
    }

    /// Handle an `Updated` delta.
    pub fn apply_updated(&mut self, event: EmergencyEvent) -> Vec<Effect> {
        if self.is_foreign(&event) {
            debug!(event_id = %event.event_id, "Ignoring update for another operator");
            return Vec::new();
        }
        let id = event.event_id;

        if event.is_terminal() {
            self.retired.insert(id);
            if !self.in_flight.contains(&id) {
                self.forget_dispatches(id);
            }
            if self.unresolved.contains_key(&id) {
                info!(event_id = %id, status = %event.status, "Event settled by feed update");
                return self.remove(id);
            }
            debug!(event_id = %id, "Settled update for untracked event");
            return Vec::new();
        }

        if let Some(tracked) = self.unresolved.get_mut(&id) {
            debug!(event_id = %id, status = %event.status, "Event updated");
            tracked.event = event;
            return Vec::new();
        }
        if self.retired.contains(&id) {
            debug!(event_id = %id, "Stale update for retired event absorbed");
            return Vec::new();
        }
        debug!(event_id = %id, "Update arrived before insert; ingesting");
        self.track(event)
    }

    /// Acknowledge the displayed event and promote the next one.
    pub fn dismiss(&mut self) -> Vec<Effect> {
        let Some(id) = self.displayed.take() else {
            return Vec::new();
        };
        debug!(event_id = %id, "Displayed event dismissed");
        self.read.insert(id);
        self.promote()
    }

    /// Validate a response and mark it in flight.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] if there is no identity, the event is not
    /// unresolved, a response is already in flight, or the transition table
    /// refuses the response.
    pub fn begin_response(
        &mut self,
        event_id: EventId,
        response_type: ResponseType,
        notes: Option<String>,
    ) -> Result<PendingResponse, Rejection> {
        let operator_id = self
            .operator
            .as_ref()
            .map(|o| o.operator_id)
            .ok_or(Rejection::NotStarted)?;
        let tracked = self
            .unresolved
            .get(&event_id)
            .ok_or(Rejection::UnknownEvent(event_id))?;
        if self.in_flight.contains(&event_id) {
            return Err(Rejection::InFlight(event_id));
        }

        let event = tracked.event.clone();
        let transition = next_status(event.status, response_type, event.triggered_by)?;
        self.in_flight.insert(event_id);

        Ok(PendingResponse {
            request: ResponseRequest {
                event_id,
                operator_id,
                response_type,
                notes,
                new_status: transition.to,
            },
            transition,
            event,
            session: self.session,
        })
    }

    /// Settle a response once the recorder has answered.
    pub fn finish_response(
        &mut self,
        pending: PendingResponse,
        result: Result<RecordReceipt, String>,
    ) -> (ResponseOutcome, Vec<Effect>) {
        let event_id = pending.request.event_id;
        if pending.session != self.session {
            debug!(
                event_id = %event_id,
                accepted_in = pending.session,
                current = self.session,
                "Response settled after its session ended; discarding"
            );
            return (ResponseOutcome::Superseded { event_id }, Vec::new());
        }
        self.in_flight.remove(&event_id);

        let receipt = match result {
            Ok(receipt) => receipt,
            Err(message) => {
                let notice = Notice::RecordFailed {
                    event_id,
                    message: message.clone(),
                };
                return (
                    ResponseOutcome::RecordFailed { event_id, message },
                    vec![Effect::Notify(notice)],
                );
            }
        };

        let transition = pending.transition;
        let reply = DriverResponse {
            response_type: receipt.response.response_type,
            responded_at: receipt.response.response_time,
            notes: receipt.response.notes,
        };

        let mut event = match self.unresolved.get_mut(&event_id) {
            Some(tracked) => {
                tracked.event.status = transition.to;
                tracked.event.driver_response = Some(reply);
                tracked.event.clone()
            }
            None => {
                debug!(event_id = %event_id, "Event left the set while recording");
                let mut event = pending.event;
                event.driver_response = Some(reply);
                event
            }
        };
        event.status = transition.to;
        info!(
            event_id = %event_id,
            from = %transition.from,
            to = %transition.to,
            "Response applied"
        );

        let mut effects = Vec::new();
        let mut retired = false;
        if transition.retires {
            self.retired.insert(event_id);
            if self.unresolved.contains_key(&event_id) {
                effects.extend(self.remove(event_id));
            }
            retired = true;
        }

        let dispatch = transition
            .dispatch
            .filter(|c| self.dispatched.insert((event_id, *c)));
        if let Some(classification) = dispatch {
            effects.push(Effect::Dispatch {
                event,
                classification,
            });
        }
        if self.retired.contains(&event_id) {
            self.forget_dispatches(event_id);
        }

        (
            ResponseOutcome::Applied {
                event_id,
                status: transition.to,
                retired,
                dispatch,
            },
            effects,
        )
    }

    /// A retired id can no longer be ingested or responded to, so its
    /// dispatch guard entries are dead weight.
    fn forget_dispatches(&mut self, event_id: EventId) {
        self.dispatched.retain(|(id, _)| *id != event_id);
    }

    fn track(&mut self, event: EmergencyEvent) -> Vec<Effect> {
        let id = event.event_id;
        let announce = self.announce_new_events && !event.is_student_triggered();
        let arrival = self.next_arrival;
        self.next_arrival += 1;
        self.unresolved.insert(
            id,
            Tracked {
                event: event.clone(),
                arrival,
            },
        );

        let mut effects = Vec::new();
        if self.displayed.is_none() {
            self.displayed = Some(id);
            info!(event_id = %id, event_type = %event.event_type, "Displaying alert");
            effects.push(Effect::Notify(Notice::Alert {
                event: event.clone(),
            }));
        } else {
            info!(event_id = %id, "Alert queued");
            effects.push(Effect::Notify(Notice::Queued {
                event_id: id,
                unread_count: self.unread_count(),
            }));
        }

        if announce && self.dispatched.insert((id, Classification::NewEmergency)) {
            effects.push(Effect::Dispatch {
                event,
                classification: Classification::NewEmergency,
            });
        }
        effects
    }

    fn remove(&mut self, event_id: EventId) -> Vec<Effect> {
        self.unresolved.remove(&event_id);
        self.read.remove(&event_id);
        if self.displayed == Some(event_id) {
            self.displayed = None;
            return self.promote();
        }
        Vec::new()
    }

    fn promote(&mut self) -> Vec<Effect> {
        if self.displayed.is_some() {
            return Vec::new();
        }
        let next = self
            .unresolved
            .iter()
            .filter(|(id, _)| !self.read.contains(*id))
            .min_by_key(|(_, t)| t.arrival)
            .map(|(id, t)| (*id, t.event.clone()));

        match next {
            Some((id, event)) => {
                self.displayed = Some(id);
                info!(event_id = %id, "Promoting next alert");
                vec![Effect::Notify(Notice::Alert { event })]
            }
            None => Vec::new(),
        }
    }
}
