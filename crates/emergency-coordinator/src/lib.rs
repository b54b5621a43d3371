//! `emergency-coordinator` - Emergency-event coordination core
//!
//! This library ingests safety-critical events for one operator, keeps
//! exactly one alert on screen at a time, drives the per-event response
//! state machine and hands each notifying transition to a dispatcher at
//! most once.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod feed;
pub mod logging;
pub mod recorder;
pub mod state;
pub mod storage;
pub mod transition;

pub use config::Config;
pub use coordinator::{Coordinator, CoordinatorConfig, CoordinatorHandle};
pub use dispatch::{LogDispatcher, NotificationDispatcher, OutboxDispatcher};
pub use error::{Error, Result};
pub use event::{
    EmergencyEvent, EmergencyResponse, EventId, EventStatus, EventType, OperatorId,
    OperatorIdentity, ResponseType, TriggeredBy,
};
pub use feed::{BroadcastFeed, FeedAdapter, FeedDelta, PollingFeed};
pub use logging::init_logging;
pub use recorder::{ResponseRecorder, SqliteRecorder};
pub use state::{Notice, Rejection, ResponseOutcome, Snapshot};
pub use storage::{Storage, StorageStats};
pub use transition::{next_status, Classification, Transition, TransitionError};
