//! The response state machine.
//!
//! Every status change the coordinator applies goes through [`next_status`].
//! The table is:
//!
//! | current               | response           | new status            | dispatch           | leaves unresolved |
//! |-----------------------|--------------------|-----------------------|--------------------|-------------------|
//! | `pending`             | `CHECKED`          | `checked`             | -                  | yes               |
//! | `pending`             | `EMERGENCY`        | `emergency_confirmed` | `EMERGENCY`        | no                |
//! | `emergency_confirmed` | `CONFIRMED_NORMAL` | `resolved`            | `CONFIRMED_NORMAL` | yes               |
//!
//! Student-triggered events only ever take the first row.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::{EventStatus, ResponseType, TriggeredBy};

/// Kind of outbound message a transition produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    /// A new event arrived.
    NewEmergency,
    /// The operator confirmed an emergency.
    Emergency,
    /// The operator confirmed the emergency is over.
    ConfirmedNormal,
    /// The operator checked the event.
    Checked,
}

impl Classification {
    /// Wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewEmergency => "NEW_EMERGENCY",
            Self::Emergency => "EMERGENCY",
            Self::ConfirmedNormal => "CONFIRMED_NORMAL",
            Self::Checked => "CHECKED",
        }
    }

    /// Inverse of [`Classification::as_str`].
    #[must_use]
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw {
            "NEW_EMERGENCY" => Some(Self::NewEmergency),
            "EMERGENCY" => Some(Self::Emergency),
            "CONFIRMED_NORMAL" => Some(Self::ConfirmedNormal),
            "CHECKED" => Some(Self::Checked),
            _ => None,
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// A legal status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Status before the response.
    pub from: EventStatus,
    /// Status after the response.
    pub to: EventStatus,
    /// Message to send, if any.
    pub dispatch: Option<Classification>,
    /// Whether the event leaves the unresolved set.
    pub retires: bool,
}

/// Why a response was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// Students can only have their events checked.
    #[error("{response} is not allowed for student-triggered events")]
    StudentTriggered {
        /// The refused response.
        response: ResponseType,
    },

    /// The pair is not in the table.
    #[error("cannot apply {response} to an event that is {from}")]
    Illegal {
        /// Current status.
        from: EventStatus,
        /// The refused response.
        response: ResponseType,
    },
}

/// Compute the effect of `response` on an event in `current` status.
///
/// # Errors
///
/// Returns [`TransitionError`] for any combination outside the table,
/// including every non-`CHECKED` response on a student-triggered event.
pub fn next_status(
    current: EventStatus,
    response: ResponseType,
    triggered_by: TriggeredBy,
) -> Result<Transition, TransitionError> {
    if triggered_by == TriggeredBy::Student && response != ResponseType::Checked {
        return Err(TransitionError::StudentTriggered { response });
    }

    let (to, dispatch, retires) = match (current, response) {
        (EventStatus::Pending, ResponseType::Checked) => (EventStatus::Checked, None, true),
        (EventStatus::Pending, ResponseType::Emergency) => (
            EventStatus::EmergencyConfirmed,
            Some(Classification::Emergency),
            false,
        ),
        (EventStatus::EmergencyConfirmed, ResponseType::ConfirmedNormal) => (
            EventStatus::Resolved,
            Some(Classification::ConfirmedNormal),
            true,
        ),
        (from, response) => return Err(TransitionError::Illegal { from, response }),
    };

    Ok(Transition {
        from: current,
        to,
        dispatch,
        retires,
    })
}

/// Responses that are legal for an event right now, in display order.
#[must_use]
pub fn legal_responses(current: EventStatus, triggered_by: TriggeredBy) -> Vec<ResponseType> {
    [
        ResponseType::Checked,
        ResponseType::Emergency,
        ResponseType::ConfirmedNormal,
    ]
    .into_iter()
    .filter(|response| next_status(current, *response, triggered_by).is_ok())
    .collect()
}
