//! Core event types for the emergency coordinator.
//!
//! This module defines the canonical records that flow between the feed,
//! the coordinator, the recorder and the dispatcher.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Store-assigned identity of one real-world incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub i64);

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| Error::normalize("event_id", s))
    }
}

/// Numeric identity of the driver/vehicle owner that events are scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperatorId(pub i64);

impl std::fmt::Display for OperatorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The resolved operator a coordinator session runs for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorIdentity {
    /// Operator the feed subscription is filtered by.
    pub operator_id: OperatorId,
    /// Name used in outbound messages, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl OperatorIdentity {
    /// Create an identity without a display name.
    #[must_use]
    pub fn new(operator_id: OperatorId) -> Self {
        Self {
            operator_id,
            display_name: None,
        }
    }

    /// Attach a display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// What caused an emergency event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    /// The in-cab panic button was pressed.
    PanicButton,
    /// A vehicle sensor crossed an alert threshold.
    SensorAlert,
    /// The driver stopped responding.
    DriverIncapacitated,
    /// A type this build does not know yet.
    Other(String),
}

impl EventType {
    /// Wire representation used by the store.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::PanicButton => "PANIC_BUTTON",
            Self::SensorAlert => "SENSOR_ALERT",
            Self::DriverIncapacitated => "DRIVER_INCAPACITATED",
            Self::Other(raw) => raw,
        }
    }

    /// Short human label for messages.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::PanicButton => "Panic button",
            Self::SensorAlert => "Sensor alert",
            Self::DriverIncapacitated => "Driver incapacitated",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for EventType {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PANIC_BUTTON" => Self::PanicButton,
            "SENSOR_ALERT" => Self::SensorAlert,
            "DRIVER_INCAPACITATED" => Self::DriverIncapacitated,
            _ => Self::Other(raw),
        }
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        event_type.as_str().to_string()
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Who raised the event. Determines which responses are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggeredBy {
    /// An automatic vehicle sensor.
    Sensor,
    /// The driver.
    Driver,
    /// A student on board.
    Student,
}

impl TriggeredBy {
    /// Wire representation used by the store.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sensor => "sensor",
            Self::Driver => "driver",
            Self::Student => "student",
        }
    }
}

impl FromStr for TriggeredBy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sensor" => Ok(Self::Sensor),
            "driver" => Ok(Self::Driver),
            "student" => Ok(Self::Student),
            _ => Err(Error::normalize("triggered_by", s)),
        }
    }
}

impl std::fmt::Display for TriggeredBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Derived status of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Nobody has responded yet.
    Pending,
    /// The operator looked at it and it needs nothing further.
    Checked,
    /// The operator confirmed a real emergency.
    EmergencyConfirmed,
    /// A confirmed emergency is over.
    Resolved,
}

impl EventStatus {
    /// Wire representation used by the store.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Checked => "checked",
            Self::EmergencyConfirmed => "emergency_confirmed",
            Self::Resolved => "resolved",
        }
    }

    /// Terminal statuses take the event out of the unresolved set.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Checked | Self::Resolved)
    }
}

impl FromStr for EventStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "checked" => Ok(Self::Checked),
            "emergency_confirmed" => Ok(Self::EmergencyConfirmed),
            "resolved" => Ok(Self::Resolved),
            _ => Err(Error::normalize("status", s)),
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// An operator action applied to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseType {
    /// "I looked, nothing to do."
    Checked,
    /// "This is a real emergency."
    Emergency,
    /// "The emergency is over, everything is normal."
    ConfirmedNormal,
}

impl ResponseType {
    /// Wire representation used by the store.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Checked => "CHECKED",
            Self::Emergency => "EMERGENCY",
            Self::ConfirmedNormal => "CONFIRMED_NORMAL",
        }
    }
}

impl FromStr for ResponseType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CHECKED" | "CHECK" => Ok(Self::Checked),
            "EMERGENCY" => Ok(Self::Emergency),
            "CONFIRMED_NORMAL" | "NORMAL" => Ok(Self::ConfirmedNormal),
            _ => Err(Error::normalize("response_type", s)),
        }
    }
}

impl std::fmt::Display for ResponseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Diagnostic payload attached to sensor events.
///
/// Only ever used to build message text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorDetails {
    /// Cabin temperature reading.
    Temperature {
        /// Degrees Celsius.
        celsius: f64,
    },
    /// Smoke detector reading.
    Smoke {
        /// Sensor-specific smoke level.
        level: f64,
    },
    /// Gas sensor reading.
    Gas {
        /// Parts per million.
        ppm: f64,
    },
    /// Anything else the device sent.
    Unknown {
        /// The raw payload.
        raw: Value,
    },
}

impl SensorDetails {
    /// Interpret a free-form payload.
    #[must_use]
    pub fn from_raw(raw: &Value) -> Self {
        let number = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| raw.get(*key).and_then(Value::as_f64))
        };

        if let Some(celsius) = number(&["temperature", "temp"]) {
            Self::Temperature { celsius }
        } else if let Some(level) = number(&["smoke_level", "smoke"]) {
            Self::Smoke { level }
        } else if let Some(ppm) = number(&["gas_level", "gas"]) {
            Self::Gas { ppm }
        } else {
            Self::Unknown { raw: raw.clone() }
        }
    }

    /// One-line description for outbound messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Temperature { celsius } => format!("temperature {celsius:.1}°C"),
            Self::Smoke { level } => format!("smoke level {level:.1}"),
            Self::Gas { ppm } => format!("gas level {ppm:.0} ppm"),
            Self::Unknown { .. } => "unrecognized sensor reading".to_string(),
        }
    }
}

/// The last response recorded against an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverResponse {
    /// What the operator chose.
    pub response_type: ResponseType,
    /// When it was recorded.
    pub responded_at: DateTime<Utc>,
    /// Free-text notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// One real-world incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyEvent {
    /// Store-assigned id.
    pub event_id: EventId,
    /// Owning operator.
    pub operator_id: OperatorId,
    /// When the incident happened.
    pub event_time: DateTime<Utc>,
    /// What kind of incident.
    pub event_type: EventType,
    /// Who raised it.
    pub triggered_by: TriggeredBy,
    /// Sensor diagnostics, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<SensorDetails>,
    /// Current derived status.
    pub status: EventStatus,
    /// Last recorded response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver_response: Option<DriverResponse>,
}

impl EmergencyEvent {
    /// Create a fresh pending event.
    #[must_use]
    pub fn new(
        event_id: EventId,
        operator_id: OperatorId,
        event_type: EventType,
        triggered_by: TriggeredBy,
    ) -> Self {
        Self {
            event_id,
            operator_id,
            event_time: Utc::now(),
            event_type,
            triggered_by,
            details: None,
            status: EventStatus::Pending,
            driver_response: None,
        }
    }

    /// Whether the event has left the unresolved state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether a student raised this event.
    #[must_use]
    pub fn is_student_triggered(&self) -> bool {
        self.triggered_by == TriggeredBy::Student
    }
}

/// One operator action, as appended to the response log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyResponse {
    /// Log row id, assigned by storage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Event the response applies to.
    pub event_id: EventId,
    /// Operator who responded.
    pub operator_id: OperatorId,
    /// The action taken.
    pub response_type: ResponseType,
    /// When it was taken.
    pub response_time: DateTime<Utc>,
    /// Free-text notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}
