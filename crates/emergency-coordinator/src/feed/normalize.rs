//! Raw store rows and their normalization into [`EmergencyEvent`]s.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{Error, Result};
use crate::event::{
    DriverResponse, EmergencyEvent, EventId, EventStatus, EventType, OperatorId, ResponseType,
    SensorDetails, TriggeredBy,
};

/// An event row as the store delivers it, before any interpretation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEventRow {
    /// Store-assigned id.
    pub id: i64,
    /// Owning operator.
    pub operator_id: i64,
    /// Occurrence time, RFC 3339 or `YYYY-MM-DD HH:MM:SS` (UTC).
    pub event_time: String,
    /// Event type wire name.
    pub event_type: String,
    /// Trigger wire name; absent means sensor.
    #[serde(default)]
    pub triggered_by: Option<String>,
    /// Free-form diagnostics.
    #[serde(default)]
    pub details: Option<Value>,
    /// Status wire name; absent means pending.
    #[serde(default)]
    pub status: Option<String>,
    /// Last response type wire name.
    #[serde(default)]
    pub driver_response: Option<String>,
    /// Time of the last response.
    #[serde(default)]
    pub response_time: Option<String>,
    /// Notes of the last response.
    #[serde(default)]
    pub response_notes: Option<String>,
}

impl RawEventRow {
    /// Turn the row into a canonical event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Normalize`] if the time, trigger or status cannot be
    /// understood. Unknown event types and sensor payloads are tolerated.
    pub fn normalize(&self) -> Result<EmergencyEvent> {
        let event_time = parse_time(&self.event_time)
            .ok_or_else(|| Error::normalize("event_time", &self.event_time))?;

        let triggered_by = match self.triggered_by.as_deref() {
            None | Some("") => TriggeredBy::Sensor,
            Some(raw) => raw.parse()?,
        };

        let status = match self.status.as_deref() {
            None | Some("") => EventStatus::Pending,
            Some(raw) => raw.parse()?,
        };

        let details = self
            .details
            .as_ref()
            .filter(|raw| !raw.is_null())
            .map(SensorDetails::from_raw);

        Ok(EmergencyEvent {
            event_id: EventId(self.id),
            operator_id: OperatorId(self.operator_id),
            event_time,
            event_type: EventType::from(self.event_type.clone()),
            triggered_by,
            details,
            status,
            driver_response: self.driver_response(event_time),
        })
    }

    /// The last response, if the row carries a readable one.
    ///
    /// Falls back to the event time when the response time is missing.
    fn driver_response(&self, event_time: DateTime<Utc>) -> Option<DriverResponse> {
        let raw = self.driver_response.as_deref().filter(|s| !s.is_empty())?;
        let response_type = match raw.parse::<ResponseType>() {
            Ok(response_type) => response_type,
            Err(e) => {
                warn!(event_id = self.id, error = %e, "Ignoring unreadable driver response");
                return None;
            }
        };

        let responded_at = self
            .response_time
            .as_deref()
            .and_then(parse_time)
            .unwrap_or(event_time);

        Some(DriverResponse {
            response_type,
            responded_at,
            notes: self.response_notes.clone(),
        })
    }

    /// A minimal valid row for tests.
    #[cfg(test)]
    pub(crate) fn sample(id: i64, operator_id: i64) -> Self {
        Self {
            id,
            operator_id,
            event_time: "2024-05-01T07:30:00Z".to_string(),
            event_type: "PANIC_BUTTON".to_string(),
            triggered_by: Some("driver".to_string()),
            details: None,
            status: Some("pending".to_string()),
            driver_response: None,
            response_time: None,
            response_notes: None,
        }
    }
}

/// Parse the time formats the store is known to emit.
fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}
