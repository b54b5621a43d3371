//! Human-readable notification text.

use chrono::{DateTime, FixedOffset, Offset, Utc};

use crate::event::{EmergencyEvent, TriggeredBy};
use crate::transition::Classification;

fn headline(classification: Classification) -> &'static str {
    match classification {
        Classification::NewEmergency => "New emergency alert",
        Classification::Emergency => "Emergency confirmed by the driver",
        Classification::ConfirmedNormal => "Situation back to normal",
        Classification::Checked => "Alert checked by the driver",
    }
}

fn trigger_label(triggered_by: TriggeredBy) -> &'static str {
    match triggered_by {
        TriggeredBy::Sensor => "vehicle sensor",
        TriggeredBy::Driver => "driver",
        TriggeredBy::Student => "student",
    }
}

/// Render `time` in a fixed UTC offset. Offsets chrono rejects fall back to UTC.
fn local_time(time: DateTime<Utc>, utc_offset_minutes: i32) -> String {
    let offset = utc_offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(|| Utc.fix());
    time.with_timezone(&offset)
        .format("%Y-%m-%d %H:%M (UTC%:z)")
        .to_string()
}

/// Compose the message describing `classification` for `event`.
///
/// The text is one headline followed by `key: value` lines. The response
/// time is used when the event carries one, otherwise the event time.
#[must_use]
pub fn compose_message(
    event: &EmergencyEvent,
    classification: Classification,
    driver_name: Option<&str>,
    utc_offset_minutes: i32,
) -> String {
    let mut lines = vec![
        headline(classification).to_string(),
        format!("Event: {} (#{})", event.event_type.label(), event.event_id),
        format!("Raised by: {}", trigger_label(event.triggered_by)),
    ];
    if let Some(name) = driver_name.map(str::trim).filter(|n| !n.is_empty()) {
        lines.push(format!("Driver: {name}"));
    }

    let time = match (classification, &event.driver_response) {
        (Classification::NewEmergency, _) | (_, None) => event.event_time,
        (_, Some(response)) => response.responded_at,
    };
    lines.push(format!("Time: {}", local_time(time, utc_offset_minutes)));

    if let Some(details) = &event.details {
        lines.push(format!("Details: {}", details.describe()));
    }
    let notes = event
        .driver_response
        .as_ref()
        .and_then(|r| r.notes.as_deref())
        .map(str::trim)
        .filter(|n| !n.is_empty());
    if let Some(notes) = notes.filter(|_| classification != Classification::NewEmergency) {
        lines.push(format!("Notes: {notes}"));
    }

    lines.join("\n")
}
