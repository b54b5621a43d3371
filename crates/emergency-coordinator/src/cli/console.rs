//! Line commands and output formatting for `emcoord run`.

use crate::event::{EmergencyEvent, EventId, ResponseType};
use crate::state::{Notice, Snapshot};
use crate::transition::legal_responses;

/// One line typed into the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// `respond <id> <checked|emergency|normal> [notes...]`
    Respond {
        /// Target event.
        event_id: EventId,
        /// Chosen response.
        response_type: ResponseType,
        /// Remaining words, if any.
        notes: Option<String>,
    },
    /// `dismiss`
    Dismiss,
    /// `status`
    Status,
    /// `help`
    Help,
    /// `quit` or `exit`
    Quit,
}

/// Usage text printed by `help`.
pub const HELP: &str = "\
commands:
  respond <id> <checked|emergency|normal> [notes]
  dismiss
  status
  help
  quit";

impl ConsoleCommand {
    /// Parse a console line. Blank lines parse to `None`.
    ///
    /// # Errors
    ///
    /// Returns a message suitable for printing if the line is not a command.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "respond" | "r" => {
                let event_id = words
                    .next()
                    .ok_or("usage: respond <id> <checked|emergency|normal> [notes]")?
                    .parse::<EventId>()
                    .map_err(|e| e.to_string())?;
                let response_type = words
                    .next()
                    .ok_or("missing response type")?
                    .parse::<ResponseType>()
                    .map_err(|e| e.to_string())?;
                let notes = words.collect::<Vec<_>>().join(" ");
                Self::Respond {
                    event_id,
                    response_type,
                    notes: (!notes.is_empty()).then_some(notes),
                }
            }
            "dismiss" | "d" => Self::Dismiss,
            "status" | "s" => Self::Status,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => return Err(format!("unknown command '{other}', type 'help'")),
        };
        Ok(Some(command))
    }
}

fn event_line(event: &EmergencyEvent) -> String {
    let line = format!(
        "#{} {} by {} [{}] at {}",
        event.event_id,
        event.event_type.label(),
        event.triggered_by,
        event.status,
        event.event_time.format("%Y-%m-%d %H:%M:%S"),
    );
    match &event.details {
        Some(details) => format!("{line} ({})", details.describe()),
        None => line,
    }
}

fn actions(event: &EmergencyEvent) -> String {
    legal_responses(event.status, event.triggered_by)
        .into_iter()
        .map(ResponseType::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render a notice for the console.
#[must_use]
pub fn format_notice(notice: &Notice) -> String {
    match notice {
        Notice::Alert { event } => {
            format!("ALERT {}\n      actions: {}", event_line(event), actions(event))
        }
        Notice::Queued {
            event_id,
            unread_count,
        } => format!("queued #{event_id} ({unread_count} unread)"),
        Notice::DispatchFailed {
            event_id,
            classification,
            message,
        } => format!("notification {classification} for #{event_id} failed: {message}"),
        Notice::RecordFailed { event_id, message } => {
            format!("could not record response for #{event_id}: {message}")
        }
        Notice::FeedDisconnected { operator_id, reason } => {
            format!("feed for operator {operator_id} disconnected: {reason}")
        }
    }
}

/// Render a snapshot for the `status` command.
///
/// The header is followed by one line per unresolved event: `>` marks the
/// displayed alert and `~` a response still being recorded. The legal
/// actions for the displayed alert close the listing.
#[must_use]
pub fn format_snapshot(snapshot: &Snapshot) -> String {
    let operator = match &snapshot.operator {
        Some(identity) => format!("operator {}", identity.operator_id),
        None => "no operator".to_string(),
    };
    let mut lines = vec![format!(
        "{operator}, {} unresolved, {} unread",
        snapshot.events.len(),
        snapshot.unread_count
    )];

    for event in &snapshot.events {
        let marker = if snapshot.displayed == Some(event.event_id) {
            '>'
        } else if snapshot.in_flight.contains(&event.event_id) {
            '~'
        } else {
            ' '
        };
        lines.push(format!(" {marker} {}", event_line(event)));
    }
    if let Some(event) = snapshot.displayed_event() {
        lines.push(format!("   actions for #{}: {}", event.event_id, actions(event)));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventStatus, EventType, OperatorId, OperatorIdentity, TriggeredBy};

    #[test]
    fn test_parse_respond_with_notes() {
        let command = ConsoleCommand::parse("respond 12 emergency calling the school")
            .unwrap()
            .unwrap();
        assert_eq!(
            command,
            ConsoleCommand::Respond {
                event_id: EventId(12),
                response_type: ResponseType::Emergency,
                notes: Some("calling the school".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_respond_aliases() {
        let command = ConsoleCommand::parse("r 3 normal").unwrap().unwrap();
        assert_eq!(
            command,
            ConsoleCommand::Respond {
                event_id: EventId(3),
                response_type: ResponseType::ConfirmedNormal,
                notes: None,
            }
        );
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(ConsoleCommand::parse("dismiss").unwrap(), Some(ConsoleCommand::Dismiss));
        assert_eq!(ConsoleCommand::parse(" STATUS ").unwrap(), Some(ConsoleCommand::Status));
        assert_eq!(ConsoleCommand::parse("exit").unwrap(), Some(ConsoleCommand::Quit));
        assert_eq!(ConsoleCommand::parse("?").unwrap(), Some(ConsoleCommand::Help));
        assert_eq!(ConsoleCommand::parse("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_errors() {
        assert!(ConsoleCommand::parse("respond").is_err());
        assert!(ConsoleCommand::parse("respond x checked").is_err());
        assert!(ConsoleCommand::parse("respond 1 shrug").is_err());
        assert!(ConsoleCommand::parse("launch").unwrap_err().contains("launch"));
    }

    #[test]
    fn test_format_alert_lists_legal_actions() {
        let event = EmergencyEvent::new(
            EventId(4),
            OperatorId(1),
            EventType::PanicButton,
            TriggeredBy::Student,
        );
        let text = format_notice(&Notice::Alert { event });
        assert!(text.starts_with("ALERT #4 Panic button by student [pending]"));
        assert!(text.contains("actions: CHECKED"));
        assert!(!text.contains("EMERGENCY"));
    }

    #[test]
    fn test_format_snapshot_marks_displayed() {
        let mut second = EmergencyEvent::new(
            EventId(2),
            OperatorId(1),
            EventType::SensorAlert,
            TriggeredBy::Sensor,
        );
        second.status = EventStatus::EmergencyConfirmed;
        let snapshot = Snapshot {
            operator: Some(OperatorIdentity::new(OperatorId(1))),
            events: vec![
                EmergencyEvent::new(
                    EventId(1),
                    OperatorId(1),
                    EventType::PanicButton,
                    TriggeredBy::Driver,
                ),
                second,
            ],
            displayed: Some(EventId(2)),
            unread_count: 2,
            in_flight: vec![EventId(1)],
        };

        let text = format_snapshot(&snapshot);
        assert!(text.starts_with("operator 1, 2 unresolved, 2 unread"));
        assert!(text.contains(" ~ #1 Panic button"));
        assert!(text.contains(" > #2 Sensor alert"));
        assert!(text.ends_with("actions for #2: CONFIRMED_NORMAL"));
    }

    #[test]
    fn test_format_snapshot_without_display() {
        let snapshot = Snapshot {
            events: vec![EmergencyEvent::new(
                EventId(5),
                OperatorId(1),
                EventType::PanicButton,
                TriggeredBy::Driver,
            )],
            unread_count: 0,
            ..Snapshot::default()
        };

        let text = format_snapshot(&snapshot);
        assert!(text.starts_with("no operator, 1 unresolved, 0 unread"));
        assert!(!text.contains("actions"));
    }
}
