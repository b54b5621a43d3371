//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::event::{EventType, TriggeredBy};

/// Run the coordinator console.
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Operator to coordinate for (overrides the config file)
    #[arg(short, long)]
    pub operator: Option<i64>,

    /// Driver name used in outbound messages
    #[arg(short, long)]
    pub driver_name: Option<String>,
}

/// Insert an event as a device would.
#[derive(Debug, Args)]
pub struct RaiseCommand {
    /// Operator the event belongs to
    #[arg(short, long)]
    pub operator: i64,

    /// Event type
    #[arg(short, long, value_enum, default_value = "panic-button")]
    pub event_type: EventTypeArg,

    /// Who raised the event
    #[arg(short, long, value_enum, default_value = "driver")]
    pub trigger: TriggerArg,

    /// Sensor diagnostics as JSON, e.g. '{"temperature": 51.2}'
    #[arg(long)]
    pub details: Option<String>,
}

/// List stored events.
#[derive(Debug, Args)]
pub struct EventsCommand {
    /// Only events of this operator
    #[arg(short, long)]
    pub operator: Option<i64>,

    /// Only pending or confirmed events
    #[arg(short, long)]
    pub unresolved: bool,

    /// Maximum number of results
    #[arg(short, long, default_value = "20")]
    pub limit: usize,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// List queued notifications.
#[derive(Debug, Args)]
pub struct OutboxCommand {
    /// Maximum number of results
    #[arg(short, long, default_value = "20")]
    pub limit: usize,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,

    /// Record that the notification with this idempotency key was sent
    #[arg(long, value_name = "KEY")]
    pub mark_delivered: Option<String>,
}

/// Show store statistics.
#[derive(Debug, Args)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        file: Option<PathBuf>,
    },
}

/// Event type argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EventTypeArg {
    /// Panic button pressed
    PanicButton,
    /// Vehicle sensor threshold crossed
    SensorAlert,
    /// Driver unresponsive
    DriverIncapacitated,
}

impl From<EventTypeArg> for EventType {
    fn from(arg: EventTypeArg) -> Self {
        match arg {
            EventTypeArg::PanicButton => Self::PanicButton,
            EventTypeArg::SensorAlert => Self::SensorAlert,
            EventTypeArg::DriverIncapacitated => Self::DriverIncapacitated,
        }
    }
}

/// Trigger argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TriggerArg {
    /// A vehicle sensor
    Sensor,
    /// The driver
    Driver,
    /// A student
    Student,
}

impl From<TriggerArg> for TriggeredBy {
    fn from(arg: TriggerArg) -> Self {
        match arg {
            TriggerArg::Sensor => Self::Sensor,
            TriggerArg::Driver => Self::Driver,
            TriggerArg::Student => Self::Student,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_arg_conversion() {
        assert_eq!(EventType::from(EventTypeArg::PanicButton), EventType::PanicButton);
        assert_eq!(EventType::from(EventTypeArg::SensorAlert), EventType::SensorAlert);
        assert_eq!(
            EventType::from(EventTypeArg::DriverIncapacitated),
            EventType::DriverIncapacitated
        );
    }

    #[test]
    fn test_trigger_arg_conversion() {
        assert_eq!(TriggeredBy::from(TriggerArg::Sensor), TriggeredBy::Sensor);
        assert_eq!(TriggeredBy::from(TriggerArg::Driver), TriggeredBy::Driver);
        assert_eq!(TriggeredBy::from(TriggerArg::Student), TriggeredBy::Student);
    }

    #[test]
    fn test_value_enum_names() {
        let names: Vec<_> = EventTypeArg::value_variants()
            .iter()
            .filter_map(|v| v.to_possible_value())
            .map(|v| v.get_name().to_string())
            .collect();
        assert_eq!(names, ["panic-button", "sensor-alert", "driver-incapacitated"]);
    }
}
