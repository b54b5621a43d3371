//! Command-line interface for the emergency coordinator.
//!
//! This module provides the CLI structure and console helpers for the
//! `emcoord` binary.

mod commands;
mod console;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, EventTypeArg, EventsCommand, OutboxCommand, RaiseCommand, RunCommand,
    StatsCommand, TriggerArg,
};
pub use console::{format_notice, format_snapshot, ConsoleCommand, HELP};

use crate::logging::Verbosity;

/// emcoord - Coordinate emergency alerts for a school-bus operator
///
/// Ingests emergency events for one operator, shows one alert at a time,
/// records driver responses and queues parent notifications.
#[derive(Debug, Parser)]
#[command(name = "emcoord")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the coordinator console against the local store
    Run(RunCommand),

    /// Insert an emergency event
    Raise(RaiseCommand),

    /// List stored events
    Events(EventsCommand),

    /// List queued notifications or mark one delivered
    Outbox(OutboxCommand),

    /// Show store statistics
    Stats(StatsCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_name() {
        assert_eq!(Cli::command().get_name(), "emcoord");
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity_flags() {
        let cli = Cli::try_parse_from(["emcoord", "-q", "events"]).unwrap();
        assert_eq!(cli.verbosity(), Verbosity::Quiet);

        let cli = Cli::try_parse_from(["emcoord", "-vv", "events"]).unwrap();
        assert_eq!(cli.verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_parse_run() {
        let cli =
            Cli::try_parse_from(["emcoord", "run", "--operator", "7", "--driver-name", "Anan"])
                .unwrap();
        match cli.command {
            Command::Run(run) => {
                assert_eq!(run.operator, Some(7));
                assert_eq!(run.driver_name.as_deref(), Some("Anan"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_raise() {
        let cli = Cli::try_parse_from([
            "emcoord",
            "raise",
            "--operator",
            "3",
            "--event-type",
            "sensor-alert",
            "--trigger",
            "sensor",
            "--details",
            r#"{"gas": 900}"#,
        ])
        .unwrap();
        match cli.command {
            Command::Raise(raise) => {
                assert_eq!(raise.operator, 3);
                assert_eq!(raise.event_type, EventTypeArg::SensorAlert);
                assert_eq!(raise.trigger, TriggerArg::Sensor);
                assert!(raise.details.is_some());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_raise_defaults() {
        let cli = Cli::try_parse_from(["emcoord", "raise", "-o", "1"]).unwrap();
        match cli.command {
            Command::Raise(raise) => {
                assert_eq!(raise.event_type, EventTypeArg::PanicButton);
                assert_eq!(raise.trigger, TriggerArg::Driver);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_events_and_outbox() {
        let cli =
            Cli::try_parse_from(["emcoord", "events", "--unresolved", "--json", "-o", "2"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Events(EventsCommand { unresolved: true, json: true, operator: Some(2), .. })
        ));

        let cli = Cli::try_parse_from(["emcoord", "outbox", "--limit", "5"]).unwrap();
        assert!(matches!(cli.command, Command::Outbox(OutboxCommand { limit: 5, .. })));
    }

    #[test]
    fn test_parse_outbox_mark_delivered() {
        let cli = Cli::try_parse_from(["emcoord", "outbox", "--mark-delivered", "abc123"]).unwrap();
        match cli.command {
            Command::Outbox(outbox) => {
                assert_eq!(outbox.mark_delivered.as_deref(), Some("abc123"));
                assert_eq!(outbox.limit, 20);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_stats() {
        let cli = Cli::try_parse_from(["emcoord", "stats", "--json"]).unwrap();
        assert!(matches!(cli.command, Command::Stats(StatsCommand { json: true })));
    }

    #[test]
    fn test_parse_with_config() {
        let cli = Cli::try_parse_from(["emcoord", "-c", "/custom/config.toml", "config", "path"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
        assert!(matches!(cli.command, Command::Config(ConfigCommand::Path)));
    }
}
