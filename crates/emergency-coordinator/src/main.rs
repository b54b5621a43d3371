//! `emcoord` - CLI for the emergency coordinator
//!
//! This binary runs the coordinator console against the local reference
//! store and offers a few commands for inspecting and feeding that store.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use emergency_coordinator::cli::{
    format_notice, format_snapshot, Cli, Command, ConfigCommand, ConsoleCommand, EventsCommand,
    OutboxCommand, RaiseCommand, RunCommand, StatsCommand, HELP,
};
use emergency_coordinator::config::DispatchBackend;
use emergency_coordinator::storage::NewEvent;
use emergency_coordinator::{
    init_logging, Config, Coordinator, CoordinatorHandle, FeedAdapter, LogDispatcher,
    NotificationDispatcher, OperatorId, OutboxDispatcher, PollingFeed, ResponseOutcome,
    ResponseRecorder, SqliteRecorder, Storage,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;

    match cli.command {
        Command::Run(cmd) => handle_run(config, cmd).await,
        Command::Raise(cmd) => handle_raise(&config, cmd),
        Command::Events(cmd) => handle_events(&config, &cmd),
        Command::Outbox(cmd) => handle_outbox(&config, &cmd),
        Command::Stats(cmd) => handle_stats(&config, &cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

fn open_storage(config: &Config) -> Result<Storage> {
    let path = config.database_path();
    Storage::open(&path).with_context(|| format!("failed to open store at {}", path.display()))
}

async fn handle_run(mut config: Config, cmd: RunCommand) -> Result<()> {
    if let Some(operator) = cmd.operator {
        config.coordinator.operator_id = Some(operator);
    }
    if cmd.driver_name.is_some() {
        config.coordinator.driver_name = cmd.driver_name;
    }
    config.validate()?;
    let Some(identity) = config.identity() else {
        bail!("no operator configured; pass --operator or set coordinator.operator_id");
    };

    let storage = Arc::new(open_storage(&config)?);
    let feed: Arc<dyn FeedAdapter> =
        Arc::new(PollingFeed::new(Arc::clone(&storage), config.poll_interval()));
    let recorder: Arc<dyn ResponseRecorder> =
        Arc::new(SqliteRecorder::new(Arc::clone(&storage)));
    let dispatcher: Arc<dyn NotificationDispatcher> = match config.dispatch.backend {
        DispatchBackend::Outbox => Arc::new(OutboxDispatcher::new(Arc::clone(&storage))),
        DispatchBackend::Log => Arc::new(LogDispatcher::new()),
    };

    let (coordinator, handle) =
        Coordinator::new(feed, recorder, dispatcher, config.coordinator_config());
    let task = coordinator.spawn();
    let printer = tokio::spawn(print_notices(handle.subscribe_notices()));

    handle.start(Some(identity.clone())).await?;
    println!(
        "Coordinating operator {} (store: {}). Type 'help' for commands.",
        identity.operator_id,
        storage.path().display()
    );

    console(&handle).await?;

    handle.shutdown().await;
    task.await.context("coordinator task failed")?;
    printer.abort();
    Ok(())
}

async fn print_notices(mut notices: broadcast::Receiver<emergency_coordinator::Notice>) {
    loop {
        match notices.recv().await {
            Ok(notice) => println!("{}", format_notice(&notice)),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                println!("({skipped} notices skipped)");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn console(handle: &CoordinatorHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read from stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            return Ok(());
        };

        let command = match ConsoleCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };

        match command {
            ConsoleCommand::Respond {
                event_id,
                response_type,
                notes,
            } => match handle.submit_response(event_id, response_type, notes).await {
                Ok(ResponseOutcome::Applied {
                    event_id,
                    status,
                    dispatch,
                    ..
                }) => match dispatch {
                    Some(classification) => {
                        println!("#{event_id} is now {status}; sending {classification}");
                    }
                    None => println!("#{event_id} is now {status}"),
                },
                Ok(ResponseOutcome::RecordFailed { .. }) => {}
                Ok(ResponseOutcome::Superseded { event_id }) => {
                    println!("#{event_id} belongs to a previous session");
                }
                Err(rejection) => println!("rejected: {rejection}"),
            },
            ConsoleCommand::Dismiss => handle.dismiss().await?,
            ConsoleCommand::Status => println!("{}", format_snapshot(&handle.snapshot())),
            ConsoleCommand::Help => println!("{HELP}"),
            ConsoleCommand::Quit => return Ok(()),
        }
    }
}

fn handle_raise(config: &Config, cmd: RaiseCommand) -> Result<()> {
    let storage = open_storage(config)?;
    let mut event = NewEvent::now(
        OperatorId(cmd.operator),
        cmd.event_type.into(),
        cmd.trigger.into(),
    );
    if let Some(details) = cmd.details {
        event.details =
            Some(serde_json::from_str(&details).context("--details must be valid JSON")?);
    }

    let row = storage.insert_event(&event)?;
    println!("Raised event #{} for operator {}", row.id, row.operator_id);
    Ok(())
}

fn handle_events(config: &Config, cmd: &EventsCommand) -> Result<()> {
    let storage = open_storage(config)?;
    let rows = storage.list_events(cmd.operator.map(OperatorId), cmd.unresolved, cmd.limit)?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("No events.");
        return Ok(());
    }
    for row in rows {
        match row.normalize() {
            Ok(event) => println!(
                "#{:<5} op {:<5} {:<20} {:<8} {:<20} {}",
                event.event_id,
                event.operator_id,
                event.event_type.as_str(),
                event.triggered_by,
                event.status,
                event.event_time.format("%Y-%m-%d %H:%M:%S"),
            ),
            Err(e) => println!("#{:<5} unreadable: {e}", row.id),
        }
    }
    Ok(())
}

fn handle_outbox(config: &Config, cmd: &OutboxCommand) -> Result<()> {
    let storage = open_storage(config)?;

    if let Some(key) = &cmd.mark_delivered {
        if storage.mark_delivered(key)? {
            println!("Marked {key} delivered.");
        } else {
            bail!("no queued notification with key {key}");
        }
        return Ok(());
    }

    let messages = storage.list_outbox(cmd.limit)?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }
    if messages.is_empty() {
        println!("Outbox is empty.");
        return Ok(());
    }
    for message in messages {
        let state = if message.delivered_at.is_some() {
            "delivered"
        } else {
            "queued"
        };
        println!(
            "#{} {} [{}] {} key {}",
            message.event_id,
            message.classification,
            state,
            message.created_at.format("%Y-%m-%d %H:%M:%S"),
            message.idempotency_key
        );
        for line in message.message.lines() {
            println!("    {line}");
        }
    }
    Ok(())
}

fn handle_stats(config: &Config, cmd: &StatsCommand) -> Result<()> {
    let storage = open_storage(config)?;
    let stats = storage.stats()?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    println!("emcoord store");
    println!("-------------");
    println!("Database:           {}", storage.path().display());
    println!("Events:             {}", stats.total_events);
    println!("  unresolved:       {}", stats.unresolved_events);
    println!("Responses:          {}", stats.total_responses);
    println!("Undelivered:        {}", stats.undelivered_notifications);
    println!("Size (bytes):       {}", stats.db_size_bytes);
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Feed]");
                println!("  Poll interval (ms): {}", config.feed.poll_interval_ms);
                println!("  Channel capacity:   {}", config.feed.channel_capacity);
                println!();
                println!("[Coordinator]");
                match config.coordinator.operator_id {
                    Some(id) => println!("  Operator:           {id}"),
                    None => println!("  Operator:           (not set)"),
                }
                if let Some(name) = &config.coordinator.driver_name {
                    println!("  Driver name:        {name}");
                }
                println!("  Command capacity:   {}", config.coordinator.command_capacity);
                println!();
                println!("[Dispatch]");
                println!("  Backend:            {:?}", config.dispatch.backend);
                println!("  Announce new:       {}", config.dispatch.announce_new_events);
                println!("  UTC offset (min):   {}", config.dispatch.utc_offset_minutes);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
