//! Turnout CLI - operator and attendee console for the event ledger
//!
//! Thin presentation layer over `SyncFacade`: lists the catalog and
//! attendance history, and submits curation/registration actions,
//! reporting each lifecycle outcome.

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use turnout::{
    ActionState, Address, EventRecord, LogSink, PresenceRecord, RemoteLedger, Scope, SyncConfig,
    SyncFacade,
};

#[derive(Parser, Debug)]
#[command(name = "turnout")]
#[command(about = "Sync client for the proof-of-presence event ledger")]
struct Args {
    /// Ledger RPC endpoint
    #[arg(long, env = "LEDGER_URL", default_value = "ws://localhost:7070")]
    ledger_url: String,

    /// Caller address; required for actions and history
    #[arg(long, env = "TURNOUT_ADDRESS")]
    address: Option<Address>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the event catalog
    Catalog,
    /// List the caller's attendance history
    History,
    /// Register attendance at an event
    Attend {
        location_id: u64,
        /// Free-text note stored with the registration
        #[arg(long, default_value = "")]
        metadata: String,
    },
    /// Operator: add an event to the catalog
    AddEvent {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: String,
        /// Event date as Unix epoch seconds
        #[arg(long)]
        date: u64,
    },
    /// Operator: remove an event from the catalog
    RemoveEvent { location_id: u64 },
    /// Re-print the catalog on every refresh
    Watch {
        #[arg(long, default_value = "15")]
        interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("turnout={},warn", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("turnout connecting to ledger at {}", args.ledger_url);

    let config = SyncConfig::from_env();
    let ledger = RemoteLedger::connect(&args.ledger_url, config.request_timeout).await?;
    let facade = SyncFacade::new(Arc::new(ledger), Arc::new(LogSink), config.clone());

    if let Some(address) = args.address {
        facade.identity().connect(address);
    }

    match args.command {
        Command::Catalog => {
            facade.sync().await;
            print_catalog(&facade).await;
        }
        Command::History => {
            require_address(&args)?;
            facade.sync().await;
            print_history(&facade);
        }
        Command::Attend {
            location_id,
            ref metadata,
        } => {
            require_address(&args)?;
            facade.sync().await;
            let mut lifecycle = facade.register_presence(location_id, metadata);
            report_outcome("attend", lifecycle.outcome().await)?;
            print_history(&facade);
        }
        Command::AddEvent {
            ref name,
            ref description,
            date,
        } => {
            require_address(&args)?;
            if name.trim().is_empty() || description.trim().is_empty() {
                bail!("event name and description must be non-empty");
            }
            facade.sync().await;
            if !facade.is_owner() {
                bail!("caller is not the ledger operator");
            }
            let mut lifecycle = facade.add_event(name, description, date);
            report_outcome("add-event", lifecycle.outcome().await)?;
            print_catalog(&facade).await;
        }
        Command::RemoveEvent { location_id } => {
            require_address(&args)?;
            facade.sync().await;
            if !facade.is_owner() {
                bail!("caller is not the ledger operator");
            }
            let mut lifecycle = facade.remove_event(location_id);
            report_outcome("remove-event", lifecycle.outcome().await)?;
            print_catalog(&facade).await;
        }
        Command::Watch { interval_secs } => loop {
            facade.sync().await;
            print_catalog(&facade).await;
            tokio::time::sleep(Duration::from_secs(interval_secs)).await;
        },
    }

    Ok(())
}

fn require_address(args: &Args) -> anyhow::Result<()> {
    if args.address.is_none() {
        bail!("this command needs --address (or TURNOUT_ADDRESS)");
    }
    Ok(())
}

fn report_outcome(command: &str, outcome: ActionState) -> anyhow::Result<()> {
    match outcome {
        ActionState::Confirmed => {
            println!("{command}: confirmed");
            Ok(())
        }
        ActionState::Rejected(e) => bail!("{command} rejected: {e}"),
        ActionState::Failed(e) => bail!("{command} failed: {e}"),
        other => bail!("{command} ended in unexpected state {other:?}"),
    }
}

async fn print_catalog(facade: &SyncFacade) {
    if let Some(stale) = facade.reader().read_error(Scope::Catalog) {
        eprintln!("(catalog may be stale: {stale})");
    }
    let catalog = facade.event_catalog().await;
    if catalog.is_empty() {
        println!("no events in the catalog");
        return;
    }
    for event in catalog.iter() {
        println!("{}", format_event(event));
    }
}

fn print_history(facade: &SyncFacade) {
    let presences = facade.my_presences();
    if presences.is_empty() {
        println!("no attendance records");
        return;
    }
    for presence in presences.iter() {
        println!("{}", format_presence(presence));
    }
}

fn format_event(event: &EventRecord) -> String {
    format!(
        "#{:<4} {}  [{}]  {}",
        event.location_id,
        event.location_name,
        format_date(event.event_date),
        event.event_description,
    )
}

fn format_presence(presence: &PresenceRecord) -> String {
    let note = if presence.metadata.is_empty() {
        String::new()
    } else {
        format!("  ({})", presence.metadata)
    };
    format!(
        "#{:<4} {}  attended {}{}",
        presence.location_id,
        presence.location_name,
        format_date(presence.timestamp),
        note,
    )
}

fn format_date(epoch_secs: u64) -> String {
    chrono::DateTime::from_timestamp(epoch_secs as i64, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| epoch_secs.to_string())
}
