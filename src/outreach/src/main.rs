//! Outreach: bulk direct-message dispatch.
//!
//! Runs a dispatch batch against the simulated account service and prints the
//! resulting run as JSON, or inspects a lead file.

use clap::{Parser, Subcommand};
use outreach_core::config::AppConfig;
use outreach_core::event_bus::{DispatchEvent, EventSink};
use outreach_core::services::LeadStore;
use outreach_dispatch::{
    DispatchEngine, DispatchInput, InstantSleeper, SimulatedAccountService, TokioSleeper,
};
use outreach_leads::InMemoryLeadStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "outreach")]
#[command(about = "Paced bulk direct-message dispatch")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dispatch a batch described by a JSON request file
    Send {
        /// Path to a JSON `DispatchInput`
        #[arg(long)]
        request: PathBuf,

        /// Lead file whose entries are marked as used after the run
        #[arg(long)]
        leads: Option<PathBuf>,

        /// Seed for variant choice and pacing jitter
        #[arg(long)]
        seed: Option<u64>,

        /// Skip real waits (delays are still computed and logged)
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Sender handle reported by the simulated account service
        #[arg(long, default_value = "outreach_sender")]
        sender: String,

        /// Session check cadence (overrides config)
        #[arg(long, env = "OUTREACH__DISPATCH__VERIFY_EVERY")]
        verify_every: Option<usize>,
    },
    /// Inspect a lead file
    Leads {
        #[command(subcommand)]
        command: LeadsCommand,
    },
}

#[derive(Subcommand, Debug)]
enum LeadsCommand {
    /// Keywords that still have unused leads
    Keywords {
        #[arg(long)]
        leads: PathBuf,
    },
    /// Unused leads for a keyword
    Candidates {
        #[arg(long)]
        leads: PathBuf,
        #[arg(long)]
        keyword: String,
        /// Maximum leads returned (overrides config)
        #[arg(long)]
        limit: Option<usize>,
    },
}

/// Forwards dispatch events to the structured log.
struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: DispatchEvent) {
        info!(
            run_id = %event.run_id,
            event = ?event.event_type,
            target = event.target.as_deref().unwrap_or(""),
            detail = event.detail.as_deref().unwrap_or(""),
            "Dispatch event"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "outreach=info,outreach_dispatch=info".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    match cli.command {
        Command::Send {
            request,
            leads,
            seed,
            dry_run,
            sender,
            verify_every,
        } => {
            if let Some(every) = verify_every {
                config.dispatch.verify_every = every;
            }
            info!(
                verify_every = config.dispatch.verify_every,
                max_delay_ms = config.throttle.max_delay_ms,
                dry_run,
                "Configuration loaded"
            );

            let raw = std::fs::read_to_string(&request)?;
            let input: DispatchInput = serde_json::from_str(&raw)?;

            let account = Arc::new(SimulatedAccountService::new(sender));
            let mut engine = DispatchEngine::new(config, account).with_event_sink(Arc::new(LogSink));
            engine = if dry_run {
                engine.with_sleeper(Arc::new(InstantSleeper::new()))
            } else {
                engine.with_sleeper(Arc::new(TokioSleeper))
            };
            if let Some(seed) = seed {
                engine = engine.with_seed(seed);
            }
            let store = match &leads {
                Some(path) => Some(Arc::new(InMemoryLeadStore::load_json(path)?)),
                None => None,
            };
            if let Some(store) = &store {
                engine = engine.with_lead_store(store.clone());
            }

            let run = engine.dispatch(&input).await?;
            println!("{}", serde_json::to_string_pretty(&run)?);

            if let (Some(store), Some(path)) = (store, leads) {
                std::fs::write(&path, serde_json::to_string_pretty(&store.records())?)?;
                info!(path = %path.display(), "Lead file updated");
            }
        }
        Command::Leads { command } => match command {
            LeadsCommand::Keywords { leads } => {
                let store = InMemoryLeadStore::load_json(leads)?;
                println!("{}", serde_json::to_string_pretty(&store.keywords().await?)?);
            }
            LeadsCommand::Candidates {
                leads,
                keyword,
                limit,
            } => {
                let store = InMemoryLeadStore::load_json(leads)?;
                let limit = limit.unwrap_or(config.leads.candidate_limit);
                let found = store.candidates(&keyword, limit).await?;
                println!("{}", serde_json::to_string_pretty(&found)?);
            }
        },
    }

    Ok(())
}
