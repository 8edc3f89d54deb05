//! Binary entrypoint for the Inkboard CLI.
//!
//! Commands:
//! - `start [--base-path <dir>] [--storage-path <dir>] [--hard-reset] [--time-scale <f>]`
//!   - run the engine until ctrl-c
//! - `reset [--base-path <dir>] [--storage-path <dir>]` - wipe and
//!   re-provision the storage tree from the template without starting

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::info;

use inkboard::engine::application::{AppPhase, Application};
use inkboard::plugins::PluginRegistry;
use inkboard::runtime::{
    spawn_actor, Message, ScaledTimeOfDay, ServiceContainer, StartEvent, StartOptions,
    SystemTimeOfDay, TimeOfDay,
};
use inkboard::sources::SourceRegistry;
use inkboard::storage::ConfigurationManager;

#[derive(Parser)]
#[command(name = "inkboard")]
#[command(about = "Display-orchestration engine for e-ink style billboards")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the engine
    Start {
        /// Source tree holding the storage template and static assets
        #[arg(long)]
        base_path: Option<PathBuf>,

        /// Working storage root (defaults to a .storage sibling of base)
        #[arg(long)]
        storage_path: Option<PathBuf>,

        /// Wipe and re-provision storage before starting
        #[arg(long)]
        hard_reset: bool,

        /// Run scheduled time N times faster than real time (for demos)
        #[arg(long)]
        time_scale: Option<f64>,
    },
    /// Provision the storage tree from the template and exit
    Reset {
        #[arg(long)]
        base_path: Option<PathBuf>,

        #[arg(long)]
        storage_path: Option<PathBuf>,
    },
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level));
    if atty::is(atty::Stream::Stdout) {
        builder.write_style(env_logger::WriteStyle::Auto);
        builder.format_timestamp_secs();
    } else {
        builder.write_style(env_logger::WriteStyle::Never);
        builder.format_timestamp_millis();
    }
    builder.init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Start {
            base_path,
            storage_path,
            hard_reset,
            time_scale,
        } => {
            start(
                StartOptions {
                    base_path,
                    storage_path,
                    hard_reset,
                },
                time_scale,
            )
            .await
        }
        Commands::Reset {
            base_path,
            storage_path,
        } => reset(base_path, storage_path),
    }
}

async fn start(options: StartOptions, time_scale: Option<f64>) -> Result<()> {
    let time: Arc<dyn TimeOfDay> = match time_scale {
        Some(scale) => Arc::new(ScaledTimeOfDay::new(Utc::now(), scale)?),
        None => Arc::new(SystemTimeOfDay),
    };
    let root = ServiceContainer::new();
    root.insert(time.clone());

    let (app, mut phase) = Application::new(
        "Application",
        PluginRegistry::builtin(),
        SourceRegistry::new(),
        None,
    );
    let handle = spawn_actor(app);
    handle.sink().accept(Message::Start(StartEvent {
        options,
        root,
        timestamp: time.now_utc(),
    }))?;

    loop {
        let current = *phase.borrow_and_update();
        match current {
            AppPhase::Started => break,
            AppPhase::Stopped => bail!("application failed to start"),
            AppPhase::Idle => phase.changed().await?,
        }
    }
    info!("inkboard running; press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    handle.sink().accept(Message::Quit {
        timestamp: time.now_utc(),
    })?;
    handle.join().await;

    let stats = inkboard::metrics::snapshot();
    info!(
        "session: {} messages, {} frames, {} timers fired, {} handler errors",
        stats.messages_dispatched,
        stats.frames_displayed,
        stats.timers_fired,
        stats.handler_errors
    );
    Ok(())
}

fn reset(base_path: Option<PathBuf>, storage_path: Option<PathBuf>) -> Result<()> {
    let base = match base_path {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    let cm = ConfigurationManager::new(
        &base,
        storage_path.as_deref(),
        PluginRegistry::builtin(),
        SourceRegistry::new(),
    );
    cm.hard_reset()?;
    println!("storage provisioned at {}", cm.storage_path().display());
    Ok(())
}
