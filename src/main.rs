#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
// The ultimate strictness: catches things like missing documentation or overflow risks
#![warn(clippy::restriction)]

use std::error::Error;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use raid_alerts::core::alerts::declarative;
use raid_alerts::core::config::{ConfigManager, Settings};
use raid_alerts::core::coordinator;
use raid_alerts::core::log_io::{self, CaptureTailer, LogTailer};
use raid_alerts::core::replay_engine::ReplaySession;
use raid_alerts::{Alert, TriggerEngine};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "raid-alerts",
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct CommonArgs {
    /// Directory holding settings.json
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Extra declarative trigger files
    #[arg(long = "triggers", global = true)]
    trigger_files: Vec<PathBuf>,

    /// Display locale (overrides settings)
    #[arg(long, global = true)]
    locale: Option<String>,

    /// Local player name (overrides settings)
    #[arg(long, global = true)]
    player: Option<String>,

    /// Zone to activate before the first event
    #[arg(long, global = true)]
    zone: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a whole capture through the virtual clock
    Replay {
        capture: PathBuf,
    },
    /// Follow a growing capture (or the newest one in a directory)
    Watch {
        path: PathBuf,
        /// Also process lines already in the file
        #[arg(long)]
        from_start: bool,
        #[arg(long, default_value_t = 100)]
        poll_ms: u64,
    },
}

fn load_settings(common: &CommonArgs) -> Settings {
    let mut settings = common
        .config_dir
        .as_ref()
        .map(|dir| ConfigManager::new(dir.clone()).load())
        .unwrap_or_default();
    if let Some(locale) = &common.locale {
        settings.locale = locale.clone();
    }
    if let Some(player) = &common.player {
        settings.player_name = Some(player.clone());
    }
    settings.trigger_files.extend(common.trigger_files.iter().cloned());
    settings
}

fn build_engine(common: &CommonArgs) -> Result<TriggerEngine, Box<dyn Error>> {
    let settings = load_settings(common);
    let mut engine = TriggerEngine::new(settings.engine_config());
    for path in &settings.trigger_files {
        declarative::add_trigger_file(&mut engine, path)
            .map_err(|e| format!("{}: {}", path.display(), e))?;
    }
    if let Some(zone) = common.zone {
        engine.activate_zone(zone);
    }
    Ok(engine)
}

fn print_alert(alert: &Alert) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string(alert)?);
    Ok(())
}

fn replay(engine: TriggerEngine, capture: &Path) -> Result<(), Box<dyn Error>> {
    let mut session = ReplaySession::from_capture(engine, capture)?;
    let out = session.run_to_end();
    for alert in &out.alerts {
        print_alert(alert)?;
    }
    log::info!(
        "Replayed {:?}: {} alerts, {} diagnostics",
        capture,
        out.alerts.len(),
        out.diagnostics.len()
    );
    Ok(())
}

async fn watch(
    engine: TriggerEngine,
    path: &Path,
    from_start: bool,
    poll: Duration,
) -> Result<(), Box<dyn Error>> {
    let capture_path = if path.is_dir() {
        log_io::latest_capture(path)?
            .ok_or_else(|| format!("no capture files in {}", path.display()))?
    } else {
        path.to_path_buf()
    };
    let tailer = if from_start {
        LogTailer::open_from_start(&capture_path)?
    } else {
        LogTailer::open(&capture_path)?
    };

    let live = coordinator::spawn_live(engine, 256);
    let tail = tokio::spawn(coordinator::tail_capture(
        CaptureTailer::new(tailer),
        live.commands.clone(),
        poll,
    ));
    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    coordinator::supervise(live, tail, interrupted, |alert| {
        print_alert(&alert).map_err(io::Error::from)
    })
    .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let engine = build_engine(&cli.common)?;

    match cli.command {
        Command::Replay { capture } => replay(engine, &capture),
        Command::Watch {
            path,
            from_start,
            poll_ms,
        } => watch(engine, &path, from_start, Duration::from_millis(poll_ms)).await,
    }
}
