//! Synheart Session Recorder CLI
//!
//! Records bounded multi-sensor sessions from the simulated host.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use synheart_session_recorder::{
    audit::{create_shared_log_with_persistence, AuditLog},
    config::Config,
    persist::Persister,
    recorder::Recorder,
    sensors::{SensorRegistry, SensorType, SimulatedHost},
    session::{SessionId, SessionState},
    VERSION,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "synheart-recorder")]
#[command(author = "Synheart")]
#[command(version = VERSION)]
#[command(about = "Bounded multi-sensor recording sessions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record one or more sessions from the simulated sensor host
    Record {
        /// Number of sessions to record back to back
        #[arg(long, default_value = "1")]
        sessions: usize,

        /// Samples the leading channel must collect
        #[arg(long)]
        target_samples: Option<usize>,

        /// Maximum session duration in seconds
        #[arg(long)]
        max_duration: Option<u64>,

        /// Minimum spacing between samples of one sensor, in milliseconds
        #[arg(long)]
        debounce_ms: Option<u64>,

        /// Sensors the simulated host should lack (comma-separated)
        #[arg(long, default_value = "")]
        missing: String,

        /// Output directory for session artifacts
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// List the sensors the simulated host registers
    Sensors {
        /// Sensors the simulated host should lack (comma-separated)
        #[arg(long, default_value = "")]
        missing: String,
    },

    /// Show cumulative recorder statistics
    Status,

    /// Show configuration
    Config,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Record {
            sessions,
            target_samples,
            max_duration,
            debounce_ms,
            missing,
            output,
        } => cmd_record(
            sessions,
            target_samples,
            max_duration,
            debounce_ms,
            &missing,
            output,
        ),
        Commands::Sensors { missing } => cmd_sensors(&missing),
        Commands::Status => cmd_status(),
        Commands::Config => cmd_config(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

fn cmd_record(
    sessions: usize,
    target_samples: Option<usize>,
    max_duration: Option<u64>,
    debounce_ms: Option<u64>,
    missing: &str,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = Config::load().context("loading configuration")?;
    if let Some(target) = target_samples {
        config.target_samples = target;
    }
    if let Some(secs) = max_duration {
        config.max_duration = Duration::from_secs(secs);
    }
    if debounce_ms.is_some() {
        config.debounce_ms = debounce_ms;
    }
    if let Some(dir) = output {
        config.export_path = dir;
    }
    config.validate()?;
    config
        .ensure_directories()
        .context("creating output directories")?;

    println!("Synheart Session Recorder v{VERSION}");
    println!();
    println!("  Target samples: {}", config.target_samples);
    println!("  Max duration: {}s", config.max_duration.as_secs());
    match config.debounce_ms {
        Some(ms) => println!("  Debounce: {ms}ms"),
        None => println!("  Debounce: off"),
    }
    println!("  Output: {}", config.export_path.display());
    println!();

    let audit = create_shared_log_with_persistence(config.audit_path());
    let host = Arc::new(SimulatedHost::without(&SensorType::parse_list(missing)));
    let sink = Persister::new(&config.export_path)
        .with_timestamp_column(config.include_timestamp_column);
    let mut recorder = Recorder::with_audit(&config, host, Box::new(sink), audit.clone())?;
    let states = recorder.subscribe();

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    println!("Press Ctrl+C to abort");
    println!();

    for n in 1..=sessions {
        let id = SessionId::now();
        recorder.start_session(id.clone())?;
        println!("[{n}/{sessions}] Recording session {id}...");

        loop {
            if !running.load(Ordering::SeqCst) {
                break;
            }
            match states.recv_timeout(Duration::from_millis(100)) {
                Ok(change) if change.state == SessionState::Finished => break,
                Ok(_) => {}
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => bail!("recorder stopped unexpectedly"),
            }
        }

        if !running.load(Ordering::SeqCst) {
            println!();
            if let Some(aborted) = recorder.stop_session() {
                println!("Aborted session {aborted}, nothing saved.");
            }
            break;
        }
        println!("[{n}/{sessions}] Session {id} complete");
        // session ids are millisecond timestamps and name the artifact directory
        std::thread::sleep(Duration::from_millis(2));
    }

    // waits for pending sessions to be written
    recorder.shutdown();

    println!();
    println!("{}", audit.summary());
    Ok(())
}

fn cmd_sensors(missing: &str) -> anyhow::Result<()> {
    let host = SimulatedHost::without(&SensorType::parse_list(missing));
    let registry = SensorRegistry::build(&host)?;

    println!("Registered sensors");
    println!("==================");
    println!();
    for entry in registry.entries() {
        println!(
            "  [{:>2}] {:<30} {:<18} {}",
            entry.sensor_type.code(),
            entry.nice_name,
            format!("{:?}", entry.role),
            entry.sensor_type.channel_keys().join(",")
        );
    }
    Ok(())
}

fn cmd_status() -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("Synheart Session Recorder Status");
    println!("================================");
    println!();
    println!("Configuration:");
    println!("  Target samples: {}", config.target_samples);
    println!("  Max duration: {}s", config.max_duration.as_secs());
    println!(
        "  Recorded sensors: {}",
        config
            .recorded_sensors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!();

    let saved = std::fs::read_dir(&config.export_path)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_dir())
                .count()
        })
        .unwrap_or(0);
    println!("Saved sessions in {}: {saved}", config.export_path.display());
    println!();

    let audit_path = config.audit_path();
    if audit_path.exists() {
        println!("{}", AuditLog::with_persistence(audit_path).summary());
    } else {
        println!("No previous session data found.");
    }
    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("setting Ctrl+C handler")
}
