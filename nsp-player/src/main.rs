//! nspeakers - Main entry point
//!
//! Plays audio through a configured set of speakers, one device group at a
//! time, for spatial-audio demonstrations and lab checks.
//!
//! Modes:
//! - `test` / `t`: each device plays its identification clip from the
//!   library's `test/` folder, repeated for `test_duration`
//! - `custom` / `c` (default): play chosen files in order
//! - `devices` / `d`: list output devices, optionally save a device plan

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use nsp_common::config::{resolve_config_path, write_toml_config};
use nsp_common::human_time::format_seconds_or;
use nsp_common::TomlConfig;
use nsp_player::audio::{
    AudioDecoder, CpalBackend, CpalCatalog, OutputBackend, SimulatedBackend, SymphoniaDecoder,
};
use nsp_player::catalog::{format_device_table, DeviceCatalog};
use nsp_player::library::{identification_clips, require_dir, select_interactively};
use nsp_player::{GroupPlan, ReproductionConfig, ReproductionSession, Signal};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Rate and channel count of every `--dry-run` device
const DRY_RUN_SAMPLE_RATE: u32 = 48000;
const DRY_RUN_CHANNELS: u16 = 2;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    /// Identify each device with its own clip
    #[value(alias = "t")]
    Test,
    /// Play selected audio files
    #[value(alias = "c")]
    Custom,
    /// List output devices
    #[value(alias = "d")]
    Devices,
}

/// Command-line arguments for nspeakers
#[derive(Parser, Debug)]
#[command(name = "nspeakers")]
#[command(about = "Synchronized playback across multiple speakers")]
#[command(version)]
struct Args {
    /// Reproduction mode
    #[arg(value_enum, ignore_case = true, default_value_t = Mode::Custom)]
    mode: Mode,

    /// Files to play in custom mode (skips the interactive listing)
    files: Vec<PathBuf>,

    /// Settings file
    #[arg(short, long, env = "NSPEAKERS_CONFIG")]
    config: Option<PathBuf>,

    /// Device plan overriding the settings file, e.g. "1 2 (3 4) 5"
    #[arg(short, long)]
    plan: Option<String>,

    /// Devices mode: validate this plan and save it to the settings file
    #[arg(long)]
    save: Option<String>,

    /// Devices mode: print the device list as JSON
    #[arg(long)]
    json: bool,

    /// Use simulated devices instead of audio hardware
    #[arg(long)]
    dry_run: bool,

    /// Number of simulated devices for --dry-run
    #[arg(long, default_value = "8")]
    sim_devices: u32,

    /// Fixed output callback size in frames (device default when omitted)
    #[arg(long, env = "NSPEAKERS_BUFFER_SIZE")]
    buffer_size: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let config = TomlConfig::load_or_default(&config_path);

    // Initialize tracing: RUST_LOG wins, then the configured level
    let level = config
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("nspeakers={level},nsp_player={level},nsp_common={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "nspeakers {} ({}, {} build, {})",
        env!("CARGO_PKG_VERSION"),
        env!("NSP_GIT_HASH"),
        env!("NSP_BUILD_PROFILE"),
        env!("NSP_BUILD_TIMESTAMP")
    );

    let config = config
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    if config_path.exists() {
        info!("Configuration: {}", config_path.display());
    } else {
        info!("No configuration file at {}, using defaults", config_path.display());
    }

    let (catalog, backend): (Box<dyn DeviceCatalog>, Arc<dyn OutputBackend>) = if args.dry_run {
        let simulated = SimulatedBackend::uniform(args.sim_devices, DRY_RUN_SAMPLE_RATE, DRY_RUN_CHANNELS);
        info!("Dry run: {} simulated devices", args.sim_devices);
        (Box::new(simulated.clone()), Arc::new(simulated))
    } else {
        (Box::new(CpalCatalog), Arc::new(CpalBackend::new(args.buffer_size)))
    };

    match args.mode {
        Mode::Devices => list_devices(&args, catalog.as_ref(), config, &config_path),
        Mode::Test | Mode::Custom => reproduce(&args, catalog.as_ref(), backend, &config).await,
    }
}

fn list_devices(
    args: &Args,
    catalog: &dyn DeviceCatalog,
    mut config: TomlConfig,
    config_path: &Path,
) -> Result<()> {
    let devices = catalog.list().context("Failed to list output devices")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
    } else {
        print!("{}", format_device_table(&devices));
    }

    if let Some(expression) = &args.save {
        let plan = GroupPlan::parse(expression).context("Invalid device plan")?;
        for device in plan.unique_devices() {
            catalog
                .query_device(device)
                .with_context(|| format!("Cannot save plan {}", plan))?;
        }

        config.devices.device_id = plan.to_string();
        write_toml_config(&config, config_path)
            .with_context(|| format!("Failed to save configuration to {}", config_path.display()))?;
        println!("Saved device plan \"{}\" to {}", plan, config_path.display());
    }

    Ok(())
}

async fn reproduce(
    args: &Args,
    catalog: &dyn DeviceCatalog,
    backend: Arc<dyn OutputBackend>,
    config: &TomlConfig,
) -> Result<()> {
    let expression = args.plan.as_deref().unwrap_or(&config.devices.device_id);
    let plan = GroupPlan::parse(expression)
        .with_context(|| format!("Invalid device plan \"{}\" (see `nspeakers devices`)", expression))?;

    let library = &config.paths.audio_library;
    require_dir(library).context("Audio library missing")?;

    let repro = ReproductionConfig::from(&config.reproduction);
    let decoder: Arc<dyn AudioDecoder> = Arc::new(SymphoniaDecoder);

    if args.mode == Mode::Test {
        let clips = identification_clips(library, &plan.unique_devices()).context("Test signals missing")?;
        info!(
            "Session {}: identification test, {} clip(s) for {} device(s)",
            nsp_common::time::now().format("%Y-%m-%d %H:%M:%S UTC"),
            clips.len(),
            plan.unique_devices().len()
        );

        let session = ReproductionSession::prepare(plan, repro, catalog, backend, decoder)
            .context("Failed to prepare reproduction")?;
        let clips: HashMap<_, _> = clips.into_iter().map(|(d, p)| (d, Signal::File(p))).collect();
        session.run_test_routine(&clips).await?;
        return Ok(());
    }

    let signals: Vec<Signal> = if args.files.is_empty() {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        let files = select_interactively(library, &mut stdin.lock(), &mut stdout)?;
        stdout.flush()?;
        files.into_iter().map(Signal::File).collect()
    } else {
        args.files.iter().cloned().map(Signal::File).collect()
    };

    if signals.is_empty() {
        info!("Nothing selected");
        return Ok(());
    }

    info!(
        "Session {}: {} signal(s), duration {}",
        nsp_common::time::now().format("%Y-%m-%d %H:%M:%S UTC"),
        signals.len(),
        format_seconds_or(repro.duration, "full length")
    );

    let session = ReproductionSession::prepare(plan, repro, catalog, backend, decoder)
        .context("Failed to prepare reproduction")?;
    let report = session.run(&signals).await?;

    if report.played_count() == 0 {
        bail!("No signal could be played");
    }
    Ok(())
}
