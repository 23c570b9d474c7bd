//! CLI entry point for color-daq
//!
//! # Usage
//!
//! Run the pipeline until Ctrl+C:
//! ```bash
//! color-daq run --config config/color_daq.toml
//! ```
//!
//! Average 300 samples (setup / calibration):
//! ```bash
//! color-daq measure --samples 300
//! ```
//!
//! Validate a configuration file:
//! ```bash
//! color-daq check-config --config config/color_daq.toml
//! ```

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use color_daq::color_core::{stop_channel, Channel, StopHandle};
use color_daq::config::{TrackerConfig, DEFAULT_CONFIG_PATH};
use color_daq::{daemon, tracing_setup};
use std::path::{Path, PathBuf};
use tokio::signal;

#[derive(Parser)]
#[command(name = "color-daq")]
#[command(about = "Colorimetric acquisition, CIELAB conversion and PLC publishing", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire, log and publish until Ctrl+C
    Run,

    /// Average a fixed number of samples and print the means
    Measure {
        /// Number of successful samples to average
        #[arg(long, default_value = "300")]
        samples: u64,
    },

    /// Load and validate the configuration, then print a summary
    CheckConfig,
}

fn load_config(path: &Path) -> Result<TrackerConfig> {
    let config = TrackerConfig::load_from(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Fire `handle` on Ctrl+C.
fn stop_on_ctrl_c(handle: StopHandle) {
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => println!("\n🛑 Shutdown signal received, cleaning up..."),
            Err(e) => eprintln!("   Warning: failed to listen for Ctrl+C: {}", e),
        }
        handle.stop();
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    tracing_setup::init_from_config(&config).map_err(|e| anyhow!(e))?;

    match cli.command {
        Commands::Run => run(config).await,
        Commands::Measure { samples } => measure(config, samples).await,
        Commands::CheckConfig => {
            check_config(&config);
            Ok(())
        }
    }
}

async fn run(config: TrackerConfig) -> Result<()> {
    println!("🎨 {} starting", config.application.name);
    let (handle, signal) = stop_channel();
    stop_on_ctrl_c(handle);
    println!("📡 Running - Press Ctrl+C to stop");

    let summary = daemon::run(config, signal).await?;

    println!();
    println!("Acquisition:");
    println!("   samples:      {}", summary.acquisition.samples);
    println!("   misses:       {}", summary.acquisition.misses);
    println!("   log failures: {}", summary.acquisition.log_failures);
    for (name, stats) in &summary.publishers {
        println!("Publisher '{}':", name);
        println!("   publishes:        {}", stats.publishes);
        println!("   skipped ticks:    {}", stats.skipped_ticks);
        println!("   connect attempts: {}", stats.connect_attempts);
        println!("   connect failures: {}", stats.connect_failures);
        println!("   session faults:   {}", stats.session_faults);
    }
    println!("👋 Shutdown complete");
    Ok(())
}

async fn measure(config: TrackerConfig, samples: u64) -> Result<()> {
    let (handle, signal) = stop_channel();
    stop_on_ctrl_c(handle);
    println!("📏 Averaging {} samples...", samples);

    let means = daemon::measure(config, samples, signal).await?;
    for channel in Channel::ALL {
        println!("   {:<3} {:>12.6}", channel.label(), means.get(channel));
    }
    Ok(())
}

fn check_config(config: &TrackerConfig) {
    let white = config.color.white_point;
    println!("✅ Configuration valid: {}", config.application.name);
    println!(
        "   log:          {} ({:?})",
        config.application.log_level, config.application.log_format
    );
    println!(
        "   sensor:       {} (timeout {} ms)",
        config.sensor.driver, config.sensor.frame_timeout_ms
    );
    println!(
        "   white point:  ({}, {}, {}) {:?}",
        white.x(),
        white.y(),
        white.z(),
        config.color.lab_response
    );
    if config.storage.enabled {
        println!("   storage:      {}", config.storage.path.display());
    } else {
        println!("   storage:      disabled");
    }
    if config.server.enabled {
        println!("   server:       {}", config.server.bind);
    }
    for publisher in config.enabled_publishers() {
        println!(
            "   publisher:    {} -> {} ({} channels, every {} ms)",
            publisher.name,
            publisher.address,
            publisher.channels.entries().len(),
            publisher.period_ms
        );
    }
}
