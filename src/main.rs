//! # Adaptive Core - CLI Entry Point
//!
//! Operator commands around the adaptive learning core.
//!
//! Commands:
//! - `init-config` - Generate a default configuration file
//! - `ingest`      - Append threat packets from a JSON file to the history
//! - `learn`       - Run a reinforcement pass over classified events
//! - `report`      - Print the immune report for the stored history
//! - `status`      - Show history size and learned weights

use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::{Path, PathBuf};

use adaptive_core::learning::AdaptiveEngine;
use adaptive_core::threat::ThreatPacket;
use adaptive_core::{AdaptiveConfig, AdaptiveError, AdaptiveResult, AdaptiveState, RiskEvent};

/// Adaptive Core - threat history, analytics and feedback-driven weights
/// for layered shield deployments.
#[derive(Parser, Debug)]
#[command(name = "adaptive-core")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "adaptive-core.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a default configuration file.
    InitConfig,

    /// Validate and store threat packets from a JSON array file.
    Ingest {
        /// JSON file holding an array of packet objects.
        file: PathBuf,
    },

    /// Apply feedback from a JSON array of risk events.
    Learn {
        /// JSON file holding an array of risk events.
        file: PathBuf,
    },

    /// Print the immune report.
    Report,

    /// Show history size and learned weights.
    Status,
}

fn main() -> AdaptiveResult<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::InitConfig => cmd_init_config(&cli.config),
        Commands::Ingest { file } => cmd_ingest(&cli.config, &file),
        Commands::Learn { file } => cmd_learn(&cli.config, &file),
        Commands::Report => cmd_report(&cli.config),
        Commands::Status => cmd_status(&cli.config),
    }
}

fn load_config(config_path: &Path) -> AdaptiveResult<AdaptiveConfig> {
    if config_path.exists() {
        info!("Loading configuration from: {}", config_path.display());
        AdaptiveConfig::from_file(config_path)
    } else {
        info!("No config file found, using defaults. Run 'init-config' to generate one.");
        Ok(AdaptiveConfig::default())
    }
}

/// Previously learned state, or a neutral one when none is usable.
fn load_state(path: &Path) -> AdaptiveState {
    if !path.exists() {
        return AdaptiveState::default();
    }
    match AdaptiveState::load(path) {
        Ok(state) => {
            info!(
                "Loaded adaptive state from disk ({} layers)",
                state.layer_weights.len()
            );
            state
        }
        Err(e) => {
            warn!("Failed to load adaptive state ({}), starting neutral", e);
            AdaptiveState::default()
        }
    }
}

/// Generate a default configuration file.
fn cmd_init_config(config_path: &Path) -> AdaptiveResult<()> {
    if config_path.exists() {
        return Err(AdaptiveError::Config(format!(
            "Configuration file already exists: {}. Remove it first or use a different path.",
            config_path.display()
        )));
    }

    AdaptiveConfig::write_default(config_path)?;
    println!("Default configuration written to: {}", config_path.display());
    println!();
    println!("Key settings to configure:");
    println!("  [threat_memory] - History file and packet cap (default 10000)");
    println!("  [learning]      - Pause learning or move the state file");
    println!("  [pattern]       - Short/long windows for spike detection");
    println!("  [report]        - Severity floor and trend bucket (hour/day)");

    Ok(())
}

fn cmd_ingest(config_path: &Path, file: &Path) -> AdaptiveResult<()> {
    let config = load_config(config_path)?;
    let mut engine = AdaptiveEngine::from_config(&config);

    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(file)?)?;
    let records = match raw {
        serde_json::Value::Array(records) => records,
        _ => {
            return Err(AdaptiveError::InvalidPacket(format!(
                "{} does not hold a JSON array",
                file.display()
            )))
        }
    };

    let total = records.len();
    let mut accepted = 0usize;
    for (idx, record) in records.into_iter().enumerate() {
        match ThreatPacket::from_value(record) {
            Ok(packet) => {
                engine.receive_threat_packet(packet)?;
                accepted += 1;
            }
            Err(e) => warn!("Skipping record {}: {}", idx, e),
        }
    }

    println!(
        "Ingested {}/{} packets ({} in history)",
        accepted,
        total,
        engine.threat_memory().len()
    );
    Ok(())
}

fn cmd_learn(config_path: &Path, file: &Path) -> AdaptiveResult<()> {
    let config = load_config(config_path)?;
    let state = load_state(&config.learning.state_file);
    let mut engine = AdaptiveEngine::from_config(&config).with_state(state);

    let events: Vec<RiskEvent> = serde_json::from_str(&std::fs::read_to_string(file)?)?;
    engine.record_events(events.iter().cloned());
    let result = engine.apply_learning(&events);

    println!("Processed {} events", result.processed_events.len());
    println!(
        "{:<24} {:>10} {:>10} {:>12}",
        "LAYER", "WEIGHT", "DELTA", "THRESHOLD+/-"
    );
    for (layer, adj) in &result.per_layer {
        let weight = result.state.layer_weights.get(layer).copied().unwrap_or(0.0);
        println!(
            "{:<24} {:>10.3} {:>+10.3} {:>+12.3}",
            layer, weight, adj.weight_delta, adj.threshold_shift
        );
    }
    println!("Global threshold: {:.3}", result.state.global_threshold);
    if !engine.learning_control().is_enabled() {
        println!("Learning is paused: no adjustments were applied.");
    }

    engine.state().save(&config.learning.state_file)?;
    info!("Adaptive state saved to {}", config.learning.state_file.display());
    Ok(())
}

fn cmd_report(config_path: &Path) -> AdaptiveResult<()> {
    let config = load_config(config_path)?;
    let engine = AdaptiveEngine::from_config(&config);
    print!("{}", engine.generate_immune_report().render());
    Ok(())
}

fn cmd_status(config_path: &Path) -> AdaptiveResult<()> {
    let config = load_config(config_path)?;
    let state = load_state(&config.learning.state_file);
    let engine = AdaptiveEngine::from_config(&config).with_state(state);

    println!("=== Adaptive Core Status ===");
    match engine.threat_memory().path() {
        Some(path) => println!("Threat history: {}", path.display()),
        None => println!("Threat history: in memory only"),
    }
    println!(
        "Packets stored: {} / {}",
        engine.threat_memory().len(),
        engine.threat_memory().max_packets()
    );
    println!(
        "Learning: {}",
        if engine.learning_control().is_enabled() { "enabled" } else { "paused" }
    );
    println!();

    let state = engine.state();
    println!("Global threshold: {:.3}", state.global_threshold);
    println!("Last updated: {}", state.last_updated.to_rfc3339());
    if state.layer_weights.is_empty() {
        println!("No layers learned yet.");
        return Ok(());
    }
    let shares = state.normalised_weights();
    println!("{:<24} {:>10} {:>10}", "LAYER", "WEIGHT", "SHARE");
    for (layer, weight) in &state.layer_weights {
        let share = shares.get(layer).copied().unwrap_or(0.0);
        println!("{:<24} {:>10.3} {:>9.1}%", layer, weight, share * 100.0);
    }
    Ok(())
}
