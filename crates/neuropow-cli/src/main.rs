//! CLI for NeuroPoW: electrode noise as a proof-of-work seed.

mod commands;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use commands::{parse_difficulty, parse_duration};

#[derive(Parser)]
#[command(name = "neuropow")]
#[command(about = "neuropow: seed a double-SHA-256 search from electrode array samples")]
#[command(version = neuropow_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream calibrated batches from the array and summarize them
    Acquire {
        /// How long to acquire (e.g. "5s", "500ms", "1m")
        #[arg(long, default_value = "5s", value_parser = parse_duration)]
        duration: Duration,

        /// Tick interval between batches
        #[arg(long, default_value = "100ms", value_parser = parse_duration)]
        interval: Duration,

        /// Calibration document to load on connect
        #[arg(long)]
        calibration: Option<PathBuf>,

        /// Simulated connect latency in milliseconds (max 500)
        #[arg(long, default_value = "100")]
        connect_delay_ms: u64,

        /// Print every batch as a JSON line
        #[arg(long)]
        json: bool,
    },

    /// Read batches and mine on each one
    Mine {
        /// Mining config JSON (partial documents fill in defaults)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Difficulty threshold, hex (0x...) or decimal; overrides the config
        #[arg(long, value_parser = parse_difficulty)]
        difficulty: Option<u64>,

        /// Attempts per batch; overrides the config
        #[arg(long)]
        max_attempts: Option<u64>,

        /// Number of batches to mine
        #[arg(long, default_value = "3")]
        rounds: usize,

        /// Mine every acquired batch in the background for --duration instead
        #[arg(long)]
        continuous: bool,

        /// Run time for --continuous
        #[arg(long, default_value = "10s", value_parser = parse_duration)]
        duration: Duration,

        /// Calibration document to load on connect
        #[arg(long)]
        calibration: Option<PathBuf>,

        /// Write the final stats as JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show or change the persisted calibration
    Calibrate {
        /// Calibration document (default: platform data directory)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Multiply the gain by this factor
        #[arg(long)]
        factor: Option<f64>,

        /// Reset the gain to 1.0 before applying --factor
        #[arg(long)]
        reset: bool,

        /// Stimulation amplitude in volts
        #[arg(long)]
        amplitude: Option<f64>,

        /// Stimulation pulse duration in ms
        #[arg(long)]
        pulse_ms: Option<f64>,

        /// Stimulation frequency in Hz
        #[arg(long)]
        frequency: Option<f64>,
    },

    /// Serve health, status and mining endpoints over HTTP
    Server {
        #[arg(long, default_value = "8080")]
        port: u16,

        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Mining config JSON
        #[arg(long)]
        config: Option<PathBuf>,

        /// Calibration document to load on connect
        #[arg(long)]
        calibration: Option<PathBuf>,

        /// Also acquire continuously and mine every batch
        #[arg(long)]
        continuous: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Acquire {
            duration,
            interval,
            calibration,
            connect_delay_ms,
            json,
        } => commands::acquire::run(commands::acquire::AcquireCommandConfig {
            duration,
            interval,
            calibration: calibration.as_deref(),
            connect_delay_ms,
            json,
        }),
        Commands::Mine {
            config,
            difficulty,
            max_attempts,
            rounds,
            continuous,
            duration,
            calibration,
            output,
        } => commands::mine::run(commands::mine::MineCommandConfig {
            config_path: config.as_deref(),
            difficulty,
            max_attempts,
            rounds,
            continuous,
            duration,
            calibration: calibration.as_deref(),
            output_path: output.as_deref(),
        }),
        Commands::Calibrate {
            path,
            factor,
            reset,
            amplitude,
            pulse_ms,
            frequency,
        } => commands::calibrate::run(
            path.as_deref(),
            factor,
            reset,
            amplitude,
            pulse_ms,
            frequency,
        ),
        Commands::Server {
            port,
            host,
            config,
            calibration,
            continuous,
        } => commands::server::run(
            &host,
            port,
            config.as_deref(),
            calibration.as_deref(),
            continuous,
        ),
    }
}
