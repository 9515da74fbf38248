//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "drip", version, about = "Irrigation reservoir controller")]
pub struct Cli {
    /// Path to config TOML (typed); written back on config changes
    #[arg(long, value_name = "FILE", default_value = "etc/drip_config.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the controller: JSON commands on stdin, JSON messages on stdout
    Run {
        /// Tick period of the control loop in milliseconds
        #[arg(long, value_name = "MS", default_value_t = 100)]
        tick_ms: u32,
        /// Stop (deactivating any process) after this many ticks
        #[arg(long, value_name = "N")]
        max_ticks: Option<u64>,
        /// Water in the simulated tank at start (liters)
        #[arg(long, value_name = "LITERS", default_value_t = 150.0)]
        tank_level_l: f32,
        /// Drive Raspberry Pi GPIO instead of the simulated plant
        #[cfg(feature = "hardware")]
        #[arg(long, action = ArgAction::SetTrue)]
        gpio: bool,
        /// BCM pins of the source supply, tank supply and tank drain relays
        #[cfg(feature = "hardware")]
        #[arg(
            long,
            value_name = "PINS",
            value_delimiter = ',',
            num_args = 3,
            default_values_t = [17u8, 27, 22]
        )]
        valve_pins: Vec<u8>,
        /// BCM pin of the flow sensor pulse output
        #[cfg(feature = "hardware")]
        #[arg(long, value_name = "PIN", default_value_t = 4)]
        flow_pin: u8,
        /// Relay board energizes on a low level
        #[cfg(feature = "hardware")]
        #[arg(long, action = ArgAction::SetTrue)]
        active_low: bool,
    },
    /// Load and validate the config file, then print it normalized
    CheckConfig,
    /// Convert a gauge pressure into water height and tank volume
    Geometry {
        /// Gauge pressure in hPa (atmosphere already subtracted)
        #[arg(long, value_name = "HPA", allow_negative_numbers = true)]
        pressure: f32,
    },
}
