mod cli;
mod error_fmt;
mod run;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use drip_config::{Config, ConfigStore, Logging, TomlFileStore};
use drip_core::Capabilities;
use drip_core::geometry::{pressure_to_height, pressure_to_volume, tank_capacity, volume_or_none};
use eyre::{Result, WrapErr};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{EXIT_RESTART, exit_code_for_error, format_error_json, humanize};
use crate::run::{RunExit, RunOpts};

fn main() {
    let _ = color_eyre::install();
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = init_tracing(cli.json, &cli.log_level, &peek_config(&cli.config).logging) {
        eprintln!("logging disabled: {e:#}");
    }

    let code = match dispatch(&cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "exiting");
            if JSON_MODE.get().copied().unwrap_or(false) {
                println!("{}", format_error_json(&e));
            } else {
                eprintln!("{}", humanize(&e));
            }
            exit_code_for_error(&e)
        }
    };
    std::process::exit(code);
}

/// Best-effort read used before the store loads the document for real, so
/// file logging and the topic prefix are known early. Falls back to defaults.
fn peek_config(path: &Path) -> Config {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|text| drip_config::load_toml(&text).ok())
        .unwrap_or_default()
}

/// Console logs go to stderr; stdout carries the JSON-line message stream.
/// `RUST_LOG` overrides `--log-level`; `[logging].level` filters the file only.
fn init_tracing(json: bool, level: &str, logging: &Logging) -> Result<()> {
    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("bad log level {level:?}"))?;
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    layers.push(if json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    });

    if let Some(file) = &logging.file {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("logging.file has no file name: {file}"))?;
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let file_level = logging.level.as_deref().unwrap_or("info");
        let file_filter = EnvFilter::try_new(file_level)
            .wrap_err_with(|| format!("bad logging.level {file_level:?}"))?;
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(file_filter)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| eyre::eyre!("install subscriber: {e}"))
}

fn load_checked(path: &Path) -> Result<Config> {
    TomlFileStore::new(path)
        .load()
        .wrap_err("invalid configuration")
}

fn dispatch(cli: &Cli) -> Result<i32> {
    match &cli.cmd {
        Commands::Run {
            tick_ms,
            max_ticks,
            tank_level_l,
            #[cfg(feature = "hardware")]
            gpio,
            #[cfg(feature = "hardware")]
            valve_pins,
            #[cfg(feature = "hardware")]
            flow_pin,
            #[cfg(feature = "hardware")]
            active_low,
        } => {
            let shutdown = Arc::new(AtomicBool::new(false));
            {
                let flag = Arc::clone(&shutdown);
                ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
                    .wrap_err("install ctrl-c handler")?;
            }

            #[cfg(feature = "hardware")]
            let hw = if *gpio {
                let [source_supply, tank_supply, tank_drain] = valve_pins[..] else {
                    eyre::bail!("--valve-pins takes exactly three pins");
                };
                Some(run::GpioOpts {
                    valve_pins: drip_hardware::gpio::ValvePins {
                        source_supply,
                        tank_supply,
                        tank_drain,
                    },
                    flow_pin: *flow_pin,
                    active_low: *active_low,
                })
            } else {
                None
            };

            let base_topic = peek_config(&cli.config).broker.base_topic;
            let opts = RunOpts {
                tick_ms: *tick_ms,
                max_ticks: *max_ticks,
                tank_level_l: *tank_level_l,
            };
            let exit = run::run(
                &cli.config,
                &base_topic,
                opts,
                #[cfg(feature = "hardware")]
                hw,
                &shutdown,
            )?;
            tracing::info!(?exit, "controller stopped");
            Ok(match exit {
                RunExit::Restart => EXIT_RESTART,
                RunExit::Interrupted | RunExit::TickLimit => 0,
            })
        }
        Commands::CheckConfig => {
            if !cli.config.exists() {
                eyre::bail!("config file not found: {}", cli.config.display());
            }
            let cfg = load_checked(&cli.config)?;
            let caps = Capabilities::from(&cfg);
            tracing::info!(?caps, "config ok");
            print!("{}", drip_config::to_toml_string(&cfg)?);
            Ok(0)
        }
        Commands::Geometry { pressure } => {
            let cfg = load_checked(&cli.config)?;
            let volume = volume_or_none(pressure_to_volume(*pressure, &cfg.tank));
            let line = serde_json::json!({
                "pressure": pressure,
                "height": pressure_to_height(*pressure),
                "volume_l": volume,
                "capacity_l": volume_or_none(tank_capacity(&cfg.tank)),
            });
            println!("{line}");
            Ok(0)
        }
    }
}
