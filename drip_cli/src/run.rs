//! Controller wiring and the fixed-cadence tick loop.

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::Receiver;
use drip_config::TomlFileStore;
use drip_core::ports::PortError;
use drip_core::{
    Command, CommandOutcome, Controller, LogLevel, LogMessage, Outbound, Publisher, TickStatus,
};
use drip_hardware::{PlantParams, SimulatedPlant, SimulatedValves};
use drip_traits::{Clock, MonotonicClock, PulseCounter, clock::elapsed_ms};

/// Writes every outbound message as one JSON line:
/// `{"topic": "<base_topic><topic>", "payload": {...}}`.
pub struct LinePublisher<W: Write> {
    out: W,
    base_topic: String,
}

impl<W: Write> LinePublisher<W> {
    pub fn new(out: W, base_topic: impl Into<String>) -> Self {
        Self {
            out,
            base_topic: base_topic.into(),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Publisher for LinePublisher<W> {
    fn publish(&mut self, msg: &Outbound) -> Result<(), PortError> {
        let line = serde_json::json!({
            "topic": format!("{}{}", self.base_topic, msg.topic()),
            "payload": msg,
        });
        writeln!(self.out, "{line}")?;
        self.out.flush()?;
        Ok(())
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    Interrupted,
    TickLimit,
    Restart,
}

#[derive(Debug, Clone, Copy)]
pub struct RunOpts {
    pub tick_ms: u32,
    pub max_ticks: Option<u64>,
    pub tank_level_l: f32,
}

/// Where the water comes from: the simulated plant, or real pins.
enum Backend {
    Sim(SimulatedPlant),
    /// Holds the interrupt registration for as long as the loop runs.
    #[cfg(feature = "hardware")]
    Gpio {
        _input: drip_hardware::gpio::PulseInput,
    },
}

impl Backend {
    fn step(&self, dt_ms: u32) {
        match self {
            Self::Sim(plant) => plant.step(dt_ms),
            #[cfg(feature = "hardware")]
            Self::Gpio { .. } => {}
        }
    }
}

fn stdout_publisher(base_topic: &str) -> LinePublisher<io::Stdout> {
    LinePublisher::new(io::stdout(), base_topic)
}

fn simulated(
    config: &Path,
    base_topic: &str,
    opts: RunOpts,
    clock: MonotonicClock,
) -> eyre::Result<(Controller, Backend)> {
    let pulses = PulseCounter::new();
    let valves = SimulatedValves::new();
    let plant = SimulatedPlant::new(
        PlantParams {
            tank_level_l: opts.tank_level_l,
            ..PlantParams::default()
        },
        valves.clone(),
        pulses.clone(),
    );
    let ctl = Controller::builder()
        .with_valves(valves)
        .with_publisher(stdout_publisher(base_topic))
        .with_store(TomlFileStore::new(config))
        .with_pressure_sensor(plant.pressure_sensor())
        .with_pulse_counter(pulses)
        .with_clock(clock)
        .build()?;
    tracing::info!(tank_level_l = opts.tank_level_l, "simulated plant ready");
    Ok((ctl, Backend::Sim(plant)))
}

#[cfg(feature = "hardware")]
pub struct GpioOpts {
    pub valve_pins: drip_hardware::gpio::ValvePins,
    pub flow_pin: u8,
    pub active_low: bool,
}

#[cfg(feature = "hardware")]
fn gpio(
    config: &Path,
    base_topic: &str,
    hw: &GpioOpts,
    clock: MonotonicClock,
) -> eyre::Result<(Controller, Backend)> {
    use drip_hardware::gpio::{GpioValves, PulseInput};

    let pulses = PulseCounter::new();
    let valves = GpioValves::new(hw.valve_pins, hw.active_low)?;
    let input = PulseInput::attach(hw.flow_pin, pulses.clone())?;
    let ctl = Controller::builder()
        .with_valves(valves)
        .with_publisher(stdout_publisher(base_topic))
        .with_store(TomlFileStore::new(config))
        .with_pulse_counter(pulses)
        .with_clock(clock)
        .build()?;
    tracing::info!(pins = ?hw.valve_pins, flow_pin = hw.flow_pin, "gpio backend ready");
    Ok((ctl, Backend::Gpio { _input: input }))
}

/// Forward stdin lines to the tick loop until EOF.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) if line.trim().is_empty() => {}
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
        tracing::debug!("stdin closed");
    });
    rx
}

/// Decode and route one command line. Returns the outcome when the
/// controller accepted it.
fn dispatch(
    ctl: &mut Controller,
    errors: &mut impl Publisher,
    line: &str,
) -> Option<CommandOutcome> {
    match Command::from_json(line) {
        Ok(cmd) => ctl.handle(cmd).ok(),
        Err(e) => {
            tracing::warn!(error = %e, "undecodable command");
            let msg = Outbound::Log(LogMessage {
                level: LogLevel::Error,
                message: e.to_string(),
            });
            if let Err(e) = errors.publish(&msg) {
                tracing::warn!(error = %e, "publish failed");
            }
            None
        }
    }
}

/// Build the controller on the selected backend and drive it until
/// interrupted, asked to restart, or out of ticks.
pub fn run(
    config: &Path,
    base_topic: &str,
    opts: RunOpts,
    #[cfg(feature = "hardware")] hw: Option<GpioOpts>,
    shutdown: &Arc<AtomicBool>,
) -> eyre::Result<RunExit> {
    let clock = MonotonicClock::new();

    #[cfg(feature = "hardware")]
    let (mut ctl, backend) = match hw {
        Some(hw) => gpio(config, base_topic, &hw, clock)?,
        None => simulated(config, base_topic, opts, clock)?,
    };
    #[cfg(not(feature = "hardware"))]
    let (mut ctl, backend) = simulated(config, base_topic, opts, clock)?;

    let mut errors = stdout_publisher(base_topic);
    let commands = spawn_stdin_reader();
    let period = opts.tick_ms.max(1);
    tracing::info!(tick_ms = period, "controller running");

    let mut ticks: u64 = 0;
    let mut last = clock.millis();
    loop {
        if shutdown.load(Ordering::Relaxed) {
            close_out(&mut ctl);
            return Ok(RunExit::Interrupted);
        }

        let start = clock.millis();
        backend.step(elapsed_ms(start, last));
        last = start;

        for line in commands.try_iter() {
            match dispatch(&mut ctl, &mut errors, &line) {
                Some(CommandOutcome::Restart) => {
                    tracing::info!("restart requested");
                    return Ok(RunExit::Restart);
                }
                Some(CommandOutcome::Reset { wifi, broker }) => {
                    tracing::info!(wifi, broker, "settings reset");
                    if wifi {
                        tracing::warn!("wifi credentials are not managed by this host");
                    }
                }
                Some(CommandOutcome::Accepted) | None => {}
            }
        }

        if let TickStatus::Finished(kind) = ctl.tick() {
            tracing::info!(process = %kind, "process finished");
        }

        ticks += 1;
        if opts.max_ticks.is_some_and(|max| ticks >= max) {
            close_out(&mut ctl);
            return Ok(RunExit::TickLimit);
        }

        let spent = clock.ms_since(start);
        clock.sleep(Duration::from_millis(u64::from(period.saturating_sub(spent))));
    }
}

fn close_out(ctl: &mut Controller) {
    if let Some(kind) = ctl.deactivate() {
        tracing::info!(process = %kind, "process closed on shutdown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drip_core::PressureReport;

    #[test]
    fn lines_carry_prefixed_topic_and_payload() {
        let mut p = LinePublisher::new(Vec::new(), "VD1/");
        p.publish(&Outbound::PressureReport(PressureReport {
            pressure: Some(75.0),
            tank_volume_l: None,
        }))
        .unwrap();
        let text = String::from_utf8(p.into_inner()).unwrap();
        let v: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(v["topic"], "VD1/pressure");
        assert_eq!(v["payload"]["pressure"], 75.0);
        assert!(text.ends_with('\n'));
    }
}
