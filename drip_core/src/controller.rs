//! The tick driver and command router.
//!
//! `Controller` owns the device state and every collaborator. The process
//! entry points live next to their process (`dispense`, `calibration`,
//! `drain`); this module holds the loop, routing, deactivation and the
//! configuration commands.

use std::sync::Arc;

use drip_config::{BrokerCfg, Config, ConfigPatch, ConfigStore};
use drip_traits::{Clock, PressureSensor, PulseCounter, Valve, Valves};

use crate::commands::{Command, CommandOutcome};
use crate::config::Capabilities;
use crate::error::{DripError, Result};
use crate::geometry::{pressure_to_volume, volume_or_none};
use crate::hw_error::map_hw_error;
use crate::metering::meter_pressure_tick;
use crate::ports::Publisher;
use crate::reports::{LogLevel, LogMessage, Outbound, PressureReport};
use crate::state::DeviceState;
use crate::status::{ProcessKind, TickStatus};

pub struct Controller {
    pub(crate) state: DeviceState,
    pub(crate) valves: Box<dyn Valves>,
    pub(crate) pressure: Option<Box<dyn PressureSensor>>,
    pub(crate) pulses: PulseCounter,
    pub(crate) publisher: Box<dyn Publisher>,
    pub(crate) store: Box<dyn ConfigStore>,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
}

impl core::fmt::Debug for Controller {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Controller")
            .field("flags", &self.state.flags)
            .field("caps", &self.state.caps)
            .field("total_output_volume", &self.state.acc.total_output_volume)
            .finish_non_exhaustive()
    }
}

impl Controller {
    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn config(&self) -> &Config {
        &self.state.config
    }

    pub fn capabilities(&self) -> Capabilities {
        self.state.caps
    }

    pub fn active_process(&self) -> Option<ProcessKind> {
        self.state.flags.active_process()
    }

    pub(crate) fn now(&self) -> u32 {
        self.clock.millis()
    }

    /// One control-loop iteration.
    pub fn tick(&mut self) -> TickStatus {
        let now = self.now();
        self.state.acc.time_elapsed =
            drip_traits::clock::elapsed_ms(now, self.state.times.last_tick);
        self.state.times.last_tick = now;

        if self.state.flags.deactivate_pending {
            return match self.deactivate() {
                Some(kind) => TickStatus::Finished(kind),
                None => TickStatus::Idle,
            };
        }

        let Some(kind) = self.state.flags.active_process() else {
            self.maybe_reconnect(now);
            return TickStatus::Idle;
        };

        match kind {
            ProcessKind::Dispense => self.dispense_tick(now),
            ProcessKind::Calibration => self.calibration_tick(now),
            ProcessKind::Drain => self.drain_tick(now),
        }

        if self.state.flags.any_process() {
            TickStatus::Running(kind)
        } else {
            TickStatus::Finished(kind)
        }
    }

    /// Route one inbound command. Rejections are logged and published.
    pub fn handle(&mut self, command: Command) -> Result<CommandOutcome> {
        let name = command.name();
        tracing::debug!(command = name, "command received");
        let result = self.route(command);
        if let Err(e) = &result {
            if e.is_rejection() {
                tracing::warn!(command = name, error = %e, "command rejected");
            } else {
                tracing::error!(command = name, error = %e, "command failed");
            }
            self.notify(LogLevel::Error, format!("{name}: {e}"));
        }
        result
    }

    fn route(&mut self, command: Command) -> Result<CommandOutcome> {
        match command {
            Command::DispenseActivate { target_volume_l } => {
                self.dispense_begin(target_volume_l)?;
            }
            Command::Deactivate => {
                self.state.flags.deactivate_pending = true;
            }
            Command::Restart => {
                self.deactivate();
                return Ok(CommandOutcome::Restart);
            }
            Command::ConfigChange(patch) => self.config_change(&patch)?,
            Command::SettingsReset { wifi, broker } => {
                self.settings_reset(broker)?;
                return Ok(CommandOutcome::Reset { wifi, broker });
            }
            Command::FlowCalibrateBegin { id } => self.calibration_begin(id)?,
            Command::FlowCalibrateDispense { id, target_volume_l } => {
                self.calibration_begin_dispense(id, target_volume_l)?;
            }
            Command::FlowCalibrateMeasure {
                id,
                measured_volume_l,
            } => self.calibration_take_measurement(id, measured_volume_l)?,
            Command::FlowCalibrateEnd { id, save } => self.calibration_end(id, save)?,
            Command::DrainActivate(request) => self.drain_begin(request)?,
            Command::PressurePoll => self.pressure_poll()?,
        }
        Ok(CommandOutcome::Accepted)
    }

    /// Close whatever is running, with its reports, and shut every valve.
    ///
    /// Calibration closes without saving. Safe to call at any time.
    pub fn deactivate(&mut self) -> Option<ProcessKind> {
        let kind = self.state.flags.active_process();
        let now = self.now();
        match kind {
            Some(ProcessKind::Dispense) => self.dispense_finish(now),
            Some(ProcessKind::Drain) => self.drain_finish(now),
            Some(ProcessKind::Calibration) => self.calibration_close(false),
            None => {}
        }
        self.close_all_valves();
        self.state.flags.clear_processes();
        self.state.flags.deactivate_pending = false;
        self.state.times.process_start = None;
        if let Some(kind) = kind {
            tracing::info!(process = %kind, "deactivated");
        }
        kind
    }

    pub(crate) fn ensure_idle(&self, starting: ProcessKind) -> Result<()> {
        match self.state.flags.active_process() {
            Some(active) => Err(DripError::Conflict(format!(
                "cannot start {starting} while {active} is active"
            ))),
            None => Ok(()),
        }
    }

    // ── Collaborators ────────────────────────────────────────────────────────

    pub(crate) fn set_valve(&mut self, valve: Valve, open: bool) -> Result<()> {
        let res = if open {
            self.valves.open(valve)
        } else {
            self.valves.close(valve)
        };
        res.map_err(|e| {
            let err = map_hw_error(&*e);
            tracing::warn!(%valve, open, error = %err, "valve actuation failed");
            err
        })
    }

    /// Close `valve`. A valve left open is reported to the operator.
    pub(crate) fn close_valve(&mut self, valve: Valve) -> bool {
        match self.set_valve(valve, false) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(%valve, error = %e, "valve may still be open");
                self.notify(LogLevel::Error, format!("{valve} valve failed to close: {e}"));
                false
            }
        }
    }

    pub(crate) fn close_supply_valves(&mut self) {
        self.close_valve(Valve::SourceSupply);
        self.close_valve(Valve::TankSupply);
    }

    pub(crate) fn close_all_valves(&mut self) {
        for v in Valve::ALL {
            self.close_valve(v);
        }
    }

    /// Read pressure into the running average; a failed read skips the sample.
    pub(crate) fn sample_pressure(&mut self) -> Option<f32> {
        let offset = self.state.config.pressure.atmosphere_offset;
        let sensor = self.pressure.as_deref_mut()?;
        match meter_pressure_tick(sensor, &mut self.state.readings, &mut self.state.acc, offset) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "pressure sample skipped");
                None
            }
        }
    }

    pub(crate) fn publish(&mut self, msg: Outbound) {
        if let Err(e) = self.publisher.publish(&msg) {
            tracing::warn!(topic = msg.topic(), error = %e, "publish failed, message dropped");
        }
    }

    /// Operator-visible log line.
    pub(crate) fn notify(&mut self, level: LogLevel, message: impl Into<String>) {
        self.publish(Outbound::Log(LogMessage {
            level,
            message: message.into(),
        }));
    }

    pub(crate) fn publish_config(&mut self) {
        let snapshot = Box::new(self.state.config.clone());
        self.publish(Outbound::ConfigSnapshot(snapshot));
    }

    /// Pressure and/or derived tank volume, as selected by `report_mode`.
    pub(crate) fn tank_quantities(&self, pressure: Option<f32>) -> (Option<f32>, Option<f32>) {
        let mode = self.state.config.pressure.report_mode;
        let p = pressure.filter(|_| mode.includes_pressure());
        let v = pressure
            .filter(|_| mode.includes_volume())
            .and_then(|p| volume_or_none(pressure_to_volume(p, &self.state.config.tank)));
        (p, v)
    }

    fn maybe_reconnect(&mut self, now: u32) {
        let connected = self.publisher.is_connected();
        self.state.flags.broker_connected = connected;
        if connected {
            return;
        }
        let interval = self.state.config.broker.reconnect_interval_ms;
        let due = self
            .state
            .times
            .last_reconnect_attempt
            .is_none_or(|t| drip_traits::clock::elapsed_ms(now, t) >= interval);
        if !due {
            return;
        }
        self.state.times.last_reconnect_attempt = Some(now);
        match self.publisher.reconnect() {
            Ok(()) => {
                self.state.flags.broker_connected = self.publisher.is_connected();
                tracing::info!(connected = self.state.flags.broker_connected, "broker reconnect");
            }
            Err(e) => tracing::warn!(error = %e, "broker reconnect failed"),
        }
    }

    // ── Configuration commands ───────────────────────────────────────────────

    fn config_change(&mut self, patch: &ConfigPatch) -> Result<()> {
        if let Some(active) = self.state.flags.active_process() {
            return Err(DripError::Conflict(format!(
                "cannot change configuration while {active} is active"
            )));
        }
        if patch.is_empty() {
            return Err(DripError::Validation("config change carries no fields".into()));
        }
        let caps = self.state.caps;
        for (present, section, needs) in [
            (patch.tank.is_some(), "tank", caps.tank),
            (patch.source.is_some(), "source", caps.source),
            (patch.flow.is_some(), "flow", caps.has_flow_sensor()),
            (patch.pressure.is_some(), "pressure", caps.pressure_sensor),
        ] {
            if present && !needs {
                return Err(DripError::Validation(format!(
                    "no {section} is installed on this device"
                )));
            }
        }

        let mut merged = self.state.config.clone();
        let changed = patch.apply_to(&mut merged);
        merged
            .validate()
            .map_err(|e| DripError::Validation(e.to_string()))?;
        if changed.is_empty() {
            tracing::debug!("config change matches current values");
            return Ok(());
        }
        self.store
            .save(&merged)
            .map_err(|e| DripError::TransientIo(format!("save config: {e}")))?;
        self.state.config = merged;
        tracing::info!(fields = ?changed, "configuration updated");
        self.notify(LogLevel::Info, format!("configuration updated: {}", changed.join(", ")));
        self.publish_config();
        Ok(())
    }

    fn settings_reset(&mut self, broker: bool) -> Result<()> {
        if !broker {
            return Ok(());
        }
        let mut merged = self.state.config.clone();
        merged.broker = BrokerCfg::default();
        self.store
            .save(&merged)
            .map_err(|e| DripError::TransientIo(format!("save config: {e}")))?;
        self.state.config = merged;
        tracing::info!("broker settings reset to defaults");
        Ok(())
    }

    fn pressure_poll(&mut self) -> Result<()> {
        let offset = self.state.config.pressure.atmosphere_offset;
        let Some(sensor) = self.pressure.as_deref_mut() else {
            return Err(DripError::Configuration("no pressure sensor installed".into()));
        };
        let gauge = match sensor.read() {
            Ok(Some(raw)) if raw.is_finite() => Some(raw - offset),
            Ok(_) => None,
            Err(e) => return Err(map_hw_error(&*e)),
        };
        self.state.readings.pressure = gauge;
        let (pressure, tank_volume_l) = self.tank_quantities(gauge);
        self.publish(Outbound::PressureReport(PressureReport {
            pressure,
            tank_volume_l,
        }));
        Ok(())
    }

    /// Publish the latest pressure without touching the running average.
    pub(crate) fn publish_pressure_snapshot(&mut self) {
        if !self.state.caps.pressure_sensor {
            return;
        }
        let (pressure, tank_volume_l) = self.tank_quantities(self.state.readings.pressure);
        self.publish(Outbound::PressureReport(PressureReport {
            pressure,
            tank_volume_l,
        }));
    }
}
