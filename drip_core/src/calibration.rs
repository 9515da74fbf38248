//! Flow sensor calibration.
//!
//! A session alternates between dispensing a requested volume through the
//! sensor and waiting for the operator to report what actually came out.
//! Each measurement contributes one pulses-per-liter sample; closing the
//! session stores their mean.

use drip_traits::clock::elapsed_ms;

use crate::controller::Controller;
use crate::error::{DripError, Result};
use crate::metering::meter_sensor_tick;
use crate::reports::LogLevel;
use crate::state::SliceAccumulators;
use crate::status::ProcessKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationStage {
    AwaitingDispenseRequest = 1,
    Dispensing = 2,
    AwaitingMeasurement = 3,
}

impl CalibrationStage {
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl Controller {
    pub(crate) fn calibration_begin(&mut self, id: u32) -> Result<()> {
        self.ensure_idle(ProcessKind::Calibration)?;
        if !self.state.caps.has_flow_sensor() {
            return Err(DripError::Configuration(
                "no flow sensor installed to calibrate".into(),
            ));
        }
        let now = self.now();
        let st = &mut self.state;
        st.acc = SliceAccumulators::default();
        st.report.calibration_id = Some(id);
        st.report.calibration_stage = Some(CalibrationStage::AwaitingDispenseRequest);
        st.times.last_calibration_action = now;
        st.times.process_start = Some(now);
        st.times.last_tick = now;
        st.flags.calibration_active = true;

        tracing::info!(id, "calibration start");
        self.notify(LogLevel::Info, format!("calibration {id} started"));
        Ok(())
    }

    /// Check the session exists and `id` matches it; returns the current stage.
    fn calibration_session(&self, id: u32) -> Result<CalibrationStage> {
        let (Some(session), Some(stage)) = (
            self.state.report.calibration_id,
            self.state.report.calibration_stage,
        ) else {
            return Err(DripError::Conflict("no calibration session is open".into()));
        };
        if session != id {
            return Err(DripError::Validation(format!(
                "calibration id {id} does not match open session {session}"
            )));
        }
        Ok(stage)
    }

    pub(crate) fn calibration_begin_dispense(
        &mut self,
        id: u32,
        target_volume_l: f32,
    ) -> Result<()> {
        let stage = self.calibration_session(id)?;
        let max = self.state.config.flow.calibration_max_volume_l;
        if !(target_volume_l.is_finite() && target_volume_l > 0.0 && target_volume_l <= max) {
            return Err(DripError::Validation(format!(
                "calibration volume must be in (0, {max}] L, got {target_volume_l}"
            )));
        }
        if stage != CalibrationStage::AwaitingDispenseRequest {
            return Err(DripError::Conflict(format!(
                "calibration is in stage {}, not awaiting a dispense request",
                stage.code()
            )));
        }
        let Some(valve) = self.state.caps.calibration_supply() else {
            return Err(DripError::Configuration(
                "no flow sensor installed to calibrate".into(),
            ));
        };
        if let Err(e) = self.set_valve(valve, true) {
            self.close_supply_valves();
            return Err(e);
        }

        let now = self.now();
        self.pulses.reset();
        let st = &mut self.state;
        st.readings.rebaseline();
        st.acc.total_output_volume = 0.0;
        st.acc.flow_rate = 0.0;
        st.acc.sum_flow = 0.0;
        st.acc.count_flow = 0;
        st.targets.calibration_volume = target_volume_l;
        st.report.calibration_stage = Some(CalibrationStage::Dispensing);
        st.times.last_calibration_action = now;
        st.times.last_tick = now;

        tracing::info!(id, target_l = target_volume_l, supply = %valve, "calibration dispense");
        Ok(())
    }

    pub(crate) fn calibration_tick(&mut self, now: u32) {
        match self.state.report.calibration_stage {
            Some(CalibrationStage::Dispensing) => self.calibration_dispense_tick(now),
            Some(CalibrationStage::AwaitingDispenseRequest) => {
                let idle_ms = elapsed_ms(now, self.state.times.last_calibration_action);
                let timeout_ms = self
                    .state
                    .config
                    .flow
                    .calibration_timeout_s
                    .saturating_mul(1000);
                if idle_ms > timeout_ms {
                    tracing::info!(idle_ms, "calibration session timed out");
                    self.notify(LogLevel::Info, "calibration timed out, closing session");
                    self.calibration_close(true);
                }
            }
            Some(CalibrationStage::AwaitingMeasurement) | None => {}
        }
    }

    fn calibration_dispense_tick(&mut self, now: u32) {
        let count = self.pulses.snapshot();
        let flow = self.state.config.flow;
        meter_sensor_tick(&mut self.state.acc, &mut self.state.readings, count, &flow);
        if self.state.caps.pressure_sensor {
            self.sample_pressure();
        }

        let st = &self.state;
        let reached = st.acc.total_output_volume >= st.targets.calibration_volume;
        let stalled = st.acc.flow_rate < flow.min_flow_rate
            && elapsed_ms(now, st.times.last_calibration_action) > st.config.tank.tank_timeout_ms;
        if !reached && !stalled {
            return;
        }

        self.close_supply_valves();
        self.state.report.calibration_stage = Some(CalibrationStage::AwaitingMeasurement);
        self.state.times.last_calibration_action = now;
        tracing::info!(
            pulses = count,
            metered_l = self.state.acc.total_output_volume,
            stalled = !reached,
            "calibration dispense done"
        );
        self.publish_pressure_snapshot();
    }

    pub(crate) fn calibration_take_measurement(
        &mut self,
        id: u32,
        measured_volume_l: f32,
    ) -> Result<()> {
        let stage = self.calibration_session(id)?;
        if !(measured_volume_l.is_finite() && measured_volume_l > 0.0) {
            return Err(DripError::Validation(format!(
                "measured volume must be a positive number of liters, got {measured_volume_l}"
            )));
        }
        if stage != CalibrationStage::AwaitingMeasurement {
            return Err(DripError::Conflict(format!(
                "calibration is in stage {}, not awaiting a measurement",
                stage.code()
            )));
        }

        let pulses = self.pulses.snapshot();
        let sample = pulses as f32 / measured_volume_l;
        let now = self.now();
        self.pulses.reset();
        let st = &mut self.state;
        st.acc.sum_pulses_per_liter += sample;
        st.acc.count_calibration += 1;
        st.readings.rebaseline();
        st.report.calibration_stage = Some(CalibrationStage::AwaitingDispenseRequest);
        st.times.last_calibration_action = now;

        let n = st.acc.count_calibration;
        tracing::info!(id, pulses, measured_l = measured_volume_l, sample, n, "calibration sample");
        self.notify(
            LogLevel::Info,
            format!("calibration sample {n}: {sample:.3} pulses/L"),
        );
        Ok(())
    }

    pub(crate) fn calibration_end(&mut self, id: u32, save: bool) -> Result<()> {
        self.calibration_session(id)?;
        self.calibration_close(save);
        Ok(())
    }

    /// Apply the mean of the collected samples and end the session.
    pub(crate) fn calibration_close(&mut self, save: bool) {
        let mean = self.state.acc.take_calibration_mean();
        match mean {
            Some(ppl) if ppl.is_finite() && ppl > 0.0 => {
                let previous = self.state.config.flow.pulses_per_liter;
                self.state.config.flow.pulses_per_liter = ppl;
                tracing::info!(previous, pulses_per_liter = ppl, save, "calibration applied");
                self.notify(
                    LogLevel::Info,
                    format!("flow sensor calibrated: {ppl:.3} pulses/L"),
                );
                if save {
                    match self.store.save(&self.state.config) {
                        Ok(()) => self.publish_config(),
                        Err(e) => {
                            let err = DripError::TransientIo(format!("save config: {e}"));
                            tracing::warn!(error = %err, "calibration result not persisted");
                            self.notify(LogLevel::Warning, err.to_string());
                        }
                    }
                }
            }
            Some(ppl) => {
                tracing::warn!(pulses_per_liter = ppl, "calibration result unusable, discarded");
                self.notify(LogLevel::Warning, "calibration result unusable, discarded");
            }
            None => tracing::info!("calibration closed without samples"),
        }

        self.close_supply_valves();
        let st = &mut self.state;
        st.flags.calibration_active = false;
        st.report.calibration_id = None;
        st.report.calibration_stage = None;
        st.times.process_start = None;
    }
}
