//! Tank drain sessions.
//!
//! A drain runs until exactly one criterion is met: elapsed time, derived
//! tank volume at or below a target, or gauge pressure at or below a target.

use drip_traits::Valve;
use serde::Deserialize;

use crate::controller::Controller;
use crate::error::{DripError, Result};
use crate::geometry::{pressure_to_volume, shape_supported, volume_or_none};
use crate::reports::{DrainSummary, LogLevel, Outbound};
use crate::status::ProcessKind;

/// Drain request as received; exactly one field must be set.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DrainRequest {
    pub time_s: Option<f32>,
    pub volume_l: Option<f32>,
    pub pressure: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrainTarget {
    /// Stop after this many milliseconds.
    Time { ms: u32 },
    /// Stop once the derived tank volume is at or below this.
    Volume(f32),
    /// Stop once gauge pressure is at or below this.
    Pressure(f32),
}

impl TryFrom<DrainRequest> for DrainTarget {
    type Error = DripError;

    fn try_from(r: DrainRequest) -> Result<Self> {
        let positive = |name: &str, v: f32| {
            if v.is_finite() && v > 0.0 {
                Ok(v)
            } else {
                Err(DripError::Validation(format!(
                    "drain {name} must be a positive number, got {v}"
                )))
            }
        };
        match (r.time_s, r.volume_l, r.pressure) {
            (Some(t), None, None) => {
                let ms = positive("time_s", t)? * 1000.0;
                // Keep the deadline well inside the wrapping clock's range.
                if ms >= (u32::MAX / 2) as f32 {
                    return Err(DripError::Validation(format!("drain time_s {t} is too long")));
                }
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let ms = ms.round() as u32;
                Ok(Self::Time { ms })
            }
            (None, Some(v), None) => Ok(Self::Volume(positive("volume_l", v)?)),
            (None, None, Some(p)) => Ok(Self::Pressure(positive("pressure", p)?)),
            _ => Err(DripError::Validation(
                "exactly one of time_s, volume_l, pressure must be set".into(),
            )),
        }
    }
}

impl Controller {
    pub(crate) fn drain_begin(&mut self, request: DrainRequest) -> Result<()> {
        self.ensure_idle(ProcessKind::Drain)?;
        let caps = self.state.caps;
        if !caps.drain_valve {
            return Err(DripError::Configuration("no drain valve installed".into()));
        }
        let target = DrainTarget::try_from(request)?;
        let needs_pressure = matches!(target, DrainTarget::Volume(_) | DrainTarget::Pressure(_));
        if needs_pressure && !caps.pressure_sensor {
            return Err(DripError::Configuration(
                "volume and pressure drain targets need a pressure sensor".into(),
            ));
        }
        let shape = self.state.config.tank.shape;
        if matches!(target, DrainTarget::Volume(_)) && !shape_supported(shape) {
            return Err(DripError::Configuration(format!(
                "tank shape {shape} has no volume conversion"
            )));
        }

        self.close_supply_valves();
        if let Err(e) = self.set_valve(Valve::TankDrain, true) {
            self.close_valve(Valve::TankDrain);
            return Err(e);
        }

        let now = self.now();
        self.state.acc.sum_pressure = 0.0;
        self.state.acc.count_pressure = 0;
        let start_pressure = if caps.pressure_sensor {
            self.sample_pressure()
        } else {
            None
        };
        let st = &mut self.state;
        st.targets.drain = Some(target);
        st.report.drain_start_pressure = start_pressure;
        st.times.process_start = Some(now);
        st.times.last_tick = now;
        st.flags.drain_active = true;

        tracing::info!(?target, start_pressure, "drain start");
        self.notify(LogLevel::Info, "drain started");
        Ok(())
    }

    pub(crate) fn drain_tick(&mut self, now: u32) {
        if self.state.caps.pressure_sensor {
            self.sample_pressure();
        }
        let st = &self.state;
        let done = match st.targets.drain {
            Some(DrainTarget::Time { ms }) => st.elapsed_since_start(now) >= ms,
            Some(DrainTarget::Volume(target)) => st
                .readings
                .pressure
                .is_some_and(|p| pressure_to_volume(p, &st.config.tank) <= target),
            Some(DrainTarget::Pressure(target)) => {
                st.readings.pressure.is_some_and(|p| p <= target)
            }
            None => true,
        };
        if done {
            self.drain_finish(now);
        }
    }

    /// Close the drain and publish its summary.
    pub(crate) fn drain_finish(&mut self, now: u32) {
        let st = &self.state;
        let with_pressure = st.caps.pressure_sensor;
        let to_volume = |p: Option<f32>| {
            p.and_then(|p| volume_or_none(pressure_to_volume(p, &st.config.tank)))
        };
        let start_pressure = st.report.drain_start_pressure.filter(|_| with_pressure);
        let end_pressure = st.readings.pressure.filter(|_| with_pressure);
        let summary = DrainSummary {
            duration_s: st.elapsed_since_start(now) as f32 / 1000.0,
            start_pressure,
            end_pressure,
            start_volume_l: to_volume(start_pressure),
            end_volume_l: to_volume(end_pressure),
        };

        if !self.close_valve(Valve::TankDrain) {
            self.notify(LogLevel::Error, "drain valve stuck open, check the tank");
        }
        let st = &mut self.state;
        st.flags.drain_active = false;
        st.targets.drain = None;
        st.times.process_start = None;
        st.acc.sum_pressure = 0.0;
        st.acc.count_pressure = 0;

        tracing::info!(duration_s = summary.duration_s, end_pressure, "drain complete");
        self.publish(Outbound::DrainSummary(summary));
    }
}
