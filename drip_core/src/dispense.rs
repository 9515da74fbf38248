//! Dispense sessions with tank-to-source failover.
//!
//! The tank is always the primary supply when installed. When it stops
//! delivering (flow below `min_flow_rate` past `tank_timeout_ms`), the session
//! switches to the source once and keeps counting toward the same target.

use drip_traits::Valve;

use crate::config::Capabilities;
use crate::controller::Controller;
use crate::error::{DripError, Result};
use crate::metering::{meter_sensor_tick, meter_static_tick};
use crate::reports::{DispenseSlice, DispenseSummary, LogLevel, Outbound};
use crate::state::SliceAccumulators;
use crate::status::ProcessKind;

/// How volume is measured on a given tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeteringStrategy {
    /// Pulses from the tank line sensor.
    TankSensor,
    /// Pulses from the source line sensor.
    SourceSensor,
    /// Elapsed time times `static_flow_rate`.
    SourceStatic,
}

impl MeteringStrategy {
    /// `None` only for topologies a dispense session refuses to start on.
    pub const fn select(caps: &Capabilities, switched: bool) -> Option<Self> {
        match (caps.tank, caps.source, switched, caps.source_sensor) {
            (true, _, false, _) => Some(Self::TankSensor),
            (true, true, true, true) | (false, true, _, true) => Some(Self::SourceSensor),
            (true, true, true, false) | (false, true, _, false) => Some(Self::SourceStatic),
            (true, false, true, _) | (false, false, _, _) => None,
        }
    }

    pub const fn is_static(self) -> bool {
        matches!(self, Self::SourceStatic)
    }
}

impl Controller {
    pub(crate) fn dispense_begin(&mut self, target_volume_l: f32) -> Result<()> {
        self.ensure_idle(ProcessKind::Dispense)?;
        if !(target_volume_l.is_finite() && target_volume_l > 0.0) {
            return Err(DripError::Validation(format!(
                "target volume must be a positive number of liters, got {target_volume_l}"
            )));
        }
        let caps = self.state.caps;
        let Some(primary) = caps.primary_supply() else {
            return Err(DripError::Configuration(
                "neither a tank nor a source is installed".into(),
            ));
        };

        let opened = if primary == Valve::TankSupply {
            self.set_valve(Valve::SourceSupply, false)
                .and_then(|()| self.set_valve(Valve::TankSupply, true))
        } else {
            self.set_valve(Valve::SourceSupply, true)
        };
        if let Err(e) = opened {
            self.close_supply_valves();
            return Err(e);
        }

        let now = self.now();
        self.pulses.reset();
        let st = &mut self.state;
        st.acc = SliceAccumulators::default();
        st.readings.rebaseline();
        st.report.last_reported_volume = 0.0;
        st.report.tank_output_volume = 0.0;
        st.flags.reservoir_switched = false;
        st.times.reservoir_switch_time = None;
        st.targets.output_volume = target_volume_l;
        st.times.process_start = Some(now);
        st.times.last_tick = now;
        st.flags.dispense_active = true;

        tracing::info!(target_l = target_volume_l, supply = %primary, "dispense start");
        self.notify(
            LogLevel::Info,
            format!("dispense started: {target_volume_l:.2} L from {primary}"),
        );
        Ok(())
    }

    pub(crate) fn dispense_tick(&mut self, now: u32) {
        let caps = self.state.caps;
        let Some(strategy) = MeteringStrategy::select(&caps, self.state.flags.reservoir_switched)
        else {
            tracing::error!(?caps, "no metering strategy for this topology");
            self.dispense_finish(now);
            return;
        };

        match strategy {
            MeteringStrategy::TankSensor | MeteringStrategy::SourceSensor => {
                let count = self.pulses.snapshot();
                let flow = self.state.config.flow;
                if let Some(rate) =
                    meter_sensor_tick(&mut self.state.acc, &mut self.state.readings, count, &flow)
                {
                    tracing::warn!(rate, max = flow.max_flow_rate, "flow sensor overloaded");
                    self.notify(
                        LogLevel::Warning,
                        format!(
                            "flow {rate:.2} L/min exceeds sensor maximum {:.2} L/min",
                            flow.max_flow_rate
                        ),
                    );
                }
            }
            MeteringStrategy::SourceStatic => {
                meter_static_tick(&mut self.state.acc, self.state.config.source.static_flow_rate);
            }
        }
        if caps.pressure_sensor {
            self.sample_pressure();
        }

        let total = self.state.acc.total_output_volume;
        if total >= self.state.targets.output_volume {
            tracing::info!(volume_l = total, "dispense target reached");
            self.dispense_finish(now);
            return;
        }
        if total - self.state.report.last_reported_volume
            >= self.state.config.services.report_resolution_l
        {
            let slice = self.dispense_slice(now, strategy.is_static());
            self.state.report.last_reported_volume = total;
            self.publish(Outbound::DispenseSlice(slice));
        }

        self.check_tank_starvation(now);
    }

    fn check_tank_starvation(&mut self, now: u32) {
        let st = &self.state;
        let caps = st.caps;
        if !st.flags.dispense_active || !caps.tank || st.flags.reservoir_switched {
            return;
        }
        if st.acc.flow_rate >= st.config.flow.min_flow_rate
            || st.elapsed_since_start(now) <= st.config.tank.tank_timeout_ms
        {
            return;
        }

        let tank_l = st.acc.total_output_volume;
        if !caps.source {
            tracing::warn!(tank_l, "tank empty, no source to fall back on");
            self.notify(LogLevel::Warning, "tank empty, dispense stopped");
            self.dispense_finish(now);
            return;
        }

        if let Err(e) = self.set_valve(Valve::SourceSupply, true) {
            tracing::error!(error = %e, "failover to source failed");
            self.notify(LogLevel::Error, format!("failover to source failed: {e}"));
            self.dispense_finish(now);
            return;
        }
        if !self.close_valve(Valve::TankSupply) {
            self.notify(LogLevel::Error, "tank valve stuck open, dispense stopped");
            self.dispense_finish(now);
            self.close_all_valves();
            return;
        }

        let st = &mut self.state;
        st.flags.reservoir_switched = true;
        st.report.tank_output_volume = tank_l;
        st.times.reservoir_switch_time = Some(now);
        let at_s = st.elapsed_since_start(now) as f32 / 1000.0;
        tracing::info!(tank_l, at_s, "tank starved, switched to source");
        self.notify(
            LogLevel::Info,
            format!("tank starved after {tank_l:.2} L, switched to source"),
        );
    }

    fn dispense_slice(&mut self, now: u32, static_metering: bool) -> DispenseSlice {
        let elapsed_s = self.state.elapsed_since_start(now) as f32 / 1000.0;
        let avg_flow = self.state.acc.take_flow_average();
        let flow_lpm = if static_metering {
            self.state.config.source.static_flow_rate
        } else {
            avg_flow
        };
        let avg_pressure = self.state.acc.take_pressure_average();
        let (pressure, tank_volume_l) = self.tank_quantities(avg_pressure);
        DispenseSlice {
            elapsed_s,
            volume_l: self.state.acc.total_output_volume,
            flow_lpm,
            pressure,
            tank_volume_l,
        }
    }

    /// Final slice and summary, then close.
    pub(crate) fn dispense_finish(&mut self, now: u32) {
        let st = &self.state;
        let switched = st.flags.reservoir_switched;
        let static_metering = MeteringStrategy::select(&st.caps, switched)
            .is_some_and(MeteringStrategy::is_static);
        let tank_volume_l = if switched {
            st.report.tank_output_volume
        } else {
            st.acc.total_output_volume
        };
        let summary = DispenseSummary {
            duration_s: st.elapsed_since_start(now) as f32 / 1000.0,
            volume_l: st.acc.total_output_volume,
            tank_volume_l: st.caps.tank.then_some(tank_volume_l),
            tank_switch_time_s: st
                .times
                .reservoir_switch_time
                .filter(|_| switched)
                .zip(st.times.process_start)
                .map(|(at, start)| drip_traits::clock::elapsed_ms(at, start) as f32 / 1000.0),
        };
        let slice = self.dispense_slice(now, static_metering);

        self.dispense_close();

        self.publish(Outbound::DispenseSlice(slice));
        self.publish(Outbound::DispenseSummary(summary));
        tracing::info!(
            volume_l = summary.volume_l,
            duration_s = summary.duration_s,
            switched,
            "dispense complete"
        );
    }

    fn dispense_close(&mut self) {
        if !self.state.flags.reservoir_switched {
            self.state.report.tank_output_volume = self.state.acc.total_output_volume;
        }
        self.close_supply_valves();
        self.state.report.last_reported_volume = self.state.acc.total_output_volume;
        self.state.flags.dispense_active = false;
        self.state.times.process_start = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn caps(tank: bool, source: bool, source_sensor: bool) -> Capabilities {
        Capabilities {
            tank,
            source,
            source_sensor,
            ..Capabilities::default()
        }
    }

    #[rstest]
    #[case(true, true, false, false, Some(MeteringStrategy::TankSensor))]
    #[case(true, true, false, true, Some(MeteringStrategy::TankSensor))]
    #[case(true, false, false, false, Some(MeteringStrategy::TankSensor))]
    #[case(true, true, true, true, Some(MeteringStrategy::SourceSensor))]
    #[case(true, true, true, false, Some(MeteringStrategy::SourceStatic))]
    #[case(false, true, false, true, Some(MeteringStrategy::SourceSensor))]
    #[case(false, true, true, true, Some(MeteringStrategy::SourceSensor))]
    #[case(false, true, false, false, Some(MeteringStrategy::SourceStatic))]
    #[case(false, true, true, false, Some(MeteringStrategy::SourceStatic))]
    #[case(false, false, false, false, None)]
    fn strategy_decision_table(
        #[case] tank: bool,
        #[case] source: bool,
        #[case] switched: bool,
        #[case] source_sensor: bool,
        #[case] want: Option<MeteringStrategy>,
    ) {
        assert_eq!(
            MeteringStrategy::select(&caps(tank, source, source_sensor), switched),
            want
        );
    }
}
