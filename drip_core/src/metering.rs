//! Per-tick flow and pressure metering.
//!
//! Each function updates the accumulator set it is handed and is called at
//! most once per control-loop iteration. Dispense and calibration share
//! [`meter_sensor_tick`].

use drip_config::FlowSensorCfg;
use drip_traits::PressureSensor;

use crate::error::DripError;
use crate::hw_error::map_hw_error;
use crate::state::{SensorReadings, SliceAccumulators};

const MS_PER_MINUTE: f32 = 60_000.0;

/// Convert new pulses into volume and flow.
///
/// `acc.time_elapsed` must already hold this tick's duration. The rate is
/// taken over the whole interval since the counter last advanced, so flows
/// slower than one pulse per tick read steadily. While the counter stands
/// still the rate is capped at one pulse over that interval and decays
/// towards zero. Returns the measured rate when it exceeds
/// `flow.max_flow_rate`.
pub fn meter_sensor_tick(
    acc: &mut SliceAccumulators,
    readings: &mut SensorReadings,
    pulse_count: u32,
    flow: &FlowSensorCfg,
) -> Option<f32> {
    acc.pulses_elapsed = 0;
    acc.volume_elapsed = 0.0;
    readings.ms_since_last_pulse = readings.ms_since_last_pulse.saturating_add(acc.time_elapsed);
    let gap_ms = readings.ms_since_last_pulse;

    if pulse_count <= readings.last_pulse_count {
        // No new pulses. A smaller value means the counter was reset.
        readings.last_pulse_count = pulse_count;
        if gap_ms > 0 {
            let bound = rate_lpm(1.0 / flow.pulses_per_liter, gap_ms);
            acc.flow_rate = acc.flow_rate.min(bound);
        }
        return None;
    }

    let pulses = pulse_count - readings.last_pulse_count;
    readings.last_pulse_count = pulse_count;

    let volume = pulses as f32 / flow.pulses_per_liter;
    acc.pulses_elapsed = pulses;
    acc.volume_elapsed = volume;
    acc.total_output_volume += volume;

    if gap_ms == 0 {
        // Volume is credited, the rate waits for a tick with a duration.
        return None;
    }
    readings.ms_since_last_pulse = 0;
    acc.flow_rate = rate_lpm(volume, gap_ms);
    acc.sum_flow += acc.flow_rate;
    acc.count_flow += 1;

    (acc.flow_rate > flow.max_flow_rate).then_some(acc.flow_rate)
}

fn rate_lpm(volume_l: f32, ms: u32) -> f32 {
    volume_l / ms as f32 * MS_PER_MINUTE
}

/// Credit volume at a fixed assumed rate (source without its own sensor).
pub fn meter_static_tick(acc: &mut SliceAccumulators, static_flow_rate: f32) {
    let volume = acc.time_elapsed as f32 / MS_PER_MINUTE * static_flow_rate;
    acc.pulses_elapsed = 0;
    acc.volume_elapsed = volume;
    acc.total_output_volume += volume;
    acc.flow_rate = static_flow_rate;
}

/// Sample the pressure sensor into `readings` and the running average.
///
/// Returns the gauge pressure, or `None` when the sensor had no sample.
pub fn meter_pressure_tick(
    sensor: &mut dyn PressureSensor,
    readings: &mut SensorReadings,
    acc: &mut SliceAccumulators,
    atmosphere_offset: f32,
) -> Result<Option<f32>, DripError> {
    match sensor.read() {
        Ok(Some(raw)) if raw.is_finite() => {
            let gauge = raw - atmosphere_offset;
            readings.pressure = Some(gauge);
            acc.sum_pressure += gauge;
            acc.count_pressure += 1;
            Ok(Some(gauge))
        }
        Ok(_) => {
            readings.pressure = None;
            Ok(None)
        }
        Err(e) => Err(map_hw_error(&*e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drip_hardware::{PressureSample, ScriptedPressure};

    fn flow() -> FlowSensorCfg {
        FlowSensorCfg {
            pulses_per_liter: 100.0,
            max_flow_rate: 30.0,
            ..FlowSensorCfg::default()
        }
    }

    #[test]
    fn pulses_become_volume_and_rate() {
        let mut acc = SliceAccumulators {
            time_elapsed: 1_000,
            ..SliceAccumulators::default()
        };
        let mut rd = SensorReadings::default();
        // 25 pulses = 0.25 L in one second = 15 L/min
        assert_eq!(meter_sensor_tick(&mut acc, &mut rd, 25, &flow()), None);
        assert_eq!(acc.pulses_elapsed, 25);
        assert!((acc.total_output_volume - 0.25).abs() < 1e-6);
        assert!((acc.flow_rate - 15.0).abs() < 1e-4);
        assert_eq!(acc.count_flow, 1);
        assert_eq!(rd.last_pulse_count, 25);
    }

    #[test]
    fn stalled_counter_decays_the_rate() {
        let mut acc = SliceAccumulators {
            time_elapsed: 500,
            flow_rate: 12.0,
            ..SliceAccumulators::default()
        };
        let mut rd = SensorReadings {
            last_pulse_count: 40,
            ..SensorReadings::default()
        };
        // One pulse (0.01 L) over 500 ms bounds the rate at 1.2 L/min.
        assert_eq!(meter_sensor_tick(&mut acc, &mut rd, 40, &flow()), None);
        assert!((acc.flow_rate - 1.2).abs() < 1e-4);
        assert_eq!(rd.ms_since_last_pulse, 500);
        meter_sensor_tick(&mut acc, &mut rd, 40, &flow());
        assert!((acc.flow_rate - 0.6).abs() < 1e-4);
        assert_eq!(acc.count_flow, 0);
        assert_eq!(acc.total_output_volume, 0.0);
    }

    #[test]
    fn sparse_pulses_are_rated_over_the_gap() {
        let mut acc = SliceAccumulators {
            time_elapsed: 100,
            ..SliceAccumulators::default()
        };
        let mut rd = SensorReadings::default();
        // One pulse every 200 ms at 100 pulses/L is 3 L/min.
        let mut count = 0;
        for tick in 0..20 {
            if tick % 2 == 1 {
                count += 1;
            }
            meter_sensor_tick(&mut acc, &mut rd, count, &flow());
            if tick > 0 {
                assert!((acc.flow_rate - 3.0).abs() < 1e-3, "tick {tick}: {}", acc.flow_rate);
            }
        }
        assert_eq!(acc.count_flow, 10);
    }

    #[test]
    fn backwards_counter_rebaselines() {
        let mut acc = SliceAccumulators {
            time_elapsed: 100,
            ..SliceAccumulators::default()
        };
        let mut rd = SensorReadings {
            last_pulse_count: 900,
            ..SensorReadings::default()
        };
        meter_sensor_tick(&mut acc, &mut rd, 3, &flow());
        assert_eq!(rd.last_pulse_count, 3);
        assert_eq!(acc.total_output_volume, 0.0);
        meter_sensor_tick(&mut acc, &mut rd, 13, &flow());
        assert!((acc.total_output_volume - 0.1).abs() < 1e-6);
    }

    #[test]
    fn overload_is_reported() {
        let mut acc = SliceAccumulators {
            time_elapsed: 1_000,
            ..SliceAccumulators::default()
        };
        let mut rd = SensorReadings::default();
        // 1 L in one second = 60 L/min
        let over = meter_sensor_tick(&mut acc, &mut rd, 100, &flow());
        assert!(over.is_some_and(|r| (r - 60.0).abs() < 1e-3));
    }

    #[test]
    fn static_rate_integrates_time() {
        let mut acc = SliceAccumulators {
            time_elapsed: 30_000,
            ..SliceAccumulators::default()
        };
        meter_static_tick(&mut acc, 12.0);
        assert!((acc.total_output_volume - 6.0).abs() < 1e-5);
        assert_eq!(acc.flow_rate, 12.0);
        assert_eq!(acc.count_flow, 0);
    }

    #[test]
    fn pressure_subtracts_atmosphere_and_skips_gaps() {
        let mut sensor = ScriptedPressure::new([1213.25]);
        sensor.push(PressureSample::Missing);
        sensor.push(PressureSample::Fault);
        let mut rd = SensorReadings::default();
        let mut acc = SliceAccumulators::default();

        let p = meter_pressure_tick(&mut sensor, &mut rd, &mut acc, 1013.25).unwrap();
        assert_eq!(p, Some(200.0));
        assert_eq!(meter_pressure_tick(&mut sensor, &mut rd, &mut acc, 1013.25), Ok(None));
        assert_eq!(rd.pressure, None);
        let err = meter_pressure_tick(&mut sensor, &mut rd, &mut acc, 1013.25).unwrap_err();
        assert!(matches!(err, DripError::TransientIo(_)));
        assert_eq!((acc.sum_pressure, acc.count_pressure), (200.0, 1));
    }
}
