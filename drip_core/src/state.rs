//! Device state shared by every process.
//!
//! Owned by the `Controller`. Commands never write accumulators directly;
//! they go through the begin/close entry points of each process.

use drip_config::Config;

use crate::calibration::CalibrationStage;
use crate::config::Capabilities;
use crate::drain::DrainTarget;
use crate::status::ProcessKind;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub dispense_active: bool,
    pub drain_active: bool,
    pub calibration_active: bool,
    /// Set once a dispense session has failed over from tank to source.
    pub reservoir_switched: bool,
    /// Deactivation requested; performed at the start of the next tick.
    pub deactivate_pending: bool,
    pub broker_connected: bool,
}

impl Flags {
    /// The running process, if any. At most one flag is ever set.
    pub const fn active_process(&self) -> Option<ProcessKind> {
        if self.dispense_active {
            Some(ProcessKind::Dispense)
        } else if self.drain_active {
            Some(ProcessKind::Drain)
        } else if self.calibration_active {
            Some(ProcessKind::Calibration)
        } else {
            None
        }
    }

    pub const fn any_process(&self) -> bool {
        self.dispense_active || self.drain_active || self.calibration_active
    }

    pub(crate) fn clear_processes(&mut self) {
        self.dispense_active = false;
        self.drain_active = false;
        self.calibration_active = false;
        self.reservoir_switched = false;
    }
}

/// Millisecond timestamps on the wrapping `u32` clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timestamps {
    pub process_start: Option<u32>,
    pub last_tick: u32,
    pub reservoir_switch_time: Option<u32>,
    pub last_calibration_action: u32,
    pub last_reconnect_attempt: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Targets {
    pub output_volume: f32,
    pub calibration_volume: f32,
    pub drain: Option<DrainTarget>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorReadings {
    /// Pulse counter value consumed by the last sensor metering tick.
    pub last_pulse_count: u32,
    /// Time metered since the counter last advanced.
    pub ms_since_last_pulse: u32,
    /// Latest gauge pressure (atmosphere already subtracted).
    pub pressure: Option<f32>,
}

impl SensorReadings {
    /// Start counting from a freshly reset pulse counter.
    pub(crate) fn rebaseline(&mut self) {
        self.last_pulse_count = 0;
        self.ms_since_last_pulse = 0;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SliceAccumulators {
    pub time_elapsed: u32,
    pub pulses_elapsed: u32,
    pub volume_elapsed: f32,
    pub flow_rate: f32,
    pub total_output_volume: f32,
    pub sum_flow: f32,
    pub count_flow: u32,
    pub sum_pressure: f32,
    pub count_pressure: u32,
    pub sum_pulses_per_liter: f32,
    pub count_calibration: u32,
}

impl SliceAccumulators {
    /// Mean flow since the last report, then zero the sums. 0 without samples.
    pub fn take_flow_average(&mut self) -> f32 {
        let avg = if self.count_flow == 0 {
            0.0
        } else {
            self.sum_flow / self.count_flow as f32
        };
        self.sum_flow = 0.0;
        self.count_flow = 0;
        avg
    }

    /// Mean pressure since the last report, then zero the sums.
    pub fn take_pressure_average(&mut self) -> Option<f32> {
        let avg = (self.count_pressure > 0).then(|| self.sum_pressure / self.count_pressure as f32);
        self.sum_pressure = 0.0;
        self.count_pressure = 0;
        avg
    }

    /// Mean of the calibration samples, then zero the sums.
    pub fn take_calibration_mean(&mut self) -> Option<f32> {
        let mean = (self.count_calibration > 0)
            .then(|| self.sum_pulses_per_liter / self.count_calibration as f32);
        self.sum_pulses_per_liter = 0.0;
        self.count_calibration = 0;
        mean
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReportState {
    pub last_reported_volume: f32,
    pub tank_output_volume: f32,
    pub calibration_id: Option<u32>,
    pub calibration_stage: Option<CalibrationStage>,
    pub drain_start_pressure: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct DeviceState {
    pub flags: Flags,
    pub times: Timestamps,
    pub targets: Targets,
    pub readings: SensorReadings,
    pub acc: SliceAccumulators,
    pub report: ReportState,
    pub caps: Capabilities,
    pub config: Config,
}

impl DeviceState {
    pub fn new(config: Config, now: u32) -> Self {
        Self {
            flags: Flags::default(),
            times: Timestamps {
                last_tick: now,
                last_calibration_action: now,
                ..Timestamps::default()
            },
            targets: Targets::default(),
            readings: SensorReadings::default(),
            acc: SliceAccumulators::default(),
            report: ReportState::default(),
            caps: Capabilities::from(&config),
            config,
        }
    }

    /// Milliseconds since the active process started; 0 when idle.
    pub fn elapsed_since_start(&self, now: u32) -> u32 {
        self.times
            .process_start
            .map_or(0, |start| drip_traits::clock::elapsed_ms(now, start))
    }
}
