#![allow(dead_code)]

use drip_config::{Config, MemoryStore};
use drip_core::mocks::RecordingPublisher;
use drip_core::{Controller, Outbound, TickStatus};
use drip_hardware::{ScriptedPressure, SimulatedValves};
use drip_traits::{Clock, ManualClock, PulseCounter};

/// Controller wired to simulated hardware, with handles kept for inspection.
pub struct Rig {
    pub ctl: Controller,
    pub clock: ManualClock,
    pub valves: SimulatedValves,
    pub pulses: PulseCounter,
    pub pressure: ScriptedPressure,
    pub out: RecordingPublisher,
    pub store: MemoryStore,
}

impl Rig {
    pub fn new(cfg: Config) -> Self {
        Self::with_clock(cfg, ManualClock::new())
    }

    pub fn with_clock(cfg: Config, clock: ManualClock) -> Self {
        Self::with_pressure(cfg, clock, ScriptedPressure::default())
    }

    pub fn with_pressure(cfg: Config, clock: ManualClock, pressure: ScriptedPressure) -> Self {
        let valves = SimulatedValves::new();
        let pulses = PulseCounter::new();
        let out = RecordingPublisher::new();
        let store = MemoryStore::new(cfg);
        let ctl = Controller::builder()
            .with_valves(valves.clone())
            .with_publisher(out.clone())
            .with_store(store.clone())
            .with_pressure_sensor(pressure.clone())
            .with_pulse_counter(pulses.clone())
            .with_clock(clock.clone())
            .build()
            .expect("build controller");
        Self {
            ctl,
            clock,
            valves,
            pulses,
            pressure,
            out,
            store,
        }
    }

    pub fn clock_now(&self) -> u32 {
        self.clock.millis()
    }

    /// Advance the clock by `ms` and run one tick.
    pub fn step(&mut self, ms: u32) -> TickStatus {
        self.clock.advance(ms);
        self.ctl.tick()
    }

    /// Tick every `ms` until the running process finishes.
    pub fn run_until_finished(&mut self, ms: u32, max_ticks: usize) -> TickStatus {
        for _ in 0..max_ticks {
            let status = self.step(ms);
            if matches!(status, TickStatus::Finished(_)) {
                return status;
            }
        }
        panic!("process still running after {max_ticks} ticks");
    }

    pub fn summaries(&self) -> Vec<drip_core::DispenseSummary> {
        self.out
            .on_topic("dispense/summary")
            .into_iter()
            .filter_map(|m| match m {
                Outbound::DispenseSummary(s) => Some(s),
                _ => None,
            })
            .collect()
    }
}

/// Defaults with a zero atmosphere offset, so scripted readings are gauge values.
pub fn base_config() -> Config {
    let mut cfg = Config::default();
    cfg.pressure.atmosphere_offset = 0.0;
    cfg
}

pub fn approx(a: f32, b: f32, tol: f32) -> bool {
    (a - b).abs() <= tol
}
