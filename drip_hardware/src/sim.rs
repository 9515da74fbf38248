//! Simulated valves, pressure sensor and a small tank/source plant model.
//!
//! All handles are cheap clones over shared state, so a test or the CLI can
//! keep one copy while the controller owns another.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use drip_traits::{PressureSensor, PulseCounter, Valve, Valves};

use crate::error::HwError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // Poisoning only happens after a panic elsewhere; keep serving the data.
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

const fn slot(v: Valve) -> usize {
    match v {
        Valve::SourceSupply => 0,
        Valve::TankSupply => 1,
        Valve::TankDrain => 2,
    }
}

/// One actuation as seen by the simulated valve bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValveEvent {
    pub valve: Valve,
    pub open: bool,
}

#[derive(Debug, Default)]
struct ValveBank {
    open: [bool; 3],
    history: Vec<ValveEvent>,
    failing: Option<Valve>,
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedValves {
    bank: Arc<Mutex<ValveBank>>,
}

impl SimulatedValves {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self, valve: Valve) -> bool {
        lock(&self.bank).open[slot(valve)]
    }

    pub fn open_valves(&self) -> Vec<Valve> {
        let bank = lock(&self.bank);
        Valve::ALL
            .into_iter()
            .filter(|v| bank.open[slot(*v)])
            .collect()
    }

    /// Every open/close call received, in order.
    pub fn history(&self) -> Vec<ValveEvent> {
        lock(&self.bank).history.clone()
    }

    /// Make every call touching `valve` fail until cleared with `None`.
    pub fn fail_on(&self, valve: Option<Valve>) {
        lock(&self.bank).failing = valve;
    }

    fn actuate(&self, valve: Valve, open: bool) -> Result<(), BoxError> {
        let mut bank = lock(&self.bank);
        if bank.failing == Some(valve) {
            return Err(Box::new(HwError::Valve(valve.as_str())));
        }
        bank.history.push(ValveEvent { valve, open });
        if bank.open[slot(valve)] != open {
            tracing::trace!(%valve, open, "simulated valve");
        }
        bank.open[slot(valve)] = open;
        Ok(())
    }
}

impl Valves for SimulatedValves {
    fn open(&mut self, valve: Valve) -> Result<(), BoxError> {
        self.actuate(valve, true)
    }

    fn close(&mut self, valve: Valve) -> Result<(), BoxError> {
        self.actuate(valve, false)
    }
}

/// A queued pressure sensor outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PressureSample {
    Value(f32),
    Missing,
    Fault,
}

#[derive(Debug, Default)]
struct Script {
    queue: VecDeque<PressureSample>,
    last: Option<f32>,
    reads: usize,
}

/// Pressure sensor that replays queued samples, then repeats the last value.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPressure {
    script: Arc<Mutex<Script>>,
}

impl ScriptedPressure {
    pub fn new(values: impl IntoIterator<Item = f32>) -> Self {
        let s = Self::default();
        for v in values {
            s.push(PressureSample::Value(v));
        }
        s
    }

    pub fn push(&self, sample: PressureSample) {
        lock(&self.script).queue.push_back(sample);
    }

    pub fn reads(&self) -> usize {
        lock(&self.script).reads
    }
}

impl PressureSensor for ScriptedPressure {
    fn read(&mut self) -> Result<Option<f32>, BoxError> {
        let mut s = lock(&self.script);
        s.reads += 1;
        match s.queue.pop_front() {
            Some(PressureSample::Value(v)) => {
                s.last = Some(v);
                Ok(Some(v))
            }
            Some(PressureSample::Missing) => Ok(None),
            Some(PressureSample::Fault) => Err(Box::new(HwError::SensorFault(
                "scripted fault".to_string(),
            ))),
            None => Ok(s.last),
        }
    }
}

/// Physical parameters of the simulated installation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlantParams {
    /// Water initially in the tank (liters).
    pub tank_level_l: f32,
    /// Gauge pressure per liter of water in the tank (hPa/L).
    pub hpa_per_liter: f32,
    /// Ambient pressure added to every raw reading (hPa).
    pub atmosphere_hpa: f32,
    /// Gravity flow out of the tank supply valve while water remains (L/min).
    pub tank_flow_lpm: f32,
    /// Flow from the pressurized source (L/min).
    pub source_flow_lpm: f32,
    /// Flow out of the drain valve while water remains (L/min).
    pub drain_flow_lpm: f32,
    /// Pulses the simulated sensor emits per liter.
    pub pulses_per_liter: f32,
}

impl Default for PlantParams {
    fn default() -> Self {
        Self {
            tank_level_l: 150.0,
            hpa_per_liter: 0.5,
            atmosphere_hpa: 1013.25,
            tank_flow_lpm: 6.0,
            source_flow_lpm: 12.45,
            drain_flow_lpm: 20.0,
            pulses_per_liter: 1265.289,
        }
    }
}

#[derive(Debug)]
struct PlantState {
    params: PlantParams,
    level_l: f32,
    pulse_carry: f64,
}

/// Tank plus source model driven by the simulated valve positions.
///
/// `step` advances the model: open supply valves pour water past the flow
/// sensor and bump the pulse counter, the tank supply and drain valves lower
/// the tank level.
#[derive(Debug, Clone)]
pub struct SimulatedPlant {
    valves: SimulatedValves,
    pulses: PulseCounter,
    state: Arc<Mutex<PlantState>>,
}

impl SimulatedPlant {
    pub fn new(params: PlantParams, valves: SimulatedValves, pulses: PulseCounter) -> Self {
        Self {
            valves,
            pulses,
            state: Arc::new(Mutex::new(PlantState {
                level_l: params.tank_level_l.max(0.0),
                params,
                pulse_carry: 0.0,
            })),
        }
    }

    pub fn level_l(&self) -> f32 {
        lock(&self.state).level_l
    }

    /// Pressure sensor reading this plant's tank.
    pub fn pressure_sensor(&self) -> PlantPressure {
        PlantPressure {
            state: Arc::clone(&self.state),
        }
    }

    pub fn step(&self, dt_ms: u32) {
        let minutes = dt_ms as f32 / 60_000.0;
        let mut st = lock(&self.state);
        let p = st.params;

        let mut sensed_l = 0.0;
        if self.valves.is_open(Valve::TankSupply) {
            let out = (p.tank_flow_lpm * minutes).min(st.level_l);
            st.level_l -= out;
            sensed_l += out;
        }
        if self.valves.is_open(Valve::SourceSupply) {
            sensed_l += p.source_flow_lpm * minutes;
        }
        if self.valves.is_open(Valve::TankDrain) {
            let out = (p.drain_flow_lpm * minutes).min(st.level_l);
            st.level_l -= out;
        }

        st.pulse_carry += f64::from(sensed_l) * f64::from(p.pulses_per_liter);
        let whole = st.pulse_carry.floor();
        st.pulse_carry -= whole;
        if whole >= 1.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            self.pulses.add(whole as u32);
        }
    }
}

/// Raw (absolute) pressure of a [`SimulatedPlant`] tank.
#[derive(Debug, Clone)]
pub struct PlantPressure {
    state: Arc<Mutex<PlantState>>,
}

impl PressureSensor for PlantPressure {
    fn read(&mut self) -> Result<Option<f32>, BoxError> {
        let st = lock(&self.state);
        Ok(Some(
            st.params.atmosphere_hpa + st.level_l * st.params.hpa_per_liter,
        ))
    }
}
