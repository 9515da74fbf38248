//! Valve, pressure and flow backends for the controller.
//!
//! The simulated types are always available; the Raspberry Pi GPIO backend
//! sits behind the `hardware` feature.
pub mod error;
pub mod sim;

#[cfg(feature = "hardware")]
pub mod gpio;

pub use error::HwError;
pub use sim::{
    PlantParams, PlantPressure, PressureSample, ScriptedPressure, SimulatedPlant, SimulatedValves,
    ValveEvent,
};
