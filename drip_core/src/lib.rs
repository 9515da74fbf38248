#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Process engine for the irrigation controller (hardware-agnostic).
//!
//! All hardware goes through `drip_traits` (`Valves`, `PressureSensor`,
//! `PulseCounter`, `Clock`); all messaging goes through [`ports::Publisher`].
//!
//! ## Architecture
//!
//! - **Geometry**: pressure to tank volume (`geometry`)
//! - **Metering**: pulses, static rate and pressure into per-tick deltas (`metering`)
//! - **Processes**: dispense with tank/source failover, calibration, drain;
//!   at most one runs at a time
//! - **Controller**: owns `DeviceState`, runs `tick()`, routes `Command`s
//!
//! The controller is driven by an external loop calling [`Controller::tick`]
//! at a roughly fixed cadence. Timestamps are `u32` milliseconds compared with
//! wrapping subtraction.

pub mod builder;
pub mod calibration;
pub mod commands;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod dispense;
pub mod drain;
pub mod error;
pub mod geometry;
pub mod hw_error;
pub mod metering;
pub mod mocks;
pub mod ports;
pub mod reports;
pub mod state;
pub mod status;

pub use builder::ControllerBuilder;
pub use calibration::CalibrationStage;
pub use commands::{Command, CommandOutcome};
pub use config::Capabilities;
pub use controller::Controller;
pub use dispense::MeteringStrategy;
pub use drain::{DrainRequest, DrainTarget};
pub use error::{BuildError, DripError, Result};
pub use ports::Publisher;
pub use reports::{
    DispenseSlice, DispenseSummary, DrainSummary, LogLevel, LogMessage, Outbound, PressureReport,
};
pub use state::DeviceState;
pub use status::{ProcessKind, TickStatus};
