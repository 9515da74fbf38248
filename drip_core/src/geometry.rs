//! Tank geometry: sensed pressure to stored volume.
//!
//! Shape codes follow `drip_config`: 1 is a rectangular prism
//! (`dim1` x `dim2`, `dim3` high), 2 is an upright cylinder (`dim1` across,
//! `dim2` high). Any other code yields [`UNSUPPORTED`].

use std::f32::consts::PI;

use drip_config::{SHAPE_CYLINDER, SHAPE_RECTANGULAR, TankCfg};

pub const GRAVITY: f32 = 9.806_65;
pub const FLUID_DENSITY: f32 = 997.047_4;

/// Sentinel for "no volume can be derived for this tank".
pub const UNSUPPORTED: f32 = -1.0;

pub const fn shape_supported(shape: u8) -> bool {
    matches!(shape, SHAPE_RECTANGULAR | SHAPE_CYLINDER)
}

/// Fluid column height for a gauge pressure reading.
pub fn pressure_to_height(pressure: f32) -> f32 {
    (pressure / 10.0) / (GRAVITY * FLUID_DENSITY)
}

/// Volume held in the tank at the given gauge pressure.
pub fn pressure_to_volume(pressure: f32, tank: &TankCfg) -> f32 {
    let height = pressure_to_height(pressure);
    match tank.shape {
        SHAPE_RECTANGULAR => tank.dim1 * tank.dim2 * height,
        SHAPE_CYLINDER => PI * (tank.dim1 / 2.0).powi(2) * height,
        _ => UNSUPPORTED,
    }
}

/// Volume of a full tank.
pub fn tank_capacity(tank: &TankCfg) -> f32 {
    match tank.shape {
        SHAPE_RECTANGULAR => tank.dim1 * tank.dim2 * tank.dim3,
        SHAPE_CYLINDER => PI * (tank.dim1 / 2.0).powi(2) * tank.dim2,
        _ => UNSUPPORTED,
    }
}

/// Drops negative volumes (the sentinel, or readings below atmosphere).
pub fn volume_or_none(v: f32) -> Option<f32> {
    (v.is_finite() && v >= 0.0).then_some(v)
}
