//! Partial configuration updates.
//!
//! Every field is independently optional; absent fields leave the live
//! configuration untouched. Topology, broker and logging settings are not
//! patchable at runtime.

use serde::{Deserialize, Serialize};

use crate::{Config, ReportMode};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServicesPatch {
    pub report_resolution_l: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourcePatch {
    pub static_flow_rate: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TankPatch {
    pub shape: Option<u8>,
    pub dim1: Option<f32>,
    pub dim2: Option<f32>,
    pub dim3: Option<f32>,
    pub tank_timeout_ms: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlowPatch {
    pub pulses_per_liter: Option<f32>,
    pub min_flow_rate: Option<f32>,
    pub max_flow_rate: Option<f32>,
    pub calibration_timeout_s: Option<u32>,
    pub calibration_max_volume_l: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PressurePatch {
    pub report_mode: Option<ReportMode>,
    pub atmosphere_offset: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigPatch {
    pub services: Option<ServicesPatch>,
    pub source: Option<SourcePatch>,
    pub tank: Option<TankPatch>,
    pub flow: Option<FlowPatch>,
    pub pressure: Option<PressurePatch>,
}

fn set<T: PartialEq>(
    dst: &mut T,
    src: Option<T>,
    name: &'static str,
    changed: &mut Vec<&'static str>,
) {
    if let Some(v) = src {
        if *dst != v {
            changed.push(name);
        }
        *dst = v;
    }
}

impl ConfigPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply every present field to `cfg`. Returns the dotted names of the
    /// fields whose value actually changed.
    pub fn apply_to(&self, cfg: &mut Config) -> Vec<&'static str> {
        let mut changed = Vec::new();
        let c = &mut changed;

        if let Some(p) = &self.services {
            set(
                &mut cfg.services.report_resolution_l,
                p.report_resolution_l,
                "services.report_resolution_l",
                c,
            );
        }
        if let Some(p) = &self.source {
            set(&mut cfg.source.static_flow_rate, p.static_flow_rate, "source.static_flow_rate", c);
        }
        if let Some(p) = &self.tank {
            set(&mut cfg.tank.shape, p.shape, "tank.shape", c);
            set(&mut cfg.tank.dim1, p.dim1, "tank.dim1", c);
            set(&mut cfg.tank.dim2, p.dim2, "tank.dim2", c);
            set(&mut cfg.tank.dim3, p.dim3, "tank.dim3", c);
            set(&mut cfg.tank.tank_timeout_ms, p.tank_timeout_ms, "tank.tank_timeout_ms", c);
        }
        if let Some(p) = &self.flow {
            set(&mut cfg.flow.pulses_per_liter, p.pulses_per_liter, "flow.pulses_per_liter", c);
            set(&mut cfg.flow.min_flow_rate, p.min_flow_rate, "flow.min_flow_rate", c);
            set(&mut cfg.flow.max_flow_rate, p.max_flow_rate, "flow.max_flow_rate", c);
            set(
                &mut cfg.flow.calibration_timeout_s,
                p.calibration_timeout_s,
                "flow.calibration_timeout_s",
                c,
            );
            set(
                &mut cfg.flow.calibration_max_volume_l,
                p.calibration_max_volume_l,
                "flow.calibration_max_volume_l",
                c,
            );
        }
        if let Some(p) = &self.pressure {
            set(&mut cfg.pressure.report_mode, p.report_mode, "pressure.report_mode", c);
            set(
                &mut cfg.pressure.atmosphere_offset,
                p.atmosphere_offset,
                "pressure.atmosphere_offset",
                c,
            );
        }

        changed
    }
}
