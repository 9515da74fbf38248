#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema, partial updates and persistence for the irrigation controller.
//!
//! - `Config` and its sections are (de)serialized as TOML and validated.
//! - `ConfigPatch` is the per-field update table used by config-change commands.
//! - `ConfigStore` loads and writes back the whole document.
use serde::{Deserialize, Serialize};

pub mod patch;
pub mod store;

pub use patch::{ConfigPatch, FlowPatch, PressurePatch, ServicesPatch, SourcePatch, TankPatch};
pub use store::{ConfigStore, MemoryStore, TomlFileStore, write_atomic};

/// Physical topology of the device. Read once at boot; never patched at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Topology {
    /// An exhaustible gravity tank is plumbed in.
    pub tank: bool,
    /// A pressurized source is plumbed in.
    pub source: bool,
    /// The source line has its own flow sensor (otherwise static metering).
    pub source_flow_sensor: bool,
    /// The tank has a drain valve.
    pub drain_valve: bool,
    /// The tank has a pressure transducer.
    pub pressure_sensor: bool,
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            tank: true,
            source: true,
            source_flow_sensor: false,
            drain_valve: true,
            pressure_sensor: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesCfg {
    /// Volume between two dispense slice reports (liters).
    pub report_resolution_l: f32,
}

impl Default for ServicesCfg {
    fn default() -> Self {
        Self {
            report_resolution_l: 0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceCfg {
    /// Assumed source flow when the source has no sensor (liters/min).
    pub static_flow_rate: f32,
}

impl Default for SourceCfg {
    fn default() -> Self {
        Self {
            static_flow_rate: 12.45,
        }
    }
}

/// Tank shape codes understood by the geometry conversion.
pub const SHAPE_RECTANGULAR: u8 = 1;
pub const SHAPE_CYLINDER: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TankCfg {
    /// Shape code: 1 rectangular prism (length, width, height),
    /// 2 cylinder (diameter, height). Other codes disable volume derivation.
    pub shape: u8,
    pub dim1: f32,
    pub dim2: f32,
    pub dim3: f32,
    /// Sub-threshold flow tolerated before the tank is declared starved (ms).
    pub tank_timeout_ms: u32,
}

impl Default for TankCfg {
    fn default() -> Self {
        Self {
            shape: SHAPE_CYLINDER,
            dim1: 0.4,
            dim2: 1.2,
            dim3: 0.0,
            tank_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowSensorCfg {
    pub pulses_per_liter: f32,
    /// Below this rate (liters/min) the tank counts as starved.
    pub min_flow_rate: f32,
    /// Above this rate (liters/min) the sensor is overloaded.
    pub max_flow_rate: f32,
    /// Idle time allowed between calibration actions (seconds).
    pub calibration_timeout_s: u32,
    /// Largest volume a single calibration dispense may request (liters).
    pub calibration_max_volume_l: f32,
}

impl Default for FlowSensorCfg {
    fn default() -> Self {
        Self {
            pulses_per_liter: 1265.289,
            min_flow_rate: 0.2,
            max_flow_rate: 30.0,
            calibration_timeout_s: 300,
            calibration_max_volume_l: 5.0,
        }
    }
}

/// Which tank quantities ride along in slice and pressure reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ReportMode {
    Pressure = 1,
    Volume = 2,
    #[default]
    Both = 3,
}

impl ReportMode {
    pub fn includes_pressure(self) -> bool {
        matches!(self, Self::Pressure | Self::Both)
    }

    pub fn includes_volume(self) -> bool {
        matches!(self, Self::Volume | Self::Both)
    }
}

impl TryFrom<u8> for ReportMode {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(Self::Pressure),
            2 => Ok(Self::Volume),
            3 => Ok(Self::Both),
            other => Err(format!("report_mode must be 1, 2 or 3, got {other}")),
        }
    }
}

impl From<ReportMode> for u8 {
    fn from(m: ReportMode) -> Self {
        m as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureSensorCfg {
    pub report_mode: ReportMode,
    /// Subtracted from raw readings to get gauge pressure (hPa).
    pub atmosphere_offset: f32,
}

impl Default for PressureSensorCfg {
    fn default() -> Self {
        Self {
            report_mode: ReportMode::Both,
            atmosphere_offset: 1013.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerCfg {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// Prefix for every published and subscribed topic.
    pub base_topic: String,
    /// Minimum spacing between idle-time reconnect attempts (ms).
    pub reconnect_interval_ms: u32,
}

impl Default for BrokerCfg {
    fn default() -> Self {
        Self {
            host: "192.168.0.195".to_string(),
            port: 1883,
            client_id: "drip1".to_string(),
            base_topic: "VD1/".to_string(),
            reconnect_interval_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub topology: Topology,
    pub services: ServicesCfg,
    pub source: SourceCfg,
    pub tank: TankCfg,
    pub flow: FlowSensorCfg,
    pub pressure: PressureSensorCfg,
    pub broker: BrokerCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

pub fn to_toml_string(cfg: &Config) -> eyre::Result<String> {
    toml::to_string_pretty(cfg).map_err(|e| eyre::eyre!("serialize config: {e}"))
}

fn positive_finite(v: f32) -> bool {
    v.is_finite() && v > 0.0
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Topology
        let t = &self.topology;
        if !t.tank && !t.source {
            eyre::bail!("topology must include a tank, a source, or both");
        }
        if t.drain_valve && !t.tank {
            eyre::bail!("topology.drain_valve requires topology.tank");
        }
        if t.pressure_sensor && !t.tank {
            eyre::bail!("topology.pressure_sensor requires topology.tank");
        }
        if t.source_flow_sensor && !t.source {
            eyre::bail!("topology.source_flow_sensor requires topology.source");
        }

        // Services
        if !positive_finite(self.services.report_resolution_l) {
            eyre::bail!("services.report_resolution_l must be > 0");
        }

        // Source
        if t.source && !t.source_flow_sensor && !positive_finite(self.source.static_flow_rate) {
            eyre::bail!("source.static_flow_rate must be > 0 when the source has no flow sensor");
        }

        // Tank
        for (name, v) in [
            ("tank.dim1", self.tank.dim1),
            ("tank.dim2", self.tank.dim2),
            ("tank.dim3", self.tank.dim3),
        ] {
            if !v.is_finite() || v < 0.0 {
                eyre::bail!("{name} must be a finite value >= 0");
            }
        }
        if t.tank && self.tank.tank_timeout_ms == 0 {
            eyre::bail!("tank.tank_timeout_ms must be >= 1");
        }

        // Flow sensor
        if !positive_finite(self.flow.pulses_per_liter) {
            eyre::bail!("flow.pulses_per_liter must be > 0");
        }
        if !self.flow.min_flow_rate.is_finite() || self.flow.min_flow_rate < 0.0 {
            eyre::bail!("flow.min_flow_rate must be >= 0");
        }
        let flow = &self.flow;
        if !flow.max_flow_rate.is_finite() || flow.max_flow_rate <= flow.min_flow_rate {
            eyre::bail!("flow.max_flow_rate must be greater than flow.min_flow_rate");
        }
        if self.flow.calibration_timeout_s == 0 {
            eyre::bail!("flow.calibration_timeout_s must be >= 1");
        }
        if !positive_finite(self.flow.calibration_max_volume_l) {
            eyre::bail!("flow.calibration_max_volume_l must be > 0");
        }

        // Pressure sensor
        if !self.pressure.atmosphere_offset.is_finite() {
            eyre::bail!("pressure.atmosphere_offset must be finite");
        }

        // Broker
        if self.broker.port == 0 {
            eyre::bail!("broker.port must be > 0");
        }
        if self.broker.reconnect_interval_ms == 0 {
            eyre::bail!("broker.reconnect_interval_ms must be >= 1");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn empty_document_is_all_defaults() {
        let cfg = load_toml("").unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn report_mode_rejects_unknown_code() {
        let err = load_toml("[pressure]\nreport_mode = 7\n").unwrap_err();
        assert!(err.to_string().contains("report_mode must be 1, 2 or 3"));
    }

    #[test]
    fn round_trips_through_toml_text() {
        let mut cfg = Config::default();
        cfg.tank.shape = SHAPE_RECTANGULAR;
        cfg.pressure.report_mode = ReportMode::Volume;
        let text = to_toml_string(&cfg).unwrap();
        assert_eq!(load_toml(&text).unwrap(), cfg);
    }
}
