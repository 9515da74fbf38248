//! Outbound messages: reports, operator logs and config snapshots.
//!
//! Payloads serialize to flat JSON objects; absent optional quantities are
//! left out rather than sent as null. The relative topic comes from
//! [`Outbound::topic`].

use drip_config::Config;
use serde::Serialize;

/// Periodic progress of a dispense session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DispenseSlice {
    pub elapsed_s: f32,
    pub volume_l: f32,
    /// Sensor average since the previous slice, or the static rate.
    pub flow_lpm: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tank_volume_l: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DispenseSummary {
    pub duration_s: f32,
    pub volume_l: f32,
    /// Volume drawn from the tank; present whenever a tank is installed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tank_volume_l: Option<f32>,
    /// Seconds into the session at which the tank ran dry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tank_switch_time_s: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DrainSummary {
    pub duration_s: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_pressure: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_pressure: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_volume_l: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_volume_l: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PressureReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tank_volume_l: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogMessage {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outbound {
    DispenseSlice(DispenseSlice),
    DispenseSummary(DispenseSummary),
    DrainSummary(DrainSummary),
    PressureReport(PressureReport),
    Log(LogMessage),
    ConfigSnapshot(Box<Config>),
}

impl Outbound {
    pub fn topic(&self) -> &'static str {
        match self {
            Self::DispenseSlice(_) => "dispense/slice",
            Self::DispenseSummary(_) => "dispense/summary",
            Self::DrainSummary(_) => "drain/summary",
            Self::PressureReport(_) => "pressure",
            Self::Log(m) => match m.level {
                LogLevel::Info => "log/info",
                LogLevel::Warning => "log/warning",
                LogLevel::Error => "log/error",
            },
            Self::ConfigSnapshot(_) => "config",
        }
    }

    pub fn payload_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
