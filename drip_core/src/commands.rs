//! Inbound commands and their routing outcome.
//!
//! Commands arrive as JSON objects `{"command": "<name>", "args": {...}}`;
//! `args` is omitted for commands without parameters.

use drip_config::ConfigPatch;
use serde::Deserialize;

use crate::drain::DrainRequest;
use crate::error::DripError;

fn default_save() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", content = "args", rename_all = "snake_case")]
pub enum Command {
    DispenseActivate {
        target_volume_l: f32,
    },
    Deactivate,
    Restart,
    ConfigChange(ConfigPatch),
    SettingsReset {
        #[serde(default)]
        wifi: bool,
        #[serde(default)]
        broker: bool,
    },
    FlowCalibrateBegin {
        id: u32,
    },
    FlowCalibrateDispense {
        id: u32,
        target_volume_l: f32,
    },
    FlowCalibrateMeasure {
        id: u32,
        measured_volume_l: f32,
    },
    FlowCalibrateEnd {
        id: u32,
        #[serde(default = "default_save")]
        save: bool,
    },
    DrainActivate(DrainRequest),
    PressurePoll,
}

impl Command {
    pub fn from_json(line: &str) -> Result<Self, DripError> {
        serde_json::from_str(line).map_err(|e| DripError::Validation(format!("bad command: {e}")))
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::DispenseActivate { .. } => "dispense_activate",
            Self::Deactivate => "deactivate",
            Self::Restart => "restart",
            Self::ConfigChange(_) => "config_change",
            Self::SettingsReset { .. } => "settings_reset",
            Self::FlowCalibrateBegin { .. } => "flow_calibrate_begin",
            Self::FlowCalibrateDispense { .. } => "flow_calibrate_dispense",
            Self::FlowCalibrateMeasure { .. } => "flow_calibrate_measure",
            Self::FlowCalibrateEnd { .. } => "flow_calibrate_end",
            Self::DrainActivate(_) => "drain_activate",
            Self::PressurePoll => "pressure_poll",
        }
    }
}

/// What the environment should do after a command was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Accepted,
    /// Active work has been closed; the device should restart.
    Restart,
    /// Settings were reset; wifi credentials are the environment's to clear.
    Reset { wifi: bool, broker: bool },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(r#"{"command":"deactivate"}"#, Command::Deactivate)]
    #[case(r#"{"command":"pressure_poll"}"#, Command::PressurePoll)]
    #[case(
        r#"{"command":"dispense_activate","args":{"target_volume_l":2.5}}"#,
        Command::DispenseActivate { target_volume_l: 2.5 }
    )]
    #[case(
        r#"{"command":"flow_calibrate_end","args":{"id":7}}"#,
        Command::FlowCalibrateEnd { id: 7, save: true }
    )]
    #[case(
        r#"{"command":"settings_reset","args":{"broker":true}}"#,
        Command::SettingsReset { wifi: false, broker: true }
    )]
    fn parses_command_lines(#[case] line: &str, #[case] want: Command) {
        assert_eq!(Command::from_json(line).unwrap(), want);
    }

    #[test]
    fn config_change_carries_a_patch() {
        let cmd = Command::from_json(
            r#"{"command":"config_change","args":{"flow":{"max_flow_rate":25.0}}}"#,
        )
        .unwrap();
        let Command::ConfigChange(patch) = cmd else {
            panic!("wrong variant: {cmd:?}");
        };
        assert_eq!(patch.flow.and_then(|f| f.max_flow_rate), Some(25.0));
        assert!(patch.tank.is_none());
    }

    #[rstest]
    #[case(r#"{"command":"launch"}"#)]
    #[case(r#"{"command":"dispense_activate","args":{}}"#)]
    #[case(r#"{"command":"config_change","args":{"flow":{"bogus":1}}}"#)]
    #[case("not json")]
    fn rejects_malformed_commands(#[case] line: &str) {
        assert!(matches!(
            Command::from_json(line),
            Err(DripError::Validation(_))
        ));
    }
}
