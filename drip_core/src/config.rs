//! Runtime capability flags.
//!
//! Derived once from the `[topology]` section at build time and never
//! changed afterwards; every process consults these instead of the raw config.

use drip_traits::Valve;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub tank: bool,
    pub source: bool,
    /// The source line carries its own flow sensor.
    pub source_sensor: bool,
    pub drain_valve: bool,
    pub pressure_sensor: bool,
}

impl Capabilities {
    /// A flow sensor exists somewhere: on the tank line or on the source line.
    pub const fn has_flow_sensor(&self) -> bool {
        self.tank || (self.source && self.source_sensor)
    }

    /// Supply valve a dispense session opens first. The tank is primary.
    pub const fn primary_supply(&self) -> Option<Valve> {
        if self.tank {
            Some(Valve::TankSupply)
        } else if self.source {
            Some(Valve::SourceSupply)
        } else {
            None
        }
    }

    /// Supply valve a calibration dispense runs through.
    pub const fn calibration_supply(&self) -> Option<Valve> {
        if self.source && self.source_sensor {
            Some(Valve::SourceSupply)
        } else if self.tank {
            Some(Valve::TankSupply)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calibration_prefers_a_sensed_source() {
        let caps = Capabilities {
            tank: true,
            source: true,
            source_sensor: true,
            ..Capabilities::default()
        };
        assert_eq!(caps.calibration_supply(), Some(Valve::SourceSupply));
        assert_eq!(caps.primary_supply(), Some(Valve::TankSupply));
    }

    #[test]
    fn static_source_alone_has_no_flow_sensor() {
        let caps = Capabilities {
            source: true,
            ..Capabilities::default()
        };
        assert!(!caps.has_flow_sensor());
        assert_eq!(caps.calibration_supply(), None);
    }
}
