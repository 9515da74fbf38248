//! `From` implementations bridging `drip_config` types to `drip_core` types.

use crate::config::Capabilities;

impl From<&drip_config::Topology> for Capabilities {
    fn from(t: &drip_config::Topology) -> Self {
        Self {
            tank: t.tank,
            source: t.source,
            source_sensor: t.source && t.source_flow_sensor,
            drain_valve: t.tank && t.drain_valve,
            pressure_sensor: t.tank && t.pressure_sensor,
        }
    }
}

impl From<&drip_config::Config> for Capabilities {
    fn from(c: &drip_config::Config) -> Self {
        Self::from(&c.topology)
    }
}
