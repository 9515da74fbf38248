pub mod clock;
pub mod pulse;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use pulse::PulseCounter;

/// The three supply/drain valves the controller can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Valve {
    /// Pressurized main supply.
    SourceSupply,
    /// Gravity tank supply.
    TankSupply,
    /// Tank drain outlet.
    TankDrain,
}

impl Valve {
    pub const ALL: [Valve; 3] = [Valve::SourceSupply, Valve::TankSupply, Valve::TankDrain];

    pub const fn as_str(self) -> &'static str {
        match self {
            Valve::SourceSupply => "source_supply",
            Valve::TankSupply => "tank_supply",
            Valve::TankDrain => "tank_drain",
        }
    }
}

impl std::fmt::Display for Valve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Valve actuation. Both calls are idempotent.
pub trait Valves {
    fn open(&mut self, valve: Valve) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn close(&mut self, valve: Valve) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Tank pressure transducer.
///
/// `Ok(None)` means the sensor produced no usable sample this time.
pub trait PressureSensor {
    fn read(&mut self) -> Result<Option<f32>, Box<dyn std::error::Error + Send + Sync>>;
}
