//! Raspberry Pi GPIO backend: relay-driven valves and the flow sensor pulse input.

use rppal::gpio::{Gpio, InputPin, Level, OutputPin, Trigger};

use drip_traits::{PulseCounter, Valve, Valves};

use crate::error::{HwError, Result};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn gpio_err(e: rppal::gpio::Error) -> HwError {
    HwError::Gpio(e.to_string())
}

/// BCM pin numbers of the three valve relays.
#[derive(Debug, Clone, Copy)]
pub struct ValvePins {
    pub source_supply: u8,
    pub tank_supply: u8,
    pub tank_drain: u8,
}

pub struct GpioValves {
    source_supply: OutputPin,
    tank_supply: OutputPin,
    tank_drain: OutputPin,
    /// Relay boards that energize on a low level.
    active_low: bool,
}

impl GpioValves {
    /// Claims the relay pins and drives every valve closed.
    pub fn new(pins: ValvePins, active_low: bool) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        let claim = |pin: u8| -> Result<OutputPin> {
            Ok(gpio.get(pin).map_err(gpio_err)?.into_output())
        };
        let mut valves = Self {
            source_supply: claim(pins.source_supply)?,
            tank_supply: claim(pins.tank_supply)?,
            tank_drain: claim(pins.tank_drain)?,
            active_low,
        };
        for v in Valve::ALL {
            valves.drive(v, false);
        }
        Ok(valves)
    }

    fn drive(&mut self, valve: Valve, open: bool) {
        let level = if open != self.active_low {
            Level::High
        } else {
            Level::Low
        };
        let pin = match valve {
            Valve::SourceSupply => &mut self.source_supply,
            Valve::TankSupply => &mut self.tank_supply,
            Valve::TankDrain => &mut self.tank_drain,
        };
        pin.write(level);
        tracing::debug!(%valve, open, "valve relay");
    }
}

impl Valves for GpioValves {
    fn open(&mut self, valve: Valve) -> std::result::Result<(), BoxError> {
        self.drive(valve, true);
        Ok(())
    }

    fn close(&mut self, valve: Valve) -> std::result::Result<(), BoxError> {
        self.drive(valve, false);
        Ok(())
    }
}

/// Flow sensor input. Each falling edge bumps the shared counter from the
/// interrupt thread; dropping this value detaches the interrupt.
pub struct PulseInput {
    _pin: InputPin,
}

impl PulseInput {
    pub fn attach(pin: u8, counter: PulseCounter) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        let mut input = gpio.get(pin).map_err(gpio_err)?.into_input_pullup();
        input
            .set_async_interrupt(Trigger::FallingEdge, move |_level: Level| {
                counter.increment();
            })
            .map_err(gpio_err)?;
        tracing::info!(pin, "flow sensor interrupt attached");
        Ok(Self { _pin: input })
    }
}
