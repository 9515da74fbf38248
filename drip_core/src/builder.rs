//! Type-state builder for `Controller`.
//!
//! Valves, publisher and config store must be supplied before `build()` is
//! available. `try_build()` exists in every state for dynamic wiring.

use std::marker::PhantomData;
use std::sync::Arc;

use drip_config::{Config, ConfigStore};
use drip_traits::{Clock, MonotonicClock, PressureSensor, PulseCounter, Valves};

use crate::controller::Controller;
use crate::error::{BuildError, DripError, Result};
use crate::geometry::{shape_supported, tank_capacity};
use crate::ports::Publisher;
use crate::state::DeviceState;

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

pub struct ControllerBuilder<V, P, S> {
    valves: Option<Box<dyn Valves>>,
    publisher: Option<Box<dyn Publisher>>,
    store: Option<Box<dyn ConfigStore>>,
    pressure: Option<Box<dyn PressureSensor>>,
    pulses: Option<PulseCounter>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    config: Option<Config>,
    _v: PhantomData<V>,
    _p: PhantomData<P>,
    _s: PhantomData<S>,
}

impl Default for ControllerBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            valves: None,
            publisher: None,
            store: None,
            pressure: None,
            pulses: None,
            clock: None,
            config: None,
            _v: PhantomData,
            _p: PhantomData,
            _s: PhantomData,
        }
    }
}

impl Controller {
    pub fn builder() -> ControllerBuilder<Missing, Missing, Missing> {
        ControllerBuilder::default()
    }
}

impl<V, P, S> ControllerBuilder<V, P, S> {
    fn retype<V2, P2, S2>(self) -> ControllerBuilder<V2, P2, S2> {
        ControllerBuilder {
            valves: self.valves,
            publisher: self.publisher,
            store: self.store,
            pressure: self.pressure,
            pulses: self.pulses,
            clock: self.clock,
            config: self.config,
            _v: PhantomData,
            _p: PhantomData,
            _s: PhantomData,
        }
    }

    /// Required when the topology declares a pressure sensor.
    pub fn with_pressure_sensor(mut self, sensor: impl PressureSensor + 'static) -> Self {
        self.pressure = Some(Box::new(sensor));
        self
    }

    /// Share the counter the interrupt side increments. Defaults to a fresh one.
    pub fn with_pulse_counter(mut self, pulses: PulseCounter) -> Self {
        self.pulses = Some(pulses);
        self
    }

    /// Defaults to `MonotonicClock` when not provided.
    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Use this document instead of loading one from the store.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Fallible build available in any type-state.
    pub fn try_build(self) -> eyre::Result<Controller> {
        let valves = self
            .valves
            .ok_or_else(|| eyre::Report::new(BuildError::MissingValves))?;
        let publisher = self
            .publisher
            .ok_or_else(|| eyre::Report::new(BuildError::MissingPublisher))?;
        let store = self
            .store
            .ok_or_else(|| eyre::Report::new(BuildError::MissingStore))?;
        assemble(
            valves,
            publisher,
            store,
            self.pressure,
            self.pulses,
            self.clock,
            self.config,
        )
        .map_err(eyre::Report::new)
    }
}

impl<P, S> ControllerBuilder<Missing, P, S> {
    pub fn with_valves(mut self, valves: impl Valves + 'static) -> ControllerBuilder<Set, P, S> {
        self.valves = Some(Box::new(valves));
        self.retype()
    }
}

impl<V, S> ControllerBuilder<V, Missing, S> {
    pub fn with_publisher(
        mut self,
        publisher: impl Publisher + 'static,
    ) -> ControllerBuilder<V, Set, S> {
        self.publisher = Some(Box::new(publisher));
        self.retype()
    }
}

impl<V, P> ControllerBuilder<V, P, Missing> {
    pub fn with_store(mut self, store: impl ConfigStore + 'static) -> ControllerBuilder<V, P, Set> {
        self.store = Some(Box::new(store));
        self.retype()
    }
}

impl ControllerBuilder<Set, Set, Set> {
    /// A store that cannot load is `Fatal`; an invalid document or a topology
    /// the supplied hardware cannot serve is a `Configuration` error.
    pub fn build(self) -> Result<Controller> {
        let (Some(valves), Some(publisher), Some(store)) = (self.valves, self.publisher, self.store)
        else {
            return Err(DripError::Fatal("builder lost a required part".into()));
        };
        assemble(
            valves,
            publisher,
            store,
            self.pressure,
            self.pulses,
            self.clock,
            self.config,
        )
    }
}

fn assemble(
    valves: Box<dyn Valves>,
    publisher: Box<dyn Publisher>,
    mut store: Box<dyn ConfigStore>,
    pressure: Option<Box<dyn PressureSensor>>,
    pulses: Option<PulseCounter>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    config: Option<Config>,
) -> Result<Controller> {
    let config = match config {
        Some(c) => c,
        None => store
            .load()
            .map_err(|e| DripError::Fatal(format!("load config: {e}")))?,
    };
    config
        .validate()
        .map_err(|e| DripError::Configuration(e.to_string()))?;
    if config.topology.tank {
        let shape = config.tank.shape;
        if !shape_supported(shape) {
            tracing::warn!(shape, "tank shape has no volume conversion, volumes will be omitted");
        } else if tank_capacity(&config.tank) <= 0.0 {
            tracing::warn!(shape, "tank capacity is zero, check the tank dimensions");
        }
    }

    let declared = config.topology.tank && config.topology.pressure_sensor;
    let pressure = match (declared, pressure) {
        (true, None) => {
            return Err(DripError::Configuration(
                "topology declares a pressure sensor but none was supplied".into(),
            ));
        }
        (false, Some(_)) => {
            tracing::warn!("pressure sensor supplied but not declared in topology, ignoring it");
            None
        }
        (_, p) => p,
    };

    let clock: Arc<dyn Clock + Send + Sync> =
        clock.unwrap_or_else(|| Arc::new(MonotonicClock::new()));
    let now = clock.millis();
    let mut controller = Controller {
        state: DeviceState::new(config, now),
        valves,
        pressure,
        pulses: pulses.unwrap_or_default(),
        publisher,
        store,
        clock,
    };
    controller.close_all_valves();
    controller.state.flags.broker_connected = controller.publisher.is_connected();
    tracing::info!(caps = ?controller.state.caps, "controller ready");
    Ok(controller)
}
