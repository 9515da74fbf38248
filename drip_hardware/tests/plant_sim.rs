use drip_hardware::{
    HwError, PlantParams, PressureSample, ScriptedPressure, SimulatedPlant, SimulatedValves,
};
use drip_traits::{PressureSensor, PulseCounter, Valve, Valves};
use rstest::rstest;

fn plant(params: PlantParams) -> (SimulatedPlant, SimulatedValves, PulseCounter) {
    let valves = SimulatedValves::new();
    let pulses = PulseCounter::new();
    let plant = SimulatedPlant::new(params, valves.clone(), pulses.clone());
    (plant, valves, pulses)
}

#[rstest]
fn closed_valves_produce_no_pulses() {
    let (plant, _valves, pulses) = plant(PlantParams::default());
    plant.step(60_000);
    assert_eq!(pulses.snapshot(), 0);
    assert_eq!(plant.level_l(), 150.0);
}

#[rstest]
fn source_flow_emits_pulses_per_liter() {
    let params = PlantParams {
        source_flow_lpm: 10.0,
        pulses_per_liter: 100.0,
        ..PlantParams::default()
    };
    let (plant, mut valves, pulses) = plant(params);
    valves.open(Valve::SourceSupply).unwrap();
    // 10 L/min for 6 s is one liter.
    plant.step(6_000);
    assert_eq!(pulses.snapshot(), 100);
}

#[rstest]
fn tank_runs_dry_and_stops_flowing() {
    let params = PlantParams {
        tank_level_l: 1.0,
        tank_flow_lpm: 60.0,
        pulses_per_liter: 10.0,
        ..PlantParams::default()
    };
    let (plant, mut valves, pulses) = plant(params);
    let mut sensor = plant.pressure_sensor();
    let full = sensor.read().unwrap().unwrap();

    valves.open(Valve::TankSupply).unwrap();
    plant.step(2_000);
    assert_eq!(plant.level_l(), 0.0);
    assert_eq!(pulses.snapshot(), 10);

    plant.step(2_000);
    assert_eq!(pulses.snapshot(), 10);
    let empty = sensor.read().unwrap().unwrap();
    assert!(empty < full);
    assert_eq!(empty, params.atmosphere_hpa);
}

#[rstest]
fn drain_lowers_pressure_without_pulses() {
    let (plant, mut valves, pulses) = plant(PlantParams::default());
    let mut sensor = plant.pressure_sensor();
    let before = sensor.read().unwrap().unwrap();
    valves.open(Valve::TankDrain).unwrap();
    plant.step(3_000);
    assert!(sensor.read().unwrap().unwrap() < before);
    assert_eq!(pulses.snapshot(), 0);
}

#[rstest]
fn failing_valve_reports_hw_error() {
    let mut valves = SimulatedValves::new();
    valves.fail_on(Some(Valve::TankDrain));
    let err = valves.open(Valve::TankDrain).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<HwError>(),
        Some(HwError::Valve("tank_drain"))
    ));
    assert!(!valves.is_open(Valve::TankDrain));
    valves.fail_on(None);
    valves.open(Valve::TankDrain).unwrap();
    assert!(valves.is_open(Valve::TankDrain));
}

#[rstest]
#[case(PressureSample::Missing, None)]
#[case(PressureSample::Value(812.5), Some(812.5))]
fn scripted_samples_replay_in_order(#[case] sample: PressureSample, #[case] want: Option<f32>) {
    let mut sensor = ScriptedPressure::default();
    sensor.push(sample);
    assert_eq!(sensor.read().unwrap(), want);
}

#[rstest]
fn scripted_fault_is_an_error() {
    let mut sensor = ScriptedPressure::new([300.0]);
    sensor.push(PressureSample::Fault);
    assert_eq!(sensor.read().unwrap(), Some(300.0));
    let err = sensor.read().unwrap_err();
    assert!(err.to_string().contains("scripted fault"));
    assert_eq!(sensor.read().unwrap(), Some(300.0));
}
