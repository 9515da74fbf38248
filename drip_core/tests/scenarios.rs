mod common;

use common::{Rig, approx, base_config};
use drip_config::{ConfigPatch, FlowPatch};
use drip_core::{
    CalibrationStage, Command, DrainRequest, DripError, Outbound, ProcessKind, TickStatus,
    geometry::pressure_to_volume,
};
use drip_hardware::ScriptedPressure;
use drip_traits::{ManualClock, Valve};

#[test]
fn tank_starves_then_source_finishes_the_dispense() {
    let mut cfg = base_config();
    cfg.tank.tank_timeout_ms = 2_000;
    cfg.flow.pulses_per_liter = 600.0;
    cfg.flow.max_flow_rate = 200.0;
    cfg.source.static_flow_rate = 60.0;
    cfg.services.report_resolution_l = 1.0;
    let mut rig = Rig::new(cfg);

    rig.ctl
        .handle(Command::DispenseActivate {
            target_volume_l: 10.0,
        })
        .unwrap();
    assert!(rig.valves.is_open(Valve::TankSupply));
    assert!(!rig.valves.is_open(Valve::SourceSupply));

    // 5 L from the tank over three seconds.
    for _ in 0..3 {
        rig.pulses.add(1_000);
        assert_eq!(rig.step(1_000), TickStatus::Running(ProcessKind::Dispense));
    }
    assert!(approx(rig.ctl.state().acc.total_output_volume, 5.0, 1e-3));
    assert!(!rig.ctl.state().flags.reservoir_switched);

    // No pulses past the timeout: fail over.
    rig.step(1_000);
    assert!(rig.ctl.state().flags.reservoir_switched);
    assert!(rig.valves.is_open(Valve::SourceSupply));
    assert!(!rig.valves.is_open(Valve::TankSupply));

    assert_eq!(
        rig.run_until_finished(1_000, 20),
        TickStatus::Finished(ProcessKind::Dispense)
    );
    assert!(rig.valves.open_valves().is_empty());

    let summaries = rig.summaries();
    assert_eq!(summaries.len(), 1);
    let s = summaries[0];
    assert!(s.volume_l >= 10.0);
    assert!(approx(s.tank_volume_l.unwrap(), 5.0, 1e-3));
    assert_eq!(s.tank_switch_time_s, Some(4.0));

    let source_opens = rig
        .valves
        .history()
        .iter()
        .filter(|e| e.valve == Valve::SourceSupply && e.open)
        .count();
    assert_eq!(source_opens, 1);
}

#[test]
fn drain_stops_at_target_pressure() {
    let pressure = ScriptedPressure::new([520.0, 500.0, 420.0, 300.0, 190.0]);
    let mut rig = Rig::with_pressure(base_config(), ManualClock::new(), pressure);

    rig.ctl
        .handle(Command::DrainActivate(DrainRequest {
            pressure: Some(200.0),
            ..DrainRequest::default()
        }))
        .unwrap();
    assert!(rig.valves.is_open(Valve::TankDrain));
    assert_eq!(rig.ctl.state().report.drain_start_pressure, Some(520.0));

    for _ in 0..3 {
        assert_eq!(rig.step(500), TickStatus::Running(ProcessKind::Drain));
    }
    assert_eq!(rig.step(500), TickStatus::Finished(ProcessKind::Drain));
    assert!(!rig.valves.is_open(Valve::TankDrain));
    assert_eq!(rig.pressure.reads(), 5);

    let drains = rig.out.on_topic("drain/summary");
    let [Outbound::DrainSummary(s)] = drains.as_slice() else {
        panic!("expected one drain summary, got {drains:?}");
    };
    assert_eq!(s.start_pressure, Some(520.0));
    assert_eq!(s.end_pressure, Some(190.0));
    assert_eq!(s.duration_s, 2.0);
    let tank = rig.ctl.config().tank;
    assert_eq!(s.start_volume_l, Some(pressure_to_volume(520.0, &tank)));
    assert_eq!(s.end_volume_l, Some(pressure_to_volume(190.0, &tank)));
}

#[test]
fn calibration_derives_pulses_per_liter() {
    let mut rig = Rig::new(base_config());

    rig.ctl.handle(Command::FlowCalibrateBegin { id: 7 }).unwrap();
    rig.ctl
        .handle(Command::FlowCalibrateDispense {
            id: 7,
            target_volume_l: 0.5,
        })
        .unwrap();
    assert!(rig.valves.is_open(Valve::TankSupply));

    rig.pulses.add(633);
    rig.step(1_000);
    assert_eq!(
        rig.ctl.state().report.calibration_stage,
        Some(CalibrationStage::AwaitingMeasurement)
    );
    assert!(!rig.valves.is_open(Valve::TankSupply));

    rig.ctl
        .handle(Command::FlowCalibrateMeasure {
            id: 7,
            measured_volume_l: 0.5,
        })
        .unwrap();
    rig.ctl
        .handle(Command::FlowCalibrateEnd { id: 7, save: true })
        .unwrap();

    assert!(approx(rig.ctl.config().flow.pulses_per_liter, 1266.0, 1e-2));
    assert_eq!(rig.store.saves(), 1);
    assert!(approx(rig.store.current().flow.pulses_per_liter, 1266.0, 1e-2));
    assert_eq!(rig.out.on_topic("config").len(), 1);
    assert_eq!(rig.ctl.active_process(), None);
}

#[test]
fn calibration_rejects_foreign_ids_and_wrong_stage() {
    let mut rig = Rig::new(base_config());
    rig.ctl.handle(Command::FlowCalibrateBegin { id: 7 }).unwrap();

    let err = rig
        .ctl
        .handle(Command::FlowCalibrateDispense {
            id: 8,
            target_volume_l: 0.5,
        })
        .unwrap_err();
    assert!(matches!(err, DripError::Validation(_)));

    let err = rig
        .ctl
        .handle(Command::FlowCalibrateMeasure {
            id: 7,
            measured_volume_l: 0.5,
        })
        .unwrap_err();
    assert!(matches!(err, DripError::Conflict(_)));

    let err = rig
        .ctl
        .handle(Command::FlowCalibrateDispense {
            id: 7,
            target_volume_l: 50.0,
        })
        .unwrap_err();
    assert!(matches!(err, DripError::Validation(_)));
    assert_eq!(
        rig.ctl.state().report.calibration_stage,
        Some(CalibrationStage::AwaitingDispenseRequest)
    );
}

#[test]
fn single_field_config_change_writes_once() {
    let mut rig = Rig::new(base_config());
    let before = rig.ctl.config().clone();

    rig.ctl
        .handle(Command::ConfigChange(ConfigPatch {
            flow: Some(FlowPatch {
                max_flow_rate: Some(25.0),
                ..FlowPatch::default()
            }),
            ..ConfigPatch::default()
        }))
        .unwrap();

    assert_eq!(rig.store.saves(), 1);
    let mut expected = before;
    expected.flow.max_flow_rate = 25.0;
    assert_eq!(rig.ctl.config(), &expected);
    assert_eq!(rig.store.current(), expected);
    assert_eq!(rig.out.on_topic("config").len(), 1);
}
