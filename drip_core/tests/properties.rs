mod common;

use common::{Rig, base_config};
use drip_config::TankCfg;
use drip_core::Command;
use drip_core::geometry::{UNSUPPORTED, pressure_to_height, pressure_to_volume};
use proptest::prelude::*;

fn tank(shape: u8, dim1: f32, dim2: f32) -> TankCfg {
    TankCfg {
        shape,
        dim1,
        dim2,
        ..TankCfg::default()
    }
}

proptest! {
    #[test]
    fn rectangular_volume_is_footprint_times_height(
        p in 0.0f32..20_000.0,
        l in 0.01f32..5.0,
        w in 0.01f32..5.0,
    ) {
        let v = pressure_to_volume(p, &tank(1, l, w));
        let want = l * w * pressure_to_height(p);
        prop_assert!((v - want).abs() <= want.abs() * 1e-5 + 1e-9);
        // Pure: same inputs, same answer.
        prop_assert_eq!(v, pressure_to_volume(p, &tank(1, l, w)));
    }

    #[test]
    fn cylinder_volume_is_disc_times_height(p in 0.0f32..20_000.0, d in 0.01f32..5.0) {
        let v = pressure_to_volume(p, &tank(2, d, 1.0));
        let want = std::f32::consts::PI * (d / 2.0) * (d / 2.0) * pressure_to_height(p);
        prop_assert!((v - want).abs() <= want.abs() * 1e-5 + 1e-9);
    }

    #[test]
    fn unknown_shapes_are_unsupported(
        shape in 3u8..=255,
        p in -1_000.0f32..20_000.0,
        d in 0.0f32..5.0,
    ) {
        prop_assert_eq!(pressure_to_volume(p, &tank(shape, d, d)), UNSUPPORTED);
        prop_assert_eq!(pressure_to_volume(p, &tank(0, d, d)), UNSUPPORTED);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn calibration_stores_mean_of_samples(
        samples in prop::collection::vec((100u32..5_000, 0.1f32..5.0), 1..5),
    ) {
        let mut rig = Rig::new(base_config());
        let timeout = rig.ctl.config().tank.tank_timeout_ms;
        rig.ctl.handle(Command::FlowCalibrateBegin { id: 11 }).unwrap();

        for &(pulses, measured) in &samples {
            rig.ctl
                .handle(Command::FlowCalibrateDispense { id: 11, target_volume_l: 5.0 })
                .unwrap();
            rig.pulses.add(pulses);
            rig.step(1_000);
            // Flow stops; the dispense sub-phase ends once the stall outlasts the timeout.
            rig.step(timeout + 1);
            rig.ctl
                .handle(Command::FlowCalibrateMeasure { id: 11, measured_volume_l: measured })
                .unwrap();
        }
        rig.ctl.handle(Command::FlowCalibrateEnd { id: 11, save: true }).unwrap();

        let want = samples
            .iter()
            .map(|&(p, v)| p as f32 / v)
            .sum::<f32>()
            / samples.len() as f32;
        let got = rig.ctl.config().flow.pulses_per_liter;
        prop_assert!((got - want).abs() <= want * 1e-4, "got {got}, want {want}");
        prop_assert_eq!(rig.store.saves(), 1);
        let acc = rig.ctl.state().acc;
        prop_assert_eq!((acc.sum_pulses_per_liter, acc.count_calibration), (0.0, 0));
    }
}

#[test]
fn calibration_without_samples_changes_nothing() {
    let mut rig = Rig::new(base_config());
    let before = rig.ctl.config().flow.pulses_per_liter;
    rig.ctl.handle(Command::FlowCalibrateBegin { id: 4 }).unwrap();
    rig.ctl
        .handle(Command::FlowCalibrateEnd { id: 4, save: true })
        .unwrap();
    assert_eq!(rig.ctl.config().flow.pulses_per_liter, before);
    assert_eq!(rig.store.saves(), 0);
}

#[test]
fn idle_calibration_times_out_and_saves() {
    let mut cfg = base_config();
    cfg.flow.calibration_timeout_s = 2;
    let mut rig = Rig::new(cfg);
    rig.ctl.handle(Command::FlowCalibrateBegin { id: 5 }).unwrap();
    rig.ctl
        .handle(Command::FlowCalibrateDispense {
            id: 5,
            target_volume_l: 0.5,
        })
        .unwrap();
    rig.pulses.add(700);
    rig.step(1_000);
    rig.ctl
        .handle(Command::FlowCalibrateMeasure {
            id: 5,
            measured_volume_l: 0.5,
        })
        .unwrap();

    assert!(rig.step(2_000).is_running());
    assert!(!rig.step(1).is_running());
    assert_eq!(rig.ctl.config().flow.pulses_per_liter, 1400.0);
    assert_eq!(rig.store.saves(), 1);
}
