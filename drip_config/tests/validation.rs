use drip_config::load_toml;
use rstest::rstest;

const VALID: &str = r#"
[topology]
tank = true
source = true
source_flow_sensor = false
drain_valve = true
pressure_sensor = true

[services]
report_resolution_l = 0.5

[source]
static_flow_rate = 10.0

[tank]
shape = 1
dim1 = 1.0
dim2 = 0.5
dim3 = 1.2
tank_timeout_ms = 4000

[flow]
pulses_per_liter = 1265.0
min_flow_rate = 0.2
max_flow_rate = 30.0
calibration_timeout_s = 120
calibration_max_volume_l = 2.0

[pressure]
report_mode = 3
atmosphere_offset = 1013.25
"#;

#[test]
fn accepts_full_document() {
    let cfg = load_toml(VALID).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.tank.tank_timeout_ms, 4000);
    assert_eq!(cfg.services.report_resolution_l, 0.5);
}

#[test]
fn partial_document_fills_defaults() {
    let cfg = load_toml("[flow]\npulses_per_liter = 450.0\n").expect("parse TOML");
    cfg.validate().expect("defaults are valid");
    assert_eq!(cfg.flow.pulses_per_liter, 450.0);
    assert_eq!(cfg.flow.max_flow_rate, 30.0);
    assert!(cfg.topology.tank);
}

#[rstest]
#[case(
    "[topology]\ntank = false\nsource = false\ndrain_valve = false\npressure_sensor = false\n",
    "must include a tank"
)]
#[case(
    "[topology]\ntank = false\ndrain_valve = true\npressure_sensor = false\n",
    "drain_valve requires"
)]
#[case("[topology]\nsource = false\nsource_flow_sensor = true\n", "source_flow_sensor requires")]
#[case("[services]\nreport_resolution_l = 0.0\n", "report_resolution_l must be > 0")]
#[case("[flow]\npulses_per_liter = 0.0\n", "pulses_per_liter must be > 0")]
#[case("[flow]\nmin_flow_rate = 5.0\nmax_flow_rate = 4.0\n", "max_flow_rate must be greater")]
#[case("[flow]\ncalibration_timeout_s = 0\n", "calibration_timeout_s must be >= 1")]
#[case("[tank]\ndim1 = -1.0\n", "tank.dim1 must be")]
#[case("[tank]\ntank_timeout_ms = 0\n", "tank_timeout_ms must be >= 1")]
#[case("[broker]\nport = 0\n", "broker.port must be > 0")]
fn rejects_invalid_values(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    assert!(
        format!("{err}").contains(needle),
        "expected '{needle}' in '{err}'"
    );
}

#[test]
fn static_rate_only_required_without_source_sensor() {
    let with_sensor = load_toml(
        "[topology]\nsource_flow_sensor = true\n[source]\nstatic_flow_rate = 0.0\n",
    )
    .unwrap();
    with_sensor.validate().expect("static rate unused with a source sensor");

    let without = load_toml("[source]\nstatic_flow_rate = 0.0\n").unwrap();
    assert!(without.validate().is_err());
}
