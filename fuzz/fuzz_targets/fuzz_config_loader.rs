#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse errors and validation errors are fine; panics are not.
    let Ok(cfg) = drip_config::load_toml(data) else {
        return;
    };
    if cfg.validate().is_err() {
        return;
    }
    // A valid document survives the write-back path and stays valid.
    let text = drip_config::to_toml_string(&cfg).expect("serialize valid config");
    let again = drip_config::load_toml(&text).expect("reparse written config");
    assert!(again.validate().is_ok());
    assert_eq!(again.topology, cfg.topology);
});
