#![no_main]
use drip_config::ConfigPatch;
use drip_core::Command;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Inbound lines come off the network; decoding must never panic.
    if let Ok(Command::ConfigChange(patch)) = Command::from_json(data) {
        let mut cfg = drip_config::Config::default();
        let changed = patch.apply_to(&mut cfg);
        if patch == ConfigPatch::default() {
            assert!(changed.is_empty());
        }
        let _ = cfg.validate();
    }
});
