//! Fuzz target for the TOML configuration parser.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_parser
//!
//! Feeds arbitrary text to `AppConfig::parse()`, covering both TOML
//! decoding and the validation pass.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Only panics matter here
        if let Ok(config) = handoff_config::AppConfig::parse(s) {
            assert!(config.validate().is_ok());
        }
    }
});
