//! Fuzz target for the escape/split round trip.
//!
//! Run with: cargo +nightly fuzz run fuzz_escape_roundtrip
//!
//! Cuts the input at NUL bytes into an argument vector, encodes it, and
//! checks that splitting the encoded line gives the same vector back.

#![no_main]

use handoff_core::cmdline::{SplitLimits, escape_args, split};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let argv: Vec<&[u8]> = if data.is_empty() {
        Vec::new()
    } else {
        data.split(|&b| b == 0).collect()
    };

    let line = escape_args(&argv);
    assert!(line.bytes().all(|b| (0x20..0x7f).contains(&b)));

    let decoded = split(line.as_bytes(), SplitLimits::new(argv.len().max(1), line.len() + 1))
        .expect("encoded line must split");
    assert_eq!(decoded.to_vecs(), argv.iter().map(|a| a.to_vec()).collect::<Vec<_>>());
});
