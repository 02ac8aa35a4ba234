//! Fuzz target for the command-line splitter.
//!
//! Run with: cargo +nightly fuzz run fuzz_split
//!
//! Splits arbitrary payloads under small and default limits. The splitter
//! must never panic, never yield a NUL byte, and never exceed its limits.

#![no_main]

use handoff_core::cmdline::{SplitLimits, split};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&max_args, input)) = data.split_first() else {
        return;
    };
    // Payloads arrive truncated at the first NUL.
    let end = input.iter().position(|&b| b == 0).unwrap_or(input.len());
    let input = &input[..end];

    let limits = SplitLimits::new(usize::from(max_args).max(1), input.len() + 1);
    if let Ok(args) = split(input, limits) {
        assert!(args.len() <= limits.max_args);
        let used: usize = args.iter().map(|a| a.len() + 1).sum();
        assert!(used <= limits.max_bytes);
        assert!(args.iter().all(|a| !a.contains(&0)));
    }

    let _ = split(input, SplitLimits::default());
});
