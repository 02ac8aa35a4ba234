//! Command-line escaping and splitting.
//!
//! A command travels between client and daemon as a single line of
//! printable ASCII. [`encode_payload`] turns an argument vector into that
//! line and [`split`] turns it back:
//!
//! ```text
//!   ["ls", "my file.txt", "a\tb"]  ──encode──▶  ls "my file.txt" a\tb
//!                                  ◀──split───
//! ```
//!
//! Arguments are raw bytes. Anything outside printable ASCII is written as
//! a backslash escape, so any argument vector without NUL bytes survives
//! the round trip unchanged.

mod escape;
mod split;

pub use escape::{EncodeError, encode_bounded, encode_payload, escape_arg, escape_args, escape_into};
pub use split::{ArgVector, SplitError, SplitLimits, split};

/// Largest transport payload in bytes, including its NUL terminator.
pub const PAYLOAD_CAPACITY: usize = 4096;

/// Control characters with a single-letter escape, paired index-wise with
/// [`CONTROL_NAMES`].
const CONTROL_BYTES: &[u8; 7] = b"\x07\x08\x0c\n\r\t\x0b";
const CONTROL_NAMES: &[u8; 7] = b"abfnrtv";
