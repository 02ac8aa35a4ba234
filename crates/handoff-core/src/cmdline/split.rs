use std::ops::Range;

use super::{CONTROL_BYTES, CONTROL_NAMES, PAYLOAD_CAPACITY};

/// Errors from splitting a payload into arguments.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SplitError {
    #[error("too many command arguments (limit {limit})")]
    TooManyArguments { limit: usize },

    #[error("command too long (decoded limit is {capacity} bytes)")]
    BufferExhausted { capacity: usize },
}

/// Bounds applied while splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitLimits {
    /// Maximum number of arguments.
    pub max_args: usize,
    /// Maximum decoded size: argument bytes plus one terminator per argument.
    pub max_bytes: usize,
}

impl SplitLimits {
    pub const fn new(max_args: usize, max_bytes: usize) -> Self {
        Self {
            max_args,
            max_bytes,
        }
    }

    /// Limits whose byte bound can never be hit by `input`, since decoding
    /// never produces more bytes than it reads.
    pub fn for_input(input: &[u8], max_args: usize) -> Self {
        Self::new(max_args, input.len() + 1)
    }
}

impl Default for SplitLimits {
    fn default() -> Self {
        Self::new(1023, PAYLOAD_CAPACITY)
    }
}

/// A decoded argument vector: one contiguous buffer plus the span of each
/// argument within it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgVector {
    buf: Vec<u8>,
    spans: Vec<Range<usize>>,
}

impl ArgVector {
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.spans.get(index).map(|span| &self.buf[span.clone()])
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &[u8]> + '_ {
        self.spans.iter().map(|span| &self.buf[span.clone()])
    }

    /// Copy the arguments out into owned vectors.
    pub fn to_vecs(&self) -> Vec<Vec<u8>> {
        self.iter().map(<[u8]>::to_vec).collect()
    }
}

/// Accumulates decoded bytes and enforces [`SplitLimits`].
struct Builder {
    limits: SplitLimits,
    out: ArgVector,
    open: Option<usize>,
}

impl Builder {
    fn new(limits: SplitLimits, hint: usize) -> Self {
        Self {
            limits,
            out: ArgVector {
                buf: Vec::with_capacity(hint.min(limits.max_bytes)),
                spans: Vec::new(),
            },
            open: None,
        }
    }

    /// Bytes in use, counting a terminator for every argument so far
    /// (including the open one).
    fn used(&self) -> usize {
        self.out.buf.len() + self.out.spans.len() + usize::from(self.open.is_some())
    }

    fn start_arg(&mut self) -> Result<(), SplitError> {
        if self.out.spans.len() >= self.limits.max_args {
            return Err(SplitError::TooManyArguments {
                limit: self.limits.max_args,
            });
        }
        if self.used() + 1 > self.limits.max_bytes {
            return Err(self.exhausted());
        }
        self.open = Some(self.out.buf.len());
        Ok(())
    }

    fn push(&mut self, byte: u8) -> Result<(), SplitError> {
        if self.used() + 1 > self.limits.max_bytes {
            return Err(self.exhausted());
        }
        self.out.buf.push(byte);
        Ok(())
    }

    fn end_arg(&mut self) {
        if let Some(start) = self.open.take() {
            self.out.spans.push(start..self.out.buf.len());
        }
    }

    fn exhausted(&self) -> SplitError {
        SplitError::BufferExhausted {
            capacity: self.limits.max_bytes,
        }
    }

    fn finish(mut self) -> ArgVector {
        self.end_arg();
        self.out
    }
}

/// Whitespace that separates arguments outside quotes.
fn is_separator(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | 0x0b | 0x0c | b'\r')
}

/// Decode the escape following a backslash. `rest` starts just after the
/// backslash; returns the decoded byte and how many bytes of `rest` it used.
fn unescape(rest: &[u8]) -> (u8, usize) {
    let Some(&c) = rest.first() else {
        return (b'\\', 0);
    };

    match c {
        b'x' => {
            let digits = rest[1..]
                .iter()
                .take(2)
                .take_while(|b| b.is_ascii_hexdigit())
                .count();
            let value = rest[1..1 + digits]
                .iter()
                .fold(0u32, |acc, &d| acc * 16 + hex_value(d));
            if digits > 0 && value != 0 {
                (value as u8, 1 + digits)
            } else {
                (c, 1)
            }
        }
        b'0'..=b'9' => {
            let digits = rest
                .iter()
                .take(3)
                .take_while(|b| matches!(b, b'0'..=b'7'))
                .count();
            let value = rest[..digits]
                .iter()
                .fold(0u32, |acc, &d| acc * 8 + u32::from(d - b'0'))
                & 0xff;
            // A zero value is not a usable byte; the digit stays literal.
            if digits > 0 && value != 0 {
                (value as u8, digits)
            } else {
                (c, 1)
            }
        }
        _ => match CONTROL_NAMES.iter().position(|&n| n == c) {
            Some(pos) => (CONTROL_BYTES[pos], 1),
            None => (c, 1),
        },
    }
}

fn hex_value(d: u8) -> u32 {
    match d {
        b'0'..=b'9' => u32::from(d - b'0'),
        b'a'..=b'f' => u32::from(d - b'a' + 10),
        _ => u32::from(d - b'A' + 10),
    }
}

/// Split a payload into arguments, honouring quotes and backslash escapes.
///
/// Empty or all-whitespace input yields an empty [`ArgVector`]. An
/// unterminated quote runs to the end of the input.
pub fn split(input: &[u8], limits: SplitLimits) -> Result<ArgVector, SplitError> {
    let mut out = Builder::new(limits, input.len());
    let mut quote: Option<u8> = None;
    let mut in_token = false;
    let mut i = 0;

    while i < input.len() {
        let c = input[i];
        i += 1;

        if !in_token {
            if is_separator(c) {
                continue;
            }
            out.start_arg()?;
            in_token = true;
        }

        let byte = if c == b'\\' && quote != Some(b'\'') {
            let (byte, used) = unescape(&input[i..]);
            i += used;
            byte
        } else if let Some(q) = quote {
            if c == q {
                quote = None;
                continue;
            }
            c
        } else if c == b'\'' || c == b'"' {
            quote = Some(c);
            continue;
        } else if is_separator(c) {
            out.end_arg();
            in_token = false;
            continue;
        } else {
            c
        };

        out.push(byte)?;
    }

    Ok(out.finish())
}
