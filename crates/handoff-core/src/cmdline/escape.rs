use super::{CONTROL_BYTES, CONTROL_NAMES, PAYLOAD_CAPACITY};

/// Errors from encoding an argument vector into a payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("command or word too long (payload limit is {capacity} bytes)")]
    TooLong { capacity: usize },
}

/// Append the escaped form of one argument to `out`.
///
/// The argument is wrapped in double quotes when it is empty or contains a
/// double quote, a space, or a comma.
pub fn escape_into(out: &mut String, arg: &[u8]) {
    let quote = arg.is_empty() || arg.iter().any(|b| matches!(b, b'"' | b' ' | b','));
    if quote {
        out.push('"');
    }

    for (i, &b) in arg.iter().enumerate() {
        match b {
            // `'` is a quote character to the splitter, so it must be escaped
            // to come back as itself.
            b'"' | b'\\' | b'\'' => {
                out.push('\\');
                out.push(b as char);
            }
            0x20..=0x7e => out.push(b as char),
            _ => {
                if let Some(pos) = CONTROL_BYTES.iter().position(|&c| c == b) {
                    out.push('\\');
                    out.push(CONTROL_NAMES[pos] as char);
                } else if arg.get(i + 1).is_some_and(u8::is_ascii_digit) {
                    // A following digit would otherwise be read as part of
                    // the escape.
                    out.push_str(&format!("\\{b:03o}"));
                } else {
                    out.push_str(&format!("\\{b:o}"));
                }
            }
        }
    }

    if quote {
        out.push('"');
    }
}

/// Escape a single argument.
pub fn escape_arg(arg: impl AsRef<[u8]>) -> String {
    let mut out = String::new();
    escape_into(&mut out, arg.as_ref());
    out
}

/// Escape and space-join an argument vector with no size limit.
///
/// Used for log lines; use [`encode_payload`] for anything that goes on the
/// wire.
pub fn escape_args<I, A>(args: I) -> String
where
    I: IntoIterator<Item = A>,
    A: AsRef<[u8]>,
{
    let mut out = String::new();
    for (n, arg) in args.into_iter().enumerate() {
        if n > 0 {
            out.push(' ');
        }
        escape_into(&mut out, arg.as_ref());
    }
    out
}

/// Encode an argument vector into a transport payload of at most
/// `capacity` bytes, counting the NUL terminator the wire adds.
pub fn encode_bounded<I, A>(args: I, capacity: usize) -> Result<String, EncodeError>
where
    I: IntoIterator<Item = A>,
    A: AsRef<[u8]>,
{
    let mut out = String::new();
    for (n, arg) in args.into_iter().enumerate() {
        if n > 0 {
            out.push(' ');
        }
        escape_into(&mut out, arg.as_ref());
        if out.len() + 1 > capacity {
            return Err(EncodeError::TooLong { capacity });
        }
    }
    if out.len() + 1 > capacity {
        return Err(EncodeError::TooLong { capacity });
    }
    Ok(out)
}

/// Encode an argument vector into a transport payload.
pub fn encode_payload<I, A>(args: I) -> Result<String, EncodeError>
where
    I: IntoIterator<Item = A>,
    A: AsRef<[u8]>,
{
    encode_bounded(args, PAYLOAD_CAPACITY)
}
