//! Path translation for bracketed arguments.
//!
//! A command may mark an argument as a foreign path by wrapping it in
//! brackets, e.g. `notepad [C:\Users\me\todo.txt]`. The exec handler strips
//! the brackets and passes the inner text through a [`PathTranslator`]
//! before spawning.

use std::path::PathBuf;

/// Rewrites a foreign path into a local one.
pub trait PathTranslator: Send + Sync {
    fn translate(&self, path: &[u8]) -> Vec<u8>;
}

/// The inner text of a `[path]` argument, or `None` for ordinary arguments.
pub fn bracketed(arg: &[u8]) -> Option<&[u8]> {
    match arg {
        [b'[', inner @ .., b']'] => Some(inner),
        _ => None,
    }
}

/// Maps DOS-style paths under a mount root.
///
/// - `C:\x\y` becomes `<root>/c/x/y`
/// - `\\host\share\f` becomes `//host/share/f`
/// - any other backslash becomes `/`
#[derive(Debug, Clone)]
pub struct DrivePathTranslator {
    root: PathBuf,
}

impl DrivePathTranslator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl PathTranslator for DrivePathTranslator {
    fn translate(&self, path: &[u8]) -> Vec<u8> {
        match path {
            [drive, b':', rest @ ..] if drive.is_ascii_alphabetic() => {
                let mut out = self.root.as_os_str().as_encoded_bytes().to_vec();
                while out.ends_with(b"/") {
                    out.pop();
                }
                out.push(b'/');
                out.push(drive.to_ascii_lowercase());
                if !rest.is_empty() && !matches!(rest[0], b'\\' | b'/') {
                    out.push(b'/');
                }
                out.extend(rest.iter().map(|&b| slash(b)));
                out
            }
            // UNC paths keep their leading double separator.
            _ => path.iter().map(|&b| slash(b)).collect(),
        }
    }
}

fn slash(b: u8) -> u8 {
    if b == b'\\' { b'/' } else { b }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn translate(path: &str) -> String {
        let out = DrivePathTranslator::new("/mnt").translate(path.as_bytes());
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_bracketed() {
        assert_eq!(bracketed(b"[C:\\x]"), Some(b"C:\\x".as_slice()));
        assert_eq!(bracketed(b"[]"), Some(b"".as_slice()));
        assert_eq!(bracketed(b"["), None);
        assert_eq!(bracketed(b"[abc"), None);
        assert_eq!(bracketed(b"abc]"), None);
        assert_eq!(bracketed(b"plain"), None);
    }

    #[test]
    fn test_drive_paths() {
        assert_eq!(translate("C:\\Users\\me\\todo.txt"), "/mnt/c/Users/me/todo.txt");
        assert_eq!(translate("d:/data"), "/mnt/d/data");
        assert_eq!(translate("E:"), "/mnt/e");
        assert_eq!(translate("E:notes.txt"), "/mnt/e/notes.txt");
    }

    #[test]
    fn test_unc_and_relative_paths() {
        assert_eq!(translate("\\\\host\\share\\f.txt"), "//host/share/f.txt");
        assert_eq!(translate("dir\\file"), "dir/file");
        assert_eq!(translate("/already/unix"), "/already/unix");
    }

    #[test]
    fn test_root_trailing_slash() {
        let out = DrivePathTranslator::new("/cygdrive/").translate(b"C:\\x");
        assert_eq!(out, b"/cygdrive/c/x");

        let out = DrivePathTranslator::new("/").translate(b"C:\\x");
        assert_eq!(out, b"/c/x");
    }
}
