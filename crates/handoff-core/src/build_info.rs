//! Build metadata embedded by `build.rs`, shown by `--version` and in the
//! daemon startup log.

use chrono::{DateTime, Utc};

/// Short git commit hash, or `unknown` outside a checkout.
pub const GIT_HASH: &str = env!("HANDOFF_GIT_HASH");

/// Build time as Unix epoch seconds.
pub const BUILD_TIMESTAMP: &str = env!("HANDOFF_BUILD_TIMESTAMP");

/// Cargo profile (`debug` or `release`).
pub const BUILD_PROFILE: &str = env!("HANDOFF_BUILD_PROFILE");

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// `"0.1.0 (abc1234, debug)"`, usable as a clap `version`.
pub const VERSION_LINE: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("HANDOFF_GIT_HASH"),
    ", ",
    env!("HANDOFF_BUILD_PROFILE"),
    ")"
);

pub fn version_string() -> String {
    VERSION_LINE.to_string()
}

/// The build time, if the embedded timestamp is usable.
pub fn built_at() -> Option<DateTime<Utc>> {
    let secs = BUILD_TIMESTAMP.parse::<i64>().ok().filter(|s| *s > 0)?;
    DateTime::from_timestamp(secs, 0)
}

/// Multi-line form for `--version`, including the build date.
pub fn long_version() -> String {
    match built_at() {
        Some(at) => format!("{}\nbuilt {}", version_string(), at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => version_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_string_contains_version() {
        assert!(version_string().starts_with(VERSION));
        assert!(VERSION_LINE.contains(BUILD_PROFILE));
        assert!(!GIT_HASH.is_empty());
    }

    #[test]
    fn test_build_time_is_embedded() {
        let at = built_at().expect("build.rs should embed a timestamp");
        assert!(at.timestamp() > 1_600_000_000);
        assert!(long_version().contains("built "));
    }
}
