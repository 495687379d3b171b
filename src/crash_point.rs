//! Crash point injection for durability tests
//!
//! A crash point is enabled through the `SHARDGATE_CRASH_POINT` environment
//! variable. When the named point is reached the process terminates via
//! `std::process::abort()`: no cleanup, no unwinding, no catching.
//!
//! ```bash
//! SHARDGATE_CRASH_POINT=translog_after_append shardgate recover --config shard.json
//! ```

use std::sync::OnceLock;

use tracing::error;

/// Environment variable naming the enabled crash point
pub const CRASH_POINT_ENV: &str = "SHARDGATE_CRASH_POINT";

/// Read once; changing the variable later has no effect
static ENABLED_POINT: OnceLock<Option<String>> = OnceLock::new();

fn enabled_point() -> Option<&'static str> {
    ENABLED_POINT
        .get_or_init(|| {
            std::env::var(CRASH_POINT_ENV)
                .ok()
                .filter(|name| !name.trim().is_empty())
        })
        .as_deref()
}

pub fn crash_point_enabled(name: &str) -> bool {
    enabled_point() == Some(name)
}

/// Abort the process if `name` is the enabled crash point.
#[inline]
pub fn maybe_crash(name: &str) {
    if crash_point_enabled(name) {
        error!(crash_point = name, "aborting at crash point");
        std::process::abort();
    }
}

/// All defined crash point names
pub mod points {
    // Translog
    pub const TRANSLOG_BEFORE_APPEND: &str = "translog_before_append";
    pub const TRANSLOG_AFTER_APPEND: &str = "translog_after_append";
    pub const TRANSLOG_AFTER_FSYNC: &str = "translog_after_fsync";

    // Local recovery
    pub const RECOVERY_AFTER_CLAIM: &str = "recovery_after_claim";
    pub const RECOVERY_AFTER_REPLAY: &str = "recovery_after_replay";

    /// Get all crash point names
    pub fn all() -> &'static [&'static str] {
        &[
            TRANSLOG_BEFORE_APPEND,
            TRANSLOG_AFTER_APPEND,
            TRANSLOG_AFTER_FSYNC,
            RECOVERY_AFTER_CLAIM,
            RECOVERY_AFTER_REPLAY,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crash_point_disabled_by_default() {
        assert!(!crash_point_enabled("test_point"));
    }

    #[test]
    fn test_all_crash_points_defined() {
        let all = points::all();
        assert_eq!(all.len(), 5);
        assert!(all.contains(&"translog_after_fsync"));
        assert!(all.contains(&"recovery_after_claim"));
    }

    #[test]
    fn test_crash_point_names_are_lowercase_with_underscores() {
        for point in points::all() {
            assert!(
                point.chars().all(|c| c.is_lowercase() || c == '_'),
                "Crash point '{}' should be lowercase with underscores",
                point
            );
        }
    }
}
