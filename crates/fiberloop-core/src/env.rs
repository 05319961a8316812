//! Environment variable utilities
//!
//! Typed lookups with defaults, used by `RuntimeConfig::from_env` and the
//! logging setup.
//!
//! ```ignore
//! use fiberloop_core::env::{env_get, env_get_bool, env_get_duration_ms};
//!
//! let stack: usize = env_get("FIBER_STACK_SIZE", 256 * 1024);
//! let debug = env_get_bool("FIBER_DEBUG", false);
//! let park = env_get_duration_ms("FIBER_PARK_TIMEOUT_MS", 10);
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Parse `key` as `T`, falling back to `default` when unset or malformed
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Parse `key` as `T` if it is set and well-formed
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Boolean flag: "1", "true", "yes" and "on" (any case) are true,
/// any other value is false, unset gives `default`
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => parse_flag(&val),
        Err(_) => default,
    }
}

/// Millisecond count as a `Duration`
#[inline]
pub fn env_get_duration_ms(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_get(key, default_ms))
}

#[inline]
pub fn env_is_set(key: &str) -> bool {
    std::env::var_os(key).is_some()
}

pub(crate) fn parse_flag(val: &str) -> bool {
    matches!(
        val.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_falls_back() {
        let n: usize = env_get("__FIBERLOOP_UNSET_9431__", 42);
        assert_eq!(n, 42);
        assert!(env_get_bool("__FIBERLOOP_UNSET_9431__", true));
        assert_eq!(env_get_opt::<u32>("__FIBERLOOP_UNSET_9431__"), None);
        assert!(!env_is_set("__FIBERLOOP_UNSET_9431__"));
    }

    #[test]
    fn test_parse_and_malformed() {
        std::env::set_var("__FIBERLOOP_NUM__", " 123 ");
        assert_eq!(env_get::<usize>("__FIBERLOOP_NUM__", 0), 123);
        std::env::set_var("__FIBERLOOP_NUM__", "lots");
        assert_eq!(env_get::<usize>("__FIBERLOOP_NUM__", 7), 7);
        std::env::remove_var("__FIBERLOOP_NUM__");
    }

    #[test]
    fn test_duration_ms() {
        std::env::set_var("__FIBERLOOP_MS__", "25");
        assert_eq!(env_get_duration_ms("__FIBERLOOP_MS__", 1), Duration::from_millis(25));
        std::env::remove_var("__FIBERLOOP_MS__");
        assert_eq!(env_get_duration_ms("__FIBERLOOP_MS__", 1), Duration::from_millis(1));
    }

    #[test]
    fn test_flag_spellings() {
        for on in ["1", "true", "TRUE", "yes", "On"] {
            assert!(parse_flag(on), "{on}");
        }
        for off in ["0", "false", "no", "garbage", ""] {
            assert!(!parse_flag(off), "{off}");
        }
    }
}
