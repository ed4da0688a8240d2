//! Typed environment lookups for service configuration.
//!
//! Every knob in this service is an environment variable with a hard
//! default. A value that is unset or fails to parse falls back silently,
//! so a bad override can never keep the service from starting.

use std::path::PathBuf;
use std::time::Duration;

/// Generates a `fn $name(key, default) -> $ty` lookup for any type the
/// value can `parse()` into.
macro_rules! env_parsed {
    ($($(#[$doc:meta])* $name:ident => $ty:ty),+ $(,)?) => {
        $(
            $(#[$doc])*
            #[inline]
            pub fn $name(key: &str, default: $ty) -> $ty {
                std::env::var(key)
                    .ok()
                    .and_then(|raw| raw.parse().ok())
                    .unwrap_or(default)
            }
        )+
    };
}

env_parsed! {
    /// Port-sized knobs.
    env_u16 => u16,
    /// Second counts and other wide unsigned knobs.
    env_u64 => u64,
    /// Capacities and bounds.
    env_usize => usize,
    /// Signed knobs, notably the staleness threshold.
    env_i64 => i64,
}

/// A free-form string knob; the default is used verbatim when unset.
#[inline]
pub fn env_string(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(value) => value,
        Err(_) => default.to_string(),
    }
}

/// A filesystem path knob.
#[inline]
pub fn env_path(key: &str, default: &str) -> PathBuf {
    PathBuf::from(env_string(key, default))
}

/// A duration knob expressed in whole seconds.
#[inline]
pub fn env_duration_secs(key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_u64(key, default_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_variables_yield_the_default() {
        assert_eq!(env_u16("VOYAGER_TEST_NEVER_SET_PORT", 8109), 8109);
        assert_eq!(env_usize("VOYAGER_TEST_NEVER_SET_CAP", 1000), 1000);
        assert_eq!(env_i64("VOYAGER_TEST_NEVER_SET_STALE", -1), -1);
        assert_eq!(
            env_string("VOYAGER_TEST_NEVER_SET_URL", "http://localhost:4002"),
            "http://localhost:4002"
        );
        assert_eq!(
            env_path("VOYAGER_TEST_NEVER_SET_DIR", "data"),
            PathBuf::from("data")
        );
        assert_eq!(
            env_duration_secs("VOYAGER_TEST_NEVER_SET_TIMEOUT", 30),
            Duration::from_secs(30)
        );
    }

    #[test]
    #[serial_test::serial]
    fn unparseable_values_also_yield_the_default() {
        std::env::set_var("VOYAGER_TEST_GARBAGE_PORT", "not-a-port");
        assert_eq!(env_u16("VOYAGER_TEST_GARBAGE_PORT", 8109), 8109);
        std::env::remove_var("VOYAGER_TEST_GARBAGE_PORT");
    }
}
