// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use crate::marshal::DEFAULT_MAX_PACKED_SIZE;
use crate::remote::DEFAULT_PORT;

/// Zone stamped on new contexts when none is configured.
pub const DEFAULT_LOCAL_ZONE: &str = "tempZone";

/// Rulegrid dispatch configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Queue store connection URL
    pub database_url: String,
    /// Port used when a remote host address names none
    pub default_port: u16,
    /// Zone stamped on new execution contexts
    pub local_zone: String,
    /// Largest packed context accepted by the marshaler
    pub max_context_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `RULEGRID_QUEUE_DATABASE_URL`: queue store connection string
    ///
    /// Optional (with defaults):
    /// - `RULEGRID_DEFAULT_PORT`: remote peer port (default: 1247)
    /// - `RULEGRID_LOCAL_ZONE`: local zone name (default: tempZone)
    /// - `RULEGRID_MAX_CONTEXT_BYTES`: packed context limit (default: 64 MiB)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("RULEGRID_QUEUE_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("RULEGRID_QUEUE_DATABASE_URL"))?;

        let default_port: u16 = std::env::var("RULEGRID_DEFAULT_PORT")
            .unwrap_or_else(|_| DEFAULT_PORT.to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("RULEGRID_DEFAULT_PORT", "must be a valid port number")
            })?;

        let local_zone = std::env::var("RULEGRID_LOCAL_ZONE")
            .unwrap_or_else(|_| DEFAULT_LOCAL_ZONE.to_string());
        if local_zone.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "RULEGRID_LOCAL_ZONE",
                "must not be empty",
            ));
        }

        let max_context_bytes: usize = std::env::var("RULEGRID_MAX_CONTEXT_BYTES")
            .unwrap_or_else(|_| DEFAULT_MAX_PACKED_SIZE.to_string())
            .parse()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::Invalid(
                "RULEGRID_MAX_CONTEXT_BYTES",
                "must be a positive integer",
            ))?;

        Ok(Self {
            database_url,
            default_port,
            local_zone,
            max_context_bytes,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Sets env vars for one test and restores them on drop
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            self.vars.push((key.to_string(), env::var(key).ok()));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            self.vars.push((key.to_string(), env::var(key).ok()));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }

        fn clear_optional(&mut self) {
            self.remove("RULEGRID_DEFAULT_PORT");
            self.remove("RULEGRID_LOCAL_ZONE");
            self.remove("RULEGRID_MAX_CONTEXT_BYTES");
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("RULEGRID_QUEUE_DATABASE_URL", "sqlite::memory:");
        guard.clear_optional();

        let config = Config::from_env().unwrap();

        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.default_port, 1247);
        assert_eq!(config.local_zone, "tempZone");
        assert_eq!(config.max_context_bytes, 64 * 1024 * 1024);
    }

    #[test]
    fn test_config_from_env_all_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("RULEGRID_QUEUE_DATABASE_URL", "sqlite:/var/lib/rulegrid/queue.db");
        guard.set("RULEGRID_DEFAULT_PORT", "2247");
        guard.set("RULEGRID_LOCAL_ZONE", "archiveZone");
        guard.set("RULEGRID_MAX_CONTEXT_BYTES", "4096");

        let config = Config::from_env().unwrap();

        assert_eq!(config.database_url, "sqlite:/var/lib/rulegrid/queue.db");
        assert_eq!(config.default_port, 2247);
        assert_eq!(config.local_zone, "archiveZone");
        assert_eq!(config.max_context_bytes, 4096);
    }

    #[test]
    fn test_config_missing_database_url() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.remove("RULEGRID_QUEUE_DATABASE_URL");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("RULEGRID_QUEUE_DATABASE_URL")));
        assert!(err.to_string().contains("RULEGRID_QUEUE_DATABASE_URL"));
    }

    #[test]
    fn test_config_invalid_values() {
        let cases = [
            ("RULEGRID_DEFAULT_PORT", "not_a_number"),
            ("RULEGRID_DEFAULT_PORT", "99999"),
            ("RULEGRID_LOCAL_ZONE", "  "),
            ("RULEGRID_MAX_CONTEXT_BYTES", "0"),
            ("RULEGRID_MAX_CONTEXT_BYTES", "-5"),
        ];

        let _lock = ENV_MUTEX.lock().unwrap();
        for (key, value) in cases {
            let mut guard = EnvGuard::new();
            guard.set("RULEGRID_QUEUE_DATABASE_URL", "sqlite::memory:");
            guard.clear_optional();
            guard.set(key, value);

            let err = Config::from_env().unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid(k, _) if k == key),
                "{key}={value}: {err}"
            );
        }
    }
}
