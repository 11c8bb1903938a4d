// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! [`ServiceConfig`] carries every tunable of the entitlement service and is
//! passed at construction; nothing in the library reads the environment.
//! The server binary builds one through [`ServerSettings::from_env`], where
//! every variable is optional.
//!
//! ## Environment Variables (server binary)
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding the store file | `./data` |
//! | `HOST` | Server bind address | `127.0.0.1` |
//! | `PORT` | Server bind port | `8080` |
//! | `MAX_DEVICES` | Device cap per account | `3` |
//! | `TRIAL_DAYS` | Trial window length in days | `14` |
//! | `OPERATION_TIMEOUT_MS` | Per-call deadline | `5000` |
//! | `PASSWORD_HASH_TARGET_MS` | Calibrate Argon2 cost toward this duration | unset |
//! | `ADMIN_TOKEN` | Bearer secret for admin routes | unset (admin routes disabled) |
//! | `SUPPORT_TOKEN` | Bearer secret for read-only support routes | unset |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::auth::password::PasswordHashCost;

pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const MAX_DEVICES_ENV: &str = "MAX_DEVICES";
pub const TRIAL_DAYS_ENV: &str = "TRIAL_DAYS";
pub const OPERATION_TIMEOUT_ENV: &str = "OPERATION_TIMEOUT_MS";
pub const PASSWORD_HASH_TARGET_ENV: &str = "PASSWORD_HASH_TARGET_MS";
pub const ADMIN_TOKEN_ENV: &str = "ADMIN_TOKEN";
pub const SUPPORT_TOKEN_ENV: &str = "SUPPORT_TOKEN";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Default device cap per account.
pub const DEFAULT_MAX_DEVICES: usize = 3;
/// Default trial length.
pub const DEFAULT_TRIAL_DAYS: u32 = 14;
/// File name of the store inside the data directory.
pub const STORE_FILE_NAME: &str = "entitlements.redb";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Password policy and hashing cost.
#[derive(Debug, Clone)]
pub struct PasswordConfig {
    /// Minimum accepted length in characters.
    pub min_length: usize,
    /// Argon2id cost parameters.
    pub hash_cost: PasswordHashCost,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            min_length: 10,
            hash_cost: PasswordHashCost::default(),
        }
    }
}

/// Soft-lock after repeated authentication failures.
#[derive(Debug, Clone)]
pub struct LockoutConfig {
    /// Consecutive failures that trigger the lock.
    pub max_failures: u32,
    /// Failures older than this no longer count.
    pub window: Duration,
    /// How long the account stays locked.
    pub lock_duration: Duration,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            window: Duration::minutes(15),
            lock_duration: Duration::minutes(15),
        }
    }
}

/// Per-origin throttle for license activation attempts.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Attempts allowed per minute before backoff starts.
    pub per_minute: u32,
    /// First backoff delay; doubles on every further denial.
    pub backoff_base: Duration,
    /// Upper bound on a single backoff delay.
    pub backoff_max: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            per_minute: 10,
            backoff_base: Duration::seconds(30),
            backoff_max: Duration::hours(1),
        }
    }
}

/// Configuration of the entitlement service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub max_devices: usize,
    pub trial_days: u32,
    pub password: PasswordConfig,
    pub lockout: LockoutConfig,
    pub activation: ThrottleConfig,
    /// Deadline applied to every externally callable operation.
    pub operation_timeout: StdDuration,
    pub session_ttl: Duration,
    /// Audit records younger than this are never archived.
    pub audit_retention: Duration,
    /// Concurrent store operations allowed from the HTTP surface.
    pub store_pool_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_devices: DEFAULT_MAX_DEVICES,
            trial_days: DEFAULT_TRIAL_DAYS,
            password: PasswordConfig::default(),
            lockout: LockoutConfig::default(),
            activation: ThrottleConfig::default(),
            operation_timeout: StdDuration::from_secs(5),
            session_ttl: Duration::days(30),
            audit_retention: Duration::days(90),
            store_pool_size: 16,
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_devices == 0 {
            return Err(ConfigError::Invalid("max_devices must be at least 1".into()));
        }
        if self.password.min_length < 10 {
            return Err(ConfigError::Invalid(
                "password min_length must be at least 10".into(),
            ));
        }
        if self.lockout.max_failures == 0 {
            return Err(ConfigError::Invalid("lockout max_failures must be at least 1".into()));
        }
        if self.activation.per_minute == 0 {
            return Err(ConfigError::Invalid("activation per_minute must be at least 1".into()));
        }
        if self.store_pool_size == 0 {
            return Err(ConfigError::Invalid("store_pool_size must be at least 1".into()));
        }
        if self.operation_timeout.is_zero() {
            return Err(ConfigError::Invalid("operation_timeout must be non-zero".into()));
        }
        if self.audit_retention < Duration::days(90) {
            return Err(ConfigError::Invalid(
                "audit_retention must be at least 90 days".into(),
            ));
        }
        Ok(())
    }

    /// Cheapest valid settings; hashing with these is not secure.
    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self {
            password: PasswordConfig {
                min_length: 10,
                hash_cost: PasswordHashCost {
                    memory_kib: 8,
                    iterations: 1,
                    parallelism: 1,
                },
            },
            ..Self::default()
        }
    }
}

/// Everything the server binary needs to start.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub admin_token: Option<String>,
    pub support_token: Option<String>,
    pub service: ServiceConfig,
}

impl ServerSettings {
    /// Read optional overrides from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut service = ServiceConfig::default();

        if let Some(max) = env_parse::<usize>(MAX_DEVICES_ENV)? {
            service.max_devices = max;
        }
        if let Some(days) = env_parse::<u32>(TRIAL_DAYS_ENV)? {
            service.trial_days = days;
        }
        if let Some(ms) = env_parse::<u64>(OPERATION_TIMEOUT_ENV)? {
            service.operation_timeout = StdDuration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>(PASSWORD_HASH_TARGET_ENV)? {
            service.password.hash_cost =
                PasswordHashCost::calibrate(StdDuration::from_millis(ms));
        }
        service.validate()?;

        let data_dir = std::env::var(DATA_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));
        let host = std::env::var(HOST_ENV).unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env_parse::<u16>(PORT_ENV)?.unwrap_or(8080);
        let admin_token = env_secret(ADMIN_TOKEN_ENV);
        let support_token = env_secret(SUPPORT_TOKEN_ENV);

        Ok(Self {
            data_dir,
            host,
            port,
            admin_token,
            support_token,
            service,
        })
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(STORE_FILE_NAME)
    }
}

fn env_secret(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|token| !token.trim().is_empty())
}

fn env_parse<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { name, value }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ServiceConfig::default();
        assert_eq!(config.max_devices, 3);
        assert_eq!(config.trial_days, 14);
        assert_eq!(config.password.min_length, 10);
        assert_eq!(config.lockout.max_failures, 5);
        assert_eq!(config.lockout.window, Duration::minutes(15));
        assert_eq!(config.activation.per_minute, 10);
        assert_eq!(config.operation_timeout, StdDuration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_device_cap() {
        let config = ServiceConfig {
            max_devices: 0,
            ..ServiceConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_short_retention() {
        let config = ServiceConfig {
            audit_retention: Duration::days(30),
            ..ServiceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn store_path_joins_data_dir() {
        let settings = ServerSettings {
            data_dir: PathBuf::from("/var/lib/accessmate"),
            host: "127.0.0.1".into(),
            port: 8080,
            admin_token: None,
            support_token: None,
            service: ServiceConfig::default(),
        };
        assert_eq!(
            settings.store_path(),
            PathBuf::from("/var/lib/accessmate/entitlements.redb")
        );
    }
}
