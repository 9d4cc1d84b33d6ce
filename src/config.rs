// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Process configuration, read once at startup.
//!
//! Values come from an optional JSON file named by `CONFIG_FILE`, then from
//! individual environment variables which take precedence:
//!
//! | Variable | Default |
//! |---|---|
//! | `LISTEN_ADDRESS` | `0.0.0.0:50051` |
//! | `HEALTH_CHECK_ADDRESS` | `0.0.0.0:8080` (empty disables) |
//! | `LOG_LEVEL` | `debug` |
//! | `STREAM_MISSING_SESSION` | `continue` |
//! | `CHECK_MISSING_SESSION` | `deny` |

use log::LevelFilter;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";
pub const LISTEN_ADDRESS_ENV: &str = "LISTEN_ADDRESS";
pub const HEALTH_CHECK_ADDRESS_ENV: &str = "HEALTH_CHECK_ADDRESS";
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";
pub const STREAM_MISSING_SESSION_ENV: &str = "STREAM_MISSING_SESSION";
pub const CHECK_MISSING_SESSION_ENV: &str = "CHECK_MISSING_SESSION";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid log level {0:?}, expected one of error, warn, info, debug, trace")]
    InvalidLogLevel(String),
    #[error("Invalid value {value:?} for {key}, expected continue or deny")]
    InvalidPolicy { key: &'static str, value: String },
}

/// Logging verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    #[default]
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(ConfigError::InvalidLogLevel(s.to_string())),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, <LogLevel as TryFrom<String>>::Error> {
        s.parse()
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

/// What an adapter does when a request carries no `session` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum MissingSessionPolicy {
    /// Log a warning and let the request through unmodified.
    Continue,
    /// Reject the request with `PERMISSION_DENIED`.
    Deny,
}

impl TryFrom<String> for MissingSessionPolicy {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        MissingSessionPolicy::parse("missing session policy", &s)
    }
}

impl MissingSessionPolicy {
    fn parse(key: &'static str, value: &str) -> Result<Self, ConfigError> {
        match value.to_ascii_lowercase().as_str() {
            "continue" => Ok(MissingSessionPolicy::Continue),
            "deny" => Ok(MissingSessionPolicy::Deny),
            _ => Err(ConfigError::InvalidPolicy {
                key,
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address for the gRPC listener serving both callout services (format: "host:port")
    pub listen_address: String,

    /// Address for the HTTP health check server; `None` disables it
    pub health_check_address: Option<String>,

    pub log_level: LogLevel,

    /// Missing-header policy of the ext_proc stream
    pub stream_missing_session: MissingSessionPolicy,

    /// Missing-header policy of the ext_authz check
    pub check_missing_session: MissingSessionPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:50051".to_string(),
            health_check_address: Some("0.0.0.0:8080".to_string()),
            log_level: LogLevel::default(),
            stream_missing_session: MissingSessionPolicy::Continue,
            check_missing_session: MissingSessionPolicy::Deny,
        }
    }
}

impl Config {
    /// Loads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration from `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Unset and empty are treated alike, except for the health check
        // address where empty means disabled.
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let mut config = match var(CONFIG_FILE_ENV) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(address) = var(LISTEN_ADDRESS_ENV) {
            config.listen_address = address;
        }
        if let Some(address) = lookup(HEALTH_CHECK_ADDRESS_ENV) {
            config.health_check_address = (!address.is_empty()).then_some(address);
        }
        if let Some(level) = var(LOG_LEVEL_ENV) {
            config.log_level = level.parse()?;
        }
        if let Some(policy) = var(STREAM_MISSING_SESSION_ENV) {
            config.stream_missing_session =
                MissingSessionPolicy::parse(STREAM_MISSING_SESSION_ENV, &policy)?;
        }
        if let Some(policy) = var(CHECK_MISSING_SESSION_ENV) {
            config.check_missing_session =
                MissingSessionPolicy::parse(CHECK_MISSING_SESSION_ENV, &policy)?;
        }

        Ok(config)
    }

    /// Reads a JSON configuration file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
