/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Scheduler configuration.
//!
//! The sweep cadence comes from a JSON file (deployment mounts it next to
//! the binary) rather than the environment, so it can be tuned without
//! touching service definitions:
//!
//! ```json
//! { "schedulerIntervalMs": 5000 }
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};
use thiserror::Error;

/// Default config path when neither an argument nor `SCHEDULER_CONFIG` is
/// supplied.
const DEFAULT_CONFIG_PATH: &str = "scheduler.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("schedulerIntervalMs must be greater than zero")]
    InvalidInterval,
}

/// Scheduler settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Milliseconds between sweeps.
    scheduler_interval_ms: u64,
}

impl SchedulerConfig {
    /// Loads the config from an explicit path, `SCHEDULER_CONFIG`, or the
    /// default location, in that order.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => env::var("SCHEDULER_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
        };
        Self::load_from_file(&path)
    }

    /// Loads and validates the config from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: SchedulerConfig = serde_json::from_str(&content)?;
        if config.scheduler_interval_ms == 0 {
            return Err(ConfigError::InvalidInterval);
        }

        Ok(config)
    }

    /// The sweep interval.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.scheduler_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_valid_config() {
        let file = write_config(r#"{ "schedulerIntervalMs": 5000 }"#);
        let config = SchedulerConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.interval(), Duration::from_millis(5000));
    }

    #[test]
    fn rejects_zero_interval() {
        let file = write_config(r#"{ "schedulerIntervalMs": 0 }"#);
        let err = SchedulerConfig::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidInterval));
    }

    #[test]
    fn rejects_malformed_json() {
        let file = write_config("not json");
        let err = SchedulerConfig::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = SchedulerConfig::load_from_file(Path::new("/nonexistent/scheduler.json"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
