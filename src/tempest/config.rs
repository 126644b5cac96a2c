// Tempest - Weather metrics exporter for Prometheus
//
// Copyright 2023 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::provider::Target;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{self, Formatter};
use std::fs;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::rolling::{self, RollingFileAppender};

/// Error loading or validating the YAML configuration file.
///
/// All variants are fatal: the exporter refuses to start with a configuration
/// it cannot fully understand.
#[derive(Debug)]
pub enum ConfigError {
    Read(PathBuf, io::Error),
    Yaml(serde_yaml::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read(path, e) => write!(f, "unable to read {}: {}", path.display(), e),
            ConfigError::Yaml(e) => write!(f, "invalid configuration: {}", e),
            ConfigError::Invalid(msg) => msg.fmt(f),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Read(_, ref e) => Some(e),
            ConfigError::Yaml(ref e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

/// Top-level configuration, mirroring the YAML document structure.
///
/// Key names are capitalized in the file (`Configuration`, `Temperature`,
/// `City`, ...) for compatibility with existing deployments.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(rename = "Configuration")]
    pub configuration: Configuration,

    /// Cities to poll, in the order their series appear in the snapshot.
    #[serde(rename = "Temperature", default)]
    pub targets: Vec<Target>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    #[serde(rename = "Logging")]
    pub logging: Logging,

    #[serde(rename = "Web")]
    pub web: Web,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Logging {
    /// Name of the log file inside the log storage directory.
    #[serde(rename = "File_name")]
    pub file_name: String,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn',
    /// and 'error' (case insensitive).
    #[serde(rename = "Level", default = "default_level")]
    pub level: String,

    #[serde(rename = "Rotation", default)]
    pub rotation: Rotation,
}

impl Logging {
    /// Parse the configured verbosity into a tracing level.
    pub fn level(&self) -> Result<Level, ConfigError> {
        self.level
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("unrecognized log level '{}'", self.level)))
    }

    /// Create the rolling file appender for the configured rotation policy,
    /// writing into the given log storage directory.
    pub fn appender(&self, dir: &Path) -> RollingFileAppender {
        match self.rotation {
            Rotation::Daily => rolling::daily(dir, &self.file_name),
            Rotation::Hourly => rolling::hourly(dir, &self.file_name),
            Rotation::Never => rolling::never(dir, &self.file_name),
        }
    }
}

fn default_level() -> String {
    "info".to_owned()
}

/// Log file rotation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    Daily,
    Hourly,
    Never,
}

impl Default for Rotation {
    fn default() -> Self {
        Rotation::Daily
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Web {
    /// OpenWeather API credential sent with every outbound call.
    #[serde(rename = "APIKey")]
    pub api_key: String,

    /// Route the metrics snapshot is served from, e.g. `/metrics`.
    #[serde(rename = "WRoute")]
    pub metrics_route: String,

    #[serde(rename = "Host")]
    pub host: IpAddr,

    #[serde(rename = "Port")]
    pub port: u16,

    /// Seconds between refresh cycles.
    #[serde(rename = "Period")]
    pub period_secs: u64,
}

impl Web {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        let web = &self.configuration.web;
        if web.period_secs == 0 {
            return Err(ConfigError::Invalid("Period must be at least one second".to_owned()));
        }

        if !web.metrics_route.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "WRoute '{}' must begin with '/'",
                web.metrics_route
            )));
        }

        self.configuration.logging.level().map(|_| ())
    }
}

/// Load and validate configuration from a YAML file.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
    load_from_str(&contents)
}

pub fn load_from_str(contents: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_yaml::from_str(contents).map_err(ConfigError::Yaml)?;
    config.validate()?;
    Ok(config)
}
