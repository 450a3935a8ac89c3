//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. config/default.toml, if present
//! 4. Built-in defaults
//!
//! The feed API key is never required in the file: it is read from the
//! environment variable named by `feed.api_key_env` first.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::error::ConfigError;
use crate::fleet::FleetRules;
use crate::parser::FeedDecoder;
use crate::sanitize::BoundingBox;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub url: String,
    /// Query parameter carrying the API key
    pub api_key_param: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Fallback when the environment variable is unset
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub supported_versions: Vec<String>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "https://otd.delhi.gov.in/api/realtime/VehiclePositions.pb".to_string(),
            api_key_param: "key".to_string(),
            api_key_env: "FEED_API_KEY".to_string(),
            api_key: None,
            timeout_secs: 10,
            poll_interval_secs: 10,
            supported_versions: vec!["1.0".to_string(), "2.0".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    pub routes_path: PathBuf,
    pub stops_path: PathBuf,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            routes_path: PathBuf::from("data/routes.txt"),
            stops_path: PathBuf::from("data/stops.txt"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feed: FeedConfig,
    pub reference: ReferenceConfig,
    pub geofence: BoundingBox,
    pub fleet: FleetRules,
}

impl Config {
    /// Parses and validates a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Resolves the config source in priority order (see module docs).
    pub fn load(cli_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = cli_path {
            info!(path = %path.display(), "Loading config from --config");
            return Self::from_file(path);
        }
        if let Ok(path) = env::var("CONFIG_FILE") {
            info!(path = %path, "Loading config from CONFIG_FILE");
            return Self::from_file(Path::new(&path));
        }
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        if default_path.exists() {
            info!(path = DEFAULT_CONFIG_PATH, "Loading default config file");
            return Self::from_file(default_path);
        }
        info!("No config file found, using built-in defaults");
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.geofence.is_valid() {
            return Err(ConfigError::Invalid(format!(
                "geofence must be finite with min <= max, got {:?}",
                self.geofence
            )));
        }
        if self.feed.timeout_secs == 0 {
            return Err(ConfigError::Invalid("feed.timeout_secs must be > 0".into()));
        }
        if self.feed.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "feed.poll_interval_secs must be > 0".into(),
            ));
        }
        if self.feed.supported_versions.is_empty() {
            return Err(ConfigError::Invalid(
                "feed.supported_versions must not be empty".into(),
            ));
        }
        reqwest::Url::parse(&self.feed.url)
            .map_err(|e| ConfigError::Invalid(format!("feed.url {:?}: {e}", self.feed.url)))?;
        if let Some(rule) = self.fleet.rules.iter().find(|r| r.pattern.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "fleet rule for {} has an empty pattern",
                rule.category
            )));
        }
        Ok(())
    }

    /// The feed API key. Missing credentials are fatal at startup.
    pub fn api_key(&self) -> Result<String, ConfigError> {
        let from_env = env::var(&self.feed.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        from_env
            .or_else(|| self.feed.api_key.clone().filter(|k| !k.trim().is_empty()))
            .ok_or_else(|| ConfigError::MissingApiKey {
                var: self.feed.api_key_env.clone(),
            })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.feed.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.feed.poll_interval_secs)
    }

    pub fn decoder(&self) -> FeedDecoder {
        FeedDecoder::new(self.feed.supported_versions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::FleetCategory;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
        assert_eq!(config.geofence, BoundingBox::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
[feed]
poll_interval_secs = 30
"#,
        )
        .unwrap();

        assert_eq!(config.feed.poll_interval_secs, 30);
        assert_eq!(config.feed.timeout_secs, 10);
        assert_eq!(config.feed.api_key_param, "key");
        assert_eq!(config.fleet.rules.len(), 2);
    }

    #[test]
    fn test_fleet_rules_from_toml() {
        let config: Config = toml::from_str(
            r#"
[fleet]
default_category = "DTC"
rules = [
    { category = "DIMTS", kind = "contains", pattern = "PC" },
]

[fleet.colors]
DIMTS = "purple"
"#,
        )
        .unwrap();

        assert_eq!(config.fleet.rules.len(), 1);
        assert_eq!(config.fleet.classify("DL51PC01"), FleetCategory::Dimts);
        assert_eq!(config.fleet.color(FleetCategory::Dimts), "purple");
        assert_eq!(config.fleet.color(FleetCategory::Dtc), "green");
    }

    #[test]
    fn test_inverted_geofence_is_rejected() {
        let config = Config {
            geofence: BoundingBox {
                min_lat: 29.0,
                max_lat: 28.0,
                min_lon: 76.8,
                max_lon: 77.4,
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let mut config = Config::default();
        config.feed.poll_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_url_is_rejected() {
        let mut config = Config::default();
        config.feed.url = "otd.delhi.gov.in/feed".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_key_from_file_value() {
        let mut config = Config::default();
        config.feed.api_key_env = "VEHICLE_SNAPSHOT_TEST_UNSET_KEY".to_string();
        config.feed.api_key = Some("abc123".to_string());

        assert_eq!(config.api_key().unwrap(), "abc123");
    }

    #[test]
    fn test_missing_api_key_is_error() {
        let mut config = Config::default();
        config.feed.api_key_env = "VEHICLE_SNAPSHOT_TEST_UNSET_KEY".to_string();

        assert!(matches!(
            config.api_key(),
            Err(ConfigError::MissingApiKey { .. })
        ));
    }
}
