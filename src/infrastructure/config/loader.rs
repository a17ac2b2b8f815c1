use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::StationConfig;

/// Configuration error types
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Test type cannot be empty")]
    EmptyTestType,

    #[error("Invalid {name}: {value}. Must be at least 1")]
    ZeroBound { name: &'static str, value: u64 },

    #[error("Invalid {name}: {value}. Must be positive")]
    NotPositive { name: &'static str, value: f64 },

    #[error("Results output directory cannot be empty")]
    EmptyResultsDir,
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .teststation/config.yaml (station config)
    /// 3. .teststation/local.yaml (bench-local overrides, optional)
    /// 4. Environment variables (TESTSTATION_* prefix, `__` for nesting)
    pub fn load() -> Result<StationConfig> {
        let config: StationConfig = Figment::new()
            .merge(Serialized::defaults(StationConfig::default()))
            .merge(Yaml::file(".teststation/config.yaml"))
            .merge(Yaml::file(".teststation/local.yaml"))
            .merge(Env::prefixed("TESTSTATION_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file; environment overrides still apply
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<StationConfig> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file {} does not exist", path.display());
        }
        let config: StationConfig = Figment::new()
            .merge(Serialized::defaults(StationConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("TESTSTATION_").split("__"))
            .extract()
            .context(format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &StationConfig) -> Result<(), ConfigError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        if config.sequence.test_type.trim().is_empty() {
            return Err(ConfigError::EmptyTestType);
        }

        let protocol = &config.protocol;
        at_least_one("protocol.max_acquisition_polls", protocol.max_acquisition_polls.into())?;
        at_least_one("protocol.max_soak_polls", protocol.max_soak_polls.into())?;
        positive("protocol.line_ramp_step_volts", protocol.line_ramp_step_volts)?;
        positive("protocol.default_scope_scale_volts", protocol.default_scope_scale_volts)?;
        positive("protocol.line_current_limit_amps", protocol.line_current_limit_amps)?;

        at_least_one("instruments.load_channels", config.instruments.load_channels.into())?;

        let diagnostics = &config.diagnostics;
        positive("diagnostics.nominal_line_volts", diagnostics.nominal_line_volts)?;
        positive("diagnostics.max_idle_input_amps", diagnostics.max_idle_input_amps)?;
        at_least_one("diagnostics.orientation_output", diagnostics.orientation_output.into())?;

        if config.results.output_dir.trim().is_empty() {
            return Err(ConfigError::EmptyResultsDir);
        }

        Ok(())
    }
}

const fn at_least_one(name: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::ZeroBound { name, value });
    }
    Ok(())
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = StationConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.sequence.test_type, "FINAL");
        assert!(config.sequence.speedup_enabled);
        assert_eq!(config.protocol.max_acquisition_polls, 500);
        assert_eq!(config.instruments.load_channels, 2);
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
logging:
  level: debug
  format: json
sequence:
  dash: 1234-01
  test_type: BURNIN
  stop_on_first_failure: true
protocol:
  relay_settle_ms: 5
  aux_defaults: [5.0, 15.0]
instruments:
  load_channels: 4
  aux_supplies: [sim, sim]
";

        let config: StationConfig = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.sequence.dash, "1234-01");
        assert!(config.sequence.stop_on_first_failure);
        assert!(config.sequence.speedup_enabled);
        assert_eq!(config.protocol.relay_settle_ms, 5);
        assert_eq!(config.protocol.scope_error_settle_ms, 100);
        assert_eq!(config.protocol.aux_defaults, vec![5.0, 15.0]);
        assert_eq!(config.instruments.load_channels, 4);
        assert_eq!(config.instruments.aux_supplies.len(), 2);

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = StationConfig::default();
        config.logging.level = "verbose".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "verbose"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = StationConfig::default();
        config.logging.format = "xml".to_string();

        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogFormat("xml".to_string()))
        );
    }

    #[test]
    fn test_validate_zero_polls() {
        let mut config = StationConfig::default();
        config.protocol.max_acquisition_polls = 0;

        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::ZeroBound { name: "protocol.max_acquisition_polls", value: 0 })
        ));
    }

    #[test]
    fn test_validate_negative_ramp_step() {
        let mut config = StationConfig::default();
        config.protocol.line_ramp_step_volts = -1.0;

        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::NotPositive { name: "protocol.line_ramp_step_volts", .. })
        ));
    }

    #[test]
    fn test_validate_zero_load_channels() {
        let mut config = StationConfig::default();
        config.instruments.load_channels = 0;

        assert!(ConfigLoader::validate(&config).is_err());
    }

    #[test]
    fn test_validate_empty_results_dir() {
        let mut config = StationConfig::default();
        config.results.output_dir = "  ".to_string();

        assert_eq!(ConfigLoader::validate(&config), Err(ConfigError::EmptyResultsDir));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sequence:\n  dash: 9000-02\nprotocol:\n  max_soak_polls: 12").unwrap();

        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.sequence.dash, "9000-02");
        assert_eq!(config.protocol.max_soak_polls, 12);
    }

    #[test]
    fn test_load_from_file_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "logging:\n  format: xml").unwrap();

        let err = ConfigLoader::load_from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("xml"));
    }

    #[test]
    fn test_load_from_missing_file() {
        assert!(ConfigLoader::load_from_file("/nonexistent/teststation.yaml").is_err());
    }
}
