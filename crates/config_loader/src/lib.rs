//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate configuration legality
//! - Produce a `SyncEngineConfig`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let config = ConfigLoader::load_from_path(Path::new("trigsync.toml")).unwrap();
//! println!("Reference channel: {}", config.reference_type);
//! ```

mod parser;
mod validator;

pub use contracts::SyncEngineConfig;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<SyncEngineConfig, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load an optional configuration file, falling back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<SyncEngineConfig, ContractError> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Ok(SyncEngineConfig::default()),
        }
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<SyncEngineConfig, ContractError> {
        Self::parse_and_validate(content, format)
    }

    /// Validate an already-built configuration
    pub fn validate(config: &SyncEngineConfig) -> Result<(), ContractError> {
        validator::validate(config)
    }

    /// Serialize SyncEngineConfig to TOML string
    pub fn to_toml(config: &SyncEngineConfig) -> Result<String, ContractError> {
        toml::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize SyncEngineConfig to JSON string
    pub fn to_json(config: &SyncEngineConfig) -> Result<String, ContractError> {
        serde_json::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }

    /// Parse and validate configuration content
    fn parse_and_validate(
        content: &str,
        format: ConfigFormat,
    ) -> Result<SyncEngineConfig, ContractError> {
        let config = parser::parse(content, format)?;
        validator::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_TOML: &str = r#"
counter_bits = 15

[[quirks]]
family = "DEPFE5"
policy = "zero_glitch"
"#;

    #[test]
    fn test_load_minimal_toml() {
        let config = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        assert_eq!(config.modulus(), 32768);
        assert_eq!(config.quirks.len(), 1);
        assert_eq!(config.firmware.tag, "FirmwareID");
    }

    #[test]
    fn test_validation_failure_propagates() {
        let result = ConfigLoader::load_from_str("counter_bits = 64", ConfigFormat::Toml);
        assert!(matches!(
            result,
            Err(ContractError::ConfigValidation { .. })
        ));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = SyncEngineConfig::default();
        let toml = ConfigLoader::to_toml(&config).unwrap();
        let parsed = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_unsupported_extension() {
        let result = ConfigLoader::load_from_path(Path::new("trigsync.yaml"));
        assert!(matches!(result, Err(ContractError::ConfigParse { .. })));
    }

    #[test]
    fn test_load_or_default_without_path() {
        let config = ConfigLoader::load_or_default(None).unwrap();
        assert_eq!(config, SyncEngineConfig::default());
    }
}
