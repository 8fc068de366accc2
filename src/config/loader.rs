// src/config/loader.rs
//! Layered configuration loader
//!
//! Sources are merged in order: built-in defaults, every discovered TOML file
//! that exists, then `HDEMG_*` environment variables (`HDEMG_FILTERS__REFSIG_CUTOFF=10`).

use crate::config::{constants::paths, AnalysisConfig};
use crate::error::{EmgError, ErrorContext};
use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Configuration loader
pub struct ConfigLoader {
    config_paths: Vec<PathBuf>,
    use_environment: bool,
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileNotFound(String),
    ParseError(String),
    ValidationError(Vec<String>),
    IoError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Configuration file not found: {}", path),
            ConfigError::ParseError(msg) => write!(f, "Configuration parse error: {}", msg),
            ConfigError::ValidationError(errors) => {
                write!(f, "Configuration validation errors: ")?;
                for error in errors {
                    write!(f, "\n  {}", error)?;
                }
                Ok(())
            }
            ConfigError::IoError(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err.to_string())
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(err: toml::ser::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for EmgError {
    fn from(err: ConfigError) -> Self {
        EmgError::Configuration {
            component: "config".to_string(),
            reason: err.to_string(),
            context: ErrorContext::new("config", "load"),
        }
    }
}

impl ConfigLoader {
    /// Create a loader over the default search paths
    pub fn new() -> Self {
        Self {
            config_paths: Self::discover_config_paths(),
            use_environment: true,
        }
    }

    /// Create loader with custom paths
    pub fn with_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            config_paths: paths,
            use_environment: true,
        }
    }

    /// Add an explicit file, highest precedence among files. The file must exist.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        self.config_paths.push(path.to_path_buf());
        Ok(self)
    }

    /// Skip the `HDEMG_*` environment overrides
    pub fn without_environment(mut self) -> Self {
        self.use_environment = false;
        self
    }

    /// Search paths in order of increasing precedence
    pub fn config_paths(&self) -> &[PathBuf] {
        &self.config_paths
    }

    /// Load, merge and validate the configuration
    pub fn load(&self) -> Result<AnalysisConfig, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&AnalysisConfig::default())?);

        for path in &self.config_paths {
            if path.exists() {
                debug!(path = %path.display(), "merging configuration file");
                builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml).required(false));
            }
        }

        if self.use_environment {
            builder = builder.add_source(
                Environment::with_prefix(paths::ENV_PREFIX)
                    .prefix_separator("_")
                    .separator(paths::ENV_SEPARATOR)
                    .try_parsing(true),
            );
        }

        let config: AnalysisConfig = builder.build()?.try_deserialize()?;
        config.validate_consistency().map_err(ConfigError::ValidationError)?;
        Ok(config)
    }

    /// Validate a single file without merging it
    pub fn validate_config_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        ConfigLoader::with_paths(vec![path.to_path_buf()])
            .without_environment()
            .load()
            .map(|_| ())
    }

    /// Export a configuration to a TOML file
    pub fn export_config<P: AsRef<Path>>(config: &AnalysisConfig, path: P) -> Result<(), ConfigError> {
        let toml_content = toml::to_string_pretty(config)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    fn discover_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(paths::USER_CONFIG_DIR).join("config.toml"));
        }

        // Local configurations (in order of precedence)
        paths.push(PathBuf::from(paths::DEFAULT_CONFIG_FILE));
        paths.push(PathBuf::from(paths::LOCAL_CONFIG_FILE));

        paths
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

// Cross-platform directory discovery
mod dirs {
    use std::path::PathBuf;

    pub fn home_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var_os("USERPROFILE").map(PathBuf::from)
        }
        #[cfg(not(target_os = "windows"))]
        {
            std::env::var_os("HOME").map(PathBuf::from)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn toml_file(content: &str) -> NamedTempFile {
        let mut temp_file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(temp_file, "{}", content).unwrap();
        temp_file
    }

    #[test]
    fn test_config_loader_creation() {
        let loader = ConfigLoader::new();
        assert!(!loader.config_paths().is_empty());
    }

    #[test]
    #[serial]
    fn test_load_default_config() {
        let loader = ConfigLoader::with_paths(vec![]).without_environment();
        let config = loader.load().unwrap();
        assert_eq!(config, AnalysisConfig::default());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = toml_file("[muap]\ntracking_threshold = 0.75\n\n[io]\ncompress_level = 6\n");

        let config = ConfigLoader::with_paths(vec![file.path().to_path_buf()])
            .without_environment()
            .load()
            .unwrap();

        assert_eq!(config.muap.tracking_threshold, 0.75);
        assert_eq!(config.io.compress_level, 6);
        assert_eq!(config.muap.duplicates_threshold, 0.9);
    }

    #[test]
    fn test_invalid_config_validation() {
        let loader = ConfigLoader::with_paths(vec![]);
        let file = toml_file("[io]\ncompress_level = 11\n");

        assert!(matches!(
            loader.validate_config_file(file.path()),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = ConfigLoader::with_paths(vec![]).with_file("/definitely/not/here.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        std::env::set_var("HDEMG_EMGFILE__FSAMP", "4096");

        let config = ConfigLoader::with_paths(vec![]).load();

        std::env::remove_var("HDEMG_EMGFILE__FSAMP");
        assert_eq!(config.unwrap().emgfile.fsamp, 4096.0);
    }

    #[test]
    fn test_config_export() {
        let temp_file = NamedTempFile::new().unwrap();

        ConfigLoader::export_config(&AnalysisConfig::default(), temp_file.path()).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.contains("[filters]"));
        assert!(content.contains("[svr]"));
    }
}
