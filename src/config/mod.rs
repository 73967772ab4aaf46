use crate::models::ClassifierConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, Environment, File, FileFormat};
use std::fs;

/// Name of the YAML file inside the config directory
pub const CONFIG_FILE_NAME: &str = "classifier.yaml";

/// Prefix of environment overrides, e.g. `DENTAL_RETRY__MAX_ATTEMPTS=5`
pub const ENV_PREFIX: &str = "DENTAL";

/// Configuration manager for loading and saving `classifier.yaml`.
///
/// Loading layers three sources, later ones winning:
/// 1. built-in defaults
/// 2. `classifier.yaml` in the config directory, if present
/// 3. `DENTAL_<SECTION>__<KEY>` environment variables
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,

    /// Replaces the process environment when set
    env_source: Option<config::Map<String, String>>,
}

impl ConfigManager {
    /// Create a new ConfigManager, creating `config_dir` if it doesn't exist.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
            env_source: None,
        })
    }

    /// Read overrides from `vars` instead of the process environment.
    pub fn with_env_source<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env_source = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }

    /// Load and validate the layered configuration.
    pub fn load(&self) -> Result<ClassifierConfig> {
        if self.config_path.exists() {
            tracing::info!("Loading config from {}", self.config_path);
        } else {
            tracing::warn!(
                "Config file not found at {}, using defaults and environment",
                self.config_path
            );
        }

        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("validation.accepted_formats")
            .source(self.env_source.clone());

        let layered = Config::builder()
            .add_source(File::new(self.config_path.as_str(), FileFormat::Yaml).required(false))
            .add_source(environment)
            .build()
            .with_context(|| format!("Failed to read configuration from {}", self.config_path))?;

        let config: ClassifierConfig = layered
            .try_deserialize()
            .with_context(|| format!("Failed to parse configuration: {}", self.config_path))?;

        config
            .validate()
            .with_context(|| format!("Invalid configuration: {}", self.config_path))?;

        tracing::info!(
            "Configuration loaded: endpoint={}, encoding={:?}, max_attempts={}",
            config.endpoint.classify_url(),
            config.endpoint.encoding,
            config.retry.max_attempts
        );

        Ok(config)
    }

    /// Write `config` to `classifier.yaml`.
    pub fn save(&self, config: &ClassifierConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransportEncoding;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(temp_dir.path()).unwrap().join("config");
        let manager = ConfigManager::new(&dir)
            .unwrap()
            .with_env_source(Vec::<(String, String)>::new());
        (manager, temp_dir)
    }

    #[test]
    fn test_create_config_manager() {
        let (manager, _temp) = create_test_config_manager();
        assert!(manager.config_dir().exists());
        assert_eq!(manager.config_path().file_name(), Some(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let (manager, _temp) = create_test_config_manager();
        let config = manager.load().unwrap();
        assert_eq!(config, ClassifierConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let (manager, _temp) = create_test_config_manager();
        fs::write(
            manager.config_path(),
            "retry:\n  max_attempts: 5\nendpoint:\n  encoding: multipart\n",
        )
        .unwrap();

        let config = manager.load().unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay_ms, 30_000);
        assert_eq!(config.endpoint.encoding, TransportEncoding::Multipart);
        assert_eq!(config.validation.min_dimension, 100);
    }

    #[test]
    fn test_save_then_load() {
        let (manager, _temp) = create_test_config_manager();
        let mut config = ClassifierConfig::default();
        config.endpoint.base_url = "http://localhost:8000".to_string();
        config.progress.cap_percent = 80;

        manager.save(&config).unwrap();

        assert_eq!(manager.load().unwrap(), config);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let (manager, _temp) = create_test_config_manager();
        fs::write(manager.config_path(), "progress:\n  cap_percent: 100\n").unwrap();

        let err = manager.load().unwrap_err();
        assert!(format!("{:#}", err).contains("cap_percent"));
    }

    #[test]
    fn test_malformed_yaml_is_an_error() {
        let (manager, _temp) = create_test_config_manager();
        fs::write(manager.config_path(), "retry: [not, a, map").unwrap();
        assert!(manager.load().is_err());
    }
}
