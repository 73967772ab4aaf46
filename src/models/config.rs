use anyhow::{Result, bail};
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete client configuration loaded from `classifier.yaml` and the environment.
///
/// Every section falls back to its defaults when absent, so an empty file (or no
/// file at all) yields a working configuration pointed at the hosted backend.
/// The struct is immutable once loaded: each component receives the section it
/// needs at construction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ClassifierConfig {
    pub endpoint: EndpointSettings,
    pub validation: ValidationSettings,
    pub retry: RetrySettings,
    pub progress: ProgressSettings,
    pub logging: LoggingSettings,
}

/// How the image travels to the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportEncoding {
    /// JSON body `{"image": "data:<mime>;base64,..."}`
    #[default]
    DataUri,
    /// `multipart/form-data` with a binary `image` field
    Multipart,
}

/// Remote endpoint and transport settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSettings {
    pub base_url: String,
    pub classify_path: String,
    /// Total time budget for one attempt. Generous because the backend cold-starts.
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub encoding: TransportEncoding,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            base_url: "https://dentalbackend-8hhh.onrender.com".to_string(),
            classify_path: "/api/classify".to_string(),
            request_timeout_secs: 180,
            connect_timeout_secs: 30,
            encoding: TransportEncoding::DataUri,
        }
    }
}

impl EndpointSettings {
    /// Full URL of the classification operation.
    pub fn classify_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.classify_path.trim_start_matches('/')
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Limits enforced on a candidate image before it is accepted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    pub max_file_size_bytes: u64,
    pub min_dimension: u32,
    pub max_dimension: u32,
    /// Image format names as understood by the `image` crate extension lookup.
    pub accepted_formats: Vec<String>,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 5 * 1024 * 1024,
            min_dimension: 100,
            max_dimension: 4096,
            accepted_formats: vec!["jpeg".to_string(), "png".to_string()],
        }
    }
}

/// Backoff settings for retryable failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts per submission, the first one included.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 30_000,
            max_delay_ms: 60_000,
        }
    }
}

impl RetrySettings {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Synthetic progress settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressSettings {
    pub cap_percent: u8,
    pub step_percent: u8,
    pub tick_interval_ms: u64,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            cap_percent: 90,
            step_percent: 2,
            tick_interval_ms: 1_000,
        }
    }
}

impl ProgressSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub log_dir: Utf8PathBuf,
    pub log_prefix: String,
    pub debug: bool,
    pub console: bool,
    /// Write the log file as JSON lines instead of plain text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_dir: Utf8PathBuf::from("logs"),
            log_prefix: "dental-classifier".to_string(),
            debug: false,
            console: false,
            json: false,
        }
    }
}

impl ClassifierConfig {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let endpoint = &self.endpoint;
        if !(endpoint.base_url.starts_with("http://") || endpoint.base_url.starts_with("https://"))
        {
            bail!(
                "endpoint.base_url must be an http(s) URL, got '{}'",
                endpoint.base_url
            );
        }
        if endpoint.request_timeout_secs == 0 || endpoint.connect_timeout_secs == 0 {
            bail!("endpoint timeouts must be greater than zero");
        }

        let validation = &self.validation;
        if validation.max_file_size_bytes == 0 {
            bail!("validation.max_file_size_bytes must be greater than zero");
        }
        if validation.min_dimension > validation.max_dimension {
            bail!(
                "validation.min_dimension ({}) exceeds validation.max_dimension ({})",
                validation.min_dimension,
                validation.max_dimension
            );
        }
        if validation.accepted_formats.is_empty() {
            bail!("validation.accepted_formats must name at least one format");
        }
        for name in &validation.accepted_formats {
            if image::ImageFormat::from_extension(name.to_ascii_lowercase()).is_none() {
                bail!("validation.accepted_formats contains unknown format '{}'", name);
            }
        }

        let retry = &self.retry;
        if retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        if retry.initial_delay_ms > retry.max_delay_ms {
            bail!(
                "retry.initial_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                retry.initial_delay_ms,
                retry.max_delay_ms
            );
        }

        let progress = &self.progress;
        if progress.cap_percent == 0 || progress.cap_percent >= 100 {
            bail!("progress.cap_percent must be between 1 and 99");
        }
        if progress.step_percent == 0 || progress.tick_interval_ms == 0 {
            bail!("progress step and tick interval must be greater than zero");
        }

        Ok(())
    }
}
