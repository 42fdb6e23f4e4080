use crate::backoff::ExponentialBackoff;
use crate::config::error::{ConfigError, Result};
use crate::policy::RetryPolicy;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Serializable retry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay after the first failure in milliseconds
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Delay ceiling in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Growth factor between consecutive delays
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f32,

    /// Randomize delays within the bounds
    #[serde(default)]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    crate::policy::DEFAULT_MAX_ATTEMPTS
}
fn default_min_delay_ms() -> u64 {
    crate::policy::DEFAULT_MIN_DELAY.as_millis() as u64
}
fn default_max_delay_ms() -> u64 {
    crate::policy::DEFAULT_MAX_DELAY.as_millis() as u64
}
fn default_backoff_factor() -> f32 {
    2.0
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_factor: default_backoff_factor(),
            jitter: false,
        }
    }
}

impl RetrySettings {
    /// Reject values that cannot describe a usable policy.
    ///
    /// `max_delay_ms < min_delay_ms` is allowed; delays collapse to the floor.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.min_delay_ms == 0 {
            return Err(ConfigError::ValidationError(
                "min_delay_ms must be greater than 0".to_string(),
            ));
        }
        if self.backoff_factor.is_nan() || self.backoff_factor < 1.0 {
            return Err(ConfigError::ValidationError(format!(
                "backoff_factor must be >= 1.0, got {}",
                self.backoff_factor
            )));
        }
        Ok(())
    }

    pub fn to_policy(&self) -> RetryPolicy {
        let mut backoff = ExponentialBackoff::new().with_factor(self.backoff_factor);
        if self.jitter {
            backoff = backoff.with_jitter();
        }

        RetryPolicy::default()
            .with_max_attempts(self.max_attempts)
            .with_min_delay(Duration::from_millis(self.min_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_delay_calculator(backoff)
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(settings: RetrySettings) -> Self {
        settings.to_policy()
    }
}

/// Settings loader with layered merging support
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new ConfigLoader
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load settings with layered merging:
    /// 1. Start with defaults
    /// 2. Merge config file if provided
    /// 3. Override with environment variables (RETRY_ prefix)
    pub fn load(&self) -> Result<RetrySettings> {
        let mut builder = Config::builder();

        let defaults_json = serde_json::to_string(&RetrySettings::default())?;
        builder = builder.add_source(File::from_str(&defaults_json, config::FileFormat::Json));

        if let Some(ref path) = self.config_path {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            } else {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
        }

        // Example: RETRY_MAX_ATTEMPTS=5
        builder = builder.add_source(
            Environment::with_prefix("RETRY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: RetrySettings = builder.build()?.try_deserialize()?;
        settings.validate()?;

        tracing::debug!(
            max_attempts = settings.max_attempts,
            min_delay_ms = settings.min_delay_ms,
            max_delay_ms = settings.max_delay_ms,
            "loaded retry settings"
        );

        Ok(settings)
    }

    /// Locate the default config file:
    /// 1. Current directory: ./retry.toml
    /// 2. XDG config: ~/.config/codex-retry/config.toml
    /// 3. Home directory: ~/.codex-retry.toml
    pub fn find_config_file() -> Option<PathBuf> {
        let cwd_config = PathBuf::from("./retry.toml");
        if cwd_config.exists() {
            return Some(cwd_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("codex-retry").join("config.toml");
            if xdg_config.exists() {
                return Some(xdg_config);
            }
        }

        if let Some(home_dir) = dirs::home_dir() {
            let home_config = home_dir.join(".codex-retry.toml");
            if home_config.exists() {
                return Some(home_config);
            }
        }

        None
    }

    /// Load settings from the first file [`find_config_file`](Self::find_config_file)
    /// turns up, or from defaults and environment alone.
    ///
    /// Meant for binaries that own their working directory and user config.
    /// Libraries embedding the retry loop should pass an explicit path to
    /// [`with_file`](Self::with_file) instead, so a stray `retry.toml` in the
    /// caller's directory cannot change their policy.
    pub fn load_default() -> Result<RetrySettings> {
        let loader = match Self::find_config_file() {
            Some(config_path) => ConfigLoader::new().with_file(config_path),
            None => ConfigLoader::new(),
        };

        loader.load()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
