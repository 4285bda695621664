//! Configuration: YAML file plus environment overrides.
//!
//! Precedence is env > file > defaults, matching how the daemon is deployed
//! (a checked-in config file with credentials injected by the service
//! manager). Validation runs once at startup and is fatal; the trigger loop
//! assumes a coherent config.

use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid value {value:?} for {var}")]
    InvalidEnv { var: String, value: String },

    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub acrcloud: AcrCloudSection,
    pub audio: AudioSection,
    pub lametric: LaMetricSection,
    pub recognition: RecognitionSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AcrCloudSection {
    pub access_key: String,
    pub access_secret: String,
    pub host: String,
}

impl Default for AcrCloudSection {
    fn default() -> Self {
        Self {
            access_key: String::new(),
            access_secret: String::new(),
            host: "identify-ap-southeast-1.acrcloud.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioSection {
    pub input_device: Option<String>,
    pub sample_rate: u32,
    pub volume_threshold_db: f32,
    pub silence_threshold_db: f32,
    pub silence_duration_sec: f64,
    pub recognition_duration_sec: f64,
}

impl Default for AudioSection {
    fn default() -> Self {
        Self {
            input_device: None,
            sample_rate: 44_100,
            volume_threshold_db: -40.0,
            silence_threshold_db: -50.0,
            silence_duration_sec: 5.0,
            recognition_duration_sec: 10.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LaMetricSection {
    pub ip: Option<String>,
    pub api_key: String,
    pub icon: String,
    /// Display duration in milliseconds; the device default applies when
    /// unset.
    pub lifetime: Option<u64>,
    /// 0 keeps the notification until dismissed.
    pub cycles: u32,
}

impl Default for LaMetricSection {
    fn default() -> Self {
        Self {
            ip: None,
            api_key: String::new(),
            icon: "i9218".to_string(),
            lifetime: None,
            cycles: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecognitionSection {
    pub cooldown_sec: u64,
    pub max_failed_attempts: u32,
    pub pause_duration_sec: u64,
}

impl Default for RecognitionSection {
    fn default() -> Self {
        Self {
            cooldown_sec: 120,
            max_failed_attempts: 3,
            pause_duration_sec: 900,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub log_file_path: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            log_file_path: "./recognition_log.json".to_string(),
        }
    }
}

impl AppConfig {
    /// Load, override from the process environment, and validate. An
    /// explicitly given path must exist; the default `config.yaml` is
    /// optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default = Path::new("config.yaml");
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Apply environment overrides through an injected lookup, so tests can
    /// drive this without touching the process environment.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("ACRCLOUD_ACCESS_KEY") {
            self.acrcloud.access_key = v;
        }
        if let Some(v) = lookup("ACRCLOUD_ACCESS_SECRET") {
            self.acrcloud.access_secret = v;
        }
        if let Some(v) = lookup("ACRCLOUD_HOST") {
            self.acrcloud.host = v;
        }

        if let Some(v) = lookup("AUDIO_INPUT_DEVICE") {
            self.audio.input_device = Some(v);
        }
        if let Some(v) = lookup("AUDIO_SAMPLE_RATE") {
            self.audio.sample_rate = parse_env("AUDIO_SAMPLE_RATE", v)?;
        }
        if let Some(v) = lookup("VOLUME_THRESHOLD_DB") {
            self.audio.volume_threshold_db = parse_env("VOLUME_THRESHOLD_DB", v)?;
        }
        if let Some(v) = lookup("SILENCE_THRESHOLD_DB") {
            self.audio.silence_threshold_db = parse_env("SILENCE_THRESHOLD_DB", v)?;
        }
        if let Some(v) = lookup("SILENCE_DURATION_SEC") {
            self.audio.silence_duration_sec = parse_env("SILENCE_DURATION_SEC", v)?;
        }
        if let Some(v) = lookup("RECOGNITION_DURATION_SEC") {
            self.audio.recognition_duration_sec = parse_env("RECOGNITION_DURATION_SEC", v)?;
        }

        if let Some(v) = lookup("LAMETRIC_IP") {
            self.lametric.ip = Some(v);
        }
        if let Some(v) = lookup("LAMETRIC_API_KEY") {
            self.lametric.api_key = v;
        }
        if let Some(v) = lookup("LAMETRIC_ICON") {
            self.lametric.icon = v;
        }
        if let Some(v) = lookup("LAMETRIC_LIFETIME") {
            self.lametric.lifetime = Some(parse_env("LAMETRIC_LIFETIME", v)?);
        }
        if let Some(v) = lookup("LAMETRIC_CYCLES") {
            self.lametric.cycles = parse_env("LAMETRIC_CYCLES", v)?;
        }

        if let Some(v) = lookup("COOLDOWN_SEC") {
            self.recognition.cooldown_sec = parse_env("COOLDOWN_SEC", v)?;
        }
        if let Some(v) = lookup("MAX_FAILED_ATTEMPTS") {
            self.recognition.max_failed_attempts = parse_env("MAX_FAILED_ATTEMPTS", v)?;
        }
        if let Some(v) = lookup("PAUSE_DURATION_SEC") {
            self.recognition.pause_duration_sec = parse_env("PAUSE_DURATION_SEC", v)?;
        }

        if let Some(v) = lookup("LOG_FILE_PATH") {
            self.logging.log_file_path = v;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.acrcloud.access_key.is_empty() || self.acrcloud.access_secret.is_empty() {
            return Err(ConfigError::Invalid(
                "ACRCloud credentials are required; set ACRCLOUD_ACCESS_KEY and \
                 ACRCLOUD_ACCESS_SECRET or add them to the config file"
                    .to_string(),
            ));
        }

        // The trigger loop relies on a tick never being both silent and a
        // volume trigger; the gap between the thresholds guarantees it.
        if self.audio.silence_threshold_db >= self.audio.volume_threshold_db {
            return Err(ConfigError::Invalid(format!(
                "silence_threshold_db ({}) must be below volume_threshold_db ({})",
                self.audio.silence_threshold_db, self.audio.volume_threshold_db
            )));
        }

        if self.audio.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be positive".to_string()));
        }
        if self.audio.recognition_duration_sec <= 0.0 {
            return Err(ConfigError::Invalid(
                "recognition_duration_sec must be positive".to_string(),
            ));
        }
        if self.audio.silence_duration_sec <= 0.0 {
            return Err(ConfigError::Invalid(
                "silence_duration_sec must be positive".to_string(),
            ));
        }
        if self.recognition.max_failed_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_failed_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_env<T: FromStr>(var: &str, value: String) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidEnv {
        var: var.to_string(),
        value,
    })
}
