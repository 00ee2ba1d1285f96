//! Runtime configuration, read from environment variables.
//!
//! `.env` の読み込みはバイナリ側（dotenvy）の責務。ここでは値の解釈だけを行う。

use std::time::Duration;

use thiserror::Error;

use crate::domain::Stage;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTimeouts {
    pub vision: Duration,
    pub generation: Duration,
    pub storage: Duration,
}

impl StageTimeouts {
    pub fn for_stage(&self, stage: Stage) -> Duration {
        match stage {
            Stage::VisionAnalysis => self.vision,
            Stage::ModelGeneration => self.generation,
            Stage::ArtifactStorage => self.storage,
        }
    }

    pub fn uniform(timeout: Duration) -> Self {
        Self {
            vision: timeout,
            generation: timeout,
            storage: timeout,
        }
    }
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            vision: Duration::from_secs(30),
            generation: Duration::from_secs(300),
            storage: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub stage_timeouts: StageTimeouts,
    pub max_upload_bytes: u64,
    /// Root for `LocalObjectStorage`; in-memory storage when unset.
    pub storage_dir: Option<String>,
    pub vision_url: Option<String>,
    pub generation_url: Option<String>,
    pub notify_webhook_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 64,
            stage_timeouts: StageTimeouts::default(),
            max_upload_bytes: 20 * 1024 * 1024,
            storage_dir: None,
            vision_url: None,
            generation_url: None,
            notify_webhook_url: None,
        }
    }
}

fn parse_positive<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialEq + Default,
{
    let Some(value) = raw else {
        return Ok(default);
    };
    let parsed: T = value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.clone(),
        reason: "not a number".into(),
    })?;
    if parsed == T::default() {
        return Err(ConfigError::Invalid {
            key,
            value,
            reason: "must be greater than zero".into(),
        });
    }
    Ok(parsed)
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map here).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let secs = |key: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            parse_positive(key, lookup(key), default.as_secs()).map(Duration::from_secs)
        };

        Ok(Self {
            workers: parse_positive("MODELMAKER_WORKERS", lookup("MODELMAKER_WORKERS"), defaults.workers)?,
            queue_capacity: parse_positive(
                "MODELMAKER_QUEUE_CAPACITY",
                lookup("MODELMAKER_QUEUE_CAPACITY"),
                defaults.queue_capacity,
            )?,
            stage_timeouts: StageTimeouts {
                vision: secs("MODELMAKER_VISION_TIMEOUT_SECS", defaults.stage_timeouts.vision)?,
                generation: secs(
                    "MODELMAKER_GENERATION_TIMEOUT_SECS",
                    defaults.stage_timeouts.generation,
                )?,
                storage: secs("MODELMAKER_STORAGE_TIMEOUT_SECS", defaults.stage_timeouts.storage)?,
            },
            max_upload_bytes: parse_positive(
                "MODELMAKER_MAX_UPLOAD_BYTES",
                lookup("MODELMAKER_MAX_UPLOAD_BYTES"),
                defaults.max_upload_bytes,
            )?,
            storage_dir: non_empty(lookup("MODELMAKER_STORAGE_DIR")),
            vision_url: non_empty(lookup("MODELMAKER_VISION_URL")),
            generation_url: non_empty(lookup("MODELMAKER_GENERATION_URL")),
            notify_webhook_url: non_empty(lookup("MODELMAKER_NOTIFY_WEBHOOK_URL")),
        })
    }
}
