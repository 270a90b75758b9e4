//! Configuration for the analysis worker.
//!
//! Every section has defaults, so an empty or missing file is valid.
//! Secrets never live here: the unwrap-service token comes from the
//! environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::context::ContextSettings;
use crate::error::PlotwiseError;
use crate::llm::{AnthropicAdapter, AnthropicConfig, OpenAiAdapter, OpenAiConfig, Providers};
use crate::pipeline::{
    DEFAULT_WEATHER_STALENESS_SECS, DailySchedule, PipelineSettings, RetryPolicies, WorkerSettings,
};
use crate::plotwise_dirs;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotwiseConfig {
    /// Database locations.
    pub database: DatabaseConfig,
    /// Daily trigger time (UTC).
    pub schedule: DailySchedule,
    /// Worker loops per job kind.
    pub workers: WorkerSettings,
    /// Retry, backoff and expiry per job kind.
    pub retry: RetryPolicies,
    /// Provider endpoints and models.
    pub providers: ProvidersConfig,
    pub weather: WeatherConfig,
    pub photos: PhotosConfig,
    /// History limits for the analysis context.
    pub context: ContextSettings,
    pub credentials: CredentialsConfig,
}

/// SQLite file locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Garden store database.
    pub store_path: PathBuf,
    /// Job queue database. May be the same file as the store.
    pub queue_path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            store_path: plotwise_dirs::store_file(),
            queue_path: plotwise_dirs::queue_file(),
        }
    }
}

/// Primary and fallback provider settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub primary: PrimaryProviderConfig,
    pub fallback: FallbackProviderConfig,
}

/// Anthropic Messages API settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimaryProviderConfig {
    pub base_url: String,
    pub model: String,
    /// Value of the `anthropic-version` header.
    pub api_version: String,
    pub max_tokens: u32,
    /// Must stay below the zone job's `expire_in_secs`.
    pub timeout_secs: u64,
}

impl Default for PrimaryProviderConfig {
    fn default() -> Self {
        let defaults = AnthropicConfig::default();
        Self {
            base_url: defaults.base_url,
            model: defaults.model,
            api_version: defaults.api_version,
            max_tokens: defaults.max_tokens,
            timeout_secs: defaults.timeout_secs,
        }
    }
}

impl PrimaryProviderConfig {
    pub fn adapter_config(&self) -> AnthropicConfig {
        AnthropicConfig::new(&self.model)
            .with_base_url(&self.base_url)
            .with_api_version(&self.api_version)
            .with_max_tokens(self.max_tokens)
            .with_timeout_secs(self.timeout_secs)
    }
}

/// OpenAI Chat Completions settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackProviderConfig {
    pub base_url: String,
    pub model: String,
    /// Optional `OpenAI-Organization` header.
    pub org_id: Option<String>,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for FallbackProviderConfig {
    fn default() -> Self {
        let defaults = OpenAiConfig::default();
        Self {
            base_url: defaults.base_url,
            model: defaults.model,
            org_id: defaults.org_id,
            max_tokens: defaults.max_tokens,
            timeout_secs: defaults.timeout_secs,
        }
    }
}

impl FallbackProviderConfig {
    pub fn adapter_config(&self) -> OpenAiConfig {
        let config = OpenAiConfig::new(&self.model)
            .with_base_url(&self.base_url)
            .with_max_tokens(self.max_tokens)
            .with_timeout_secs(self.timeout_secs);
        match &self.org_id {
            Some(org) => config.with_org_id(org),
            None => config,
        }
    }
}

/// Weather source settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// Open-Meteo API root.
    pub base_url: String,
    /// Cached weather younger than this is reused.
    pub staleness_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.open-meteo.com".to_owned(),
            staleness_secs: DEFAULT_WEATHER_STALENESS_SECS.unsigned_abs(),
        }
    }
}

/// Photo storage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotosConfig {
    /// Photos are addressed as `{base_url}/{storage_key}`.
    pub base_url: String,
}

impl Default for PhotosConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9000/garden-photos".to_owned(),
        }
    }
}

/// Key unwrap service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Endpoint receiving `{ciphertext, iv, authTag}`.
    pub unwrap_url: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            unwrap_url: "http://localhost:8787/v1/keys/unwrap".to_owned(),
        }
    }
}

impl PlotwiseConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| PlotwiseError::Config(e.to_string()))
    }

    /// Load from [`plotwise_dirs::config_file`]; a missing file yields defaults.
    pub fn load() -> crate::error::Result<Self> {
        let path = plotwise_dirs::config_file();
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file; using defaults");
            return Ok(Self::default());
        }
        tracing::info!(path = %path.display(), "loading config");
        Self::from_file(&path)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    pub fn save_to_file(&self, path: &Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| PlotwiseError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        let staleness = i64::try_from(self.weather.staleness_secs).unwrap_or(i64::MAX);
        PipelineSettings {
            schedule: self.schedule,
            workers: self.workers,
            retry: self.retry,
            context: self.context.clone(),
            weather_staleness: Some(
                chrono::Duration::try_seconds(staleness).unwrap_or(chrono::Duration::MAX),
            ),
        }
    }

    /// Build both provider adapters.
    pub fn providers(&self) -> Providers {
        Providers::new(
            Arc::new(AnthropicAdapter::new(self.providers.primary.adapter_config())),
            Arc::new(OpenAiAdapter::new(self.providers.fallback.adapter_config())),
        )
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::llm::providers::{anthropic, openai};

    #[test]
    fn default_config_is_valid() {
        let config = PlotwiseConfig::default();
        assert_eq!(config.providers.primary.model, anthropic::DEFAULT_MODEL);
        assert_eq!(config.providers.fallback.model, openai::DEFAULT_MODEL);
        assert_eq!(config.weather.staleness_secs, 3 * 60 * 60);
        assert_eq!(config.retry.zone.retry_limit, 3);
        assert!(config.workers.zone.concurrency > 0);
        assert_eq!(config.context.care_log_days, 14);
    }

    #[test]
    fn provider_timeouts_fit_inside_zone_expiry() {
        let config = PlotwiseConfig::default();
        let expiry = config.retry.zone.expire_in_secs;
        assert!(config.providers.primary.timeout_secs < expiry);
        assert!(config.providers.fallback.timeout_secs < expiry);
        assert_eq!(config.providers.primary.adapter_config().timeout_secs, 120);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config: PlotwiseConfig = toml::from_str(
            r#"
            [schedule]
            hour = 4
            minute = 15

            [providers.fallback]
            model = "gpt-4o-mini"
            org_id = "org-garden"

            [retry.zone]
            retry_limit = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.schedule, DailySchedule { hour: 4, minute: 15 });
        assert_eq!(config.providers.fallback.model, "gpt-4o-mini");
        assert_eq!(config.providers.primary, PrimaryProviderConfig::default());
        assert_eq!(config.retry.zone.retry_limit, 5);
        assert_eq!(config.retry.zone.expire_in_secs, crate::queue::DEFAULT_EXPIRE_IN_SECS);

        let openai = config.providers.fallback.adapter_config();
        assert_eq!(openai.org_id.as_deref(), Some("org-garden"));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = PlotwiseConfig::default();
        config.schedule.hour = 22;
        config.photos.base_url = "https://cdn.example/photos".into();
        config.save_to_file(&path).unwrap();

        let loaded = PlotwiseConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is not valid toml {{{").unwrap();
        assert!(matches!(
            PlotwiseConfig::from_file(&path),
            Err(PlotwiseError::Config(_))
        ));
    }

    #[test]
    fn pipeline_settings_carry_staleness() {
        let mut config = PlotwiseConfig::default();
        config.weather.staleness_secs = 600;
        let settings = config.pipeline_settings();
        assert_eq!(settings.weather_staleness, Some(chrono::Duration::seconds(600)));
        assert_eq!(settings.retry, config.retry);
    }
}
