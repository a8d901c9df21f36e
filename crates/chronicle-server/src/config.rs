//! Server configuration.
//!
//! Configuration is loaded from multiple sources with precedence:
//! 1. Environment variables (CHRONICLE_*)
//! 2. Config file (~/.chronicle/config.toml)
//! 3. Default values

use std::path::PathBuf;

use anyhow::Context;
use chronicle_core::{MemoryConfig, ScheduleConfig};
use serde::Deserialize;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP listen address.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Hosted tier store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Summarization engine settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Pipeline thresholds and timezone.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Consolidation schedule.
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`.
    #[serde(default)]
    pub url: String,

    /// Service API key.
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Gemini API key.
    #[serde(default)]
    pub api_key: String,

    /// Model used for summarization.
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

impl Config {
    /// Load configuration from the default file location, then apply
    /// environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Self::config_path())
    }

    /// Load configuration from a specific file, then apply environment
    /// overrides.
    pub fn load_from(path: PathBuf) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
        } else {
            Self::default_with_serde()
        };

        if let Ok(bind) = std::env::var("CHRONICLE_BIND") {
            config.bind = bind;
        }
        if let Ok(url) = std::env::var("CHRONICLE_STORE_URL") {
            config.store.url = url;
        }
        if let Ok(key) = std::env::var("CHRONICLE_STORE_KEY") {
            config.store.api_key = key;
        }
        if let Ok(key) = std::env::var("CHRONICLE_GEMINI_API_KEY") {
            config.engine.api_key = key;
        }
        if let Ok(model) = std::env::var("CHRONICLE_GEMINI_MODEL") {
            config.engine.model = model;
        }
        if let Ok(offset) = std::env::var("CHRONICLE_UTC_OFFSET") {
            config.memory.utc_offset_hours = offset
                .parse()
                .with_context(|| format!("parsing CHRONICLE_UTC_OFFSET={}", offset))?;
        }

        Ok(config)
    }

    /// Config file location: `$CHRONICLE_DIR/config.toml` or
    /// `~/.chronicle/config.toml`.
    pub fn config_path() -> PathBuf {
        let dir = std::env::var("CHRONICLE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".chronicle")
            });
        dir.join("config.toml")
    }

    /// Defaults routed through serde so field-level `default =` functions
    /// stay the single source of truth.
    fn default_with_serde() -> Self {
        toml::from_str("").unwrap_or_default()
    }

    /// Fail fast on settings the pipeline cannot run without.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.store.url.is_empty() {
            anyhow::bail!("store.url is not set (CHRONICLE_STORE_URL)");
        }
        if self.store.api_key.is_empty() {
            anyhow::bail!("store.api_key is not set (CHRONICLE_STORE_KEY)");
        }
        if self.engine.api_key.is_empty() {
            anyhow::bail!("engine.api_key is not set (CHRONICLE_GEMINI_API_KEY)");
        }
        self.memory.local_offset().map_err(anyhow::Error::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default_with_serde();
        assert_eq!(config.bind, "127.0.0.1:8787");
        assert_eq!(config.engine.model, "gemini-2.5-flash");
        assert_eq!(config.memory.buffer_max_events, 40);
    }

    #[test]
    fn test_partial_file_parse() {
        let config: Config = toml::from_str(
            r#"
            bind = "0.0.0.0:9000"

            [store]
            url = "https://example.supabase.co"
            api_key = "secret"

            [memory]
            weekly_batch = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.bind, "0.0.0.0:9000");
        assert_eq!(config.store.url, "https://example.supabase.co");
        assert_eq!(config.memory.weekly_batch, 5);
        assert_eq!(config.memory.monthly_batch, 4);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [memory]
            utc_offset_hours = -3
            buffer_max_events = 25
            "#,
        )
        .unwrap();

        let config = Config::load_from(path).unwrap();
        assert_eq!(config.memory.utc_offset_hours, -3);
        assert_eq!(config.memory.buffer_max_events, 25);

        // Missing file falls back to defaults.
        let config = Config::load_from(dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.memory.buffer_max_events, 40);
    }

    #[test]
    fn test_validate_requires_credentials() {
        let config = Config::default_with_serde();
        assert!(config.validate().is_err());

        let config: Config = toml::from_str(
            r#"
            [store]
            url = "https://example.supabase.co"
            api_key = "k"

            [engine]
            api_key = "k"
            "#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
    }
}
