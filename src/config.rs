use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::logging::LogFormat;
use crate::notification::Platform;

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub settings: SettingsConfig,
    pub notifications: NotificationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout_secs: u64,
    /// Capacity of the change feed backing live subscriptions
    pub event_buffer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Directory of the local key-value settings store
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub delay_secs: u64,
    pub fallback_title: String,
    pub vibration_pattern_ms: Vec<u64>,
    pub platform: Platform,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<String>,
    /// Console format, "text" or "json"
    pub format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                url: "sqlite:data/chat.db".to_string(),
                max_connections: 8,
                connection_timeout_secs: 30,
                event_buffer: 256,
            },
            settings: SettingsConfig {
                path: "data/settings".to_string(),
            },
            notifications: NotificationConfig {
                delay_secs: 1,
                fallback_title: "New message".to_string(),
                vibration_pattern_ms: vec![0, 250, 250, 250],
                platform: Platform::Android,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        let builder = Self::defaults_builder()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(File::with_name("config").required(false));

        Self::finish(builder)
    }

    /// Load configuration from an explicit file on top of the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let builder = Self::defaults_builder()?.add_source(File::from(path).required(true));
        Self::finish(builder)
    }

    fn defaults_builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        let defaults = Config::try_from(&Self::default())
            .map_err(|e| anyhow::anyhow!("Failed to build default configuration: {}", e))?;
        Ok(Config::builder().add_source(defaults))
    }

    fn finish(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let config = builder
            // Add environment variables with prefix, e.g. MARKET_CHAT__STORE__URL
            .add_source(Environment::with_prefix("MARKET_CHAT").prefix_separator("__").separator("__"))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Failed to deserialize configuration: {}", e))?;

        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.store.url.trim().is_empty() {
            return Err(anyhow::anyhow!("store.url must not be empty"));
        }
        if self.store.max_connections == 0 {
            return Err(anyhow::anyhow!("max_connections must be greater than 0"));
        }
        if self.store.connection_timeout_secs == 0 {
            return Err(anyhow::anyhow!("connection_timeout_secs must be greater than 0"));
        }
        if self.store.event_buffer == 0 {
            return Err(anyhow::anyhow!("event_buffer must be greater than 0"));
        }

        if self.settings.path.trim().is_empty() {
            return Err(anyhow::anyhow!("settings.path must not be empty"));
        }

        if self.notifications.fallback_title.trim().is_empty() {
            return Err(anyhow::anyhow!("fallback_title must not be empty"));
        }
        if self.notifications.delay_secs > 60 {
            return Err(anyhow::anyhow!("delay_secs must be at most 60"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            ));
        }

        self.logging.format.parse::<LogFormat>()?;

        Ok(())
    }

    /// Get database URL from environment or config
    pub fn get_database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| self.store.url.clone())
    }

    /// Get log level from environment or config
    pub fn get_log_level(&self) -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| self.logging.level.clone())
    }

    /// Render the effective configuration as YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.store.url, "sqlite:data/chat.db");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.notifications.delay_secs, 1);
    }

    #[test]
    fn test_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = AppConfig::default();
        config.store.max_connections = 0;
        assert!(config.validate().is_err());
    }
}
