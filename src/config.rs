use anyhow::{Result, anyhow};
use serde::Deserialize;
use std::env;
use tracing::{info, warn};

use crate::review_service::StudyLimits;
use crate::validation::{MAX_NEW_CARDS_LIMIT, MAX_REVIEW_CARDS_LIMIT};
use crate::{log_system_event, log_validation};

/// Complete application configuration loaded from environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub study: StudyConfig,
}

/// Database connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Logging system configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

/// Default study queue sizes
#[derive(Debug, Clone, Deserialize)]
pub struct StudyConfig {
    pub max_new_cards: i64,
    pub max_review_cards: i64,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        log_system_event!(config, "Loading application configuration from environment variables");

        let config = Config {
            database: DatabaseConfig::from_env()?,
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            study: StudyConfig::from_env()?,
        };

        log_system_event!(config, "Configuration loaded successfully");
        config.log_configuration_summary();

        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data)
    fn log_configuration_summary(&self) {
        info!(
            database_url_masked = %mask_sensitive_data(&self.database.url),
            server_address = %self.server.address(),
            log_level = %self.logging.level,
            max_new_cards = self.study.max_new_cards,
            max_review_cards = self.study.max_review_cards,
            "Configuration summary"
        );
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.database.url.starts_with("sqlite:") {
            return Err(anyhow!("DATABASE_URL must start with 'sqlite:'"));
        }

        if self.server.port == 0 {
            return Err(anyhow!("Server port must be greater than 0"));
        }

        if !(0..=MAX_NEW_CARDS_LIMIT).contains(&self.study.max_new_cards) {
            return Err(anyhow!(
                "MAX_NEW_CARDS must be between 0 and {}",
                MAX_NEW_CARDS_LIMIT
            ));
        }
        if !(0..=MAX_REVIEW_CARDS_LIMIT).contains(&self.study.max_review_cards) {
            return Err(anyhow!(
                "MAX_REVIEW_CARDS must be between 0 and {}",
                MAX_REVIEW_CARDS_LIMIT
            ));
        }

        if !self.logging.file_enabled && !self.logging.console_enabled {
            warn!("Both file and console logging are disabled - no log output will be produced");
        }

        log_validation!(success, "configuration", "Configuration validation completed successfully");
        Ok(())
    }
}

impl DatabaseConfig {
    fn from_env() -> Result<Self> {
        let url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:flashcard_review.db".to_string());

        Ok(DatabaseConfig { url })
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        let port_str = env::var("PORT").unwrap_or_else(|_| "3000".to_string());

        let port = port_str.parse::<u16>().map_err(|_| {
            anyhow!("Invalid PORT value: '{}'. Must be a number between 1-65535", port_str)
        })?;

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        Ok(ServerConfig { port, host })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl LoggingConfig {
    fn from_env() -> Result<Self> {
        let level = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info,flashcard_review=debug".to_string());

        let file_enabled = parse_bool_var("LOG_FILE_ENABLED", true);
        let console_enabled = parse_bool_var("LOG_CONSOLE_ENABLED", true);

        let log_directory = env::var("LOG_DIRECTORY").unwrap_or_else(|_| "logs".to_string());

        Ok(LoggingConfig {
            level,
            file_enabled,
            console_enabled,
            log_directory,
        })
    }
}

impl StudyConfig {
    fn from_env() -> Result<Self> {
        let defaults = StudyLimits::default();
        Ok(StudyConfig {
            max_new_cards: parse_count_var("MAX_NEW_CARDS", defaults.max_new_cards)?,
            max_review_cards: parse_count_var("MAX_REVIEW_CARDS", defaults.max_review_cards)?,
        })
    }

    pub fn limits(&self) -> StudyLimits {
        StudyLimits {
            max_new_cards: self.max_new_cards,
            max_review_cards: self.max_review_cards,
        }
    }
}

fn parse_bool_var(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<bool>().ok())
        .unwrap_or(default)
}

fn parse_count_var(name: &str, default: i64) -> Result<i64> {
    match env::var(name) {
        Ok(value) => value
            .parse::<i64>()
            .map_err(|_| anyhow!("Invalid {} value: '{}'. Must be an integer", name, value)),
        Err(_) => Ok(default),
    }
}

/// Mask sensitive data in configuration for safe logging
fn mask_sensitive_data(data: &str) -> String {
    let length = data.chars().count();
    if length <= 8 {
        "*".repeat(length)
    } else {
        let head: String = data.chars().take(4).collect();
        let tail: String = data.chars().skip(length - 4).collect();
        format!("{}***{}", head, tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> Config {
        Config {
            database: DatabaseConfig {
                url: "sqlite:test.db".to_string(),
            },
            server: ServerConfig {
                port: 3000,
                host: "0.0.0.0".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_enabled: true,
                console_enabled: true,
                log_directory: "logs".to_string(),
            },
            study: StudyConfig {
                max_new_cards: 10,
                max_review_cards: 100,
            },
        }
    }

    #[test]
    fn test_mask_sensitive_data() {
        assert_eq!(mask_sensitive_data("short"), "*****");
        assert_eq!(mask_sensitive_data("sqlite:flashcard_review.db"), "sqli***e.db");
    }

    #[test]
    fn test_mask_sensitive_data_multibyte() {
        assert_eq!(mask_sensitive_data("日本語のデータベース"), "日本語の***タベース");
        assert_eq!(mask_sensitive_data("sqlite:données/révision.db"), "sqli***n.db");
        assert_eq!(mask_sensitive_data("révisé"), "******");
    }

    #[test]
    fn test_config_validation() {
        let config = sample_config();
        assert!(config.validate().is_ok());

        let mut invalid_port = config.clone();
        invalid_port.server.port = 0;
        assert!(invalid_port.validate().is_err());

        let mut postgres = config.clone();
        postgres.database.url = "postgres://localhost/review".to_string();
        assert!(postgres.validate().is_err());

        let mut too_many_new = config.clone();
        too_many_new.study.max_new_cards = MAX_NEW_CARDS_LIMIT + 1;
        assert!(too_many_new.validate().is_err());
    }

    #[test]
    fn test_study_limits_from_config() {
        let limits = sample_config().study.limits();
        assert_eq!(limits, StudyLimits::default());
    }

    #[test]
    fn test_server_address() {
        assert_eq!(sample_config().server.address(), "0.0.0.0:3000");
    }
}
