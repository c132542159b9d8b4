use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::constants::DEFAULT_MAX_POSTS_PER_EMAIL;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Polling
    pub poll_interval: Duration,
    pub poll_on_startup: bool,
    pub max_posts_per_email: usize,

    // Forum fetching
    pub fetch_timeout: Duration,
    pub fetch_max_attempts: u32,

    // Storage
    pub storage: StorageBackend,
    pub store_max_attempts: u32,

    // Email
    pub email_provider: EmailProviderKind,
    pub brevo_api_key: Option<String>,
    pub brevo_api_url: String,
    pub mail_from_address: Option<String>,
    pub mail_from_name: String,
    pub email_max_attempts: u32,
    pub base_url: String,

    // Subscriptions
    /// Key for deriving subscription tokens from email addresses.
    pub token_salt: String,

    // Web Server
    pub web_host: String,
    pub web_port: u16,
}

/// Where subscription documents live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// One JSON file per subscriber in a local directory.
    Local { path: PathBuf },
    /// One object per subscriber in an S3-compatible bucket.
    S3 {
        bucket: String,
        region: String,
        endpoint: Option<String>,
        prefix: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailProviderKind {
    /// Log emails instead of sending them
    Mock,
    /// Send through the Brevo transactional API
    Brevo,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables are present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Polling
            poll_interval: Duration::from_secs(parse_env_u64("POLL_INTERVAL_SECS", 60)?),
            poll_on_startup: parse_env_bool("POLL_ON_STARTUP", true)?,
            max_posts_per_email: parse_env_usize(
                "MAX_POSTS_PER_EMAIL",
                DEFAULT_MAX_POSTS_PER_EMAIL,
            )?,

            // Forum fetching
            fetch_timeout: Duration::from_secs(parse_env_u64("FETCH_TIMEOUT_SECS", 30)?),
            fetch_max_attempts: parse_env_u32("FETCH_MAX_ATTEMPTS", 10)?,

            // Storage
            storage: storage_from_env(),
            store_max_attempts: parse_env_u32("STORE_MAX_ATTEMPTS", 3)?,

            // Email
            email_provider: parse_email_provider(&env_or_default("EMAIL_PROVIDER", "mock"))?,
            brevo_api_key: optional_env("BREVO_API_KEY"),
            brevo_api_url: env_or_default("BREVO_API_URL", "https://api.brevo.com/v3/smtp/email"),
            mail_from_address: optional_env("MAIL_FROM_ADDRESS"),
            mail_from_name: env_or_default("MAIL_FROM_NAME", "Thread Notifier"),
            email_max_attempts: parse_env_u32("EMAIL_MAX_ATTEMPTS", 3)?,
            base_url: env_or_default("BASE_URL", "http://localhost:8080"),

            // Subscriptions
            token_salt: optional_env("TOKEN_SALT").unwrap_or_default(),

            // Web Server
            web_host: env_or_default("WEB_HOST", "0.0.0.0"),
            web_port: parse_env_u16("WEB_PORT", 8080)?,
        })
    }

    /// Configuration with local storage and mock email, for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            poll_on_startup: false,
            max_posts_per_email: DEFAULT_MAX_POSTS_PER_EMAIL,
            fetch_timeout: Duration::from_secs(10),
            fetch_max_attempts: 1,
            storage: StorageBackend::Local {
                path: PathBuf::from("./data/test"),
            },
            store_max_attempts: 1,
            email_provider: EmailProviderKind::Mock,
            brevo_api_key: None,
            brevo_api_url: "http://localhost:9/v3/smtp/email".to_string(),
            mail_from_address: None,
            mail_from_name: "Thread Notifier".to_string(),
            email_max_attempts: 1,
            base_url: "http://localhost:8080".to_string(),
            token_salt: "test-salt".to_string(),
            web_host: "127.0.0.1".to_string(),
            web_port: 8080,
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, attempts) in [
            ("FETCH_MAX_ATTEMPTS", self.fetch_max_attempts),
            ("STORE_MAX_ATTEMPTS", self.store_max_attempts),
            ("EMAIL_MAX_ATTEMPTS", self.email_max_attempts),
        ] {
            if attempts == 0 {
                return Err(ConfigError::InvalidValue {
                    name: name.to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
        }
        if self.max_posts_per_email == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MAX_POSTS_PER_EMAIL".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "POLL_INTERVAL_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if let StorageBackend::S3 { bucket, .. } = &self.storage {
            if bucket.is_empty() {
                return Err(ConfigError::InvalidValue {
                    name: "S3_BUCKET".to_string(),
                    message: "cannot be empty".to_string(),
                });
            }
        }
        if self.email_provider == EmailProviderKind::Brevo {
            if self.brevo_api_key.is_none() {
                return Err(ConfigError::MissingEnvVar("BREVO_API_KEY".to_string()));
            }
            if self.mail_from_address.is_none() {
                return Err(ConfigError::MissingEnvVar("MAIL_FROM_ADDRESS".to_string()));
            }
        }
        Ok(())
    }
}

/// Local storage wins when both are configured; with neither, default to `./data`.
fn storage_from_env() -> StorageBackend {
    if let Some(path) = optional_env("LOCAL_STORAGE") {
        return StorageBackend::Local {
            path: PathBuf::from(path),
        };
    }
    match optional_env("S3_BUCKET") {
        Some(bucket) => StorageBackend::S3 {
            bucket,
            region: env_or_default("S3_REGION", "us-east-1"),
            endpoint: optional_env("S3_ENDPOINT"),
            prefix: env_or_default("S3_PREFIX", "subscriptions/"),
        },
        None => StorageBackend::Local {
            path: PathBuf::from("./data"),
        },
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u16(name: &str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}

fn parse_email_provider(value: &str) -> Result<EmailProviderKind, ConfigError> {
    match value.to_lowercase().as_str() {
        "mock" => Ok(EmailProviderKind::Mock),
        "brevo" => Ok(EmailProviderKind::Brevo),
        _ => Err(ConfigError::InvalidValue {
            name: "EMAIL_PROVIDER".to_string(),
            message: format!("must be 'mock' or 'brevo', got '{value}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_email_provider() {
        assert_eq!(parse_email_provider("mock").unwrap(), EmailProviderKind::Mock);
        assert_eq!(parse_email_provider("BREVO").unwrap(), EmailProviderKind::Brevo);
        assert!(parse_email_provider("smtp").is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_env_bool("NONEXISTENT_VAR", true).unwrap());
        assert!(!parse_env_bool("NONEXISTENT_VAR", false).unwrap());
    }

    #[test]
    fn test_testing_config_is_valid() {
        assert!(Config::for_testing().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let config = Config {
            fetch_max_attempts: 0,
            ..Config::for_testing()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { name, .. }) if name == "FETCH_MAX_ATTEMPTS"
        ));
    }

    #[test]
    fn test_validate_brevo_requires_credentials() {
        let config = Config {
            email_provider: EmailProviderKind::Brevo,
            ..Config::for_testing()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingEnvVar(name)) if name == "BREVO_API_KEY"
        ));

        let config = Config {
            email_provider: EmailProviderKind::Brevo,
            brevo_api_key: Some("key".to_string()),
            mail_from_address: Some("noreply@example.com".to_string()),
            ..Config::for_testing()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_bucket() {
        let config = Config {
            storage: StorageBackend::S3 {
                bucket: String::new(),
                region: "us-east-1".to_string(),
                endpoint: None,
                prefix: "subscriptions/".to_string(),
            },
            ..Config::for_testing()
        };
        assert!(config.validate().is_err());
    }
}
