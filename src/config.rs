//! Configuration file parser for ~/.config/habitat/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted but logged, since they are usually typos.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::feed::{PageLimits, SessionConfig};

/// Environment variable that overrides `jwt_secret` from the file.
pub const JWT_SECRET_ENV: &str = "HABITAT_JWT_SECRET";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Settings for both the server (`serve`) and the terminal client (`browse`).
///
/// All fields use `#[serde(default)]`, so any subset of keys can be given.
/// Secrets are masked in `Debug` output.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    // Server
    pub bind_address: String,
    /// SQLite file; `:memory:` for a throwaway database.
    pub database_path: Option<String>,
    pub default_page_size: i64,
    pub max_page_size: i64,
    pub max_images_per_post: usize,
    /// HS256 signing key for bearer tokens. `HABITAT_JWT_SECRET` wins.
    pub jwt_secret: Option<String>,
    pub token_ttl_hours: i64,

    // Client
    pub api_base_url: String,
    /// Bearer token used by `browse` when `--token` is not given.
    pub api_token: Option<String>,
    /// Card height in terminal rows.
    pub item_height: usize,
    /// Rows before the end of loaded content at which the next page is fetched.
    pub fetch_margin: usize,
    /// Rows around the viewport within which images switch from placeholder.
    pub image_margin: usize,
    /// Extra cards rendered above and below the viewport.
    pub overscan: usize,
}

impl Default for Config {
    fn default() -> Self {
        let page = PageLimits::default();
        let session = SessionConfig::default();
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            database_path: None,
            default_page_size: page.default,
            max_page_size: page.max,
            max_images_per_post: 10,
            jwt_secret: None,
            token_ttl_hours: 24 * 7,
            api_base_url: "http://127.0.0.1:8080".to_string(),
            api_token: None,
            item_height: session.item_height,
            fetch_margin: session.fetch_margin,
            image_margin: session.image_margin,
            overscan: session.overscan,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("database_path", &self.database_path)
            .field("default_page_size", &self.default_page_size)
            .field("max_page_size", &self.max_page_size)
            .field("max_images_per_post", &self.max_images_per_post)
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "[REDACTED]"))
            .field("token_ttl_hours", &self.token_ttl_hours)
            .field("api_base_url", &self.api_base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("item_height", &self.item_height)
            .field("fetch_margin", &self.fetch_margin)
            .field("image_margin", &self.image_margin)
            .field("overscan", &self.overscan)
            .finish()
    }
}

const KNOWN_KEYS: &[&str] = &[
    "bind_address",
    "database_path",
    "default_page_size",
    "max_page_size",
    "max_images_per_post",
    "jwt_secret",
    "token_ttl_hours",
    "api_base_url",
    "api_token",
    "item_height",
    "fetch_margin",
    "image_margin",
    "overscan",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing or blank file → defaults
    /// - Invalid TOML → `ConfigError::Parse`
    /// - Out-of-range values → `ConfigError::Invalid`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        let config = Self::parse(&content)?;
        tracing::info!(path = %path.display(), bind = %config.bind_address, "Loaded configuration");
        Ok(config)
    }

    /// Parse TOML text and validate the result.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_page_size < 1 {
            return Err(ConfigError::Invalid(format!(
                "default_page_size must be at least 1 (got {})",
                self.default_page_size
            )));
        }
        if self.max_page_size < self.default_page_size {
            return Err(ConfigError::Invalid(format!(
                "max_page_size ({}) is smaller than default_page_size ({})",
                self.max_page_size, self.default_page_size
            )));
        }
        if self.item_height < 3 {
            return Err(ConfigError::Invalid(format!(
                "item_height must be at least 3 rows (got {})",
                self.item_height
            )));
        }
        if self.token_ttl_hours < 1 {
            return Err(ConfigError::Invalid("token_ttl_hours must be positive".to_string()));
        }
        Ok(())
    }

    pub fn page_limits(&self) -> PageLimits {
        PageLimits {
            default: self.default_page_size,
            max: self.max_page_size,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            item_height: self.item_height,
            fetch_margin: self.fetch_margin,
            image_margin: self.image_margin,
            overscan: self.overscan,
        }
    }

    /// Signing secret: `HABITAT_JWT_SECRET` if set and non-empty, else the
    /// file's `jwt_secret`.
    pub fn jwt_secret(&self) -> Option<SecretString> {
        std::env::var(JWT_SECRET_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| self.jwt_secret.clone())
            .map(SecretString::from)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("habitat_config_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.bind_address, "127.0.0.1:8080");
        assert_eq!(config.default_page_size, 10);
        assert_eq!(config.max_page_size, 50);
        assert_eq!(config.max_images_per_post, 10);
        assert!(config.jwt_secret.is_none());
        assert_eq!(config.page_limits(), PageLimits::default());
        assert_eq!(config.session_config(), SessionConfig::default());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/habitat_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.max_page_size, 50);
    }

    #[test]
    fn test_whitespace_file_returns_default() {
        let path = write_temp("blank", "  \n \n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.default_page_size, 10);
        cleanup(&path);
    }

    #[test]
    fn test_partial_config() {
        let path = write_temp(
            "partial",
            "bind_address = \"0.0.0.0:9000\"\nitem_height = 8\n",
        );
        let config = Config::load(&path).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:9000");
        assert_eq!(config.item_height, 8);
        assert_eq!(config.fetch_margin, SessionConfig::default().fetch_margin);
        cleanup(&path);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let err = Config::parse("this is not [valid toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_wrong_type_returns_error() {
        assert!(matches!(
            Config::parse("max_page_size = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let config = Config::parse("overscan = 2\nnot_a_key = true\n").unwrap();
        assert_eq!(config.overscan, 2);
    }

    #[test]
    fn test_page_size_bounds_checked() {
        assert!(matches!(
            Config::parse("default_page_size = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::parse("default_page_size = 20\nmax_page_size = 5"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::parse("item_height = 1"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_too_large_file_rejected() {
        let path = write_temp("too_large", &"#".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));
        cleanup(&path);
    }

    #[test]
    fn test_debug_masks_secrets() {
        let config = Config {
            jwt_secret: Some("hunter2-signing-key".to_string()),
            api_token: Some("eyJhbGciOi.token".to_string()),
            ..Config::default()
        };
        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("hunter2-signing-key"));
        assert!(!debug_output.contains("eyJhbGciOi.token"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn test_debug_shows_none_without_secrets() {
        let debug_output = format!("{:?}", Config::default());
        assert!(!debug_output.contains("[REDACTED]"));
    }
}
