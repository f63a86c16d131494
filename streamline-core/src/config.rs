//! Service configuration.
//!
//! [`ServiceConfiguration`] is built once at application start and then
//! shared read-only (usually behind an `Arc`) by every service. It must be
//! fully constructed before the first request is issued.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::CoreError;

/// User agent sent when the application does not provide one.
pub const DEFAULT_USER_AGENT: &str = concat!("Streamline/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Language
// ============================================================================

/// Language used for user-facing messages and the `lang` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Language {
    /// Brazilian Portuguese.
    #[serde(rename = "pt-BR", alias = "ptBR")]
    PtBr,
    /// American English.
    #[default]
    #[serde(rename = "en-US", alias = "enUS")]
    EnUs,
}

impl Language {
    /// BCP 47 tag for the language.
    pub fn locale_tag(&self) -> &'static str {
        match self {
            Self::PtBr => "pt-BR",
            Self::EnUs => "en-US",
        }
    }
}

impl std::str::FromStr for Language {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "pt-br" | "ptbr" | "pt" => Ok(Self::PtBr),
            "en-us" | "enus" | "en" => Ok(Self::EnUs),
            other => Err(CoreError::InvalidConfig(format!("unsupported language: {other}"))),
        }
    }
}

// ============================================================================
// Custom Base URL
// ============================================================================

/// Per-service base URL override. Takes precedence over the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomBaseUrl {
    /// Base URL including the scheme.
    pub base_url: String,
    /// Optional port. When absent the URL has no port segment at all.
    #[serde(default)]
    pub port: Option<u16>,
}

impl CustomBaseUrl {
    /// Creates an override without a port.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            port: None,
        }
    }

    /// Sets the port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }
}

// ============================================================================
// Service Configuration
// ============================================================================

/// Process-wide settings read by every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfiguration {
    /// Base URL including the scheme, e.g. `https://api.example.com`.
    pub base_url: String,
    /// Optional port appended to the base URL.
    #[serde(default)]
    pub port: Option<u16>,
    /// Optional API key sent as `X-API-Key`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Language for messages and the `lang` header.
    #[serde(default)]
    pub language: Language,
    /// Value of the `user-agent` header.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Where downloaded artifacts are stored.
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl ServiceConfiguration {
    /// Creates a configuration with defaults for everything but the base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            port: None,
            api_key: None,
            language: Language::default(),
            user_agent: default_user_agent(),
            download_dir: None,
        }
    }

    /// Creates a builder.
    pub fn builder(base_url: impl Into<String>) -> ServiceConfigurationBuilder {
        ServiceConfigurationBuilder {
            config: Self::new(base_url),
        }
    }

    /// Loads and validates a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// fails [`ServiceConfiguration::validate`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the base URL is usable.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] for an empty base URL or one
    /// without an `http`/`https` scheme.
    pub fn validate(&self) -> Result<(), CoreError> {
        let base = self.base_url.trim();
        if base.is_empty() {
            return Err(CoreError::InvalidConfig("base URL is empty".to_string()));
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(CoreError::InvalidConfig(format!(
                "base URL must start with http:// or https://: {base}"
            )));
        }
        Ok(())
    }
}

/// Builder for [`ServiceConfiguration`].
#[derive(Debug, Clone)]
pub struct ServiceConfigurationBuilder {
    config: ServiceConfiguration,
}

impl ServiceConfigurationBuilder {
    /// Sets the port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = Some(port);
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.api_key = Some(api_key.into());
        self
    }

    /// Sets the language.
    #[must_use]
    pub fn language(mut self, language: Language) -> Self {
        self.config.language = language;
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Sets the download directory.
    #[must_use]
    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.download_dir = Some(dir.into());
        self
    }

    /// Validates and returns the configuration.
    ///
    /// # Errors
    ///
    /// See [`ServiceConfiguration::validate`].
    pub fn build(self) -> Result<ServiceConfiguration, CoreError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = ServiceConfiguration::builder("https://api.example.com")
            .build()
            .unwrap();
        assert_eq!(config.port, None);
        assert_eq!(config.api_key, None);
        assert_eq!(config.language, Language::EnUs);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_builder_rejects_bad_base_url() {
        assert!(ServiceConfiguration::builder("").build().is_err());
        assert!(ServiceConfiguration::builder("api.example.com").build().is_err());
    }

    #[test]
    fn test_deserialize_from_json() {
        let config: ServiceConfiguration = serde_json::from_str(
            r#"{"baseUrl":"http://localhost","port":8080,"apiKey":"k","language":"pt-BR"}"#,
        )
        .unwrap();
        assert_eq!(config.port, Some(8080));
        assert_eq!(config.api_key.as_deref(), Some("k"));
        assert_eq!(config.language, Language::PtBr);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_language_parsing() {
        assert_eq!("pt_BR".parse::<Language>().unwrap(), Language::PtBr);
        assert_eq!("en".parse::<Language>().unwrap(), Language::EnUs);
        assert!("fr".parse::<Language>().is_err());
        assert_eq!(Language::PtBr.locale_tag(), "pt-BR");
    }
}
