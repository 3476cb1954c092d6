use core::fmt;

use plugin_core::PluginSpec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Plugin configuration, read from the `config` block of the `jira` plugin
/// spec (upper-case keys).
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct JiraConfig {
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Project new issues go to; also scopes searches and user lookups.
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub oauth_access_token: Option<String>,
    #[serde(default)]
    pub oauth_access_token_secret: Option<String>,
    #[serde(default)]
    pub oauth_consumer_key: Option<String>,
    #[serde(default)]
    pub oauth_key_cert_file: Option<String>,
}

impl fmt::Debug for JiraConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JiraConfig")
            .field("api_url", &self.api_url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("project", &self.project)
            .field("oauth", &self.oauth_access_token.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config validation failed for API_URL, this does not start with http")]
    InvalidApiUrl,
    #[error("Config validation failed for {0}, seems empty or not set")]
    Empty(&'static str),
    #[error("parsing jira config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

impl JiraConfig {
    /// Reads the config from a plugin spec. A spec without a config block
    /// means the plugin is not configured yet.
    pub fn from_spec(spec: &PluginSpec) -> Result<Option<Self>, ConfigError> {
        if spec.config.is_null() {
            return Ok(None);
        }
        let config: Self = serde_yaml::from_value(spec.config.clone())?;
        config.validate()?;
        Ok(Some(config))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.api_url.to_lowercase().starts_with("http") {
            return Err(ConfigError::InvalidApiUrl);
        }
        if self.username.trim().is_empty() {
            return Err(ConfigError::Empty("USERNAME"));
        }
        if self.password.is_empty() {
            return Err(ConfigError::Empty("PASSWORD"));
        }
        if self.project.trim().is_empty() {
            return Err(ConfigError::Empty("PROJECT"));
        }
        Ok(())
    }

    #[must_use]
    pub fn has_oauth(&self) -> bool {
        self.oauth_access_token.is_some()
    }
}
