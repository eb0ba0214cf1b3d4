use reqwest::Url;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

pub const DEFAULT_SESSION_URL: &str = "http://localhost:3000/session";
pub const DEFAULT_REALTIME_URL: &str = "https://api.openai.com/v1/realtime";
pub const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview-2024-12-17";
pub const DEFAULT_CHANNEL_LABEL: &str = "oai-events";

/// Where a client obtains credentials and negotiates sessions.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    /// The intermediary endpoint minting ephemeral credentials.
    pub session_url: Url,
    /// The remote endpoint accepting SDP offers.
    pub realtime_url: Url,
    pub model: String,
    /// Label of the control channel.
    pub channel_label: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            session_url: Url::parse(DEFAULT_SESSION_URL).expect("default session url is valid"),
            realtime_url: Url::parse(DEFAULT_REALTIME_URL).expect("default realtime url is valid"),
            model: DEFAULT_MODEL.to_string(),
            channel_label: DEFAULT_CHANNEL_LABEL.to_string(),
        }
    }
}

impl ClientConfig {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let session_url = url_var("PARLEY_SESSION_URL", DEFAULT_SESSION_URL)?;
        let realtime_url = url_var("OPENAI_REALTIME_URL", DEFAULT_REALTIME_URL)?;
        let model = std::env::var("REALTIME_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let channel_label = std::env::var("PARLEY_CHANNEL_LABEL")
            .unwrap_or_else(|_| DEFAULT_CHANNEL_LABEL.to_string());

        if model.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "REALTIME_MODEL".to_string(),
                "model must not be empty".to_string(),
            ));
        }
        if channel_label.is_empty() {
            return Err(ConfigError::InvalidValue(
                "PARLEY_CHANNEL_LABEL".to_string(),
                "label must not be empty".to_string(),
            ));
        }

        Ok(Self {
            session_url,
            realtime_url,
            model,
            channel_label,
        })
    }
}

fn url_var(name: &str, default: &str) -> Result<Url, ConfigError> {
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    Url::parse(&raw).map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("PARLEY_SESSION_URL");
            env::remove_var("OPENAI_REALTIME_URL");
            env::remove_var("REALTIME_MODEL");
            env::remove_var("PARLEY_CHANNEL_LABEL");
        }
    }

    #[test]
    #[serial]
    fn test_config_from_env_defaults() {
        clear_env_vars();

        let config = ClientConfig::from_env().expect("Config should load successfully");

        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.session_url.as_str(), "http://localhost:3000/session");
        assert_eq!(config.realtime_url.as_str(), "https://api.openai.com/v1/realtime");
        assert_eq!(config.model, "gpt-4o-realtime-preview-2024-12-17");
        assert_eq!(config.channel_label, "oai-events");
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("PARLEY_SESSION_URL", "https://voice.example.com/session");
            env::set_var("OPENAI_REALTIME_URL", "https://realtime.example.com/v1/realtime");
            env::set_var("REALTIME_MODEL", "gpt-4o-mini-realtime-preview");
            env::set_var("PARLEY_CHANNEL_LABEL", "events");
        }

        let config = ClientConfig::from_env().expect("Config should load successfully");

        assert_eq!(config.session_url.host_str(), Some("voice.example.com"));
        assert_eq!(config.realtime_url.path(), "/v1/realtime");
        assert_eq!(config.model, "gpt-4o-mini-realtime-preview");
        assert_eq!(config.channel_label, "events");
        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_config_invalid_session_url() {
        clear_env_vars();
        unsafe {
            env::set_var("PARLEY_SESSION_URL", "not a url");
        }

        let err = ClientConfig::from_env().unwrap_err();
        let ConfigError::InvalidValue(var, _) = err;
        assert_eq!(var, "PARLEY_SESSION_URL");
        clear_env_vars();
    }

    #[test]
    #[serial]
    fn test_config_empty_model() {
        clear_env_vars();
        unsafe {
            env::set_var("REALTIME_MODEL", "  ");
        }

        let err = ClientConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(var, _) if var == "REALTIME_MODEL"));
        clear_env_vars();
    }
}
