use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, ErrorKind, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    ApiKey,
    Secret,
    Uid,
    Password,
}

impl Credential {
    pub fn as_str(&self) -> &'static str {
        match self {
            Credential::ApiKey => "apiKey",
            Credential::Secret => "secret",
            Credential::Uid => "uid",
            Credential::Password => "password",
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub secret: Option<String>,
    pub uid: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "***");
        f.debug_struct("Credentials")
            .field("api_key", &mask(&self.api_key))
            .field("secret", &mask(&self.secret))
            .field("uid", &mask(&self.uid))
            .field("password", &mask(&self.password))
            .finish()
    }
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            secret: Some(secret.into()),
            uid: None,
            password: None,
        }
    }

    fn get(&self, credential: Credential) -> Option<&str> {
        let value = match credential {
            Credential::ApiKey => &self.api_key,
            Credential::Secret => &self.secret,
            Credential::Uid => &self.uid,
            Credential::Password => &self.password,
        };
        value.as_deref().filter(|v| !v.is_empty())
    }

    /// Fails with `AuthenticationError` naming the first missing credential.
    pub fn check_required(&self, exchange: &'static str, required: &[Credential]) -> Result<()> {
        match required.iter().find(|c| self.get(**c).is_none()) {
            Some(missing) => Err(Error::new(
                ErrorKind::AuthenticationError,
                exchange,
                format!("requires \"{}\" credential", missing.as_str()),
            )),
            None => Ok(()),
        }
    }

    pub fn api_key(&self) -> &str {
        self.get(Credential::ApiKey).unwrap_or_default()
    }

    pub fn secret(&self) -> &str {
        self.get(Credential::Secret).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Adapter id, e.g. `alpaca` or `binanceus`.
    pub exchange: String,
    pub credentials: Credentials,
    pub sandbox: bool,
    pub timeout_ms: u64,
    pub recv_window_ms: u64,
    pub client_order_prefix: String,
    pub user_agent: Option<String>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            exchange: "binanceus".to_string(),
            credentials: Credentials::default(),
            sandbox: false,
            timeout_ms: 10_000,
            recv_window_ms: 5_000,
            client_order_prefix: String::new(),
            user_agent: None,
        }
    }
}

impl ExchangeConfig {
    pub fn new(exchange: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn sandbox(mut self, sandbox: bool) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// Layers `.env`, an optional TOML file and `EXCHANGE_*` variables
    /// (`EXCHANGE_CREDENTIALS__API_KEY` and so on), later sources winning.
    pub fn load(path: Option<&Path>) -> std::result::Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("EXCHANGE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }

    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.exchange.trim().is_empty() {
            errors.push("exchange must be set".to_string());
        }
        if self.timeout_ms == 0 {
            errors.push("timeout_ms must be > 0".to_string());
        }
        if self.recv_window_ms == 0 || self.recv_window_ms > 60_000 {
            errors.push("recv_window_ms must be between 1 and 60000".to_string());
        }
        if self.client_order_prefix.len() > 16 {
            errors.push("client_order_prefix must be at most 16 characters".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ExchangeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let config = ExchangeConfig {
            exchange: String::new(),
            timeout_ms: 0,
            recv_window_ms: 0,
            ..ExchangeConfig::default()
        };
        assert_eq!(config.validate().unwrap_err().len(), 3);
    }

    #[test]
    fn test_check_required_names_missing_field() {
        let creds = Credentials {
            api_key: Some("key".into()),
            secret: Some(String::new()),
            ..Credentials::default()
        };
        let err = creds
            .check_required("bittrex", &[Credential::ApiKey, Credential::Secret])
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::AuthenticationError));
        assert!(err.to_string().contains("secret"));
        assert!(creds.check_required("bittrex", &[Credential::ApiKey]).is_ok());
    }

    #[test]
    fn test_debug_masks_secrets() {
        let creds = Credentials::new("my-key", "my-secret");
        let out = format!("{:?}", creds);
        assert!(!out.contains("my-secret"));
        assert!(!out.contains("my-key"));
    }
}
