use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Clone, Deserialize)]
pub struct SmtpConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

#[derive(Clone, Deserialize)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_google_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_google_token_url")]
    pub token_url: String,
    #[serde(default = "default_google_userinfo_url")]
    pub userinfo_url: String,
}

#[derive(Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub smtp: SmtpConfig,
    pub google: GoogleConfig,
    /// Externally reachable base URL of this service, used to build the
    /// callback URL registered with the identity provider.
    pub public_url: String,
    /// Bearer key for the application registry endpoints.
    pub admin_api_key: String,
    /// Minimum delay between verification requests for the same
    /// (application, email) pair.
    #[serde(default = "default_min_delay_secs")]
    pub min_delay_between_verification_secs: i64,
    /// Expiry assigned to newly registered applications unless they override it.
    #[serde(default = "default_token_expiry_secs")]
    pub default_token_expiry_secs: i64,
    /// Host that client redirect URIs must match on /authorize.
    #[serde(default = "default_redirect_uri_host")]
    pub oauth_redirect_uri_host: String,
}

fn default_google_auth_url() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".into()
}

fn default_google_token_url() -> String {
    "https://oauth2.googleapis.com/token".into()
}

fn default_google_userinfo_url() -> String {
    "https://openidconnect.googleapis.com/v1/userinfo".into()
}

fn default_min_delay_secs() -> i64 {
    20
}

fn default_token_expiry_secs() -> i64 {
    300
}

fn default_redirect_uri_host() -> String {
    "chat.openai.com".into()
}

impl AppConfig {
    /// Callback URL registered with the identity provider.
    pub fn google_callback_url(&self) -> String {
        format!(
            "{}/oauth2-server/callback/google",
            self.public_url.trim_end_matches('/')
        )
    }
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Environment variable override convention: any var matching the key path
/// separated by double underscores (e.g. `SMTP__PORT`, `GOOGLE__CLIENT_ID`)
/// overrides the file value.
///
/// Returns a `ConfigError` instead of panicking so the caller can decide how to fail.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml"))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    validate(&app)?;
    Ok(app)
}

fn validate(app: &AppConfig) -> Result<(), ConfigError> {
    if app.admin_api_key.len() < 16 {
        return Err(ConfigError::Validation(
            "admin_api_key must be at least 16 characters".into(),
        ));
    }
    if app.smtp.port == 0 {
        return Err(ConfigError::Validation("smtp.port must be > 0".into()));
    }
    if app.public_url.is_empty() {
        return Err(ConfigError::Validation("public_url must be set".into()));
    }
    if app.min_delay_between_verification_secs < 0 {
        return Err(ConfigError::Validation(
            "min_delay_between_verification_secs must be >= 0".into(),
        ));
    }
    if app.default_token_expiry_secs <= 0 {
        return Err(ConfigError::Validation(
            "default_token_expiry_secs must be > 0".into(),
        ));
    }
    Ok(())
}

/// Convenience helper for binaries wanting panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            database_url: "sqlite::memory:".into(),
            smtp: SmtpConfig {
                server: "smtp.example.com".into(),
                port: 587,
                username: "user".into(),
                password: "pass".into(),
                from: "Gatekeeper <noreply@example.com>".into(),
            },
            google: GoogleConfig {
                client_id: "cid".into(),
                client_secret: "csecret".into(),
                auth_url: default_google_auth_url(),
                token_url: default_google_token_url(),
                userinfo_url: default_google_userinfo_url(),
            },
            public_url: "https://gatekeeper.example.com".into(),
            admin_api_key: "0123456789abcdef0123456789abcdef".into(),
            min_delay_between_verification_secs: default_min_delay_secs(),
            default_token_expiry_secs: default_token_expiry_secs(),
            oauth_redirect_uri_host: default_redirect_uri_host(),
        }
    }

    #[test]
    fn base_config_validates() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn short_admin_key_rejected() {
        let mut cfg = base_config();
        cfg.admin_api_key = "short".into();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn zero_smtp_port_rejected() {
        let mut cfg = base_config();
        cfg.smtp.port = 0;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn non_positive_token_expiry_rejected() {
        let mut cfg = base_config();
        cfg.default_token_expiry_secs = 0;
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn callback_url_handles_trailing_slash() {
        let mut cfg = base_config();
        cfg.public_url = "https://gatekeeper.example.com/".into();
        assert_eq!(
            cfg.google_callback_url(),
            "https://gatekeeper.example.com/oauth2-server/callback/google"
        );
    }
}
