//! Upstream Google OAuth2 / OpenID Connect client.
//!
//! Builds the authorization URL the user is redirected to, exchanges the
//! callback code at Google's token endpoint, and resolves the verified email
//! from the ID token (with a userinfo fallback when no ID token is present).

use crate::config::GoogleConfig;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GoogleError {
    #[error("Network error talking to the identity provider: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Token endpoint returned HTTP {status}: {body}")]
    TokenEndpoint { status: u16, body: String },
    #[error("Userinfo endpoint returned HTTP {status}")]
    Userinfo { status: u16 },
    #[error("ID token could not be decoded: {0}")]
    InvalidIdToken(String),
    #[error("ID token nonce does not match the stored flow nonce")]
    NonceMismatch,
    #[error("Identity provider response contains no email")]
    MissingEmail,
}

/// Token response from Google's token endpoint. Typed fields cover what the
/// bridge needs; `raw` keeps the full upstream body for pass-through.
#[derive(Debug, Clone)]
pub struct GoogleTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub id_token: Option<String>,
    pub raw: serde_json::Value,
}

#[derive(Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    #[serde(default)]
    id_token: Option<String>,
}

fn default_expires_in() -> i64 {
    3600
}

/// Claims read from the Google ID token. The token arrives over TLS directly
/// from the provider's token endpoint, so the signature is not re-verified
/// here; audience, expiry and nonce are.
#[derive(Deserialize)]
struct IdTokenClaims {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    nonce: Option<String>,
}

#[derive(Deserialize)]
struct UserinfoResponse {
    #[serde(default)]
    email: Option<String>,
}

#[derive(Clone)]
pub struct GoogleClient {
    http: reqwest::Client,
    config: GoogleConfig,
    callback_url: String,
}

impl GoogleClient {
    pub fn new(config: GoogleConfig, callback_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            callback_url,
        }
    }

    /// Authorization URL the end user is redirected to. `state` is the
    /// correlation token of the verification request, `nonce` its stored
    /// replay-protection nonce.
    pub fn authorization_url(&self, state: &str, nonce: &str) -> Result<url::Url, url::ParseError> {
        let mut auth_url = url::Url::parse(&self.config.auth_url)?;
        auth_url
            .query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.callback_url)
            .append_pair("scope", "openid email profile")
            .append_pair("access_type", "offline")
            .append_pair("state", state)
            .append_pair("nonce", nonce);
        Ok(auth_url)
    }

    /// Exchange the authorization code captured at the callback for tokens.
    #[tracing::instrument(skip(self, code))]
    pub async fn exchange_code(&self, code: &str) -> Result<GoogleTokens, GoogleError> {
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
                ("redirect_uri", &self.callback_url),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GoogleError::TokenEndpoint {
                status: status.as_u16(),
                body,
            });
        }

        let raw: serde_json::Value = response.json().await?;
        let typed: TokenEndpointResponse = serde_json::from_value(raw.clone())
            .map_err(|e| GoogleError::InvalidIdToken(format!("token response: {e}")))?;

        Ok(GoogleTokens {
            access_token: typed.access_token,
            refresh_token: typed.refresh_token,
            expires_in: typed.expires_in,
            id_token: typed.id_token,
            raw,
        })
    }

    /// Resolve the verified email for an exchanged token set.
    ///
    /// Prefers the ID token claims; falls back to the userinfo endpoint when
    /// the provider returned no ID token. When `expected_nonce` is set the ID
    /// token nonce must match it.
    pub async fn resolve_email(
        &self,
        tokens: &GoogleTokens,
        expected_nonce: Option<&str>,
    ) -> Result<String, GoogleError> {
        if let Some(id_token) = &tokens.id_token {
            let claims = self.decode_id_token(id_token)?;
            if let Some(expected) = expected_nonce
                && claims.nonce.as_deref() != Some(expected)
            {
                return Err(GoogleError::NonceMismatch);
            }
            if let Some(email) = claims.email {
                return Ok(email);
            }
        }
        self.fetch_userinfo_email(&tokens.access_token).await
    }

    fn decode_id_token(&self, id_token: &str) -> Result<IdTokenClaims, GoogleError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.config.client_id]);
        validation.insecure_disable_signature_validation();

        let data = decode::<IdTokenClaims>(id_token, &DecodingKey::from_secret(&[]), &validation)
            .map_err(|e| GoogleError::InvalidIdToken(e.to_string()))?;
        Ok(data.claims)
    }

    async fn fetch_userinfo_email(&self, access_token: &str) -> Result<String, GoogleError> {
        let response = self
            .http
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GoogleError::Userinfo {
                status: status.as_u16(),
            });
        }

        let info: UserinfoResponse = response.json().await?;
        info.email.ok_or(GoogleError::MissingEmail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GoogleClient {
        GoogleClient::new(
            GoogleConfig {
                client_id: "test-client".into(),
                client_secret: "test-secret".into(),
                auth_url: "https://accounts.google.com/o/oauth2/v2/auth".into(),
                token_url: "https://oauth2.googleapis.com/token".into(),
                userinfo_url: "https://openidconnect.googleapis.com/v1/userinfo".into(),
            },
            "https://gatekeeper.example.com/oauth2-server/callback/google".into(),
        )
    }

    #[test]
    fn authorization_url_carries_state_and_nonce() {
        let url = client().authorization_url("req-uuid", "nonce-uuid").unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().collect();
        assert_eq!(pairs["state"], "req-uuid");
        assert_eq!(pairs["nonce"], "nonce-uuid");
        assert_eq!(pairs["scope"], "openid email profile");
        assert_eq!(pairs["access_type"], "offline");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(
            pairs["redirect_uri"],
            "https://gatekeeper.example.com/oauth2-server/callback/google"
        );
    }
}
