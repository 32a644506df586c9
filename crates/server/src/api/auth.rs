//! Authentication extractors.
//!
//! Two levels of access exist: the administrative key from the service
//! configuration guards the application registry, and per-application
//! credentials guard the verification endpoints. An application credential is
//! either the `api_key` issued at registration or, for applications with
//! `store_tokens` enabled, an unexpired upstream access token.

use crate::AppResources;
use crate::entity::{application, oauth_token};
use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error type for authentication failures
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthError {
    /// Error code (e.g., "invalid_token", "forbidden")
    pub error: String,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl AuthError {
    pub fn invalid_token(description: impl Into<String>) -> Self {
        Self {
            error: "invalid_token".to_string(),
            error_description: Some(description.into()),
        }
    }

    pub fn forbidden(description: impl Into<String>) -> Self {
        Self {
            error: "forbidden".to_string(),
            error_description: Some(description.into()),
        }
    }

    pub fn server_error() -> Self {
        Self {
            error: "server_error".to_string(),
            error_description: None,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self.error.as_str() {
            "invalid_token" => StatusCode::UNAUTHORIZED,
            "forbidden" => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    let auth_header = parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok());

    match auth_header {
        Some(header) if header.starts_with("Bearer ") => Ok(&header[7..]),
        Some(_) => Err(AuthError::invalid_token(
            "Authorization header must use Bearer scheme",
        )),
        None => Err(AuthError::invalid_token("Missing Authorization header")),
    }
}

fn resources(parts: &Parts) -> Result<AppResources, AuthError> {
    parts
        .extensions
        .get::<AppResources>()
        .cloned()
        .ok_or_else(|| {
            tracing::error!("AppResources not found in extensions");
            AuthError::server_error()
        })
}

/// Extractor gating the application registry behind the configured
/// administrative key.
#[derive(Debug)]
pub struct AdminAuth;

impl<S> FromRequestParts<S> for AdminAuth
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let resources = resources(parts)?;
        let token = bearer_token(parts)?;

        if token != resources.config.admin_api_key {
            return Err(AuthError::invalid_token("Invalid administrative API key"));
        }

        Ok(AdminAuth)
    }
}

/// The authenticated caller of a verification endpoint, tagged with how it
/// authenticated.
#[derive(Debug, Clone)]
pub enum Principal {
    /// The application's issued `api_key`.
    ApiKey { application: application::Model },
    /// An unexpired upstream access token stored for the application.
    OAuth { application: application::Model },
}

impl Principal {
    pub fn application(&self) -> &application::Model {
        match self {
            Principal::ApiKey { application } | Principal::OAuth { application } => application,
        }
    }
}

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let resources = resources(parts)?;
        let token = bearer_token(parts)?;

        // api_key first, stored upstream tokens second
        let by_api_key = application::Entity::find()
            .filter(application::Column::ApiKey.eq(token))
            .one(resources.db.as_ref())
            .await
            .map_err(|e| {
                tracing::error!("Database error looking up api key: {}", e);
                AuthError::server_error()
            })?;

        if let Some(application) = by_api_key {
            return Ok(Principal::ApiKey { application });
        }

        let stored = oauth_token::Entity::find()
            .filter(oauth_token::Column::AccessToken.eq(token))
            .order_by_desc(oauth_token::Column::CreatedAt)
            .one(resources.db.as_ref())
            .await
            .map_err(|e| {
                tracing::error!("Database error looking up stored token: {}", e);
                AuthError::server_error()
            })?
            .ok_or_else(|| AuthError::invalid_token("Unknown credential"))?;

        if !stored.is_valid(time::OffsetDateTime::now_utc()) {
            return Err(AuthError::invalid_token("Token has expired"));
        }

        let application = application::Entity::find_by_id(stored.application_id)
            .one(resources.db.as_ref())
            .await
            .map_err(|e| {
                tracing::error!("Database error looking up application: {}", e);
                AuthError::server_error()
            })?
            .ok_or_else(|| {
                tracing::error!(
                    "Stored token without application: {}",
                    stored.application_id
                );
                AuthError::invalid_token("Unknown credential")
            })?;

        Ok(Principal::OAuth { application })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_error_status_codes() {
        let response = AuthError::invalid_token("test").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = AuthError::forbidden("test").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = AuthError::server_error().into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
