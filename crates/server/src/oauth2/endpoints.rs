//! OAuth2 HTTP endpoints.
//!
//! Implements the authorization-server surface for GPT client applications:
//! - Authorization endpoint (redirects the user to the upstream provider)
//! - Token endpoint (exchanges the stored upstream code, returns upstream tokens)
//! - Upstream callback endpoint

use crate::AppResources;
use crate::entity::oauth_token;
use crate::entity::oauth_verification_request::OAuthVerificationStatus;
use crate::entity::{application, oauth_verification_request};
use crate::oauth2::{OAUTH2_TAG, bridge};
use axum::{
    Extension, Form, Json,
    extract::Query,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Creates the OAuth2 server router.
pub fn router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(authorize))
        .routes(routes!(token))
        .routes(routes!(google_callback))
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// OAuth2 authorization request parameters.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AuthorizeRequest {
    /// Treated as "code" when absent; any other value is rejected
    pub response_type: Option<String>,
    /// Client identifier issued when the application was registered
    pub client_id: String,
    /// Where the client application expects the authorization code
    pub redirect_uri: String,
    /// Opaque value for CSRF protection, echoed back unchanged
    pub state: Option<String>,
    /// Replay-protection nonce, generated when absent
    pub nonce: Option<String>,
    /// Space-separated list of requested scopes (ignored, upstream scopes apply)
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Query parameters Google sends to the callback endpoint.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CallbackParams {
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

// =============================================================================
// Endpoints
// =============================================================================

/// OAuth2 Authorization endpoint.
///
/// Creates a verification request and redirects the user to the upstream
/// provider. The request's uuid travels upstream as the `state` parameter and
/// later becomes the authorization code handed back to the client.
#[tracing::instrument(skip(resources))]
#[utoipa::path(
    get,
    path = "/authorize",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Authorize",
    summary = "Initiate the bridged OAuth2 authorization flow",
    description = "Starts the Authorization Code flow for a registered GPT application. \
                   The user is redirected to the upstream identity provider; after they \
                   authenticate there, the provider calls back into this service and the \
                   user is finally redirected to the client's redirect_uri with an \
                   authorization code.",
    params(
        ("response_type" = Option<String>, Query, description = "Defaults to `code`; no other value is accepted."),
        ("client_id" = String, Query, description = "Client identifier issued during application registration."),
        ("redirect_uri" = String, Query, description = "URI to redirect the user to with the authorization code. Its host must match the configured allowed host."),
        ("state" = Option<String>, Query, description = "Opaque CSRF value, echoed back unchanged."),
        ("nonce" = Option<String>, Query, description = "Replay-protection nonce; generated when absent."),
        ("scope" = Option<String>, Query, description = "Ignored; upstream scopes apply."),
    ),
    responses(
        (status = 303, description = "Redirect to the upstream provider"),
        (status = 400, description = "Invalid request parameters", body = ErrorResponse),
        (status = 401, description = "Unknown client or disallowed redirect_uri host", body = ErrorResponse),
    )
)]
pub async fn authorize(
    Extension(resources): Extension<AppResources>,
    Query(params): Query<AuthorizeRequest>,
) -> Response {
    // Resolve the application before anything else; no row is created for an
    // unknown or misconfigured client.
    let app = match application::Entity::find()
        .filter(application::Column::ClientId.eq(&params.client_id))
        .one(resources.db.as_ref())
        .await
    {
        Ok(Some(a)) => a,
        Ok(None) => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "invalid_client".to_string(),
                    error_description: Some("Client not found".to_string()),
                }),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("Database error looking up client: {}", e);
            return server_error();
        }
    };

    if !app.supports_oauth() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "invalid_request".to_string(),
                error_description: Some(
                    "Application is not configured for OAuth verification".to_string(),
                ),
            }),
        )
            .into_response();
    }

    // The redirect_uri host gate keeps stolen credentials from bouncing codes
    // to an attacker-controlled host. It runs before any branch that could
    // redirect there.
    let allowed_host = &resources.config.oauth_redirect_uri_host;
    let host_ok = url::Url::parse(&params.redirect_uri)
        .ok()
        .and_then(|u| u.host_str().map(|h| h == allowed_host))
        .unwrap_or(false);
    if !host_ok {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "invalid_request".to_string(),
                error_description: Some(format!(
                    "redirect_uri host must be {allowed_host}"
                )),
            }),
        )
            .into_response();
    }

    if params.response_type.as_deref().unwrap_or("code") != "code" {
        return error_redirect(
            Some(&params.redirect_uri),
            params.state.as_deref(),
            "unsupported_response_type",
            Some("Only 'code' response type is supported"),
        );
    }

    let request = match bridge::start_flow(
        resources.db.as_ref(),
        &app,
        params.state.clone(),
        params.redirect_uri.clone(),
        params.nonce.clone(),
    )
    .await
    {
        Ok(r) => r,
        Err(e) => {
            tracing::error!("Failed to create verification request: {}", e);
            return server_error();
        }
    };

    let nonce = request.nonce.as_deref().unwrap_or_default();
    match resources.google.authorization_url(&request.uuid, nonce) {
        Ok(auth_url) => Redirect::to(auth_url.as_str()).into_response(),
        Err(e) => {
            tracing::error!("Failed to build upstream authorization URL: {}", e);
            server_error()
        }
    }
}

/// Upstream callback endpoint for Google.
///
/// The `state` parameter carries the verification request uuid. An
/// unresolvable state fails closed with a JSON error and no redirect, since
/// without a stored request there is no trusted redirect target.
#[tracing::instrument(skip(resources, params))]
#[utoipa::path(
    get,
    path = "/callback/google",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Google Callback",
    summary = "Upstream provider callback",
    description = "Receives the upstream authorization code (or error) from Google, \
                   records it on the matching verification request and redirects the \
                   user back to the client application's redirect_uri.",
    params(
        ("state" = Option<String>, Query, description = "Correlation token issued at /authorize."),
        ("code" = Option<String>, Query, description = "Upstream authorization code on success."),
        ("error" = Option<String>, Query, description = "Upstream error code on failure."),
        ("error_description" = Option<String>, Query, description = "Upstream error description."),
    ),
    responses(
        (status = 303, description = "Redirect back to the client application"),
        (status = 400, description = "Missing or unresolvable state", body = ErrorResponse),
    )
)]
pub async fn google_callback(
    Extension(resources): Extension<AppResources>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let state = match params.state.as_deref() {
        Some(s) if !s.is_empty() => s,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "invalid_request".to_string(),
                    error_description: Some("Missing state parameter".to_string()),
                }),
            )
                .into_response();
        }
    };

    let request = match bridge::find_by_uuid(resources.db.as_ref(), state).await {
        Ok(Some(r)) => r,
        Ok(None) => {
            tracing::warn!(
                name = "oauth2.callback.unknown_state",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                message = "Callback received for unknown state, failing closed"
            );
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "invalid_request".to_string(),
                    error_description: Some("Unknown verification request".to_string()),
                }),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("Database error resolving callback state: {}", e);
            return server_error();
        }
    };

    // A terminal request means a replayed or duplicate callback.
    if request.status.is_terminal() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "invalid_request".to_string(),
                error_description: Some("Verification request already settled".to_string()),
            }),
        )
            .into_response();
    }

    let app = match application::Entity::find_by_id(request.application_id)
        .one(resources.db.as_ref())
        .await
    {
        Ok(Some(a)) => a,
        _ => return server_error(),
    };

    let redirect_uri = request.redirect_uri.as_deref();
    let client_state = request.state.as_deref();
    let now = time::OffsetDateTime::now_utc();

    // An upstream denial settles the request as Failed even when it has also
    // expired in the meantime; the propagated error code wins.
    if let Some(error) = params.error.as_deref() {
        let _ = bridge::mark_failed(resources.db.as_ref(), request.id, request.status, error).await;
        return error_redirect(
            redirect_uri,
            client_state,
            error,
            params.error_description.as_deref(),
        );
    }

    if request.is_expired(app.token_expiry(), now) {
        let _ = bridge::mark_expired(resources.db.as_ref(), request.id, request.status).await;
        return error_redirect(
            redirect_uri,
            client_state,
            "expired",
            Some("Verification request expired"),
        );
    }

    if request.is_archived {
        let _ = bridge::mark_archived(resources.db.as_ref(), request.id, request.status).await;
        return error_redirect(
            redirect_uri,
            client_state,
            "archived",
            Some("Verification request was archived"),
        );
    }

    let code = match params.code.as_deref() {
        Some(c) if !c.is_empty() => c,
        _ => {
            let _ = bridge::mark_failed(
                resources.db.as_ref(),
                request.id,
                request.status,
                "invalid_request",
            )
            .await;
            return error_redirect(
                redirect_uri,
                client_state,
                "invalid_request",
                Some("Upstream callback carried no code"),
            );
        }
    };

    match bridge::record_callback_success(resources.db.as_ref(), request.id, code).await {
        Ok(true) => {}
        Ok(false) => {
            // Lost the race against a concurrent callback for the same state.
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "invalid_request".to_string(),
                    error_description: Some("Verification request already settled".to_string()),
                }),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("Failed to record callback: {}", e);
            return server_error();
        }
    }

    // Hand the correlation uuid to the client as its authorization code.
    match redirect_uri {
        Some(uri) => {
            let mut redirect_url = match url::Url::parse(uri) {
                Ok(u) => u,
                Err(e) => {
                    tracing::error!("Stored redirect_uri does not parse: {}", e);
                    return server_error();
                }
            };
            redirect_url
                .query_pairs_mut()
                .append_pair("code", &request.uuid);
            if let Some(s) = client_state {
                redirect_url.query_pairs_mut().append_pair("state", s);
            }
            Redirect::to(redirect_url.as_str()).into_response()
        }
        None => server_error(),
    }
}

/// OAuth2 Token endpoint.
///
/// Exchanges the stored upstream authorization code with the provider,
/// resolves the verified email and returns the upstream token response,
/// augmented with `gpt_application_id`.
#[tracing::instrument(skip(resources, headers, params))]
#[utoipa::path(
    post,
    path = "/token",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Token",
    summary = "Exchange an authorization code for upstream tokens",
    description = "Exchanges the authorization code issued at the callback for the \
                   upstream provider's tokens. Client credentials can be supplied via \
                   HTTP Basic auth or in the form body. The response is the upstream \
                   token JSON with a `gpt_application_id` field added.",
    request_body(
        content = TokenRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token request parameters"
    ),
    responses(
        (status = 200, description = "Upstream tokens issued"),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 401, description = "Invalid client credentials", body = ErrorResponse),
        (status = 404, description = "No matching verification request", body = ErrorResponse),
        (status = 409, description = "Concurrent exchange already settled the request", body = ErrorResponse),
        (status = 422, description = "Verification request expired or archived", body = ErrorResponse),
    )
)]
pub async fn token(
    Extension(resources): Extension<AppResources>,
    headers: HeaderMap,
    Form(params): Form<TokenRequest>,
) -> Response {
    let (client_id, client_secret) = extract_client_credentials(&headers, &params);

    let client_id = match client_id {
        Some(id) => id,
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "invalid_request".to_string(),
                    error_description: Some("client_id is required".to_string()),
                }),
            )
                .into_response();
        }
    };

    let app = match application::Entity::find()
        .filter(application::Column::ClientId.eq(&client_id))
        .one(resources.db.as_ref())
        .await
    {
        Ok(Some(a)) => a,
        Ok(None) => return invalid_client(),
        Err(e) => {
            tracing::error!("Database error looking up client: {}", e);
            return server_error();
        }
    };

    match client_secret {
        Some(ref provided) if provided == &app.client_secret => {}
        _ => return invalid_client(),
    }

    if params.grant_type != "authorization_code" {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "unsupported_grant_type".to_string(),
                error_description: None,
            }),
        )
            .into_response();
    }

    let (code, redirect_uri) = match (params.code, params.redirect_uri) {
        (Some(c), Some(r)) => (c, r),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "invalid_request".to_string(),
                    error_description: Some("code and redirect_uri are required".to_string()),
                }),
            )
                .into_response();
        }
    };

    // The code is the request uuid; it must match the redirect_uri and the
    // application the flow was started for.
    let request = match oauth_verification_request::Entity::find()
        .filter(oauth_verification_request::Column::Uuid.eq(&code))
        .filter(oauth_verification_request::Column::RedirectUri.eq(&redirect_uri))
        .filter(oauth_verification_request::Column::ApplicationId.eq(app.id))
        .one(resources.db.as_ref())
        .await
    {
        Ok(Some(r)) => r,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: "invalid_grant".to_string(),
                    error_description: Some("OAuth Verification Request not found".to_string()),
                }),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("Database error looking up verification request: {}", e);
            return server_error();
        }
    };

    let now = time::OffsetDateTime::now_utc();
    if request.is_expired(app.token_expiry(), now) {
        let _ = bridge::mark_expired(resources.db.as_ref(), request.id, request.status).await;
        return unprocessable_request();
    }
    if request.is_archived || request.status != OAuthVerificationStatus::CallbackCompleted {
        return unprocessable_request();
    }

    let authorization_code = match request.authorization_code.as_deref() {
        Some(c) => c,
        None => {
            tracing::error!("Callback-completed request without authorization code");
            return server_error();
        }
    };

    let tokens = match resources.google.exchange_code(authorization_code).await {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("Upstream code exchange failed: {}", e);
            let _ = bridge::mark_failed(
                resources.db.as_ref(),
                request.id,
                request.status,
                "upstream_exchange_failed",
            )
            .await;
            return (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: "upstream_error".to_string(),
                    error_description: Some("Code exchange with the provider failed".to_string()),
                }),
            )
                .into_response();
        }
    };

    let email = match resources
        .google
        .resolve_email(&tokens, request.nonce.as_deref())
        .await
    {
        Ok(email) => email,
        Err(e) => {
            tracing::error!("Failed to resolve verified email: {}", e);
            let _ = bridge::mark_failed(
                resources.db.as_ref(),
                request.id,
                request.status,
                "identity_resolution_failed",
            )
            .await;
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "invalid_grant".to_string(),
                    error_description: Some("Identity could not be verified".to_string()),
                }),
            )
                .into_response();
        }
    };

    match bridge::mark_verified(resources.db.as_ref(), request.id, &email).await {
        Ok(true) => {}
        Ok(false) => {
            return (
                StatusCode::CONFLICT,
                Json(ErrorResponse {
                    error: "conflict".to_string(),
                    error_description: Some(
                        "Verification request was settled concurrently".to_string(),
                    ),
                }),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("Failed to mark request verified: {}", e);
            return server_error();
        }
    }

    if app.store_tokens {
        let stored = oauth_token::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            application_id: Set(app.id),
            access_token: Set(tokens.access_token.clone()),
            refresh_token: Set(tokens.refresh_token.clone()),
            expires_at: Set(now + time::Duration::seconds(tokens.expires_in)),
            created_at: Set(now),
        };
        if let Err(e) = stored.insert(resources.db.as_ref()).await {
            tracing::error!("Failed to store upstream token: {}", e);
        }
    }

    let mut body = tokens.raw;
    if let Some(obj) = body.as_object_mut() {
        obj.insert(
            "gpt_application_id".to_string(),
            serde_json::Value::String(app.uuid.clone()),
        );
    }

    (StatusCode::OK, Json(body)).into_response()
}

// =============================================================================
// Helper Functions
// =============================================================================

fn extract_client_credentials(
    headers: &HeaderMap,
    params: &TokenRequest,
) -> (Option<String>, Option<String>) {
    // Try Basic auth first
    if let Some(auth) = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        && let Ok(decoded) =
            base64::Engine::decode(&base64::engine::general_purpose::STANDARD, auth)
        && let Ok(creds) = String::from_utf8(decoded)
        && let Some((id, secret)) = creds.split_once(':')
    {
        return (Some(id.to_string()), Some(secret.to_string()));
    }

    // Fall back to form body
    (params.client_id.clone(), params.client_secret.clone())
}

fn invalid_client() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: "invalid_client".to_string(),
            error_description: None,
        }),
    )
        .into_response()
}

fn server_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "server_error".to_string(),
            error_description: None,
        }),
    )
        .into_response()
}

fn unprocessable_request() -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ErrorResponse {
            error: "invalid_grant".to_string(),
            error_description: Some(
                "Either OAuth Verification Request is expired or archived. Please start again"
                    .to_string(),
            ),
        }),
    )
        .into_response()
}

fn error_redirect(
    redirect_uri: Option<&str>,
    state: Option<&str>,
    error: &str,
    description: Option<&str>,
) -> Response {
    match redirect_uri {
        Some(uri) => {
            let mut redirect_url = match url::Url::parse(uri) {
                Ok(u) => u,
                Err(_) => {
                    return (
                        StatusCode::BAD_REQUEST,
                        Json(ErrorResponse {
                            error: error.to_string(),
                            error_description: description.map(String::from),
                        }),
                    )
                        .into_response();
                }
            };

            redirect_url.query_pairs_mut().append_pair("error", error);
            if let Some(desc) = description {
                redirect_url
                    .query_pairs_mut()
                    .append_pair("error_description", desc);
            }
            if let Some(s) = state {
                redirect_url.query_pairs_mut().append_pair("state", s);
            }

            Redirect::to(redirect_url.as_str()).into_response()
        }
        None => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: error.to_string(),
                error_description: description.map(String::from),
            }),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_auth_takes_precedence_over_form() {
        use base64::Engine;
        let mut headers = HeaderMap::new();
        let encoded =
            base64::engine::general_purpose::STANDARD.encode("header-client:header-secret");
        headers.insert(
            "authorization",
            format!("Basic {encoded}").parse().unwrap(),
        );
        let params = TokenRequest {
            grant_type: "authorization_code".into(),
            code: None,
            redirect_uri: None,
            client_id: Some("form-client".into()),
            client_secret: Some("form-secret".into()),
        };
        let (id, secret) = extract_client_credentials(&headers, &params);
        assert_eq!(id.as_deref(), Some("header-client"));
        assert_eq!(secret.as_deref(), Some("header-secret"));
    }

    #[test]
    fn form_credentials_used_without_basic_auth() {
        let params = TokenRequest {
            grant_type: "authorization_code".into(),
            code: None,
            redirect_uri: None,
            client_id: Some("form-client".into()),
            client_secret: Some("form-secret".into()),
        };
        let (id, secret) = extract_client_credentials(&HeaderMap::new(), &params);
        assert_eq!(id.as_deref(), Some("form-client"));
        assert_eq!(secret.as_deref(), Some("form-secret"));
    }
}
