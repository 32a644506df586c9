//! Application registry endpoints.
//!
//! Registration mints the credential set a GPT application needs: the
//! `api_key` used as a bearer credential for verification endpoints, and the
//! `client_id`/`client_secret` pair for the OAuth2 server facade. Secrets are
//! only returned once, in the registration response.

use crate::AppResources;
use crate::api::auth::AdminAuth;
use crate::entity::application::{self, VerificationMedium};
use crate::error::ApiError;
use axum::{Extension, Json, http::StatusCode};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Tag for OpenAPI documentation.
pub const APPLICATIONS_TAG: &str = "Applications";

pub fn router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(register_application))
        .routes(routes!(list_applications))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterApplicationRequest {
    /// Display name of the GPT, used in verification emails
    pub gpt_name: String,
    /// Public URL of the GPT; unique per registration
    pub gpt_url: String,
    pub gpt_description: Option<String>,
    pub verification_medium: VerificationMedium,
    /// Seconds a verification request stays valid; service default when omitted
    pub token_expiry_secs: Option<i64>,
    /// Keep upstream OAuth tokens and accept them as bearer credentials
    #[serde(default)]
    pub store_tokens: bool,
}

/// Registration response. The only place `api_key` and `client_secret` are
/// ever returned.
#[derive(Debug, Serialize, ToSchema)]
pub struct RegisteredApplicationResponse {
    pub uuid: String,
    pub gpt_name: String,
    pub gpt_url: String,
    pub gpt_description: Option<String>,
    pub verification_medium: VerificationMedium,
    pub token_expiry_secs: i64,
    pub store_tokens: bool,
    pub api_key: String,
    pub client_id: String,
    pub client_secret: String,
    pub authorization_url: String,
    pub token_url: String,
    /// Text to paste into the GPT's instructions
    pub instructions: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Listing entry; secrets are omitted.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApplicationSummary {
    pub uuid: String,
    pub gpt_name: String,
    pub gpt_url: String,
    pub gpt_description: Option<String>,
    pub verification_medium: VerificationMedium,
    pub token_expiry_secs: i64,
    pub store_tokens: bool,
    pub client_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<application::Model> for ApplicationSummary {
    fn from(app: application::Model) -> Self {
        Self {
            uuid: app.uuid,
            gpt_name: app.gpt_name,
            gpt_url: app.gpt_url,
            gpt_description: app.gpt_description,
            verification_medium: app.verification_medium,
            token_expiry_secs: app.token_expiry_secs,
            store_tokens: app.store_tokens,
            client_id: app.client_id,
            created_at: app.created_at,
        }
    }
}

fn instructions_text(gpt_name: &str, medium: &VerificationMedium, public_url: &str) -> String {
    match medium {
        VerificationMedium::Google => format!(
            "Users of {gpt_name} must verify their identity before gated actions. \
             Direct them through the OAuth sign-in configured for this GPT; once they \
             complete it, continue with the requested action."
        ),
        _ => format!(
            "Users of {gpt_name} must verify their identity before gated actions. \
             Ask for their email address, call the verification-request action at \
             {public_url}/api/v1/verification-request, then ask for the 8-digit code \
             they received and confirm it via the verify action before continuing."
        ),
    }
}

/// Register a new GPT application.
#[tracing::instrument(skip(resources, payload))]
#[utoipa::path(
    post,
    path = "/custom-gpt-application",
    tag = APPLICATIONS_TAG,
    operation_id = "Register Application",
    summary = "Register a GPT application",
    description = "Registers a GPT application and mints its credential set. The \
                   `api_key` and `client_secret` are returned only in this response.",
    security(("AdminKey" = [])),
    request_body = RegisterApplicationRequest,
    responses(
        (status = 201, description = "Application registered", body = RegisteredApplicationResponse),
        (status = 401, description = "Missing or invalid administrative key"),
        (status = 409, description = "An application with this gpt_url already exists"),
    )
)]
pub async fn register_application(
    _admin: AdminAuth,
    Extension(resources): Extension<AppResources>,
    Json(payload): Json<RegisterApplicationRequest>,
) -> Result<(StatusCode, Json<RegisteredApplicationResponse>), ApiError> {
    if payload.gpt_name.trim().is_empty() || payload.gpt_url.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "gpt_name and gpt_url must not be empty".to_string(),
        ));
    }
    if let Some(expiry) = payload.token_expiry_secs
        && expiry <= 0
    {
        return Err(ApiError::BadRequest(
            "token_expiry_secs must be > 0".to_string(),
        ));
    }

    let existing = application::Entity::find()
        .filter(application::Column::GptUrl.eq(&payload.gpt_url))
        .one(resources.db.as_ref())
        .await?;
    if existing.is_some() {
        return Err(ApiError::Conflict(format!(
            "An account for gpt_url {} already exists",
            payload.gpt_url
        )));
    }

    let now = OffsetDateTime::now_utc();
    let token_expiry_secs = payload
        .token_expiry_secs
        .unwrap_or(resources.config.default_token_expiry_secs);

    let app = application::ActiveModel {
        id: sea_orm::ActiveValue::NotSet,
        uuid: Set(uuid::Uuid::new_v4().to_string()),
        gpt_name: Set(payload.gpt_name),
        gpt_url: Set(payload.gpt_url),
        gpt_description: Set(payload.gpt_description),
        verification_medium: Set(payload.verification_medium),
        token_expiry_secs: Set(token_expiry_secs),
        api_key: Set(uuid::Uuid::new_v4().to_string()),
        client_id: Set(uuid::Uuid::new_v4().to_string()),
        client_secret: Set(uuid::Uuid::new_v4().to_string()),
        store_tokens: Set(payload.store_tokens),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(resources.db.as_ref())
    .await?;

    let public_url = resources.config.public_url.trim_end_matches('/');
    let response = RegisteredApplicationResponse {
        instructions: instructions_text(&app.gpt_name, &app.verification_medium, public_url),
        authorization_url: format!("{public_url}/oauth2-server/authorize"),
        token_url: format!("{public_url}/oauth2-server/token"),
        uuid: app.uuid,
        gpt_name: app.gpt_name,
        gpt_url: app.gpt_url,
        gpt_description: app.gpt_description,
        verification_medium: app.verification_medium,
        token_expiry_secs: app.token_expiry_secs,
        store_tokens: app.store_tokens,
        api_key: app.api_key,
        client_id: app.client_id,
        client_secret: app.client_secret,
        created_at: app.created_at,
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// List registered GPT applications.
#[tracing::instrument(skip(resources))]
#[utoipa::path(
    get,
    path = "/custom-gpt-application",
    tag = APPLICATIONS_TAG,
    operation_id = "List Applications",
    summary = "List registered GPT applications",
    description = "Lists all registered applications without their secrets.",
    security(("AdminKey" = [])),
    responses(
        (status = 200, description = "Registered applications", body = [ApplicationSummary]),
        (status = 401, description = "Missing or invalid administrative key"),
    )
)]
pub async fn list_applications(
    _admin: AdminAuth,
    Extension(resources): Extension<AppResources>,
) -> Result<Json<Vec<ApplicationSummary>>, ApiError> {
    let apps = application::Entity::find()
        .order_by_asc(application::Column::Id)
        .all(resources.db.as_ref())
        .await?;

    Ok(Json(apps.into_iter().map(Into::into).collect()))
}
