//! Email OTP verification endpoints.
//!
//! A verification request archives any still-open requests for the same
//! (application, email) pair and inserts a fresh single-use 8-digit code, both
//! inside one transaction. OTP delivery is fire-and-forget; the handler
//! returns 202 without waiting for SMTP.

use crate::AppResources;
use crate::api::auth::Principal;
use crate::email::dispatch_otp_email;
use crate::entity::application::VerificationMedium;
use crate::entity::email_verification_request;
use crate::error::ApiError;
use axum::{Extension, Json, http::StatusCode};
use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Tag for OpenAPI documentation.
pub const VERIFICATION_TAG: &str = "Verification";

pub fn router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(request_verification))
        .routes(routes!(verify_otp))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerificationRequestPayload {
    /// uuid of the registered application
    pub gpt_application_id: String,
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyPayload {
    /// uuid of the registered application
    pub gpt_application_id: String,
    pub email: String,
    pub otp: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerifiedResponse {
    pub message: String,
    pub email: String,
}

/// 8-digit code, never leading-zero ambiguous since the range starts at
/// 10_000_000.
fn generate_otp() -> String {
    rand::thread_rng()
        .gen_range(10_000_000..=99_999_999u32)
        .to_string()
}

/// Request an email verification code.
#[tracing::instrument(skip(resources, principal, payload))]
#[utoipa::path(
    post,
    path = "/verification-request",
    tag = VERIFICATION_TAG,
    operation_id = "Request Verification",
    summary = "Send a verification code to an email address",
    description = "Archives any open verification requests for this (application, email) \
                   pair, creates a fresh single-use 8-digit code and emails it. Returns \
                   202 as soon as the request is stored; delivery happens in the \
                   background.",
    security(("ApplicationKey" = [])),
    request_body = VerificationRequestPayload,
    responses(
        (status = 202, description = "Verification request accepted", body = MessageResponse),
        (status = 400, description = "Application is not configured for email verification"),
        (status = 401, description = "Missing or invalid credential"),
        (status = 403, description = "Credential belongs to a different application"),
        (status = 429, description = "Too many verification requests for this email"),
    )
)]
pub async fn request_verification(
    principal: Principal,
    Extension(resources): Extension<AppResources>,
    Json(payload): Json<VerificationRequestPayload>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let app = principal.application();
    if app.uuid != payload.gpt_application_id {
        return Err(ApiError::Forbidden(
            "Credential does not belong to this application".to_string(),
        ));
    }
    if app.verification_medium == VerificationMedium::Google {
        return Err(ApiError::BadRequest(
            "Application verifies users via OAuth, not email codes".to_string(),
        ));
    }
    let email = payload.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::BadRequest("Invalid email address".to_string()));
    }

    let now = OffsetDateTime::now_utc();
    let min_delay = time::Duration::seconds(resources.config.min_delay_between_verification_secs);

    // Rate limit on the latest non-archived request for this pair.
    let latest = email_verification_request::Entity::find()
        .filter(email_verification_request::Column::ApplicationId.eq(app.id))
        .filter(email_verification_request::Column::Email.eq(&email))
        .filter(email_verification_request::Column::IsArchived.eq(false))
        .order_by_desc(email_verification_request::Column::CreatedAt)
        .one(resources.db.as_ref())
        .await?;

    if let Some(latest) = latest
        && latest.created_at + min_delay > now
    {
        return Err(ApiError::TooManyRequests(
            "Too many verification requests. Please try again after some time".to_string(),
        ));
    }

    let otp = generate_otp();

    // Archive open requests and insert the new one atomically, so exactly one
    // code is live per pair at any time.
    let txn = resources.db.begin().await?;

    email_verification_request::Entity::update_many()
        .set(email_verification_request::ActiveModel {
            is_archived: Set(true),
            archived_at: Set(Some(now)),
            ..Default::default()
        })
        .filter(email_verification_request::Column::ApplicationId.eq(app.id))
        .filter(email_verification_request::Column::Email.eq(&email))
        .filter(email_verification_request::Column::IsArchived.eq(false))
        .filter(email_verification_request::Column::VerifiedAt.is_null())
        .exec(&txn)
        .await?;

    email_verification_request::ActiveModel {
        id: sea_orm::ActiveValue::NotSet,
        application_id: Set(app.id),
        email: Set(email.clone()),
        otp: Set(otp.clone()),
        is_archived: Set(false),
        created_at: Set(now),
        verified_at: Set(None),
        archived_at: Set(None),
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;

    dispatch_otp_email(
        resources.mailer.clone(),
        resources.config.clone(),
        email,
        app.gpt_name.clone(),
        otp,
        app.token_expiry_secs,
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: "Verification request accepted".to_string(),
        }),
    ))
}

/// Confirm a verification code.
#[tracing::instrument(skip(resources, principal, payload))]
#[utoipa::path(
    post,
    path = "/verify",
    tag = VERIFICATION_TAG,
    operation_id = "Verify Code",
    summary = "Confirm a previously sent verification code",
    description = "Consumes the code: a successful verification marks the request \
                   verified and the same code can not be used again. Invalid, expired \
                   and already-used codes are indistinguishable in the response.",
    security(("ApplicationKey" = [])),
    request_body = VerifyPayload,
    responses(
        (status = 200, description = "Email verified", body = VerifiedResponse),
        (status = 400, description = "Invalid or expired code"),
        (status = 401, description = "Missing or invalid credential"),
        (status = 403, description = "Credential belongs to a different application"),
    )
)]
pub async fn verify_otp(
    principal: Principal,
    Extension(resources): Extension<AppResources>,
    Json(payload): Json<VerifyPayload>,
) -> Result<Json<VerifiedResponse>, ApiError> {
    let app = principal.application();
    if app.uuid != payload.gpt_application_id {
        return Err(ApiError::Forbidden(
            "Credential does not belong to this application".to_string(),
        ));
    }

    let email = payload.email.trim().to_lowercase();
    let invalid = || {
        ApiError::BadRequest(
            "Either OTP is invalid or has expired. Please try again.".to_string(),
        )
    };

    let request = email_verification_request::Entity::find()
        .filter(email_verification_request::Column::ApplicationId.eq(app.id))
        .filter(email_verification_request::Column::Email.eq(&email))
        .filter(email_verification_request::Column::Otp.eq(&payload.otp))
        .filter(email_verification_request::Column::IsArchived.eq(false))
        .filter(email_verification_request::Column::VerifiedAt.is_null())
        .one(resources.db.as_ref())
        .await?
        .ok_or_else(invalid)?;

    let now = OffsetDateTime::now_utc();
    if request.is_expired(app.token_expiry(), now) {
        return Err(invalid());
    }

    // Conditional update keeps the code single-use under concurrent verifies.
    let consumed = email_verification_request::Entity::update_many()
        .set(email_verification_request::ActiveModel {
            verified_at: Set(Some(now)),
            ..Default::default()
        })
        .filter(email_verification_request::Column::Id.eq(request.id))
        .filter(email_verification_request::Column::VerifiedAt.is_null())
        .exec(resources.db.as_ref())
        .await?;

    if consumed.rows_affected != 1 {
        return Err(invalid());
    }

    Ok(Json(VerifiedResponse {
        message: "Email verified successfully".to_string(),
        email,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_is_eight_digits() {
        for _ in 0..100 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 8);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
            assert!(!otp.starts_with('0'));
        }
    }
}
