//! Verification request state machine for bridged OAuth flows.
//!
//! All status transitions go through compare-and-swap updates: the UPDATE is
//! filtered on the expected current status, and a transition only took place
//! when exactly one row was affected. Concurrent callbacks or exchanges for
//! the same request therefore race safely; exactly one wins.

use crate::entity::oauth_verification_request::{
    self, Column, Entity, OAuthVerificationStatus,
};
use crate::entity::application;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use time::OffsetDateTime;

/// Create a new verification request in `InProgress` with a fresh correlation
/// uuid and nonce. The uuid travels upstream as `state` and comes back to the
/// client application as its authorization `code`.
pub async fn start_flow(
    db: &DatabaseConnection,
    app: &application::Model,
    client_state: Option<String>,
    redirect_uri: String,
    nonce: Option<String>,
) -> Result<oauth_verification_request::Model, sea_orm::DbErr> {
    let now = OffsetDateTime::now_utc();
    let nonce = nonce.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let request = oauth_verification_request::ActiveModel {
        id: sea_orm::ActiveValue::NotSet,
        application_id: Set(app.id),
        uuid: Set(uuid::Uuid::new_v4().to_string()),
        provider: Set("google".to_string()),
        email: Set(None),
        state: Set(client_state),
        redirect_uri: Set(Some(redirect_uri)),
        authorization_code: Set(None),
        nonce: Set(Some(nonce)),
        status: Set(OAuthVerificationStatus::InProgress),
        error_code: Set(None),
        oauth_flow_started_at: Set(Some(now)),
        oauth_callback_completed_at: Set(None),
        is_archived: Set(false),
        created_at: Set(now),
        verified_at: Set(None),
        archived_at: Set(None),
    };
    request.insert(db).await
}

/// Compare-and-swap status transition. Returns `true` when this call moved
/// the row from `from` to the state described by `changes`; `false` when a
/// concurrent transition got there first.
async fn transition(
    db: &DatabaseConnection,
    request_id: i32,
    from: OAuthVerificationStatus,
    changes: oauth_verification_request::ActiveModel,
) -> Result<bool, sea_orm::DbErr> {
    let result = Entity::update_many()
        .set(changes)
        .filter(Column::Id.eq(request_id))
        .filter(Column::Status.eq(from))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Record a successful upstream callback: store the upstream authorization
/// code and move `InProgress` to `CallbackCompleted`.
pub async fn record_callback_success(
    db: &DatabaseConnection,
    request_id: i32,
    authorization_code: &str,
) -> Result<bool, sea_orm::DbErr> {
    let changes = oauth_verification_request::ActiveModel {
        status: Set(OAuthVerificationStatus::CallbackCompleted),
        authorization_code: Set(Some(authorization_code.to_string())),
        oauth_callback_completed_at: Set(Some(OffsetDateTime::now_utc())),
        ..Default::default()
    };
    transition(db, request_id, OAuthVerificationStatus::InProgress, changes).await
}

/// Move a request to the terminal `Failed` state, recording the error code.
pub async fn mark_failed(
    db: &DatabaseConnection,
    request_id: i32,
    from: OAuthVerificationStatus,
    error_code: &str,
) -> Result<bool, sea_orm::DbErr> {
    let changes = oauth_verification_request::ActiveModel {
        status: Set(OAuthVerificationStatus::Failed),
        error_code: Set(Some(error_code.to_string())),
        ..Default::default()
    };
    transition(db, request_id, from, changes).await
}

/// Move a request to the terminal `Expired` state.
pub async fn mark_expired(
    db: &DatabaseConnection,
    request_id: i32,
    from: OAuthVerificationStatus,
) -> Result<bool, sea_orm::DbErr> {
    let changes = oauth_verification_request::ActiveModel {
        status: Set(OAuthVerificationStatus::Expired),
        ..Default::default()
    };
    transition(db, request_id, from, changes).await
}

/// Move a request to the terminal `Archived` state.
pub async fn mark_archived(
    db: &DatabaseConnection,
    request_id: i32,
    from: OAuthVerificationStatus,
) -> Result<bool, sea_orm::DbErr> {
    let changes = oauth_verification_request::ActiveModel {
        status: Set(OAuthVerificationStatus::Archived),
        is_archived: Set(true),
        archived_at: Set(Some(OffsetDateTime::now_utc())),
        ..Default::default()
    };
    transition(db, request_id, from, changes).await
}

/// Finish a flow: store the resolved email and move `CallbackCompleted` to
/// `Verified`.
pub async fn mark_verified(
    db: &DatabaseConnection,
    request_id: i32,
    email: &str,
) -> Result<bool, sea_orm::DbErr> {
    let changes = oauth_verification_request::ActiveModel {
        status: Set(OAuthVerificationStatus::Verified),
        email: Set(Some(email.to_string())),
        verified_at: Set(Some(OffsetDateTime::now_utc())),
        ..Default::default()
    };
    transition(
        db,
        request_id,
        OAuthVerificationStatus::CallbackCompleted,
        changes,
    )
    .await
}

/// Look up a request by its correlation uuid.
pub async fn find_by_uuid(
    db: &DatabaseConnection,
    uuid: &str,
) -> Result<Option<oauth_verification_request::Model>, sea_orm::DbErr> {
    Entity::find().filter(Column::Uuid.eq(uuid)).one(db).await
}
