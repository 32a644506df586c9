//! OAuth verification request entity - tracks one bridged authorization flow
//! against the upstream identity provider.
//!
//! The `uuid` column doubles as the correlation token: it is sent upstream as
//! the `state` parameter and later handed back to the client application as
//! the authorization `code`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Lifecycle of a bridged OAuth flow. Transitions only move forward; the
/// terminal states are `Verified`, `Failed`, `Expired` and `Archived`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    utoipa::ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum OAuthVerificationStatus {
    #[sea_orm(string_value = "not_started")]
    NotStarted,
    #[sea_orm(string_value = "in_progress")]
    InProgress,
    #[sea_orm(string_value = "callback_completed")]
    CallbackCompleted,
    #[sea_orm(string_value = "verified")]
    Verified,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "expired")]
    Expired,
    #[sea_orm(string_value = "archived")]
    Archived,
}

impl OAuthVerificationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Verified | Self::Failed | Self::Expired | Self::Archived
        )
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth_verification_request")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub application_id: i32,
    #[sea_orm(unique)]
    pub uuid: String,
    pub provider: String,
    pub email: Option<String>,
    /// The client application's own `state`, echoed back on redirect.
    pub state: Option<String>,
    pub redirect_uri: Option<String>,
    /// Upstream authorization code captured at callback time.
    pub authorization_code: Option<String>,
    pub nonce: Option<String>,
    pub status: OAuthVerificationStatus,
    pub error_code: Option<String>,
    pub oauth_flow_started_at: Option<OffsetDateTime>,
    pub oauth_callback_completed_at: Option<OffsetDateTime>,
    pub is_archived: bool,
    pub created_at: OffsetDateTime,
    pub verified_at: Option<OffsetDateTime>,
    pub archived_at: Option<OffsetDateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::application::Entity",
        from = "Column::ApplicationId",
        to = "super::application::Column::Id"
    )]
    Application,
}

impl Related<super::application::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Application.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Expiry is measured from `created_at` so the same deadline applies at
    /// the callback and at token exchange.
    pub fn is_expired(&self, token_expiry: time::Duration, now: OffsetDateTime) -> bool {
        self.created_at + token_expiry < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!OAuthVerificationStatus::NotStarted.is_terminal());
        assert!(!OAuthVerificationStatus::InProgress.is_terminal());
        assert!(!OAuthVerificationStatus::CallbackCompleted.is_terminal());
        assert!(OAuthVerificationStatus::Verified.is_terminal());
        assert!(OAuthVerificationStatus::Failed.is_terminal());
        assert!(OAuthVerificationStatus::Expired.is_terminal());
        assert!(OAuthVerificationStatus::Archived.is_terminal());
    }
}
