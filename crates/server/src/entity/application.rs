//! Registered custom GPT application entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// How end-users of an application prove their identity.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    utoipa::ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum VerificationMedium {
    #[sea_orm(string_value = "email")]
    Email,
    #[sea_orm(string_value = "phone")]
    Phone,
    #[sea_orm(string_value = "google")]
    Google,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "application")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Public identifier handed out to clients
    #[sea_orm(unique)]
    pub uuid: String,
    pub gpt_name: String,
    #[sea_orm(unique)]
    pub gpt_url: String,
    pub gpt_description: Option<String>,
    pub verification_medium: VerificationMedium,
    /// Lifetime of verification requests and issued credentials, in seconds
    pub token_expiry_secs: i64,
    /// Per-application bearer credential for the GPT actions API
    #[sea_orm(unique)]
    pub api_key: String,
    /// OAuth2 client credentials for the authorization-server facade
    #[sea_orm(unique)]
    pub client_id: String,
    pub client_secret: String,
    /// Whether upstream tokens obtained at `/token` are persisted
    pub store_tokens: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::email_verification_request::Entity")]
    EmailVerificationRequest,
    #[sea_orm(has_many = "super::oauth_verification_request::Entity")]
    OAuthVerificationRequest,
    #[sea_orm(has_many = "super::oauth_token::Entity")]
    OAuthToken,
}

impl Related<super::email_verification_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EmailVerificationRequest.def()
    }
}

impl Related<super::oauth_verification_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OAuthVerificationRequest.def()
    }
}

impl Related<super::oauth_token::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OAuthToken.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Verification request lifetime as a `time::Duration`.
    pub fn token_expiry(&self) -> time::Duration {
        time::Duration::seconds(self.token_expiry_secs)
    }

    pub fn supports_oauth(&self) -> bool {
        self.verification_medium == VerificationMedium::Google
    }
}
