//! Email OTP verification request entity - one row per dispatched OTP.
//!
//! Rows are append-only: once `verified_at` or `archived_at` is set the row is
//! terminal and never touched again.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "email_verification_request")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub application_id: i32,
    pub email: String,
    /// 8 ASCII digits, single use
    pub otp: String,
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
    /// An open request is neither verified nor archived.
    pub fn is_open(&self) -> bool {
        self.verified_at.is_none() && self.archived_at.is_none() && !self.is_archived
    }

    /// Expiry is measured from creation against the owning application's
    /// `token_expiry`.
    pub fn is_expired(&self, token_expiry: time::Duration, now: OffsetDateTime) -> bool {
        self.created_at + token_expiry < now
    }
}
