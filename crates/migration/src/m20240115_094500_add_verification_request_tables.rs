//! Migration creating the verification-request tables.
//!
//! Two tables, one per verification medium:
//! - `email_verification_request`: OTP codes sent by mail
//! - `oauth_verification_request`: the OAuth2 bridge state machine rows
//!
//! Both are append-only audit trails; rows are archived, never deleted.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EmailVerificationRequest::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EmailVerificationRequest::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(EmailVerificationRequest::ApplicationId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailVerificationRequest::Email)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailVerificationRequest::Otp)
                            .string_len(8)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailVerificationRequest::IsArchived)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(EmailVerificationRequest::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EmailVerificationRequest::VerifiedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(EmailVerificationRequest::ArchivedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_email_verification_request_application")
                            .from(
                                EmailVerificationRequest::Table,
                                EmailVerificationRequest::ApplicationId,
                            )
                            .to(Application::Table, Application::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Lookups are always scoped to (application, email)
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_email_verification_request_app_email")
                    .table(EmailVerificationRequest::Table)
                    .col(EmailVerificationRequest::ApplicationId)
                    .col(EmailVerificationRequest::Email)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OAuthVerificationRequest::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuthVerificationRequest::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OAuthVerificationRequest::ApplicationId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuthVerificationRequest::Uuid)
                            .string_len(36)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(OAuthVerificationRequest::Provider)
                            .string_len(30)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuthVerificationRequest::Email)
                            .string_len(255)
                            .null(),
                    )
                    .col(ColumnDef::new(OAuthVerificationRequest::State).text().null())
                    .col(
                        ColumnDef::new(OAuthVerificationRequest::RedirectUri)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OAuthVerificationRequest::AuthorizationCode)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OAuthVerificationRequest::Nonce)
                            .string_len(36)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OAuthVerificationRequest::Status)
                            .string_len(32)
                            .not_null()
                            .default("not_started"),
                    )
                    .col(
                        ColumnDef::new(OAuthVerificationRequest::ErrorCode)
                            .string_len(64)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OAuthVerificationRequest::OauthFlowStartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OAuthVerificationRequest::OauthCallbackCompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OAuthVerificationRequest::IsArchived)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(OAuthVerificationRequest::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuthVerificationRequest::VerifiedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OAuthVerificationRequest::ArchivedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_oauth_verification_request_application")
                            .from(
                                OAuthVerificationRequest::Table,
                                OAuthVerificationRequest::ApplicationId,
                            )
                            .to(Application::Table, Application::Id),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(OAuthVerificationRequest::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(EmailVerificationRequest::Table)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum Application {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum EmailVerificationRequest {
    Table,
    Id,
    ApplicationId,
    Email,
    Otp,
    IsArchived,
    CreatedAt,
    VerifiedAt,
    ArchivedAt,
}

#[derive(DeriveIden)]
enum OAuthVerificationRequest {
    Table,
    Id,
    ApplicationId,
    Uuid,
    Provider,
    Email,
    State,
    RedirectUri,
    AuthorizationCode,
    Nonce,
    Status,
    ErrorCode,
    OauthFlowStartedAt,
    OauthCallbackCompletedAt,
    IsArchived,
    CreatedAt,
    VerifiedAt,
    ArchivedAt,
}
