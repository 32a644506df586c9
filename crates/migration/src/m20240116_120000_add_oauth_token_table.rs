//! Migration creating the `oauth_token` table.
//!
//! Stores upstream access/refresh tokens for applications registered with
//! `store_tokens`. Rows are write-once; a stored, unexpired access token also
//! serves as a bearer credential for the application.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OAuthToken::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuthToken::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OAuthToken::ApplicationId).integer().not_null())
                    .col(
                        ColumnDef::new(OAuthToken::AccessToken)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OAuthToken::RefreshToken).text().null())
                    .col(
                        ColumnDef::new(OAuthToken::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuthToken::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_oauth_token_application")
                            .from(OAuthToken::Table, OAuthToken::ApplicationId)
                            .to(Application::Table, Application::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Bearer auth resolves applications by access token
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth_token_access_token")
                    .table(OAuthToken::Table)
                    .col(OAuthToken::AccessToken)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OAuthToken::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Application {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum OAuthToken {
    Table,
    Id,
    ApplicationId,
    AccessToken,
    RefreshToken,
    ExpiresAt,
    CreatedAt,
}
