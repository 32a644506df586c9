//! Migration creating the `application` table: one row per registered custom GPT
//! application, carrying its verification settings and OAuth2 client credentials.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Application::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Application::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Application::Uuid)
                            .string_len(36)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Application::GptName).string().not_null())
                    .col(
                        ColumnDef::new(Application::GptUrl)
                            .text()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Application::GptDescription).text().null())
                    .col(
                        ColumnDef::new(Application::VerificationMedium)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Application::TokenExpirySecs)
                            .big_integer()
                            .not_null()
                            .default(300),
                    )
                    .col(
                        ColumnDef::new(Application::ApiKey)
                            .string_len(36)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Application::ClientId)
                            .string_len(36)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Application::ClientSecret)
                            .string_len(36)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Application::StoreTokens)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Application::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Application::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Application::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Application {
    Table,
    Id,
    Uuid,
    GptName,
    GptUrl,
    GptDescription,
    VerificationMedium,
    TokenExpirySecs,
    ApiKey,
    ClientId,
    ClientSecret,
    StoreTokens,
    CreatedAt,
    UpdatedAt,
}
