//! Create user table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(User::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(User::Id).string_len(32).not_null().primary_key())
                    .col(ColumnDef::new(User::Username).string_len(128).not_null().unique_key())
                    .col(ColumnDef::new(User::PasswordHash).string_len(256))
                    .col(ColumnDef::new(User::IsPremium).boolean().not_null().default(false))
                    .col(ColumnDef::new(User::ShareWatches).boolean().not_null().default(true))
                    .col(ColumnDef::new(User::ShareRatings).boolean().not_null().default(true))
                    .col(ColumnDef::new(User::ShareNotes).boolean().not_null().default(false))
                    .col(
                        ColumnDef::new(User::AccountStatus)
                            .string_len(20)
                            .not_null()
                            .default("active"),
                    )
                    .col(ColumnDef::new(User::DeactivatedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(User::DeletionRequestedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(User::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(User::UpdatedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // Index: (account_status, deletion_requested_at) for the finalization sweep
        manager
            .create_index(
                Index::create()
                    .name("idx_user_status_deletion_requested_at")
                    .table(User::Table)
                    .col(User::AccountStatus)
                    .col(User::DeletionRequestedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(User::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum User {
    Table,
    Id,
    Username,
    PasswordHash,
    IsPremium,
    ShareWatches,
    ShareRatings,
    ShareNotes,
    AccountStatus,
    DeactivatedAt,
    DeletionRequestedAt,
    CreatedAt,
    UpdatedAt,
}
