//! Create watch table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Watch::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Watch::Id).string_len(32).not_null().primary_key())
                    .col(ColumnDef::new(Watch::UserId).string_len(32).not_null())
                    .col(ColumnDef::new(Watch::MovieId).string_len(64).not_null())
                    .col(ColumnDef::new(Watch::WatchedAt).timestamp_with_time_zone().not_null())
                    .col(ColumnDef::new(Watch::Rating).small_integer())
                    .col(ColumnDef::new(Watch::Notes).text())
                    .col(ColumnDef::new(Watch::IsPrivate).boolean().not_null().default(false))
                    .col(
                        ColumnDef::new(Watch::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Watch::UpdatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_watch_user")
                            .from(Watch::Table, Watch::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: (user_id, watched_at) for per-user history and group feeds
        manager
            .create_index(
                Index::create()
                    .name("idx_watch_user_id_watched_at")
                    .table(Watch::Table)
                    .col(Watch::UserId)
                    .col(Watch::WatchedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_watch_movie_id")
                    .table(Watch::Table)
                    .col(Watch::MovieId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Watch::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Watch {
    Table,
    Id,
    UserId,
    MovieId,
    WatchedAt,
    Rating,
    Notes,
    IsPrivate,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
