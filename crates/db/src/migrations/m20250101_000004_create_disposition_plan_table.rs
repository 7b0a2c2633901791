//! Create `disposition_plan` table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DispositionPlan::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DispositionPlan::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DispositionPlan::UserId)
                            .string_len(32)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(DispositionPlan::Directives)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DispositionPlan::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_disposition_plan_user")
                            .from(DispositionPlan::Table, DispositionPlan::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DispositionPlan::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum DispositionPlan {
    Table,
    Id,
    UserId,
    Directives,
    CreatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
