use sea_orm_migration::prelude::*;
use sea_orm_migration::schema::*;

use crate::m20251018_000001_create_users_table::Users;

#[derive(DeriveMigrationName)]
pub struct Migration;

const FK_TASKS_TO_USERS: &str = "fk-tasks-user_id";
const IDX_TASKS_USER_ID_CREATED_AT: &str = "idx-tasks-user_id-created_at";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Tasks::Table)
                    .if_not_exists()
                    .col(pk_auto(Tasks::Id))
                    .col(integer(Tasks::UserId))
                    .col(text(Tasks::Description))
                    .col(date_null(Tasks::DueDate))
                    .col(string_len(Tasks::Status, 20).default("in-progress"))
                    .col(date_null(Tasks::CompleteDate))
                    .col(
                        timestamp_with_time_zone(Tasks::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Tasks::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name(FK_TASKS_TO_USERS)
                            .from(Tasks::Table, Tasks::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::NoAction),
                    )
                    .to_owned(),
            )
            .await?;

        // Every task query filters by owner and sorts by creation time.
        manager
            .create_index(
                Index::create()
                    .name(IDX_TASKS_USER_ID_CREATED_AT)
                    .table(Tasks::Table)
                    .col(Tasks::UserId)
                    .col(Tasks::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name(IDX_TASKS_USER_ID_CREATED_AT)
                    .table(Tasks::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Tasks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Tasks {
    Table,
    Id,
    UserId,
    Description,
    DueDate,
    Status,
    CompleteDate,
    CreatedAt,
    UpdatedAt,
}
