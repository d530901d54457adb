use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create entities table; profile, capabilities, groups and keys live in `meta` as JSON
        manager
            .create_table(
                Table::create()
                    .table(Entities::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Entities::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Entities::Number)
                            .integer()
                            .not_null()
                            .unique_key(),
                    )
                    .col(string_null(Entities::Secret))
                    .col(string(Entities::Meta))
                    .col(big_integer(Entities::CreatedAt))
                    .col(big_integer(Entities::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        // Create groups table
        manager
            .create_table(
                Table::create()
                    .table(Groups::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Groups::Name)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(Groups::DisplayName))
                    .col(
                        ColumnDef::new(Groups::Number)
                            .integer()
                            .not_null()
                            .unique_key(),
                    )
                    .col(string_null(Groups::ManagedBy))
                    .col(string(Groups::Capabilities))
                    .col(string(Groups::Expansions))
                    .col(string(Groups::UntypedMeta))
                    .col(big_integer(Groups::CreatedAt))
                    .col(big_integer(Groups::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        // Create index on groups.managed_by
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_groups_managed_by")
                    .table(Groups::Table)
                    .col(Groups::ManagedBy)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Groups::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Entities::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Entities {
    Table,
    Id,
    Number,
    Secret,
    Meta,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Groups {
    Table,
    Name,
    DisplayName,
    Number,
    ManagedBy,
    Capabilities,
    Expansions,
    UntypedMeta,
    CreatedAt,
    UpdatedAt,
}
