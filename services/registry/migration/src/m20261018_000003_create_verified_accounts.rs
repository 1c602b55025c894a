use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(VerifiedAccounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VerifiedAccounts::RegistrantEmail)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(VerifiedAccounts::ExternalId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(VerifiedAccounts::DisplayName)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(VerifiedAccounts::TeamId).big_integer())
                    .col(
                        ColumnDef::new(VerifiedAccounts::VerifiedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(VerifiedAccounts::Table, VerifiedAccounts::RegistrantEmail)
                            .to(Registrants::Table, Registrants::Email)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(VerifiedAccounts::Table, VerifiedAccounts::TeamId)
                            .to(Teams::Table, Teams::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(VerifiedAccounts::Table)
                    .col(VerifiedAccounts::TeamId)
                    .name("idx_verified_accounts_team_id")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(VerifiedAccounts::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum VerifiedAccounts {
    Table,
    RegistrantEmail,
    ExternalId,
    DisplayName,
    TeamId,
    VerifiedAt,
}

#[derive(Iden)]
enum Registrants {
    Table,
    Email,
}

#[derive(Iden)]
enum Teams {
    Table,
    Id,
}
