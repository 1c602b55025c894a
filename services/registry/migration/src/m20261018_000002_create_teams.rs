use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // BIGSERIAL: ids are handed out by the sequence and never reused.
        manager
            .create_table(
                Table::create()
                    .table(Teams::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Teams::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Teams::Name).string().not_null().unique_key())
                    .col(
                        ColumnDef::new(Teams::IsCapstone)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Teams::LeadExternalId).string())
                    .col(ColumnDef::new(Teams::RoleId).string().not_null())
                    .col(ColumnDef::new(Teams::CategoryId).string().not_null())
                    .col(ColumnDef::new(Teams::TextId).string().not_null())
                    .col(ColumnDef::new(Teams::VoiceId).string())
                    .col(
                        ColumnDef::new(Teams::FormationDeadline)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Teams::ActivatedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Teams::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Formation sweep scans forming teams by deadline.
        manager
            .create_index(
                Index::create()
                    .table(Teams::Table)
                    .col(Teams::FormationDeadline)
                    .name("idx_teams_formation_deadline")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Teams::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Teams {
    Table,
    Id,
    Name,
    IsCapstone,
    LeadExternalId,
    RoleId,
    CategoryId,
    TextId,
    VoiceId,
    FormationDeadline,
    ActivatedAt,
    CreatedAt,
}
