use sea_orm::entity::prelude::*;

/// Binding of a registrant to exactly one chat-platform account.
/// Keyed by the registrant email, so a registrant has at most one account.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "verified_accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub registrant_email: String,
    #[sea_orm(unique)]
    pub external_id: String,
    pub display_name: String,
    /// Team the account currently belongs to; the only column mutated after insert.
    pub team_id: Option<i64>,
    pub verified_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::registrants::Entity",
        from = "Column::RegistrantEmail",
        to = "super::registrants::Column::Email",
        on_delete = "Cascade"
    )]
    Registrant,
    #[sea_orm(
        belongs_to = "super::teams::Entity",
        from = "Column::TeamId",
        to = "super::teams::Column::Id",
        on_delete = "SetNull"
    )]
    Team,
}

impl Related<super::registrants::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Registrant.def()
    }
}

impl Related<super::teams::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Team.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
