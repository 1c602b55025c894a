use sea_orm::entity::prelude::*;

/// Outstanding one-time verification code.
/// At most one row per external account and per registrant email.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "verification_codes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub code: String,
    #[sea_orm(unique)]
    pub external_id: String,
    #[sea_orm(unique)]
    pub registrant_email: String,
    pub issued_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
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
}

impl Related<super::registrants::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Registrant.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
