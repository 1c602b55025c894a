use sea_orm::entity::prelude::*;

/// A team and the chat-platform handles created for it.
///
/// `id` comes from a `BIGSERIAL` sequence and is never reused. A team is
/// forming while `activated_at` is null; the formation sweep deletes forming
/// teams whose `formation_deadline` has passed.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "teams")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub name: String,
    pub is_capstone: bool,
    pub lead_external_id: Option<String>,
    pub role_id: String,
    pub category_id: String,
    pub text_id: String,
    pub voice_id: Option<String>,
    pub formation_deadline: chrono::DateTime<chrono::Utc>,
    pub activated_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::verified_accounts::Entity")]
    Members,
}

impl Related<super::verified_accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Members.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
