use sea_orm::entity::prelude::*;

/// One row per registration email. Re-registration updates the row in place.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "registrants")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Lower-cased registration email.
    #[sea_orm(unique)]
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_participant: bool,
    pub is_judge: bool,
    pub is_mentor: bool,
    pub is_capstone: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_one = "super::verified_accounts::Entity")]
    VerifiedAccount,
    #[sea_orm(has_many = "super::verification_codes::Entity")]
    VerificationCodes,
}

impl Related<super::verified_accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VerifiedAccount.def()
    }
}

impl Related<super::verification_codes::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VerificationCodes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
