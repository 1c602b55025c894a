pub use sea_orm_migration::prelude::*;

mod m20261018_000001_create_registrants;
mod m20261018_000002_create_teams;
mod m20261018_000003_create_verified_accounts;
mod m20261018_000004_create_verification_codes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261018_000001_create_registrants::Migration),
            Box::new(m20261018_000002_create_teams::Migration),
            Box::new(m20261018_000003_create_verified_accounts::Migration),
            Box::new(m20261018_000004_create_verification_codes::Migration),
        ]
    }
}
