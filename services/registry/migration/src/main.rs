use sea_orm_migration::prelude::*;

use checkpoint_registry_migration::Migrator;

#[tokio::main]
async fn main() {
    cli::run_cli(Migrator).await;
}
