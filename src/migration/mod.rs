use sea_orm_migration::prelude::*;

mod m20250601_000001_create_users_table;
mod m20250601_000002_create_todos_table;
mod m20250601_000003_create_notes_table;
mod m20250601_000004_create_refresh_tokens;
mod m20250601_000005_add_token_indexes;
mod m20250601_000006_case_insensitive_identity;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_000001_create_users_table::Migration),
            Box::new(m20250601_000002_create_todos_table::Migration),
            Box::new(m20250601_000003_create_notes_table::Migration),
            Box::new(m20250601_000004_create_refresh_tokens::Migration),
            Box::new(m20250601_000005_add_token_indexes::Migration),
            Box::new(m20250601_000006_case_insensitive_identity::Migration),
        ]
    }
}
