use sea_orm_migration::prelude::*;

mod m20261001_000001_create_clinic_tables;
mod m20261001_000002_create_users_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_create_clinic_tables::Migration),
            Box::new(m20261001_000002_create_users_table::Migration),
        ]
    }
}
