pub use sea_orm_migration::prelude::*;

mod m20240115_093000_add_application_table;
mod m20240115_094500_add_verification_request_tables;
mod m20240116_120000_add_oauth_token_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240115_093000_add_application_table::Migration),
            Box::new(m20240115_094500_add_verification_request_tables::Migration),
            Box::new(m20240116_120000_add_oauth_token_table::Migration),
        ]
    }
}
