pub mod error;
pub mod migrations;
pub mod migrator;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use error::StorageError;
pub use migrations::{Migration, MigrationHook, MIGRATIONS};
pub use migrator::{MigrationEngine, SchemaIssue, SchemaReport, UpgradeReport, UpgradeTarget};
pub use sqlite::SqliteStorage;
pub use traits::*;
