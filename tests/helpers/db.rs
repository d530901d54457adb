use std::sync::Arc;

use migration::MigratorTrait;
use orrery::crypto::Argon2Crypto;
use orrery::hooks::RefContext;
use orrery::storage::{MemoryStorage, SqlStorage};
use orrery::Manager;
use sea_orm::{Database, DatabaseConnection};
use tempfile::NamedTempFile;

/// Test database with automatic cleanup
pub struct TestDb {
    connection: DatabaseConnection,
    _temp_file: NamedTempFile,
}

impl TestDb {
    /// Create a new test database with migrations applied
    pub async fn new() -> Self {
        // Create temporary SQLite database file
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_path = temp_file.path().to_str().expect("Invalid temp file path");
        let db_url = format!("sqlite://{}?mode=rwc", db_path);

        let connection = Database::connect(&db_url)
            .await
            .expect("Failed to connect to test database");

        migration::Migrator::up(&connection, None)
            .await
            .expect("Failed to run migrations");

        Self {
            connection,
            _temp_file: temp_file,
        }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    pub fn refs(&self) -> RefContext {
        RefContext::new(
            Arc::new(SqlStorage::new(self.connection.clone())),
            Arc::new(Argon2Crypto::new()),
        )
    }

    /// Manager with the built-in chains over this database
    pub fn manager(&self) -> Manager {
        Manager::with_defaults(self.refs()).expect("Failed to build manager")
    }
}

/// Manager with the built-in chains over in-memory storage
pub fn memory_manager() -> Manager {
    let refs = RefContext::new(Arc::new(MemoryStorage::new()), Arc::new(Argon2Crypto::new()));
    Manager::with_defaults(refs).expect("Failed to build manager")
}
