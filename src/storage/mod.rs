//! Persistence contract consumed by hooks and the membership resolver.
//!
//! The core never locks records itself; implementations are responsible for
//! keeping concurrent saves of the same record from interleaving.

pub mod memory;
pub mod sql;

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Entity, Group};

pub use memory::MemoryStorage;
pub use sql::SqlStorage;

#[derive(Debug, Error, Diagnostic)]
pub enum StorageError {
    #[error("{0} does not exist")]
    #[diagnostic(code(orrery::storage::not_found))]
    NotFound(String),

    #[error("Database error: {0}")]
    #[diagnostic(code(orrery::storage::db))]
    Db(#[from] sea_orm::DbErr),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(orrery::storage::serde))]
    Serde(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    #[diagnostic(code(orrery::storage::unavailable))]
    Unavailable(String),
}

/// Filter for entity and group searches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Substring matched against the record identifier. Empty matches all.
    pub expression: String,
}

impl SearchRequest {
    pub fn new(expression: &str) -> Self {
        Self {
            expression: expression.to_string(),
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        self.expression.is_empty() || key.contains(self.expression.as_str())
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn discover_entity_ids(&self) -> Result<Vec<String>, StorageError>;
    async fn load_entity(&self, id: &str) -> Result<Entity, StorageError>;
    async fn save_entity(&self, entity: &Entity) -> Result<(), StorageError>;
    async fn delete_entity(&self, id: &str) -> Result<(), StorageError>;
    async fn next_entity_number(&self) -> Result<i32, StorageError>;
    async fn search_entities(&self, req: &SearchRequest) -> Result<Vec<Entity>, StorageError>;

    async fn discover_group_names(&self) -> Result<Vec<String>, StorageError>;
    async fn load_group(&self, name: &str) -> Result<Group, StorageError>;
    async fn save_group(&self, group: &Group) -> Result<(), StorageError>;
    async fn delete_group(&self, name: &str) -> Result<(), StorageError>;
    async fn next_group_number(&self) -> Result<i32, StorageError>;
    async fn search_groups(&self, req: &SearchRequest) -> Result<Vec<Group>, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_request_matches() {
        assert!(SearchRequest::default().matches("anything"));
        assert!(SearchRequest::new("adm").matches("sysadmins"));
        assert!(!SearchRequest::new("adm").matches("users"));
    }
}
