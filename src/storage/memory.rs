use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::storage::{SearchRequest, Storage, StorageError};
use crate::types::{Entity, Group};

/// Process-local storage. Saves replace the whole record under a write lock,
/// so concurrent saves of one record are serialized.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entities: RwLock<BTreeMap<String, Entity>>,
    groups: RwLock<BTreeMap<String, Group>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn discover_entity_ids(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.entities.read().await.keys().cloned().collect())
    }

    async fn load_entity(&self, id: &str) -> Result<Entity, StorageError> {
        self.entities
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("entity `{id}`")))
    }

    async fn save_entity(&self, entity: &Entity) -> Result<(), StorageError> {
        self.entities
            .write()
            .await
            .insert(entity.id.clone(), entity.clone());
        Ok(())
    }

    async fn delete_entity(&self, id: &str) -> Result<(), StorageError> {
        self.entities
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(format!("entity `{id}`")))
    }

    async fn next_entity_number(&self) -> Result<i32, StorageError> {
        let max = self
            .entities
            .read()
            .await
            .values()
            .map(|e| e.number)
            .max()
            .unwrap_or(0);
        Ok(max.max(0) + 1)
    }

    async fn search_entities(&self, req: &SearchRequest) -> Result<Vec<Entity>, StorageError> {
        Ok(self
            .entities
            .read()
            .await
            .values()
            .filter(|e| req.matches(&e.id))
            .cloned()
            .collect())
    }

    async fn discover_group_names(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.groups.read().await.keys().cloned().collect())
    }

    async fn load_group(&self, name: &str) -> Result<Group, StorageError> {
        self.groups
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("group `{name}`")))
    }

    async fn save_group(&self, group: &Group) -> Result<(), StorageError> {
        self.groups
            .write()
            .await
            .insert(group.name.clone(), group.clone());
        Ok(())
    }

    async fn delete_group(&self, name: &str) -> Result<(), StorageError> {
        self.groups
            .write()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(format!("group `{name}`")))
    }

    async fn next_group_number(&self) -> Result<i32, StorageError> {
        let max = self
            .groups
            .read()
            .await
            .values()
            .map(|g| g.number)
            .max()
            .unwrap_or(0);
        Ok(max.max(0) + 1)
    }

    async fn search_groups(&self, req: &SearchRequest) -> Result<Vec<Group>, StorageError> {
        Ok(self
            .groups
            .read()
            .await
            .values()
            .filter(|g| req.matches(&g.name))
            .cloned()
            .collect())
    }
}
