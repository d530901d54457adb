use crate::errors::OrreryError;
use crate::manager::Manager;
use crate::patch::{self, PatchMode};
use crate::storage::SearchRequest;
use crate::types::{Capability, Entity, EntityMeta};

impl Manager {
    /// Create an entity. A `number` of zero or less allocates the next free
    /// number.
    pub async fn create_entity(&self, id: &str, number: i32, secret: &str) -> Result<(), OrreryError> {
        let mut delta = Entity::new(id);
        delta.number = number;
        delta.secret = Some(secret.to_string());

        self.entity_chain("CREATE", &delta).await?;
        tracing::info!(entity = id, "Created entity");
        Ok(())
    }

    pub async fn destroy_entity(&self, id: &str) -> Result<(), OrreryError> {
        self.entity_chain("DESTROY", &Entity::new(id)).await?;
        tracing::info!(entity = id, "Destroyed entity");
        Ok(())
    }

    /// Check a secret. An unknown entity is reported exactly like a wrong
    /// secret.
    pub async fn validate_secret(&self, id: &str, secret: &str) -> Result<(), OrreryError> {
        let mut delta = Entity::new(id);
        delta.secret = Some(secret.to_string());

        match self.entity_chain("VALIDATE-IDENTITY", &delta).await {
            Ok(_) => Ok(()),
            Err(OrreryError::NotFound(_)) => Err(OrreryError::VerificationFailed),
            Err(e) => Err(e),
        }
    }

    pub async fn change_secret(&self, id: &str, secret: &str) -> Result<(), OrreryError> {
        let mut delta = Entity::new(id);
        delta.secret = Some(secret.to_string());
        self.entity_chain("CHANGE-SECRET", &delta).await?;
        Ok(())
    }

    pub async fn lock_entity(&self, id: &str) -> Result<(), OrreryError> {
        self.entity_chain("LOCK", &Entity::new(id)).await?;
        Ok(())
    }

    pub async fn unlock_entity(&self, id: &str) -> Result<(), OrreryError> {
        self.entity_chain("UNLOCK", &Entity::new(id)).await?;
        Ok(())
    }

    /// Merge the profile fields set in `meta`. Other fields are ignored.
    pub async fn update_entity_meta(&self, id: &str, meta: EntityMeta) -> Result<(), OrreryError> {
        let delta = Entity {
            id: id.to_string(),
            meta,
            ..Default::default()
        };
        self.entity_chain("MERGE-METADATA", &delta).await?;
        Ok(())
    }

    /// Manage public keys stored as `TYPE:material`.
    ///
    /// `ADD` stores the key under the upper-cased type, `DEL` removes every
    /// key containing `key`, and `LIST` returns keys of `key_type` (all keys
    /// when the type is empty or `*`). Every mode returns the resulting list.
    pub async fn update_entity_keys(
        &self,
        id: &str,
        mode: &str,
        key_type: &str,
        key: &str,
    ) -> Result<Vec<String>, OrreryError> {
        let mut delta = Entity::new(id);
        match mode.trim().to_ascii_uppercase().as_str() {
            "ADD" => {
                if key_type.trim().is_empty() {
                    return Err(OrreryError::MalformedRequest("key type must not be empty".into()));
                }
                delta.meta.keys = vec![format!("{}:{}", key_type.trim().to_ascii_uppercase(), key)];
                Ok(self.entity_chain("ADD-KEY", &delta).await?.meta.keys)
            }
            "DEL" => {
                if key.is_empty() {
                    return Err(OrreryError::MalformedRequest("key must not be empty".into()));
                }
                delta.meta.keys = vec![key.to_string()];
                Ok(self.entity_chain("DEL-KEY", &delta).await?.meta.keys)
            }
            "LIST" => {
                let entity = self.refs.storage.load_entity(id).await?;
                let wanted = key_type.trim().to_ascii_uppercase();
                Ok(entity
                    .meta
                    .keys
                    .into_iter()
                    .filter(|k| wanted.is_empty() || wanted == "*" || patch::entry_key(k) == wanted)
                    .collect())
            }
            _ => Err(OrreryError::InvalidMode(mode.to_string())),
        }
    }

    /// Patch or read the entity's untyped `key:value` metadata.
    ///
    /// `READ` consults storage without running a chain. Every mode returns the
    /// resulting (or matching) entries.
    pub async fn manage_entity_um(
        &self,
        id: &str,
        mode: &str,
        key: &str,
        value: &str,
    ) -> Result<Vec<String>, OrreryError> {
        let mode: PatchMode = mode.parse()?;
        if mode == PatchMode::Read {
            let entity = self.refs.storage.load_entity(id).await?;
            return Ok(patch::patch_key_values(&entity.meta.untyped_meta, mode, key, value));
        }

        let mut delta = Entity::new(id);
        delta.meta.untyped_meta = vec![super::um_entry(key, value)?];
        let chain = format!("UM-{}", mode.as_str());
        Ok(self.entity_chain(&chain, &delta).await?.meta.untyped_meta)
    }

    /// Grant a capability by name. Unknown names fail before any chain runs.
    pub async fn set_entity_capability(&self, id: &str, capability: &str) -> Result<(), OrreryError> {
        let cap: Capability = capability.parse()?;
        self.entity_capability_chain("SET-CAPABILITY", id, cap).await
    }

    pub async fn drop_entity_capability(&self, id: &str, capability: &str) -> Result<(), OrreryError> {
        let cap: Capability = capability.parse()?;
        self.entity_capability_chain("DROP-CAPABILITY", id, cap).await
    }

    async fn entity_capability_chain(&self, chain: &str, id: &str, cap: Capability) -> Result<(), OrreryError> {
        let mut delta = Entity::new(id);
        delta.meta.capabilities = vec![cap];
        self.entity_chain(chain, &delta).await?;
        tracing::info!(entity = id, capability = %cap, chain, "Changed entity capability");
        Ok(())
    }

    pub async fn add_entity_to_group(&self, id: &str, group: &str) -> Result<(), OrreryError> {
        let mut delta = Entity::new(id);
        delta.meta.groups = vec![group.to_string()];
        self.entity_chain("ADD-GROUP", &delta).await?;
        Ok(())
    }

    pub async fn remove_entity_from_group(&self, id: &str, group: &str) -> Result<(), OrreryError> {
        let mut delta = Entity::new(id);
        delta.meta.groups = vec![group.to_string()];
        self.entity_chain("DEL-GROUP", &delta).await?;
        Ok(())
    }

    /// The stored entity with its secret removed.
    pub async fn fetch_entity(&self, id: &str) -> Result<Entity, OrreryError> {
        Ok(self.refs.storage.load_entity(id).await?.redacted())
    }

    pub async fn search_entities(&self, req: &SearchRequest) -> Result<Vec<Entity>, OrreryError> {
        let found = self.refs.storage.search_entities(req).await?;
        Ok(found.iter().map(Entity::redacted).collect())
    }
}
