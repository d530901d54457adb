use async_trait::async_trait;
use std::sync::Arc;

use crate::chain::HookRegistry;
use crate::crypto::Crypto;
use crate::errors::OrreryError;
use crate::hooks::{found, Hook, RefContext};
use crate::patch::{self, PatchMode};
use crate::storage::Storage;
use crate::types::{insert_capability, remove_capability, Entity};

pub(crate) fn register(registry: &mut HookRegistry) -> Result<(), OrreryError> {
    registry.register_entity_hook("fail-on-existing-entity", |c| {
        Ok(Box::new(FailOnExistingEntity { storage: c.storage.clone() }))
    })?;
    registry.register_entity_hook("create-entity-if-missing", |c| {
        Ok(Box::new(CreateEntityIfMissing { storage: c.storage.clone() }))
    })?;
    registry.register_entity_hook("load-entity", |c| {
        Ok(Box::new(LoadEntity { storage: c.storage.clone() }))
    })?;
    registry.register_entity_hook("set-entity-id", |_| Ok(Box::new(SetEntityId)))?;
    registry.register_entity_hook("set-entity-number", |c| {
        Ok(Box::new(SetEntityNumber { storage: c.storage.clone() }))
    })?;
    registry.register_entity_hook("set-entity-secret", |c| {
        Ok(Box::new(SetEntitySecret { crypto: c.crypto.clone() }))
    })?;
    registry.register_entity_hook("validate-entity-unlocked", |_| {
        Ok(Box::new(ValidateEntityUnlocked))
    })?;
    registry.register_entity_hook("validate-entity-secret", |c| {
        Ok(Box::new(ValidateEntitySecret { crypto: c.crypto.clone() }))
    })?;
    registry.register_entity_hook("lock-entity", |_| {
        Ok(Box::new(SetEntityLock { name: "lock-entity", locked: true }))
    })?;
    registry.register_entity_hook("unlock-entity", |_| {
        Ok(Box::new(SetEntityLock { name: "unlock-entity", locked: false }))
    })?;
    registry.register_entity_hook("merge-entity-meta", |_| Ok(Box::new(MergeEntityMeta)))?;
    registry.register_entity_hook("set-entity-capability", |_| {
        Ok(Box::new(PatchEntityCapabilities { name: "set-entity-capability", insert: true }))
    })?;
    registry.register_entity_hook("remove-entity-capability", |_| {
        Ok(Box::new(PatchEntityCapabilities { name: "remove-entity-capability", insert: false }))
    })?;
    registry.register_entity_hook("add-entity-key", |_| {
        Ok(Box::new(PatchEntityKeys { name: "add-entity-key", insert: true }))
    })?;
    registry.register_entity_hook("del-entity-key", |_| {
        Ok(Box::new(PatchEntityKeys { name: "del-entity-key", insert: false }))
    })?;
    registry.register_entity_hook("add-direct-group", |c| {
        Ok(Box::new(PatchDirectGroups {
            name: "add-direct-group",
            insert: true,
            storage: c.storage.clone(),
        }))
    })?;
    registry.register_entity_hook("del-direct-group", |c| {
        Ok(Box::new(PatchDirectGroups {
            name: "del-direct-group",
            insert: false,
            storage: c.storage.clone(),
        }))
    })?;
    registry.register_entity_hook("patch-entity-um-upsert", |_| {
        Ok(Box::new(PatchEntityUntypedMeta { name: "patch-entity-um-upsert", mode: PatchMode::Upsert }))
    })?;
    registry.register_entity_hook("patch-entity-um-clearfuzzy", |_| {
        Ok(Box::new(PatchEntityUntypedMeta {
            name: "patch-entity-um-clearfuzzy",
            mode: PatchMode::ClearFuzzy,
        }))
    })?;
    registry.register_entity_hook("patch-entity-um-clearexact", |_| {
        Ok(Box::new(PatchEntityUntypedMeta {
            name: "patch-entity-um-clearexact",
            mode: PatchMode::ClearExact,
        }))
    })?;
    registry.register_entity_hook("save-entity", |c| {
        Ok(Box::new(SaveEntity { storage: c.storage.clone() }))
    })?;
    registry.register_entity_hook("destroy-entity", |c| {
        Ok(Box::new(DestroyEntity { storage: c.storage.clone() }))
    })?;
    Ok(())
}

/// Refuses to continue when an entity with the delta's id is already stored.
struct FailOnExistingEntity {
    storage: Arc<dyn Storage>,
}

#[async_trait]
impl Hook<Entity> for FailOnExistingEntity {
    fn name(&self) -> &str {
        "fail-on-existing-entity"
    }

    fn priority(&self) -> i32 {
        0
    }

    async fn run(&self, _current: &mut Entity, delta: &Entity) -> Result<(), OrreryError> {
        match found(self.storage.load_entity(&delta.id).await)? {
            Some(_) => Err(OrreryError::AlreadyExists(format!("entity `{}`", delta.id))),
            None => Ok(()),
        }
    }
}

/// Loads the entity if it exists, otherwise starts a fresh one with the
/// delta's id. Used where it does not matter which of the two happens.
struct CreateEntityIfMissing {
    storage: Arc<dyn Storage>,
}

#[async_trait]
impl Hook<Entity> for CreateEntityIfMissing {
    fn name(&self) -> &str {
        "create-entity-if-missing"
    }

    fn priority(&self) -> i32 {
        1
    }

    async fn run(&self, current: &mut Entity, delta: &Entity) -> Result<(), OrreryError> {
        *current = match found(self.storage.load_entity(&delta.id).await)? {
            Some(existing) => existing,
            None => Entity::new(&delta.id),
        };
        Ok(())
    }
}

struct LoadEntity {
    storage: Arc<dyn Storage>,
}

#[async_trait]
impl Hook<Entity> for LoadEntity {
    fn name(&self) -> &str {
        "load-entity"
    }

    fn priority(&self) -> i32 {
        0
    }

    async fn run(&self, current: &mut Entity, delta: &Entity) -> Result<(), OrreryError> {
        *current = self.storage.load_entity(&delta.id).await?;
        Ok(())
    }
}

struct SetEntityId;

#[async_trait]
impl Hook<Entity> for SetEntityId {
    fn name(&self) -> &str {
        "set-entity-id"
    }

    fn priority(&self) -> i32 {
        20
    }

    async fn run(&self, current: &mut Entity, delta: &Entity) -> Result<(), OrreryError> {
        if delta.id.trim().is_empty() {
            return Err(OrreryError::MalformedRequest("entity id must not be empty".into()));
        }
        current.id = delta.id.clone();
        Ok(())
    }
}

/// A positive number in the delta is taken as-is. Otherwise an entity that
/// has no number yet is given the next free one.
struct SetEntityNumber {
    storage: Arc<dyn Storage>,
}

#[async_trait]
impl Hook<Entity> for SetEntityNumber {
    fn name(&self) -> &str {
        "set-entity-number"
    }

    fn priority(&self) -> i32 {
        25
    }

    async fn run(&self, current: &mut Entity, delta: &Entity) -> Result<(), OrreryError> {
        if delta.number > 0 {
            current.number = delta.number;
        } else if current.number <= 0 {
            current.number = self.storage.next_entity_number().await?;
        }
        Ok(())
    }
}

struct SetEntitySecret {
    crypto: Arc<dyn Crypto>,
}

#[async_trait]
impl Hook<Entity> for SetEntitySecret {
    fn name(&self) -> &str {
        "set-entity-secret"
    }

    fn priority(&self) -> i32 {
        30
    }

    async fn run(&self, current: &mut Entity, delta: &Entity) -> Result<(), OrreryError> {
        let plain = delta
            .secret
            .as_deref()
            .ok_or_else(|| OrreryError::MalformedRequest("no secret supplied".into()))?;
        current.secret = Some(self.crypto.secure_secret(plain)?);
        Ok(())
    }
}

struct ValidateEntityUnlocked;

#[async_trait]
impl Hook<Entity> for ValidateEntityUnlocked {
    fn name(&self) -> &str {
        "validate-entity-unlocked"
    }

    fn priority(&self) -> i32 {
        40
    }

    async fn run(&self, current: &mut Entity, _delta: &Entity) -> Result<(), OrreryError> {
        if current.meta.locked {
            return Err(OrreryError::EntityLocked);
        }
        Ok(())
    }
}

/// Compares the delta's plaintext secret with the sealed copy on `current`.
struct ValidateEntitySecret {
    crypto: Arc<dyn Crypto>,
}

#[async_trait]
impl Hook<Entity> for ValidateEntitySecret {
    fn name(&self) -> &str {
        "validate-entity-secret"
    }

    fn priority(&self) -> i32 {
        50
    }

    async fn run(&self, current: &mut Entity, delta: &Entity) -> Result<(), OrreryError> {
        let sealed = current.secret.as_deref().ok_or(OrreryError::VerificationFailed)?;
        let candidate = delta.secret.as_deref().unwrap_or_default();
        self.crypto.verify_secret(candidate, sealed)
    }
}

struct SetEntityLock {
    name: &'static str,
    locked: bool,
}

#[async_trait]
impl Hook<Entity> for SetEntityLock {
    fn name(&self) -> &str {
        self.name
    }

    fn priority(&self) -> i32 {
        50
    }

    async fn run(&self, current: &mut Entity, _delta: &Entity) -> Result<(), OrreryError> {
        current.meta.locked = self.locked;
        Ok(())
    }
}

struct MergeEntityMeta;

#[async_trait]
impl Hook<Entity> for MergeEntityMeta {
    fn name(&self) -> &str {
        "merge-entity-meta"
    }

    fn priority(&self) -> i32 {
        50
    }

    async fn run(&self, current: &mut Entity, delta: &Entity) -> Result<(), OrreryError> {
        current.meta.merge_profile(&delta.meta);
        Ok(())
    }
}

struct PatchEntityCapabilities {
    name: &'static str,
    insert: bool,
}

#[async_trait]
impl Hook<Entity> for PatchEntityCapabilities {
    fn name(&self) -> &str {
        self.name
    }

    fn priority(&self) -> i32 {
        50
    }

    async fn run(&self, current: &mut Entity, delta: &Entity) -> Result<(), OrreryError> {
        if delta.meta.capabilities.is_empty() {
            return Err(OrreryError::MalformedRequest("no capability supplied".into()));
        }
        for cap in &delta.meta.capabilities {
            if self.insert {
                insert_capability(&mut current.meta.capabilities, *cap);
            } else {
                remove_capability(&mut current.meta.capabilities, *cap);
            }
        }
        Ok(())
    }
}

/// Keys are added by exact entry and removed by any entry containing the
/// delta's text, so a key can be dropped by its material alone.
struct PatchEntityKeys {
    name: &'static str,
    insert: bool,
}

#[async_trait]
impl Hook<Entity> for PatchEntityKeys {
    fn name(&self) -> &str {
        self.name
    }

    fn priority(&self) -> i32 {
        50
    }

    async fn run(&self, current: &mut Entity, delta: &Entity) -> Result<(), OrreryError> {
        if delta.meta.keys.is_empty() {
            return Err(OrreryError::MalformedRequest("no key supplied".into()));
        }
        for key in &delta.meta.keys {
            if self.insert {
                let (_, material) = patch::split_entry(key)?;
                if material.is_empty() {
                    return Err(OrreryError::MalformedRequest(format!("key `{key}` has no material")));
                }
            }
            current.meta.keys = patch::patch_string_set(&current.meta.keys, key, self.insert, self.insert);
        }
        Ok(())
    }
}

/// Adding a direct membership requires the group to exist; removal does not,
/// so stale names left behind by a destroyed group can be cleaned up.
struct PatchDirectGroups {
    name: &'static str,
    insert: bool,
    storage: Arc<dyn Storage>,
}

#[async_trait]
impl Hook<Entity> for PatchDirectGroups {
    fn name(&self) -> &str {
        self.name
    }

    fn priority(&self) -> i32 {
        50
    }

    async fn run(&self, current: &mut Entity, delta: &Entity) -> Result<(), OrreryError> {
        if delta.meta.groups.is_empty() {
            return Err(OrreryError::MalformedRequest("no group supplied".into()));
        }
        for group in &delta.meta.groups {
            if self.insert {
                self.storage.load_group(group).await?;
            }
            current.meta.groups = patch::patch_string_set(&current.meta.groups, group, self.insert, true);
        }
        Ok(())
    }
}

/// Applies each `key:value` entry of the delta's untyped metadata with a
/// fixed patch mode.
struct PatchEntityUntypedMeta {
    name: &'static str,
    mode: PatchMode,
}

#[async_trait]
impl Hook<Entity> for PatchEntityUntypedMeta {
    fn name(&self) -> &str {
        self.name
    }

    fn priority(&self) -> i32 {
        50
    }

    async fn run(&self, current: &mut Entity, delta: &Entity) -> Result<(), OrreryError> {
        for entry in &delta.meta.untyped_meta {
            let (key, value) = patch::split_entry(entry)?;
            current.meta.untyped_meta =
                patch::patch_key_values(&current.meta.untyped_meta, self.mode, key, value);
        }
        Ok(())
    }
}

struct SaveEntity {
    storage: Arc<dyn Storage>,
}

#[async_trait]
impl Hook<Entity> for SaveEntity {
    fn name(&self) -> &str {
        "save-entity"
    }

    fn priority(&self) -> i32 {
        99
    }

    async fn run(&self, current: &mut Entity, _delta: &Entity) -> Result<(), OrreryError> {
        self.storage.save_entity(current).await?;
        Ok(())
    }
}

struct DestroyEntity {
    storage: Arc<dyn Storage>,
}

#[async_trait]
impl Hook<Entity> for DestroyEntity {
    fn name(&self) -> &str {
        "destroy-entity"
    }

    fn priority(&self) -> i32 {
        99
    }

    async fn run(&self, current: &mut Entity, _delta: &Entity) -> Result<(), OrreryError> {
        self.storage.delete_entity(&current.id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PlainCrypto;
    use crate::storage::MemoryStorage;
    use crate::types::{Capability, Group};

    fn refs() -> (RefContext, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        (RefContext::new(storage.clone(), Arc::new(PlainCrypto)), storage)
    }

    fn hook(name: &str, refs: &RefContext) -> Box<dyn Hook<Entity>> {
        let mut registry = HookRegistry::new();
        register(&mut registry).unwrap();
        registry.entity_hook(name, refs).unwrap()
    }

    #[tokio::test]
    async fn test_fail_on_existing_entity() {
        let (ctx, storage) = refs();
        let h = hook("fail-on-existing-entity", &ctx);
        let delta = Entity::new("alice");

        h.run(&mut Entity::default(), &delta).await.unwrap();

        storage.save_entity(&delta).await.unwrap();
        let err = h.run(&mut Entity::default(), &delta).await.unwrap_err();
        assert!(matches!(err, OrreryError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_create_if_missing_loads_existing() {
        let (ctx, storage) = refs();
        let mut stored = Entity::new("root");
        stored.number = 4;
        storage.save_entity(&stored).await.unwrap();

        let h = hook("create-entity-if-missing", &ctx);
        let mut current = Entity::default();
        h.run(&mut current, &Entity::new("root")).await.unwrap();
        assert_eq!(current.number, 4);

        let mut fresh = Entity::default();
        h.run(&mut fresh, &Entity::new("other")).await.unwrap();
        assert_eq!(fresh.id, "other");
        assert_eq!(fresh.number, 0);
    }

    #[tokio::test]
    async fn test_load_entity_missing() {
        let (ctx, _) = refs();
        let err = hook("load-entity", &ctx)
            .run(&mut Entity::default(), &Entity::new("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrreryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_set_entity_number_allocates_or_keeps() {
        let (ctx, storage) = refs();
        let mut other = Entity::new("other");
        other.number = 10;
        storage.save_entity(&other).await.unwrap();

        let h = hook("set-entity-number", &ctx);

        let mut current = Entity::new("a");
        h.run(&mut current, &Entity::new("a")).await.unwrap();
        assert_eq!(current.number, 11);

        let mut explicit = Entity::new("b");
        explicit.number = 500;
        let mut current = Entity::new("b");
        h.run(&mut current, &explicit).await.unwrap();
        assert_eq!(current.number, 500);

        let mut numbered = Entity::new("c");
        numbered.number = 3;
        h.run(&mut numbered, &Entity::new("c")).await.unwrap();
        assert_eq!(numbered.number, 3);
    }

    #[tokio::test]
    async fn test_secret_set_then_validate() {
        let (ctx, _) = refs();
        let mut delta = Entity::new("alice");
        delta.secret = Some("pw".into());

        let mut current = Entity::new("alice");
        hook("set-entity-secret", &ctx).run(&mut current, &delta).await.unwrap();
        assert_eq!(current.secret.as_deref(), Some("sealed:pw"));

        let validate = hook("validate-entity-secret", &ctx);
        validate.run(&mut current, &delta).await.unwrap();

        delta.secret = Some("wrong".into());
        let err = validate.run(&mut current, &delta).await.unwrap_err();
        assert!(matches!(err, OrreryError::VerificationFailed));
    }

    #[tokio::test]
    async fn test_validate_secret_without_stored_secret() {
        let (ctx, _) = refs();
        let mut delta = Entity::new("alice");
        delta.secret = Some("pw".into());
        let err = hook("validate-entity-secret", &ctx)
            .run(&mut Entity::new("alice"), &delta)
            .await
            .unwrap_err();
        assert!(matches!(err, OrreryError::VerificationFailed));
    }

    #[tokio::test]
    async fn test_lock_then_validate_unlocked() {
        let (ctx, _) = refs();
        let mut current = Entity::new("alice");
        let delta = Entity::new("alice");

        hook("lock-entity", &ctx).run(&mut current, &delta).await.unwrap();
        let err = hook("validate-entity-unlocked", &ctx)
            .run(&mut current, &delta)
            .await
            .unwrap_err();
        assert!(matches!(err, OrreryError::EntityLocked));

        hook("unlock-entity", &ctx).run(&mut current, &delta).await.unwrap();
        assert!(!current.meta.locked);
    }

    #[tokio::test]
    async fn test_capability_patch_is_idempotent() {
        let (ctx, _) = refs();
        let mut delta = Entity::new("alice");
        delta.meta.capabilities = vec![Capability::CreateGroup];

        let mut current = Entity::new("alice");
        let set = hook("set-entity-capability", &ctx);
        set.run(&mut current, &delta).await.unwrap();
        set.run(&mut current, &delta).await.unwrap();
        assert_eq!(current.meta.capabilities, vec![Capability::CreateGroup]);

        hook("remove-entity-capability", &ctx)
            .run(&mut current, &delta)
            .await
            .unwrap();
        assert!(current.meta.capabilities.is_empty());
    }

    #[tokio::test]
    async fn test_keys_add_and_remove_by_material() {
        let (ctx, _) = refs();
        let mut current = Entity::new("alice");

        let mut delta = Entity::new("alice");
        delta.meta.keys = vec!["SSH:ssh-ed25519 AAAA".into()];
        hook("add-entity-key", &ctx).run(&mut current, &delta).await.unwrap();
        assert_eq!(current.meta.keys, vec!["SSH:ssh-ed25519 AAAA".to_string()]);

        delta.meta.keys = vec!["AAAA".into()];
        hook("del-entity-key", &ctx).run(&mut current, &delta).await.unwrap();
        assert!(current.meta.keys.is_empty());
    }

    #[tokio::test]
    async fn test_add_key_requires_type() {
        let (ctx, _) = refs();
        let mut delta = Entity::new("alice");
        delta.meta.keys = vec!["untyped-material".into()];
        let err = hook("add-entity-key", &ctx)
            .run(&mut Entity::new("alice"), &delta)
            .await
            .unwrap_err();
        assert!(matches!(err, OrreryError::MalformedRequest(_)));
    }

    #[tokio::test]
    async fn test_add_direct_group_requires_group() {
        let (ctx, storage) = refs();
        let mut delta = Entity::new("alice");
        delta.meta.groups = vec!["staff".into()];
        let h = hook("add-direct-group", &ctx);

        let err = h.run(&mut Entity::new("alice"), &delta).await.unwrap_err();
        assert!(matches!(err, OrreryError::NotFound(_)));

        storage.save_group(&Group::new("staff")).await.unwrap();
        let mut current = Entity::new("alice");
        h.run(&mut current, &delta).await.unwrap();
        assert_eq!(current.meta.groups, vec!["staff".to_string()]);
    }

    #[tokio::test]
    async fn test_untyped_meta_upsert_and_clear() {
        let (ctx, _) = refs();
        let mut current = Entity::new("alice");
        current.meta.untyped_meta = vec!["mail{0}:a@x".into(), "mail{1}:b@x".into()];

        let mut delta = Entity::new("alice");
        delta.meta.untyped_meta = vec!["office:B12".into()];
        hook("patch-entity-um-upsert", &ctx).run(&mut current, &delta).await.unwrap();
        assert!(current.meta.untyped_meta.contains(&"office:B12".to_string()));

        delta.meta.untyped_meta = vec!["mail:".into()];
        hook("patch-entity-um-clearfuzzy", &ctx)
            .run(&mut current, &delta)
            .await
            .unwrap();
        assert_eq!(current.meta.untyped_meta, vec!["office:B12".to_string()]);
    }

    #[tokio::test]
    async fn test_save_and_destroy() {
        let (ctx, storage) = refs();
        let mut current = Entity::new("alice");
        current.number = 1;
        let delta = Entity::new("alice");

        hook("save-entity", &ctx).run(&mut current, &delta).await.unwrap();
        assert!(storage.load_entity("alice").await.is_ok());

        hook("destroy-entity", &ctx).run(&mut current, &delta).await.unwrap();
        assert!(storage.load_entity("alice").await.is_err());
    }
}
