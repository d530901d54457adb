use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::chain::Chain;
use crate::errors::OrreryError;
use crate::hooks::{Hook, HookConstructor, RefContext};
use crate::types::{Entity, Group, Record, RecordKind};

/// Name to constructor mapping for both hook kinds.
///
/// Populated by explicit registration calls during startup, then only read.
/// Each test can build its own registry.
#[derive(Default)]
pub struct HookRegistry {
    entity: HashMap<String, HookConstructor<Entity>>,
    group: HashMap<String, HookConstructor<Group>>,
}

/// Selects the constructor table for a record kind.
pub trait Registered: Record {
    fn constructors(registry: &HookRegistry) -> &HashMap<String, HookConstructor<Self>>;
}

impl Registered for Entity {
    fn constructors(registry: &HookRegistry) -> &HashMap<String, HookConstructor<Self>> {
        &registry.entity
    }
}

impl Registered for Group {
    fn constructors(registry: &HookRegistry) -> &HashMap<String, HookConstructor<Self>> {
        &registry.group
    }
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in hook.
    pub fn with_builtin() -> Result<Self, OrreryError> {
        let mut registry = Self::new();
        crate::hooks::register_builtin(&mut registry)?;
        Ok(registry)
    }

    pub fn register_entity_hook(
        &mut self,
        name: &str,
        ctor: HookConstructor<Entity>,
    ) -> Result<(), OrreryError> {
        if self.entity.contains_key(name) {
            return Err(OrreryError::DuplicateHook {
                kind: RecordKind::Entity,
                name: name.to_string(),
            });
        }
        self.entity.insert(name.to_string(), ctor);
        Ok(())
    }

    pub fn register_group_hook(
        &mut self,
        name: &str,
        ctor: HookConstructor<Group>,
    ) -> Result<(), OrreryError> {
        if self.group.contains_key(name) {
            return Err(OrreryError::DuplicateHook {
                kind: RecordKind::Group,
                name: name.to_string(),
            });
        }
        self.group.insert(name.to_string(), ctor);
        Ok(())
    }

    pub fn entity_hook(&self, name: &str, ctx: &RefContext) -> Result<Box<dyn Hook<Entity>>, OrreryError> {
        self.construct::<Entity>(name, ctx)
    }

    pub fn group_hook(&self, name: &str, ctx: &RefContext) -> Result<Box<dyn Hook<Group>>, OrreryError> {
        self.construct::<Group>(name, ctx)
    }

    /// Registered hook names for a kind, sorted.
    pub fn hook_names(&self, kind: RecordKind) -> Vec<&str> {
        let mut names: Vec<&str> = match kind {
            RecordKind::Entity => self.entity.keys().map(String::as_str).collect(),
            RecordKind::Group => self.group.keys().map(String::as_str).collect(),
        };
        names.sort_unstable();
        names
    }

    fn construct<T: Registered>(&self, name: &str, ctx: &RefContext) -> Result<Box<dyn Hook<T>>, OrreryError> {
        let ctor = T::constructors(self).get(name).ok_or_else(|| OrreryError::UnknownHook {
            kind: T::KIND,
            name: name.to_string(),
        })?;
        ctor(ctx)
    }

    /// Build every chain in `config`.
    ///
    /// Each hook is constructed once and shared by all chains naming it.
    pub fn build_chains<T: Registered>(
        &self,
        config: &BTreeMap<String, Vec<String>>,
        ctx: &RefContext,
    ) -> Result<HashMap<String, Chain<T>>, OrreryError> {
        let mut instances: HashMap<&str, Arc<dyn Hook<T>>> = HashMap::new();
        let mut chains = HashMap::with_capacity(config.len());

        for (chain_name, hook_names) in config {
            let mut hooks = Vec::with_capacity(hook_names.len());
            for hook_name in hook_names {
                let hook = match instances.get(hook_name.as_str()) {
                    Some(h) => h.clone(),
                    None => {
                        let h: Arc<dyn Hook<T>> = Arc::from(self.construct::<T>(hook_name, ctx)?);
                        instances.insert(hook_name.as_str(), h.clone());
                        h
                    }
                };
                hooks.push(hook);
            }
            chains.insert(chain_name.clone(), Chain::new(chain_name, hooks));
        }

        tracing::info!(
            kind = %T::KIND,
            chains = chains.len(),
            hooks = instances.len(),
            "Built hook chains"
        );

        Ok(chains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Argon2Crypto;
    use crate::storage::MemoryStorage;

    fn ctx() -> RefContext {
        RefContext::new(Arc::new(MemoryStorage::new()), Arc::new(Argon2Crypto::new()))
    }

    fn config(chains: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        chains
            .iter()
            .map(|(name, hooks)| (name.to_string(), hooks.iter().map(|h| h.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = HookRegistry::with_builtin().unwrap();
        let err = registry
            .register_entity_hook("load-entity", save_entity_ctor)
            .unwrap_err();
        assert!(matches!(
            err,
            OrreryError::DuplicateHook { kind: RecordKind::Entity, ref name } if name == "load-entity"
        ));
    }

    fn save_entity_ctor(c: &RefContext) -> Result<Box<dyn Hook<Entity>>, OrreryError> {
        HookRegistry::with_builtin()?.entity_hook("save-entity", c)
    }

    #[test]
    fn test_same_name_allowed_across_kinds() {
        let mut registry = HookRegistry::new();
        registry.register_entity_hook("shared", save_entity_ctor).unwrap();
        registry
            .register_group_hook("shared", |c| HookRegistry::with_builtin()?.group_hook("save-group", c))
            .unwrap();
        assert_eq!(registry.hook_names(RecordKind::Entity), vec!["shared"]);
        assert_eq!(registry.hook_names(RecordKind::Group), vec!["shared"]);
    }

    #[test]
    fn test_unknown_hook_fails_build() {
        let registry = HookRegistry::with_builtin().unwrap();
        let cfg = config(&[("LOCK", &["load-entity", "teleport-entity"])]);
        let err = registry.build_chains::<Entity>(&cfg, &ctx()).unwrap_err();
        assert!(matches!(
            err,
            OrreryError::UnknownHook { kind: RecordKind::Entity, ref name } if name == "teleport-entity"
        ));
    }

    #[test]
    fn test_kind_mismatch_fails_build() {
        let registry = HookRegistry::with_builtin().unwrap();
        let cfg = config(&[("CREATE", &["load-entity"])]);
        let err = registry.build_chains::<Group>(&cfg, &ctx()).unwrap_err();
        assert!(matches!(err, OrreryError::UnknownHook { kind: RecordKind::Group, .. }));
    }

    #[test]
    fn test_build_sorts_by_priority() {
        let registry = HookRegistry::with_builtin().unwrap();
        let cfg = config(&[("LOCK", &["save-entity", "lock-entity", "load-entity"])]);
        let chains = registry.build_chains::<Entity>(&cfg, &ctx()).unwrap();
        assert_eq!(
            chains["LOCK"].hook_names(),
            vec!["load-entity", "lock-entity", "save-entity"]
        );
    }
}
