//! The chain configuration used when no chain directory is configured.
//!
//! Chain files may override any of these, but the Manager needs every name
//! listed here to be present.

use crate::chain::ChainConfig;

pub const ENTITY_CHAINS: &[(&str, &[&str])] = &[
    (
        "CREATE",
        &[
            "fail-on-existing-entity",
            "set-entity-id",
            "set-entity-number",
            "set-entity-secret",
            "save-entity",
        ],
    ),
    (
        "BOOTSTRAP-SERVER",
        &[
            "create-entity-if-missing",
            "set-entity-number",
            "set-entity-secret",
            "set-entity-capability",
            "save-entity",
        ],
    ),
    ("DESTROY", &["load-entity", "destroy-entity"]),
    ("LOCK", &["load-entity", "lock-entity", "save-entity"]),
    ("UNLOCK", &["load-entity", "unlock-entity", "save-entity"]),
    ("CHANGE-SECRET", &["load-entity", "set-entity-secret", "save-entity"]),
    (
        "VALIDATE-IDENTITY",
        &["load-entity", "validate-entity-unlocked", "validate-entity-secret"],
    ),
    ("MERGE-METADATA", &["load-entity", "merge-entity-meta", "save-entity"]),
    ("ADD-KEY", &["load-entity", "add-entity-key", "save-entity"]),
    ("DEL-KEY", &["load-entity", "del-entity-key", "save-entity"]),
    ("UM-UPSERT", &["load-entity", "patch-entity-um-upsert", "save-entity"]),
    ("UM-CLEARFUZZY", &["load-entity", "patch-entity-um-clearfuzzy", "save-entity"]),
    ("UM-CLEAREXACT", &["load-entity", "patch-entity-um-clearexact", "save-entity"]),
    ("SET-CAPABILITY", &["load-entity", "set-entity-capability", "save-entity"]),
    ("DROP-CAPABILITY", &["load-entity", "remove-entity-capability", "save-entity"]),
    ("ADD-GROUP", &["load-entity", "add-direct-group", "save-entity"]),
    ("DEL-GROUP", &["load-entity", "del-direct-group", "save-entity"]),
];

pub const GROUP_CHAINS: &[(&str, &[&str])] = &[
    (
        "CREATE",
        &[
            "fail-on-existing-group",
            "set-group-name",
            "set-group-number",
            "set-group-displayname",
            "set-managing-group",
            "save-group",
        ],
    ),
    ("DESTROY", &["load-group", "destroy-group"]),
    (
        "MERGE-METADATA",
        &["load-group", "merge-group-meta", "set-managing-group", "save-group"],
    ),
    ("SET-CAPABILITY", &["load-group", "set-group-capability", "save-group"]),
    ("DROP-CAPABILITY", &["load-group", "remove-group-capability", "save-group"]),
    (
        "MODIFY-RULE",
        &[
            "load-group",
            "check-expansion-targets",
            "check-expansion-cycles",
            "patch-group-expansions",
            "save-group",
        ],
    ),
    ("DROP-RULE", &["load-group", "drop-group-expansion", "save-group"]),
    ("UM-UPSERT", &["load-group", "patch-group-um-upsert", "save-group"]),
    ("UM-CLEARFUZZY", &["load-group", "patch-group-um-clearfuzzy", "save-group"]),
    ("UM-CLEAREXACT", &["load-group", "patch-group-um-clearexact", "save-group"]),
];

pub fn entity_chain_names() -> Vec<&'static str> {
    ENTITY_CHAINS.iter().map(|(name, _)| *name).collect()
}

pub fn group_chain_names() -> Vec<&'static str> {
    GROUP_CHAINS.iter().map(|(name, _)| *name).collect()
}

pub fn builtin() -> ChainConfig {
    fn table(chains: &[(&str, &[&str])]) -> std::collections::BTreeMap<String, Vec<String>> {
        chains
            .iter()
            .map(|(name, hooks)| (name.to_string(), hooks.iter().map(|h| h.to_string()).collect()))
            .collect()
    }

    ChainConfig {
        entity: table(ENTITY_CHAINS),
        group: table(GROUP_CHAINS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::HookRegistry;
    use crate::crypto::Argon2Crypto;
    use crate::hooks::RefContext;
    use crate::storage::MemoryStorage;
    use crate::types::{Entity, Group};
    use std::sync::Arc;

    #[test]
    fn test_builtin_chains_resolve_against_builtin_hooks() {
        let registry = HookRegistry::with_builtin().unwrap();
        let ctx = RefContext::new(Arc::new(MemoryStorage::new()), Arc::new(Argon2Crypto::new()));
        let cfg = builtin();

        let entity = registry.build_chains::<Entity>(&cfg.entity, &ctx).unwrap();
        let group = registry.build_chains::<Group>(&cfg.group, &ctx).unwrap();

        assert_eq!(entity.len(), ENTITY_CHAINS.len());
        assert_eq!(group.len(), GROUP_CHAINS.len());
    }

    #[test]
    fn test_bootstrap_chain_order() {
        let registry = HookRegistry::with_builtin().unwrap();
        let ctx = RefContext::new(Arc::new(MemoryStorage::new()), Arc::new(Argon2Crypto::new()));
        let chains = registry.build_chains::<Entity>(&builtin().entity, &ctx).unwrap();

        assert_eq!(
            chains["BOOTSTRAP-SERVER"].hook_names(),
            vec![
                "create-entity-if-missing",
                "set-entity-number",
                "set-entity-secret",
                "set-entity-capability",
                "save-entity",
            ]
        );
    }
}
