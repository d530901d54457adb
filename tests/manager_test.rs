mod helpers;

use std::collections::BTreeSet;

use helpers::{memory_manager, EntityBuilder, GroupBuilder, TestDb};
use orrery::storage::{MemoryStorage, SearchRequest, SqlStorage, Storage};
use orrery::types::{Capability, Entity, ExpansionRule, Group};
use orrery::OrreryError;

fn names(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_entity_lifecycle_on_sqlite() {
    let db = TestDb::new().await;
    let manager = db.manager();

    EntityBuilder::new("alice").with_secret("s3cret").create(&manager).await;
    manager.validate_secret("alice", "s3cret").await.unwrap();

    manager.lock_entity("alice").await.unwrap();
    assert!(matches!(
        manager.validate_secret("alice", "s3cret").await.unwrap_err(),
        OrreryError::EntityLocked
    ));
    manager.unlock_entity("alice").await.unwrap();

    manager.change_secret("alice", "n3w").await.unwrap();
    assert!(matches!(
        manager.validate_secret("alice", "s3cret").await.unwrap_err(),
        OrreryError::VerificationFailed
    ));
    manager.validate_secret("alice", "n3w").await.unwrap();

    let fetched = manager.fetch_entity("alice").await.unwrap();
    assert_eq!(fetched.number, 1);
    assert!(fetched.secret.is_none());

    manager.destroy_entity("alice").await.unwrap();
    assert!(matches!(
        manager.fetch_entity("alice").await.unwrap_err(),
        OrreryError::NotFound(_)
    ));
}

#[tokio::test]
async fn test_untyped_meta_patching_persists() {
    let db = TestDb::new().await;
    let manager = db.manager();
    EntityBuilder::new("alice").create(&manager).await;

    manager.manage_entity_um("alice", "UPSERT", "attr{0}", "x").await.unwrap();
    manager.manage_entity_um("alice", "UPSERT", "attr{12}", "y").await.unwrap();
    manager.manage_entity_um("alice", "UPSERT", "attrother", "z").await.unwrap();
    let twice = manager.manage_entity_um("alice", "UPSERT", "attrother", "z").await.unwrap();
    assert_eq!(twice.len(), 3);

    let left = manager.manage_entity_um("alice", "CLEARFUZZY", "attr", "").await.unwrap();
    assert_eq!(left, vec!["attrother:z".to_string()]);

    let stored = manager.manage_entity_um("alice", "READ", "*", "").await.unwrap();
    assert_eq!(stored, vec!["attrother:z".to_string()]);
}

#[tokio::test]
async fn test_three_level_include_and_exclude() {
    let db = TestDb::new().await;
    let manager = db.manager();

    GroupBuilder::new("g3").create(&manager).await;
    GroupBuilder::new("g2").including("g3").create(&manager).await;
    GroupBuilder::new("g1").including("g2").create(&manager).await;
    EntityBuilder::new("e").in_group("g3").create(&manager).await;

    assert_eq!(manager.list_members("g1").await.unwrap(), names(&["e"]));

    manager.modify_group_rule("g1", "g2", "EXCLUDE").await.unwrap();
    assert!(manager.list_members("g1").await.unwrap().is_empty());
    assert_eq!(manager.list_members("g2").await.unwrap(), names(&["e"]));
    assert_eq!(
        manager.fetch_group("g1").await.unwrap().expansions,
        vec![ExpansionRule::exclude("g2")]
    );
}

#[tokio::test]
async fn test_exclude_wins_over_second_include_path() {
    let manager = memory_manager();

    GroupBuilder::new("contractors").create(&manager).await;
    GroupBuilder::new("eng").create(&manager).await;
    GroupBuilder::new("ops").create(&manager).await;
    GroupBuilder::new("staff")
        .including("eng")
        .including("ops")
        .excluding("contractors")
        .create(&manager)
        .await;

    EntityBuilder::new("alice").in_group("eng").create(&manager).await;
    EntityBuilder::new("bob")
        .in_group("eng")
        .in_group("ops")
        .in_group("contractors")
        .create(&manager)
        .await;

    assert_eq!(manager.list_members("staff").await.unwrap(), names(&["alice"]));
    assert_eq!(
        manager.get_memberships("bob", true).await.unwrap(),
        names(&["contractors", "eng", "ops"])
    );
}

#[tokio::test]
async fn test_cycle_in_stored_rules_terminates() {
    let db = TestDb::new().await;
    let storage = SqlStorage::new(db.connection().clone());

    let mut g1 = Group::new("g1");
    g1.number = 1;
    g1.expansions = vec![ExpansionRule::include("g2")];
    let mut g2 = Group::new("g2");
    g2.number = 2;
    g2.expansions = vec![ExpansionRule::include("g1")];
    storage.save_group(&g1).await.unwrap();
    storage.save_group(&g2).await.unwrap();

    for (number, id, group) in [(1, "a", "g1"), (2, "b", "g2")] {
        let mut e = Entity::new(id);
        e.number = number;
        e.meta.groups = vec![group.to_string()];
        storage.save_entity(&e).await.unwrap();
    }

    let manager = db.manager();
    assert_eq!(manager.list_members("g1").await.unwrap(), names(&["a", "b"]));
    assert_eq!(manager.list_members("g2").await.unwrap(), names(&["a", "b"]));
}

#[tokio::test]
async fn test_capability_merge() {
    let db = TestDb::new().await;
    let manager = db.manager();

    GroupBuilder::new("operators").with_capability("LOCK_ENTITY").create(&manager).await;
    EntityBuilder::new("alice").in_group("operators").create(&manager).await;

    let info = manager.entity_info("alice").await.unwrap();
    assert_eq!(info.effective_capabilities, BTreeSet::from([Capability::LockEntity]));
    assert!(info.entity.meta.capabilities.is_empty());

    manager.set_entity_capability("alice", "LOCK_ENTITY").await.unwrap();
    manager.set_entity_capability("alice", "LOCK_ENTITY").await.unwrap();
    let info = manager.entity_info("alice").await.unwrap();
    assert_eq!(info.effective_capabilities, BTreeSet::from([Capability::LockEntity]));
    assert_eq!(info.entity.meta.capabilities, vec![Capability::LockEntity]);
}

#[tokio::test]
async fn test_unknown_capability_leaves_capabilities_unchanged() {
    let manager = memory_manager();
    EntityBuilder::new("alice").with_capability("CREATE_GROUP").create(&manager).await;

    let err = manager.set_entity_capability("alice", "ROOT_OF_ALL").await.unwrap_err();
    assert!(matches!(err, OrreryError::UnknownCapability(_)));
    assert_eq!(
        manager.fetch_entity("alice").await.unwrap().meta.capabilities,
        vec![Capability::CreateGroup]
    );
}

#[tokio::test]
async fn test_bootstrap_survives_deletion() {
    let db = TestDb::new().await;
    let manager = db.manager();

    manager.bootstrap("root", "hunter2").await.unwrap();
    assert!(manager.entity_has_capability("root", Capability::DestroyGroup).await.unwrap());
    manager.validate_secret("root", "hunter2").await.unwrap();

    manager.destroy_entity("root").await.unwrap();
    assert!(matches!(
        manager.bootstrap("root", "hunter2").await.unwrap_err(),
        OrreryError::BootstrapAlreadyDone
    ));
}

#[tokio::test]
async fn test_bootstrap_completes_existing_entity() {
    let manager = memory_manager();
    EntityBuilder::new("admin").create(&manager).await;

    manager.bootstrap("admin", "fresh").await.unwrap();
    let admin = manager.fetch_entity("admin").await.unwrap();
    assert_eq!(admin.number, 1);
    assert_eq!(admin.meta.capabilities, vec![Capability::GlobalRoot]);
    manager.validate_secret("admin", "fresh").await.unwrap();
}

#[tokio::test]
async fn test_management_delegation() {
    let manager = memory_manager();

    GroupBuilder::new("leads").create(&manager).await;
    GroupBuilder::new("eng").managed_by("leads").create(&manager).await;
    EntityBuilder::new("lead").in_group("leads").create(&manager).await;
    EntityBuilder::new("dev").in_group("eng").create(&manager).await;

    assert!(manager.can_manage_group("lead", "eng").await.unwrap());
    assert!(!manager.can_manage_group("dev", "eng").await.unwrap());
    assert!(matches!(
        manager.check_capability("dev", Capability::ModifyGroupMembers).await.unwrap_err(),
        OrreryError::RequestorUnqualified(_)
    ));

    let info = manager.group_info("leads").await.unwrap();
    assert_eq!(info.manages, names(&["eng"]));
}

#[tokio::test]
async fn test_search_on_sqlite() {
    let db = TestDb::new().await;
    let manager = db.manager();

    GroupBuilder::new("team-red").create(&manager).await;
    GroupBuilder::new("team-blue").create(&manager).await;
    GroupBuilder::new("admins").create(&manager).await;
    EntityBuilder::new("svc-backup").create(&manager).await;
    EntityBuilder::new("alice").create(&manager).await;

    let teams = manager.search_groups(&SearchRequest::new("team")).await.unwrap();
    assert_eq!(
        teams.iter().map(|g| g.name.as_str()).collect::<Vec<_>>(),
        vec!["team-blue", "team-red"]
    );

    let services = manager.search_entities(&SearchRequest::new("svc-")).await.unwrap();
    assert_eq!(services.len(), 1);
    assert!(services[0].secret.is_none());
}

#[tokio::test]
async fn test_search_agrees_across_storages() {
    let db = TestDb::new().await;
    let sql = SqlStorage::new(db.connection().clone());
    let memory = MemoryStorage::new();

    for (number, id) in [(1, "svc_a"), (2, "svcXa"), (3, "Svc-b")] {
        let mut e = Entity::new(id);
        e.number = number;
        sql.save_entity(&e).await.unwrap();
        memory.save_entity(&e).await.unwrap();
    }

    for expression in ["SVC", "svc_a", "%", "Svc", ""] {
        let req = SearchRequest::new(expression);
        let from_sql: BTreeSet<_> =
            sql.search_entities(&req).await.unwrap().into_iter().map(|e| e.id).collect();
        let from_memory: BTreeSet<_> =
            memory.search_entities(&req).await.unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(from_sql, from_memory, "expression {expression:?}");
    }
}
