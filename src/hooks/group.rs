use async_trait::async_trait;
use std::sync::Arc;

use crate::chain::HookRegistry;
use crate::errors::OrreryError;
use crate::hooks::{found, Hook, RefContext};
use crate::membership::GroupGraph;
use crate::patch::{self, PatchMode};
use crate::storage::Storage;
use crate::types::{insert_capability, remove_capability, ExpansionMode, Group};

pub(crate) fn register(registry: &mut HookRegistry) -> Result<(), OrreryError> {
    registry.register_group_hook("fail-on-existing-group", |c| {
        Ok(Box::new(FailOnExistingGroup { storage: c.storage.clone() }))
    })?;
    registry.register_group_hook("load-group", |c| {
        Ok(Box::new(LoadGroup { storage: c.storage.clone() }))
    })?;
    registry.register_group_hook("set-group-name", |_| Ok(Box::new(SetGroupName)))?;
    registry.register_group_hook("set-group-number", |c| {
        Ok(Box::new(SetGroupNumber { storage: c.storage.clone() }))
    })?;
    registry.register_group_hook("set-group-displayname", |_| Ok(Box::new(SetGroupDisplayName)))?;
    registry.register_group_hook("set-managing-group", |c| {
        Ok(Box::new(SetManagingGroup { storage: c.storage.clone() }))
    })?;
    registry.register_group_hook("merge-group-meta", |_| Ok(Box::new(MergeGroupMeta)))?;
    registry.register_group_hook("set-group-capability", |_| {
        Ok(Box::new(PatchGroupCapabilities { name: "set-group-capability", insert: true }))
    })?;
    registry.register_group_hook("remove-group-capability", |_| {
        Ok(Box::new(PatchGroupCapabilities { name: "remove-group-capability", insert: false }))
    })?;
    registry.register_group_hook("check-expansion-targets", |c| {
        Ok(Box::new(CheckExpansionTargets { storage: c.storage.clone() }))
    })?;
    registry.register_group_hook("check-expansion-cycles", |c| {
        Ok(Box::new(CheckExpansionCycles { storage: c.storage.clone() }))
    })?;
    registry.register_group_hook("patch-group-expansions", |_| Ok(Box::new(PatchGroupExpansions)))?;
    registry.register_group_hook("drop-group-expansion", |_| Ok(Box::new(DropGroupExpansion)))?;
    registry.register_group_hook("patch-group-um-upsert", |_| {
        Ok(Box::new(PatchGroupUntypedMeta { name: "patch-group-um-upsert", mode: PatchMode::Upsert }))
    })?;
    registry.register_group_hook("patch-group-um-clearfuzzy", |_| {
        Ok(Box::new(PatchGroupUntypedMeta {
            name: "patch-group-um-clearfuzzy",
            mode: PatchMode::ClearFuzzy,
        }))
    })?;
    registry.register_group_hook("patch-group-um-clearexact", |_| {
        Ok(Box::new(PatchGroupUntypedMeta {
            name: "patch-group-um-clearexact",
            mode: PatchMode::ClearExact,
        }))
    })?;
    registry.register_group_hook("save-group", |c| {
        Ok(Box::new(SaveGroup { storage: c.storage.clone() }))
    })?;
    registry.register_group_hook("destroy-group", |c| {
        Ok(Box::new(DestroyGroup { storage: c.storage.clone() }))
    })?;
    Ok(())
}

struct FailOnExistingGroup {
    storage: Arc<dyn Storage>,
}

#[async_trait]
impl Hook<Group> for FailOnExistingGroup {
    fn name(&self) -> &str {
        "fail-on-existing-group"
    }

    fn priority(&self) -> i32 {
        0
    }

    async fn run(&self, _current: &mut Group, delta: &Group) -> Result<(), OrreryError> {
        match found(self.storage.load_group(&delta.name).await)? {
            Some(_) => Err(OrreryError::AlreadyExists(format!("group `{}`", delta.name))),
            None => Ok(()),
        }
    }
}

struct LoadGroup {
    storage: Arc<dyn Storage>,
}

#[async_trait]
impl Hook<Group> for LoadGroup {
    fn name(&self) -> &str {
        "load-group"
    }

    fn priority(&self) -> i32 {
        0
    }

    async fn run(&self, current: &mut Group, delta: &Group) -> Result<(), OrreryError> {
        *current = self.storage.load_group(&delta.name).await?;
        Ok(())
    }
}

struct SetGroupName;

#[async_trait]
impl Hook<Group> for SetGroupName {
    fn name(&self) -> &str {
        "set-group-name"
    }

    fn priority(&self) -> i32 {
        20
    }

    async fn run(&self, current: &mut Group, delta: &Group) -> Result<(), OrreryError> {
        if delta.name.trim().is_empty() {
            return Err(OrreryError::MalformedRequest("group name must not be empty".into()));
        }
        current.name = delta.name.clone();
        Ok(())
    }
}

struct SetGroupNumber {
    storage: Arc<dyn Storage>,
}

#[async_trait]
impl Hook<Group> for SetGroupNumber {
    fn name(&self) -> &str {
        "set-group-number"
    }

    fn priority(&self) -> i32 {
        25
    }

    async fn run(&self, current: &mut Group, delta: &Group) -> Result<(), OrreryError> {
        if delta.number > 0 {
            current.number = delta.number;
        } else if current.number <= 0 {
            current.number = self.storage.next_group_number().await?;
        }
        Ok(())
    }
}

/// Falls back to the group name when no display name is given.
struct SetGroupDisplayName;

#[async_trait]
impl Hook<Group> for SetGroupDisplayName {
    fn name(&self) -> &str {
        "set-group-displayname"
    }

    fn priority(&self) -> i32 {
        30
    }

    async fn run(&self, current: &mut Group, delta: &Group) -> Result<(), OrreryError> {
        if !delta.display_name.is_empty() {
            current.display_name = delta.display_name.clone();
        } else if current.display_name.is_empty() {
            current.display_name = current.name.clone();
        }
        Ok(())
    }
}

/// A group may manage itself; any other managing group must exist.
struct SetManagingGroup {
    storage: Arc<dyn Storage>,
}

#[async_trait]
impl Hook<Group> for SetManagingGroup {
    fn name(&self) -> &str {
        "set-managing-group"
    }

    fn priority(&self) -> i32 {
        35
    }

    async fn run(&self, current: &mut Group, delta: &Group) -> Result<(), OrreryError> {
        let Some(manager) = delta.managed_by.as_deref().filter(|m| !m.is_empty()) else {
            return Ok(());
        };
        if manager != current.name {
            self.storage.load_group(manager).await?;
        }
        current.managed_by = Some(manager.to_string());
        Ok(())
    }
}

struct MergeGroupMeta;

#[async_trait]
impl Hook<Group> for MergeGroupMeta {
    fn name(&self) -> &str {
        "merge-group-meta"
    }

    fn priority(&self) -> i32 {
        50
    }

    async fn run(&self, current: &mut Group, delta: &Group) -> Result<(), OrreryError> {
        if !delta.display_name.is_empty() {
            current.display_name = delta.display_name.clone();
        }
        Ok(())
    }
}

struct PatchGroupCapabilities {
    name: &'static str,
    insert: bool,
}

#[async_trait]
impl Hook<Group> for PatchGroupCapabilities {
    fn name(&self) -> &str {
        self.name
    }

    fn priority(&self) -> i32 {
        50
    }

    async fn run(&self, current: &mut Group, delta: &Group) -> Result<(), OrreryError> {
        if delta.capabilities.is_empty() {
            return Err(OrreryError::MalformedRequest("no capability supplied".into()));
        }
        for cap in &delta.capabilities {
            if self.insert {
                insert_capability(&mut current.capabilities, *cap);
            } else {
                remove_capability(&mut current.capabilities, *cap);
            }
        }
        Ok(())
    }
}

/// Every child named by the delta's rules must be an existing group other
/// than the parent itself.
struct CheckExpansionTargets {
    storage: Arc<dyn Storage>,
}

#[async_trait]
impl Hook<Group> for CheckExpansionTargets {
    fn name(&self) -> &str {
        "check-expansion-targets"
    }

    fn priority(&self) -> i32 {
        40
    }

    async fn run(&self, current: &mut Group, delta: &Group) -> Result<(), OrreryError> {
        if delta.expansions.is_empty() {
            return Err(OrreryError::MalformedRequest("no expansion rule supplied".into()));
        }
        for rule in &delta.expansions {
            if rule.child == current.name {
                return Err(OrreryError::ExpansionCycle(format!(
                    "group `{}` cannot expand itself",
                    current.name
                )));
            }
            self.storage.load_group(&rule.child).await?;
        }
        Ok(())
    }
}

/// Rejects an INCLUDE rule whose child already reaches the parent through
/// INCLUDE rules.
struct CheckExpansionCycles {
    storage: Arc<dyn Storage>,
}

#[async_trait]
impl Hook<Group> for CheckExpansionCycles {
    fn name(&self) -> &str {
        "check-expansion-cycles"
    }

    fn priority(&self) -> i32 {
        45
    }

    async fn run(&self, current: &mut Group, delta: &Group) -> Result<(), OrreryError> {
        let includes: Vec<&str> = delta.children(ExpansionMode::Include).collect();
        if includes.is_empty() {
            return Ok(());
        }

        let mut groups = Vec::new();
        for name in self.storage.discover_group_names().await? {
            if let Some(group) = found(self.storage.load_group(&name).await)? {
                groups.push(group);
            }
        }
        let graph = GroupGraph::new(groups, Vec::new());

        for child in includes {
            if graph.include_closure(child).contains(&current.name) {
                return Err(OrreryError::ExpansionCycle(format!(
                    "{} -> {} -> ... -> {}",
                    current.name, child, current.name
                )));
            }
        }
        Ok(())
    }
}

/// A parent holds at most one rule per child; a new rule replaces the old.
struct PatchGroupExpansions;

#[async_trait]
impl Hook<Group> for PatchGroupExpansions {
    fn name(&self) -> &str {
        "patch-group-expansions"
    }

    fn priority(&self) -> i32 {
        50
    }

    async fn run(&self, current: &mut Group, delta: &Group) -> Result<(), OrreryError> {
        for rule in &delta.expansions {
            current.expansions.retain(|r| r.child != rule.child);
            current.expansions.push(rule.clone());
        }
        Ok(())
    }
}

/// Removes the rule for each child named in the delta, whatever its mode.
struct DropGroupExpansion;

#[async_trait]
impl Hook<Group> for DropGroupExpansion {
    fn name(&self) -> &str {
        "drop-group-expansion"
    }

    fn priority(&self) -> i32 {
        50
    }

    async fn run(&self, current: &mut Group, delta: &Group) -> Result<(), OrreryError> {
        for rule in &delta.expansions {
            current.expansions.retain(|r| r.child != rule.child);
        }
        Ok(())
    }
}

struct PatchGroupUntypedMeta {
    name: &'static str,
    mode: PatchMode,
}

#[async_trait]
impl Hook<Group> for PatchGroupUntypedMeta {
    fn name(&self) -> &str {
        self.name
    }

    fn priority(&self) -> i32 {
        50
    }

    async fn run(&self, current: &mut Group, delta: &Group) -> Result<(), OrreryError> {
        for entry in &delta.untyped_meta {
            let (key, value) = patch::split_entry(entry)?;
            current.untyped_meta = patch::patch_key_values(&current.untyped_meta, self.mode, key, value);
        }
        Ok(())
    }
}

struct SaveGroup {
    storage: Arc<dyn Storage>,
}

#[async_trait]
impl Hook<Group> for SaveGroup {
    fn name(&self) -> &str {
        "save-group"
    }

    fn priority(&self) -> i32 {
        99
    }

    async fn run(&self, current: &mut Group, _delta: &Group) -> Result<(), OrreryError> {
        self.storage.save_group(current).await?;
        Ok(())
    }
}

struct DestroyGroup {
    storage: Arc<dyn Storage>,
}

#[async_trait]
impl Hook<Group> for DestroyGroup {
    fn name(&self) -> &str {
        "destroy-group"
    }

    fn priority(&self) -> i32 {
        99
    }

    async fn run(&self, current: &mut Group, _delta: &Group) -> Result<(), OrreryError> {
        self.storage.delete_group(&current.name).await?;
        Ok(())
    }
}
