//! Nested group membership and capability resolution.
//!
//! Resolution runs over an in-memory [`GroupGraph`] snapshot taken from
//! storage for the duration of one call. No lock is held across the
//! traversal, so concurrent edits yield a best-effort view.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::errors::OrreryError;
use crate::hooks::found;
use crate::storage::Storage;
use crate::types::{Capability, Entity, ExpansionMode, Group};

/// Groups keyed by name plus the direct member index derived from entities.
#[derive(Debug, Clone, Default)]
pub struct GroupGraph {
    groups: BTreeMap<String, Group>,
    entities: BTreeMap<String, Entity>,
    direct: BTreeMap<String, BTreeSet<String>>,
}

impl GroupGraph {
    pub fn new(groups: Vec<Group>, entities: Vec<Entity>) -> Self {
        let mut direct: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for entity in &entities {
            for group in &entity.meta.groups {
                direct.entry(group.clone()).or_default().insert(entity.id.clone());
            }
        }

        Self {
            groups: groups.into_iter().map(|g| (g.name.clone(), g)).collect(),
            entities: entities.into_iter().map(|e| (e.id.clone(), e)).collect(),
            direct,
        }
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Entities that list `name` in their own group set.
    pub fn direct_members(&self, name: &str) -> BTreeSet<String> {
        self.direct.get(name).cloned().unwrap_or_default()
    }

    /// `name` and every known group reachable from it through INCLUDE rules.
    ///
    /// Revisiting a group is a no-op, so cycles and diamonds terminate.
    /// Unknown children are skipped with a warning.
    pub fn include_closure(&self, name: &str) -> BTreeSet<String> {
        let mut visited = BTreeSet::new();
        let mut stack = vec![name.to_string()];

        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(group) = self.groups.get(&current) else {
                continue;
            };
            for child in group.children(ExpansionMode::Include) {
                if !self.known_child(&current, child) {
                    continue;
                }
                if !visited.contains(child) {
                    stack.push(child.to_string());
                }
            }
        }

        visited
    }

    /// Resolved membership of `name`.
    ///
    /// Members are the direct members of `name` plus the resolved members of
    /// each INCLUDE child, minus the resolved members of each EXCLUDE child
    /// of `name`. A child's own rules only shape what that child contributes.
    /// Exclusion is applied after every include has been gathered.
    pub fn members(&self, name: &str) -> BTreeSet<String> {
        self.resolve(name, &mut BTreeSet::new())
    }

    fn resolve(&self, name: &str, in_progress: &mut BTreeSet<String>) -> BTreeSet<String> {
        if !in_progress.insert(name.to_string()) {
            // Recursed back into a group already being resolved; its members
            // are added where that resolution started.
            return BTreeSet::new();
        }

        let mut members = self.direct_members(name);
        let mut excluded = BTreeSet::new();

        if let Some(group) = self.groups.get(name) {
            for child in group.children(ExpansionMode::Include) {
                if self.known_child(name, child) {
                    members.extend(self.resolve(child, in_progress));
                }
            }
            for child in group.children(ExpansionMode::Exclude) {
                if self.known_child(name, child) {
                    excluded.extend(self.resolve(child, in_progress));
                }
            }
        }

        in_progress.remove(name);
        members.retain(|id| !excluded.contains(id));
        members
    }

    fn known_child(&self, group: &str, child: &str) -> bool {
        let known = self.groups.contains_key(child);
        if !known {
            tracing::warn!(group, child, "Expansion names unknown group; treating it as empty");
        }
        known
    }

    /// Every known group whose resolved membership contains `entity_id`.
    pub fn containing_groups(&self, entity_id: &str) -> BTreeSet<String> {
        self.groups
            .keys()
            .filter(|g| self.members(g).contains(entity_id))
            .cloned()
            .collect()
    }

    /// Direct capabilities of the entity plus the direct capabilities of every
    /// group containing it.
    pub fn entity_capabilities(&self, entity_id: &str) -> BTreeSet<Capability> {
        let mut caps: BTreeSet<Capability> = self
            .entities
            .get(entity_id)
            .map(|e| e.meta.capabilities.iter().copied().collect())
            .unwrap_or_default();

        for group in self.containing_groups(entity_id) {
            if let Some(g) = self.groups.get(&group) {
                caps.extend(g.capabilities.iter().copied());
            }
        }
        caps
    }

    /// `name` followed by its managing group, that group's manager, and so on.
    /// Stops at the first repeat or unknown group.
    pub fn management_chain(&self, name: &str) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut chain = Vec::new();
        let mut next = Some(name.to_string());

        while let Some(current) = next.take() {
            if !seen.insert(current.clone()) {
                break;
            }
            let Some(group) = self.groups.get(&current) else {
                break;
            };
            next = group.managed_by.clone();
            chain.push(current);
        }
        chain
    }

    /// Direct capabilities of the group plus those of every group along its
    /// `managed_by` chain.
    pub fn group_capabilities(&self, name: &str) -> BTreeSet<Capability> {
        self.management_chain(name)
            .iter()
            .filter_map(|g| self.groups.get(g))
            .flat_map(|g| g.capabilities.iter().copied())
            .collect()
    }

    /// Groups whose `managed_by` names `name`, excluding `name` itself.
    pub fn managed_groups(&self, name: &str) -> BTreeSet<String> {
        self.groups
            .values()
            .filter(|g| g.name != name && g.managed_by.as_deref() == Some(name))
            .map(|g| g.name.clone())
            .collect()
    }
}

/// Set membership test where `GLOBAL_ROOT` grants everything.
pub fn grants(caps: &BTreeSet<Capability>, wanted: Capability) -> bool {
    caps.contains(&Capability::GlobalRoot) || caps.contains(&wanted)
}

/// Builds [`GroupGraph`] snapshots from a storage collaborator.
#[derive(Clone)]
pub struct MembershipResolver {
    storage: Arc<dyn Storage>,
}

impl MembershipResolver {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Load every group and entity.
    ///
    /// Records deleted between discovery and load are skipped; any other
    /// storage error aborts the snapshot.
    pub async fn snapshot(&self) -> Result<GroupGraph, OrreryError> {
        let mut groups = Vec::new();
        for name in self.storage.discover_group_names().await? {
            if let Some(group) = found(self.storage.load_group(&name).await)? {
                groups.push(group);
            }
        }

        let mut entities = Vec::new();
        for id in self.storage.discover_entity_ids().await? {
            if let Some(entity) = found(self.storage.load_entity(&id).await)? {
                entities.push(entity);
            }
        }

        tracing::debug!(
            groups = groups.len(),
            entities = entities.len(),
            "Took membership snapshot"
        );

        Ok(GroupGraph::new(groups, entities))
    }
}
