//! Read-only questions answered from a resolver snapshot. None of these run
//! a chain.

use std::collections::BTreeSet;

use crate::errors::OrreryError;
use crate::manager::Manager;
use crate::membership::{grants, GroupGraph};
use crate::types::{Capability, EntityInfo, GroupInfo};

fn require_entity(graph: &GroupGraph, id: &str) -> Result<(), OrreryError> {
    match graph.entity(id) {
        Some(_) => Ok(()),
        None => Err(OrreryError::NotFound(format!("entity `{id}`"))),
    }
}

fn require_group(graph: &GroupGraph, name: &str) -> Result<(), OrreryError> {
    match graph.group(name) {
        Some(_) => Ok(()),
        None => Err(OrreryError::NotFound(format!("group `{name}`"))),
    }
}

impl Manager {
    pub async fn entity_info(&self, id: &str) -> Result<EntityInfo, OrreryError> {
        let graph = self.resolver.snapshot().await?;
        let entity = graph
            .entity(id)
            .ok_or_else(|| OrreryError::NotFound(format!("entity `{id}`")))?;

        Ok(EntityInfo {
            entity: entity.redacted(),
            direct_groups: entity.meta.groups.iter().cloned().collect(),
            effective_groups: graph.containing_groups(id),
            effective_capabilities: graph.entity_capabilities(id),
        })
    }

    pub async fn group_info(&self, name: &str) -> Result<GroupInfo, OrreryError> {
        let graph = self.resolver.snapshot().await?;
        let group = graph
            .group(name)
            .ok_or_else(|| OrreryError::NotFound(format!("group `{name}`")))?;

        Ok(GroupInfo {
            group: group.clone(),
            members: graph.members(name),
            manages: graph.managed_groups(name),
            effective_capabilities: graph.group_capabilities(name),
        })
    }

    /// Resolved members of a group, after expansion rules.
    pub async fn list_members(&self, name: &str) -> Result<BTreeSet<String>, OrreryError> {
        let graph = self.resolver.snapshot().await?;
        require_group(&graph, name)?;
        Ok(graph.members(name))
    }

    /// Groups the entity belongs to. Without `include_indirect` only the
    /// groups listed on the entity itself are returned.
    pub async fn get_memberships(&self, id: &str, include_indirect: bool) -> Result<BTreeSet<String>, OrreryError> {
        let graph = self.resolver.snapshot().await?;
        require_entity(&graph, id)?;

        if include_indirect {
            Ok(graph.containing_groups(id))
        } else {
            Ok(graph
                .entity(id)
                .map(|e| e.meta.groups.iter().cloned().collect())
                .unwrap_or_default())
        }
    }

    pub async fn entity_has_capability(&self, id: &str, capability: Capability) -> Result<bool, OrreryError> {
        let graph = self.resolver.snapshot().await?;
        require_entity(&graph, id)?;
        Ok(grants(&graph.entity_capabilities(id), capability))
    }

    /// Like [`Manager::entity_has_capability`], but a missing capability is
    /// an error.
    pub async fn check_capability(&self, id: &str, capability: Capability) -> Result<(), OrreryError> {
        if self.entity_has_capability(id, capability).await? {
            Ok(())
        } else {
            tracing::debug!(entity = id, capability = %capability, "Capability check failed");
            Err(OrreryError::RequestorUnqualified(capability.to_string()))
        }
    }

    /// Whether `id` may change the membership of `group`: either through
    /// `MODIFY_GROUP_MEMBERS` or by belonging to the group's managing group.
    pub async fn can_manage_group(&self, id: &str, group: &str) -> Result<bool, OrreryError> {
        let graph = self.resolver.snapshot().await?;
        require_entity(&graph, id)?;
        let target = graph
            .group(group)
            .ok_or_else(|| OrreryError::NotFound(format!("group `{group}`")))?;

        if grants(&graph.entity_capabilities(id), Capability::ModifyGroupMembers) {
            return Ok(true);
        }

        Ok(match target.managed_by.as_deref() {
            Some(manager) => graph.members(manager).contains(id),
            None => false,
        })
    }
}
