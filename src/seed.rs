use crate::errors::OrreryError;
use crate::manager::Manager;
use crate::types::{Capability, EntityMeta, ExpansionRule, Group};
use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Group definition from the seed file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDefinition {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub managed_by: Option<String>,
    /// Capability names, e.g. "MODIFY_GROUP_MEMBERS"
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Expansion rules as "MODE:child", e.g. "INCLUDE:eng"
    #[serde(default)]
    pub rules: Vec<String>,
}

/// Entity definition from the seed file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub id: String,
    /// Plain text secret, sealed on creation. Never applied to existing entities.
    pub secret: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Profile fields; only the ones that are set are applied
    #[serde(default)]
    pub meta: EntityMeta,
    /// Untyped metadata upserted as "key:value"
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub locked: Option<bool>,
}

/// Root structure of the seed JSON file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub groups: Vec<GroupDefinition>,
    #[serde(default)]
    pub entities: Vec<EntityDefinition>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl SyncSummary {
    fn record(&mut self, result: SyncResult) {
        match result {
            SyncResult::Created => self.created += 1,
            SyncResult::Updated => self.updated += 1,
            SyncResult::Unchanged => self.unchanged += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncResult {
    Created,
    Updated,
    Unchanged,
}

/// Apply a seed file through the Manager (idempotent).
///
/// Groups are created first and configured in a second pass, so rules and
/// managing groups may refer to groups defined later in the file. The seed is
/// additive: nothing missing from the file is removed.
pub async fn sync_from_file(manager: &Manager, path: &Path) -> Result<SyncSummary> {
    tracing::info!("Loading seed from {}", path.display());

    let content = fs::read_to_string(path)
        .into_diagnostic()
        .map_err(|e| miette::miette!("Failed to read seed file at '{}': {}", path.display(), e))?;

    let seed: SeedFile = serde_json::from_str(&content).into_diagnostic().map_err(|e| {
        miette::miette!(
            "Failed to parse seed JSON file: {}\n\nExpected format:\n{{\n  \"groups\": [{{ \"name\": \"staff\", \"rules\": [\"INCLUDE:eng\"] }}],\n  \"entities\": [{{ \"id\": \"alice\", \"secret\": \"...\", \"groups\": [\"staff\"] }}]\n}}",
            e
        )
    })?;

    sync(manager, &seed).await
}

pub async fn sync(manager: &Manager, seed: &SeedFile) -> Result<SyncSummary> {
    tracing::info!(
        groups = seed.groups.len(),
        entities = seed.entities.len(),
        "Applying seed"
    );

    let mut summary = SyncSummary::default();

    let mut created = Vec::with_capacity(seed.groups.len());
    for def in &seed.groups {
        created.push(create_group_if_missing(manager, def).await?);
    }
    for (def, was_created) in seed.groups.iter().zip(created) {
        let changed = configure_group(manager, def).await?;
        summary.record(match (was_created, changed) {
            (true, _) => SyncResult::Created,
            (false, true) => SyncResult::Updated,
            (false, false) => SyncResult::Unchanged,
        });
    }

    for def in &seed.entities {
        summary.record(sync_entity(manager, def).await?);
    }

    tracing::info!(
        "Seed sync complete: {} created, {} updated, {} unchanged",
        summary.created,
        summary.updated,
        summary.unchanged
    );

    Ok(summary)
}

async fn create_group_if_missing(manager: &Manager, def: &GroupDefinition) -> Result<bool> {
    match manager.fetch_group(&def.name).await {
        Ok(_) => Ok(false),
        Err(OrreryError::NotFound(_)) => {
            tracing::info!("Creating group: {}", def.name);
            let display = def.display_name.as_deref().unwrap_or_default();
            manager.create_group(&def.name, display, None, -1).await?;
            Ok(true)
        }
        Err(e) => Err(e.into()),
    }
}

async fn configure_group(manager: &Manager, def: &GroupDefinition) -> Result<bool> {
    let current = manager.fetch_group(&def.name).await?;
    let mut changed = false;

    let display_differs = def
        .display_name
        .as_ref()
        .is_some_and(|d| *d != current.display_name);
    let manager_differs = def.managed_by.is_some() && def.managed_by != current.managed_by;
    if display_differs || manager_differs {
        let update = Group {
            display_name: def.display_name.clone().unwrap_or_default(),
            managed_by: def.managed_by.clone(),
            ..Default::default()
        };
        manager.update_group_meta(&def.name, &update).await?;
        changed = true;
    }

    for name in &def.capabilities {
        let cap: Capability = name.parse()?;
        if !current.capabilities.contains(&cap) {
            manager.set_group_capability(&def.name, cap.as_str()).await?;
            changed = true;
        }
    }

    for raw in &def.rules {
        let rule = ExpansionRule::parse(raw)?;
        if !current.expansions.contains(&rule) {
            manager
                .modify_group_rule(&def.name, &rule.child, &rule.mode.to_string())
                .await?;
            changed = true;
        }
    }

    if changed {
        tracing::info!("Updated group: {}", def.name);
    }
    Ok(changed)
}

async fn sync_entity(manager: &Manager, def: &EntityDefinition) -> Result<SyncResult> {
    let current = match manager.fetch_entity(&def.id).await {
        Ok(entity) => Some(entity),
        Err(OrreryError::NotFound(_)) => None,
        Err(e) => return Err(e.into()),
    };

    let created = current.is_none();
    let current = match current {
        Some(entity) => entity,
        None => {
            tracing::info!("Creating entity: {}", def.id);
            manager.create_entity(&def.id, -1, &def.secret).await?;
            manager.fetch_entity(&def.id).await?
        }
    };

    let mut changed = false;

    let mut merged = current.meta.clone();
    merged.merge_profile(&def.meta);
    if merged != current.meta {
        manager.update_entity_meta(&def.id, def.meta.clone()).await?;
        changed = true;
    }

    for group in &def.groups {
        if !current.meta.groups.contains(group) {
            manager.add_entity_to_group(&def.id, group).await?;
            changed = true;
        }
    }

    for name in &def.capabilities {
        let cap: Capability = name.parse()?;
        if !current.meta.capabilities.contains(&cap) {
            manager.set_entity_capability(&def.id, cap.as_str()).await?;
            changed = true;
        }
    }

    for (key, value) in &def.properties {
        let entry = format!("{key}:{value}");
        if !current.meta.untyped_meta.contains(&entry) {
            manager.manage_entity_um(&def.id, "UPSERT", key, value).await?;
            changed = true;
        }
    }

    match def.locked {
        Some(true) if !current.meta.locked => {
            manager.lock_entity(&def.id).await?;
            changed = true;
        }
        Some(false) if current.meta.locked => {
            manager.unlock_entity(&def.id).await?;
            changed = true;
        }
        _ => {}
    }

    Ok(match (created, changed) {
        (true, _) => SyncResult::Created,
        (false, true) => {
            tracing::info!("Updated entity: {}", def.id);
            SyncResult::Updated
        }
        (false, false) => SyncResult::Unchanged,
    })
}
