use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::errors::OrreryError;

/// The two record kinds that hooks and chains operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Entity,
    Group,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Entity => write!(f, "entity"),
            RecordKind::Group => write!(f, "group"),
        }
    }
}

/// A record that can flow through a hook chain.
pub trait Record: Clone + Default + Send + Sync + 'static {
    const KIND: RecordKind;

    /// The unique identifier of the record (entity id or group name).
    fn key(&self) -> &str;
}

/// Symbolic permission grantable to entities and groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    GlobalRoot,
    CreateEntity,
    DestroyEntity,
    ModifyEntityMeta,
    ModifyEntityKeys,
    ChangeEntitySecret,
    LockEntity,
    UnlockEntity,
    CreateGroup,
    DestroyGroup,
    ModifyGroupMeta,
    ModifyGroupMembers,
}

impl Capability {
    pub const ALL: [Capability; 12] = [
        Capability::GlobalRoot,
        Capability::CreateEntity,
        Capability::DestroyEntity,
        Capability::ModifyEntityMeta,
        Capability::ModifyEntityKeys,
        Capability::ChangeEntitySecret,
        Capability::LockEntity,
        Capability::UnlockEntity,
        Capability::CreateGroup,
        Capability::DestroyGroup,
        Capability::ModifyGroupMeta,
        Capability::ModifyGroupMembers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::GlobalRoot => "GLOBAL_ROOT",
            Capability::CreateEntity => "CREATE_ENTITY",
            Capability::DestroyEntity => "DESTROY_ENTITY",
            Capability::ModifyEntityMeta => "MODIFY_ENTITY_META",
            Capability::ModifyEntityKeys => "MODIFY_ENTITY_KEYS",
            Capability::ChangeEntitySecret => "CHANGE_ENTITY_SECRET",
            Capability::LockEntity => "LOCK_ENTITY",
            Capability::UnlockEntity => "UNLOCK_ENTITY",
            Capability::CreateGroup => "CREATE_GROUP",
            Capability::DestroyGroup => "DESTROY_GROUP",
            Capability::ModifyGroupMeta => "MODIFY_GROUP_META",
            Capability::ModifyGroupMembers => "MODIFY_GROUP_MEMBERS",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = OrreryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Capability::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| OrreryError::UnknownCapability(s.to_string()))
    }
}

/// Insert `cap` into a capability list, keeping it sorted and free of duplicates.
pub fn insert_capability(caps: &mut Vec<Capability>, cap: Capability) {
    caps.push(cap);
    caps.sort();
    caps.dedup();
}

/// Remove every occurrence of `cap` from a capability list.
pub fn remove_capability(caps: &mut Vec<Capability>, cap: Capability) {
    caps.retain(|c| *c != cap);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExpansionMode {
    Include,
    Exclude,
}

impl fmt::Display for ExpansionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpansionMode::Include => write!(f, "INCLUDE"),
            ExpansionMode::Exclude => write!(f, "EXCLUDE"),
        }
    }
}

impl FromStr for ExpansionMode {
    type Err = OrreryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INCLUDE" => Ok(ExpansionMode::Include),
            "EXCLUDE" => Ok(ExpansionMode::Exclude),
            _ => Err(OrreryError::InvalidMode(s.to_string())),
        }
    }
}

/// An expansion rule stored on its parent group: "MODE:child".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpansionRule {
    pub mode: ExpansionMode,
    pub child: String,
}

impl ExpansionRule {
    pub fn include(child: &str) -> Self {
        Self {
            mode: ExpansionMode::Include,
            child: child.to_string(),
        }
    }

    pub fn exclude(child: &str) -> Self {
        Self {
            mode: ExpansionMode::Exclude,
            child: child.to_string(),
        }
    }

    pub fn parse(s: &str) -> Result<Self, OrreryError> {
        let (mode, child) = s.split_once(':').ok_or_else(|| {
            OrreryError::MalformedRequest(format!(
                "invalid expansion rule `{s}` (expected \"MODE:child\")"
            ))
        })?;
        if child.is_empty() {
            return Err(OrreryError::MalformedRequest(format!(
                "expansion rule `{s}` names no child group"
            )));
        }
        Ok(Self {
            mode: mode.parse()?,
            child: child.to_string(),
        })
    }
}

impl fmt::Display for ExpansionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.mode, self.child)
    }
}

/// Profile and membership data attached to an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityMeta {
    pub primary_group: Option<String>,
    pub gecos: Option<String>,
    pub legal_name: Option<String>,
    pub display_name: Option<String>,
    pub home: Option<String>,
    pub shell: Option<String>,
    pub graphical_shell: Option<String>,
    pub badge_number: Option<String>,
    pub locked: bool,
    /// Direct group memberships.
    pub groups: Vec<String>,
    pub capabilities: Vec<Capability>,
    /// Public keys as "TYPE:material".
    pub keys: Vec<String>,
    /// Ordered "key:value" metadata.
    pub untyped_meta: Vec<String>,
}

impl EntityMeta {
    /// Copy every profile field that is set in `other` over the one in `self`.
    /// Membership, capabilities, keys, lock state and untyped metadata are
    /// managed by their own chains and are left alone.
    pub fn merge_profile(&mut self, other: &EntityMeta) {
        fn take(dst: &mut Option<String>, src: &Option<String>) {
            if let Some(v) = src {
                *dst = Some(v.clone());
            }
        }
        take(&mut self.primary_group, &other.primary_group);
        take(&mut self.gecos, &other.gecos);
        take(&mut self.legal_name, &other.legal_name);
        take(&mut self.display_name, &other.display_name);
        take(&mut self.home, &other.home);
        take(&mut self.shell, &other.shell);
        take(&mut self.graphical_shell, &other.graphical_shell);
        take(&mut self.badge_number, &other.badge_number);
    }
}

/// A principal: a user or service identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(default)]
    pub number: i32,
    /// Sealed secret as produced by the crypto collaborator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default)]
    pub meta: EntityMeta,
}

impl Entity {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Default::default()
        }
    }

    /// Copy with the secret removed, suitable for returning to callers.
    pub fn redacted(&self) -> Self {
        Self {
            secret: None,
            ..self.clone()
        }
    }
}

impl Record for Entity {
    const KIND: RecordKind = RecordKind::Entity;

    fn key(&self) -> &str {
        &self.id
    }
}

/// A named collection of entities with optional nesting rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub number: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_by: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub expansions: Vec<ExpansionRule>,
    #[serde(default)]
    pub untyped_meta: Vec<String>,
}

impl Group {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Child group names reachable through rules of the given mode, in rule order.
    pub fn children(&self, mode: ExpansionMode) -> impl Iterator<Item = &str> {
        self.expansions
            .iter()
            .filter(move |r| r.mode == mode)
            .map(|r| r.child.as_str())
    }
}

impl Record for Group {
    const KIND: RecordKind = RecordKind::Group;

    fn key(&self) -> &str {
        &self.name
    }
}

/// Read-only view of an entity together with its resolved authorization data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityInfo {
    pub entity: Entity,
    pub direct_groups: BTreeSet<String>,
    pub effective_groups: BTreeSet<String>,
    pub effective_capabilities: BTreeSet<Capability>,
}

/// Read-only view of a group together with its resolved membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupInfo {
    pub group: Group,
    pub members: BTreeSet<String>,
    /// Groups whose `managed_by` names this group.
    pub manages: BTreeSet<String>,
    pub effective_capabilities: BTreeSet<Capability>,
}
