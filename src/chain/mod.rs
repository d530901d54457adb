//! Declarative hook chains: configuration, construction and execution.

pub mod defaults;
pub mod loader;
pub mod registry;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::errors::OrreryError;
use crate::hooks::Hook;
use crate::types::{Record, RecordKind};

pub use registry::HookRegistry;

/// Chain name to ordered hook names, kept separately for each record kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainConfig {
    pub entity: BTreeMap<String, Vec<String>>,
    pub group: BTreeMap<String, Vec<String>>,
}

impl ChainConfig {
    pub fn chains(&self, kind: RecordKind) -> &BTreeMap<String, Vec<String>> {
        match kind {
            RecordKind::Entity => &self.entity,
            RecordKind::Group => &self.group,
        }
    }

    /// Overlay `other`, replacing chains that share a name.
    pub fn merge(&mut self, other: ChainConfig) {
        self.entity.extend(other.entity);
        self.group.extend(other.group);
    }

    /// Fail with `UnknownChain` unless every named chain is configured.
    pub fn require(&self, kind: RecordKind, names: &[&str]) -> Result<(), OrreryError> {
        let chains = self.chains(kind);
        for name in names {
            if !chains.contains_key(*name) {
                return Err(OrreryError::UnknownChain {
                    kind,
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Per-request state threaded through chain execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
}

impl RequestContext {
    /// No deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// An ordered, immutable sequence of hooks for one operation.
pub struct Chain<T: Record> {
    name: String,
    hooks: Vec<Arc<dyn Hook<T>>>,
}

impl<T: Record> std::fmt::Debug for Chain<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("name", &self.name)
            .field("hooks", &self.hook_names())
            .finish()
    }
}

impl<T: Record> Chain<T> {
    /// Orders `hooks` by ascending priority. The sort is stable, so equal
    /// priorities keep their configured order.
    pub fn new(name: &str, mut hooks: Vec<Arc<dyn Hook<T>>>) -> Self {
        hooks.sort_by_key(|h| h.priority());
        Self {
            name: name.to_string(),
            hooks,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hook_names(&self) -> Vec<&str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }

    /// Run every hook in order against `current`.
    ///
    /// The first error stops the chain and is returned unchanged. Mutations
    /// already applied to `current` are not rolled back; nothing is persisted
    /// unless a save hook ran.
    pub async fn run(&self, ctx: &RequestContext, current: &mut T, delta: &T) -> Result<(), OrreryError> {
        for hook in &self.hooks {
            if ctx.is_expired() {
                return Err(OrreryError::DeadlineExceeded {
                    hook: hook.name().to_string(),
                });
            }

            tracing::debug!(chain = %self.name, hook = hook.name(), key = current.key(), "Running hook");

            let res = match ctx.deadline() {
                Some(deadline) => tokio::time::timeout_at(deadline, hook.run(current, delta))
                    .await
                    .map_err(|_| OrreryError::DeadlineExceeded {
                        hook: hook.name().to_string(),
                    })?,
                None => hook.run(current, delta).await,
            };

            if let Err(e) = res {
                tracing::debug!(chain = %self.name, hook = hook.name(), error = %e, "Hook failed");
                return Err(e);
            }
        }
        Ok(())
    }
}
