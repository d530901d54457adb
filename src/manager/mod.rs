//! The façade binding hook chains and the membership resolver to the
//! storage and crypto collaborators.

mod entity;
mod group;
mod query;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::chain::{defaults, loader, Chain, ChainConfig, HookRegistry, RequestContext};
use crate::errors::OrreryError;
use crate::hooks::RefContext;
use crate::membership::MembershipResolver;
use crate::settings::Settings;
use crate::types::{Capability, Entity, Group, RecordKind};

pub struct Manager {
    /// Creating the bootstrap entity skips the usual prerequisites, so it
    /// may happen at most once per process.
    bootstrap_done: AtomicBool,
    refs: RefContext,
    entity_chains: HashMap<String, Chain<Entity>>,
    group_chains: HashMap<String, Chain<Group>>,
    resolver: MembershipResolver,
    hook_timeout: Option<Duration>,
}

impl Manager {
    /// Build every configured chain up front.
    ///
    /// Fails with `UnknownChain` if a chain the operations rely on is absent
    /// and with `UnknownHook` if any chain names an unregistered hook.
    pub fn new(refs: RefContext, registry: &HookRegistry, config: &ChainConfig) -> Result<Self, OrreryError> {
        config.require(RecordKind::Entity, &defaults::entity_chain_names())?;
        config.require(RecordKind::Group, &defaults::group_chain_names())?;

        let entity_chains = registry.build_chains::<Entity>(&config.entity, &refs)?;
        let group_chains = registry.build_chains::<Group>(&config.group, &refs)?;

        Ok(Self {
            bootstrap_done: AtomicBool::new(false),
            resolver: MembershipResolver::new(refs.storage.clone()),
            refs,
            entity_chains,
            group_chains,
            hook_timeout: None,
        })
    }

    /// Manager over the built-in hooks and chains.
    pub fn with_defaults(refs: RefContext) -> Result<Self, OrreryError> {
        let registry = HookRegistry::with_builtin()?;
        Self::new(refs, &registry, &defaults::builtin())
    }

    /// Manager configured from settings: chain files if a directory is set,
    /// the built-in chains otherwise, and the configured hook timeout.
    pub fn from_settings(settings: &Settings, refs: RefContext) -> Result<Self, OrreryError> {
        let mut config = defaults::builtin();
        if let Some(dir) = &settings.chains.dir {
            config.merge(loader::load_chain_dir(dir)?);
        }

        let registry = HookRegistry::with_builtin()?;
        let manager = Self::new(refs, &registry, &config)?;
        Ok(manager.with_hook_timeout(settings.manager.hook_timeout()))
    }

    /// Deadline applied to every chain run started by a Manager operation.
    pub fn with_hook_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.hook_timeout = timeout;
        self
    }

    fn request_context(&self) -> RequestContext {
        match self.hook_timeout {
            Some(t) => RequestContext::with_timeout(t),
            None => RequestContext::background(),
        }
    }

    /// Run a named entity chain with a caller-supplied context.
    ///
    /// Returns the accumulated record. Nothing is persisted unless the chain
    /// contains a save hook.
    pub async fn run_entity_chain(
        &self,
        ctx: &RequestContext,
        chain: &str,
        delta: &Entity,
    ) -> Result<Entity, OrreryError> {
        let chain = self
            .entity_chains
            .get(chain)
            .ok_or_else(|| OrreryError::UnknownChain {
                kind: RecordKind::Entity,
                name: chain.to_string(),
            })?;
        let mut current = Entity::default();
        chain.run(ctx, &mut current, delta).await?;
        Ok(current)
    }

    pub async fn run_group_chain(
        &self,
        ctx: &RequestContext,
        chain: &str,
        delta: &Group,
    ) -> Result<Group, OrreryError> {
        let chain = self
            .group_chains
            .get(chain)
            .ok_or_else(|| OrreryError::UnknownChain {
                kind: RecordKind::Group,
                name: chain.to_string(),
            })?;
        let mut current = Group::default();
        chain.run(ctx, &mut current, delta).await?;
        Ok(current)
    }

    async fn entity_chain(&self, chain: &str, delta: &Entity) -> Result<Entity, OrreryError> {
        self.run_entity_chain(&self.request_context(), chain, delta).await
    }

    async fn group_chain(&self, chain: &str, delta: &Group) -> Result<Group, OrreryError> {
        self.run_group_chain(&self.request_context(), chain, delta).await
    }

    /// Create (or complete) an entity holding `GLOBAL_ROOT`.
    ///
    /// The one-time flag is consumed before the chain runs, so a second call
    /// fails with `BootstrapAlreadyDone` whatever happened to the first.
    pub async fn bootstrap(&self, id: &str, secret: &str) -> Result<(), OrreryError> {
        if self
            .bootstrap_done
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(OrreryError::BootstrapAlreadyDone);
        }

        let mut delta = Entity::new(id);
        delta.secret = Some(secret.to_string());
        delta.meta.capabilities = vec![Capability::GlobalRoot];

        self.entity_chain("BOOTSTRAP-SERVER", &delta).await?;
        tracing::info!(entity = id, "Bootstrap entity created with GLOBAL_ROOT");
        Ok(())
    }

    /// Consume the bootstrap flag without creating anything.
    pub fn disable_bootstrap(&self) {
        if !self.bootstrap_done.swap(true, Ordering::AcqRel) {
            tracing::info!("Bootstrap disabled");
        }
    }

    pub fn bootstrap_done(&self) -> bool {
        self.bootstrap_done.load(Ordering::Acquire)
    }
}

/// The `key:value` entry handed to a UM chain. The entry splits at its first
/// `:`, so the key may not contain one.
fn um_entry(key: &str, value: &str) -> Result<String, OrreryError> {
    if key.contains(':') {
        return Err(OrreryError::MalformedRequest(format!(
            "metadata key `{key}` must not contain `:`"
        )));
    }
    Ok(format!("{key}:{value}"))
}
