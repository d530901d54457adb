//! Hooks are the units every mutation chain is assembled from.
//!
//! A hook receives the accumulating `current` record and the caller's
//! `delta`. It may mutate `current`, read `delta`, and call the collaborators
//! captured from the [`RefContext`] when it was constructed.

pub mod entity;
pub mod group;

use async_trait::async_trait;
use std::sync::Arc;

use crate::chain::HookRegistry;
use crate::crypto::Crypto;
use crate::errors::OrreryError;
use crate::storage::Storage;
use crate::types::Record;

/// Collaborators handed to every hook constructor at chain-build time.
#[derive(Clone)]
pub struct RefContext {
    pub storage: Arc<dyn Storage>,
    pub crypto: Arc<dyn Crypto>,
}

impl RefContext {
    pub fn new(storage: Arc<dyn Storage>, crypto: Arc<dyn Crypto>) -> Self {
        Self { storage, crypto }
    }
}

#[async_trait]
pub trait Hook<T: Record>: Send + Sync {
    fn name(&self) -> &str;

    /// Lower runs first.
    fn priority(&self) -> i32;

    async fn run(&self, current: &mut T, delta: &T) -> Result<(), OrreryError>;
}

pub type HookConstructor<T> = fn(&RefContext) -> Result<Box<dyn Hook<T>>, OrreryError>;

/// Register every built-in entity and group hook.
pub fn register_builtin(registry: &mut HookRegistry) -> Result<(), OrreryError> {
    entity::register(registry)?;
    group::register(registry)?;
    Ok(())
}

/// Treat a storage `NotFound` as absence, passing other failures through.
pub(crate) fn found<V>(res: Result<V, crate::storage::StorageError>) -> Result<Option<V>, OrreryError> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(crate::storage::StorageError::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
