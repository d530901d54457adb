//! Orrery - identity and authorization backend
//!
//! Mutations of entities and groups run through configurable chains of
//! hooks; group membership and capabilities are resolved from nested
//! INCLUDE/EXCLUDE rules. The [`Manager`] binds both to storage and crypto
//! collaborators.

pub mod chain;
pub mod crypto;
pub mod entities;
pub mod errors;
pub mod hooks;
pub mod manager;
pub mod membership;
pub mod patch;
pub mod seed;
pub mod settings;
pub mod storage;
pub mod types;

pub use errors::OrreryError;
pub use manager::Manager;
pub use types::{Capability, Entity, EntityMeta, ExpansionMode, ExpansionRule, Group};
