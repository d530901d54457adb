use miette::Diagnostic;
use thiserror::Error;

use crate::storage::StorageError;
use crate::types::RecordKind;

#[derive(Debug, Error, Diagnostic)]
pub enum OrreryError {
    #[error("Not found: {0}")]
    #[diagnostic(code(orrery::not_found))]
    NotFound(String),

    #[error("Already exists: {0}")]
    #[diagnostic(code(orrery::already_exists))]
    AlreadyExists(String),

    #[error("Unknown {kind} hook `{name}`")]
    #[diagnostic(
        code(orrery::unknown_hook),
        help("Every hook named in a chain must be registered for the same record kind")
    )]
    UnknownHook { kind: RecordKind, name: String },

    #[error("Unknown {kind} chain `{name}`")]
    #[diagnostic(
        code(orrery::unknown_chain),
        help("Declare the chain with an `entity-chain` or `group-chain` node in the chain configuration")
    )]
    UnknownChain { kind: RecordKind, name: String },

    #[error("Hook `{name}` is already registered for {kind} chains")]
    #[diagnostic(code(orrery::duplicate_hook))]
    DuplicateHook { kind: RecordKind, name: String },

    #[error("Unknown capability `{0}`")]
    #[diagnostic(
        code(orrery::unknown_capability),
        help("Capabilities are symbolic names such as GLOBAL_ROOT or MODIFY_GROUP_MEMBERS")
    )]
    UnknownCapability(String),

    #[error("Invalid mode `{0}`")]
    #[diagnostic(code(orrery::invalid_mode))]
    InvalidMode(String),

    #[error("Secret verification failed")]
    #[diagnostic(code(orrery::verification_failed))]
    VerificationFailed,

    #[error("Entity is locked")]
    #[diagnostic(code(orrery::entity_locked))]
    EntityLocked,

    #[error("Bootstrap has already been performed")]
    #[diagnostic(
        code(orrery::bootstrap_done),
        help("Bootstrap may run once per process lifetime; restart the process to bootstrap again")
    )]
    BootstrapAlreadyDone,

    #[error("Requestor lacks capability `{0}`")]
    #[diagnostic(code(orrery::unqualified))]
    RequestorUnqualified(String),

    #[error("Expansion would create a cycle: {0}")]
    #[diagnostic(
        code(orrery::expansion_cycle),
        help("A group may not include itself through any chain of INCLUDE rules")
    )]
    ExpansionCycle(String),

    #[error("Deadline exceeded while running hook `{hook}`")]
    #[diagnostic(code(orrery::deadline))]
    DeadlineExceeded { hook: String },

    #[error("Malformed request: {0}")]
    #[diagnostic(code(orrery::malformed_request))]
    MalformedRequest(String),

    #[error("Crypto failure: {0}")]
    #[diagnostic(code(orrery::crypto))]
    CryptoFailure(String),

    #[error("Storage failure")]
    #[diagnostic(code(orrery::storage))]
    StorageFailure(#[source] StorageError),

    #[error("Failed to load chain configuration file `{path}`")]
    #[diagnostic(
        code(orrery::chain_load),
        help("Check that the file exists and contains valid KDL syntax")
    )]
    ChainLoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid chain configuration: {0}")]
    #[diagnostic(
        code(orrery::invalid_chain_config),
        help("Chain files contain `entity-chain` and `group-chain` nodes, each listing hook names as `- \"hook-name\"` children")
    )]
    InvalidChainConfig(String),

    #[error("KDL parse error: {0}")]
    #[diagnostic(
        code(orrery::kdl_parse),
        help("Check the KDL syntax of the chain file (see https://kdl.dev)")
    )]
    KdlParse(String),

    #[error("I/O error: {0}")]
    #[diagnostic(code(orrery::io))]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for OrreryError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound(what) => OrreryError::NotFound(what),
            other => OrreryError::StorageFailure(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_not_found_maps_to_not_found() {
        let err: OrreryError = StorageError::NotFound("entity `alice`".into()).into();
        assert!(matches!(err, OrreryError::NotFound(ref w) if w == "entity `alice`"));
    }

    #[test]
    fn test_storage_other_maps_to_failure() {
        let err: OrreryError = StorageError::Unavailable("disk on fire".into()).into();
        assert!(matches!(err, OrreryError::StorageFailure(_)));
    }

    #[test]
    fn test_unknown_hook_message_names_kind() {
        let err = OrreryError::UnknownHook {
            kind: RecordKind::Group,
            name: "load-entity".into(),
        };
        assert_eq!(err.to_string(), "Unknown group hook `load-entity`");
    }
}
