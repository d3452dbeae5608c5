//! Error types for synchro-core.

use synchro_types::TypesError;
use thiserror::Error;

/// Errors reported by collaborator stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object, ref or record not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Insert or archive collided with an existing id.
    #[error("duplicate key: {0}")]
    Duplicate(String),

    /// Backend failure.
    #[error("store backend error: {0}")]
    Backend(String),

    /// Content addressing failed.
    #[error("content addressing failed: {0}")]
    Types(#[from] TypesError),
}

/// Errors that abort a synchro operation.
#[derive(Debug, Error)]
pub enum SynchroError {
    /// A branch or remote ref is missing.
    #[error("ref not found: {name}")]
    RefNotFound {
        /// Full ref name.
        name: String,
    },

    /// A leaf violates the refs-xor-conflicts invariant.
    #[error("invalid snapshot: {0}")]
    SnapshotInvalid(#[source] TypesError),

    /// A collaborator broke its contract, or an unreachable case was hit.
    #[error("logic error: {0}")]
    Logic(String),

    /// A conditional update that must succeed affected zero rows.
    #[error("apply failed for {repo}: {reason}")]
    ApplyFailed {
        /// The repo, `owner/name`.
        repo: String,
        /// What went wrong.
        reason: String,
    },

    /// The final compare-and-swap of a branch ref was rejected.
    #[error("ref update rejected: {name} no longer points at {expected}")]
    RefUpdateRejected {
        /// Full ref name.
        name: String,
        /// The value the update expected, or `none`.
        expected: String,
    },

    /// Another run is already applying to the live collection.
    #[error("synchro {synchro} is already applying a diff")]
    ApplyInProgress {
        /// Synchro name.
        synchro: String,
    },

    /// Collaborator failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias for synchro operations.
pub type Result<T> = std::result::Result<T, SynchroError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
