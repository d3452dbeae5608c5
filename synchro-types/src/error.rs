//! Error types for synchro-types.

use thiserror::Error;

/// Errors raised while parsing or validating snapshot types.
#[derive(Debug, Error)]
pub enum TypesError {
    /// Object id is not 40 hex characters.
    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    /// Repo key is not of the form `owner/name`.
    #[error("invalid repo key: {0}")]
    InvalidRepoKey(String),

    /// A leaf violates the refs-xor-conflicts invariant.
    #[error("invalid leaf {repo}: {reason}")]
    InvalidLeaf {
        /// The offending repo, `owner/name`.
        repo: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Canonical encoding of an object failed.
    #[error("encoding failed: {0}")]
    Encoding(#[source] rmp_serde::encode::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = TypesError::InvalidLeaf {
            repo: "alice/photos".into(),
            reason: "branch master has both a ref and conflicts".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid leaf alice/photos: branch master has both a ref and conflicts"
        );
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TypesError>();
    }
}
