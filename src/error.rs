//! Error types for the MoteKV indexing layer
//!
//! Every error aborts the current call chain. Nothing here is retried; the
//! enclosing unit of work decides whether to roll back.

use crate::types::Name;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, KvError>;

#[derive(Error, Debug)]
pub enum KvError {
    /// A fresh insert collided with a secondary entry owned by another record
    #[error("attempted to store an existing secondary index ({index})")]
    DuplicateSecondaryKey { index: Name },

    /// An update found a secondary entry that points at a different record
    #[error("attempted to update an existing secondary index ({index})")]
    SecondaryKeyConflict { index: Name },

    #[error("key not found in `[]`")]
    KeyNotFound,

    #[error("{0}")]
    IteratorMisuse(&'static str),

    #[error("there was an error deserializing this value: expected tag {expected}, found {found}")]
    SchemaTagMismatch { expected: u32, found: u32 },

    #[error("substrate failure: {0}")]
    SubstrateFailure(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Invalid hex key: {0}")]
    InvalidHex(String),

    #[error("Invalid cursor handle: {0}")]
    InvalidCursor(u32),

    #[error("cursors are bound to different scopes or prefixes")]
    CursorMismatch,

    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KvError {
    /// True for the two index-consistency violations raised by `put`
    pub fn is_consistency_violation(&self) -> bool {
        matches!(
            self,
            KvError::DuplicateSecondaryKey { .. } | KvError::SecondaryKeyConflict { .. }
        )
    }
}

impl From<bincode::Error> for KvError {
    fn from(err: bincode::Error) -> Self {
        KvError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for KvError {
    fn from(err: serde_json::Error) -> Self {
        KvError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_messages() {
        let index: Name = "byname".parse().unwrap();
        let err = KvError::DuplicateSecondaryKey { index };
        assert_eq!(
            err.to_string(),
            "attempted to store an existing secondary index (byname)"
        );
        assert!(err.is_consistency_violation());

        let err = KvError::IteratorMisuse("cannot read end iterator");
        assert_eq!(err.to_string(), "cannot read end iterator");
        assert!(!err.is_consistency_violation());

        assert_eq!(KvError::KeyNotFound.to_string(), "key not found in `[]`");
    }
}
