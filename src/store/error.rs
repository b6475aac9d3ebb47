//! Store-specific error types.

use crate::store::id::NodeId;
use thiserror::Error;

/// Errors that can occur while reading or mutating a hierarchical store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("No node at path '{0}'")]
    NotFound(String),

    #[error("'{0}' is a leaf, not a node")]
    NotInterior(String),

    #[error("'{0}' is a node, not a leaf")]
    NotLeaf(String),

    #[error("Duplicate child '{name}' under '{parent}'")]
    DuplicateName { parent: String, name: String },

    #[error("Invalid node name '{0}'")]
    InvalidName(String),

    #[error("Invalid node {0}")]
    InvalidNode(NodeId),

    #[error("Store is full")]
    Full,

    #[error("Unsupported value at '{0}'")]
    UnsupportedValue(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
