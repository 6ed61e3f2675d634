use thiserror::Error;

use crate::node::NodeId;

/// Errors returned by the org-tree operations.
#[derive(Debug, Error)]
pub enum OrgTreeError {
    #[error("Could not find node with ID {id}")]
    NotFound { id: NodeId },

    #[error("the name '{name}' has already been taken under the parent with id #{parent_id}")]
    NameConflict { name: String, parent_id: NodeId },

    #[error("the node with id {descendant_id} is a descendant of the node with id {id}")]
    CycleRejected { id: NodeId, descendant_id: NodeId },

    /// The rows handed to the assembler do not form a valid forest. This is
    /// an integrity fault, never a user error.
    #[error("invalid tree: {0}")]
    InvalidTree(String),

    #[error("{0}")]
    Validation(String),

    #[error("org-tree currently supports PostgreSQL connections only")]
    UnsupportedBackend,

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl OrgTreeError {
    pub fn not_found(id: NodeId) -> Self {
        Self::NotFound { id }
    }

    pub fn invalid_tree(detail: impl Into<String>) -> Self {
        Self::InvalidTree(detail.into())
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        Self::Validation(detail.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True for faults that point at a bug, corrupt data or the store itself
    /// rather than at the request.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::InvalidTree(_) | Self::UnsupportedBackend | Self::Database(_)
        )
    }
}
