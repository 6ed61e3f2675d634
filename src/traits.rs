use async_trait::async_trait;

use crate::error::OrgTreeError;
use crate::node::{NodeId, NodeRow};

/// Result of inserting a node.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InsertOutcome {
    Created(NodeId),
    /// A sibling under the same parent already carries the name.
    NameTaken,
}

/// Result of moving a node under a new parent.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReparentOutcome {
    Moved,
    /// The new parent already has a child with the moved node's name.
    NameTaken,
    /// The new parent sits inside the moved node's subtree.
    WouldCycle,
}

/// Query and mutation capabilities the org tree needs from its backing store.
///
/// Implementations decide where the recursive traversals run (in the
/// database or in process) but must honour the row-set contracts below,
/// since the assembler rejects row sets that leave a parent out.
#[async_trait]
pub trait NodeStore: Send + Sync + 'static {
    /// Rows for `id`, its immediate children and every ancestor up to the
    /// root. Empty if `id` does not exist.
    async fn fetch_lineage(&self, id: NodeId) -> Result<Vec<NodeRow>, OrgTreeError>;

    /// Rows for every parentless node plus their immediate children.
    async fn fetch_roots_and_children(&self) -> Result<Vec<NodeRow>, OrgTreeError>;

    /// Whether `candidate` is in the descendant closure of `ancestor`, the
    /// closure including `ancestor` itself.
    async fn closure_contains(
        &self,
        ancestor: NodeId,
        candidate: NodeId,
    ) -> Result<bool, OrgTreeError>;

    async fn insert_node(
        &self,
        name: &str,
        parent_id: Option<NodeId>,
    ) -> Result<InsertOutcome, OrgTreeError>;

    /// Points `id` at `new_parent_id`, refusing moves that would close a
    /// cycle even if the tree changed since the caller last looked.
    async fn update_parent(
        &self,
        id: NodeId,
        new_parent_id: NodeId,
    ) -> Result<ReparentOutcome, OrgTreeError>;

    /// Removes `id` and all of its descendants, returning the number of rows
    /// removed.
    async fn delete_subtree(&self, id: NodeId) -> Result<u64, OrgTreeError>;
}
