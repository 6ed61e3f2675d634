use serde::Serialize;

use crate::error::OrgTreeError;
use crate::node::{validate_id, validate_name, Node, NodeId};
use crate::traits::{InsertOutcome, NodeStore, ReparentOutcome};
use crate::tree::Forest;

/// Result of [`OrgTreeRepository::lookup`], where id `0` asks for the roots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Lookup {
    Node(Node),
    Roots(Vec<Node>),
}

/// Repository exposing the org-tree operations over a [`NodeStore`].
///
/// Every read reassembles the affected rows, so `root_id` and `height`
/// always reflect the parent chain as stored at read time.
#[derive(Debug, Default)]
pub struct OrgTreeRepository<S> {
    store: S,
}

impl<S> OrgTreeRepository<S>
where
    S: NodeStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates `name` under `parent_id`, or as a root when `parent_id` is `0`,
    /// and returns the stored node with its derived fields filled in.
    pub async fn create(&self, name: &str, parent_id: NodeId) -> Result<Node, OrgTreeError> {
        validate_name(name)?;
        validate_id(parent_id)?;

        let parent = if parent_id == 0 {
            None
        } else {
            Some(self.get(parent_id).await?.id)
        };

        match self.store.insert_node(name, parent).await? {
            InsertOutcome::Created(id) => {
                tracing::debug!(id, node_name = name, parent_id, "node created");
                self.get(id).await
            }
            InsertOutcome::NameTaken => {
                tracing::warn!(node_name = name, parent_id, "sibling name already taken");
                Err(OrgTreeError::NameConflict {
                    name: name.to_owned(),
                    parent_id,
                })
            }
        }
    }

    /// Fetches `id` with its immediate children.
    pub async fn get(&self, id: NodeId) -> Result<Node, OrgTreeError> {
        validate_id(id)?;
        let rows = self.store.fetch_lineage(id).await?;
        let forest = Forest::build(rows)?;
        forest.node(id)?.ok_or_else(|| OrgTreeError::not_found(id))
    }

    /// Every root with its immediate children, roots ordered by name.
    pub async fn roots(&self) -> Result<Vec<Node>, OrgTreeError> {
        let rows = self.store.fetch_roots_and_children().await?;
        Forest::build(rows)?.roots()
    }

    /// [`Self::roots`] for id `0`, [`Self::get`] for anything else.
    pub async fn lookup(&self, id: NodeId) -> Result<Lookup, OrgTreeError> {
        validate_id(id)?;
        if id == 0 {
            self.roots().await.map(Lookup::Roots)
        } else {
            self.get(id).await.map(Lookup::Node)
        }
    }

    /// Whether `candidate` lies in the subtree rooted at `ancestor`. A node
    /// counts as part of its own subtree.
    pub async fn is_descendant(
        &self,
        ancestor: NodeId,
        candidate: NodeId,
    ) -> Result<bool, OrgTreeError> {
        if ancestor == candidate {
            return Ok(true);
        }
        self.store.closure_contains(ancestor, candidate).await
    }

    /// Moves `id` under `new_parent_id`.
    ///
    /// Heights and root ids of the moved subtree are not touched here; the
    /// next read derives them from the new parent chain.
    pub async fn change_parent(&self, id: NodeId, new_parent_id: NodeId) -> Result<(), OrgTreeError> {
        validate_id(id)?;
        validate_id(new_parent_id)?;

        let node = self.get(id).await?;
        self.get(new_parent_id).await?;

        let cycle = OrgTreeError::CycleRejected {
            id,
            descendant_id: new_parent_id,
        };
        if self.is_descendant(id, new_parent_id).await? {
            tracing::warn!(id, new_parent_id, "reparent would create a cycle");
            return Err(cycle);
        }

        match self.store.update_parent(id, new_parent_id).await? {
            ReparentOutcome::Moved => {
                tracing::debug!(id, new_parent_id, "node reparented");
                Ok(())
            }
            ReparentOutcome::NameTaken => {
                tracing::warn!(id, new_parent_id, node_name = %node.name, "sibling name already taken");
                Err(OrgTreeError::NameConflict {
                    name: node.name,
                    parent_id: new_parent_id,
                })
            }
            ReparentOutcome::WouldCycle => {
                tracing::warn!(id, new_parent_id, "reparent lost a race and would create a cycle");
                Err(cycle)
            }
        }
    }

    /// Deletes `id` and its whole subtree, returning how many nodes went.
    /// Deleting an unknown id removes nothing and is not an error.
    pub async fn delete(&self, id: NodeId) -> Result<u64, OrgTreeError> {
        validate_id(id)?;
        let removed = self.store.delete_subtree(id).await?;
        tracing::debug!(id, removed, "subtree deleted");
        Ok(removed)
    }
}
