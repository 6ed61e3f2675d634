//! In-process [`NodeStore`] over an adjacency table.
//!
//! Traversals that the PostgreSQL store pushes into recursive queries run
//! here as plain walks over the table. All access goes through one
//! `RwLock`, which gives every operation the isolation of a serialized
//! transaction.

use std::collections::{BTreeMap, HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::OrgTreeError;
use crate::node::{NodeId, NodeRow};
use crate::traits::{InsertOutcome, NodeStore, ReparentOutcome};

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<NodeId, NodeRow>,
    /// Child ids per parent id, kept in step with `rows`.
    children: BTreeMap<NodeId, Vec<NodeId>>,
    last_id: NodeId,
}

impl Table {
    fn insert_row(&mut self, row: NodeRow) {
        if let Some(previous) = self.rows.remove(&row.id) {
            self.unlink(previous.id, previous.parent_id);
        }
        if let Some(parent_id) = row.parent_id {
            self.children.entry(parent_id).or_default().push(row.id);
        }
        self.last_id = self.last_id.max(row.id);
        self.rows.insert(row.id, row);
    }

    fn unlink(&mut self, id: NodeId, parent_id: Option<NodeId>) {
        let Some(parent_id) = parent_id else {
            return;
        };
        if let Some(siblings) = self.children.get_mut(&parent_id) {
            siblings.retain(|sibling| *sibling != id);
            if siblings.is_empty() {
                self.children.remove(&parent_id);
            }
        }
    }

    fn children_of(&self, id: NodeId) -> impl Iterator<Item = &NodeRow> + '_ {
        self.children
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|child| self.rows.get(child))
    }

    /// `id` followed by everything below it; empty if `id` is unknown.
    fn closure(&self, id: NodeId) -> Vec<NodeId> {
        if !self.rows.contains_key(&id) {
            return Vec::new();
        }

        let mut seen = HashSet::from([id]);
        let mut order = vec![id];
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for child in self.children_of(current) {
                if seen.insert(child.id) {
                    order.push(child.id);
                    queue.push_back(child.id);
                }
            }
        }
        order
    }

    fn name_taken(&self, parent_id: Option<NodeId>, name: &str, except: Option<NodeId>) -> bool {
        let clash = |row: &NodeRow| row.name == name && Some(row.id) != except;
        match parent_id {
            Some(parent_id) => self.children_of(parent_id).any(clash),
            None => self
                .rows
                .values()
                .filter(|row| row.parent_id.is_none())
                .any(clash),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryNodeStore {
    table: RwLock<Table>,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with existing rows. Later inserts get ids above the
    /// largest seeded one. Rows are taken as given, dangling parents included.
    pub fn from_rows(rows: impl IntoIterator<Item = NodeRow>) -> Self {
        let mut table = Table::default();
        for row in rows {
            table.insert_row(row);
        }
        Self {
            table: RwLock::new(table),
        }
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.table.read().await.rows.is_empty()
    }

    pub async fn rows(&self) -> Vec<NodeRow> {
        self.table.read().await.rows.values().cloned().collect()
    }
}

#[async_trait]
impl NodeStore for MemoryNodeStore {
    async fn fetch_lineage(&self, id: NodeId) -> Result<Vec<NodeRow>, OrgTreeError> {
        let table = self.table.read().await;
        let Some(target) = table.rows.get(&id) else {
            return Ok(Vec::new());
        };

        let mut rows = vec![target.clone()];
        rows.extend(table.children_of(id).cloned());

        let mut visited = HashSet::from([id]);
        let mut next = target.parent_id;
        while let Some(parent_id) = next {
            if !visited.insert(parent_id) {
                break;
            }
            match table.rows.get(&parent_id) {
                Some(parent) => {
                    next = parent.parent_id;
                    rows.push(parent.clone());
                }
                None => break,
            }
        }
        Ok(rows)
    }

    async fn fetch_roots_and_children(&self) -> Result<Vec<NodeRow>, OrgTreeError> {
        let table = self.table.read().await;
        let mut rows = Vec::new();
        for root in table.rows.values().filter(|row| row.parent_id.is_none()) {
            rows.push(root.clone());
            rows.extend(table.children_of(root.id).cloned());
        }
        Ok(rows)
    }

    async fn closure_contains(
        &self,
        ancestor: NodeId,
        candidate: NodeId,
    ) -> Result<bool, OrgTreeError> {
        let table = self.table.read().await;
        Ok(table.closure(ancestor).contains(&candidate))
    }

    async fn insert_node(
        &self,
        name: &str,
        parent_id: Option<NodeId>,
    ) -> Result<InsertOutcome, OrgTreeError> {
        let mut table = self.table.write().await;
        if let Some(parent_id) = parent_id {
            if !table.rows.contains_key(&parent_id) {
                return Err(OrgTreeError::not_found(parent_id));
            }
        }
        if table.name_taken(parent_id, name, None) {
            return Ok(InsertOutcome::NameTaken);
        }

        let id = table.last_id + 1;
        table.insert_row(NodeRow::new(id, parent_id, name));
        Ok(InsertOutcome::Created(id))
    }

    async fn update_parent(
        &self,
        id: NodeId,
        new_parent_id: NodeId,
    ) -> Result<ReparentOutcome, OrgTreeError> {
        let mut table = self.table.write().await;
        let row = match table.rows.get(&id) {
            Some(row) => row.clone(),
            None => return Err(OrgTreeError::not_found(id)),
        };
        if !table.rows.contains_key(&new_parent_id) {
            return Err(OrgTreeError::not_found(new_parent_id));
        }
        if table.closure(id).contains(&new_parent_id) {
            return Ok(ReparentOutcome::WouldCycle);
        }
        if table.name_taken(Some(new_parent_id), &row.name, Some(id)) {
            return Ok(ReparentOutcome::NameTaken);
        }

        table.insert_row(NodeRow {
            parent_id: Some(new_parent_id),
            ..row
        });
        Ok(ReparentOutcome::Moved)
    }

    async fn delete_subtree(&self, id: NodeId) -> Result<u64, OrgTreeError> {
        let mut table = self.table.write().await;
        let doomed = table.closure(id);
        for node_id in &doomed {
            if let Some(row) = table.rows.remove(node_id) {
                table.unlink(row.id, row.parent_id);
            }
            table.children.remove(node_id);
        }
        Ok(doomed.len() as u64)
    }
}
