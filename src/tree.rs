//! Assembly of flat node rows into annotated trees.
//!
//! Rows are loaded into an arena keyed by id; every slot keeps the ids of its
//! children rather than the children themselves. Owned [`Node`] trees are
//! only materialized when a caller asks for one.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::OrgTreeError;
use crate::node::{Node, NodeId, NodeRow};

#[derive(Debug)]
struct Slot {
    node: Node,
    children: Vec<NodeId>,
    annotated: bool,
}

/// One or more complete subtrees reconstructed from a row set.
#[derive(Debug, Default)]
pub struct Forest {
    slots: HashMap<NodeId, Slot>,
    roots: Vec<NodeId>,
}

impl Forest {
    /// Assembles and annotates `rows` in one go.
    pub fn build<I>(rows: I) -> Result<Self, OrgTreeError>
    where
        I: IntoIterator<Item = NodeRow>,
    {
        let mut forest = Self::assemble(rows)?;
        forest.annotate();
        Ok(forest)
    }

    /// Links every row to its parent and orders siblings by name.
    ///
    /// Every non-root row's parent must be part of `rows`; otherwise the
    /// query that produced them was scoped wrong or the stored data is
    /// corrupt, and the result is [`OrgTreeError::InvalidTree`].
    pub fn assemble<I>(rows: I) -> Result<Self, OrgTreeError>
    where
        I: IntoIterator<Item = NodeRow>,
    {
        let mut slots: HashMap<NodeId, Slot> = HashMap::new();
        for row in rows {
            let id = row.id;
            let slot = Slot {
                node: row.into_node(),
                children: Vec::new(),
                annotated: false,
            };
            if slots.insert(id, slot).is_some() {
                return Err(invalid_tree(format!("node {id} appears more than once")));
            }
        }

        let mut roots = Vec::new();
        let mut links = Vec::new();
        for (id, slot) in &slots {
            match slot.node.parent_id {
                None => roots.push(*id),
                Some(parent_id) if slots.contains_key(&parent_id) => links.push((parent_id, *id)),
                Some(parent_id) => {
                    return Err(invalid_tree(format!(
                        "parent {parent_id} of node {id} is missing from the row set"
                    )));
                }
            }
        }

        for (parent_id, child_id) in links {
            if let Some(parent) = slots.get_mut(&parent_id) {
                parent.children.push(child_id);
            }
        }

        let parent_ids: Vec<NodeId> = slots.keys().copied().collect();
        for parent_id in parent_ids {
            let mut children = match slots.get_mut(&parent_id) {
                Some(slot) if slot.children.len() > 1 => std::mem::take(&mut slot.children),
                _ => continue,
            };
            children.sort_by(|a, b| sibling_order(&slots, *a, *b));
            if let Some(slot) = slots.get_mut(&parent_id) {
                slot.children = children;
            }
        }
        roots.sort_by(|a, b| sibling_order(&slots, *a, *b));

        Ok(Self { slots, roots })
    }

    /// Stamps `root_id` and `height` on everything reachable from each root.
    pub fn annotate(&mut self) {
        for root_id in self.roots.clone() {
            self.annotate_from(root_id);
        }
    }

    fn annotate_from(&mut self, root_id: NodeId) {
        let mut pending = vec![(root_id, 0u32)];
        while let Some((id, height)) = pending.pop() {
            let Some(slot) = self.slots.get_mut(&id) else {
                continue;
            };
            if slot.annotated {
                continue;
            }
            slot.node.root_id = root_id;
            slot.node.height = height;
            slot.annotated = true;
            pending.extend(slot.children.iter().map(|child| (*child, height + 1)));
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Root ids in name order.
    pub fn root_ids(&self) -> &[NodeId] {
        &self.roots
    }

    /// Child ids of `id` in name order.
    pub fn child_ids(&self, id: NodeId) -> &[NodeId] {
        self.slots
            .get(&id)
            .map(|slot| slot.children.as_slice())
            .unwrap_or_default()
    }

    /// Materializes the subtree rooted at `id`, or `None` if `id` was not in
    /// the row set.
    pub fn node(&self, id: NodeId) -> Result<Option<Node>, OrgTreeError> {
        if !self.contains(id) {
            return Ok(None);
        }
        self.materialize(id).map(Some)
    }

    /// Materializes every root, ordered by name.
    pub fn roots(&self) -> Result<Vec<Node>, OrgTreeError> {
        self.roots.iter().map(|id| self.materialize(*id)).collect()
    }

    fn materialize(&self, id: NodeId) -> Result<Node, OrgTreeError> {
        let slot = self
            .slots
            .get(&id)
            .ok_or_else(|| invalid_tree(format!("node {id} vanished from the arena")))?;
        if !slot.annotated {
            return Err(invalid_tree(format!(
                "node {id} is not reachable from any root"
            )));
        }

        let mut node = slot.node.clone();
        node.children = slot
            .children
            .iter()
            .map(|child| self.materialize(*child))
            .collect::<Result<_, _>>()?;
        Ok(node)
    }
}

fn sibling_order(slots: &HashMap<NodeId, Slot>, a: NodeId, b: NodeId) -> Ordering {
    match (slots.get(&a), slots.get(&b)) {
        (Some(left), Some(right)) => left
            .node
            .name
            .cmp(&right.node.name)
            .then_with(|| a.cmp(&b)),
        _ => a.cmp(&b),
    }
}

fn invalid_tree(detail: String) -> OrgTreeError {
    tracing::error!(%detail, "row set does not form a valid tree");
    OrgTreeError::InvalidTree(detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    //  1 root
    //    2 c1
    //      4 c3
    //      5 c4
    //        6 c5
    //          7 c6
    //    3 c2
    fn sample_rows() -> Vec<NodeRow> {
        vec![
            NodeRow::new(1, None, "root"),
            NodeRow::new(2, Some(1), "c1"),
            NodeRow::new(3, Some(1), "c2"),
            NodeRow::new(4, Some(2), "c3"),
            NodeRow::new(5, Some(2), "c4"),
            NodeRow::new(6, Some(5), "c5"),
            NodeRow::new(7, Some(6), "c6"),
        ]
    }

    #[test]
    fn stamps_height_and_root_on_every_node() {
        let forest = Forest::build(sample_rows()).unwrap();
        let root = forest.node(1).unwrap().unwrap();

        fn walk(node: &Node, expected_height: u32, out: &mut Vec<(NodeId, u32, NodeId)>) {
            assert_eq!(node.height, expected_height, "node {}", node.id);
            out.push((node.id, node.height, node.root_id));
            for child in &node.children {
                assert_eq!(child.parent_id, Some(node.id));
                walk(child, expected_height + 1, out);
            }
        }

        let mut seen = Vec::new();
        walk(&root, 0, &mut seen);
        assert_eq!(seen.len(), 7);
        assert!(seen.iter().all(|(_, _, root_id)| *root_id == 1));

        let deepest = forest.node(7).unwrap().unwrap();
        assert_eq!(deepest.height, 4);
        assert_eq!(deepest.root_id, 1);
    }

    #[test]
    fn sibling_order_ignores_row_order() {
        let rows = vec![
            NodeRow::new(10, None, "org"),
            NodeRow::new(13, Some(10), "zeta"),
            NodeRow::new(11, Some(10), "alpha"),
            NodeRow::new(12, Some(10), "mid"),
        ];
        let mut reversed = rows.clone();
        reversed.reverse();

        let names = |rows: Vec<NodeRow>| -> Vec<String> {
            let forest = Forest::build(rows).unwrap();
            let org = forest.node(10).unwrap().unwrap();
            org.children.into_iter().map(|child| child.name).collect()
        };

        assert_eq!(names(rows), vec!["alpha", "mid", "zeta"]);
        assert_eq!(names(reversed), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn disjoint_subtrees_are_annotated_independently() {
        let rows = vec![
            NodeRow::new(2, None, "myOtherRoot"),
            NodeRow::new(1, None, "myRoot"),
            NodeRow::new(3, Some(1), "a"),
            NodeRow::new(4, Some(2), "b"),
        ];
        let forest = Forest::build(rows).unwrap();
        assert_eq!(forest.root_ids(), &[2, 1]);

        let roots = forest.roots().unwrap();
        assert_eq!(roots[0].children[0].root_id, 2);
        assert_eq!(roots[1].children[0].root_id, 1);
        assert!(roots.iter().all(|root| root.height == 0 && root.root_id == root.id));
    }

    #[test]
    fn missing_parent_is_an_invalid_tree() {
        let rows = vec![NodeRow::new(1, None, "root"), NodeRow::new(3, Some(2), "orphan")];
        let err = Forest::assemble(rows).unwrap_err();
        assert!(matches!(err, OrgTreeError::InvalidTree(_)));
        assert!(!err.is_not_found());
    }

    #[test]
    fn duplicate_ids_are_an_invalid_tree() {
        let rows = vec![NodeRow::new(1, None, "root"), NodeRow::new(1, None, "again")];
        assert!(matches!(
            Forest::assemble(rows),
            Err(OrgTreeError::InvalidTree(_))
        ));
    }

    #[test]
    fn rows_looping_without_a_root_cannot_be_materialized() {
        let rows = vec![NodeRow::new(1, Some(2), "a"), NodeRow::new(2, Some(1), "b")];
        let forest = Forest::build(rows).unwrap();
        assert!(forest.root_ids().is_empty());
        assert!(matches!(forest.node(1), Err(OrgTreeError::InvalidTree(_))));
    }

    #[test]
    fn absent_ids_are_none() {
        let forest = Forest::build(sample_rows()).unwrap();
        assert_eq!(forest.node(42).unwrap(), None);
        assert_eq!(forest.child_ids(2), &[4, 5]);
        assert_eq!(forest.len(), 7);
    }

    #[test]
    fn empty_row_set_yields_no_roots() {
        let forest = Forest::build(Vec::<NodeRow>::new()).unwrap();
        assert!(forest.is_empty());
        assert!(forest.roots().unwrap().is_empty());
    }
}
