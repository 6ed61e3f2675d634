use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::FromQueryResult;
use serde::{Deserialize, Serialize};

use crate::error::OrgTreeError;

/// Store-assigned node identity. Real ids are positive; `0` stands for
/// "no node" at the API edges (no parent, or "list the roots").
pub type NodeId = i32;

pub const VALID_NAME_PATTERN: &str = r"^[a-zA-Z\d_-]+$";

static VALID_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(VALID_NAME_PATTERN).expect("name pattern is a valid regex"));

/// A node of the organization tree as handed to callers.
///
/// `root_id`, `height` and `children` are never persisted; they are derived
/// every time a tree is assembled from rows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    pub name: String,
    pub root_id: NodeId,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl Node {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// A raw `{id, parent_id, name}` record as stored.
#[derive(Clone, Debug, PartialEq, Eq, FromQueryResult)]
pub struct NodeRow {
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub name: String,
}

impl NodeRow {
    pub fn new(id: NodeId, parent_id: Option<NodeId>, name: impl Into<String>) -> Self {
        Self {
            id,
            parent_id,
            name: name.into(),
        }
    }

    /// Maps the record to a childless, unannotated [`Node`]. `root_id` and
    /// `height` stay `0` until the annotator stamps them.
    pub fn into_node(self) -> Node {
        Node {
            id: self.id,
            parent_id: self.parent_id,
            name: self.name,
            root_id: 0,
            height: 0,
            children: Vec::new(),
        }
    }
}

impl From<NodeRow> for Node {
    fn from(row: NodeRow) -> Self {
        row.into_node()
    }
}

pub fn validate_name(name: &str) -> Result<(), OrgTreeError> {
    if VALID_NAME.is_match(name) {
        Ok(())
    } else {
        Err(OrgTreeError::validation(format!(
            "name must match the regex /{VALID_NAME_PATTERN}/"
        )))
    }
}

pub fn validate_id(id: NodeId) -> Result<(), OrgTreeError> {
    if id >= 0 {
        Ok(())
    } else {
        Err(OrgTreeError::validation(
            "ids must be greater than or equal 0",
        ))
    }
}
