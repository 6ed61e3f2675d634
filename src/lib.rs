//! Organization tree: a forest of uniquely named nodes kept in a relational
//! store.
//!
//! Only `{id, parent_id, name}` is persisted. Root ids, heights and child
//! lists are rebuilt on every read by assembling the rows a query returns
//! (see [`tree::Forest`]). Structural rules are enforced at the store:
//! sibling names are unique per parent, and a node can never be moved into
//! its own subtree.

pub mod config;
pub mod error;
pub mod http;
pub mod lock;
pub mod memory;
pub mod node;
pub mod postgres;
pub mod repository;
pub mod traits;
pub mod tree;

pub mod prelude {
    //! Convenient re-exports for consumers.
    pub use crate::config::{DatabaseSettings, OrgTreeConfig, OrgTreeOptions};
    pub use crate::error::OrgTreeError;
    pub use crate::node::{Node, NodeId};
    pub use crate::repository::{Lookup, OrgTreeRepository};
    pub use crate::traits::NodeStore;
}

pub use config::{
    AdvisoryLockKey, AdvisoryLockStrategy, DatabaseSettings, OrgTreeConfig, OrgTreeOptions,
};
pub use error::OrgTreeError;
pub use memory::MemoryNodeStore;
pub use node::{Node, NodeId, NodeRow};
pub use postgres::PgNodeStore;
pub use repository::{Lookup, OrgTreeRepository};
pub use traits::{InsertOutcome, NodeStore, ReparentOutcome};
pub use tree::Forest;
