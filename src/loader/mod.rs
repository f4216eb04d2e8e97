//! Loading of objects and relations from a store.
//!
//! The graph only needs two things from persistence: load one object by id, and load
//! the related objects of a role for a set of owners. [`ObjectLoader`] is that seam;
//! [`InMemoryStore`] implements it over records held in memory.

mod memory;

pub use memory::InMemoryStore;

use std::collections::HashMap;

use crate::error::LifeError;
use crate::node::Node;
use crate::oid::ObjectId;
use crate::query::{Criterion, PagingInfo};

/// How many relation generations are hydrated when objects are loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BuildDepth {
    /// Only identifiers, no nodes
    Identifiers,
    /// Nodes whose relations hold proxies
    ProxiesOnly,
    /// Nodes without relations, loaded lazily on access
    #[default]
    Single,
    /// Nodes with the given number of relation generations loaded
    Depth(u32),
    /// All generations, bounded by `GraphConfig::max_build_depth`
    Infinite,
}

impl BuildDepth {
    /// Number of generations to hydrate with nodes.
    pub fn generations(&self, max_build_depth: u32) -> u32 {
        match self {
            BuildDepth::Identifiers | BuildDepth::ProxiesOnly | BuildDepth::Single => 0,
            BuildDepth::Depth(n) => *n,
            BuildDepth::Infinite => max_build_depth,
        }
    }

    /// Whether the loader should return proxies instead of nodes.
    pub fn wants_proxies(&self) -> bool {
        matches!(self, BuildDepth::Identifiers | BuildDepth::ProxiesOnly)
    }
}

/// Restrictions applied when loading related objects.
#[derive(Debug, Clone, Default)]
pub struct RelationQuery {
    pub criteria: Vec<Criterion>,
    pub order_by: Vec<String>,
    pub paging: Option<PagingInfo>,
}

/// An object returned from a relation load.
#[derive(Debug, Clone)]
pub enum LoadedObject {
    Proxy(ObjectId),
    Node(Node),
}

impl LoadedObject {
    pub fn oid(&self) -> &ObjectId {
        match self {
            LoadedObject::Proxy(oid) => oid,
            LoadedObject::Node(node) => node.oid(),
        }
    }
}

/// Store access needed by the transaction.
pub trait ObjectLoader: Send + Sync {
    /// Load a single object without its relations. `None` if it does not exist.
    fn load(&self, oid: &ObjectId) -> Result<Option<Node>, LifeError>;

    /// Load the objects related to each of `owners` under `role`.
    ///
    /// # Arguments
    ///
    /// * `owners` - Objects whose relation is loaded, all of the same type
    /// * `role` - Role name as seen from the owners
    /// * `depth` - [`BuildDepth::ProxiesOnly`] and [`BuildDepth::Identifiers`] return proxies,
    ///   anything else returns nodes without relations
    /// * `query` - Criteria, ordering and paging applied to the related objects
    ///
    /// # Returns
    ///
    /// A map from owner id to its related objects. Owners without related objects may be
    /// missing from the map.
    fn load_relation(
        &self,
        owners: &[ObjectId],
        role: &str,
        depth: BuildDepth,
        query: &RelationQuery,
    ) -> Result<HashMap<ObjectId, Vec<LoadedObject>>, LifeError>;
}
