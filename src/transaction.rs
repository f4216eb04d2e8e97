//! Transaction - the identity map owning all nodes of a unit of work.
//!
//! Nodes reference each other by [`ObjectId`] only; the transaction holds the nodes
//! themselves. This keeps cyclic graphs (parent/child, many-to-many) free of shared
//! ownership and lets relation operations reach both ends of a relation.
//!
//! Reads are filtered by the [`Authorizer`]: an object the context may not read is
//! never attached and is recorded in [`Transaction::denied_reads`]. Create and delete
//! failures are returned as [`LifeError::AuthorizationFailed`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::authorization::{Action, AllowAll, Authorizer};
use crate::config::GraphConfig;
use crate::error::LifeError;
use crate::loader::{BuildDepth, ObjectLoader};
use crate::model::TypeRegistry;
use crate::node::{Node, PersistentState};
use crate::oid::ObjectId;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

pub struct Transaction {
    pub(crate) registry: Arc<dyn TypeRegistry>,
    pub(crate) loader: Option<Arc<dyn ObjectLoader>>,
    authorizer: Arc<dyn Authorizer>,
    context: String,
    pub(crate) config: GraphConfig,
    pub(crate) nodes: HashMap<ObjectId, Node>,
    attach_order: Vec<ObjectId>,
    deleted: Vec<ObjectId>,
    denied_reads: Vec<ObjectId>,
}

impl Transaction {
    /// A transaction without a loader that permits everything.
    ///
    /// Without a loader relations of attached nodes are never loaded, which is what
    /// query templates need.
    pub fn new(registry: Arc<dyn TypeRegistry>) -> Self {
        Self {
            registry,
            loader: None,
            authorizer: Arc::new(AllowAll),
            context: String::new(),
            config: GraphConfig::default(),
            nodes: HashMap::new(),
            attach_order: Vec::new(),
            deleted: Vec::new(),
            denied_reads: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_loader(mut self, loader: Arc<dyn ObjectLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Check permissions with `authorizer` on behalf of `context`.
    #[must_use]
    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>, context: &str) -> Self {
        self.authorizer = authorizer;
        self.context = context.to_string();
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: GraphConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &dyn TypeRegistry {
        self.registry.as_ref()
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn is_authorized(&self, oid: &ObjectId, action: Action) -> bool {
        self.authorizer.authorize(oid, &self.context, action)
    }

    fn require(&self, oid: &ObjectId, action: Action) -> Result<(), LifeError> {
        if self.is_authorized(oid, action) {
            Ok(())
        } else {
            Err(LifeError::AuthorizationFailed {
                oid: oid.to_string(),
                action: action.to_string(),
            })
        }
    }

    /// Create a new node of `type_name` with a dummy id and attach it.
    pub fn create(&mut self, type_name: &str) -> Result<ObjectId, LifeError> {
        let node = Node::blank(self.registry.get(type_name)?);
        self.require(node.oid(), Action::Create)?;
        Ok(self.attach(node))
    }

    /// Attach a node. If a node with the same id is attached already, that instance is
    /// kept and only takes over values it does not have.
    pub fn attach(&mut self, node: Node) -> ObjectId {
        let oid = node.oid().clone();
        match self.nodes.get_mut(&oid) {
            Some(existing) => existing.merge_values(&node),
            None => {
                self.attach_order.push(oid.clone());
                self.nodes.insert(oid.clone(), node);
            }
        }
        oid
    }

    /// Attach a node read from the store, unless the context may not read it.
    pub(crate) fn attach_loaded(&mut self, node: Node) -> Option<ObjectId> {
        if self.is_authorized(node.oid(), Action::Read) {
            Some(self.attach(node))
        } else {
            self.deny_read(node.oid());
            None
        }
    }

    pub(crate) fn deny_read(&mut self, oid: &ObjectId) {
        log::debug!("Read access to {oid} denied for '{}'", self.context);
        self.detach(oid);
        if !self.denied_reads.contains(oid) {
            self.denied_reads.push(oid.clone());
        }
    }

    pub fn detach(&mut self, oid: &ObjectId) -> Option<Node> {
        self.attach_order.retain(|o| o != oid);
        self.nodes.remove(oid)
    }

    pub fn get(&self, oid: &ObjectId) -> Option<&Node> {
        self.nodes.get(oid)
    }

    pub fn get_mut(&mut self, oid: &ObjectId) -> Option<&mut Node> {
        self.nodes.get_mut(oid)
    }

    pub(crate) fn node_mut(&mut self, oid: &ObjectId) -> Result<&mut Node, LifeError> {
        self.nodes
            .get_mut(oid)
            .ok_or_else(|| LifeError::NotFound(oid.to_string()))
    }

    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.nodes.contains_key(oid)
    }

    /// Attached node ids in attach order.
    pub fn object_ids(&self) -> &[ObjectId] {
        &self.attach_order
    }

    /// Load an object and hydrate its relations to `depth`.
    ///
    /// Returns `None` if the object does not exist or the context may not read it.
    pub fn load(&mut self, oid: &ObjectId, depth: BuildDepth) -> Result<Option<ObjectId>, LifeError> {
        if !self.contains(oid) {
            let Some(loader) = self.loader.clone() else {
                return Ok(None);
            };
            #[cfg(feature = "tracing")]
            let _span = tracing_helpers::resolve_span(oid.as_str()).entered();

            match loader.load(oid)? {
                Some(node) => {
                    if self.attach_loaded(node).is_none() {
                        return Ok(None);
                    }
                }
                None => return Ok(None),
            }
        }
        self.hydrate(&[oid.clone()], depth)?;
        Ok(Some(oid.clone()))
    }

    /// The attached node for `oid`, loading it if necessary.
    ///
    /// # Errors
    ///
    /// Returns `LifeError::NotFound` if the object does not exist or may not be read.
    pub fn resolve(&mut self, oid: &ObjectId) -> Result<&Node, LifeError> {
        if !self.contains(oid) {
            if self.load(oid, BuildDepth::Single)?.is_none() {
                return Err(LifeError::NotFound(oid.to_string()));
            }
            log::trace!("Resolved {oid}");
            #[cfg(feature = "metrics")]
            METRICS.record_proxy_resolution();
        }
        self.nodes
            .get(oid)
            .ok_or_else(|| LifeError::NotFound(oid.to_string()))
    }

    /// Hydrate the relations of `roots` generation by generation.
    pub fn hydrate(&mut self, roots: &[ObjectId], depth: BuildDepth) -> Result<(), LifeError> {
        match depth {
            BuildDepth::Identifiers | BuildDepth::Single => Ok(()),
            BuildDepth::ProxiesOnly => {
                for oid in roots {
                    for role in self.navigable_roles(oid)? {
                        self.initialize_relation(oid, &role)?;
                    }
                }
                Ok(())
            }
            BuildDepth::Depth(_) | BuildDepth::Infinite => {
                let generations = depth.generations(self.config.max_build_depth);
                let mut visited: HashSet<ObjectId> = roots.iter().cloned().collect();
                let mut frontier = roots.to_vec();
                for generation in 0..generations {
                    if frontier.is_empty() {
                        break;
                    }
                    log::trace!("Hydrating generation {generation} with {} nodes", frontier.len());
                    let mut next = Vec::new();
                    for oid in &frontier {
                        if !self.contains(oid) {
                            continue;
                        }
                        for role in self.navigable_roles(oid)? {
                            for related in self.load_relation_nodes(oid, &role)? {
                                if visited.insert(related.clone()) {
                                    next.push(related);
                                }
                            }
                        }
                    }
                    frontier = next;
                }
                Ok(())
            }
        }
    }

    pub(crate) fn navigable_roles(&self, oid: &ObjectId) -> Result<Vec<String>, LifeError> {
        Ok(self
            .registry
            .get(oid.type_name())?
            .relations
            .iter()
            .filter(|r| r.other_navigability)
            .map(|r| r.other_role.clone())
            .collect())
    }

    /// Mark an attached node for deletion.
    pub fn mark_deleted(&mut self, oid: &ObjectId) -> Result<(), LifeError> {
        self.require(oid, Action::Delete)?;
        let node = self.node_mut(oid)?;
        node.set_state(PersistentState::Deleted);
        if !self.deleted.contains(oid) {
            self.deleted.push(oid.clone());
        }
        Ok(())
    }

    /// Nodes created in this transaction that are not deleted.
    pub fn new_objects(&self) -> Vec<ObjectId> {
        self.objects_in_state(PersistentState::New)
    }

    pub fn dirty_objects(&self) -> Vec<ObjectId> {
        self.objects_in_state(PersistentState::Dirty)
    }

    pub fn deleted_objects(&self) -> &[ObjectId] {
        &self.deleted
    }

    /// Objects that were filtered out because the context may not read them.
    pub fn denied_reads(&self) -> &[ObjectId] {
        &self.denied_reads
    }

    fn objects_in_state(&self, state: PersistentState) -> Vec<ObjectId> {
        self.attach_order
            .iter()
            .filter(|oid| self.nodes.get(*oid).map(|n| n.state()) == Some(state))
            .cloned()
            .collect()
    }
}
