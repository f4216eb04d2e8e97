//! Placeholders for objects that are not loaded yet.

use std::hash::{Hash, Hasher};

use once_cell::sync::OnceCell;
use sea_query::Value;

use super::Node;
use crate::error::LifeError;
use crate::oid::ObjectId;
use crate::transaction::Transaction;

/// Operations shared by nodes and their placeholders.
///
/// Everything except [`PersistentObject::oid`] resolves the object through the
/// transaction first, loading it when it is not attached yet.
pub trait PersistentObject {
    fn oid(&self) -> &ObjectId;

    fn type_name(&self) -> &str {
        self.oid().type_name()
    }

    fn resolve<'t>(&self, tx: &'t mut Transaction) -> Result<&'t Node, LifeError>;

    fn value(&self, tx: &mut Transaction, name: &str) -> Result<Option<Value>, LifeError> {
        Ok(self.resolve(tx)?.value(name).cloned())
    }

    fn property(&self, tx: &mut Transaction, name: &str) -> Result<Option<Value>, LifeError> {
        Ok(self.resolve(tx)?.property(name).cloned())
    }

    fn display_value(&self, tx: &mut Transaction) -> Result<String, LifeError> {
        Ok(self.resolve(tx)?.display_value())
    }
}

/// Stands in for an object that is known by id only.
#[derive(Debug, Clone)]
pub struct ObjectProxy {
    oid: ObjectId,
    resolved: OnceCell<()>,
}

impl ObjectProxy {
    pub fn new(oid: ObjectId) -> Self {
        Self {
            oid,
            resolved: OnceCell::new(),
        }
    }

    pub fn oid(&self) -> &ObjectId {
        &self.oid
    }

    /// Whether the proxy was resolved once. This never reverts.
    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }
}

impl PartialEq for ObjectProxy {
    fn eq(&self, other: &Self) -> bool {
        self.oid == other.oid
    }
}

impl Eq for ObjectProxy {}

impl Hash for ObjectProxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.oid.hash(state);
    }
}

impl PersistentObject for ObjectProxy {
    fn oid(&self) -> &ObjectId {
        &self.oid
    }

    fn resolve<'t>(&self, tx: &'t mut Transaction) -> Result<&'t Node, LifeError> {
        let node = tx.resolve(&self.oid)?;
        if self.resolved.set(()).is_ok() {
            log::trace!("Resolved proxy {}", self.oid);
        }
        Ok(node)
    }
}

impl PersistentObject for Node {
    fn oid(&self) -> &ObjectId {
        Node::oid(self)
    }

    fn resolve<'t>(&self, tx: &'t mut Transaction) -> Result<&'t Node, LifeError> {
        tx.resolve(Node::oid(self))
    }
}

impl PersistentObject for super::RelatedObject {
    fn oid(&self) -> &ObjectId {
        super::RelatedObject::oid(self)
    }

    fn resolve<'t>(&self, tx: &'t mut Transaction) -> Result<&'t Node, LifeError> {
        match self {
            super::RelatedObject::Node(oid) => tx.resolve(oid),
            super::RelatedObject::Proxy(proxy) => proxy.resolve(tx),
        }
    }
}
