//! Node - the lazy, relation-aware entity.
//!
//! A [`Node`] holds plain attribute values, relation values keyed by role and a load
//! state per role. The methods on `Node` are the raw accessors: they never load
//! anything and never touch the other end of a relation. Relation-aware operations
//! (lazy loading, bidirectional adds and deletes, navigation) live on
//! [`Transaction`](crate::transaction::Transaction), which owns all nodes and can
//! therefore reach both ends of a relation.

mod filter;
mod iterator;
mod proxy;
mod relation_value;
mod relations;

pub use filter::NodeFilter;
pub use iterator::{NodeIterator, NodeValueIterator};
pub use proxy::{ObjectProxy, PersistentObject};
pub use relation_value::{merge_object_lists, LoadState, MergeResult, RelatedObject, RelationValue};
pub use relations::AddOptions;

pub(crate) use relation_value::merge_single;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use sea_query::Value;

use crate::error::LifeError;
use crate::executor::Row;
use crate::model::TypeDescription;
use crate::oid::{IdValue, ObjectId};
use crate::value::{is_null, value_to_string};

/// Persistence state of a node as seen by the commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersistentState {
    New,
    Clean,
    Dirty,
    Deleted,
}

/// Explicit ordering of the related objects of a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeOrder {
    pub ordered: Vec<ObjectId>,
    pub moved: Vec<ObjectId>,
    pub role: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Node {
    oid: ObjectId,
    values: Vec<(String, Value)>,
    properties: BTreeMap<String, Value>,
    relations: HashMap<String, RelationValue>,
    load_states: HashMap<String, LoadState>,
    added: HashMap<String, Vec<ObjectId>>,
    deleted: HashMap<String, Vec<ObjectId>>,
    changed: BTreeSet<String>,
    order: Option<NodeOrder>,
    state: PersistentState,
}

impl Node {
    /// A node for the given id. Nodes with dummy ids start out as new.
    pub fn new(oid: ObjectId) -> Self {
        let state = if oid.contains_dummy_ids() {
            PersistentState::New
        } else {
            PersistentState::Clean
        };
        Self {
            oid,
            values: Vec::new(),
            properties: BTreeMap::new(),
            relations: HashMap::new(),
            load_states: HashMap::new(),
            added: HashMap::new(),
            deleted: HashMap::new(),
            changed: BTreeSet::new(),
            order: None,
            state,
        }
    }

    /// A blank node of `type_desc` with a dummy id and all attributes set to `NULL`.
    pub fn blank(type_desc: &TypeDescription) -> Self {
        let oid = ObjectId::dummy(&type_desc.name, type_desc.pk_names.len());
        let mut node = Self::new(oid);
        for attr in &type_desc.attributes {
            if !attr.is_primary_key {
                node.values.push((attr.name.clone(), crate::value::null()));
            }
        }
        node
    }

    /// Hydrate a node from a result row.
    ///
    /// The row is keyed by column name. Primary key columns must be present and not
    /// `NULL`; other missing columns are left unset.
    pub fn from_row(type_desc: &TypeDescription, row: &Row) -> Result<Self, LifeError> {
        let mut ids = Vec::with_capacity(type_desc.pk_names.len());
        for pk in &type_desc.pk_names {
            let column = type_desc.column_for(pk).unwrap_or(pk);
            let value = row
                .get(column)
                .filter(|v| !is_null(v))
                .ok_or_else(|| LifeError::Query(format!("Missing primary key column '{column}' for {}", type_desc.name)))?;
            ids.push(match value {
                Value::TinyInt(Some(i)) => IdValue::Int(i64::from(*i)),
                Value::SmallInt(Some(i)) => IdValue::Int(i64::from(*i)),
                Value::Int(Some(i)) => IdValue::Int(i64::from(*i)),
                Value::BigInt(Some(i)) => IdValue::Int(*i),
                Value::Unsigned(Some(u)) => IdValue::Int(i64::from(*u)),
                other => IdValue::Str(value_to_string(other).unwrap_or_default()),
            });
        }

        let mut node = Self::new(ObjectId::new(&type_desc.name, ids));
        for attr in &type_desc.attributes {
            if let Some(value) = row.get(attr.column_name()) {
                node.values.push((attr.name.clone(), value.clone()));
            }
        }
        Ok(node)
    }

    pub fn oid(&self) -> &ObjectId {
        &self.oid
    }

    pub fn type_name(&self) -> &str {
        self.oid.type_name()
    }

    pub fn state(&self) -> PersistentState {
        self.state
    }

    pub fn set_state(&mut self, state: PersistentState) {
        self.state = state;
    }

    /// Mark the node modified. New and deleted nodes keep their state.
    pub fn mark_dirty(&mut self) {
        if self.state == PersistentState::Clean {
            self.state = PersistentState::Dirty;
        }
    }

    // Attribute values

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn has_value(&self, name: &str) -> bool {
        self.value(name).is_some()
    }

    /// Names of the attributes that have a value, in the order they were first set.
    pub fn value_names(&self) -> Vec<String> {
        self.values.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Set an attribute value without any checks. Returns whether the value changed.
    pub fn set_value(&mut self, name: &str, value: Value) -> bool {
        match self.values.iter_mut().find(|(n, _)| n == name) {
            Some((_, current)) if *current == value => false,
            Some((_, current)) => {
                *current = value;
                self.changed.insert(name.to_string());
                true
            }
            None => {
                self.values.push((name.to_string(), value));
                self.changed.insert(name.to_string());
                true
            }
        }
    }

    pub fn remove_value(&mut self, name: &str) -> Option<Value> {
        let pos = self.values.iter().position(|(n, _)| n == name)?;
        Some(self.values.remove(pos).1)
    }

    /// Attribute names changed since the node was loaded or last reset.
    pub fn changed_values(&self) -> impl Iterator<Item = &str> {
        self.changed.iter().map(String::as_str)
    }

    pub fn reset_changes(&mut self) {
        self.changed.clear();
        self.added.clear();
        self.deleted.clear();
    }

    /// Copy all attribute values except the primary key to `target`.
    pub fn copy_values(&self, target: &mut Node, pk_names: &[String]) {
        for (name, value) in &self.values {
            if !pk_names.contains(name) {
                target.set_value(name, value.clone());
            }
        }
    }

    /// Take over values from `other` for attributes this node does not have yet.
    pub fn merge_values(&mut self, other: &Node) {
        for (name, value) in &other.values {
            if !self.has_value(name) {
                self.values.push((name.clone(), value.clone()));
            }
        }
    }

    /// Set all attribute values to `NULL`.
    pub fn clear_values(&mut self) {
        for (name, value) in &mut self.values {
            if !is_null(value) {
                *value = crate::value::null();
                self.changed.insert(name.clone());
            }
        }
    }

    /// Human readable representation: the first string attribute or the id.
    pub fn display_value(&self) -> String {
        ["name", "title", "file"]
            .iter()
            .find_map(|n| self.value(n).and_then(value_to_string))
            .unwrap_or_else(|| self.oid.to_string())
    }

    // Properties

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn set_property(&mut self, name: &str, value: Value) {
        self.properties.insert(name.to_string(), value);
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    // Raw relation access

    /// The in-memory value of a relation role. Never loads.
    pub fn raw_relation(&self, role: &str) -> Option<&RelationValue> {
        self.relations.get(role)
    }

    pub(crate) fn set_raw_relation(&mut self, role: &str, value: RelationValue) {
        self.relations.insert(role.to_string(), value);
    }

    pub fn load_state(&self, role: &str) -> LoadState {
        self.load_states.get(role).copied().unwrap_or_default()
    }

    /// Move the load state of `role` forward. Earlier states are ignored.
    pub fn advance_load_state(&mut self, role: &str, state: LoadState) {
        let current = self.load_states.entry(role.to_string()).or_default();
        if state > *current {
            *current = state;
        }
    }

    pub(crate) fn record_added(&mut self, role: &str, oid: &ObjectId) {
        if let Some(deleted) = self.deleted.get_mut(role) {
            deleted.retain(|d| d != oid);
        }
        let added = self.added.entry(role.to_string()).or_default();
        if !added.contains(oid) {
            added.push(oid.clone());
        }
    }

    pub(crate) fn record_deleted(&mut self, role: &str, oid: &ObjectId) {
        if let Some(added) = self.added.get_mut(role) {
            if let Some(pos) = added.iter().position(|a| a == oid) {
                added.remove(pos);
                return;
            }
        }
        let deleted = self.deleted.entry(role.to_string()).or_default();
        if !deleted.contains(oid) {
            deleted.push(oid.clone());
        }
    }

    /// Objects added to `role` since the node was loaded.
    pub fn added_nodes(&self, role: &str) -> &[ObjectId] {
        self.added.get(role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Objects removed from `role` since the node was loaded.
    pub fn deleted_nodes(&self, role: &str) -> &[ObjectId] {
        self.deleted.get(role).map(Vec::as_slice).unwrap_or(&[])
    }

    // Ordering

    /// Set an explicit order for the related objects of `role` (or all children).
    pub fn set_node_order(&mut self, ordered: Vec<ObjectId>, moved: Vec<ObjectId>, role: Option<&str>) {
        self.order = Some(NodeOrder {
            ordered,
            moved,
            role: role.map(str::to_string),
        });
        self.mark_dirty();
    }

    pub fn node_order(&self) -> Option<&NodeOrder> {
        self.order.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::content_registry;
    use crate::model::TypeRegistry;

    #[test]
    fn test_blank_node() {
        let registry = content_registry();
        let node = Node::blank(registry.get("Page").unwrap());
        assert_eq!(node.state(), PersistentState::New);
        assert!(node.oid().contains_dummy_ids());
        assert!(node.value("name").map(is_null).unwrap_or(false));
        assert!(node.value("id").is_none());
    }

    #[test]
    fn test_set_value_tracks_changes() {
        let mut node = Node::new(ObjectId::from_int("Page", 1));
        assert!(node.set_value("name", Value::from("Home".to_string())));
        assert!(!node.set_value("name", Value::from("Home".to_string())));
        assert_eq!(node.changed_values().collect::<Vec<_>>(), vec!["name"]);
        node.reset_changes();
        assert_eq!(node.changed_values().count(), 0);
    }

    #[test]
    fn test_from_row() {
        let registry = content_registry();
        let mut row = Row::new();
        row.insert("id".to_string(), Value::from(5i64));
        row.insert("name".to_string(), Value::from("News".to_string()));
        let node = Node::from_row(registry.get("Page").unwrap(), &row).unwrap();
        assert_eq!(node.oid(), &ObjectId::from_int("Page", 5));
        assert_eq!(node.state(), PersistentState::Clean);
        assert_eq!(node.value("name"), Some(&Value::from("News".to_string())));

        row.remove("id");
        assert!(matches!(
            Node::from_row(registry.get("Page").unwrap(), &row),
            Err(LifeError::Query(_))
        ));
    }

    #[test]
    fn test_added_then_deleted_cancels() {
        let mut node = Node::new(ObjectId::from_int("Page", 1));
        let child = ObjectId::from_int("Page", 2);
        node.record_added("ChildPage", &child);
        node.record_deleted("ChildPage", &child);
        assert!(node.added_nodes("ChildPage").is_empty());
        assert!(node.deleted_nodes("ChildPage").is_empty());

        node.record_deleted("ChildPage", &child);
        assert_eq!(node.deleted_nodes("ChildPage"), &[child]);
    }

    #[test]
    fn test_load_state_never_regresses() {
        let mut node = Node::new(ObjectId::from_int("Page", 1));
        node.advance_load_state("ChildPage", LoadState::Loaded);
        node.advance_load_state("ChildPage", LoadState::Initializing);
        assert_eq!(node.load_state("ChildPage"), LoadState::Loaded);
        assert_eq!(node.load_state("Author"), LoadState::Uninitialized);
    }

    #[test]
    fn test_merge_and_clear_values() {
        let mut a = Node::new(ObjectId::from_int("Page", 1));
        a.set_value("name", Value::from("A".to_string()));
        let mut b = Node::new(ObjectId::from_int("Page", 2));
        b.set_value("name", Value::from("B".to_string()));
        b.set_value("sortkey", Value::from(3i64));
        a.merge_values(&b);
        assert_eq!(a.value("name"), Some(&Value::from("A".to_string())));
        assert_eq!(a.value("sortkey"), Some(&Value::from(3i64)));
        a.clear_values();
        assert!(a.value("name").map(is_null).unwrap_or(false));

        let mut c = Node::new(ObjectId::from_int("Page", 3));
        b.copy_values(&mut c, &["id".to_string()]);
        assert_eq!(c.value("sortkey"), Some(&Value::from(3i64)));
    }
}
