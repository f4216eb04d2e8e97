//! Relation values held by nodes and the list merge that reconciles them.

use std::collections::HashMap;

use super::proxy::ObjectProxy;
use crate::oid::ObjectId;

/// A related object: either a node held by the transaction or a placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RelatedObject {
    Node(ObjectId),
    Proxy(ObjectProxy),
}

impl RelatedObject {
    pub fn proxy(oid: ObjectId) -> Self {
        RelatedObject::Proxy(ObjectProxy::new(oid))
    }

    pub fn oid(&self) -> &ObjectId {
        match self {
            RelatedObject::Node(oid) => oid,
            RelatedObject::Proxy(proxy) => proxy.oid(),
        }
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self, RelatedObject::Proxy(_))
    }
}

/// Value of a relation role on a node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RelationValue {
    #[default]
    Unset,
    Single(RelatedObject),
    Many(Vec<RelatedObject>),
}

impl RelationValue {
    pub fn is_unset(&self) -> bool {
        matches!(self, RelationValue::Unset)
    }

    /// The related objects as a list, empty for unset values.
    pub fn objects(&self) -> Vec<&RelatedObject> {
        match self {
            RelationValue::Unset => Vec::new(),
            RelationValue::Single(obj) => vec![obj],
            RelationValue::Many(list) => list.iter().collect(),
        }
    }

    pub fn oids(&self) -> Vec<ObjectId> {
        self.objects().into_iter().map(|o| o.oid().clone()).collect()
    }

    pub fn len(&self) -> usize {
        match self {
            RelationValue::Unset => 0,
            RelationValue::Single(_) => 1,
            RelationValue::Many(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.objects().iter().any(|o| o.oid() == oid)
    }

    pub fn find(&self, oid: &ObjectId) -> Option<&RelatedObject> {
        self.objects().into_iter().find(|o| o.oid() == oid)
    }
}

/// Load state of a relation role. States only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LoadState {
    #[default]
    Uninitialized,
    Initializing,
    /// Related objects are known, possibly as proxies
    Initialized,
    /// The complete related set was requested from the loader
    Loaded,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MergeResult {
    /// Deduplicated union in first seen order
    pub result: Vec<RelatedObject>,
    /// Objects that were not contained in the existing list
    pub added: Vec<RelatedObject>,
}

/// Merge `incoming` into `existing`.
///
/// Objects are identified by their canonical id. A proxy slot is replaced when the
/// incoming list contains the loaded node for the same id; a loaded node is never
/// replaced by a proxy.
pub fn merge_object_lists(existing: &[RelatedObject], incoming: &[RelatedObject]) -> MergeResult {
    let mut result: Vec<RelatedObject> = Vec::with_capacity(existing.len() + incoming.len());
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for obj in existing {
        if positions.contains_key(obj.oid().as_str()) {
            continue;
        }
        positions.insert(obj.oid().as_str(), result.len());
        result.push(obj.clone());
    }

    let mut added = Vec::new();
    for obj in incoming {
        match positions.get(obj.oid().as_str()) {
            None => {
                positions.insert(obj.oid().as_str(), result.len());
                result.push(obj.clone());
                added.push(obj.clone());
            }
            Some(&pos) => {
                if result[pos].is_proxy() && !obj.is_proxy() {
                    result[pos] = obj.clone();
                }
            }
        }
    }

    MergeResult { result, added }
}

/// Merge a single object into a single valued slot.
///
/// Returns the new slot content and whether the object replaced a different one.
pub(crate) fn merge_single(existing: &RelationValue, incoming: RelatedObject) -> (RelationValue, bool) {
    match existing {
        RelationValue::Single(current) if current.oid() == incoming.oid() => {
            if current.is_proxy() && !incoming.is_proxy() {
                (RelationValue::Single(incoming), false)
            } else {
                (existing.clone(), false)
            }
        }
        _ => (RelationValue::Single(incoming), true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i64) -> RelatedObject {
        RelatedObject::Node(ObjectId::from_int("Page", id))
    }

    fn proxy(id: i64) -> RelatedObject {
        RelatedObject::proxy(ObjectId::from_int("Page", id))
    }

    #[test]
    fn test_merge_with_itself_adds_nothing() {
        let list = vec![node(1), proxy(2), node(3)];
        let merged = merge_object_lists(&list, &list);
        assert_eq!(merged.result, list);
        assert!(merged.added.is_empty());
    }

    #[test]
    fn test_proxy_is_upgraded() {
        let merged = merge_object_lists(&[proxy(1)], &[node(1)]);
        assert_eq!(merged.result, vec![node(1)]);
        assert!(merged.added.is_empty());
    }

    #[test]
    fn test_node_is_not_downgraded() {
        let merged = merge_object_lists(&[node(1)], &[proxy(1)]);
        assert_eq!(merged.result, vec![node(1)]);
    }

    #[test]
    fn test_union_keeps_first_seen_order() {
        let merged = merge_object_lists(&[node(2), node(1)], &[proxy(3), node(1), node(4)]);
        let ids: Vec<&str> = merged.result.iter().map(|o| o.oid().as_str()).collect();
        assert_eq!(ids, vec!["Page:2", "Page:1", "Page:3", "Page:4"]);
        assert_eq!(merged.added, vec![proxy(3), node(4)]);
    }

    #[test]
    fn test_merge_single_upgrades_same_id() {
        let (value, replaced) = merge_single(&RelationValue::Single(proxy(1)), node(1));
        assert_eq!(value, RelationValue::Single(node(1)));
        assert!(!replaced);

        let (value, replaced) = merge_single(&RelationValue::Single(node(1)), node(2));
        assert_eq!(value, RelationValue::Single(node(2)));
        assert!(replaced);

        let (value, replaced) = merge_single(&RelationValue::Unset, proxy(5));
        assert_eq!(value, RelationValue::Single(proxy(5)));
        assert!(replaced);
    }

    #[test]
    fn test_load_state_order() {
        assert!(LoadState::Uninitialized < LoadState::Initializing);
        assert!(LoadState::Initializing < LoadState::Initialized);
        assert!(LoadState::Initialized < LoadState::Loaded);
    }
}
