//! Object store held in memory.

use std::collections::HashMap;
use std::sync::Arc;

use sea_query::Value;

use super::{BuildDepth, LoadedObject, ObjectLoader, RelationQuery};
use crate::comparator::ObjectComparator;
use crate::error::LifeError;
use crate::model::TypeRegistry;
use crate::node::{Node, PersistentState};
use crate::oid::ObjectId;

#[derive(Debug, Clone)]
struct Link {
    owner: ObjectId,
    role: String,
    related: ObjectId,
}

/// Records and relation links kept in memory.
///
/// Links are stored for both ends, so a relation can be loaded from either side.
/// Populate the store first, then share it with transactions through an `Arc`.
pub struct InMemoryStore {
    registry: Arc<dyn TypeRegistry>,
    records: HashMap<ObjectId, Node>,
    insertion_order: Vec<ObjectId>,
    links: Vec<Link>,
}

impl InMemoryStore {
    pub fn new(registry: Arc<dyn TypeRegistry>) -> Self {
        Self {
            registry,
            records: HashMap::new(),
            insertion_order: Vec::new(),
            links: Vec::new(),
        }
    }

    /// Store a node. Relation values of the node are ignored, use [`InMemoryStore::link`].
    pub fn insert(&mut self, node: Node) -> Result<(), LifeError> {
        self.registry.get(node.type_name())?;
        let mut record = Node::new(node.oid().clone());
        for name in node.value_names() {
            if let Some(value) = node.value(&name) {
                record.set_value(&name, value.clone());
            }
        }
        record.reset_changes();
        record.set_state(PersistentState::Clean);

        let oid = record.oid().clone();
        if self.records.insert(oid.clone(), record).is_none() {
            self.insertion_order.push(oid);
        }
        Ok(())
    }

    /// Store an object with a single integer key and the given attribute values.
    pub fn insert_values(&mut self, type_name: &str, id: i64, values: &[(&str, Value)]) -> Result<ObjectId, LifeError> {
        let oid = ObjectId::from_int(type_name, id);
        let mut node = Node::new(oid.clone());
        for (name, value) in values {
            node.set_value(name, value.clone());
        }
        self.insert(node)?;
        Ok(oid)
    }

    /// Link `related` to `owner` under `role` and the mirror role.
    pub fn link(&mut self, owner: &ObjectId, role: &str, related: &ObjectId) -> Result<(), LifeError> {
        let relation = self.registry.relation(owner.type_name(), role)?;
        if relation.other_type != related.type_name() {
            return Err(LifeError::InvalidArgument(format!(
                "Role '{role}' of '{}' expects '{}', got '{}'",
                owner.type_name(),
                relation.other_type,
                related.type_name()
            )));
        }
        let mirror_role = relation.this_role.clone();
        self.push_link(owner, role, related);
        self.push_link(related, &mirror_role, owner);
        Ok(())
    }

    fn push_link(&mut self, owner: &ObjectId, role: &str, related: &ObjectId) {
        let exists = self
            .links
            .iter()
            .any(|l| &l.owner == owner && l.role == role && &l.related == related);
        if !exists {
            self.links.push(Link {
                owner: owner.clone(),
                role: role.to_string(),
                related: related.clone(),
            });
        }
    }

    /// Remove an object and all links pointing to or from it.
    pub fn remove(&mut self, oid: &ObjectId) -> Option<Node> {
        self.links.retain(|l| &l.owner != oid && &l.related != oid);
        self.insertion_order.retain(|o| o != oid);
        self.records.remove(oid)
    }

    pub fn get(&self, oid: &ObjectId) -> Option<&Node> {
        self.records.get(oid)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ids of all objects of a type, in insertion order.
    pub fn objects_of_type(&self, type_name: &str) -> Vec<ObjectId> {
        self.insertion_order
            .iter()
            .filter(|oid| oid.type_name() == type_name)
            .cloned()
            .collect()
    }

    fn related(&self, owner: &ObjectId, role: &str) -> Vec<&Node> {
        self.links
            .iter()
            .filter(|l| &l.owner == owner && l.role == role)
            .filter_map(|l| self.records.get(&l.related))
            .collect()
    }
}

impl ObjectLoader for InMemoryStore {
    fn load(&self, oid: &ObjectId) -> Result<Option<Node>, LifeError> {
        log::trace!("Loading {oid} from memory");
        Ok(self.records.get(oid).cloned())
    }

    fn load_relation(
        &self,
        owners: &[ObjectId],
        role: &str,
        depth: BuildDepth,
        query: &RelationQuery,
    ) -> Result<HashMap<ObjectId, Vec<LoadedObject>>, LifeError> {
        let mut result = HashMap::new();
        let Some(first) = owners.first() else {
            return Ok(result);
        };
        let relation = self.registry.relation(first.type_name(), role)?;
        let other_type = self.registry.get(&relation.other_type)?;

        let order_by: &[String] = if query.order_by.is_empty() {
            &other_type.default_order
        } else {
            &query.order_by
        };
        let comparator = if order_by.is_empty() {
            None
        } else {
            Some(ObjectComparator::from_order_by(order_by)?)
        };

        for owner in owners {
            let mut related: Vec<&Node> = self
                .related(owner, role)
                .into_iter()
                .filter(|node| query.criteria.iter().all(|c| c.matches(node)))
                .collect();
            if let Some(comparator) = &comparator {
                comparator.sort(&mut related);
            }
            if let Some(paging) = &query.paging {
                related = related
                    .into_iter()
                    .skip(paging.offset() as usize)
                    .take(paging.page_size as usize)
                    .collect();
            }

            let loaded = related
                .into_iter()
                .map(|node| {
                    if depth.wants_proxies() {
                        LoadedObject::Proxy(node.oid().clone())
                    } else {
                        LoadedObject::Node(node.clone())
                    }
                })
                .collect::<Vec<_>>();
            log::trace!("Loaded {} objects for {owner}.{role}", loaded.len());
            result.insert(owner.clone(), loaded);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Criterion, Operator, PagingInfo};
    use crate::test_helpers::content_store;

    fn names(loaded: &[LoadedObject]) -> Vec<String> {
        loaded
            .iter()
            .map(|l| match l {
                LoadedObject::Node(node) => node.display_value(),
                LoadedObject::Proxy(oid) => oid.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_load_relation_proxies() {
        let store = content_store();
        let home = ObjectId::from_int("Page", 1);
        let result = store
            .load_relation(&[home.clone()], "ChildPage", BuildDepth::ProxiesOnly, &RelationQuery::default())
            .unwrap();
        let children = &result[&home];
        assert!(children.iter().all(|c| matches!(c, LoadedObject::Proxy(_))));
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn test_mirror_links() {
        let store = content_store();
        let about = ObjectId::from_int("Page", 2);
        let result = store
            .load_relation(&[about.clone()], "ParentPage", BuildDepth::Single, &RelationQuery::default())
            .unwrap();
        assert_eq!(names(&result[&about]), vec!["Home"]);
    }

    #[test]
    fn test_criteria_order_and_paging() {
        let store = content_store();
        let home = ObjectId::from_int("Page", 1);
        let query = RelationQuery {
            criteria: vec![Criterion::new("Page", "name", Operator::Like, Value::from("%o%".to_string()))],
            order_by: vec!["name DESC".to_string()],
            paging: Some(PagingInfo::new(1)),
        };
        let result = store
            .load_relation(&[home.clone()], "ChildPage", BuildDepth::Single, &query)
            .unwrap();
        assert_eq!(names(&result[&home]), vec!["Contact"]);
    }

    #[test]
    fn test_link_rejects_wrong_type() {
        let mut store = InMemoryStore::new(crate::test_helpers::content_registry_arc());
        let author = store.insert_values("Author", 1, &[]).unwrap();
        let doc = store.insert_values("Document", 1, &[]).unwrap();
        assert!(store.link(&author, "Page", &doc).unwrap_err().is_argument_error());
        assert!(store.link(&author, "Unknown", &doc).unwrap_err().is_argument_error());
    }
}
