//! Depth-first traversal over the node graph and over node attributes.

use std::collections::HashSet;

use sea_query::Value;

use crate::error::LifeError;
use crate::model::{AggregationKind, HierarchyType};
use crate::oid::ObjectId;
use crate::transaction::Transaction;

/// Depth-first iterator over a node and its navigable children.
///
/// Each reachable object is visited once even if it can be reached through several
/// relations, so cycles terminate. Children known only as proxies are resolved when
/// they are visited.
pub struct NodeIterator<'t> {
    tx: &'t mut Transaction,
    stack: Vec<ObjectId>,
    processed: HashSet<ObjectId>,
    aggregation_kinds: Option<Vec<AggregationKind>>,
}

impl<'t> NodeIterator<'t> {
    pub fn new(tx: &'t mut Transaction, start: &ObjectId) -> Self {
        Self {
            tx,
            stack: vec![start.clone()],
            processed: HashSet::new(),
            aggregation_kinds: None,
        }
    }

    /// Follow only child relations this node aggregates with one of `kinds`.
    #[must_use]
    pub fn with_aggregation_kinds(mut self, kinds: &[AggregationKind]) -> Self {
        self.aggregation_kinds = Some(kinds.to_vec());
        self
    }

    pub fn transaction(&self) -> &Transaction {
        &*self.tx
    }

    fn push_children(&mut self, oid: &ObjectId) -> Result<(), LifeError> {
        let roles: Vec<String> = self
            .tx
            .registry()
            .get(oid.type_name())?
            .relations_of_hierarchy(HierarchyType::Child)
            .filter(|r| r.other_navigability)
            .filter(|r| {
                self.aggregation_kinds
                    .as_ref()
                    .map_or(true, |kinds| kinds.contains(&r.this_aggregation_kind))
            })
            .map(|r| r.other_role.clone())
            .collect();

        let mut children = Vec::new();
        for role in roles {
            children.extend(self.tx.relation_value(oid, &role)?.oids());
        }
        // reversed, so the first child is visited first
        for child in children.into_iter().rev() {
            if !self.processed.contains(&child) {
                self.stack.push(child);
            }
        }
        Ok(())
    }
}

impl Iterator for NodeIterator<'_> {
    type Item = Result<ObjectId, LifeError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(oid) = self.stack.pop() {
            if !self.processed.insert(oid.clone()) {
                continue;
            }
            if let Err(e) = self.tx.resolve(&oid).map(|_| ()) {
                return Some(Err(e));
            }
            if let Err(e) = self.push_children(&oid) {
                return Some(Err(e));
            }
            return Some(Ok(oid));
        }
        None
    }
}

/// Iterates over the attribute values of a node and, if recursive, of all nodes
/// reached by a [`NodeIterator`].
pub struct NodeValueIterator<'t> {
    nodes: NodeIterator<'t>,
    recursive: bool,
    current: Option<ObjectId>,
    names: Vec<String>,
    position: usize,
    started: bool,
}

impl<'t> NodeValueIterator<'t> {
    pub fn new(tx: &'t mut Transaction, start: &ObjectId, recursive: bool) -> Self {
        Self {
            nodes: NodeIterator::new(tx, start),
            recursive,
            current: None,
            names: Vec::new(),
            position: 0,
            started: false,
        }
    }

    fn advance_node(&mut self) -> Option<Result<(), LifeError>> {
        let oid = match self.nodes.next()? {
            Ok(oid) => oid,
            Err(e) => return Some(Err(e)),
        };
        self.names = self
            .nodes
            .transaction()
            .get(&oid)
            .map(|n| n.value_names())
            .unwrap_or_default();
        self.position = 0;
        self.current = Some(oid);
        Some(Ok(()))
    }
}

impl Iterator for NodeValueIterator<'_> {
    /// Node id, attribute name and value
    type Item = Result<(ObjectId, String, Value), LifeError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if !self.started {
                self.started = true;
                if let Err(e) = self.advance_node()? {
                    return Some(Err(e));
                }
            }

            if let Some(oid) = &self.current {
                if let Some(name) = self.names.get(self.position) {
                    self.position += 1;
                    let value = self
                        .nodes
                        .transaction()
                        .get(oid)
                        .and_then(|n| n.value(name))
                        .cloned()
                        .unwrap_or_else(crate::value::null);
                    return Some(Ok((oid.clone(), name.clone(), value)));
                }
            }

            if !self.recursive {
                return None;
            }
            if let Err(e) = self.advance_node()? {
                return Some(Err(e));
            }
        }
    }
}
