//! Relation-aware node operations.
//!
//! These live on the transaction because they need both ends of a relation and the
//! loader. A role is initialized once: the first access moves it from
//! `Uninitialized` through `Initializing` to `Initialized` after asking the loader for
//! proxies of the related objects. Explicit loads move it to `Loaded`.

use sea_query::Value;

use super::{merge_object_lists, merge_single, LoadState, NodeFilter, RelatedObject, RelationValue};
use crate::authorization::Action;
use crate::error::LifeError;
use crate::loader::{BuildDepth, LoadedObject, RelationQuery};
use crate::model::{HierarchyType, RelationDescription};
use crate::oid::ObjectId;
use crate::transaction::Transaction;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Options for [`Transaction::add_node_with`] and [`Transaction::set_value_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddOptions {
    /// Set the value even if the attribute is not editable
    pub force_set: bool,
    /// Mark the node dirty when the value changes
    pub track_change: bool,
    /// Apply the mirror operation on the related node
    pub update_other_side: bool,
}

impl Default for AddOptions {
    fn default() -> Self {
        Self {
            force_set: false,
            track_change: true,
            update_other_side: true,
        }
    }
}

impl Transaction {
    /// Relation end of the node's type under `role`.
    pub fn relation_description(&self, oid: &ObjectId, role: &str) -> Result<RelationDescription, LifeError> {
        self.registry.relation(oid.type_name(), role).cloned()
    }

    /// Relation used to connect `this` and `other`; the first one matching `other`'s
    /// type if no role is given.
    fn resolve_role(
        &self,
        this: &ObjectId,
        other: &ObjectId,
        role: Option<&str>,
    ) -> Result<RelationDescription, LifeError> {
        let type_desc = self.registry.get(this.type_name())?;
        let relation = match role {
            Some(role) => type_desc.relation(role).ok_or_else(|| {
                LifeError::InvalidArgument(format!("No relation to '{role}' exists in '{}'", this.type_name()))
            })?,
            None => type_desc.relations_by_type(other.type_name()).next().ok_or_else(|| {
                LifeError::InvalidArgument(format!(
                    "No relation to '{}' exists in '{}'",
                    other.type_name(),
                    this.type_name()
                ))
            })?,
        };
        if relation.other_type != other.type_name() {
            return Err(LifeError::InvalidArgument(format!(
                "Role '{}' of '{}' expects '{}', got '{}'",
                relation.other_role,
                this.type_name(),
                relation.other_type,
                other.type_name()
            )));
        }
        Ok(relation.clone())
    }

    fn to_related(&mut self, loaded: LoadedObject) -> Option<RelatedObject> {
        match loaded {
            LoadedObject::Proxy(oid) if self.contains(&oid) => Some(RelatedObject::Node(oid)),
            LoadedObject::Proxy(oid) => Some(RelatedObject::proxy(oid)),
            LoadedObject::Node(node) => self.attach_loaded(node).map(RelatedObject::Node),
        }
    }

    fn load_from_store(
        &mut self,
        oid: &ObjectId,
        role: &str,
        depth: BuildDepth,
    ) -> Result<Vec<RelatedObject>, LifeError> {
        let Some(loader) = self.loader.clone() else {
            return Ok(Vec::new());
        };
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::load_relation_span(role, 1).entered();
        #[cfg(feature = "metrics")]
        METRICS.record_relation_load();
        log::debug!("Loading relation {oid}.{role} ({depth:?})");

        let mut loaded = loader.load_relation(&[oid.clone()], role, depth, &RelationQuery::default())?;
        let deleted: Vec<ObjectId> = self
            .get(oid)
            .map(|n| n.deleted_nodes(role).to_vec())
            .unwrap_or_default();
        Ok(loaded
            .remove(oid)
            .unwrap_or_default()
            .into_iter()
            .filter(|l| !deleted.contains(l.oid()))
            .filter_map(|l| self.to_related(l))
            .collect())
    }

    /// Merge related objects into the in-memory value of `role`.
    fn merge_into(&mut self, oid: &ObjectId, relation: &RelationDescription, incoming: Vec<RelatedObject>) -> Result<(), LifeError> {
        let role = relation.other_role.as_str();
        let node = self.node_mut(oid)?;
        let current = node.raw_relation(role).cloned().unwrap_or_default();
        let value = if relation.is_multi_valued() {
            let existing: Vec<RelatedObject> = current.objects().into_iter().cloned().collect();
            RelationValue::Many(merge_object_lists(&existing, &incoming).result)
        } else {
            match incoming.into_iter().next() {
                Some(first) if current.is_unset() => RelationValue::Single(first),
                Some(first) if current.contains(first.oid()) => merge_single(&current, first).0,
                _ => current,
            }
        };
        node.set_raw_relation(role, value);
        Ok(())
    }

    /// Make sure `role` holds at least proxies of the related objects.
    pub(crate) fn initialize_relation(&mut self, oid: &ObjectId, role: &str) -> Result<(), LifeError> {
        let relation = self.relation_description(oid, role)?;
        let state = self
            .get(oid)
            .ok_or_else(|| LifeError::NotFound(oid.to_string()))?
            .load_state(role);
        if state != LoadState::Uninitialized {
            return Ok(());
        }

        if oid.contains_dummy_ids() || self.loader.is_none() {
            self.node_mut(oid)?.advance_load_state(role, LoadState::Initialized);
            return Ok(());
        }

        self.node_mut(oid)?.advance_load_state(role, LoadState::Initializing);
        let incoming = self.load_from_store(oid, role, BuildDepth::ProxiesOnly)?;
        self.merge_into(oid, &relation, incoming)?;
        self.node_mut(oid)?.advance_load_state(role, LoadState::Initialized);
        Ok(())
    }

    /// Value of a relation role, loading proxies of the related objects on first access.
    pub fn relation_value(&mut self, oid: &ObjectId, role: &str) -> Result<RelationValue, LifeError> {
        self.initialize_relation(oid, role)?;
        Ok(self
            .get(oid)
            .and_then(|n| n.raw_relation(role))
            .cloned()
            .unwrap_or_default())
    }

    /// Load the related nodes of `role` and return the ids of those attached.
    pub(crate) fn load_relation_nodes(&mut self, oid: &ObjectId, role: &str) -> Result<Vec<ObjectId>, LifeError> {
        let relation = self.relation_description(oid, role)?;
        let state = self
            .get(oid)
            .ok_or_else(|| LifeError::NotFound(oid.to_string()))?
            .load_state(role);

        if state != LoadState::Loaded {
            self.initialize_relation(oid, role)?;
            let incoming = if oid.contains_dummy_ids() || self.loader.is_none() {
                Vec::new()
            } else {
                self.load_from_store(oid, role, BuildDepth::Single)?
            };
            self.merge_into(oid, &relation, incoming)?;
            self.resolve_proxies(oid, role)?;
            self.node_mut(oid)?.advance_load_state(role, LoadState::Loaded);
        }

        Ok(self
            .get(oid)
            .and_then(|n| n.raw_relation(role))
            .map(RelationValue::oids)
            .unwrap_or_default()
            .into_iter()
            .filter(|o| self.contains(o))
            .collect())
    }

    /// Replace resolvable proxies in `role` by their nodes. Unreadable objects are dropped.
    fn resolve_proxies(&mut self, oid: &ObjectId, role: &str) -> Result<(), LifeError> {
        let proxies: Vec<ObjectId> = self
            .get(oid)
            .and_then(|n| n.raw_relation(role))
            .map(|v| {
                v.objects()
                    .into_iter()
                    .filter(|o| o.is_proxy())
                    .map(|o| o.oid().clone())
                    .collect()
            })
            .unwrap_or_default();
        if proxies.is_empty() {
            return Ok(());
        }

        let mut resolved = Vec::new();
        let mut unreadable = Vec::new();
        for proxy in proxies {
            match self.resolve(&proxy).map(|_| ()) {
                Ok(()) => resolved.push(RelatedObject::Node(proxy)),
                Err(LifeError::NotFound(_)) if self.denied_reads().contains(&proxy) => unreadable.push(proxy),
                Err(e) => return Err(e),
            }
        }

        let node = self.node_mut(oid)?;
        let current = node.raw_relation(role).cloned().unwrap_or_default();
        let value = match current {
            RelationValue::Many(list) => {
                let kept: Vec<RelatedObject> = list.into_iter().filter(|o| !unreadable.contains(o.oid())).collect();
                RelationValue::Many(merge_object_lists(&kept, &resolved).result)
            }
            RelationValue::Single(obj) if unreadable.contains(obj.oid()) => RelationValue::Unset,
            RelationValue::Single(obj) => match resolved.into_iter().next() {
                Some(first) => merge_single(&RelationValue::Single(obj), first).0,
                None => RelationValue::Single(obj),
            },
            RelationValue::Unset => RelationValue::Unset,
        };
        node.set_raw_relation(role, value);
        Ok(())
    }

    /// Add `other` to a relation of `this`, updating the other end as well.
    pub fn add_node(&mut self, this: &ObjectId, other: &ObjectId, role: Option<&str>) -> Result<bool, LifeError> {
        self.add_node_with(this, other, role, AddOptions::default())
    }

    /// Add `other` to a relation of `this`.
    ///
    /// # Arguments
    ///
    /// * `role` - Role under which `this` holds `other`; defaults to the first relation
    ///   to `other`'s type
    /// * `options` - Change tracking and mirroring
    ///
    /// # Returns
    ///
    /// Whether the relation value changed.
    ///
    /// # Errors
    ///
    /// Returns `LifeError::InvalidArgument` for unknown roles and when the maximum
    /// multiplicity is reached on either end. Neither end is changed then.
    pub fn add_node_with(
        &mut self,
        this: &ObjectId,
        other: &ObjectId,
        role: Option<&str>,
        options: AddOptions,
    ) -> Result<bool, LifeError> {
        let relation = self.resolve_role(this, other, role)?;
        self.resolve(other)?;
        self.ensure_room(this, other, &relation)?;
        if options.update_other_side {
            let mirror = self.relation_description(other, &relation.this_role)?;
            self.ensure_room(other, this, &mirror)?;
        }
        let role = relation.other_role.as_str();

        let node = self.node_mut(this)?;
        let current = node.raw_relation(role).cloned().unwrap_or_default();
        let incoming = RelatedObject::Node(other.clone());
        let mut replaced = None;

        let changed = if relation.is_multi_valued() {
            let existing: Vec<RelatedObject> = current.objects().into_iter().cloned().collect();
            let merged = merge_object_lists(&existing, &[incoming]);
            node.set_raw_relation(role, RelationValue::Many(merged.result));
            !merged.added.is_empty()
        } else {
            if let RelationValue::Single(old) = &current {
                if old.oid() != other {
                    replaced = Some(old.oid().clone());
                }
            }
            let (value, is_new) = merge_single(&current, incoming);
            node.set_raw_relation(role, value);
            is_new
        };

        if changed {
            node.record_added(role, other);
            if let Some(old) = &replaced {
                node.record_deleted(role, old);
            }
            if options.track_change {
                node.mark_dirty();
            }
            log::trace!("Added {other} to {this}.{role}");
        }

        // the replaced object no longer sees this node
        if let Some(old) = replaced {
            if self.contains(&old) {
                self.delete_node_with(&old, this, Some(&relation.this_role), false)?;
            }
        }

        if options.update_other_side {
            let mirror = AddOptions {
                update_other_side: false,
                ..options
            };
            self.add_node_with(other, this, Some(&relation.this_role), mirror)?;
        }
        Ok(changed)
    }

    /// Initialize the role of `holder` described by `relation` and fail when it is full
    /// and does not hold `incoming` yet.
    fn ensure_room(&mut self, holder: &ObjectId, incoming: &ObjectId, relation: &RelationDescription) -> Result<(), LifeError> {
        let role = relation.other_role.as_str();
        self.initialize_relation(holder, role)?;
        if !relation.is_multi_valued() {
            return Ok(());
        }
        let current = self
            .get(holder)
            .and_then(|n| n.raw_relation(role))
            .cloned()
            .unwrap_or_default();
        if !current.contains(incoming) && relation.other_max_multiplicity.is_reached(current.len()) {
            return Err(LifeError::InvalidArgument(format!(
                "Maximum number of related objects exceeded: {} ({holder}.{role})",
                relation.other_max_multiplicity
            )));
        }
        Ok(())
    }

    /// Remove `other` from a relation of `this`, updating the other end as well.
    pub fn delete_node(&mut self, this: &ObjectId, other: &ObjectId, role: Option<&str>) -> Result<bool, LifeError> {
        self.delete_node_with(this, other, role, true)
    }

    /// Remove `other` from the in-memory value of a relation of `this`.
    pub fn delete_node_with(
        &mut self,
        this: &ObjectId,
        other: &ObjectId,
        role: Option<&str>,
        update_other_side: bool,
    ) -> Result<bool, LifeError> {
        let relation = self.resolve_role(this, other, role)?;
        let role = relation.other_role.as_str();
        let node = self.node_mut(this)?;

        let removed = match node.raw_relation(role).cloned() {
            Some(RelationValue::Many(mut list)) => match list.iter().position(|o| o.oid() == other) {
                Some(pos) => {
                    list.remove(pos);
                    node.set_raw_relation(role, RelationValue::Many(list));
                    true
                }
                None => false,
            },
            Some(RelationValue::Single(obj)) if obj.oid() == other => {
                node.set_raw_relation(role, RelationValue::Unset);
                true
            }
            _ => false,
        };

        if removed {
            node.record_deleted(role, other);
            node.mark_dirty();
            log::trace!("Deleted {other} from {this}.{role}");
        }

        if update_other_side && self.contains(other) {
            self.delete_node_with(other, this, Some(&relation.this_role), false)?;
        }
        Ok(removed)
    }

    /// Add each of `others` to `role`. Single valued roles end up holding the last one.
    pub fn set_relation(&mut self, this: &ObjectId, role: &str, others: &[ObjectId]) -> Result<(), LifeError> {
        for other in others {
            self.add_node(this, other, Some(role))?;
        }
        Ok(())
    }

    /// Set an attribute value with change tracking.
    pub fn set_value(&mut self, oid: &ObjectId, name: &str, value: Value) -> Result<bool, LifeError> {
        self.set_value_with(oid, name, value, AddOptions::default())
    }

    /// Set an attribute value.
    ///
    /// Non-editable attributes are rejected unless `force_set` is given. Changing a
    /// persisted node requires update permission.
    pub fn set_value_with(
        &mut self,
        oid: &ObjectId,
        name: &str,
        value: Value,
        options: AddOptions,
    ) -> Result<bool, LifeError> {
        let type_desc = self.registry.get(oid.type_name())?;
        if type_desc.has_relation(name) {
            return Err(LifeError::InvalidArgument(format!(
                "'{name}' is a relation of '{}', use set_relation",
                oid.type_name()
            )));
        }
        if let Some(attr) = type_desc.attribute(name) {
            if !attr.is_editable && !options.force_set {
                return Err(LifeError::InvalidArgument(format!("Attribute '{name}' is not editable")));
            }
        }
        if !oid.contains_dummy_ids() && !self.is_authorized(oid, Action::Update) {
            return Err(LifeError::AuthorizationFailed {
                oid: oid.to_string(),
                action: Action::Update.to_string(),
            });
        }

        let node = self.node_mut(oid)?;
        let changed = node.set_value(name, value);
        if changed && options.track_change {
            node.mark_dirty();
        }
        Ok(changed)
    }

    // Navigation

    fn related_ex(
        &mut self,
        oid: &ObjectId,
        hierarchy: HierarchyType,
        role: Option<&str>,
        filter: &NodeFilter,
    ) -> Result<Vec<ObjectId>, LifeError> {
        let roles: Vec<String> = self
            .registry
            .get(oid.type_name())?
            .relations_of_hierarchy(hierarchy)
            .filter(|r| role.map_or(true, |role| r.other_role == role))
            .map(|r| r.other_role.clone())
            .collect();
        if let Some(role) = role {
            if roles.is_empty() {
                return Err(LifeError::InvalidArgument(format!(
                    "No {hierarchy:?} relation '{role}' exists in '{}'",
                    oid.type_name()
                )));
            }
        }

        let mut result = Vec::new();
        for role in roles {
            for related in self.relation_value(oid, &role)?.oids() {
                if !filter.matches_oid(&related) {
                    continue;
                }
                if filter.needs_node() {
                    match self.resolve(&related).map(|_| ()) {
                        Ok(()) => {}
                        Err(LifeError::NotFound(_)) if self.denied_reads().contains(&related) => continue,
                        Err(e) => return Err(e),
                    }
                    if !self.get(&related).map_or(false, |node| filter.matches(node)) {
                        continue;
                    }
                }
                if !result.contains(&related) {
                    result.push(related);
                }
            }
        }
        Ok(result)
    }

    pub fn parents(&mut self, oid: &ObjectId) -> Result<Vec<ObjectId>, LifeError> {
        self.related_ex(oid, HierarchyType::Parent, None, &NodeFilter::default())
    }

    /// Parents matching `filter`, optionally restricted to one role.
    pub fn parents_ex(&mut self, oid: &ObjectId, role: Option<&str>, filter: &NodeFilter) -> Result<Vec<ObjectId>, LifeError> {
        self.related_ex(oid, HierarchyType::Parent, role, filter)
    }

    pub fn first_parent(&mut self, oid: &ObjectId) -> Result<Option<ObjectId>, LifeError> {
        Ok(self.parents(oid)?.into_iter().next())
    }

    pub fn children(&mut self, oid: &ObjectId) -> Result<Vec<ObjectId>, LifeError> {
        self.related_ex(oid, HierarchyType::Child, None, &NodeFilter::default())
    }

    /// Children matching `filter`, optionally restricted to one role.
    pub fn children_ex(&mut self, oid: &ObjectId, role: Option<&str>, filter: &NodeFilter) -> Result<Vec<ObjectId>, LifeError> {
        self.related_ex(oid, HierarchyType::Child, role, filter)
    }

    pub fn num_parents(&mut self, oid: &ObjectId, role: Option<&str>) -> Result<usize, LifeError> {
        Ok(self.parents_ex(oid, role, &NodeFilter::default())?.len())
    }

    pub fn num_children(&mut self, oid: &ObjectId, role: Option<&str>) -> Result<usize, LifeError> {
        Ok(self.children_ex(oid, role, &NodeFilter::default())?.len())
    }

    /// Relations under which the node may have parents.
    pub fn possible_parents(&self, oid: &ObjectId) -> Result<Vec<RelationDescription>, LifeError> {
        Ok(self
            .registry
            .get(oid.type_name())?
            .relations_of_hierarchy(HierarchyType::Parent)
            .cloned()
            .collect())
    }

    /// Relations under which the node may have children.
    pub fn possible_children(&self, oid: &ObjectId) -> Result<Vec<RelationDescription>, LifeError> {
        Ok(self
            .registry
            .get(oid.type_name())?
            .relations_of_hierarchy(HierarchyType::Child)
            .cloned()
            .collect())
    }

    /// Load the children of `role` (or all child relations) as nodes.
    ///
    /// `depth` counts generations from the node: `Single` and `Depth(1)` load the
    /// children only, `Depth(n)` continues below them.
    pub fn load_children(&mut self, oid: &ObjectId, role: Option<&str>, depth: BuildDepth) -> Result<(), LifeError> {
        self.load_hierarchy(oid, HierarchyType::Child, role, depth)
    }

    pub fn load_parents(&mut self, oid: &ObjectId, role: Option<&str>, depth: BuildDepth) -> Result<(), LifeError> {
        self.load_hierarchy(oid, HierarchyType::Parent, role, depth)
    }

    fn load_hierarchy(
        &mut self,
        oid: &ObjectId,
        hierarchy: HierarchyType,
        role: Option<&str>,
        depth: BuildDepth,
    ) -> Result<(), LifeError> {
        let roles: Vec<String> = match role {
            Some(role) => {
                let relation = self.relation_description(oid, role)?;
                if relation.hierarchy_type != hierarchy {
                    return Err(LifeError::InvalidArgument(format!(
                        "'{role}' is not a {hierarchy:?} relation of '{}'",
                        oid.type_name()
                    )));
                }
                vec![role.to_string()]
            }
            None => self
                .registry
                .get(oid.type_name())?
                .relations_of_hierarchy(hierarchy)
                .map(|r| r.other_role.clone())
                .collect(),
        };
        self.load_relations(oid, &roles, depth)
    }

    /// Load the given roles of a node as nodes and mark them `Loaded`.
    pub fn load_relations(&mut self, oid: &ObjectId, roles: &[String], depth: BuildDepth) -> Result<(), LifeError> {
        if depth.wants_proxies() {
            for role in roles {
                self.initialize_relation(oid, role)?;
            }
            return Ok(());
        }

        let mut related = Vec::new();
        for role in roles {
            related.extend(self.load_relation_nodes(oid, role)?);
        }

        let generations = depth.generations(self.config.max_build_depth);
        if generations > 1 {
            self.hydrate(&related, BuildDepth::Depth(generations - 1))?;
        }
        Ok(())
    }
}
