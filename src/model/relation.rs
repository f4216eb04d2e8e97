//! Relation metadata.
//!
//! A [`RelationDescription`] describes one end of a bidirectional relation as seen from
//! `this_type`. The role under which a node of `this_type` holds its related nodes is
//! `other_role`; the related node sees the owner under `this_role`. The registry stores
//! both ends, so every description has a mirror obtained with [`RelationDescription::reversed`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Upper or lower bound of the number of related objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Multiplicity {
    Bounded(u32),
    Unbounded,
}

impl Multiplicity {
    pub fn is_unbounded(&self) -> bool {
        matches!(self, Multiplicity::Unbounded)
    }

    /// Whether `count` related objects already reach this bound.
    pub fn is_reached(&self, count: usize) -> bool {
        match self {
            Multiplicity::Bounded(max) => count >= *max as usize,
            Multiplicity::Unbounded => false,
        }
    }
}

impl fmt::Display for Multiplicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Multiplicity::Bounded(n) => write!(f, "{n}"),
            Multiplicity::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// Ownership semantics of a relation end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationKind {
    None,
    Shared,
    Composite,
}

/// Position of the other end in the content hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HierarchyType {
    Parent,
    Child,
    Undefined,
}

impl HierarchyType {
    pub fn reversed(self) -> Self {
        match self {
            HierarchyType::Parent => HierarchyType::Child,
            HierarchyType::Child => HierarchyType::Parent,
            HierarchyType::Undefined => HierarchyType::Undefined,
        }
    }
}

/// Storage of the relation, used to derive joins.
///
/// Attribute names refer to attributes of the respective types; columns are looked up
/// through the type descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationKind {
    /// `this_type.fk_name` references `other_type.id_name`
    ManyToOne { id_name: String, fk_name: String },
    /// `other_type.fk_name` references `this_type.id_name`
    OneToMany { id_name: String, fk_name: String },
    /// Association table with `this_fk` referencing `this_type.this_id` and `other_fk`
    /// referencing `other_type.other_id`
    ManyToMany {
        table: String,
        this_fk: String,
        other_fk: String,
        this_id: String,
        other_id: String,
    },
}

impl RelationKind {
    pub fn reversed(&self) -> Self {
        match self {
            RelationKind::ManyToOne { id_name, fk_name } => RelationKind::OneToMany {
                id_name: id_name.clone(),
                fk_name: fk_name.clone(),
            },
            RelationKind::OneToMany { id_name, fk_name } => RelationKind::ManyToOne {
                id_name: id_name.clone(),
                fk_name: fk_name.clone(),
            },
            RelationKind::ManyToMany {
                table,
                this_fk,
                other_fk,
                this_id,
                other_id,
            } => RelationKind::ManyToMany {
                table: table.clone(),
                this_fk: other_fk.clone(),
                other_fk: this_fk.clone(),
                this_id: other_id.clone(),
                other_id: this_id.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDescription {
    pub this_type: String,
    pub this_role: String,
    pub other_type: String,
    pub other_role: String,
    pub this_min_multiplicity: u32,
    pub this_max_multiplicity: Multiplicity,
    pub other_min_multiplicity: u32,
    pub other_max_multiplicity: Multiplicity,
    pub this_aggregation_kind: AggregationKind,
    pub other_aggregation_kind: AggregationKind,
    pub this_navigability: bool,
    pub other_navigability: bool,
    pub hierarchy_type: HierarchyType,
    #[serde(flatten)]
    pub kind: RelationKind,
}

impl RelationDescription {
    /// One `this_type` owning many `other_type`s through `other_type.fk_name`.
    ///
    /// Roles default to the type names.
    pub fn one_to_many(this_type: &str, other_type: &str, fk_name: &str) -> Self {
        Self {
            this_type: this_type.to_string(),
            this_role: this_type.to_string(),
            other_type: other_type.to_string(),
            other_role: other_type.to_string(),
            this_min_multiplicity: 0,
            this_max_multiplicity: Multiplicity::Bounded(1),
            other_min_multiplicity: 0,
            other_max_multiplicity: Multiplicity::Unbounded,
            this_aggregation_kind: AggregationKind::Composite,
            other_aggregation_kind: AggregationKind::None,
            this_navigability: true,
            other_navigability: true,
            hierarchy_type: HierarchyType::Child,
            kind: RelationKind::OneToMany {
                id_name: "id".to_string(),
                fk_name: fk_name.to_string(),
            },
        }
    }

    /// Many `this_type`s referencing one `other_type` through `this_type.fk_name`.
    pub fn many_to_one(this_type: &str, other_type: &str, fk_name: &str) -> Self {
        Self::one_to_many(other_type, this_type, fk_name).reversed()
    }

    /// Many-to-many relation stored in the association table `table`.
    pub fn many_to_many(
        this_type: &str,
        other_type: &str,
        table: &str,
        this_fk: &str,
        other_fk: &str,
    ) -> Self {
        Self {
            this_max_multiplicity: Multiplicity::Unbounded,
            this_aggregation_kind: AggregationKind::Shared,
            other_aggregation_kind: AggregationKind::Shared,
            kind: RelationKind::ManyToMany {
                table: table.to_string(),
                this_fk: this_fk.to_string(),
                other_fk: other_fk.to_string(),
                this_id: "id".to_string(),
                other_id: "id".to_string(),
            },
            ..Self::one_to_many(this_type, other_type, "")
        }
    }

    /// Set the role names: `this_role` is seen from the other end, `other_role` from this end.
    #[must_use]
    pub fn with_roles(mut self, this_role: &str, other_role: &str) -> Self {
        self.this_role = this_role.to_string();
        self.other_role = other_role.to_string();
        self
    }

    #[must_use]
    pub fn with_other_max(mut self, max: Multiplicity) -> Self {
        self.other_max_multiplicity = max;
        self
    }

    #[must_use]
    pub fn with_aggregation(mut self, this_kind: AggregationKind, other_kind: AggregationKind) -> Self {
        self.this_aggregation_kind = this_kind;
        self.other_aggregation_kind = other_kind;
        self
    }

    #[must_use]
    pub fn with_navigability(mut self, this_navigable: bool, other_navigable: bool) -> Self {
        self.this_navigability = this_navigable;
        self.other_navigability = other_navigable;
        self
    }

    #[must_use]
    pub fn with_hierarchy(mut self, hierarchy_type: HierarchyType) -> Self {
        self.hierarchy_type = hierarchy_type;
        self
    }

    /// Whether a node of `this_type` holds a list under `other_role`.
    pub fn is_multi_valued(&self) -> bool {
        match self.other_max_multiplicity {
            Multiplicity::Unbounded => true,
            Multiplicity::Bounded(n) => n > 1,
        }
    }

    /// Whether both descriptions denote the same relation, seen from either end.
    pub fn is_same_relation(&self, other: &RelationDescription) -> bool {
        let same = self.this_type == other.this_type
            && self.other_type == other.other_type
            && self.this_role == other.this_role
            && self.other_role == other.other_role;
        let mirrored = self.this_type == other.other_type
            && self.other_type == other.this_type
            && self.this_role == other.other_role
            && self.other_role == other.this_role;
        same || mirrored
    }

    /// The same relation seen from the other end.
    pub fn reversed(&self) -> Self {
        Self {
            this_type: self.other_type.clone(),
            this_role: self.other_role.clone(),
            other_type: self.this_type.clone(),
            other_role: self.this_role.clone(),
            this_min_multiplicity: self.other_min_multiplicity,
            this_max_multiplicity: self.other_max_multiplicity,
            other_min_multiplicity: self.this_min_multiplicity,
            other_max_multiplicity: self.this_max_multiplicity,
            this_aggregation_kind: self.other_aggregation_kind,
            other_aggregation_kind: self.this_aggregation_kind,
            this_navigability: self.other_navigability,
            other_navigability: self.this_navigability,
            hierarchy_type: self.hierarchy_type.reversed(),
            kind: self.kind.reversed(),
        }
    }
}
