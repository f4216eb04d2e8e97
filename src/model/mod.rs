//! Type metadata: attributes, relations and the registry that supplies them.

mod attribute;
mod registry;
mod relation;

pub use attribute::{AttributeDescription, AttributeType};
pub use registry::{RegistryBuilder, StaticTypeRegistry, TypeRegistry};
pub use relation::{
    AggregationKind, HierarchyType, Multiplicity, RelationDescription, RelationKind,
};

use serde::{Deserialize, Serialize};

/// Describes a persistent type: its table, primary key, attributes and relations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescription {
    pub name: String,
    pub table: String,
    pub pk_names: Vec<String>,
    pub attributes: Vec<AttributeDescription>,
    /// Relation ends seen from this type, in declaration order
    #[serde(default)]
    pub relations: Vec<RelationDescription>,
    /// Order-by tokens applied when a query requests no ordering, e.g. `["name ASC"]`
    #[serde(default)]
    pub default_order: Vec<String>,
}

impl TypeDescription {
    /// A type with a single integer primary key `id`.
    pub fn new(name: &str, table: &str) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            pk_names: vec!["id".to_string()],
            attributes: vec![AttributeDescription::primary_key("id")],
            relations: Vec::new(),
            default_order: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, attribute: AttributeDescription) -> Self {
        if attribute.is_primary_key && !self.pk_names.contains(&attribute.name) {
            self.pk_names.push(attribute.name.clone());
        }
        self.attributes.retain(|a| a.name != attribute.name);
        self.attributes.push(attribute);
        self
    }

    /// Replace the primary key with the given attributes.
    #[must_use]
    pub fn with_primary_key(mut self, attributes: Vec<AttributeDescription>) -> Self {
        self.attributes.retain(|a| !a.is_primary_key);
        self.pk_names = attributes.iter().map(|a| a.name.clone()).collect();
        let mut all: Vec<AttributeDescription> = attributes
            .into_iter()
            .map(|mut a| {
                a.is_primary_key = true;
                a
            })
            .collect();
        all.append(&mut self.attributes);
        self.attributes = all;
        self
    }

    #[must_use]
    pub fn with_default_order(mut self, order: &[&str]) -> Self {
        self.default_order = order.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDescription> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    pub fn is_pk(&self, name: &str) -> bool {
        self.pk_names.iter().any(|pk| pk == name)
    }

    /// Column storing the attribute.
    pub fn column_for(&self, name: &str) -> Option<&str> {
        self.attribute(name).map(AttributeDescription::column_name)
    }

    /// The relation end under which this type holds the related objects.
    pub fn relation(&self, role: &str) -> Option<&RelationDescription> {
        self.relations.iter().find(|r| r.other_role == role)
    }

    pub fn has_relation(&self, role: &str) -> bool {
        self.relation(role).is_some()
    }

    pub fn relations_by_type<'a>(&'a self, other_type: &'a str) -> impl Iterator<Item = &'a RelationDescription> + 'a {
        self.relations.iter().filter(move |r| r.other_type == other_type)
    }

    pub fn relations_of_hierarchy(&self, hierarchy_type: HierarchyType) -> impl Iterator<Item = &RelationDescription> + '_ {
        self.relations
            .iter()
            .filter(move |r| r.hierarchy_type == hierarchy_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_description_lookup() {
        let page = TypeDescription::new("Page", "page")
            .with_attribute(AttributeDescription::new("name", AttributeType::String).with_column("title"));
        assert_eq!(page.column_for("name"), Some("title"));
        assert_eq!(page.column_for("id"), Some("id"));
        assert!(page.is_pk("id"));
        assert!(!page.is_pk("name"));
        assert!(page.column_for("missing").is_none());
    }

    #[test]
    fn test_composite_primary_key() {
        let link = TypeDescription::new("Link", "link").with_primary_key(vec![
            AttributeDescription::primary_key("source"),
            AttributeDescription::new("target", AttributeType::String),
        ]);
        assert_eq!(link.pk_names, vec!["source".to_string(), "target".to_string()]);
        assert!(link.attribute("id").is_none());
        assert!(link.attribute("target").map(|a| a.is_primary_key).unwrap_or(false));
    }
}
