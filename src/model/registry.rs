//! Type registry supplying type metadata to the graph and the query builders.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::{RelationDescription, TypeDescription};
use crate::config::GraphConfig;
use crate::error::LifeError;

/// Source of type metadata.
pub trait TypeRegistry: Send + Sync {
    fn type_description(&self, name: &str) -> Option<&TypeDescription>;

    /// Names of all known types, in registration order.
    fn type_names(&self) -> Vec<&str>;

    fn is_known_type(&self, name: &str) -> bool {
        self.type_description(name).is_some()
    }

    /// Like [`TypeRegistry::type_description`], failing for unknown types.
    fn get(&self, name: &str) -> Result<&TypeDescription, LifeError> {
        self.type_description(name)
            .ok_or_else(|| LifeError::UnknownType(name.to_string()))
    }

    /// Relation end of `type_name` under `role`.
    fn relation(&self, type_name: &str, role: &str) -> Result<&RelationDescription, LifeError> {
        self.get(type_name)?.relation(role).ok_or_else(|| {
            LifeError::InvalidArgument(format!("No relation to '{role}' exists in '{type_name}'"))
        })
    }
}

/// Registry built from code or loaded from JSON.
#[derive(Debug, Clone, Default)]
pub struct StaticTypeRegistry {
    types: Vec<TypeDescription>,
    index: HashMap<String, usize>,
}

impl StaticTypeRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Load a registry from JSON of the form `{"types": [...], "relations": [...]}`.
    ///
    /// Relations are listed once and mirrored onto the other type.
    pub fn from_json(json: &str) -> Result<Self, LifeError> {
        #[derive(Deserialize)]
        struct Metadata {
            types: Vec<TypeDescription>,
            #[serde(default)]
            relations: Vec<RelationDescription>,
        }

        let metadata: Metadata = serde_json::from_str(json)?;
        let mut builder = Self::builder();
        for type_desc in metadata.types {
            builder = builder.add_type(type_desc);
        }
        for relation in metadata.relations {
            builder = builder.add_relation(relation);
        }
        builder.build()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LifeError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            LifeError::Config(format!("Failed to read metadata file {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Load the registry from `GraphConfig::metadata_path`.
    pub fn from_config(config: &GraphConfig) -> Result<Self, LifeError> {
        match &config.metadata_path {
            Some(path) => Self::from_file(path),
            None => Err(LifeError::Config("No metadata_path configured".to_string())),
        }
    }
}

impl TypeRegistry for StaticTypeRegistry {
    fn type_description(&self, name: &str) -> Option<&TypeDescription> {
        self.index.get(name).and_then(|&i| self.types.get(i))
    }

    fn type_names(&self) -> Vec<&str> {
        self.types.iter().map(|t| t.name.as_str()).collect()
    }
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    types: Vec<TypeDescription>,
    relations: Vec<RelationDescription>,
}

impl RegistryBuilder {
    #[must_use]
    pub fn add_type(mut self, type_desc: TypeDescription) -> Self {
        self.types.push(type_desc);
        self
    }

    /// Register a relation; its mirror end is added to the other type.
    #[must_use]
    pub fn add_relation(mut self, relation: RelationDescription) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn build(self) -> Result<StaticTypeRegistry, LifeError> {
        let mut registry = StaticTypeRegistry::default();
        for type_desc in self.types {
            if registry.index.contains_key(&type_desc.name) {
                return Err(LifeError::Config(format!("Type '{}' is registered twice", type_desc.name)));
            }
            if type_desc.pk_names.is_empty() {
                return Err(LifeError::Config(format!("Type '{}' has no primary key", type_desc.name)));
            }
            registry.index.insert(type_desc.name.clone(), registry.types.len());
            registry.types.push(type_desc);
        }

        for relation in self.relations {
            let mirror = relation.reversed();
            for end in [relation, mirror] {
                let idx = *registry
                    .index
                    .get(&end.this_type)
                    .ok_or_else(|| LifeError::UnknownType(end.this_type.clone()))?;
                let type_desc = &mut registry.types[idx];
                if type_desc.relation(&end.other_role).is_some() {
                    return Err(LifeError::Config(format!(
                        "Role '{}' is declared twice on '{}'",
                        end.other_role, end.this_type
                    )));
                }
                type_desc.relations.push(end);
            }
        }

        log::debug!("Built type registry with {} types", registry.types.len());
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HierarchyType;
    use crate::test_helpers::content_registry;

    #[test]
    fn test_relations_are_mirrored() {
        let registry = content_registry();
        let author = registry.get("Author").unwrap();
        let page = registry.get("Page").unwrap();
        let rel = author.relation("Page").unwrap();
        assert_eq!(rel.hierarchy_type, HierarchyType::Child);
        let mirror = page.relation("Author").unwrap();
        assert_eq!(mirror.hierarchy_type, HierarchyType::Parent);
        assert!(rel.is_same_relation(mirror));
    }

    #[test]
    fn test_unknown_type() {
        let registry = content_registry();
        assert!(!registry.is_known_type("Comment"));
        assert_eq!(registry.get("Comment").unwrap_err(), LifeError::UnknownType("Comment".to_string()));
        assert!(registry.relation("Page", "Comment").unwrap_err().is_argument_error());
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "types": [
                {"name": "Author", "table": "author", "pk_names": ["id"],
                 "attributes": [{"name": "id", "type": "integer", "is_primary_key": true},
                                {"name": "name", "type": "string"}]},
                {"name": "Book", "table": "book", "pk_names": ["id"],
                 "attributes": [{"name": "id", "type": "integer", "is_primary_key": true},
                                {"name": "title", "type": "string"},
                                {"name": "fk_author_id", "type": "integer"}]}
            ],
            "relations": [
                {"this_type": "Author", "this_role": "Author", "other_type": "Book", "other_role": "Book",
                 "this_min_multiplicity": 0, "this_max_multiplicity": {"bounded": 1},
                 "other_min_multiplicity": 0, "other_max_multiplicity": "unbounded",
                 "this_aggregation_kind": "composite", "other_aggregation_kind": "none",
                 "this_navigability": true, "other_navigability": true,
                 "hierarchy_type": "child",
                 "kind": "one_to_many", "id_name": "id", "fk_name": "fk_author_id"}
            ]
        }"#;
        let registry = StaticTypeRegistry::from_json(json).unwrap();
        assert_eq!(registry.type_names(), vec!["Author", "Book"]);
        let book = registry.get("Book").unwrap();
        assert!(!book.relation("Author").unwrap().is_multi_valued());
    }

    #[test]
    fn test_duplicate_role_rejected() {
        let result = StaticTypeRegistry::builder()
            .add_type(TypeDescription::new("A", "a"))
            .add_type(TypeDescription::new("B", "b"))
            .add_relation(RelationDescription::one_to_many("A", "B", "fk_a"))
            .add_relation(RelationDescription::one_to_many("A", "B", "fk_a2"))
            .build();
        assert!(matches!(result, Err(LifeError::Config(_))));
    }
}
