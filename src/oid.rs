//! Composite object identifiers.
//!
//! An [`ObjectId`] is the type name plus the ordered primary key values, optionally
//! qualified with a store prefix. Its canonical string form is
//! `[prefix:]type:id1[:id2...]`; equality and hashing use that form.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::error::LifeError;
use crate::model::TypeRegistry;

const DUMMY_ID_PREFIX: &str = "tmp";
const SEPARATOR: char = ':';

/// One component of an object id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdValue {
    Int(i64),
    Str(String),
}

impl IdValue {
    /// A generated token standing in for a key that has not been assigned yet.
    pub fn dummy() -> Self {
        IdValue::Str(format!("{DUMMY_ID_PREFIX}{}", Uuid::new_v4().simple()))
    }

    pub fn is_dummy(&self) -> bool {
        match self {
            IdValue::Int(_) => false,
            IdValue::Str(s) => {
                s.len() == DUMMY_ID_PREFIX.len() + 32
                    && s.starts_with(DUMMY_ID_PREFIX)
                    && s[DUMMY_ID_PREFIX.len()..].chars().all(|c| c.is_ascii_hexdigit())
            }
        }
    }

    fn parse(s: &str) -> Self {
        match s.parse::<i64>() {
            Ok(i) => IdValue::Int(i),
            Err(_) => IdValue::Str(s.to_string()),
        }
    }
}

impl fmt::Display for IdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdValue::Int(i) => write!(f, "{i}"),
            IdValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for IdValue {
    fn from(value: i64) -> Self {
        IdValue::Int(value)
    }
}

impl From<&str> for IdValue {
    fn from(value: &str) -> Self {
        IdValue::Str(value.to_string())
    }
}

impl From<String> for IdValue {
    fn from(value: String) -> Self {
        IdValue::Str(value)
    }
}

/// Immutable identifier of a persistent object.
#[derive(Clone)]
pub struct ObjectId {
    type_name: String,
    ids: Vec<IdValue>,
    prefix: Option<String>,
    canonical: String,
}

impl ObjectId {
    pub fn new(type_name: &str, ids: Vec<IdValue>) -> Self {
        Self::build(None, type_name, ids)
    }

    pub fn with_prefix(prefix: &str, type_name: &str, ids: Vec<IdValue>) -> Self {
        Self::build(Some(prefix.to_string()).filter(|p| !p.is_empty()), type_name, ids)
    }

    /// Shorthand for a single integer key.
    pub fn from_int(type_name: &str, id: i64) -> Self {
        Self::new(type_name, vec![IdValue::Int(id)])
    }

    /// Identifier of a not yet persisted object, with `pk_arity` dummy components.
    pub fn dummy(type_name: &str, pk_arity: usize) -> Self {
        let ids = (0..pk_arity.max(1)).map(|_| IdValue::dummy()).collect();
        Self::new(type_name, ids)
    }

    /// Parse the canonical string form, validating type and key arity against `registry`.
    pub fn parse(s: &str, registry: &dyn TypeRegistry) -> Result<Self, LifeError> {
        let parts: Vec<&str> = s.split(SEPARATOR).collect();
        if parts.len() < 2 || parts.iter().any(|p| p.is_empty()) {
            return Err(LifeError::Parse(format!("'{s}' is not a valid object id")));
        }

        let (prefix, type_name, id_parts) = if registry.is_known_type(parts[0]) {
            (None, parts[0], &parts[1..])
        } else if parts.len() > 2 && registry.is_known_type(parts[1]) {
            (Some(parts[0]), parts[1], &parts[2..])
        } else {
            return Err(LifeError::UnknownType(format!("No known type in object id '{s}'")));
        };

        let type_desc = registry.get(type_name)?;
        if id_parts.len() != type_desc.pk_names.len() {
            return Err(LifeError::Parse(format!(
                "Object id '{s}' has {} key values, type '{type_name}' expects {}",
                id_parts.len(),
                type_desc.pk_names.len()
            )));
        }

        let ids = id_parts.iter().map(|p| IdValue::parse(p)).collect();
        Ok(match prefix {
            Some(prefix) => Self::with_prefix(prefix, type_name, ids),
            None => Self::new(type_name, ids),
        })
    }

    fn build(prefix: Option<String>, type_name: &str, ids: Vec<IdValue>) -> Self {
        let mut canonical = String::new();
        if let Some(p) = &prefix {
            canonical.push_str(p);
            canonical.push(SEPARATOR);
        }
        canonical.push_str(type_name);
        for id in &ids {
            canonical.push(SEPARATOR);
            canonical.push_str(&id.to_string());
        }
        Self {
            type_name: type_name.to_string(),
            ids,
            prefix,
            canonical,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn ids(&self) -> &[IdValue] {
        &self.ids
    }

    /// The first key value, convenient for single column keys.
    pub fn first_id(&self) -> Option<&IdValue> {
        self.ids.first()
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// Whether the object has not been persisted yet.
    pub fn contains_dummy_ids(&self) -> bool {
        self.ids.iter().any(IdValue::is_dummy)
    }
}

impl PartialEq for ObjectId {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for ObjectId {}

impl Hash for ObjectId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl PartialOrd for ObjectId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.canonical)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::content_registry;

    #[test]
    fn test_canonical_form() {
        let oid = ObjectId::from_int("Page", 12);
        assert_eq!(oid.as_str(), "Page:12");
        let prefixed = ObjectId::with_prefix("app", "Page", vec![IdValue::Int(12)]);
        assert_eq!(prefixed.to_string(), "app:Page:12");
        assert_ne!(oid, prefixed);
    }

    #[test]
    fn test_parse_round_trip() {
        let registry = content_registry();
        for s in ["Page:12", "app:Page:12", "Author:3"] {
            let oid = ObjectId::parse(s, &registry).unwrap();
            assert_eq!(oid.as_str(), s);
        }
        let oid = ObjectId::parse("app:Page:12", &registry).unwrap();
        assert_eq!(oid.prefix(), Some("app"));
        assert_eq!(oid.type_name(), "Page");
        assert_eq!(oid.ids(), &[IdValue::Int(12)]);
    }

    #[test]
    fn test_parse_validates_type_and_arity() {
        let registry = content_registry();
        assert!(matches!(ObjectId::parse("Comment:1", &registry), Err(LifeError::UnknownType(_))));
        assert!(matches!(ObjectId::parse("Page:1:2", &registry), Err(LifeError::Parse(_))));
        assert!(matches!(ObjectId::parse("Page", &registry), Err(LifeError::Parse(_))));
        assert!(matches!(ObjectId::parse("Page::", &registry), Err(LifeError::Parse(_))));
    }

    #[test]
    fn test_dummy_ids() {
        let oid = ObjectId::dummy("Page", 1);
        assert!(oid.contains_dummy_ids());
        assert!(!ObjectId::from_int("Page", 1).contains_dummy_ids());
        assert!(!ObjectId::new("Page", vec![IdValue::from("tmp")]).contains_dummy_ids());
        assert_ne!(ObjectId::dummy("Page", 1), ObjectId::dummy("Page", 1));

        let registry = content_registry();
        let parsed = ObjectId::parse(oid.as_str(), &registry).unwrap();
        assert!(parsed.contains_dummy_ids());
        assert_eq!(parsed, oid);
    }

    #[test]
    fn test_serializes_as_string() {
        let oid = ObjectId::from_int("Author", 7);
        assert_eq!(serde_json::to_string(&oid).unwrap(), "\"Author:7\"");
    }
}
