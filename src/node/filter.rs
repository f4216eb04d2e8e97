//! Filters for parent and child navigation.

use regex::Regex;
use sea_query::Value;

use crate::error::LifeError;
use crate::node::Node;
use crate::oid::ObjectId;
use crate::value::{value_to_string, values_equal};

#[derive(Debug, Clone)]
enum ValueMatch {
    Exact(Value),
    Pattern(Regex),
}

impl ValueMatch {
    fn matches(&self, value: Option<&Value>) -> bool {
        match (self, value) {
            (ValueMatch::Exact(expected), Some(value)) => values_equal(expected, value),
            (ValueMatch::Exact(_), None) => false,
            (ValueMatch::Pattern(re), value) => {
                let text = value.and_then(value_to_string).unwrap_or_default();
                re.is_match(&text)
            }
        }
    }
}

/// Restricts related nodes by id, type, attribute values and properties.
///
/// An empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    oid: Option<ObjectId>,
    type_name: Option<String>,
    values: Vec<(String, ValueMatch)>,
    properties: Vec<(String, ValueMatch)>,
}

impl NodeFilter {
    #[must_use]
    pub fn with_oid(mut self, oid: ObjectId) -> Self {
        self.oid = Some(oid);
        self
    }

    #[must_use]
    pub fn with_type(mut self, type_name: &str) -> Self {
        self.type_name = Some(type_name.to_string());
        self
    }

    #[must_use]
    pub fn with_value(mut self, name: &str, value: Value) -> Self {
        self.values.push((name.to_string(), ValueMatch::Exact(value)));
        self
    }

    /// Match an attribute value against a regular expression.
    pub fn with_value_pattern(mut self, name: &str, pattern: &str) -> Result<Self, LifeError> {
        self.values
            .push((name.to_string(), ValueMatch::Pattern(Regex::new(pattern)?)));
        Ok(self)
    }

    #[must_use]
    pub fn with_property(mut self, name: &str, value: Value) -> Self {
        self.properties.push((name.to_string(), ValueMatch::Exact(value)));
        self
    }

    /// Whether matching requires the loaded node rather than its id.
    pub fn needs_node(&self) -> bool {
        !self.values.is_empty() || !self.properties.is_empty()
    }

    pub fn matches_oid(&self, oid: &ObjectId) -> bool {
        self.oid.as_ref().map_or(true, |o| o == oid)
            && self.type_name.as_deref().map_or(true, |t| t == oid.type_name())
    }

    pub fn matches(&self, node: &Node) -> bool {
        self.matches_oid(node.oid())
            && self.values.iter().all(|(name, m)| m.matches(node.value(name)))
            && self.properties.iter().all(|(name, m)| m.matches(node.property(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Node {
        let mut node = Node::new(ObjectId::from_int("Page", 1));
        node.set_value("name", Value::from("Home".to_string()));
        node.set_property("visible", Value::from(true));
        node
    }

    #[test]
    fn test_empty_filter_matches() {
        assert!(NodeFilter::default().matches(&page()));
        assert!(!NodeFilter::default().needs_node());
    }

    #[test]
    fn test_value_and_property_filter() {
        let node = page();
        assert!(NodeFilter::default()
            .with_value("name", Value::from("Home".to_string()))
            .with_property("visible", Value::from(true))
            .matches(&node));
        assert!(!NodeFilter::default()
            .with_value("name", Value::from("home".to_string()))
            .matches(&node));
        assert!(!NodeFilter::default()
            .with_value("missing", Value::from(1i64))
            .matches(&node));
    }

    #[test]
    fn test_pattern_filter() {
        let node = page();
        let filter = NodeFilter::default().with_value_pattern("name", "^H.m").unwrap();
        assert!(filter.needs_node());
        assert!(filter.matches(&node));
        assert!(NodeFilter::default().with_value_pattern("name", "(").unwrap_err().is_argument_error());
    }

    #[test]
    fn test_oid_and_type() {
        let node = page();
        assert!(NodeFilter::default().with_type("Page").matches(&node));
        assert!(!NodeFilter::default().with_type("Author").matches(&node));
        assert!(!NodeFilter::default()
            .with_oid(ObjectId::from_int("Page", 2))
            .matches(&node));
    }
}
