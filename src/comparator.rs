//! In-memory sorting of nodes by several criteria.
//!
//! Every criterion adds the squared weight `(n - i)^2` to the side that compares
//! greater, and the side with the larger sum sorts later. Earlier criteria dominate
//! later ones for up to four criteria; with more, the sums of later criteria can
//! outweigh earlier ones and the order is no longer guaranteed to be transitive.
//! [`ObjectComparator::sort`] ranks by net wins and stays well defined then.

use std::cmp::Ordering;
use std::fmt;

use sea_query::Value;

use crate::error::LifeError;
use crate::node::Node;
use crate::value::{compare_values, null};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SortKey {
    Oid,
    Type,
    /// Attribute value, falling back to the property of the same name
    Field(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortCriterion {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl SortCriterion {
    pub fn new(key: SortKey, direction: SortDirection) -> Self {
        Self { key, direction }
    }

    /// Parse `name [ASC|DESC]`. `oid` and `type` select the special keys; a type
    /// qualifier like `Page.name` is dropped.
    pub fn parse(token: &str) -> Result<Self, LifeError> {
        let mut parts = token.split_whitespace();
        let name = parts
            .next()
            .ok_or_else(|| LifeError::InvalidArgument("Empty sort criterion".to_string()))?;
        let direction = match parts.next().map(str::to_uppercase).as_deref() {
            None | Some("ASC") => SortDirection::Asc,
            Some("DESC") => SortDirection::Desc,
            Some(other) => {
                return Err(LifeError::InvalidArgument(format!("Invalid sort direction '{other}'")))
            }
        };
        if parts.next().is_some() {
            return Err(LifeError::InvalidArgument(format!("Invalid sort criterion '{token}'")));
        }

        let field = name.rsplit('.').next().unwrap_or(name);
        let key = match field.to_lowercase().as_str() {
            "oid" => SortKey::Oid,
            "type" => SortKey::Type,
            _ => SortKey::Field(field.to_string()),
        };
        Ok(Self { key, direction })
    }

    fn sort_value(&self, node: &Node) -> Value {
        match &self.key {
            SortKey::Oid => Value::from(node.oid().to_string()),
            SortKey::Type => Value::from(node.type_name().to_string()),
            SortKey::Field(name) => node
                .value(name)
                .or_else(|| node.property(name))
                .cloned()
                .unwrap_or_else(null),
        }
    }
}

impl fmt::Display for SortCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match &self.key {
            SortKey::Oid => "oid",
            SortKey::Type => "type",
            SortKey::Field(name) => name.as_str(),
        };
        let direction = match self.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        write!(f, "{name} {direction}")
    }
}

/// Compares nodes by a fixed list of criteria.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectComparator {
    criteria: Vec<SortCriterion>,
}

impl ObjectComparator {
    pub fn new(criteria: Vec<SortCriterion>) -> Self {
        Self { criteria }
    }

    /// Parse a comma separated list like `type DESC, name ASC`.
    pub fn parse(spec: &str) -> Result<Self, LifeError> {
        let criteria = spec
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(SortCriterion::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { criteria })
    }

    /// Build from order-by tokens as used by queries.
    pub fn from_order_by(tokens: &[String]) -> Result<Self, LifeError> {
        let criteria = tokens
            .iter()
            .map(|t| SortCriterion::parse(t))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { criteria })
    }

    pub fn criteria(&self) -> &[SortCriterion] {
        &self.criteria
    }

    pub fn compare(&self, a: &Node, b: &Node) -> Ordering {
        let n = self.criteria.len() as u64;
        let mut weight_a = 0u64;
        let mut weight_b = 0u64;
        for (i, criterion) in self.criteria.iter().enumerate() {
            let weight = (n - i as u64).pow(2);
            let mut ordering = compare_values(&criterion.sort_value(a), &criterion.sort_value(b));
            if criterion.direction == SortDirection::Desc {
                ordering = ordering.reverse();
            }
            match ordering {
                Ordering::Greater => weight_a += weight,
                Ordering::Less => weight_b += weight,
                Ordering::Equal => {}
            }
        }
        weight_a.cmp(&weight_b)
    }

    /// Sort nodes in place, stable.
    ///
    /// Nodes are ranked by their net wins against all others, so the result is
    /// well defined even when more than four criteria make [`ObjectComparator::compare`]
    /// cyclic. For transitive comparisons this is the order `compare` gives.
    pub fn sort<'n>(&self, nodes: &mut [&'n Node]) {
        let mut ranked: Vec<(i64, &'n Node)> = nodes
            .iter()
            .map(|&a| {
                let score = nodes
                    .iter()
                    .map(|b| match self.compare(a, b) {
                        Ordering::Greater => 1,
                        Ordering::Less => -1,
                        Ordering::Equal => 0,
                    })
                    .sum();
                (score, a)
            })
            .collect();
        ranked.sort_by_key(|(score, _)| *score);
        for (slot, (_, node)) in nodes.iter_mut().zip(ranked) {
            *slot = node;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid::ObjectId;

    fn node(type_name: &str, id: i64, name: &str) -> Node {
        let mut node = Node::new(ObjectId::from_int(type_name, id));
        node.set_value("name", Value::from(name.to_string()));
        node
    }

    fn names(nodes: &[&Node]) -> Vec<String> {
        nodes.iter().map(|n| n.display_value()).collect()
    }

    #[test]
    fn test_single_criterion() {
        let b = node("Page", 1, "b");
        let a = node("Page", 2, "a");
        let mut nodes = vec![&b, &a];
        ObjectComparator::parse("name ASC").unwrap().sort(&mut nodes);
        assert_eq!(names(&nodes), vec!["a", "b"]);
        ObjectComparator::parse("name DESC").unwrap().sort(&mut nodes);
        assert_eq!(names(&nodes), vec!["b", "a"]);
    }

    #[test]
    fn test_first_criterion_dominates() {
        let page_a = node("Page", 1, "a");
        let author_b = node("Author", 2, "b");
        let page_c = node("Page", 3, "c");
        let author_a = node("Author", 4, "a");
        let mut nodes = vec![&page_a, &author_b, &page_c, &author_a];
        ObjectComparator::parse("type DESC, name ASC").unwrap().sort(&mut nodes);
        assert_eq!(names(&nodes), vec!["a", "c", "a", "b"]);
        assert_eq!(nodes[0].type_name(), "Page");
        assert_eq!(nodes[2].type_name(), "Author");
    }

    #[test]
    fn test_nulls_and_numbers() {
        let mut first = Node::new(ObjectId::from_int("Page", 1));
        first.set_value("sortkey", Value::from(10i64));
        let mut second = Node::new(ObjectId::from_int("Page", 2));
        second.set_value("sortkey", Value::from(9i64));
        let third = Node::new(ObjectId::from_int("Page", 3));
        let mut nodes = vec![&first, &second, &third];
        ObjectComparator::parse("sortkey").unwrap().sort(&mut nodes);
        let ids: Vec<String> = nodes.iter().map(|n| n.oid().to_string()).collect();
        assert_eq!(ids, vec!["Page:3", "Page:2", "Page:1"]);
    }

    #[test]
    fn test_cyclic_comparison_sorts_deterministically() {
        let keyed = |id: i64, keys: [i64; 5]| {
            let mut node = Node::new(ObjectId::from_int("Page", id));
            for (i, key) in keys.iter().enumerate() {
                node.set_value(&format!("k{i}"), Value::from(*key));
            }
            node
        };
        let a = keyed(1, [0, 1, 1, 2, 0]);
        let b = keyed(2, [1, 2, 2, 0, 1]);
        let c = keyed(3, [2, 0, 0, 1, 2]);
        let d = keyed(4, [3, 3, 3, 3, 3]);
        let cmp = ObjectComparator::parse("k0, k1, k2, k3, k4").unwrap();
        assert_eq!(cmp.compare(&a, &b), Ordering::Less);
        assert_eq!(cmp.compare(&b, &c), Ordering::Less);
        assert_eq!(cmp.compare(&c, &a), Ordering::Less);

        let mut nodes = vec![&d, &c, &b, &a];
        cmp.sort(&mut nodes);
        let ids: Vec<String> = nodes.iter().map(|n| n.oid().to_string()).collect();
        assert_eq!(ids, vec!["Page:3", "Page:2", "Page:1", "Page:4"]);

        let mut again = vec![&d, &c, &b, &a];
        cmp.sort(&mut again);
        assert!(nodes.iter().zip(&again).all(|(x, y)| x.oid() == y.oid()));
    }

    #[test]
    fn test_property_fallback_and_parse_errors() {
        let mut a = Node::new(ObjectId::from_int("Page", 1));
        a.set_property("rank", Value::from(2i64));
        let mut b = Node::new(ObjectId::from_int("Page", 2));
        b.set_property("rank", Value::from(1i64));
        let cmp = ObjectComparator::parse("Page.rank").unwrap();
        assert_eq!(cmp.compare(&a, &b), Ordering::Greater);
        assert_eq!(cmp.criteria()[0].to_string(), "rank ASC");

        assert!(ObjectComparator::parse("name SIDEWAYS").is_err());
        assert_eq!(SortCriterion::parse("OID desc").unwrap().key, SortKey::Oid);
    }
}
