//! Statement cache shared by object queries.
//!
//! A query rebuilt with the same id and the same shape (templates, links, criteria
//! operators, order and paging, but not values) reuses the rendered SQL. The cached
//! parameter keys say where each placeholder takes its value from, so only the values
//! are collected again.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Source of a bound parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamKey {
    /// Value `index` of the criterion on `attribute` of the template created `template`-th
    Template {
        template: usize,
        attribute: String,
        index: usize,
    },
    /// Value `index` of the parsed query condition
    Condition { index: usize },
    Limit,
    Offset,
}

/// A rendered statement with the position order of its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedStatement {
    /// Fingerprint of the query shape the statement was rendered for
    pub signature: String,
    pub sql: String,
    pub keys: Vec<ParamKey>,
    pub count_sql: Option<String>,
    pub count_keys: Vec<ParamKey>,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, CachedStatement>,
    order: VecDeque<String>,
}

/// Statements keyed by query id. The oldest entry is evicted at capacity.
#[derive(Debug)]
pub struct StatementCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl StatementCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// The cached statement for `query_id` if it was rendered for `signature`.
    pub fn get(&self, query_id: &str, signature: &str) -> Option<CachedStatement> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .entries
            .get(query_id)
            .filter(|entry| entry.signature == signature)
            .cloned()
    }

    pub fn insert(&self, query_id: &str, statement: CachedStatement) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.entries.insert(query_id.to_string(), statement).is_none() {
            inner.order.push_back(query_id.to_string());
        }
        while inner.order.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                log::trace!("Evicting statement '{evicted}'");
                inner.entries.remove(&evicted);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.clear();
        inner.order.clear();
    }
}
