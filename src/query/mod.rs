//! Query building and execution.
//!
//! Two builders share the [`Query`] pipeline (build, execute, authorize, hydrate):
//!
//! - [`ObjectQuery`] derives a statement from a graph of template nodes. Criteria set on
//!   a template restrict its type; linking templates through relations adds joins.
//! - [`StringQuery`] parses a textual or RQL condition and synthesizes the template
//!   graph the referenced types need.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use lifegraph::query::{Combine, ObjectQuery, Query};
//! use lifegraph::model::TypeRegistry;
//! use sea_query::Value;
//!
//! # fn run(registry: Arc<dyn TypeRegistry>) -> Result<(), lifegraph::LifeError> {
//! let mut query = ObjectQuery::new("Page", registry)?;
//! let page = query.object_template("Page", None, Combine::And)?;
//! query.set_value(&page, "name", Value::from("About".to_string()))?;
//! let statement = query.build_query(&["name ASC".to_string()], None)?;
//! println!("{}", statement.sql);
//! # Ok(())
//! # }
//! ```

mod builder;
mod cache;
mod condition;
mod criteria;
mod object_query;
pub mod string_query;

pub use cache::{CachedStatement, ParamKey, StatementCache};
pub use condition::ConditionExpr;
pub use criteria::{like_matches, Combine, Criterion, Operand, Operator, TemplateColumn};
pub use object_query::ObjectQuery;
pub use string_query::StringQuery;

use std::collections::HashSet;
use std::time::Instant;

use sea_query::Value;

use crate::authorization::Action;
use crate::config::GraphConfig;
use crate::error::LifeError;
use crate::executor::{count_from_row, StatementExecutor};
use crate::loader::BuildDepth;
use crate::node::Node;
use crate::oid::ObjectId;
use crate::transaction::Transaction;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Column alias of the row count in count statements.
pub const COUNT_COLUMN: &str = "nRows";

/// Page selection for query results. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingInfo {
    pub page_size: u64,
    pub page: u64,
    /// Total number of matching objects, filled in by query execution
    pub total_count: Option<u64>,
}

impl PagingInfo {
    pub fn new(page_size: u64) -> Self {
        Self {
            page_size,
            page: 1,
            total_count: None,
        }
    }

    /// First page with the configured default page size.
    pub fn from_config(config: &GraphConfig) -> Self {
        Self::new(config.default_page_size)
    }

    #[must_use]
    pub fn with_page(mut self, page: u64) -> Self {
        self.page = page.max(1);
        self
    }

    /// Number of objects skipped before this page.
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }

    /// Number of pages, once the total count is known.
    pub fn page_count(&self) -> Option<u64> {
        let total = self.total_count?;
        if self.page_size == 0 {
            return Some(0);
        }
        Some(total.div_ceil(self.page_size))
    }
}

/// A statement ready for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltStatement {
    pub sql: String,
    pub values: Vec<Value>,
    /// Statement counting all matches, present when paging was requested
    pub count_sql: Option<String>,
    pub count_values: Vec<Value>,
}

/// Shared pipeline of the query builders.
pub trait Query {
    /// Type of the objects the query returns.
    fn root_type(&self) -> &str;

    /// Build the statement for the current query state.
    ///
    /// # Arguments
    ///
    /// * `order_by` - `attribute [ASC|DESC]` tokens, optionally qualified with a type;
    ///   the root type's default order is used when empty
    /// * `paging` - Page to select; adds `LIMIT`/`OFFSET` and a count statement
    ///
    /// # Errors
    ///
    /// Returns `LifeError::UnknownField` for order-by attributes no queried type has,
    /// and argument errors for inconsistent templates.
    fn build_query(&mut self, order_by: &[String], paging: Option<&PagingInfo>) -> Result<BuiltStatement, LifeError>;

    /// Build and run the query, attaching the results to `tx`.
    ///
    /// Objects the transaction's context may not read are left out silently. With
    /// `BuildDepth::Identifiers` the results are not attached; otherwise they are
    /// hydrated to `depth`. When paging is given, its `total_count` is filled in.
    ///
    /// # Returns
    ///
    /// The ids of the matching objects in statement order.
    fn execute(
        &mut self,
        tx: &mut Transaction,
        executor: &dyn StatementExecutor,
        depth: BuildDepth,
        order_by: &[String],
        paging: Option<&mut PagingInfo>,
    ) -> Result<Vec<ObjectId>, LifeError> {
        let statement = self.build_query(order_by, paging.as_deref())?;
        execute_statement(self.root_type(), &statement, tx, executor, depth, paging)
    }
}

/// Run a built statement and attach the authorized results.
pub(crate) fn execute_statement(
    root_type: &str,
    statement: &BuiltStatement,
    tx: &mut Transaction,
    executor: &dyn StatementExecutor,
    depth: BuildDepth,
    paging: Option<&mut PagingInfo>,
) -> Result<Vec<ObjectId>, LifeError> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::execute_query_span(&statement.sql).entered();
    let started = Instant::now();

    if let (Some(paging), Some(count_sql)) = (paging, &statement.count_sql) {
        let row = executor.query_one(count_sql, &statement.count_values)?;
        paging.total_count = Some(count_from_row(&row, COUNT_COLUMN)?);
    }

    let rows = executor.query_all(&statement.sql, &statement.values)?;
    let registry = tx.registry.clone();
    let type_desc = registry.get(root_type)?;

    let mut result = Vec::with_capacity(rows.len());
    for row in &rows {
        let node = Node::from_row(type_desc, row)?;
        if depth == BuildDepth::Identifiers {
            let oid = node.oid().clone();
            if tx.is_authorized(&oid, Action::Read) {
                result.push(oid);
            } else {
                tx.deny_read(&oid);
            }
        } else if let Some(oid) = tx.attach_loaded(node) {
            result.push(oid);
        }
    }
    // rows repeat when ordering by a column of a to-many join
    let mut seen = HashSet::new();
    result.retain(|oid| seen.insert(oid.clone()));

    if depth != BuildDepth::Identifiers {
        tx.hydrate(&result, depth)?;
    }

    log::debug!(
        "Query on {root_type} returned {} of {} rows in {:?}",
        result.len(),
        rows.len(),
        started.elapsed()
    );
    #[cfg(feature = "metrics")]
    METRICS.record_query_duration(started.elapsed());

    Ok(result)
}
