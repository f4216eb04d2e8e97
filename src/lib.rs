//! # Lifegraph
//!
//! Lazy-loading object graph and template-based query builder for tree-structured
//! content models.
//!
//! Persistent records are presented as [`Node`]s in a [`Transaction`], connected by
//! typed relations that are loaded on first access. Queries are expressed either as a
//! graph of template nodes ([`ObjectQuery`]) or as a condition string
//! ([`StringQuery`]), and compile to a single PostgreSQL `SELECT` built with `sea-query`.
//!
//! The crate does not talk to a database itself: objects come from an
//! [`loader::ObjectLoader`], statements run through an [`executor::StatementExecutor`].
//!
//! ## Features
//!
//! - `tracing` (default): spans around query building, execution and relation loading
//! - `metrics`: OpenTelemetry counters and histograms

pub mod authorization;
pub mod comparator;
pub mod config;
pub mod error;
pub mod executor;
pub mod loader;
pub mod metrics;
pub mod model;
pub mod node;
pub mod oid;
pub mod query;
pub mod transaction;
pub mod value;

#[cfg(test)]
mod test_helpers;

pub use config::GraphConfig;
pub use error::LifeError;
pub use loader::BuildDepth;
pub use node::Node;
pub use oid::ObjectId;
pub use query::{ObjectQuery, Query, StringQuery};
pub use transaction::Transaction;
