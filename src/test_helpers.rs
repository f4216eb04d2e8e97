//! Shared fixtures for unit tests: a small content model and its data.

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use sea_query::Value;

use crate::error::LifeError;
use crate::executor::{Row, StatementExecutor};
use crate::loader::InMemoryStore;
use crate::model::{
    AttributeDescription, AttributeType, Multiplicity, RelationDescription, StaticTypeRegistry, TypeDescription,
    TypeRegistry,
};
use crate::oid::ObjectId;
use crate::query::COUNT_COLUMN;
use crate::transaction::Transaction;

/// Authors, pages in a tree, documents shared between pages and images.
pub fn content_registry() -> StaticTypeRegistry {
    let fk = |name: &str| AttributeDescription::new(name, AttributeType::Integer);
    StaticTypeRegistry::builder()
        .add_type(
            TypeDescription::new("Author", "author")
                .with_attribute(AttributeDescription::new("name", AttributeType::String)),
        )
        .add_type(
            TypeDescription::new("Page", "page")
                .with_attribute(AttributeDescription::new("name", AttributeType::String))
                .with_attribute(AttributeDescription::new("sortkey", AttributeType::Integer))
                .with_attribute(AttributeDescription::new("created", AttributeType::Date))
                .with_attribute(fk("fk_author_id"))
                .with_attribute(fk("fk_page_id"))
                .with_default_order(&["sortkey ASC"]),
        )
        .add_type(
            TypeDescription::new("Document", "document")
                .with_attribute(AttributeDescription::new("title", AttributeType::String)),
        )
        .add_type(
            TypeDescription::new("Image", "image")
                .with_attribute(AttributeDescription::new("file", AttributeType::String))
                .with_attribute(fk("fk_page_id"))
                .with_attribute(fk("fk_titlepage_id"))
                .with_attribute(fk("fk_document_id")),
        )
        .add_relation(RelationDescription::one_to_many("Author", "Page", "fk_author_id"))
        .add_relation(RelationDescription::one_to_many("Page", "Page", "fk_page_id").with_roles("ParentPage", "ChildPage"))
        .add_relation(RelationDescription::many_to_many(
            "Page",
            "Document",
            "nm_page_document",
            "fk_page_id",
            "fk_document_id",
        ))
        .add_relation(RelationDescription::one_to_many("Page", "Image", "fk_page_id").with_roles("Page", "NormalImage"))
        .add_relation(
            RelationDescription::one_to_many("Page", "Image", "fk_titlepage_id").with_roles("TitlePage", "TitleImage"),
        )
        .add_relation(
            RelationDescription::one_to_many("Document", "Image", "fk_document_id")
                .with_roles("Document", "Attachment")
                .with_other_max(Multiplicity::Bounded(2)),
        )
        .build()
        .unwrap()
}

pub fn content_registry_arc() -> Arc<dyn TypeRegistry> {
    Arc::new(content_registry())
}

fn text(s: &str) -> Value {
    Value::from(s.to_string())
}

/// Store with two authors, four pages, two documents and three images.
///
/// ```text
/// Home (1) ── About (2) ── Team (4)
///          └─ Contact (3)
/// ```
pub fn content_store() -> Arc<InMemoryStore> {
    let mut store = InMemoryStore::new(content_registry_arc());

    let ingo = store.insert_values("Author", 1, &[("name", text("Ingo"))]).unwrap();
    let alice = store.insert_values("Author", 2, &[("name", text("Alice"))]).unwrap();

    let created = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let mut pages = Vec::new();
    for (id, name, sortkey, author, parent) in [
        (1, "Home", Some(1i64), 1i64, None),
        (2, "About", Some(2), 1, Some(1i64)),
        (3, "Contact", Some(3), 2, Some(1)),
        (4, "Team", None, 2, Some(2)),
    ] {
        let sortkey = sortkey.map_or(Value::BigInt(None), Value::from);
        let parent_value = parent.map_or(Value::BigInt(None), Value::from);
        let page = store
            .insert_values(
                "Page",
                id,
                &[
                    ("name", text(name)),
                    ("sortkey", sortkey),
                    ("created", Value::from(created)),
                    ("fk_author_id", Value::from(author)),
                    ("fk_page_id", parent_value),
                ],
            )
            .unwrap();
        pages.push(page);
    }

    store.link(&ingo, "Page", &pages[0]).unwrap();
    store.link(&ingo, "Page", &pages[1]).unwrap();
    store.link(&alice, "Page", &pages[2]).unwrap();
    store.link(&alice, "Page", &pages[3]).unwrap();
    store.link(&pages[0], "ChildPage", &pages[1]).unwrap();
    store.link(&pages[0], "ChildPage", &pages[2]).unwrap();
    store.link(&pages[1], "ChildPage", &pages[3]).unwrap();

    let manual = store.insert_values("Document", 1, &[("title", text("Manual"))]).unwrap();
    let guide = store.insert_values("Document", 2, &[("title", text("Guide"))]).unwrap();
    store.link(&pages[0], "Document", &manual).unwrap();
    store.link(&pages[1], "Document", &manual).unwrap();
    store.link(&pages[0], "Document", &guide).unwrap();

    let logo = store
        .insert_values("Image", 1, &[("file", text("logo.png")), ("fk_page_id", Value::from(1i64))])
        .unwrap();
    let banner = store
        .insert_values("Image", 2, &[("file", text("banner.png")), ("fk_titlepage_id", Value::from(1i64))])
        .unwrap();
    let scan = store
        .insert_values("Image", 3, &[("file", text("scan.png")), ("fk_document_id", Value::from(1i64))])
        .unwrap();
    store.link(&pages[0], "NormalImage", &logo).unwrap();
    store.link(&pages[0], "TitleImage", &banner).unwrap();
    store.link(&manual, "Attachment", &scan).unwrap();

    Arc::new(store)
}

pub fn content_transaction(store: Arc<InMemoryStore>) -> Transaction {
    Transaction::new(content_registry_arc()).with_loader(store)
}

/// Executor returning canned rows and recording the statements it was given.
pub struct RecordingExecutor {
    rows: Vec<Row>,
    count: Option<u64>,
    statements: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            count: None,
            statements: Mutex::new(Vec::new()),
        }
    }

    /// Answer count statements with `count`.
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

impl StatementExecutor for RecordingExecutor {
    fn query_all(&self, query: &str, _values: &[Value]) -> Result<Vec<Row>, LifeError> {
        self.statements.lock().unwrap().push(query.to_string());
        match self.count {
            Some(count) if query.contains(COUNT_COLUMN) => {
                let mut row = Row::new();
                row.insert(COUNT_COLUMN.to_string(), Value::from(count as i64));
                Ok(vec![row])
            }
            _ => Ok(self.rows.clone()),
        }
    }
}

/// A page row as the executor would return it.
pub fn page_row(id: i64, name: &str) -> Row {
    let mut row = Row::new();
    row.insert("id".to_string(), Value::from(id));
    row.insert("name".to_string(), text(name));
    row
}
