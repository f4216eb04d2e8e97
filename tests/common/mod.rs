//! Library model used by the integration tests.
//!
//! ```text
//! Fiction (1) ── Crime (2)
//!             └─ Poetry (3)
//! ```
//!
//! Books stand on shelves, have authors (many-to-many) and an editor. Both link a
//! book to a `Person`, so `Person` is ambiguous from `Book`.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use lifegraph::executor::{Row, StatementExecutor};
use lifegraph::loader::InMemoryStore;
use lifegraph::model::{StaticTypeRegistry, TypeRegistry};
use lifegraph::query::COUNT_COLUMN;
use lifegraph::{LifeError, ObjectId, Transaction};
use sea_query::Value;

pub fn registry() -> Arc<dyn TypeRegistry> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/library.json");
    Arc::new(StaticTypeRegistry::from_file(path).unwrap())
}

pub fn shelf(id: i64) -> ObjectId {
    ObjectId::from_int("Shelf", id)
}

pub fn book(id: i64) -> ObjectId {
    ObjectId::from_int("Book", id)
}

pub fn person(id: i64) -> ObjectId {
    ObjectId::from_int("Person", id)
}

pub fn text(s: &str) -> Value {
    Value::from(s.to_string())
}

pub fn store() -> Arc<InMemoryStore> {
    let mut store = InMemoryStore::new(registry());

    for (id, label, position) in [(1, "Fiction", 1i64), (2, "Crime", 2), (3, "Poetry", 3)] {
        store
            .insert_values("Shelf", id, &[("label", text(label)), ("position", Value::from(position))])
            .unwrap();
    }
    store.link(&shelf(1), "SubShelf", &shelf(2)).unwrap();
    store.link(&shelf(1), "SubShelf", &shelf(3)).unwrap();

    for (id, name) in [(1, "Agatha"), (2, "Dorothy"), (3, "Max")] {
        store.insert_values("Person", id, &[("name", text(name))]).unwrap();
    }

    for (id, title, year, shelf_id) in [
        (1, "Murder on the Links", 1923i64, 2i64),
        (2, "Gaudy Night", 1935, 2),
        (3, "Collected Poems", 1950, 3),
    ] {
        store
            .insert_values(
                "Book",
                id,
                &[
                    ("title", text(title)),
                    ("year", Value::from(year)),
                    ("available", Value::from(true)),
                    ("fk_shelf_id", Value::from(shelf_id)),
                ],
            )
            .unwrap();
        store.link(&shelf(shelf_id), "Book", &book(id)).unwrap();
    }
    store.link(&book(1), "Author", &person(1)).unwrap();
    store.link(&book(2), "Author", &person(2)).unwrap();
    store.link(&book(3), "Author", &person(1)).unwrap();
    store.link(&book(3), "Author", &person(2)).unwrap();
    store.link(&person(3), "EditedBook", &book(1)).unwrap();

    Arc::new(store)
}

pub fn transaction() -> Transaction {
    Transaction::new(registry()).with_loader(store())
}

/// Executor answering every statement with the same rows.
pub struct CannedExecutor {
    rows: Vec<Row>,
    total: u64,
    log: Mutex<Vec<(String, Vec<Value>)>>,
}

impl CannedExecutor {
    pub fn new(rows: Vec<Row>) -> Self {
        let total = rows.len() as u64;
        Self {
            rows,
            total,
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn executed(&self) -> Vec<(String, Vec<Value>)> {
        self.log.lock().unwrap().clone()
    }
}

impl StatementExecutor for CannedExecutor {
    fn query_all(&self, query: &str, values: &[Value]) -> Result<Vec<Row>, LifeError> {
        self.log.lock().unwrap().push((query.to_string(), values.to_vec()));
        if query.contains(COUNT_COLUMN) {
            let mut row = Row::new();
            row.insert(COUNT_COLUMN.to_string(), Value::from(self.total as i64));
            return Ok(vec![row]);
        }
        Ok(self.rows.clone())
    }
}

pub fn book_row(id: i64, title: &str) -> Row {
    let mut row = Row::new();
    row.insert("id".to_string(), Value::from(id));
    row.insert("title".to_string(), text(title));
    row
}
