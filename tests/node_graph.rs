mod common;

use std::sync::Arc;

use common::{book, person, shelf, text, transaction};
use lifegraph::authorization::{Action, RuleAuthorizer};
use lifegraph::comparator::ObjectComparator;
use lifegraph::model::AggregationKind;
use lifegraph::node::{LoadState, NodeIterator, ObjectProxy, PersistentObject};
use lifegraph::{BuildDepth, LifeError, Transaction};

#[test]
fn test_relation_loads_once_as_proxies() {
    let mut tx = transaction();
    tx.resolve(&shelf(2)).unwrap();
    assert_eq!(tx.get(&shelf(2)).unwrap().load_state("Book"), LoadState::Uninitialized);

    let books = tx.relation_value(&shelf(2), "Book").unwrap();
    assert_eq!(books.oids(), vec![book(1), book(2)]);
    assert!(books.objects().iter().all(|b| b.is_proxy()));
    assert_eq!(tx.get(&shelf(2)).unwrap().load_state("Book"), LoadState::Initialized);

    tx.load_children(&shelf(2), Some("Book"), BuildDepth::Single).unwrap();
    let books = tx.relation_value(&shelf(2), "Book").unwrap();
    assert_eq!(books.len(), 2);
    assert!(books.objects().iter().all(|b| !b.is_proxy()));
    assert!(tx.contains(&book(2)));
}

#[test]
fn test_many_to_many_from_both_ends() {
    let mut tx = transaction();
    tx.resolve(&book(3)).unwrap();
    assert_eq!(tx.relation_value(&book(3), "Author").unwrap().oids(), vec![person(1), person(2)]);

    tx.resolve(&person(2)).unwrap();
    let written = tx.relation_value(&person(2), "WrittenBook").unwrap();
    assert_eq!(written.oids(), vec![book(2), book(3)]);
}

#[test]
fn test_new_objects_link_both_ways() {
    let mut tx = transaction();
    let new_shelf = tx.create("Shelf").unwrap();
    let new_book = tx.create("Book").unwrap();
    tx.add_node(&new_shelf, &new_book, None).unwrap();

    assert!(tx.relation_value(&new_shelf, "Book").unwrap().contains(&new_book));
    assert_eq!(tx.relation_value(&new_book, "Shelf").unwrap().oids(), vec![new_shelf.clone()]);
    assert_eq!(tx.new_objects(), vec![new_shelf, new_book]);
}

#[test]
fn test_bounded_role_rejects_overflow() {
    let mut tx = transaction();
    tx.resolve(&shelf(2)).unwrap();
    let extra = tx.create("Book").unwrap();
    tx.add_node(&shelf(2), &extra, Some("Book")).unwrap();

    let overflow = tx.create("Book").unwrap();
    let err = tx.add_node(&shelf(2), &overflow, Some("Book")).unwrap_err();
    assert!(err.is_argument_error());
    assert_eq!(tx.relation_value(&shelf(2), "Book").unwrap().len(), 3);
    assert!(tx.relation_value(&overflow, "Shelf").unwrap().is_empty());
}

#[test]
fn test_moving_a_book_updates_old_shelf() {
    let mut tx = transaction();
    tx.resolve(&shelf(2)).unwrap();
    tx.resolve(&shelf(3)).unwrap();
    tx.resolve(&book(1)).unwrap();
    tx.relation_value(&shelf(2), "Book").unwrap();

    tx.add_node(&book(1), &shelf(3), Some("Shelf")).unwrap();
    assert!(!tx.relation_value(&shelf(2), "Book").unwrap().contains(&book(1)));
    assert!(tx.relation_value(&shelf(3), "Book").unwrap().contains(&book(1)));
    assert!(tx.dirty_objects().contains(&book(1)));
}

#[test]
fn test_iterator_visits_shelf_tree() {
    let mut tx = transaction();
    let owned: Vec<String> = NodeIterator::new(&mut tx, &shelf(1))
        .with_aggregation_kinds(&[AggregationKind::Composite])
        .map(|oid| oid.unwrap().to_string())
        .collect();
    assert_eq!(owned, vec!["Shelf:1", "Shelf:2", "Book:1", "Book:2", "Shelf:3", "Book:3"]);

    // authors are shared between books and visited once
    let mut tx = transaction();
    let all: Vec<String> = NodeIterator::new(&mut tx, &shelf(1))
        .map(|oid| oid.unwrap().to_string())
        .collect();
    assert_eq!(
        all,
        vec!["Shelf:1", "Shelf:2", "Book:1", "Person:1", "Book:2", "Person:2", "Shelf:3", "Book:3"]
    );
}

#[test]
fn test_proxy_resolution_and_missing_objects() {
    let mut tx = transaction();
    let proxy = ObjectProxy::new(person(3));
    assert_eq!(proxy.value(&mut tx, "name").unwrap(), Some(text("Max")));
    assert!(tx.contains(&person(3)));

    let gone = ObjectProxy::new(person(99));
    assert!(matches!(gone.resolve(&mut tx), Err(LifeError::NotFound(_))));
}

#[test]
fn test_unreadable_objects_are_omitted() {
    let auth = RuleAuthorizer::new().deny_object(&book(2), Action::Read);
    let mut tx = transaction().with_authorizer(Arc::new(auth), "visitor");
    tx.resolve(&shelf(2)).unwrap();
    tx.load_children(&shelf(2), Some("Book"), BuildDepth::Single).unwrap();

    assert!(tx.contains(&book(1)));
    assert!(!tx.contains(&book(2)));
    assert_eq!(tx.denied_reads(), &[book(2)]);
}

#[test]
fn test_denied_create_is_fatal() {
    let auth = RuleAuthorizer::new().deny_type("Book", Action::Create);
    let mut tx = Transaction::new(common::registry()).with_authorizer(Arc::new(auth), "visitor");
    assert!(matches!(tx.create("Book"), Err(LifeError::AuthorizationFailed { .. })));
}

#[test]
fn test_sort_loaded_books() {
    let mut tx = transaction();
    for id in 1..=3 {
        tx.resolve(&book(id)).unwrap();
    }
    let comparator = ObjectComparator::parse("year DESC").unwrap();
    let mut books: Vec<_> = (1..=3).filter_map(|id| tx.get(&book(id))).collect();
    comparator.sort(&mut books);
    let titles: Vec<String> = books.iter().map(|b| b.display_value()).collect();
    assert_eq!(titles, vec!["Collected Poems", "Gaudy Night", "Murder on the Links"]);
}
