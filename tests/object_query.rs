mod common;

use std::sync::Arc;

use common::{book, book_row, registry, text, transaction, CannedExecutor};
use lifegraph::authorization::{Action, RuleAuthorizer};
use lifegraph::query::{Combine, Criterion, ObjectQuery, Operator, PagingInfo, Query, StatementCache};
use lifegraph::{BuildDepth, LifeError};
use sea_query::Value;

fn book_query() -> ObjectQuery {
    ObjectQuery::new("Book", registry()).unwrap()
}

#[test]
fn test_shelf_with_books_joins_children() {
    let mut query = ObjectQuery::new("Shelf", registry()).unwrap();
    let shelf = query.object_template("Shelf", None, Combine::And).unwrap();
    let book = query.object_template("Book", None, Combine::And).unwrap();
    query.add_node(&shelf, &book, Some("Book")).unwrap();
    query.set_value(&book, "year", Value::from(1935i64)).unwrap();

    let statement = query.build_query(&[], None).unwrap();
    assert!(
        statement
            .sql
            .contains("INNER JOIN \"book\" ON \"book\".\"fk_shelf_id\" = \"shelf\".\"id\""),
        "{}",
        statement.sql
    );
    assert!(statement.sql.contains("\"book\".\"year\" = $1"), "{}", statement.sql);
    assert!(statement.sql.ends_with("ORDER BY \"shelf\".\"pos\" ASC"), "{}", statement.sql);
    assert_eq!(statement.values, vec![Value::from(1935i64)]);
    assert!(statement.count_sql.is_none());
}

#[test]
fn test_authors_join_through_link_table() {
    let mut query = book_query();
    let book = query.object_template("Book", None, Combine::And).unwrap();
    let author = query.object_template("Person", None, Combine::And).unwrap();
    query.add_node(&book, &author, Some("Author")).unwrap();
    query.set_value(&author, "name", text("Agatha")).unwrap();

    let statement = query.build_query(&["title ASC".to_string()], None).unwrap();
    assert!(
        statement
            .sql
            .contains("INNER JOIN \"book_author\" ON \"book_author\".\"fk_book_id\" = \"book\".\"id\""),
        "{}",
        statement.sql
    );
    assert!(
        statement
            .sql
            .contains("INNER JOIN \"person\" ON \"person\".\"id\" = \"book_author\".\"fk_person_id\""),
        "{}",
        statement.sql
    );
    assert_eq!(statement.values, vec![text("%Agatha%")]);
}

#[test]
fn test_same_templates_build_same_statement() {
    let build = || {
        let mut query = book_query();
        let book = query.object_template("Book", None, Combine::And).unwrap();
        query.set_value(&book, "title", text("Night")).unwrap();
        query
            .set_criterion(&book, "year", Criterion::for_value(Operator::Ge, Value::from(1930i64)))
            .unwrap();
        query.build_query(&["year DESC".to_string()], None).unwrap()
    };
    assert_eq!(build(), build());
}

#[test]
fn test_group_is_parenthesized() {
    let mut query = book_query();
    let available = query.object_template("Book", None, Combine::And).unwrap();
    query.set_value(&available, "available", Value::from(true)).unwrap();

    let early = query.object_template("Book", None, Combine::And).unwrap();
    query
        .set_criterion(&early, "year", Criterion::for_value(Operator::Lt, Value::from(1930i64)))
        .unwrap();
    let late = query.object_template("Book", None, Combine::Or).unwrap();
    query
        .set_criterion(&late, "year", Criterion::for_value(Operator::Gt, Value::from(1940i64)))
        .unwrap();
    query.make_group(&[early, late], Combine::Or).unwrap();

    let condition = query.query_condition().unwrap().unwrap();
    assert_eq!(
        condition,
        "\"book\".\"available\" = TRUE AND (\"book\".\"year\" < 1930 OR \"book\".\"year\" > 1940)"
    );
}

#[test]
fn test_paging_fills_total_count() {
    let mut tx = transaction();
    let executor = CannedExecutor::new(vec![book_row(1, "Murder on the Links"), book_row(2, "Gaudy Night")]);
    let mut query = book_query();
    let book_template = query.object_template("Book", None, Combine::And).unwrap();
    query.set_value(&book_template, "year", Value::from(1923i64)).unwrap();

    let mut paging = PagingInfo::new(2).with_page(1);
    let result = query
        .execute(&mut tx, &executor, BuildDepth::Single, &[], Some(&mut paging))
        .unwrap();

    assert_eq!(result, vec![book(1), book(2)]);
    assert_eq!(paging.total_count, Some(2));
    assert_eq!(paging.page_count(), Some(1));

    let executed = executor.executed();
    assert_eq!(executed.len(), 2);
    assert!(executed[0].0.contains("COUNT(DISTINCT \"book\".\"id\")"), "{}", executed[0].0);
    assert_eq!(executed[0].1, vec![Value::from(1923i64)]);
    assert!(executed[1].0.contains("LIMIT"), "{}", executed[1].0);
}

#[test]
fn test_cached_statement_takes_new_values() {
    let cache = Arc::new(StatementCache::new(8));
    let run = |title: &str| {
        let mut query = book_query().with_query_id("books-by-title").with_cache(cache.clone());
        let book = query.object_template("Book", None, Combine::And).unwrap();
        query.set_value(&book, "title", text(title)).unwrap();
        query.build_query(&[], None).unwrap()
    };

    let first = run("Night");
    let second = run("Poems");
    assert_eq!(cache.len(), 1);
    assert_eq!(first.sql, second.sql);
    assert_eq!(first.values, vec![text("%Night%")]);
    assert_eq!(second.values, vec![text("%Poems%")]);
}

#[test]
fn test_results_respect_read_permissions() {
    let auth = RuleAuthorizer::new().deny_object(&book(2), Action::Read);
    let mut tx = transaction().with_authorizer(Arc::new(auth), "visitor");
    let executor = CannedExecutor::new(vec![book_row(1, "Murder on the Links"), book_row(2, "Gaudy Night")]);
    let mut query = book_query();
    query.object_template("Book", None, Combine::And).unwrap();

    let ids = query
        .execute(&mut tx, &executor, BuildDepth::Identifiers, &[], None)
        .unwrap();
    assert_eq!(ids, vec![book(1)]);
    assert!(!tx.contains(&book(1)));
    assert_eq!(tx.denied_reads(), &[book(2)]);

    let loaded = query
        .execute(&mut tx, &executor, BuildDepth::Single, &[], None)
        .unwrap();
    assert_eq!(loaded, vec![book(1)]);
    assert!(tx.contains(&book(1)));
}

#[test]
fn test_order_by_author_selects_sort_column() {
    let mut tx = transaction();
    // book 3 has two authors and comes back once per author
    let executor = CannedExecutor::new(vec![
        book_row(1, "Murder on the Links"),
        book_row(3, "Collected Poems"),
        book_row(2, "Gaudy Night"),
        book_row(3, "Collected Poems"),
    ]);
    let mut query = book_query();
    let book_template = query.object_template("Book", None, Combine::And).unwrap();
    let author = query.object_template("Person", None, Combine::And).unwrap();
    query.add_node(&book_template, &author, Some("Author")).unwrap();

    let order = vec!["Person.name ASC".to_string(), "title DESC".to_string()];
    let result = query
        .execute(&mut tx, &executor, BuildDepth::Single, &order, None)
        .unwrap();
    assert_eq!(result, vec![book(1), book(3), book(2)]);

    let executed = executor.executed();
    let sql = &executed[0].0;
    assert!(sql.starts_with("SELECT DISTINCT"), "{sql}");
    assert!(sql.contains("\"person\".\"name\" AS \"order_person_name\""), "{sql}");
    assert!(
        sql.ends_with("ORDER BY \"person\".\"name\" ASC, \"book\".\"title\" DESC"),
        "{sql}"
    );
}

#[test]
fn test_order_by_unknown_attribute() {
    let mut query = book_query();
    query.object_template("Book", None, Combine::And).unwrap();
    let err = query.build_query(&["colour DESC".to_string()], None).unwrap_err();
    assert!(matches!(err, LifeError::UnknownField { .. }));
}
