//! `StringQuery` - queries from condition strings.
//!
//! A condition such as
//!
//! ```text
//! name LIKE '%Home%' AND (Author.name = 'Ingo' OR TitleImage.file IS NOT NULL)
//! ```
//!
//! references attributes of the queried type directly and attributes of related
//! types through a type or role qualifier. Each qualifier is resolved to the shortest
//! relation path from the queried type; a chain of templates along that path makes
//! the object query join the tables in between.

mod lexer;
mod parser;
mod paths;
mod rql;

use std::collections::HashMap;
use std::sync::Arc;

use sea_query::Value;

use self::parser::{FieldRef, Literal, Parsed, Rhs};
use super::{BuiltStatement, Combine, ConditionExpr, ObjectQuery, Operand, Operator, PagingInfo, Query, StatementCache, TemplateColumn};
use crate::config::GraphConfig;
use crate::error::LifeError;
use crate::model::{AttributeType, TypeRegistry};
use crate::oid::ObjectId;
use crate::value::{null, parse_literal};

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Condition dialect of a [`StringQuery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConditionSyntax {
    /// `Type.attribute OPERATOR value` comparisons joined by `AND`, `OR` and `NOT`
    #[default]
    Sql,
    /// RQL: `attribute=op=value` or `op(attribute,value)` joined by `&` and `|`
    Rql,
}

/// An [`ObjectQuery`] whose templates are derived from a condition string.
pub struct StringQuery {
    root_type: String,
    registry: Arc<dyn TypeRegistry>,
    query_id: String,
    cache: Option<Arc<StatementCache>>,
    config: GraphConfig,
    condition: Option<String>,
    inner: ObjectQuery,
}

impl StringQuery {
    pub fn new(root_type: &str, registry: Arc<dyn TypeRegistry>) -> Result<Self, LifeError> {
        let inner = ObjectQuery::new(root_type, registry.clone())?;
        Ok(Self {
            root_type: root_type.to_string(),
            query_id: inner.query_id().to_string(),
            registry,
            cache: None,
            config: GraphConfig::default(),
            condition: None,
            inner,
        })
    }

    #[must_use]
    pub fn with_query_id(mut self, query_id: &str) -> Self {
        self.query_id = query_id.to_string();
        self.inner = self.inner.with_query_id(query_id);
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<StatementCache>) -> Self {
        self.inner = self.inner.with_cache(cache.clone());
        self.cache = Some(cache);
        self
    }

    /// Path lengths are limited by `max_relation_path_length`.
    #[must_use]
    pub fn with_config(mut self, config: GraphConfig) -> Self {
        self.inner = self.inner.with_config(config.clone());
        self.config = config;
        self
    }

    /// Replace the query condition.
    ///
    /// # Errors
    ///
    /// `LifeError::Parse` for malformed conditions and literals that do not fit their
    /// attribute, `LifeError::UnknownField` for unknown attributes and
    /// `LifeError::Ambiguous` when a qualifier can be reached by several paths of the
    /// same length.
    pub fn set_condition(&mut self, condition: &str, syntax: ConditionSyntax) -> Result<(), LifeError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::parse_condition_span(&self.root_type, condition).entered();

        let text = match syntax {
            ConditionSyntax::Sql => condition.to_string(),
            ConditionSyntax::Rql => rql::rewrite(condition)?,
        };
        let parsed = parser::parse(&text)?;

        let mut query = self.fresh_query()?;
        let root = query.object_template(&self.root_type, None, Combine::And)?;
        let expr = match &parsed {
            Some(parsed) => {
                let mut compiler = Compiler {
                    registry: self.registry.as_ref(),
                    query: &mut query,
                    root_type: &self.root_type,
                    root,
                    chains: HashMap::new(),
                    max_path_length: self.config.max_relation_path_length,
                };
                Some(compiler.compile(parsed)?)
            }
            None => None,
        };
        if let Some(expr) = &expr {
            log::debug!("Condition for {}: {expr}", self.root_type);
        }
        query.set_condition(expr);

        self.inner = query;
        self.condition = Some(text).filter(|t| !t.trim().is_empty());
        Ok(())
    }

    /// Shorthand for [`StringQuery::set_condition`] with [`ConditionSyntax::Rql`].
    pub fn set_rql(&mut self, condition: &str) -> Result<(), LifeError> {
        self.set_condition(condition, ConditionSyntax::Rql)
    }

    /// The condition in its SQL-like form, after RQL rewriting.
    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    /// The object query the condition was compiled into.
    pub fn object_query(&self) -> &ObjectQuery {
        &self.inner
    }

    pub fn query_condition(&self) -> Result<Option<String>, LifeError> {
        self.inner.query_condition()
    }

    pub fn last_statement(&self) -> Option<&BuiltStatement> {
        self.inner.last_statement()
    }

    fn fresh_query(&self) -> Result<ObjectQuery, LifeError> {
        let mut query = ObjectQuery::new(&self.root_type, self.registry.clone())?
            .with_query_id(&self.query_id)
            .with_config(self.config.clone());
        if let Some(cache) = &self.cache {
            query = query.with_cache(cache.clone());
        }
        Ok(query)
    }
}

impl Query for StringQuery {
    fn root_type(&self) -> &str {
        &self.root_type
    }

    fn build_query(&mut self, order_by: &[String], paging: Option<&PagingInfo>) -> Result<BuiltStatement, LifeError> {
        self.inner.build_query(order_by, paging)
    }
}

struct Compiler<'a> {
    registry: &'a dyn TypeRegistry,
    query: &'a mut ObjectQuery,
    root_type: &'a str,
    root: ObjectId,
    /// Templates by the roles leading to them from the root template
    chains: HashMap<Vec<String>, ObjectId>,
    max_path_length: usize,
}

impl Compiler<'_> {
    fn compile(&mut self, parsed: &Parsed) -> Result<ConditionExpr, LifeError> {
        match parsed {
            Parsed::And(items) => Ok(ConditionExpr::And(self.compile_all(items)?)),
            Parsed::Or(items) => Ok(ConditionExpr::Or(self.compile_all(items)?)),
            Parsed::Not(inner) => Ok(ConditionExpr::Not(Box::new(self.compile(inner)?))),
            Parsed::Compare { field, operator, rhs } => {
                let (column, attr_type) = self.resolve(field)?;
                let operand = match rhs {
                    Rhs::None => Operand::None,
                    Rhs::Literal(literal) => Operand::Value(typed_value(literal, attr_type, *operator)?),
                    Rhs::List(items) => Operand::List(
                        items
                            .iter()
                            .map(|literal| typed_value(literal, attr_type, *operator))
                            .collect::<Result<_, _>>()?,
                    ),
                    Rhs::Field(other) => Operand::Column(self.resolve(other)?.0),
                };
                Ok(ConditionExpr::Compare {
                    column,
                    operator: *operator,
                    operand,
                })
            }
        }
    }

    fn compile_all(&mut self, items: &[Parsed]) -> Result<Vec<ConditionExpr>, LifeError> {
        items.iter().map(|item| self.compile(item)).collect()
    }

    /// The template column a field refers to, with the attribute's type.
    fn resolve(&mut self, field: &FieldRef) -> Result<(TemplateColumn, AttributeType), LifeError> {
        let template = match field.qualifier.as_deref() {
            None => self.root.clone(),
            Some(qualifier) if qualifier == self.root_type => self.root.clone(),
            Some(qualifier) => self.template_for(qualifier)?,
        };
        let type_desc = self.registry.get(template.type_name())?;
        let attribute = type_desc.attribute(&field.attribute).ok_or_else(|| {
            let qualifier = field.qualifier.as_deref().unwrap_or(self.root_type);
            LifeError::unknown_field(format!("{qualifier}.{}", field.attribute))
        })?;
        Ok((
            TemplateColumn {
                template,
                attribute: attribute.name.clone(),
            },
            attribute.attr_type,
        ))
    }

    /// The last template of the chain along the path to `qualifier`, created as needed.
    fn template_for(&mut self, qualifier: &str) -> Result<ObjectId, LifeError> {
        let path = paths::shortest_path(self.registry, self.root_type, qualifier, self.max_path_length)?;

        let mut current = self.root.clone();
        let mut roles = Vec::with_capacity(path.len());
        for relation in path {
            roles.push(relation.other_role.clone());
            current = match self.chains.get(&roles) {
                Some(existing) => existing.clone(),
                None => {
                    let template = self.query.object_template(&relation.other_type, None, Combine::And)?;
                    self.query.add_node(&current, &template, Some(&relation.other_role))?;
                    log::trace!("Joining {} via {}", relation.other_type, roles.join("."));
                    self.chains.insert(roles.clone(), template.clone());
                    template
                }
            };
        }
        Ok(current)
    }
}

/// Convert a literal for an attribute of `attr_type`. Pattern operators keep strings.
fn typed_value(literal: &Literal, attr_type: AttributeType, operator: Operator) -> Result<Value, LifeError> {
    let pattern = matches!(operator, Operator::Like | Operator::NotLike | Operator::Regexp);
    match literal {
        Literal::Null => Ok(null()),
        Literal::Str(text) | Literal::Number(text) if pattern => Ok(Value::from(text.clone())),
        Literal::Str(text) | Literal::Number(text) => parse_literal(text, attr_type),
        Literal::Bool(flag) => parse_literal(&flag.to_string(), attr_type),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::content_registry_arc;
    use sea_query::Value;

    fn page_query(condition: &str) -> Result<StringQuery, LifeError> {
        let mut query = StringQuery::new("Page", content_registry_arc())?;
        query.set_condition(condition, ConditionSyntax::Sql)?;
        Ok(query)
    }

    fn sql(query: &mut StringQuery) -> String {
        query.build_query(&["name ASC".to_string()], None).unwrap().sql
    }

    #[test]
    fn test_root_attributes() {
        let mut query = page_query("Page.name = 'Home' OR sortkey > 2").unwrap();
        let statement = query.build_query(&[], None).unwrap();
        let sql = &statement.sql;
        assert!(sql.starts_with(r#"SELECT DISTINCT "page"."id", "page"."name""#), "{sql}");
        assert!(!sql.contains("JOIN"), "{sql}");
        assert!(
            sql.ends_with(r#"WHERE "page"."name" = $1 OR "page"."sortkey" > $2 ORDER BY "page"."sortkey" ASC"#),
            "{sql}"
        );
        assert_eq!(statement.values, vec![Value::from("Home".to_string()), Value::from(2i64)]);
        assert_eq!(query.object_query().template_ids().len(), 1);
    }

    #[test]
    fn test_related_type_joins() {
        let mut query = page_query("Author.name = 'Ingo'").unwrap();
        let sql = sql(&mut query);
        assert!(sql.contains(r#"INNER JOIN "author" ON "page"."fk_author_id" = "author"."id""#), "{sql}");
        assert!(sql.contains(r#"WHERE "author"."name" = $1"#), "{sql}");
    }

    #[test]
    fn test_role_qualifier_self_join() {
        let mut query = page_query("ParentPage.name = 'Home'").unwrap();
        let sql = sql(&mut query);
        assert!(sql.contains(r#"INNER JOIN "page" AS "page_1" ON "page"."fk_page_id" = "page_1"."id""#), "{sql}");
        assert!(sql.contains(r#""page_1"."name" = $1"#), "{sql}");
    }

    #[test]
    fn test_chain_is_shared() {
        let query = page_query("Author.name = 'Ingo' OR Author.name = 'Alice'").unwrap();
        assert_eq!(query.object_query().template_ids().len(), 2);
    }

    #[test]
    fn test_ambiguous_type() {
        let err = page_query("Image.file = 'logo.png'").err().unwrap();
        assert!(matches!(err, LifeError::Ambiguous(_)));
        assert!(page_query("NormalImage.file = 'logo.png'").is_ok());
    }

    #[test]
    fn test_unknown_attribute() {
        let err = page_query("Author.colour = 'red'").err().unwrap();
        assert!(matches!(err, LifeError::UnknownField { ref field, .. } if field == "Author.colour"));
    }

    #[test]
    fn test_literal_types() {
        assert!(matches!(page_query("sortkey = 'x'"), Err(LifeError::Parse(_))));
        let query = page_query("sortkey IN ('1', 2) AND name LIKE '1%'").unwrap();
        let values = query.object_query().condition.as_ref().unwrap().bound_values();
        assert_eq!(
            values,
            vec![Value::from(1i64), Value::from(2i64), Value::from("1%".to_string())]
        );
    }

    #[test]
    fn test_rql() {
        let mut query = StringQuery::new("Page", content_registry_arc()).unwrap();
        query.set_rql("name=match=*om*&Author.name=eq=Ingo").unwrap();
        assert_eq!(query.condition(), Some("name LIKE '%om%' AND Author.name = 'Ingo'"));
        assert_eq!(
            query.query_condition().unwrap().unwrap(),
            r#""page"."name" LIKE '%om%' AND "author"."name" = 'Ingo'"#
        );
    }

    #[test]
    fn test_condition_replaces_templates() {
        let mut query = page_query("Author.name = 'Ingo'").unwrap();
        query.set_condition("name = 'Home'", ConditionSyntax::Sql).unwrap();
        assert_eq!(query.object_query().template_ids().len(), 1);
        query.set_condition("", ConditionSyntax::Sql).unwrap();
        assert_eq!(query.condition(), None);
        assert_eq!(query.query_condition().unwrap(), None);
    }
}
