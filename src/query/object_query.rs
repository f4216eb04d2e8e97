//! `ObjectQuery` - statements built from a graph of template nodes.

use std::collections::HashMap;
use std::sync::Arc;

use sea_query::{Expr, PostgresQueryBuilder, Query as SqlQuery, Value};
use sha2::{Digest, Sha256};

use super::builder::{render, Rendered};
use super::cache::{CachedStatement, ParamKey, StatementCache};
use super::condition::ConditionExpr;
use super::criteria::{Combine, Criterion, Operand, Operator, TemplateColumn};
use super::{BuiltStatement, PagingInfo, Query};
use crate::config::GraphConfig;
use crate::error::LifeError;
use crate::model::{AttributeDescription, TypeRegistry};
use crate::node::Node;
use crate::oid::ObjectId;
use crate::transaction::Transaction;
use crate::value::is_null;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

#[derive(Debug, Clone, Default)]
pub(crate) struct TemplateInfo {
    pub(crate) alias: Option<String>,
    pub(crate) combine: Combine,
}

#[derive(Debug, Clone)]
pub(crate) struct TemplateGroup {
    pub(crate) members: Vec<ObjectId>,
    pub(crate) combine: Combine,
}

/// Builds a `SELECT` for objects of one type from template nodes.
///
/// Each template stands for one aliased table in the statement. Criteria on a
/// template's attributes restrict it, relations between templates become joins.
/// Templates live in a transaction owned by the query, so they never mix with the
/// objects of a unit of work.
///
/// Templates of the root type share the root table alias. Every other template gets
/// its explicit alias, else the table name, else the table name with a counter
/// suffix.
pub struct ObjectQuery {
    root_type: String,
    query_id: String,
    registry: Arc<dyn TypeRegistry>,
    pub(crate) templates: Transaction,
    pub(crate) infos: HashMap<ObjectId, TemplateInfo>,
    pub(crate) criteria: HashMap<ObjectId, Vec<Criterion>>,
    pub(crate) groups: Vec<TemplateGroup>,
    pub(crate) condition: Option<ConditionExpr>,
    cache: Option<Arc<StatementCache>>,
    config: GraphConfig,
    last_statement: Option<BuiltStatement>,
}

impl ObjectQuery {
    /// A query returning objects of `root_type`. The query id defaults to the type name.
    pub fn new(root_type: &str, registry: Arc<dyn TypeRegistry>) -> Result<Self, LifeError> {
        registry.get(root_type)?;
        Ok(Self {
            root_type: root_type.to_string(),
            query_id: root_type.to_string(),
            templates: Transaction::new(registry.clone()),
            registry,
            infos: HashMap::new(),
            criteria: HashMap::new(),
            groups: Vec::new(),
            condition: None,
            cache: None,
            config: GraphConfig::default(),
            last_statement: None,
        })
    }

    /// Id under which the rendered statement is cached.
    #[must_use]
    pub fn with_query_id(mut self, query_id: &str) -> Self {
        self.query_id = query_id.to_string();
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<StatementCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: GraphConfig) -> Self {
        self.config = config;
        self
    }

    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    pub fn registry(&self) -> &dyn TypeRegistry {
        self.registry.as_ref()
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Create a template of `type_name`.
    ///
    /// # Arguments
    ///
    /// * `alias` - Table alias to use for the template in the statement
    /// * `combine` - How the template's conditions combine with those before it
    pub fn object_template(&mut self, type_name: &str, alias: Option<&str>, combine: Combine) -> Result<ObjectId, LifeError> {
        if let Some(alias) = alias {
            if self.infos.values().any(|i| i.alias.as_deref() == Some(alias)) {
                return Err(LifeError::InvalidArgument(format!("Alias '{alias}' is used by another template")));
            }
        }
        let oid = self.templates.create(type_name)?;
        self.infos.insert(
            oid.clone(),
            TemplateInfo {
                alias: alias.map(str::to_string),
                combine,
            },
        );
        Ok(oid)
    }

    pub fn template(&self, oid: &ObjectId) -> Option<&Node> {
        self.templates.get(oid)
    }

    /// Template ids in creation order.
    pub fn template_ids(&self) -> &[ObjectId] {
        self.templates.object_ids()
    }

    fn template_attribute(&self, template: &ObjectId, attribute: &str) -> Result<&AttributeDescription, LifeError> {
        if !self.infos.contains_key(template) {
            return Err(LifeError::InvalidArgument(format!("{template} is not a template of this query")));
        }
        self.registry
            .get(template.type_name())?
            .attribute(attribute)
            .ok_or_else(|| LifeError::unknown_field(format!("{}.{attribute}", template.type_name())))
    }

    /// Restrict a template attribute to a literal value.
    ///
    /// Strings match as a substring (`LIKE '%value%'`), primary keys and other values
    /// by equality. `NULL` removes the restriction.
    pub fn set_value(&mut self, template: &ObjectId, attribute: &str, value: Value) -> Result<(), LifeError> {
        let attr = self.template_attribute(template, attribute)?;
        let is_pk = attr.is_primary_key;

        self.templates.node_mut(template)?.set_value(attribute, value.clone());
        if is_null(&value) {
            self.remove_criterion(template, attribute);
            return Ok(());
        }

        let criterion = match &value {
            Value::String(Some(s)) if !is_pk => Criterion::new(
                template.type_name(),
                attribute,
                Operator::Like,
                Value::from(format!("%{s}%")),
            ),
            _ => Criterion::new(template.type_name(), attribute, Operator::Eq, value),
        };
        self.put_criterion(template, criterion);
        Ok(())
    }

    /// Restrict a template attribute with an explicit criterion.
    ///
    /// The criterion's type and attribute are taken from the template.
    pub fn set_criterion(&mut self, template: &ObjectId, attribute: &str, mut criterion: Criterion) -> Result<(), LifeError> {
        self.template_attribute(template, attribute)?;
        if let Operand::Column(column) = &criterion.operand {
            if !self.infos.contains_key(&column.template) {
                return Err(LifeError::InvalidArgument(format!(
                    "{} is not a template of this query",
                    column.template
                )));
            }
        }
        criterion.type_name = template.type_name().to_string();
        criterion.attribute = attribute.to_string();
        if let Operand::Value(value) = &criterion.operand {
            self.templates.node_mut(template)?.set_value(attribute, value.clone());
        }
        self.put_criterion(template, criterion);
        Ok(())
    }

    fn put_criterion(&mut self, template: &ObjectId, criterion: Criterion) {
        log::trace!("Template {template}: {criterion}");
        let list = self.criteria.entry(template.clone()).or_default();
        match list.iter_mut().find(|c| c.attribute == criterion.attribute) {
            Some(existing) => *existing = criterion,
            None => list.push(criterion),
        }
    }

    pub fn remove_criterion(&mut self, template: &ObjectId, attribute: &str) -> Option<Criterion> {
        let list = self.criteria.get_mut(template)?;
        let position = list.iter().position(|c| c.attribute == attribute)?;
        Some(list.remove(position))
    }

    /// Criteria of a template in the order they were set.
    pub fn criteria(&self, template: &ObjectId) -> &[Criterion] {
        self.criteria.get(template).map_or(&[], Vec::as_slice)
    }

    /// Link two templates through a relation. The query joins their tables.
    pub fn add_node(&mut self, parent: &ObjectId, child: &ObjectId, role: Option<&str>) -> Result<(), LifeError> {
        for oid in [parent, child] {
            if !self.infos.contains_key(oid) {
                return Err(LifeError::InvalidArgument(format!("{oid} is not a template of this query")));
            }
        }
        self.templates.add_node(parent, child, role)?;
        Ok(())
    }

    pub fn delete_node(&mut self, parent: &ObjectId, child: &ObjectId, role: Option<&str>) -> Result<(), LifeError> {
        self.templates.delete_node(parent, child, role)?;
        Ok(())
    }

    /// Combine the conditions of `members` with `combine` into one parenthesized unit.
    ///
    /// The unit combines with the conditions before it by the first member's combine
    /// operator.
    ///
    /// # Errors
    ///
    /// Returns `LifeError::InvalidArgument` for an empty group, for ids that are not
    /// templates of this query and for templates that are in a group already.
    pub fn make_group(&mut self, members: &[ObjectId], combine: Combine) -> Result<(), LifeError> {
        if members.is_empty() {
            return Err(LifeError::InvalidArgument("A group needs at least one template".to_string()));
        }
        for member in members {
            if !self.infos.contains_key(member) {
                return Err(LifeError::InvalidArgument(format!("{member} is not a template of this query")));
            }
            if self.is_grouped(member) {
                return Err(LifeError::InvalidArgument(format!("{member} is in a group already")));
            }
        }
        self.groups.push(TemplateGroup {
            members: members.to_vec(),
            combine,
        });
        Ok(())
    }

    pub fn is_grouped(&self, template: &ObjectId) -> bool {
        self.groups.iter().any(|g| g.members.contains(template))
    }

    pub(crate) fn template_combine(&self, template: &ObjectId) -> Combine {
        self.infos.get(template).map(|i| i.combine).unwrap_or_default()
    }

    /// Add a parsed condition, ANDed with the template criteria.
    pub(crate) fn set_condition(&mut self, condition: Option<ConditionExpr>) {
        self.condition = condition;
    }

    /// The statement of the last `build_query` call.
    pub fn last_statement(&self) -> Option<&BuiltStatement> {
        self.last_statement.as_ref()
    }

    /// The `WHERE` clause of the current query with inlined values, `None` if the query
    /// has no conditions.
    pub fn query_condition(&self) -> Result<Option<String>, LifeError> {
        let rendered = render(self, &[], None)?;
        Ok(rendered.condition.map(|condition| {
            let sql = SqlQuery::select()
                .expr(Expr::val(1))
                .cond_where(condition)
                .to_string(PostgresQueryBuilder);
            sql.split_once(" WHERE ")
                .map(|(_, clause)| clause.to_string())
                .unwrap_or(sql)
        }))
    }

    fn effective_order(&self, order_by: &[String]) -> Result<Vec<String>, LifeError> {
        if order_by.is_empty() {
            Ok(self.registry.get(&self.root_type)?.default_order.clone())
        } else {
            Ok(order_by.to_vec())
        }
    }

    /// Fingerprint of everything that determines the SQL text.
    fn signature(&self, order_by: &[String], paging: Option<&PagingInfo>) -> String {
        let ids = self.templates.object_ids();
        let index: HashMap<&ObjectId, usize> = ids.iter().enumerate().map(|(i, oid)| (oid, i)).collect();
        let name = |oid: &ObjectId| index.get(oid).map_or_else(|| oid.to_string(), |i| format!("t{i}"));
        let column_name = |c: &TemplateColumn| format!("{}.{}", name(&c.template), c.attribute);

        let mut shape = format!("root {}\n", self.root_type);
        for oid in ids {
            let info = self.infos.get(oid).cloned().unwrap_or_default();
            shape.push_str(&format!(
                "{} {} alias={:?} {}\n",
                name(oid),
                oid.type_name(),
                info.alias,
                info.combine
            ));
            for criterion in self.criteria(oid) {
                shape.push_str(&format!(
                    "  {} {} {} {}\n",
                    criterion.combine,
                    criterion.attribute,
                    criterion.operator,
                    criterion.operand.shape(&column_name)
                ));
            }
            if let (Ok(type_desc), Some(node)) = (self.registry.get(oid.type_name()), self.templates.get(oid)) {
                for relation in &type_desc.relations {
                    if let Some(value) = node.raw_relation(&relation.other_role) {
                        let linked: Vec<String> = value.oids().iter().map(|o| name(o)).collect();
                        shape.push_str(&format!("  -> {} [{}]\n", relation.other_role, linked.join(",")));
                    }
                }
            }
        }
        for group in &self.groups {
            let members: Vec<String> = group.members.iter().map(|m| name(m)).collect();
            shape.push_str(&format!("group {} [{}]\n", group.combine, members.join(",")));
        }
        if let Some(condition) = &self.condition {
            shape.push_str(&format!("where {}\n", condition.shape(&column_name)));
        }
        shape.push_str(&format!("order {}\npaged {}\n", order_by.join(","), paging.is_some()));

        format!("{:x}", Sha256::digest(shape.as_bytes()))
    }

    fn value_for_key(&self, key: &ParamKey, paging: Option<&PagingInfo>) -> Result<Value, LifeError> {
        let stale = || LifeError::Query(format!("Cached statement '{}' does not fit the query", self.query_id));
        match key {
            ParamKey::Template {
                template,
                attribute,
                index,
            } => {
                let oid = self.templates.object_ids().get(*template).ok_or_else(stale)?;
                self.criteria(oid)
                    .iter()
                    .find(|c| &c.attribute == attribute)
                    .and_then(|c| c.operand.bound_values().get(*index).cloned())
                    .ok_or_else(stale)
            }
            ParamKey::Condition { index } => self
                .condition
                .as_ref()
                .and_then(|c| c.bound_values().get(*index).cloned())
                .ok_or_else(stale),
            ParamKey::Limit => paging.map(|p| Value::from(p.page_size)).ok_or_else(stale),
            ParamKey::Offset => paging.map(|p| Value::from(p.offset())).ok_or_else(stale),
        }
    }

    fn values_for_keys(&self, keys: &[ParamKey], paging: Option<&PagingInfo>) -> Result<Vec<Value>, LifeError> {
        keys.iter().map(|key| self.value_for_key(key, paging)).collect()
    }

    fn build_fresh(&self, order_by: &[String], paging: Option<&PagingInfo>, signature: String) -> Result<BuiltStatement, LifeError> {
        let Rendered {
            select,
            count,
            keys,
            count_keys,
            ..
        } = render(self, order_by, paging)?;

        let (sql, values) = select.build(PostgresQueryBuilder);
        let values: Vec<Value> = values.0;
        let (count_sql, count_values) = match count {
            Some(count) => {
                let (sql, values) = count.build(PostgresQueryBuilder);
                (Some(sql), values.0)
            }
            None => (None, Vec::new()),
        };

        let statement = BuiltStatement {
            sql,
            values,
            count_sql,
            count_values,
        };

        if let Some(cache) = &self.cache {
            if statement.values.len() == keys.len() && statement.count_values.len() == count_keys.len() {
                cache.insert(
                    &self.query_id,
                    CachedStatement {
                        signature,
                        sql: statement.sql.clone(),
                        keys,
                        count_sql: statement.count_sql.clone(),
                        count_keys,
                    },
                );
            } else {
                log::warn!(
                    "Not caching '{}': {} values for {} parameter keys",
                    self.query_id,
                    statement.values.len(),
                    keys.len()
                );
            }
        }
        Ok(statement)
    }
}

impl Query for ObjectQuery {
    fn root_type(&self) -> &str {
        &self.root_type
    }

    fn build_query(&mut self, order_by: &[String], paging: Option<&PagingInfo>) -> Result<BuiltStatement, LifeError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::build_query_span(&self.root_type).entered();

        let order_by = self.effective_order(order_by)?;
        let signature = self.signature(&order_by, paging);

        let cached = self.cache.as_ref().and_then(|c| c.get(&self.query_id, &signature));
        let statement = match cached {
            Some(cached) => {
                log::debug!("Reusing statement '{}'", self.query_id);
                #[cfg(feature = "metrics")]
                METRICS.record_cache_hit();
                BuiltStatement {
                    values: self.values_for_keys(&cached.keys, paging)?,
                    count_values: self.values_for_keys(&cached.count_keys, paging)?,
                    sql: cached.sql,
                    count_sql: cached.count_sql,
                }
            }
            None => self.build_fresh(&order_by, paging, signature)?,
        };

        log::debug!("Built query '{}': {}", self.query_id, statement.sql);
        #[cfg(feature = "metrics")]
        METRICS.record_query_built();

        self.last_statement = Some(statement.clone());
        Ok(statement)
    }
}
