//! Rendering of an [`ObjectQuery`] into `sea_query` statements.
//!
//! Templates of the root type are visited first, in creation order. Visiting a
//! template adds its criteria to the `WHERE` clause and joins every linked template
//! that was not visited yet, recursing into it. Grouped templates are skipped by the
//! traversal and rendered afterwards, each group as one parenthesized condition.

use std::collections::{HashMap, HashSet};

use sea_query::{Condition, Expr, ExprTrait, Func, Iden, JoinType, Order, Query as SqlQuery, SelectStatement};

use super::cache::ParamKey;
use super::condition::ConditionExpr;
use super::criteria::{Combine, Operand, Operator, TemplateColumn};
use super::object_query::{ObjectQuery, TemplateGroup};
use super::{PagingInfo, COUNT_COLUMN};
use crate::error::LifeError;
use crate::model::{RelationDescription, RelationKind, TypeDescription, TypeRegistry};
use crate::oid::ObjectId;

/// Prefix of the select list aliases of order-by columns from joined tables.
const ORDER_COLUMN_PREFIX: &str = "order_";

/// Table, alias or column name taken from type metadata.
#[derive(Debug, Clone)]
pub(crate) struct SqlIdent(pub(crate) String);

impl Iden for SqlIdent {
    fn unquoted(&self) -> &str {
        &self.0
    }
}

fn column(alias: &str, column: &str) -> Expr {
    Expr::col((SqlIdent(alias.to_string()), SqlIdent(column.to_string())))
}

fn combine(previous: Option<Condition>, next: Condition, op: Combine) -> Condition {
    match previous {
        None => next,
        Some(previous) => match op {
            Combine::And => Condition::all().add(previous).add(next),
            Combine::Or => Condition::any().add(previous).add(next),
        },
    }
}

/// The statements for a query, before values are collected.
pub(crate) struct Rendered {
    pub(crate) select: SelectStatement,
    pub(crate) count: Option<SelectStatement>,
    pub(crate) condition: Option<Condition>,
    /// Sources of the bound values of `select`, in placeholder order
    pub(crate) keys: Vec<ParamKey>,
    pub(crate) count_keys: Vec<ParamKey>,
}

struct BuildState<'q> {
    query: &'q ObjectQuery,
    registry: &'q dyn TypeRegistry,
    index: HashMap<ObjectId, usize>,
    base: SelectStatement,
    root_alias: String,
    aliases: HashMap<ObjectId, String>,
    claimed: HashSet<String>,
    joined: HashSet<String>,
    processed: HashSet<ObjectId>,
    /// Visited types with their aliases, root first
    touched: Vec<(&'q TypeDescription, String)>,
    condition: Option<Condition>,
    keys: Vec<ParamKey>,
}

/// Render the statements of `query`.
pub(crate) fn render(query: &ObjectQuery, order_by: &[String], paging: Option<&PagingInfo>) -> Result<Rendered, LifeError> {
    let registry = query.registry();
    let root_type = super::Query::root_type(query);
    let root_desc = registry.get(root_type)?;
    let ids: Vec<ObjectId> = query.template_ids().to_vec();

    // the first root type template names the root alias
    let root_alias = ids
        .iter()
        .find(|oid| oid.type_name() == root_type)
        .and_then(|oid| query.infos.get(oid))
        .and_then(|i| i.alias.clone())
        .unwrap_or_else(|| root_desc.table.clone());

    let mut state = BuildState {
        query,
        registry,
        index: ids.iter().enumerate().map(|(i, oid)| (oid.clone(), i)).collect(),
        base: SqlQuery::select(),
        root_alias: root_alias.clone(),
        aliases: HashMap::new(),
        claimed: HashSet::new(),
        joined: HashSet::new(),
        processed: HashSet::new(),
        touched: vec![(root_desc, root_alias.clone())],
        condition: None,
        keys: Vec::new(),
    };
    if root_alias == root_desc.table {
        state.base.from(SqlIdent(root_desc.table.clone()));
    } else {
        state.base.from_as(SqlIdent(root_desc.table.clone()), SqlIdent(root_alias.clone()));
    }
    state.claimed.insert(root_alias.clone());
    state.joined.insert(root_alias.clone());

    for oid in &ids {
        if oid.type_name() == root_type && !state.processed.contains(oid) && !query.is_grouped(oid) {
            state.aliases.insert(oid.clone(), root_alias.clone());
            state.process_template(oid)?;
        }
    }
    for oid in &ids {
        if !state.processed.contains(oid) && !query.is_grouped(oid) {
            log::warn!("Template {oid} is not connected to a {root_type} template and is ignored");
        }
    }
    for group in &query.groups {
        state.process_group(group)?;
    }
    if let Some(expr) = &query.condition {
        let mut next_index = 0;
        let condition = state.render_expr(expr, &mut next_index)?;
        state.attach(condition, Combine::And);
    }

    if let Some(condition) = state.condition.clone() {
        state.base.cond_where(condition);
    }
    let count_keys = state.keys.clone();

    let count = match paging {
        Some(_) => {
            let pk_column = root_desc
                .pk_names
                .first()
                .and_then(|pk| root_desc.column_for(pk))
                .ok_or_else(|| LifeError::Config(format!("{root_type} has no primary key")))?;
            let mut count = state.base.clone();
            count.expr_as(
                Func::count_distinct(column(&root_alias, pk_column)),
                SqlIdent(COUNT_COLUMN.to_string()),
            );
            Some(count)
        }
        None => None,
    };

    let mut select = state.base.clone();
    select.distinct();
    for attr in &root_desc.attributes {
        select.column((SqlIdent(root_alias.clone()), SqlIdent(attr.column_name().to_string())));
    }
    for token in order_by {
        let (alias, column_name, order) = state.resolve_order(token)?;
        // DISTINCT needs every ORDER BY expression in the select list
        if alias != root_alias {
            select.expr_as(
                column(&alias, &column_name),
                SqlIdent(format!("{ORDER_COLUMN_PREFIX}{alias}_{column_name}")),
            );
        }
        select.order_by((SqlIdent(alias), SqlIdent(column_name)), order);
    }
    let mut keys = state.keys;
    if let Some(paging) = paging {
        select.limit(paging.page_size).offset(paging.offset());
        keys.push(ParamKey::Limit);
        keys.push(ParamKey::Offset);
    }

    Ok(Rendered {
        select,
        count,
        condition: state.condition,
        keys,
        count_keys,
    })
}

impl<'q> BuildState<'q> {
    fn attach(&mut self, condition: Condition, op: Combine) {
        self.condition = Some(combine(self.condition.take(), condition, op));
    }

    fn mint_alias(&mut self, base: &str) -> String {
        let mut alias = base.to_string();
        let mut n = 1;
        while self.claimed.contains(&alias) {
            alias = format!("{base}_{n}");
            n += 1;
        }
        self.claimed.insert(alias.clone());
        alias
    }

    fn assign_alias(&mut self, oid: &ObjectId) -> Result<String, LifeError> {
        if let Some(alias) = self.aliases.get(oid) {
            return Ok(alias.clone());
        }
        let explicit = self.query.infos.get(oid).and_then(|i| i.alias.clone());
        let alias = match explicit {
            Some(alias) => {
                if !self.claimed.insert(alias.clone()) {
                    return Err(LifeError::InvalidArgument(format!("Alias '{alias}' is used twice")));
                }
                alias
            }
            None => {
                let table = self.registry.get(oid.type_name())?.table.clone();
                self.mint_alias(&table)
            }
        };
        self.aliases.insert(oid.clone(), alias.clone());
        Ok(alias)
    }

    fn join_table(&mut self, table: &str, alias: &str, on: Expr) {
        if !self.joined.insert(alias.to_string()) {
            return;
        }
        if table == alias {
            self.base.join(JoinType::InnerJoin, SqlIdent(table.to_string()), on);
        } else {
            self.base
                .join_as(JoinType::InnerJoin, SqlIdent(table.to_string()), SqlIdent(alias.to_string()), on);
        }
    }

    /// Join the table of `other_alias` to the one of `this_alias` along `relation`.
    fn join(&mut self, relation: &RelationDescription, this_alias: &str, other_alias: &str) -> Result<(), LifeError> {
        let registry = self.registry;
        let this_desc = registry.get(&relation.this_type)?;
        let other_desc = registry.get(&relation.other_type)?;
        let this_col = |name: &str| this_desc.column_for(name).unwrap_or(name).to_string();
        let other_col = |name: &str| other_desc.column_for(name).unwrap_or(name).to_string();

        let on = match &relation.kind {
            RelationKind::ManyToOne { id_name, fk_name } => {
                column(this_alias, &this_col(fk_name)).equals((
                    SqlIdent(other_alias.to_string()),
                    SqlIdent(other_col(id_name)),
                ))
            }
            RelationKind::OneToMany { id_name, fk_name } => {
                column(other_alias, &other_col(fk_name)).equals((
                    SqlIdent(this_alias.to_string()),
                    SqlIdent(this_col(id_name)),
                ))
            }
            RelationKind::ManyToMany {
                table,
                this_fk,
                other_fk,
                this_id,
                other_id,
            } => {
                let nm_alias = self.mint_alias(table);
                let nm_on = column(&nm_alias, this_fk).equals((
                    SqlIdent(this_alias.to_string()),
                    SqlIdent(this_col(this_id)),
                ));
                self.join_table(table, &nm_alias, nm_on);
                column(other_alias, &other_col(other_id))
                    .equals((SqlIdent(nm_alias.clone()), SqlIdent(other_fk.clone())))
            }
        };
        self.join_table(&other_desc.table, other_alias, on);
        Ok(())
    }

    fn process_template(&mut self, oid: &ObjectId) -> Result<(), LifeError> {
        if !self.processed.insert(oid.clone()) {
            return Ok(());
        }
        let registry = self.registry;
        let query = self.query;
        let alias = self
            .aliases
            .get(oid)
            .cloned()
            .ok_or_else(|| LifeError::Other(format!("No alias assigned to {oid}")))?;
        let type_desc = registry.get(oid.type_name())?;
        self.touched.push((type_desc, alias.clone()));

        if let Some(condition) = self.template_condition(oid, type_desc, &alias)? {
            self.attach(condition, query.template_combine(oid));
        }

        let node = query
            .templates
            .get(oid)
            .ok_or_else(|| LifeError::NotFound(oid.to_string()))?;
        for relation in &type_desc.relations {
            let Some(value) = node.raw_relation(&relation.other_role) else {
                continue;
            };
            for other in value.oids() {
                if self.processed.contains(&other) || query.is_grouped(&other) {
                    continue;
                }
                let other_alias = self.assign_alias(&other)?;
                self.join(relation, &alias, &other_alias)?;
                self.process_template(&other)?;
            }
        }
        Ok(())
    }

    fn template_condition(&mut self, oid: &ObjectId, type_desc: &TypeDescription, alias: &str) -> Result<Option<Condition>, LifeError> {
        let query = self.query;
        let position = self.index.get(oid).copied().unwrap_or_default();
        let mut result: Option<Condition> = None;
        for criterion in query.criteria(oid) {
            let column_name = type_desc
                .column_for(&criterion.attribute)
                .ok_or_else(|| LifeError::unknown_field(format!("{}.{}", type_desc.name, criterion.attribute)))?;
            let key = |index: usize| ParamKey::Template {
                template: position,
                attribute: criterion.attribute.clone(),
                index,
            };
            let condition = self.comparison(alias, column_name, criterion.operator, &criterion.operand, &key)?;
            result = Some(combine(result, condition, criterion.combine));
        }
        Ok(result)
    }

    /// Alias and column of a template attribute referenced by a condition.
    fn resolve_column(&self, column: &TemplateColumn) -> Result<(String, String), LifeError> {
        let alias = self.aliases.get(&column.template).ok_or_else(|| {
            LifeError::InvalidArgument(format!("{} is not connected to the query", column.template))
        })?;
        let type_desc = self.registry.get(column.template.type_name())?;
        let column_name = type_desc
            .column_for(&column.attribute)
            .ok_or_else(|| LifeError::unknown_field(format!("{}.{}", type_desc.name, column.attribute)))?;
        Ok((alias.clone(), column_name.to_string()))
    }

    fn comparison(
        &mut self,
        alias: &str,
        column_name: &str,
        operator: Operator,
        operand: &Operand,
        key: &dyn Fn(usize) -> ParamKey,
    ) -> Result<Condition, LifeError> {
        let col = column(alias, column_name);
        let expr = match (operator, operand) {
            (Operator::IsNull, _) => col.is_null(),
            (Operator::IsNotNull, _) => col.is_not_null(),
            (Operator::In | Operator::NotIn, Operand::List(_) | Operand::Value(_)) => {
                let values = operand.bound_values();
                self.keys.extend((0..values.len()).map(key));
                if operator == Operator::In {
                    col.is_in(values)
                } else {
                    col.is_not_in(values)
                }
            }
            (op, Operand::Value(value)) => {
                let oper = op
                    .bin_oper()
                    .ok_or_else(|| LifeError::InvalidArgument(format!("Operator {op} needs a value")))?;
                self.keys.push(key(0));
                col.binary(oper, Expr::val(value.clone()))
            }
            (op, Operand::Column(other)) => {
                let oper = op
                    .bin_oper()
                    .ok_or_else(|| LifeError::InvalidArgument(format!("Operator {op} cannot compare columns")))?;
                let (other_alias, other_column) = self.resolve_column(other)?;
                col.binary(oper, column(&other_alias, &other_column))
            }
            (op, _) => {
                return Err(LifeError::InvalidArgument(format!(
                    "Operator {op} does not fit its operand on {alias}.{column_name}"
                )))
            }
        };
        Ok(Condition::all().add(expr))
    }

    /// Find a visited template linked to `member` and the relation from its side.
    fn visited_neighbor(&self, member: &ObjectId) -> Result<Option<(String, RelationDescription)>, LifeError> {
        let node = self
            .query
            .templates
            .get(member)
            .ok_or_else(|| LifeError::NotFound(member.to_string()))?;
        let type_desc = self.registry.get(member.type_name())?;
        for relation in &type_desc.relations {
            let Some(value) = node.raw_relation(&relation.other_role) else {
                continue;
            };
            for other in value.oids() {
                if let Some(alias) = self.aliases.get(&other).filter(|_| self.processed.contains(&other)) {
                    let mirror = self.registry.relation(other.type_name(), &relation.this_role)?;
                    return Ok(Some((alias.clone(), mirror.clone())));
                }
            }
        }
        Ok(None)
    }

    fn process_group(&mut self, group: &TemplateGroup) -> Result<(), LifeError> {
        let query = self.query;
        let root_type = super::Query::root_type(query);
        let outer = self.condition.take();
        let mut conditions = Vec::new();

        for member in &group.members {
            if self.processed.contains(member) {
                continue;
            }
            match self.visited_neighbor(member)? {
                Some((neighbor_alias, relation)) => {
                    let alias = self.assign_alias(member)?;
                    self.join(&relation, &neighbor_alias, &alias)?;
                }
                None if member.type_name() == root_type => {
                    self.aliases.insert(member.clone(), self.root_alias.clone());
                }
                None => {
                    self.condition = outer;
                    return Err(LifeError::InvalidArgument(format!(
                        "Grouped template {member} is not linked to the query"
                    )));
                }
            }
            self.process_template(member)?;
            if let Some(condition) = self.condition.take() {
                conditions.push(condition);
            }
        }

        self.condition = outer;
        if conditions.is_empty() {
            return Ok(());
        }
        let mut unit = match group.combine {
            Combine::And => Condition::all(),
            Combine::Or => Condition::any(),
        };
        for condition in conditions {
            unit = unit.add(condition);
        }
        let op = group
            .members
            .first()
            .map(|m| query.template_combine(m))
            .unwrap_or_default();
        self.attach(unit, op);
        Ok(())
    }

    fn render_expr(&mut self, expr: &ConditionExpr, next_index: &mut usize) -> Result<Condition, LifeError> {
        match expr {
            ConditionExpr::And(items) | ConditionExpr::Or(items) => {
                let mut condition = if matches!(expr, ConditionExpr::And(_)) {
                    Condition::all()
                } else {
                    Condition::any()
                };
                for item in items {
                    condition = condition.add(self.render_expr(item, next_index)?);
                }
                Ok(condition)
            }
            ConditionExpr::Not(inner) => Ok(self.render_expr(inner, next_index)?.not()),
            ConditionExpr::Compare {
                column,
                operator,
                operand,
            } => {
                let (alias, column_name) = self.resolve_column(column)?;
                let start = *next_index;
                *next_index += operand.bound_values().len();
                let key = |index: usize| ParamKey::Condition { index: start + index };
                self.comparison(&alias, &column_name, *operator, operand, &key)
            }
        }
    }

    /// Resolve `[Type.]attribute [ASC|DESC]` against the visited types, root first.
    fn resolve_order(&self, token: &str) -> Result<(String, String, Order), LifeError> {
        let mut parts = token.split_whitespace();
        let field = parts
            .next()
            .ok_or_else(|| LifeError::InvalidArgument("Empty order-by token".to_string()))?;
        let order = match parts.next().map(str::to_uppercase).as_deref() {
            None | Some("ASC") => Order::Asc,
            Some("DESC") => Order::Desc,
            Some(other) => {
                return Err(LifeError::InvalidArgument(format!(
                    "Invalid sort direction '{other}' in '{token}'"
                )))
            }
        };

        let (qualifier, attribute) = match field.split_once('.') {
            Some((qualifier, attribute)) => (Some(qualifier), attribute),
            None => (None, field),
        };
        self.touched
            .iter()
            .filter(|(type_desc, _)| qualifier.map_or(true, |q| q == type_desc.name))
            .find_map(|(type_desc, alias)| {
                type_desc
                    .column_for(attribute)
                    .map(|c| (alias.clone(), c.to_string(), order.clone()))
            })
            .ok_or_else(|| LifeError::unknown_field(field))
    }
}
