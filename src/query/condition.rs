//! Condition trees compiled from condition strings.

use std::fmt;

use sea_query::Value;

use super::criteria::{quote_value, Operand, Operator, TemplateColumn};

/// A boolean condition over template columns.
///
/// Produced by the condition parser; the object query renders it into the `WHERE`
/// clause once template aliases are known.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionExpr {
    And(Vec<ConditionExpr>),
    Or(Vec<ConditionExpr>),
    Not(Box<ConditionExpr>),
    Compare {
        column: TemplateColumn,
        operator: Operator,
        operand: Operand,
    },
}

impl ConditionExpr {
    /// Values bound by this condition, in rendering order.
    pub fn bound_values(&self) -> Vec<Value> {
        let mut values = Vec::new();
        self.collect_values(&mut values);
        values
    }

    fn collect_values(&self, values: &mut Vec<Value>) {
        match self {
            ConditionExpr::And(items) | ConditionExpr::Or(items) => {
                for item in items {
                    item.collect_values(values);
                }
            }
            ConditionExpr::Not(inner) => inner.collect_values(values),
            ConditionExpr::Compare { operand, .. } => values.extend(operand.bound_values()),
        }
    }

    /// Condition text with `?` in place of values and columns named by `column_name`.
    pub(crate) fn shape(&self, column_name: &dyn Fn(&TemplateColumn) -> String) -> String {
        match self {
            ConditionExpr::And(items) => join_shapes(items, " AND ", column_name),
            ConditionExpr::Or(items) => join_shapes(items, " OR ", column_name),
            ConditionExpr::Not(inner) => format!("NOT ({})", inner.shape(column_name)),
            ConditionExpr::Compare {
                column,
                operator,
                operand,
            } => format!("{} {} {}", column_name(column), operator, operand.shape(column_name)),
        }
    }

    /// Template columns referenced by the condition.
    pub fn columns(&self) -> Vec<&TemplateColumn> {
        match self {
            ConditionExpr::And(items) | ConditionExpr::Or(items) => items.iter().flat_map(|i| i.columns()).collect(),
            ConditionExpr::Not(inner) => inner.columns(),
            ConditionExpr::Compare { column, operand, .. } => {
                let mut columns = vec![column];
                if let Operand::Column(other) = operand {
                    columns.push(other);
                }
                columns
            }
        }
    }
}

fn join_shapes(items: &[ConditionExpr], separator: &str, column_name: &dyn Fn(&TemplateColumn) -> String) -> String {
    let parts: Vec<String> = items.iter().map(|i| format!("({})", i.shape(column_name))).collect();
    parts.join(separator)
}

impl fmt::Display for ConditionExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionExpr::And(items) | ConditionExpr::Or(items) => {
                let separator = if matches!(self, ConditionExpr::And(_)) { " AND " } else { " OR " };
                let parts: Vec<String> = items.iter().map(|i| format!("({i})")).collect();
                f.write_str(&parts.join(separator))
            }
            ConditionExpr::Not(inner) => write!(f, "NOT ({inner})"),
            ConditionExpr::Compare {
                column,
                operator,
                operand,
            } => {
                write!(f, "{}.{} {}", column.template.type_name(), column.attribute, operator)?;
                match operand {
                    Operand::None => Ok(()),
                    Operand::Value(v) => write!(f, " {}", quote_value(v)),
                    Operand::List(values) => {
                        let items: Vec<String> = values.iter().map(quote_value).collect();
                        write!(f, " ({})", items.join(", "))
                    }
                    Operand::Column(c) => write!(f, " {}.{}", c.template.type_name(), c.attribute),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid::ObjectId;

    fn column(attribute: &str) -> TemplateColumn {
        TemplateColumn {
            template: ObjectId::from_int("Page", 1),
            attribute: attribute.to_string(),
        }
    }

    #[test]
    fn test_values_in_order() {
        let expr = ConditionExpr::Or(vec![
            ConditionExpr::Compare {
                column: column("name"),
                operator: Operator::Eq,
                operand: Operand::Value(Value::from("a".to_string())),
            },
            ConditionExpr::Not(Box::new(ConditionExpr::Compare {
                column: column("sortkey"),
                operator: Operator::In,
                operand: Operand::List(vec![Value::from(1i64), Value::from(2i64)]),
            })),
        ]);
        assert_eq!(
            expr.bound_values(),
            vec![Value::from("a".to_string()), Value::from(1i64), Value::from(2i64)]
        );
        assert_eq!(expr.to_string(), "(Page.name = 'a') OR (NOT (Page.sortkey IN (1, 2)))");
        assert_eq!(expr.columns().len(), 2);
        let shape = expr.shape(&|c: &TemplateColumn| c.attribute.clone());
        assert_eq!(shape, "(name = ?) OR (NOT (sortkey IN (?,?)))");
    }
}
