//! Criteria: comparisons on a single attribute of a query template.

use std::fmt;

use regex::Regex;
use sea_query::{BinOper, Value};

use crate::node::Node;
use crate::oid::ObjectId;
use crate::value::{compare_values, is_null, null, value_to_string, values_equal};

/// Comparison operator of a criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    NotLike,
    Regexp,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl Operator {
    /// The operator as written in condition strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::Regexp => "REGEXP",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
        }
    }

    /// Parse a comparison operator token. Keywords are case-insensitive, `<>` is
    /// accepted for `!=`.
    pub fn parse(token: &str) -> Option<Self> {
        let normalized = token.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
        let op = match normalized.as_str() {
            "=" | "==" => Operator::Eq,
            "!=" | "<>" => Operator::Ne,
            "<" => Operator::Lt,
            "<=" => Operator::Le,
            ">" => Operator::Gt,
            ">=" => Operator::Ge,
            "LIKE" => Operator::Like,
            "NOT LIKE" => Operator::NotLike,
            "REGEXP" => Operator::Regexp,
            "IN" => Operator::In,
            "NOT IN" => Operator::NotIn,
            "IS NULL" => Operator::IsNull,
            "IS NOT NULL" => Operator::IsNotNull,
            _ => return None,
        };
        Some(op)
    }

    /// Whether the operator takes no operand.
    pub fn is_unary(&self) -> bool {
        matches!(self, Operator::IsNull | Operator::IsNotNull)
    }

    /// Whether the operator takes a list operand.
    pub fn takes_list(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }

    /// The `sea_query` binary operator for two-operand comparisons.
    pub(crate) fn bin_oper(&self) -> Option<BinOper> {
        let oper = match self {
            Operator::Eq => BinOper::Equal,
            Operator::Ne => BinOper::NotEqual,
            Operator::Lt => BinOper::SmallerThan,
            Operator::Le => BinOper::SmallerThanOrEqual,
            Operator::Gt => BinOper::GreaterThan,
            Operator::Ge => BinOper::GreaterThanOrEqual,
            Operator::Like => BinOper::Like,
            Operator::NotLike => BinOper::NotLike,
            Operator::Regexp => BinOper::PgOperator(sea_query::extension::postgres::PgBinOper::Regex),
            Operator::In | Operator::NotIn | Operator::IsNull | Operator::IsNotNull => return None,
        };
        Some(oper)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a condition combines with the conditions before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Combine {
    #[default]
    And,
    Or,
}

impl fmt::Display for Combine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Combine::And => f.write_str("AND"),
            Combine::Or => f.write_str("OR"),
        }
    }
}

/// An attribute of a query template, used where a condition compares two columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateColumn {
    pub template: ObjectId,
    pub attribute: String,
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Value(Value),
    List(Vec<Value>),
    Column(TemplateColumn),
}

impl Operand {
    /// Values bound as statement parameters, in order.
    pub fn bound_values(&self) -> Vec<Value> {
        match self {
            Operand::Value(v) => vec![v.clone()],
            Operand::List(values) => values.clone(),
            Operand::None | Operand::Column(_) => Vec::new(),
        }
    }

    /// Shape without values, used to tell statements apart.
    pub(crate) fn shape(&self, column_name: &dyn Fn(&TemplateColumn) -> String) -> String {
        match self {
            Operand::None => String::new(),
            Operand::Value(_) => "?".to_string(),
            Operand::List(values) => format!("({})", vec!["?"; values.len()].join(",")),
            Operand::Column(c) => column_name(c),
        }
    }
}

/// A comparison of one attribute against an operand.
#[derive(Debug, Clone, PartialEq)]
pub struct Criterion {
    pub type_name: String,
    pub attribute: String,
    pub operator: Operator,
    pub operand: Operand,
    pub combine: Combine,
}

impl Criterion {
    pub fn new(type_name: &str, attribute: &str, operator: Operator, value: Value) -> Self {
        let operand = if operator.is_unary() {
            Operand::None
        } else {
            Operand::Value(value)
        };
        Self {
            type_name: type_name.to_string(),
            attribute: attribute.to_string(),
            operator,
            operand,
            combine: Combine::And,
        }
    }

    /// A criterion not yet bound to an attribute, to be set on a query template.
    pub fn for_value(operator: Operator, value: Value) -> Self {
        Self::new("", "", operator, value)
    }

    pub fn in_list(type_name: &str, attribute: &str, values: Vec<Value>) -> Self {
        Self {
            operand: Operand::List(values),
            ..Self::new(type_name, attribute, Operator::In, null())
        }
    }

    pub fn is_null(type_name: &str, attribute: &str) -> Self {
        Self::new(type_name, attribute, Operator::IsNull, null())
    }

    #[must_use]
    pub fn with_combine(mut self, combine: Combine) -> Self {
        self.combine = combine;
        self
    }

    #[must_use]
    pub fn with_operand(mut self, operand: Operand) -> Self {
        self.operand = operand;
        self
    }

    /// Evaluate the criterion against a node. Missing attributes count as `NULL`;
    /// `LIKE` is case-sensitive.
    pub fn matches(&self, node: &Node) -> bool {
        let missing = null();
        let actual = node.value(&self.attribute).unwrap_or(&missing);

        match (&self.operator, &self.operand) {
            (Operator::IsNull, _) => is_null(actual),
            (Operator::IsNotNull, _) => !is_null(actual),
            (Operator::In, Operand::List(values)) => values.iter().any(|v| values_equal(actual, v)),
            (Operator::NotIn, Operand::List(values)) => !values.iter().any(|v| values_equal(actual, v)),
            (op, Operand::Value(expected)) => {
                if is_null(actual) {
                    return false;
                }
                match op {
                    Operator::Eq => values_equal(actual, expected),
                    Operator::Ne => !values_equal(actual, expected),
                    Operator::Lt => compare_values(actual, expected).is_lt(),
                    Operator::Le => compare_values(actual, expected).is_le(),
                    Operator::Gt => compare_values(actual, expected).is_gt(),
                    Operator::Ge => compare_values(actual, expected).is_ge(),
                    Operator::Like | Operator::NotLike => {
                        let text = value_to_string(actual).unwrap_or_default();
                        let pattern = value_to_string(expected).unwrap_or_default();
                        like_matches(&text, &pattern) == (*op == Operator::Like)
                    }
                    Operator::Regexp => {
                        let text = value_to_string(actual).unwrap_or_default();
                        value_to_string(expected)
                            .and_then(|p| Regex::new(&p).ok())
                            .map_or(false, |re| re.is_match(&text))
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}.{} {}", self.combine, self.type_name, self.attribute, self.operator)?;
        match &self.operand {
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

/// Render a value as a literal of the condition language.
pub(crate) fn quote_value(value: &Value) -> String {
    match value {
        Value::String(Some(s)) => format!("'{}'", s.replace('\'', "''")),
        Value::ChronoDate(Some(_)) | Value::ChronoDateTime(Some(_)) => {
            format!("'{}'", value_to_string(value).unwrap_or_default())
        }
        v if is_null(v) => "NULL".to_string(),
        v => value_to_string(v).unwrap_or_else(|| "NULL".to_string()),
    }
}

/// SQL `LIKE` matching with `%` and `_` wildcards.
pub fn like_matches(text: &str, pattern: &str) -> bool {
    like_regex(pattern).is_ok_and(|re| re.is_match(text))
}

/// Anchored regular expression equivalent to a `LIKE` pattern.
fn like_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push_str("(?s)^");
    let mut literal = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            c => expr.push_str(&regex::escape(c.encode_utf8(&mut literal))),
        }
    }
    expr.push('$');
    Regex::new(&expr)
}
