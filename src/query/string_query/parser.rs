//! Recursive descent parser for condition strings.
//!
//! ```text
//! condition  := and ( OR and )*
//! and        := unary ( AND unary )*
//! unary      := NOT unary | '(' condition ')' | comparison
//! comparison := field op operand
//!             | field [NOT] LIKE literal | field REGEXP literal
//!             | field [NOT] IN '(' literal ( ',' literal )* ')'
//!             | field IS [NOT] NULL
//! ```
//!
//! `AND` binds tighter than `OR`. Field references stay unresolved here.

use super::lexer::{tokenize, Spanned, Token};
use crate::error::LifeError;
use crate::query::Operator;

/// `[qualifier.]attribute` where the qualifier is a type or role name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FieldRef {
    pub(crate) qualifier: Option<String>,
    pub(crate) attribute: String,
}

impl FieldRef {
    fn parse(word: &str) -> Self {
        match word.split_once('.') {
            Some((qualifier, attribute)) => Self {
                qualifier: Some(qualifier.to_string()),
                attribute: attribute.to_string(),
            },
            None => Self {
                qualifier: None,
                attribute: word.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Literal {
    Str(String),
    Number(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Rhs {
    None,
    Literal(Literal),
    List(Vec<Literal>),
    Field(FieldRef),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Parsed {
    And(Vec<Parsed>),
    Or(Vec<Parsed>),
    Not(Box<Parsed>),
    Compare { field: FieldRef, operator: Operator, rhs: Rhs },
}

const KEYWORDS: [&str; 8] = ["AND", "OR", "NOT", "LIKE", "REGEXP", "IN", "IS", "NULL"];

struct Parser {
    tokens: Vec<Spanned>,
    position: usize,
    input_len: usize,
}

/// Parse a condition string. An empty or blank string yields `None`.
pub(crate) fn parse(input: &str) -> Result<Option<Parsed>, LifeError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Ok(None);
    }
    let mut parser = Parser {
        tokens,
        position: 0,
        input_len: input.len(),
    };
    let parsed = parser.condition()?;
    if let Some(extra) = parser.peek() {
        return Err(parser.error_at(extra.offset, "Unexpected token after condition"));
    }
    Ok(Some(parsed))
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.position)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.peek().map(|s| &s.token)
    }

    fn next(&mut self) -> Result<Spanned, LifeError> {
        let token = self
            .tokens
            .get(self.position)
            .cloned()
            .ok_or_else(|| self.error_at(self.input_len, "Unexpected end of condition"))?;
        self.position += 1;
        Ok(token)
    }

    fn error_at(&self, offset: usize, message: &str) -> LifeError {
        LifeError::Parse(format!("{message} at offset {offset}"))
    }

    fn accept_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_token().is_some_and(|t| t.is_keyword(keyword)) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), LifeError> {
        let token = self.next()?;
        if token.token.is_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error_at(token.offset, &format!("Expected {keyword}")))
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), LifeError> {
        let token = self.next()?;
        if &token.token == expected {
            Ok(())
        } else {
            Err(self.error_at(token.offset, &format!("Expected {what}")))
        }
    }

    fn condition(&mut self) -> Result<Parsed, LifeError> {
        let mut items = vec![self.and()?];
        while self.accept_keyword("OR") {
            items.push(self.and()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Parsed::Or(items)
        })
    }

    fn and(&mut self) -> Result<Parsed, LifeError> {
        let mut items = vec![self.unary()?];
        while self.accept_keyword("AND") {
            items.push(self.unary()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Parsed::And(items)
        })
    }

    fn unary(&mut self) -> Result<Parsed, LifeError> {
        if self.accept_keyword("NOT") {
            return Ok(Parsed::Not(Box::new(self.unary()?)));
        }
        if self.peek_token() == Some(&Token::LParen) {
            self.position += 1;
            let inner = self.condition()?;
            self.expect(&Token::RParen, "')'")?;
            return Ok(inner);
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Parsed, LifeError> {
        let token = self.next()?;
        let field = match &token.token {
            Token::Word(word) if !is_keyword(word) => FieldRef::parse(word),
            _ => return Err(self.error_at(token.offset, "Expected a field name")),
        };

        let op_token = self.next()?;
        let operator = match &op_token.token {
            Token::Op(op) => Operator::parse(op).ok_or_else(|| self.error_at(op_token.offset, "Unknown operator"))?,
            t if t.is_keyword("LIKE") => Operator::Like,
            t if t.is_keyword("REGEXP") => Operator::Regexp,
            t if t.is_keyword("IN") => Operator::In,
            t if t.is_keyword("NOT") => {
                let negated = self.next()?;
                if negated.token.is_keyword("LIKE") {
                    Operator::NotLike
                } else if negated.token.is_keyword("IN") {
                    Operator::NotIn
                } else {
                    return Err(self.error_at(negated.offset, "Expected LIKE or IN after NOT"));
                }
            }
            t if t.is_keyword("IS") => {
                let operator = if self.accept_keyword("NOT") {
                    Operator::IsNotNull
                } else {
                    Operator::IsNull
                };
                self.expect_keyword("NULL")?;
                return Ok(Parsed::Compare {
                    field,
                    operator,
                    rhs: Rhs::None,
                });
            }
            _ => return Err(self.error_at(op_token.offset, "Expected an operator")),
        };

        if operator.takes_list() {
            self.expect(&Token::LParen, "'(' after IN")?;
            let mut items = vec![self.literal()?];
            while self.peek_token() == Some(&Token::Comma) {
                self.position += 1;
                items.push(self.literal()?);
            }
            self.expect(&Token::RParen, "')'")?;
            return Ok(Parsed::Compare {
                field,
                operator,
                rhs: Rhs::List(items),
            });
        }

        let rhs = match self.peek_token() {
            Some(Token::Word(word)) if !is_literal_word(word) && !is_keyword(word) => {
                let rhs = Rhs::Field(FieldRef::parse(word));
                self.position += 1;
                rhs
            }
            _ => Rhs::Literal(self.literal()?),
        };

        // `= NULL` and `!= NULL` mean IS [NOT] NULL
        let operator = match (&rhs, operator) {
            (Rhs::Literal(Literal::Null), Operator::Eq) => Operator::IsNull,
            (Rhs::Literal(Literal::Null), Operator::Ne) => Operator::IsNotNull,
            (Rhs::Literal(Literal::Null), op) => {
                return Err(self.error_at(op_token.offset, &format!("Cannot compare with NULL using {op}")))
            }
            (_, op) => op,
        };
        let rhs = if operator.is_unary() { Rhs::None } else { rhs };
        Ok(Parsed::Compare { field, operator, rhs })
    }

    fn literal(&mut self) -> Result<Literal, LifeError> {
        let token = self.next()?;
        match token.token {
            Token::Str(s) => Ok(Literal::Str(s)),
            Token::Number(n) => Ok(Literal::Number(n)),
            Token::Word(w) if w.eq_ignore_ascii_case("NULL") => Ok(Literal::Null),
            Token::Word(w) if w.eq_ignore_ascii_case("TRUE") => Ok(Literal::Bool(true)),
            Token::Word(w) if w.eq_ignore_ascii_case("FALSE") => Ok(Literal::Bool(false)),
            _ => Err(self.error_at(token.offset, "Expected a literal")),
        }
    }
}

fn is_keyword(word: &str) -> bool {
    KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

fn is_literal_word(word: &str) -> bool {
    ["NULL", "TRUE", "FALSE"].iter().any(|k| k.eq_ignore_ascii_case(word))
}
