//! Rewrites RQL conditions into the condition string form.
//!
//! Both notations are accepted and may be mixed:
//!
//! ```text
//! name=match=*Home*&(sortkey=gt=1|Author.name=eq=Ingo)
//! and(match(name,*Home*),in(sortkey,(1,2)))
//! ```
//!
//! `&` is AND, `|` is OR, parentheses group. `match` becomes `LIKE` with `*` as
//! wildcard. Values are written as quoted literals; the condition parser types them
//! by the attribute they are compared with. `null` stays a `NULL` keyword.

use crate::error::LifeError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum RqlToken {
    Atom(String),
    Quoted(String),
    LParen,
    RParen,
    Comma,
    And,
    Or,
}

fn tokenize(input: &str) -> Result<Vec<RqlToken>, LifeError> {
    let mut tokens = Vec::new();
    let mut atom = String::new();
    let mut chars = input.chars().peekable();

    let flush = |atom: &mut String, tokens: &mut Vec<RqlToken>| {
        let trimmed = atom.trim();
        if !trimmed.is_empty() {
            tokens.push(RqlToken::Atom(trimmed.to_string()));
        }
        atom.clear();
    };

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                flush(&mut atom, &mut tokens);
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some(q) if q == c => {
                            if chars.peek() == Some(&c) {
                                chars.next();
                                text.push(c);
                            } else {
                                break;
                            }
                        }
                        Some(other) => text.push(other),
                        None => return Err(LifeError::Parse(format!("Unterminated string in RQL '{input}'"))),
                    }
                }
                tokens.push(RqlToken::Quoted(text));
            }
            '(' | ')' | ',' | '&' | '|' => {
                flush(&mut atom, &mut tokens);
                tokens.push(match c {
                    '(' => RqlToken::LParen,
                    ')' => RqlToken::RParen,
                    ',' => RqlToken::Comma,
                    '&' => RqlToken::And,
                    _ => RqlToken::Or,
                });
            }
            _ => atom.push(c),
        }
    }
    flush(&mut atom, &mut tokens);
    Ok(tokens)
}

/// The condition operator for an RQL operator name.
fn operator(name: &str) -> Option<&'static str> {
    let op = match name.to_lowercase().as_str() {
        "eq" => "=",
        "ne" => "!=",
        "lt" => "<",
        "lte" | "le" => "<=",
        "gt" => ">",
        "gte" | "ge" => ">=",
        "in" => "IN",
        "match" => "LIKE",
        _ => return None,
    };
    Some(op)
}

fn quote(text: &str, like: bool) -> String {
    if text.eq_ignore_ascii_case("null") {
        return "NULL".to_string();
    }
    let text = if like { text.replace('*', "%") } else { text.to_string() };
    format!("'{}'", text.replace('\'', "''"))
}

struct Rewriter {
    tokens: Vec<RqlToken>,
    position: usize,
}

/// Rewrite an RQL condition into the condition string form.
pub(crate) fn rewrite(input: &str) -> Result<String, LifeError> {
    let mut rewriter = Rewriter {
        tokens: tokenize(input)?,
        position: 0,
    };
    if rewriter.tokens.is_empty() {
        return Ok(String::new());
    }
    let condition = rewriter.expression()?;
    if rewriter.position < rewriter.tokens.len() {
        return Err(LifeError::Parse(format!("Unexpected input in RQL '{input}'")));
    }
    log::trace!("RQL '{input}' rewritten to '{condition}'");
    Ok(condition)
}

impl Rewriter {
    fn peek(&self) -> Option<&RqlToken> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Result<RqlToken, LifeError> {
        let token = self
            .tokens
            .get(self.position)
            .cloned()
            .ok_or_else(|| LifeError::Parse("Unexpected end of RQL condition".to_string()))?;
        self.position += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: RqlToken) -> Result<(), LifeError> {
        let token = self.next()?;
        if token == expected {
            Ok(())
        } else {
            Err(LifeError::Parse(format!("Expected {expected:?} in RQL, found {token:?}")))
        }
    }

    fn expression(&mut self) -> Result<String, LifeError> {
        let mut text = self.term()?;
        loop {
            match self.peek() {
                Some(RqlToken::And) => {
                    self.position += 1;
                    text = format!("{text} AND {}", self.term()?);
                }
                Some(RqlToken::Or) => {
                    self.position += 1;
                    text = format!("{text} OR {}", self.term()?);
                }
                _ => return Ok(text),
            }
        }
    }

    fn term(&mut self) -> Result<String, LifeError> {
        match self.next()? {
            RqlToken::LParen => {
                let inner = self.expression()?;
                self.expect(RqlToken::RParen)?;
                Ok(format!("({inner})"))
            }
            RqlToken::Atom(atom) if self.peek() == Some(&RqlToken::LParen) && !atom.contains('=') => {
                self.position += 1;
                self.call(&atom)
            }
            RqlToken::Atom(atom) => self.comparison(&atom),
            other => Err(LifeError::Parse(format!("Unexpected {other:?} in RQL"))),
        }
    }

    /// `op(field,value)`, `in(field,(a,b))`, `and(..)`, `or(..)`
    fn call(&mut self, name: &str) -> Result<String, LifeError> {
        let lowered = name.to_lowercase();
        if lowered == "and" || lowered == "or" {
            let mut parts = vec![self.expression()?];
            while self.peek() == Some(&RqlToken::Comma) {
                self.position += 1;
                parts.push(self.expression()?);
            }
            self.expect(RqlToken::RParen)?;
            let separator = if lowered == "and" { " AND " } else { " OR " };
            let joined: Vec<String> = parts.into_iter().map(|p| format!("({p})")).collect();
            return Ok(format!("({})", joined.join(separator)));
        }

        let op = operator(name).ok_or_else(|| LifeError::Parse(format!("Unknown RQL operator '{name}'")))?;
        let field = match self.next()? {
            RqlToken::Atom(field) => field,
            other => return Err(LifeError::Parse(format!("Expected a field name in RQL, found {other:?}"))),
        };
        self.expect(RqlToken::Comma)?;

        if op == "IN" {
            let values = if self.peek() == Some(&RqlToken::LParen) {
                self.position += 1;
                let values = self.values()?;
                self.expect(RqlToken::RParen)?;
                values
            } else {
                self.values()?
            };
            self.expect(RqlToken::RParen)?;
            return Ok(format!("{field} IN ({})", values.join(", ")));
        }

        let value = self.value(op == "LIKE")?;
        self.expect(RqlToken::RParen)?;
        Ok(format!("{field} {op} {value}"))
    }

    /// `field=op=value`, `field=in=(a,b)` or `field=value`
    fn comparison(&mut self, atom: &str) -> Result<String, LifeError> {
        let mut parts = atom.splitn(3, '=');
        let field = parts.next().unwrap_or_default().trim();
        let second = parts.next();
        let third = parts.next();
        if field.is_empty() {
            return Err(LifeError::Parse(format!("Missing field name in RQL '{atom}'")));
        }

        let (op, inline_value) = match (second, third) {
            (Some(name), Some(value)) => {
                let op = operator(name.trim())
                    .ok_or_else(|| LifeError::Parse(format!("Unknown RQL operator '{name}'")))?;
                (op, value.trim())
            }
            (Some(value), None) => ("=", value.trim()),
            _ => return Err(LifeError::Parse(format!("Expected a comparison in RQL, found '{atom}'"))),
        };

        if op == "IN" {
            if !inline_value.is_empty() {
                return Err(LifeError::Parse(format!("Expected a list after '{field}=in='")));
            }
            self.expect(RqlToken::LParen)?;
            let values = self.values()?;
            self.expect(RqlToken::RParen)?;
            return Ok(format!("{field} IN ({})", values.join(", ")));
        }

        let value = if inline_value.is_empty() {
            match self.next()? {
                RqlToken::Quoted(text) => quote(&text, op == "LIKE"),
                other => return Err(LifeError::Parse(format!("Expected a value for '{field}', found {other:?}"))),
            }
        } else {
            quote(inline_value, op == "LIKE")
        };
        Ok(format!("{field} {op} {value}"))
    }

    fn value(&mut self, like: bool) -> Result<String, LifeError> {
        match self.next()? {
            RqlToken::Atom(text) | RqlToken::Quoted(text) => Ok(quote(&text, like)),
            other => Err(LifeError::Parse(format!("Expected a value in RQL, found {other:?}"))),
        }
    }

    fn values(&mut self) -> Result<Vec<String>, LifeError> {
        let mut values = vec![self.value(false)?];
        while self.peek() == Some(&RqlToken::Comma) {
            self.position += 1;
            values.push(self.value(false)?);
        }
        Ok(values)
    }
}
