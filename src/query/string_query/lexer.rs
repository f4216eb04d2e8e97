//! Tokenizer for condition strings.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::LifeError;

static TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(?:(?P<str>'(?:[^']|'')*')|(?P<dstr>"(?:[^"]|"")*")|(?P<num>-?\d+(?:\.\d+)?)|(?P<op><=|>=|<>|!=|==|=|<|>)|(?P<punct>[(),])|(?P<word>[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)?))"#,
    )
    .unwrap_or_else(|e| panic!("invalid token pattern: {e}"))
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    /// Identifier or keyword, possibly qualified: `name`, `Page.name`, `AND`
    Word(String),
    /// Quoted literal with quotes removed and doubled quotes unescaped
    Str(String),
    Number(String),
    /// Comparison operator
    Op(String),
    LParen,
    RParen,
    Comma,
}

impl Token {
    /// Whether this is the keyword `keyword`, ignoring case.
    pub(crate) fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Word(w) if w.eq_ignore_ascii_case(keyword))
    }
}

/// A token with its byte offset in the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Spanned {
    pub(crate) token: Token,
    pub(crate) offset: usize,
}

fn unquote(literal: &str, quote: char) -> String {
    let inner = &literal[1..literal.len() - 1];
    let doubled: String = [quote, quote].iter().collect();
    inner.replace(&doubled, &quote.to_string())
}

/// Split a condition string into tokens. Whitespace outside quotes separates tokens.
pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>, LifeError> {
    let mut tokens = Vec::new();
    let mut offset = 0;

    while offset < input.len() {
        let rest = &input[offset..];
        let trimmed = rest.trim_start();
        if trimmed.is_empty() {
            break;
        }
        offset += rest.len() - trimmed.len();

        let captures = TOKEN.captures(trimmed).ok_or_else(|| {
            if trimmed.starts_with('\'') || trimmed.starts_with('"') {
                LifeError::Parse(format!("Unterminated string literal at offset {offset}"))
            } else {
                let c = trimmed.chars().next().unwrap_or(' ');
                LifeError::Parse(format!("Unexpected character '{c}' at offset {offset}"))
            }
        })?;

        let (token, length) = if let Some(m) = captures.name("str") {
            (Token::Str(unquote(m.as_str(), '\'')), m.len())
        } else if let Some(m) = captures.name("dstr") {
            (Token::Str(unquote(m.as_str(), '"')), m.len())
        } else if let Some(m) = captures.name("num") {
            (Token::Number(m.as_str().to_string()), m.len())
        } else if let Some(m) = captures.name("op") {
            (Token::Op(m.as_str().to_string()), m.len())
        } else if let Some(m) = captures.name("punct") {
            let token = match m.as_str() {
                "(" => Token::LParen,
                ")" => Token::RParen,
                _ => Token::Comma,
            };
            (token, m.len())
        } else if let Some(m) = captures.name("word") {
            (Token::Word(m.as_str().to_string()), m.len())
        } else {
            return Err(LifeError::Parse(format!("Unexpected input at offset {offset}")));
        };

        tokens.push(Spanned { token, offset });
        offset += length;
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        tokenize(input).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_comparison() {
        assert_eq!(
            tokens("Page.name='Home' AND sortkey >= 2"),
            vec![
                Token::Word("Page.name".to_string()),
                Token::Op("=".to_string()),
                Token::Str("Home".to_string()),
                Token::Word("AND".to_string()),
                Token::Word("sortkey".to_string()),
                Token::Op(">=".to_string()),
                Token::Number("2".to_string()),
            ]
        );
    }

    #[test]
    fn test_quoted_literals_keep_whitespace_and_operators() {
        assert_eq!(
            tokens("name = 'it''s = a test' OR title=\"x y\""),
            vec![
                Token::Word("name".to_string()),
                Token::Op("=".to_string()),
                Token::Str("it's = a test".to_string()),
                Token::Word("OR".to_string()),
                Token::Word("title".to_string()),
                Token::Op("=".to_string()),
                Token::Str("x y".to_string()),
            ]
        );
    }

    #[test]
    fn test_lists_and_parentheses() {
        assert_eq!(
            tokens("(id IN (1,-2))"),
            vec![
                Token::LParen,
                Token::Word("id".to_string()),
                Token::Word("IN".to_string()),
                Token::LParen,
                Token::Number("1".to_string()),
                Token::Comma,
                Token::Number("-2".to_string()),
                Token::RParen,
                Token::RParen,
            ]
        );
        assert!(Token::Word("in".to_string()).is_keyword("IN"));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(tokenize("name = 'open"), Err(LifeError::Parse(_))));
        assert!(matches!(tokenize("name ~ 1"), Err(LifeError::Parse(_))));
        assert!(tokenize("   ").unwrap().is_empty());
    }
}
