//! Converts an NFN network name into an `(expression_string,
//! prepended_name_prefix)` pair, then parses the expression string into
//! an [`Expr`] AST, per spec.md §4.2.
//!
//! **Name-to-expression convention (resolves an Open Question).**
//! `Name::from_string` is a dumb slash-split: an expression argument
//! that references a `Name` (e.g. `f(/data)`) contributes its own
//! components to the Name the same way the surrounding prefix does, so
//! nothing in the component list says where the library prefix ends and
//! the expression begins. This parser resolves that by scanning the
//! non-`NFN` components for the first one containing `(` — the call's
//! opening paren always starts the expression — and treating everything
//! from there to the end as the expression text, rejoined with `/`.
//! Everything before it is the prefix. A name with no `(` anywhere
//! (a bare function reference with no args) is treated as wholly the
//! expression text, with an empty prefix.

use thiserror::Error;
use udcn_common::{Error as CommonError, Name};

use crate::ast::{Expr, Literal};

#[derive(Debug, Error, PartialEq)]
pub enum ParserError {
    #[error("name has no NFN tail")]
    NotAnNfnName,
    #[error("unexpected end of expression")]
    UnexpectedEof,
    #[error("unexpected character {0:?} at offset {1}")]
    UnexpectedChar(char, usize),
    #[error("expected {0:?}, found {1:?}")]
    Expected(char, String),
    #[error("empty identifier")]
    EmptyIdent,
    #[error("trailing input after expression: {0:?}")]
    TrailingInput(String),
}

impl From<ParserError> for CommonError {
    fn from(e: ParserError) -> Self {
        CommonError::Parser(e.to_string())
    }
}

/// Splits an NFN Interest name into the library prefix and the raw
/// expression text (the `NFN` tail itself is dropped).
pub fn split_network_name(name: &Name) -> Result<(Name, String), ParserError> {
    if !name.is_nfn() {
        return Err(ParserError::NotAnNfnName);
    }
    let body = &name.components()[..name.len() - 1];
    let split_at = body
        .iter()
        .position(|c| c.as_bytes().contains(&b'('))
        .unwrap_or(body.len());

    let prefix = Name::from_components(body[..split_at].to_vec());
    let expr_str = body[split_at..]
        .iter()
        .map(|c| String::from_utf8_lossy(c.as_bytes()).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    Ok((prefix, expr_str))
}

/// Parses an NFN Interest name directly into `(prefix, ast)`.
pub fn parse_network_name(name: &Name) -> Result<(Name, Expr), ParserError> {
    let (prefix, expr_str) = split_network_name(name)?;
    let ast = parse(&expr_str)?;
    Ok((prefix, ast))
}

/// Parses a bare expression string, e.g. `"f(/data, 2)"`.
pub fn parse(input: &str) -> Result<Expr, ParserError> {
    let mut parser = Parser {
        chars: input.char_indices().collect(),
        pos: 0,
    };
    let expr = parser.parse_expr()?;
    parser.skip_whitespace();
    if parser.pos != parser.chars.len() {
        return Err(ParserError::TrailingInput(parser.remaining()));
    }
    Ok(expr)
}

struct Parser {
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn remaining(&self) -> String {
        self.chars[self.pos..].iter().map(|(_, c)| *c).collect()
    }

    fn expect(&mut self, expected: char) -> Result<(), ParserError> {
        self.skip_whitespace();
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(ParserError::UnexpectedChar(c, self.pos - 1)),
            None => Err(ParserError::Expected(expected, self.remaining())),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ParserError> {
        self.skip_whitespace();
        match self.peek() {
            Some('/') => self.parse_name(),
            Some(c) if c == '"' => self.parse_quoted_string(),
            Some(c) if c.is_ascii_digit() || c == '-' => self.parse_integer(),
            Some(c) if is_ident_start(c) => self.parse_call_or_bare_ident(),
            Some(c) => Err(ParserError::UnexpectedChar(c, self.pos)),
            None => Err(ParserError::UnexpectedEof),
        }
    }

    fn parse_name(&mut self) -> Result<Expr, ParserError> {
        let mut components = Vec::new();
        loop {
            self.expect('/')?;
            let ident = self.parse_ident()?;
            components.push(ident);
            if self.peek() != Some('/') {
                break;
            }
        }
        let mut name = Name::new();
        for c in components {
            name.push(c.into_bytes());
        }
        Ok(Expr::NameRef(name))
    }

    fn parse_call_or_bare_ident(&mut self) -> Result<Expr, ParserError> {
        let ident = self.parse_ident()?;
        self.skip_whitespace();
        if self.peek() == Some('(') {
            self.bump();
            let args = self.parse_arglist()?;
            self.expect(')')?;
            Ok(Expr::Call {
                fn_name: ident,
                args,
            })
        } else {
            Ok(Expr::Literal(Literal::Str(ident)))
        }
    }

    fn parse_arglist(&mut self) -> Result<Vec<Expr>, ParserError> {
        self.skip_whitespace();
        if self.peek() == Some(')') {
            return Ok(Vec::new());
        }
        let mut args = vec![self.parse_expr()?];
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(',') => {
                    self.bump();
                    args.push(self.parse_expr()?);
                }
                _ => break,
            }
        }
        Ok(args)
    }

    fn parse_ident(&mut self) -> Result<String, ParserError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if is_ident_continue(c)) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(ParserError::EmptyIdent);
        }
        Ok(self.chars[start..self.pos].iter().map(|(_, c)| *c).collect())
    }

    fn parse_integer(&mut self) -> Result<Expr, ParserError> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().map(|(_, c)| *c).collect();
        text.parse::<i64>()
            .map(|n| Expr::Literal(Literal::Int(n)))
            .map_err(|_| ParserError::UnexpectedChar(text.chars().next().unwrap_or(' '), start))
    }

    fn parse_quoted_string(&mut self) -> Result<Expr, ParserError> {
        self.expect('"')?;
        let mut s = String::new();
        loop {
            match self.bump() {
                Some('"') => break,
                Some(c) => s.push(c),
                None => return Err(ParserError::UnexpectedEof),
            }
        }
        Ok(Expr::Literal(Literal::Str(s)))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':' || c == '.'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_prefix_and_expression() {
        let name = Name::from_string("/lib/f(/data)/NFN");
        let (prefix, expr_str) = split_network_name(&name).unwrap();
        assert_eq!(prefix, Name::from_string("/lib"));
        assert_eq!(expr_str, "f(/data)");
    }

    #[test]
    fn rejects_non_nfn_names() {
        let name = Name::from_string("/lib/f(/data)");
        assert_eq!(split_network_name(&name), Err(ParserError::NotAnNfnName));
    }

    #[test]
    fn parses_nested_calls_with_names_and_literals() {
        let ast = parse("add(/data, mul(2, 3))").unwrap();
        match ast {
            Expr::Call { fn_name, args } => {
                assert_eq!(fn_name, "add");
                assert_eq!(args.len(), 2);
                assert_eq!(args[0], Expr::NameRef(Name::from_string("/data")));
                match &args[1] {
                    Expr::Call { fn_name, args } => {
                        assert_eq!(fn_name, "mul");
                        assert_eq!(args[0], Expr::Literal(Literal::Int(2)));
                        assert_eq!(args[1], Expr::Literal(Literal::Int(3)));
                    }
                    other => panic!("expected nested call, got {:?}", other),
                }
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn parses_quoted_string_literal() {
        let ast = parse(r#"greet("hello world")"#).unwrap();
        match ast {
            Expr::Call { args, .. } => {
                assert_eq!(args[0], Expr::Literal(Literal::Str("hello world".into())));
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn end_to_end_network_name_to_ast() {
        let name = Name::from_string("/lib/f(/data)/NFN");
        let (prefix, ast) = parse_network_name(&name).unwrap();
        assert_eq!(prefix, Name::from_string("/lib"));
        assert_eq!(
            ast,
            Expr::Call {
                fn_name: "f".into(),
                args: vec![Expr::NameRef(Name::from_string("/data"))],
            }
        );
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(parse("f(1) garbage").is_err());
    }

    #[test]
    fn rejects_unterminated_call() {
        assert!(parse("f(1, 2").is_err());
    }
}
