use std::{fmt::Display, ops::Range};

use thiserror::Error;

use crate::parser::TopParser;

pub type Span = Range<usize>;

#[derive(Debug, Error)]
#[error("syntax error at byte {offset}: {message}")]
pub struct SyntaxError {
    pub offset: usize,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum Ast<'a> {
    Atom(Span, &'a str),
    List(Span, Vec<Ast<'a>>),
}

impl<'a> PartialEq for Ast<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Atom(_, l1), Self::Atom(_, r1)) => l1 == r1,
            (Self::List(_, l1), Self::List(_, r1)) => l1 == r1,
            _ => false,
        }
    }
}

impl<'a> Ast<'a> {
    pub fn span(&self) -> Span {
        match self {
            Ast::Atom(s, _) | Ast::List(s, _) => s.clone(),
        }
    }

    pub fn atom(&self) -> Option<&'a str> {
        match self {
            Ast::Atom(_, v) => Some(v),
            Ast::List(_, _) => None,
        }
    }
}

impl<'a> Display for Ast<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ast::Atom(_, v) => write!(f, "{}", v),
            Ast::List(_, items) => {
                write!(f, "(")?;
                let mut first = true;
                for item in items {
                    if first {
                        first = false;
                    } else {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Blanks out `//` comments so spans still index the original text.
pub fn strip_comments(s: &str) -> String {
    let mut result = String::with_capacity(s.len());

    for (i, line) in s.split('\n').enumerate() {
        if i > 0 {
            result.push('\n');
        }

        match line.find("//") {
            Some(start) => {
                result.push_str(&line[..start]);
                for c in line[start..].chars() {
                    for _ in 0..c.len_utf8() {
                        result.push(' ');
                    }
                }
            }

            None => result.push_str(line),
        }
    }

    result
}

/// Parses comment-free source into its top-level S-expressions.
pub fn parse(source: &str) -> Result<Vec<Ast<'_>>, SyntaxError> {
    use lalrpop_util::ParseError;

    TopParser::new().parse(source).map_err(|e| {
        let offset = match &e {
            ParseError::InvalidToken { location } => *location,
            ParseError::UnrecognizedEOF { location, .. } => *location,
            ParseError::UnrecognizedToken { token, .. } => token.0,
            ParseError::ExtraToken { token } => token.0,
            ParseError::User { .. } => 0,
        };

        SyntaxError {
            offset,
            message: e.to_string(),
        }
    })
}

/// One-based line and column of a byte offset.
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (i, c) in source.char_indices() {
        if i >= offset {
            break;
        }

        if c == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }

    (line, col)
}
