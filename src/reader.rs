//! Reader: source text to [`Expression`] trees.
//!
//! The grammar is a parenthesized-list syntax with one addition: a list may be
//! followed by `;` and another expression, which becomes its chained successor.
//!
//! ```text
//! expression := atom | list (';' expression)?
//! list       := '(' expression* ')'
//! atom       := string | token          ; token is classified by the literal matcher
//! ```
//!
//! Every syntax error is fatal: the first one aborts the read and is reported with a
//! context snippet around the failing position.

use nom::{
    IResult, Parser,
    bytes::complete::{take_till1, take_while},
    character::complete::char,
    combinator::opt,
    error::ErrorKind,
    sequence::preceded,
};

use crate::ast::{Atom, Expression};
use crate::literal::match_literal;
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Runtime reader settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseConfig {
    /// Maximum nesting depth; an expression nested this deep is rejected
    pub max_depth: usize,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            max_depth: MAX_PARSE_DEPTH,
        }
    }
}

/// Internal nom error: remembers where it happened and what went wrong.
/// Converted into a [`ParseError`] with context once the failing read unwinds.
#[derive(Debug)]
struct ReadError<'a> {
    input: &'a str,
    kind: ParseErrorKind,
    message: String,
    found: Option<String>,
}

impl<'a> nom::error::ParseError<&'a str> for ReadError<'a> {
    fn from_error_kind(input: &'a str, kind: ErrorKind) -> Self {
        ReadError {
            input,
            kind: ParseErrorKind::InvalidSyntax,
            message: format!("unexpected input ({kind:?})"),
            found: None,
        }
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

impl ReadError<'_> {
    fn into_parse_error(self, source: &str) -> ParseError {
        let offset = source.len().saturating_sub(self.input.len());
        ParseError::with_context_and_found(self.kind, self.message, source, offset, self.found)
    }
}

type ReadResult<'a, T> = IResult<&'a str, T, ReadError<'a>>;

/// Abort the whole read at `input`
fn fatal<'a, T>(
    input: &'a str,
    kind: ParseErrorKind,
    message: impl Into<String>,
    found: Option<String>,
) -> ReadResult<'a, T> {
    Err(nom::Err::Failure(ReadError {
        input,
        kind,
        message: message.into(),
        found,
    }))
}

fn skip_space(input: &str) -> ReadResult<'_, &str> {
    take_while(|c: char| c.is_whitespace()).parse(input)
}

fn open_paren(input: &str) -> ReadResult<'_, char> {
    char('(').parse(input)
}

fn close_paren(input: &str) -> ReadResult<'_, char> {
    char(')').parse(input)
}

/// A `;` after optional whitespace
fn chain_marker(input: &str) -> ReadResult<'_, Option<char>> {
    opt(preceded(skip_space, char(';'))).parse(input)
}

/// Everything up to whitespace or a parenthesis
fn bare_token(input: &str) -> ReadResult<'_, &str> {
    take_till1(|c: char| c.is_whitespace() || c == '(' || c == ')').parse(input)
}

/// A quoted token, quotes included. It ends at the first `"` preceded by an even
/// number of backslashes.
fn string_token(input: &str) -> ReadResult<'_, &str> {
    let mut backslashes = 0usize;
    for (offset, ch) in input.char_indices().skip(1) {
        match ch {
            '"' if backslashes % 2 == 0 => {
                let end = offset + ch.len_utf8();
                return Ok((&input[end..], &input[..end]));
            }
            '\\' => backslashes += 1,
            '\n' => {
                return fatal(
                    &input[offset..],
                    ParseErrorKind::InvalidSyntax,
                    "newline in string literal",
                    Some("\\n".to_owned()),
                );
            }
            _ => backslashes = 0,
        }
    }
    fatal(
        input,
        ParseErrorKind::Incomplete,
        "unterminated string literal",
        None,
    )
}

fn parse_atom(input: &str) -> ReadResult<'_, Expression> {
    if input.starts_with(')') {
        return fatal(
            input,
            ParseErrorKind::InvalidSyntax,
            "unexpected closing paren",
            Some(")".to_owned()),
        );
    }
    if input.starts_with('\\') {
        return fatal(
            input,
            ParseErrorKind::InvalidSyntax,
            "token cannot start with '\\'",
            bare_token(input).ok().map(|(_, token)| token.to_owned()),
        );
    }

    let (rest, token) = if input.starts_with('"') {
        string_token(input)?
    } else {
        bare_token(input)?
    };

    match match_literal(token) {
        Ok(Some(literal)) => Ok((rest, Expression::atom(Atom::Literal(literal)))),
        Ok(None) => Ok((rest, Expression::atom(Atom::Symbol(token.to_owned())))),
        Err(err) => fatal(input, err.kind, err.message, err.found),
    }
}

/// `(` children `)`, without any chain
fn parse_list<'a>(
    input: &'a str,
    depth: usize,
    config: &ParseConfig,
) -> ReadResult<'a, Expression> {
    let (mut input, _) = open_paren(input)?;
    let mut elements = Vec::new();

    loop {
        let (rest, _) = skip_space(input)?;
        if let Ok((rest, _)) = close_paren(rest) {
            return Ok((rest, Expression::list(elements)));
        }
        if rest.is_empty() {
            return fatal(
                rest,
                ParseErrorKind::Incomplete,
                "missing closing paren",
                None,
            );
        }
        let (rest, element) = parse_expression(rest, depth + 1, config)?;
        elements.push(element);
        input = rest;
    }
}

/// A single list or atom, without any chain
fn parse_node<'a>(
    input: &'a str,
    depth: usize,
    config: &ParseConfig,
) -> ReadResult<'a, Expression> {
    if depth >= config.max_depth {
        return fatal(
            input,
            ParseErrorKind::TooDeeplyNested,
            format!(
                "expression too deeply nested (max depth: {})",
                config.max_depth
            ),
            None,
        );
    }
    if input.starts_with('(') {
        parse_list(input, depth, config)
    } else {
        parse_atom(input)
    }
}

/// A node plus any `;` chain after it. Chains are collected in a loop and linked
/// afterwards, so a long sequence does not deepen the parse stack.
fn parse_expression<'a>(
    input: &'a str,
    depth: usize,
    config: &ParseConfig,
) -> ReadResult<'a, Expression> {
    let mut steps = Vec::new();
    let mut input = input;

    loop {
        let (rest, node) = parse_node(input, depth, config)?;
        let continues = !node.is_atomic();
        steps.push(node);
        input = rest;
        if !continues {
            break;
        }

        let (rest, marker) = chain_marker(input)?;
        if marker.is_none() {
            break;
        }
        let (rest, _) = skip_space(rest)?;
        if rest.is_empty() || rest.starts_with(')') {
            return fatal(
                rest,
                ParseErrorKind::MissingExpression,
                "expected expression after ';'",
                rest.get(..1).map(str::to_owned),
            );
        }
        input = rest;
    }

    let mut steps = steps.into_iter().rev();
    let Some(mut expr) = steps.next() else {
        return fatal(
            input,
            ParseErrorKind::MissingExpression,
            "expected expression",
            None,
        );
    };
    for step in steps {
        expr = step.with_chain(expr);
    }
    Ok((input, expr))
}

/// Read the next top-level expression from `text` with the default configuration.
///
/// Returns the expression and the unread remainder, or `None` when only whitespace
/// is left.
pub fn read_expression(text: &str) -> Result<Option<(Expression, &str)>, Error> {
    read_expression_with_config(text, &ParseConfig::default())
}

/// Read the next top-level expression from `text`.
pub fn read_expression_with_config<'a>(
    text: &'a str,
    config: &ParseConfig,
) -> Result<Option<(Expression, &'a str)>, Error> {
    let start = text.trim_start();
    if start.is_empty() {
        return Ok(None);
    }

    match parse_expression(start, 0, config) {
        Ok((rest, expr)) => {
            tracing::trace!(expression = %expr, "read top-level expression");
            Ok(Some((expr, rest)))
        }
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => {
            let error = e.into_parse_error(text);
            tracing::debug!(%error, "read failed");
            Err(error.into())
        }
        Err(nom::Err::Incomplete(_)) => Err(ParseError::from_message(
            ParseErrorKind::Incomplete,
            "incomplete input",
        )
        .into()),
    }
}

/// Iterator over the top-level expressions of a source text.
///
/// Yields `Err` at most once; iteration stops after the first error.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    rest: &'a str,
    config: ParseConfig,
    failed: bool,
}

impl<'a> Reader<'a> {
    pub fn new(text: &'a str) -> Self {
        Self::with_config(text, ParseConfig::default())
    }

    pub fn with_config(text: &'a str, config: ParseConfig) -> Self {
        Reader {
            rest: text,
            config,
            failed: false,
        }
    }

    /// The text not yet consumed
    pub fn remaining(&self) -> &'a str {
        self.rest
    }
}

impl Iterator for Reader<'_> {
    type Item = Result<Expression, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match read_expression_with_config(self.rest, &self.config) {
            Ok(Some((expr, rest))) => {
                self.rest = rest;
                Some(Ok(expr))
            }
            Ok(None) => {
                self.rest = "";
                None
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Read every top-level expression in `text`
pub fn parse_program(text: &str) -> Result<Vec<Expression>, Error> {
    Reader::new(text).collect()
}

pub fn parse_program_with_config(
    text: &str,
    config: ParseConfig,
) -> Result<Vec<Expression>, Error> {
    Reader::with_config(text, config).collect()
}
