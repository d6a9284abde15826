//! Classification of raw tokens into literals.
//!
//! The reader hands every atom token to [`match_literal`], which tries the integer,
//! boolean, float and string matchers in that order and returns the first match.
//! `Ok(None)` means the token is not a literal and should be read as a symbol; an
//! `Err` means the token is shaped like a literal but cannot be decoded, which is a
//! syntax error.

use nom::{
    IResult, Parser,
    bytes::complete::take_while1,
    character::complete::char,
    combinator::{all_consuming, opt, recognize},
    sequence::pair,
};

use crate::ast::{IntegerType, Literal};
use crate::escape;
use crate::{ParseError, ParseErrorKind};

/// Outcome of a single matcher: `Ok(None)` when the token is not of this kind
pub type MatchResult = Result<Option<Literal>, ParseError>;

/// Digits and `_` grouping separators
fn digit_run(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_digit() || c == '_').parse(input)
}

/// `-?[0-9_]+`
fn integer_shape(input: &str) -> IResult<&str, &str> {
    recognize(pair(opt(char('-')), digit_run)).parse(input)
}

/// `-?[0-9_]+\.[0-9_]+`
fn float_shape(input: &str) -> IResult<&str, &str> {
    recognize((opt(char('-')), digit_run, char('.'), digit_run)).parse(input)
}

fn without_underscores(token: &str) -> String {
    token.chars().filter(|c| *c != '_').collect()
}

fn has_digit(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
}

/// Match an integer literal such as `42`, `-7` or `1_000_000`
pub fn match_integer(token: &str) -> MatchResult {
    if all_consuming(integer_shape).parse(token).is_err() || !has_digit(token) {
        return Ok(None);
    }

    match without_underscores(token).parse::<IntegerType>() {
        Ok(n) => Ok(Some(Literal::Integer(n))),
        Err(_) => Err(ParseError::from_message(
            ParseErrorKind::InvalidLiteral,
            "integer literal out of range",
        )
        .or_found(token)),
    }
}

/// Match `true` or `false`
pub fn match_boolean(token: &str) -> MatchResult {
    Ok(match token {
        "true" => Some(Literal::Boolean(true)),
        "false" => Some(Literal::Boolean(false)),
        _ => None,
    })
}

/// Match a float literal such as `3.14`, `-0.5` or `1_000.000_1`
pub fn match_float(token: &str) -> MatchResult {
    if all_consuming(float_shape).parse(token).is_err() || !has_digit(token) {
        return Ok(None);
    }

    match without_underscores(token).parse::<f64>() {
        Ok(x) => Ok(Some(Literal::Float(x))),
        Err(_) => Err(ParseError::from_message(
            ParseErrorKind::InvalidLiteral,
            "malformed float literal",
        )
        .or_found(token)),
    }
}

/// Match a quoted string literal, decoding its escape sequences
pub fn match_string(token: &str) -> MatchResult {
    let Some(rest) = token.strip_prefix('"') else {
        return Ok(None);
    };
    let Some(raw) = rest.strip_suffix('"') else {
        return Err(ParseError::from_message(
            ParseErrorKind::Incomplete,
            "unterminated string literal",
        )
        .or_found(token));
    };

    escape::decode(raw).map(|s| Some(Literal::String(s))).map_err(|e| {
        let found = match e.found {
            Some(letter) => format!("\\{letter}"),
            None => "\\".to_owned(),
        };
        ParseError::from_message(ParseErrorKind::InvalidLiteral, e.to_string()).or_found(found)
    })
}

/// Try every literal matcher in priority order.
pub fn match_literal(token: &str) -> MatchResult {
    const MATCHERS: [fn(&str) -> MatchResult; 4] =
        [match_integer, match_boolean, match_float, match_string];

    for matcher in MATCHERS {
        if let Some(literal) = matcher(token)? {
            return Ok(Some(literal));
        }
    }
    Ok(None)
}
