//! Spork - reader, structural type checker and evaluator for a small Lisp-family language
//!
//! This crate provides the semantic core of Spork: a reader that turns source text into
//! an expression tree, a syntax-directed structural type checker, and a tree-walking
//! evaluator with lexical closures.
//!
//! ```text
//! (+ 1 2)                       ; builtin application
//! (if (< 1 2) "yes" "no")       ; conditionals require a boolean
//! (let x 5 (* x x))             ; scoped binding
//! (let sq (fn (n) (* n n))); (sq 7)   ; binding, then a chained expression
//! (. 1 2.0 true)                ; tuple construction
//! (# anything at all)           ; comment form
//! ```
//!
//! ## Pipeline
//!
//! Text is read once into an immutable [`ast::Expression`] tree. The type checker
//! ([`typechecker::infer`]) and the evaluator ([`evaluator::eval`]) are two independent
//! passes over that same tree. Either pass stops at the first error it finds and
//! reports it as an [`Error`]; nothing is recovered or partially computed.
//!
//! ## Modules
//!
//! - `escape`: string-literal escape codec
//! - `literal`: classification of raw tokens into literals
//! - `reader`: text to expression trees
//! - `types` / `typechecker`: structural types and their inference
//! - `value` / `evaluator` / `builtinops`: runtime values, evaluation and native builtins

use std::fmt;

use crate::types::Type;

/// Maximum list nesting accepted by the reader.
/// Deeper input is rejected instead of risking a stack overflow.
pub const MAX_PARSE_DEPTH: usize = 128;

/// Maximum evaluation depth, counting nested expression evaluation and closure calls.
/// Set higher than the parse depth so closure application has room to recurse.
pub const MAX_EVAL_DEPTH: usize = 256;

/// Categorizes the different kinds of syntax errors.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (stray closing paren, backslash-led symbol, raw newline in a string)
    InvalidSyntax,
    /// A token shaped like a literal that cannot be decoded (bad escape, out-of-range integer)
    InvalidLiteral,
    /// Input ended before the expression was complete (unterminated string, unclosed parens)
    Incomplete,
    /// An expression was required but none was found (e.g. after a `;`)
    MissingExpression,
    /// List nesting exceeded the configured maximum depth
    TooDeeplyNested,
}

/// A structured error providing detailed information about a syntax failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
    /// The problematic token or character encountered, if identifiable
    pub found: Option<String>,
}

impl ParseError {
    /// Create a ParseError with all fields
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        context: Option<String>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
            found,
        }
    }

    /// Create a simple ParseError with a kind and message but no context
    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None, None)
    }

    /// Create a ParseError with context extracted from input at a given byte offset
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
    ) -> Self {
        Self::with_context_and_found(kind, message, input, error_offset, None)
    }

    /// Create a ParseError with context and found token
    pub fn with_context_and_found(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
        found: Option<String>,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        // Offsets are byte positions; count characters up to the error so we never split a char
        let error_chars = input
            .char_indices()
            .take_while(|(i, _)| *i < error_offset)
            .count();
        let context_start = error_chars.saturating_sub(20);

        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.chars().count() < input.chars().count() {
            display_context.push_str("[...]");
        }

        // Replace newlines with visible markers for better error display
        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        Self::new(kind, message, Some(display_context), found)
    }

    /// Attach the offending token if one was not recorded yet
    pub(crate) fn or_found(mut self, found: impl Into<String>) -> Self {
        if self.found.is_none() {
            self.found = Some(found.into());
        }
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "syntax error: {}", self.message)?;
        if let Some(found) = &self.found {
            write!(f, "\nFound: {found}")?;
        }
        if let Some(context) = &self.context {
            write!(f, "\nContext: {context}")?;
        }
        Ok(())
    }
}

/// Error types for reading, type checking and evaluation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Malformed source text
    #[error("{0}")]
    ParseError(ParseError),

    /// A symbol the type checker cannot resolve in either environment layer
    #[error("type error: symbol \"{0}\" is not defined")]
    UndefinedSymbol(String),

    /// An argument whose inferred type differs from the declared parameter type
    #[error("type mismatch in argument {position}: expected {expected}, found {found}")]
    TypeMismatch {
        position: usize,
        expected: Type,
        found: Type,
    },

    /// Any other rule violation detected by the type checker, or a runtime value of the wrong kind
    #[error("type error: {0}")]
    TypeError(String),

    /// Reference to a binding that does not exist at runtime
    #[error("undefined binding: {0}")]
    UnboundVariable(String),

    /// Application of a value that is neither a builtin nor a closure
    #[error("cannot call non-function value: {0}")]
    NotCallable(String),

    /// Runtime failure inside evaluation (overflow, division by zero, depth limit)
    #[error("evaluation error: {0}")]
    EvalError(String),

    #[error("{}", format_arity(.expected, .got, .expression))]
    ArityError {
        expected: usize,
        got: usize,
        expression: Option<String>, // Optional expression context
    },
}

fn format_arity(expected: &usize, got: &usize, expression: &Option<String>) -> String {
    match expression {
        Some(expr) => format!("arity error: {expr}: expected {expected} arguments, got {got}"),
        None => format!("arity error: expected {expected} arguments but got {got}"),
    }
}

impl Error {
    /// Create an ArityError without expression context
    pub fn arity_error(expected: usize, got: usize) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: None,
        }
    }

    /// Create an ArityError with expression context
    pub fn arity_error_with_expr(expected: usize, got: usize, expression: String) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: Some(expression),
        }
    }
}

impl From<ParseError> for Error {
    fn from(error: ParseError) -> Self {
        Error::ParseError(error)
    }
}

pub mod ast;
pub mod builtinops;
pub mod escape;
pub mod evaluator;
pub mod literal;
pub mod reader;
pub mod typechecker;
pub mod types;
pub mod value;
