//! This module defines the expression tree produced by the reader and consumed by both
//! the type checker and the evaluator. An [`Expression`] is either a single [`Atom`]
//! (a symbol or a [`Literal`]) or a parenthesized list of child expressions, and may
//! carry a chained successor introduced by `;`. Trees are built once, owned
//! exclusively, and compared structurally.
//!
//! Ergonomic helpers such as [`sym`], [`lit`] and [`list`] build trees in code and
//! tests. `Display` renders any tree back to source text that reads as an equal tree.

use std::fmt;

use crate::escape;

/// Type alias for integer literals in the interpreter
pub type IntegerType = i64;

/// The kind tag of a literal, shared by literal values and literal types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiteralKind {
    Integer,
    Float,
    Boolean,
    String,
}

impl fmt::Display for LiteralKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LiteralKind::Integer => "int",
            LiteralKind::Float => "float",
            LiteralKind::Boolean => "bool",
            LiteralKind::String => "string",
        };
        f.write_str(name)
    }
}

/// A literal constant appearing in source text
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(IntegerType),
    Float(f64),
    Boolean(bool),
    /// Escape-decoded string contents
    String(String),
}

impl Literal {
    pub fn kind(&self) -> LiteralKind {
        match self {
            Literal::Integer(_) => LiteralKind::Integer,
            Literal::Float(_) => LiteralKind::Float,
            Literal::Boolean(_) => LiteralKind::Boolean,
            Literal::String(_) => LiteralKind::String,
        }
    }
}

impl From<IntegerType> for Literal {
    fn from(n: IntegerType) -> Self {
        Literal::Integer(n)
    }
}

impl From<i32> for Literal {
    fn from(n: i32) -> Self {
        Literal::Integer(IntegerType::from(n))
    }
}

impl From<f64> for Literal {
    fn from(x: f64) -> Self {
        Literal::Float(x)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Boolean(b)
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::String(s.to_owned())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::String(s)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Integer(n) => write!(f, "{n}"),
            Literal::Float(x) => {
                // Float tokens need a decimal point to be read back as floats
                let text = x.to_string();
                if text.contains('.') {
                    f.write_str(&text)
                } else {
                    write!(f, "{text}.0")
                }
            }
            Literal::Boolean(b) => write!(f, "{b}"),
            Literal::String(s) => write!(f, "\"{}\"", escape::encode(s)),
        }
    }
}

/// A single token: a symbol naming a binding or operator, or a literal
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    Symbol(String),
    Literal(Literal),
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Symbol(s) => f.write_str(s),
            Atom::Literal(literal) => write!(f, "{literal}"),
        }
    }
}

/// The shape of an expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Atom(Atom),
    /// A parenthesized form; the head, if any, is the first element
    List(Vec<Expression>),
}

/// Core tree type shared by the type checker and the evaluator
///
/// `chain` holds the expression that follows a `;` after a list. It is evaluated after
/// this one, in the same environment, and its result supersedes this one's.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub node: Node,
    pub chain: Option<Box<Expression>>,
}

impl Expression {
    pub fn atom(atom: Atom) -> Self {
        Expression {
            node: Node::Atom(atom),
            chain: None,
        }
    }

    pub fn list(elements: Vec<Expression>) -> Self {
        Expression {
            node: Node::List(elements),
            chain: None,
        }
    }

    /// Attach `next` as the chained successor, replacing any existing chain
    #[must_use]
    pub fn with_chain(mut self, next: Expression) -> Self {
        self.chain = Some(Box::new(next));
        self
    }

    pub fn is_atomic(&self) -> bool {
        matches!(self.node, Node::Atom(_))
    }

    /// The symbol name if this is an atomic symbol
    pub fn as_symbol(&self) -> Option<&str> {
        match &self.node {
            Node::Atom(Atom::Symbol(name)) => Some(name),
            _ => None,
        }
    }

    /// The elements if this is a list
    pub fn as_list(&self) -> Option<&[Expression]> {
        match &self.node {
            Node::List(elements) => Some(elements),
            Node::Atom(_) => None,
        }
    }

    /// This expression followed by every chained successor, in evaluation order
    pub fn steps(&self) -> impl Iterator<Item = &Expression> {
        std::iter::successors(Some(self), |expr| expr.chain.as_deref())
    }

    /// Render only this node, without its chain (used for error context)
    pub(crate) fn head_form(&self) -> String {
        match &self.node {
            Node::Atom(atom) => atom.to_string(),
            Node::List(elements) => {
                let parts: Vec<String> = elements.iter().map(ToString::to_string).collect();
                format!("({})", parts.join(" "))
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (n, step) in self.steps().enumerate() {
            if n > 0 {
                write!(f, " ; ")?;
            }
            match &step.node {
                Node::Atom(atom) => write!(f, "{atom}")?,
                Node::List(elements) => {
                    write!(f, "(")?;
                    for (i, elem) in elements.iter().enumerate() {
                        if i > 0 {
                            write!(f, " ")?;
                        }
                        write!(f, "{elem}")?;
                    }
                    write!(f, ")")?;
                }
            }
        }
        Ok(())
    }
}

/// Helper for building symbol atoms
pub fn sym<S: AsRef<str>>(name: S) -> Expression {
    Expression::atom(Atom::Symbol(name.as_ref().to_owned()))
}

/// Helper for building literal atoms from any convertible Rust value
pub fn lit<T: Into<Literal>>(value: T) -> Expression {
    Expression::atom(Atom::Literal(value.into()))
}

/// Helper for building list expressions
pub fn list<I: IntoIterator<Item = Expression>>(elements: I) -> Expression {
    Expression::list(elements.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_display_data_driven() {
        let test_cases = vec![
            (lit(42), "42"),
            (lit(-7), "-7"),
            (lit(100.0), "100.0"),
            (lit(-2.5), "-2.5"),
            (lit(true), "true"),
            (lit("a\tb\"c\""), r#""a\tb\"c\"""#),
            (sym("+"), "+"),
            (list([]), "()"),
            (
                list([sym("let"), sym("x"), lit("hello world"), sym("x")]),
                r#"(let x "hello world" x)"#,
            ),
            (
                list([sym("let"), sym("x"), lit(1)]).with_chain(list([sym("f"), sym("x")])),
                "(let x 1) ; (f x)",
            ),
        ];

        for (i, (expr, expected)) in test_cases.iter().enumerate() {
            assert_eq!(expr.to_string(), *expected, "Display test #{}", i + 1);
        }
    }

    #[test]
    fn test_steps_follow_chain() {
        let expr = list([sym("a")])
            .with_chain(list([sym("b")]).with_chain(list([sym("c")])));
        let heads: Vec<&str> = expr
            .steps()
            .filter_map(|step| step.as_list()?.first()?.as_symbol())
            .collect();
        assert_eq!(heads, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_literal_kinds() {
        assert_eq!(Literal::from(1).kind(), LiteralKind::Integer);
        assert_eq!(Literal::from(1.5).kind(), LiteralKind::Float);
        assert_eq!(Literal::from(false).kind(), LiteralKind::Boolean);
        assert_eq!(Literal::from("s").kind(), LiteralKind::String);
        assert_eq!(LiteralKind::Boolean.to_string(), "bool");
    }
}
