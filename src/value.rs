//! Runtime values produced by the evaluator.

use std::fmt;
use std::sync::Arc;

use crate::Error;
use crate::ast::{Expression, IntegerType, Literal};
use crate::evaluator::Environment;
use crate::evaluator::intooperation::OperationFn;

/// A value produced by evaluation
#[derive(Clone)]
pub enum Value {
    Literal(Literal),
    Tuple(Vec<Value>),
    /// User-defined function with a snapshot of its defining environment.
    /// `name` is set when the closure was bound by `let`; a call then sees the
    /// closure under that name, which is what makes recursion possible.
    Closure {
        params: Vec<String>,
        body: Arc<Expression>,
        env: Environment,
        name: Option<String>,
    },
    /// Native function
    Builtin {
        id: String,
        func: Arc<OperationFn>,
    },
    /// Result of forms evaluated only for their effect (`let` without a body, `#`)
    Void,
}

impl Value {
    /// Short name of this value's kind, used in runtime type errors
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Literal(Literal::Integer(_)) => "int",
            Value::Literal(Literal::Float(_)) => "float",
            Value::Literal(Literal::Boolean(_)) => "bool",
            Value::Literal(Literal::String(_)) => "string",
            Value::Tuple(_) => "tuple",
            Value::Closure { .. } => "function",
            Value::Builtin { .. } => "builtin",
            Value::Void => "void",
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Literal(literal) => write!(f, "Literal({literal:?})"),
            Value::Tuple(items) => f.debug_tuple("Tuple").field(items).finish(),
            Value::Closure {
                params, body, name, ..
            } => write!(
                f,
                "Closure {{ name: {name:?}, params: {params:?}, body: {body} }}"
            ),
            Value::Builtin { id, .. } => write!(f, "Builtin({id})"),
            Value::Void => write!(f, "Void"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Literal(a), Value::Literal(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (
                Value::Closure {
                    params: p1,
                    body: b1,
                    env: e1,
                    name: n1,
                },
                Value::Closure {
                    params: p2,
                    body: b2,
                    env: e2,
                    name: n2,
                },
            ) => n1 == n2 && p1 == p2 && b1 == b2 && e1 == e2,
            (Value::Builtin { id: id1, .. }, Value::Builtin { id: id2, .. }) => id1 == id2,
            // Void never equals anything, itself included
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Literal(literal) => write!(f, "{literal}"),
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Value::Closure { params, body, .. } => {
                write!(f, "(fn ({}) {body})", params.join(" "))
            }
            Value::Builtin { id, .. } => write!(f, "#<builtin:{id}>"),
            Value::Void => write!(f, "#<void>"),
        }
    }
}

impl From<Literal> for Value {
    fn from(literal: Literal) -> Self {
        Value::Literal(literal)
    }
}

impl From<IntegerType> for Value {
    fn from(n: IntegerType) -> Self {
        Value::Literal(Literal::Integer(n))
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Literal(Literal::from(n))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Literal(Literal::Float(x))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Literal(Literal::Boolean(b))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Literal(Literal::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Literal(Literal::String(s))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Tuple(items)
    }
}

fn expected(kind: &str, found: &Value) -> Error {
    Error::TypeError(format!("expected {kind}, found {}", found.type_name()))
}

impl TryFrom<Value> for IntegerType {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Literal(Literal::Integer(n)) => Ok(n),
            other => Err(expected("int", &other)),
        }
    }
}

impl TryFrom<Value> for f64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Literal(Literal::Float(x)) => Ok(x),
            other => Err(expected("float", &other)),
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Literal(Literal::Boolean(b)) => Ok(b),
            other => Err(expected("bool", &other)),
        }
    }
}

impl TryFrom<Value> for String {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Literal(Literal::String(s)) => Ok(s),
            other => Err(expected("string", &other)),
        }
    }
}

/// Helper for building values in code and tests
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}
