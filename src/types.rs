//! Structural types assigned by the type checker.

use std::fmt;

use crate::ast::LiteralKind;

/// A structural type. Equality is structural all the way down.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// int, float, bool or string
    Literal(LiteralKind),
    /// A nominal type, equal only to a type of the same name
    Defined(String),
    Tuple(Vec<Type>),
    /// Parameter slots are `None` when unconstrained (accept any argument)
    Function {
        params: Vec<Option<Type>>,
        ret: Box<Type>,
    },
}

impl Type {
    pub const INT: Type = Type::Literal(LiteralKind::Integer);
    pub const FLOAT: Type = Type::Literal(LiteralKind::Float);
    pub const BOOL: Type = Type::Literal(LiteralKind::Boolean);
    pub const STRING: Type = Type::Literal(LiteralKind::String);

    /// Function type whose every parameter slot is constrained
    pub fn function(params: Vec<Type>, ret: Type) -> Self {
        Type::Function {
            params: params.into_iter().map(Some).collect(),
            ret: Box::new(ret),
        }
    }

    /// Function type with explicit slots
    pub fn function_with_slots(params: Vec<Option<Type>>, ret: Type) -> Self {
        Type::Function {
            params,
            ret: Box::new(ret),
        }
    }
}

impl From<LiteralKind> for Type {
    fn from(kind: LiteralKind) -> Self {
        Type::Literal(kind)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Literal(kind) => write!(f, "{kind}"),
            Type::Defined(name) => f.write_str(name),
            Type::Tuple(components) => {
                write!(f, "(")?;
                for (i, component) in components.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{component}")?;
                }
                write!(f, ")")
            }
            Type::Function { params, ret } => {
                write!(f, "(fn (")?;
                for (i, slot) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    match slot {
                        Some(ty) => write!(f, "{ty}")?,
                        None => write!(f, "_")?,
                    }
                }
                write!(f, ") {ret})")
            }
        }
    }
}
