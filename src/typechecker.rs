//! Syntax-directed structural type checker.
//!
//! Types are assigned bottom-up with no unification: a literal has its literal type, a
//! symbol has whatever the environment says, and a list is an application whose head
//! must have a function type. The special forms `if`, `let` and `.` have no single
//! type of their own, so a handler computes a function type for each use and the
//! application check then treats the form like any other call.
//!
//! ```text
//! (+ 1 2)             ; int
//! (. 1 2.0 true)      ; (int float bool)
//! (if true 1 2)       ; int
//! (let x 5 (< x 1))   ; bool
//! (+ 1 true)          ; type mismatch in argument 2
//! ```
//!
//! Checking stops at the first violation; no partial types are produced.

use std::collections::HashMap;

use crate::Error;
use crate::ast::{Atom, Expression, Node};
use crate::builtinops::get_builtin_ops;
use crate::types::Type;

/// Forms in the base layer of the type environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeForm {
    /// `(if condition then else)`
    If,
    /// `(let name value body)`
    Let,
    /// `(. elements...)` builds a tuple
    TupleCtor,
}

impl TypeForm {
    pub const ALL: [TypeForm; 3] = [TypeForm::If, TypeForm::Let, TypeForm::TupleCtor];

    pub fn keyword(self) -> &'static str {
        match self {
            TypeForm::If => "if",
            TypeForm::Let => "let",
            TypeForm::TupleCtor => ".",
        }
    }

    pub fn from_symbol(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|form| form.keyword() == name)
    }
}

/// Two-layer type environment.
///
/// The base layer is the closed set of [`TypeForm`]s and always wins a lookup. The
/// dynamic layer maps symbols to types; scoped extension clones it, so a parent
/// environment is never changed by checking a child scope.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypeEnv {
    dynamic: HashMap<String, Type>,
}

impl TypeEnv {
    /// Environment seeded with the signature of every registered builtin
    pub fn new() -> Self {
        let mut env = Self::empty();
        for op in get_builtin_ops() {
            env.declare(op.id, op.signature.clone());
        }
        env
    }

    /// Environment with only the base layer
    pub fn empty() -> Self {
        TypeEnv {
            dynamic: HashMap::new(),
        }
    }

    /// Add or replace a symbol in the dynamic layer
    pub fn declare(&mut self, name: impl Into<String>, ty: Type) {
        self.dynamic.insert(name.into(), ty);
    }

    /// A copy of this environment with one extra binding
    #[must_use]
    pub fn with_binding(&self, name: impl Into<String>, ty: Type) -> Self {
        let mut scope = self.clone();
        scope.declare(name, ty);
        scope
    }

    /// Base-layer lookup
    pub fn form(&self, name: &str) -> Option<TypeForm> {
        TypeForm::from_symbol(name)
    }

    /// Dynamic-layer lookup
    pub fn get(&self, name: &str) -> Option<&Type> {
        self.dynamic.get(name)
    }

    /// Every dynamic binding, sorted by name
    pub fn bindings(&self) -> Vec<(&str, &Type)> {
        let mut result: Vec<_> = self
            .dynamic
            .iter()
            .map(|(name, ty)| (name.as_str(), ty))
            .collect();
        result.sort_by(|a, b| a.0.cmp(b.0));
        result
    }
}

/// How a single step of a chain is checked
enum Step<'e> {
    /// `(let name value)`: extends the environment for later steps
    Binding(&'e str, &'e Expression),
    /// `(# ...)`: skipped
    Comment,
    Expr(&'e Expression),
}

fn classify(step: &Expression) -> Result<Step<'_>, Error> {
    let Some([head, args @ ..]) = step.as_list() else {
        return Ok(Step::Expr(step));
    };
    match (head.as_symbol(), args) {
        (Some("#"), _) => Ok(Step::Comment),
        (Some("let"), [name, value]) => match name.as_symbol() {
            Some(name) => Ok(Step::Binding(name, value)),
            None => Err(Error::TypeError(format!(
                "let requires a symbol to bind, found {name}"
            ))),
        },
        _ => Ok(Step::Expr(step)),
    }
}

/// Infer the type of an expression, including any chained successors.
///
/// Bindings made by chain steps are visible to later steps only; `env` itself is
/// left untouched.
pub fn infer(expr: &Expression, env: &TypeEnv) -> Result<Type, Error> {
    if expr.chain.is_none()
        && let Step::Expr(single) = classify(expr)?
    {
        return infer_node(single, env);
    }

    let mut scope = env.clone();
    infer_toplevel(expr, &mut scope)?.ok_or_else(|| {
        Error::TypeError(format!(
            "{} has no type; a binding or comment must be followed by an expression",
            expr.steps().last().map_or_else(String::new, Expression::head_form)
        ))
    })
}

/// Infer a top-level expression, keeping its bindings in `env`.
///
/// Returns `None` when the last step is a binding or a comment, which have no type.
/// This is what a file or REPL session uses, so that `(let x 1)` on one line is
/// visible to the next.
#[tracing::instrument(level = "debug", skip_all, fields(expr = %expr))]
pub fn infer_toplevel(expr: &Expression, env: &mut TypeEnv) -> Result<Option<Type>, Error> {
    let mut last = None;
    for step in expr.steps() {
        last = match classify(step)? {
            Step::Binding(name, value) => {
                let ty = infer(value, env)?;
                tracing::trace!(name, ty = %ty, "declared binding");
                env.declare(name, ty);
                None
            }
            Step::Comment => None,
            Step::Expr(step) => Some(infer_node(step, env)?),
        };
    }
    Ok(last)
}

/// Infer a single node, ignoring its chain
fn infer_node(expr: &Expression, env: &TypeEnv) -> Result<Type, Error> {
    match &expr.node {
        Node::Atom(Atom::Literal(literal)) => Ok(Type::from(literal.kind())),
        Node::Atom(Atom::Symbol(name)) => infer_symbol(name, env),
        Node::List(elements) => infer_list(elements, env),
    }
}

fn infer_symbol(name: &str, env: &TypeEnv) -> Result<Type, Error> {
    if let Some(form) = env.form(name) {
        return Err(Error::TypeError(format!(
            "special form '{}' cannot be used as a value",
            form.keyword()
        )));
    }
    env.get(name)
        .cloned()
        .ok_or_else(|| Error::UndefinedSymbol(name.to_owned()))
}

fn infer_list(elements: &[Expression], env: &TypeEnv) -> Result<Type, Error> {
    let [head, args @ ..] = elements else {
        return Err(Error::TypeError("the empty list has no type".to_owned()));
    };

    let (signature, known) = match head.as_symbol().and_then(|name| env.form(name)) {
        Some(form) => check_form(form, args, env)?,
        None => (infer(head, env)?, vec![None; args.len()]),
    };

    check_application(head, &signature, args, known, env)
}

/// Compute the function type a special form takes at this use, along with any
/// argument types the handler already inferred
fn check_form(
    form: TypeForm,
    args: &[Expression],
    env: &TypeEnv,
) -> Result<(Type, Vec<Option<Type>>), Error> {
    match form {
        TypeForm::If => {
            let [_, then_branch, _] = args else {
                return Err(Error::arity_error_with_expr(3, args.len(), "if".into()));
            };
            let branch = infer(then_branch, env)?;
            let signature = Type::function(
                vec![Type::BOOL, branch.clone(), branch.clone()],
                branch.clone(),
            );
            Ok((signature, vec![None, Some(branch), None]))
        }

        TypeForm::Let => {
            let [name, value, body] = args else {
                return Err(Error::arity_error_with_expr(3, args.len(), "let".into()));
            };
            let Some(name) = name.as_symbol() else {
                return Err(Error::TypeError(format!(
                    "let requires a symbol to bind, found {name}"
                )));
            };
            let value_type = infer(value, env)?;
            let body_type = infer(body, &env.with_binding(name, value_type))?;
            Ok((
                Type::function_with_slots(vec![None; 3], body_type),
                vec![None; 3],
            ))
        }

        TypeForm::TupleCtor => {
            let components = args
                .iter()
                .map(|arg| infer(arg, env))
                .collect::<Result<Vec<_>, _>>()?;
            let signature =
                Type::function(components.clone(), Type::Tuple(components.clone()));
            Ok((signature, components.into_iter().map(Some).collect()))
        }
    }
}

/// Check arguments against a function type and yield its return type
fn check_application(
    head: &Expression,
    signature: &Type,
    args: &[Expression],
    known: Vec<Option<Type>>,
    env: &TypeEnv,
) -> Result<Type, Error> {
    let Type::Function { params, ret } = signature else {
        return Err(Error::TypeError(format!(
            "cannot apply a value of type {signature}"
        )));
    };
    if params.len() != args.len() {
        return Err(Error::arity_error_with_expr(
            params.len(),
            args.len(),
            head.head_form(),
        ));
    }

    for (position, ((slot, arg), known)) in params.iter().zip(args).zip(known).enumerate() {
        // Unconstrained slots accept anything and are not inspected
        let Some(expected) = slot else {
            continue;
        };
        let found = match known {
            Some(ty) => ty,
            None => infer(arg, env)?,
        };
        if found != *expected {
            return Err(Error::TypeMismatch {
                position: position + 1,
                expected: expected.clone(),
                found,
            });
        }
    }

    tracing::trace!(head = %head.head_form(), ret = %ret, "checked application");
    Ok((**ret).clone())
}
