use crate::Error;
use crate::MAX_EVAL_DEPTH;
use crate::ast::{Atom, Expression, Node};
use crate::builtinops::get_builtin_ops;
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub mod intooperation;

use intooperation::{IntoOperation, OperationFn};

/// One binding in an [`Environment`], linked to the bindings made before it
struct Binding {
    name: String,
    value: Value,
    prev: Option<Arc<Binding>>,
}

/// Runtime binding environment.
///
/// An ordered sequence of bindings; lookup scans from the newest entry backwards, so
/// a later binding shadows an earlier one of the same name. The sequence is a
/// persistent list of shared nodes: cloning is O(1), and a clone that is extended
/// never affects the original. Closures capture their environment this way.
#[derive(Clone, Default)]
pub struct Environment {
    newest: Option<Arc<Binding>>,
    len: usize,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            newest: None,
            len: 0,
        }
    }

    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        let prev = self.newest.take();
        self.newest = Some(Arc::new(Binding {
            name: name.into(),
            value,
            prev,
        }));
        self.len += 1;
    }

    /// Bindings from newest to oldest
    fn iter(&self) -> impl Iterator<Item = &Binding> {
        std::iter::successors(self.newest.as_deref(), |binding| binding.prev.as_deref())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.iter()
            .find(|binding| binding.name == name)
            .map(|binding| &binding.value)
    }

    /// Number of bindings, shadowed ones included
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.newest.is_none()
    }

    /// Drop every binding made after the environment had `len` entries
    fn truncate(&mut self, len: usize) {
        while self.len > len {
            let Some(newest) = self.newest.take() else {
                break;
            };
            self.newest = newest.prev.clone();
            self.len -= 1;
        }
    }

    /// Register a custom builtin function that works on raw values.
    ///
    /// This is the low-level API: it accepts a function that already works on
    /// `&[Value]` and returns `Result<Value, Error>`. For most new code, prefer
    /// [`Environment::register_builtin_operation`].
    ///
    /// # Example
    /// ```
    /// use spork::evaluator::create_global_env;
    /// use spork::value::Value;
    /// use spork::Error;
    ///
    /// fn count_args(args: &[Value]) -> Result<Value, Error> {
    ///     Ok(Value::from(args.len() as i64))
    /// }
    ///
    /// let mut env = create_global_env();
    /// env.register_builtin_function("count", count_args);
    /// // Now (count 1 2 3) evaluates to 3
    /// ```
    pub fn register_builtin_function(
        &mut self,
        name: &str,
        func: fn(&[Value]) -> Result<Value, Error>,
    ) {
        let wrapped: Arc<OperationFn> = Arc::new(move |args: Vec<Value>| func(&args));
        self.define(
            name,
            Value::Builtin {
                id: name.to_owned(),
                func: wrapped,
            },
        );
    }

    /// Register a strongly-typed Rust function as a builtin operation using
    /// automatic argument extraction and result conversion.
    ///
    /// ```
    /// use spork::evaluator::create_global_env;
    ///
    /// fn average(a: i64, b: i64) -> i64 {
    ///     (a + b) / 2
    /// }
    ///
    /// let mut env = create_global_env();
    /// env.register_builtin_operation::<(i64, i64), _>("average", average);
    /// ```
    ///
    /// Supported parameter types:
    /// - `i64` (int), `f64` (float), `bool` (bool)
    /// - `&str` (borrowed string contents) and `String` (owned)
    /// - `Value` (owned access to the raw value)
    ///
    /// Supported return types:
    /// - any type `R` where `R: Into<Value>` (for example `Value`, `i64`, `bool`, `String`)
    /// - `Result<R, Error>` where `R: Into<Value>`
    ///
    /// Arity is enforced automatically and conversion failures yield `TypeError`.
    pub fn register_builtin_operation<Args, F>(&mut self, name: &str, func: F)
    where
        F: IntoOperation<Args>,
    {
        self.define(
            name,
            Value::Builtin {
                id: name.to_owned(),
                func: func.into_operation(),
            },
        );
    }

    /// The visible binding for every name (newest wins), sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut visible = HashMap::new();
        for binding in self.iter() {
            visible
                .entry(binding.name.clone())
                .or_insert_with(|| binding.value.clone());
        }

        let mut result: Vec<_> = visible.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|binding| (&binding.name, &binding.value)))
            .finish()
    }
}

impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        if self.len != other.len {
            return false;
        }
        let mut left = self.newest.as_ref();
        let mut right = other.newest.as_ref();
        loop {
            match (left, right) {
                (None, None) => return true,
                // Shared tails are equal without walking them
                (Some(a), Some(b)) if Arc::ptr_eq(a, b) => return true,
                (Some(a), Some(b)) if a.name == b.name && a.value == b.value => {
                    left = a.prev.as_ref();
                    right = b.prev.as_ref();
                }
                _ => return false,
            }
        }
    }
}

impl Drop for Environment {
    // Unlink uniquely owned nodes one at a time so a long environment cannot
    // overflow the stack through recursive drops
    fn drop(&mut self) {
        let mut next = self.newest.take();
        while let Some(node) = next {
            next = match Arc::try_unwrap(node) {
                Ok(mut binding) => binding.prev.take(),
                Err(_) => break,
            };
        }
    }
}

/// Forms the evaluator handles itself instead of applying a function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialForm {
    /// `(# ...)` evaluates nothing
    Comment,
    /// `(let name value)` or `(let name value body)`
    Let,
    /// `(fn (params...) body)`
    Fn,
    /// `(if condition then else)`
    If,
}

impl SpecialForm {
    /// Checked in this order when classifying a list head
    pub const ALL: [SpecialForm; 4] = [
        SpecialForm::Comment,
        SpecialForm::Let,
        SpecialForm::Fn,
        SpecialForm::If,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            SpecialForm::Comment => "#",
            SpecialForm::Let => "let",
            SpecialForm::Fn => "fn",
            SpecialForm::If => "if",
        }
    }

    pub fn from_symbol(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|form| form.keyword() == name)
    }
}

/// Evaluate an expression, including any chained successors (public API)
pub fn eval(expr: &Expression, env: &mut Environment) -> Result<Value, Error> {
    eval_with_depth_tracking(expr, env, 0)
}

/// Evaluate with depth tracking to prevent stack overflow.
///
/// Chained steps run one after another in the same environment; the last step's
/// value is the result.
fn eval_with_depth_tracking(
    expr: &Expression,
    env: &mut Environment,
    depth: usize,
) -> Result<Value, Error> {
    if depth >= MAX_EVAL_DEPTH {
        return Err(Error::EvalError(format!(
            "Evaluation depth limit exceeded (max: {MAX_EVAL_DEPTH})"
        )));
    }

    let mut result = Value::Void;
    for step in expr.steps() {
        result = eval_step(step, env, depth)?;
    }
    Ok(result)
}

/// Evaluate a single node, ignoring its chain
fn eval_step(expr: &Expression, env: &mut Environment, depth: usize) -> Result<Value, Error> {
    match &expr.node {
        Node::Atom(Atom::Literal(literal)) => Ok(Value::Literal(literal.clone())),

        // Variable lookup
        Node::Atom(Atom::Symbol(name)) => env
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnboundVariable(name.clone())),

        Node::List(elements) => {
            eval_list(elements, env, depth).map_err(|err| add_context(err, expr))
        }
    }
}

/// Helper function to add expression context to errors
fn add_context(error: Error, expr: &Expression) -> Error {
    let context = format!("while evaluating: {}", expr.head_form());
    match error {
        Error::EvalError(msg) => Error::EvalError(format!("{msg}\n  Context: {context}")),
        Error::TypeError(msg) => Error::TypeError(format!("{msg}\n  Context: {context}")),
        // Unbound variables and arity errors carry their own context
        other => other,
    }
}

/// Helper function to evaluate argument expressions left to right with depth tracking
fn eval_args(
    args: &[Expression],
    env: &mut Environment,
    depth: usize,
) -> Result<Vec<Value>, Error> {
    args.iter()
        .map(|arg| eval_with_depth_tracking(arg, env, depth + 1))
        .collect()
}

/// Evaluate a list: a special form, or a function application
fn eval_list(elements: &[Expression], env: &mut Environment, depth: usize) -> Result<Value, Error> {
    match elements {
        [] => Err(Error::EvalError("Cannot evaluate empty list".to_owned())),

        [head, args @ ..] => {
            if let Some(form) = head.as_symbol().and_then(SpecialForm::from_symbol) {
                return match form {
                    SpecialForm::Comment => Ok(Value::Void),
                    SpecialForm::Let => eval_let(args, env, depth),
                    SpecialForm::Fn => eval_fn(args, env),
                    SpecialForm::If => eval_if(args, env, depth),
                };
            }

            // Function application: evaluate the head, then the arguments
            let func = eval_with_depth_tracking(head, env, depth + 1)?;
            let args = eval_args(args, env, depth)?;
            apply(func, args, depth)
        }
    }
}

/// Invoke a builtin or closure on already-evaluated arguments
fn apply(func: Value, args: Vec<Value>, depth: usize) -> Result<Value, Error> {
    match func {
        Value::Builtin { func, .. } => func(args),
        Value::Closure {
            params,
            body,
            env: captured,
            name,
        } => {
            if params.len() != args.len() {
                return Err(Error::arity_error_with_expr(
                    params.len(),
                    args.len(),
                    format!("(fn ({}) {body})", params.join(" ")),
                ));
            }

            tracing::trace!(name = ?name, params = ?params, "applying closure");

            // Each call extends its own view of the shared captured environment
            let mut call_env = captured.clone();
            if let Some(name) = &name {
                call_env.define(
                    name.clone(),
                    Value::Closure {
                        params: params.clone(),
                        body: Arc::clone(&body),
                        env: captured,
                        name: Some(name.clone()),
                    },
                );
            }
            for (param, arg) in params.into_iter().zip(args) {
                call_env.define(param, arg);
            }

            eval_with_depth_tracking(&body, &mut call_env, depth + 1).map_err(|err| match err {
                Error::EvalError(msg) => Error::EvalError(format!("{msg}\n  In fn: {body}")),
                Error::TypeError(msg) => Error::TypeError(format!("{msg}\n  In fn: {body}")),
                other => other,
            })
        }
        other => Err(Error::NotCallable(other.to_string())),
    }
}

/// Evaluate let special form.
///
/// `(let name value)` appends a binding that stays visible to later steps and
/// yields Void. `(let name value body)` scopes the binding to `body` and yields its
/// value.
pub(crate) fn eval_let(
    args: &[Expression],
    env: &mut Environment,
    depth: usize,
) -> Result<Value, Error> {
    let (name_expr, value_expr, body) = match args {
        [name, value] => (name, value, None),
        [name, value, body] => (name, value, Some(body)),
        _ => return Err(Error::arity_error_with_expr(3, args.len(), "let".into())),
    };
    let Some(name) = name_expr.as_symbol() else {
        return Err(Error::TypeError(format!(
            "let requires a symbol to bind, found {name_expr}"
        )));
    };

    // A function bound by name can call itself under that name
    let value = match eval_with_depth_tracking(value_expr, env, depth + 1)? {
        Value::Closure {
            params,
            body,
            env: captured,
            name: None,
        } if is_fn_form(value_expr) => Value::Closure {
            params,
            body,
            env: captured,
            name: Some(name.to_owned()),
        },
        value => value,
    };
    tracing::trace!(name, value = %value, "let binding");

    match body {
        None => {
            env.define(name, value);
            Ok(Value::Void)
        }
        Some(body) => {
            let mark = env.len();
            env.define(name, value);
            let result = eval_with_depth_tracking(body, env, depth + 1);
            env.truncate(mark);
            result
        }
    }
}

/// Whether `expr` is literally an `(fn ...)` form
fn is_fn_form(expr: &Expression) -> bool {
    expr.chain.is_none()
        && expr
            .as_list()
            .and_then(<[Expression]>::first)
            .and_then(Expression::as_symbol)
            == Some(SpecialForm::Fn.keyword())
}

/// Evaluate if special form
pub(crate) fn eval_if(
    args: &[Expression],
    env: &mut Environment,
    depth: usize,
) -> Result<Value, Error> {
    match args {
        [condition_expr, then_expr, else_expr] => {
            let condition = eval_with_depth_tracking(condition_expr, env, depth + 1)?;
            match bool::try_from(condition) {
                Ok(true) => eval_with_depth_tracking(then_expr, env, depth + 1),
                Ok(false) => eval_with_depth_tracking(else_expr, env, depth + 1),
                Err(_) => Err(Error::TypeError(
                    "if condition must be a boolean".to_owned(),
                )),
            }
        }
        _ => Err(Error::arity_error_with_expr(3, args.len(), "if".into())),
    }
}

/// Evaluate fn special form, capturing the current environment (an O(1) share)
pub(crate) fn eval_fn(args: &[Expression], env: &Environment) -> Result<Value, Error> {
    match args {
        [param_list, body] => {
            let Some(param_exprs) = param_list.as_list() else {
                return Err(Error::TypeError(
                    "fn parameters must be a list".to_owned(),
                ));
            };

            let mut params: Vec<String> = Vec::with_capacity(param_exprs.len());
            for param in param_exprs {
                let Some(name) = param.as_symbol() else {
                    return Err(Error::TypeError(format!(
                        "fn parameters must be symbols, found {param}"
                    )));
                };
                if params.iter().any(|p| p == name) {
                    return Err(Error::EvalError(format!(
                        "Duplicate parameter name: {name}"
                    )));
                }
                params.push(name.to_owned());
            }

            Ok(Value::Closure {
                params,
                body: Arc::new(body.clone()),
                env: env.clone(),
                name: None,
            })
        }
        _ => Err(Error::arity_error_with_expr(2, args.len(), "fn".into())),
    }
}

/// Create a global environment with the built-in functions.
///
/// Besides the registry this binds `.`, which collects its arguments into a tuple.
/// It takes any number of arguments, so it has no registry signature; the type
/// checker handles `.` as a form instead.
pub fn create_global_env() -> Environment {
    let mut env = Environment::new();
    for builtin_op in get_builtin_ops() {
        env.define(builtin_op.id, builtin_op.to_value());
    }
    env.register_builtin_function(".", |args| Ok(Value::Tuple(args.to_vec())));
    env
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{list, sym};
    use crate::reader::parse_program;
    use crate::value::val;

    fn parse_one(input: &str) -> Expression {
        let mut program = parse_program(input).unwrap();
        assert_eq!(program.len(), 1, "expected a single expression in '{input}'");
        program.remove(0)
    }

    #[test]
    fn test_register_builtin_operation_add() {
        fn add(a: i64, b: i64) -> i64 {
            a + b
        }
        let mut env = create_global_env();
        env.register_builtin_operation::<(i64, i64), _>("add2", add);
        let result = eval(&parse_one("(add2 7 5)"), &mut env).unwrap();
        assert_eq!(result, val(12));
    }

    #[test]
    fn test_register_builtin_operation_zero_arg() {
        fn forty_two() -> i64 {
            42
        }

        let mut env = create_global_env();
        env.register_builtin_operation::<(), _>("forty-two", forty_two);
        let result = eval(&parse_one("(forty-two)"), &mut env).unwrap();
        assert_eq!(result, val(42));
    }

    #[test]
    fn test_register_builtin_operation_result_builtin() {
        fn safe_rem(a: i64, b: i64) -> Result<i64, Error> {
            a.checked_rem(b)
                .ok_or_else(|| Error::EvalError("remainder by zero".into()))
        }

        let mut env = create_global_env();
        env.register_builtin_operation::<(i64, i64), _>("rem", safe_rem);

        let result_ok = eval(&parse_one("(rem 7 3)"), &mut env).unwrap();
        assert_eq!(result_ok, val(1));

        let err = eval(&parse_one("(rem 1 0)"), &mut env).unwrap_err();
        assert!(format!("{err}").contains("remainder by zero"));
    }

    #[test]
    fn test_register_builtin_operation_string_params() {
        fn join(a: &str, b: &str) -> String {
            format!("{a}{b}")
        }

        let mut env = create_global_env();
        env.register_builtin_operation::<(&str, &str), _>("join", join);
        let result = eval(&parse_one("(join \"foo\" \"bar\")"), &mut env).unwrap();
        assert_eq!(result, val("foobar"));

        let err = eval(&parse_one("(join \"foo\" 1)"), &mut env).unwrap_err();
        assert!(matches!(err, Error::TypeError(_)), "got {err:?}");
    }

    #[test]
    fn test_register_builtin_function_raw() {
        fn count_args(args: &[Value]) -> Result<Value, Error> {
            Ok(Value::from(args.len() as i64))
        }

        let mut env = create_global_env();
        env.register_builtin_function("count", count_args);
        let result = eval(&parse_one("(count 1 \"two\" 3.0)"), &mut env).unwrap();
        assert_eq!(result, val(3));
    }

    #[test]
    fn test_environment_shadowing_and_bindings() {
        let mut env = Environment::new();
        assert!(env.is_empty());
        env.define("x", val(1));
        env.define("y", val(2));
        env.define("x", val(3));
        assert_eq!(env.get("x"), Some(&val(3)));
        assert_eq!(env.get("y"), Some(&val(2)));
        assert_eq!(env.get("z"), None);
        assert_eq!(env.len(), 3);
        assert_eq!(
            env.get_all_bindings(),
            vec![("x".to_owned(), val(3)), ("y".to_owned(), val(2))]
        );
    }

    #[test]
    fn test_special_form_lookup() {
        assert_eq!(SpecialForm::from_symbol("#"), Some(SpecialForm::Comment));
        assert_eq!(SpecialForm::from_symbol("let"), Some(SpecialForm::Let));
        assert_eq!(SpecialForm::from_symbol("fn"), Some(SpecialForm::Fn));
        assert_eq!(SpecialForm::from_symbol("if"), Some(SpecialForm::If));
        assert_eq!(SpecialForm::from_symbol("."), None);
        assert_eq!(SpecialForm::from_symbol("lambda"), None);
    }

    /// Test result variants for data-driven evaluation tests
    #[derive(Debug)]
    enum TestResult {
        EvalResult(Value),           // Evaluation should succeed with this value
        Void,                        // Evaluation should succeed with Void
        SpecificError(&'static str), // Evaluation should fail with error containing this string
        AnyError,                    // Evaluation should fail (any error)
    }
    use TestResult::*;

    /// Test environment containing test cases that share state
    struct TestEnvironment(Vec<(&'static str, TestResult)>);

    /// Micro-helper for success cases
    fn success<T: Into<Value>>(value: T) -> TestResult {
        EvalResult(val(value))
    }

    /// Run tests in isolated environments with shared state
    fn run_tests_in_environment(test_environments: Vec<TestEnvironment>) {
        for (env_idx, TestEnvironment(test_cases)) in test_environments.iter().enumerate() {
            let mut env = create_global_env();

            for (test_idx, (input, expected)) in test_cases.iter().enumerate() {
                let test_id = format!("Environment #{} test #{}", env_idx + 1, test_idx + 1);
                execute_test_case(input, expected, &mut env, &test_id);
            }
        }
    }

    /// Execute a single test case with detailed error reporting
    fn execute_test_case(input: &str, expected: &TestResult, env: &mut Environment, test_id: &str) {
        let expr = parse_one(input);

        match (eval(&expr, env), expected) {
            (Ok(actual), EvalResult(expected_val)) => {
                assert_eq!(actual, *expected_val, "{test_id}: wrong result for '{input}'");
            }
            (Ok(actual), Void) => {
                assert!(actual.is_void(), "{test_id}: expected void, got {actual:?}");
            }
            (Err(_), AnyError) => {} // Expected generic error
            (Err(e), SpecificError(expected_text)) => {
                let error_msg = format!("{e}");
                assert!(
                    error_msg.contains(expected_text),
                    "{test_id}: error should contain '{expected_text}', got: {error_msg}"
                );
            }
            (Ok(actual), AnyError | SpecificError(_)) => {
                panic!("{test_id}: expected error for '{input}', got {actual:?}");
            }
            (Err(err), EvalResult(_) | Void) => {
                panic!("{test_id}: expected success for '{input}', got error {err:?}");
            }
        }
    }

    /// Each case runs in a fresh global environment
    fn run_comprehensive_tests(test_cases: Vec<(&str, TestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let mut env = create_global_env();
            let test_id = format!("#{}", i + 1);
            execute_test_case(input, expected, &mut env, &test_id);
        }
    }

    #[test]
    fn test_comprehensive_operations_data_driven() {
        let test_cases = vec![
            // === SELF-EVALUATING FORMS ===
            ("42", success(42)),
            ("-271", success(-271)),
            ("2.5", success(2.5)),
            ("true", success(true)),
            ("false", success(false)),
            ("\"hello world\"", success("hello world")),
            ("\"with\\\"quotes\"", success("with\"quotes")),
            // === ARITHMETIC ===
            ("(+ 1 2)", success(3)),
            ("(- 10 3)", success(7)),
            ("(* 6 7)", success(42)),
            ("(/ 9 2)", success(4)),
            ("(+ (* 2 3) (- 8 2))", success(12)),
            ("(+ 9223372036854775807 1)", SpecificError("integer overflow")),
            ("(/ 1 0)", SpecificError("division by zero")),
            ("(+ 1 true)", SpecificError("expected int, found bool")),
            ("(+ 1)", SpecificError("expected 2 arguments")),
            // === COMPARISON ===
            ("(== 5 5)", success(true)),
            ("(== 5 6)", success(false)),
            ("(< 3 5)", success(true)),
            ("(> 3 5)", success(false)),
            // === IF ===
            ("(if true 1 2)", success(1)),
            ("(if false 1 2)", success(2)),
            ("(if (< 1 2) \"yes\" \"no\")", success("yes")),
            ("(if false (/ 1 0) 7)", success(7)),
            ("(if 1 2 3)", SpecificError("if condition must be a boolean")),
            ("(if true 1)", SpecificError("arity error")),
            ("(if true 1 2 3)", SpecificError("arity error")),
            // === LET ===
            ("(let x 5 x)", success(5)),
            ("(let x \"hello world\" x)", success("hello world")),
            ("(let x 5 (* x x))", success(25)),
            ("(let x 1 (let x 2 x))", success(2)),
            ("(let x 1 (let y 2 (+ x y)))", success(3)),
            ("(let x 1)", Void),
            ("(let 5 1 2)", SpecificError("let requires a symbol")),
            ("(let x)", SpecificError("arity error")),
            ("(let x 1 2 3)", SpecificError("arity error")),
            ("(let x 1 x) ; x", SpecificError("undefined binding: x")),
            // === FN ===
            ("((fn (a b) (+ a b)) 2 3)", success(5)),
            ("((fn () 42))", success(42)),
            ("((fn (x) (* x x)) 4)", success(16)),
            ("(let sq (fn (n) (* n n)) (sq 7))", success(49)),
            ("(let twice (fn (f x) (f (f x))) (twice (fn (n) (+ n 3)) 1))", success(7)),
            ("(let add (fn (a) (fn (b) (+ a b))) ((add 10) 5))", success(15)),
            ("((fn (a b) a) 1)", SpecificError("expected 2 arguments, got 1")),
            ("(fn (a a) a)", SpecificError("Duplicate parameter name: a")),
            ("(fn a a)", SpecificError("fn parameters must be a list")),
            ("(fn (1) 1)", SpecificError("fn parameters must be symbols")),
            ("(fn (a))", SpecificError("arity error")),
            // === HIGHER ORDER BUILTINS ===
            ("((if true + *) 2 3)", success(5)),
            ("((if false + *) 2 3)", success(6)),
            ("(let op - (op 10 4))", success(6)),
            // === TUPLES ===
            ("(. 1 2.0 true)", EvalResult(val(vec![val(1), val(2.0), val(true)]))),
            ("(.)", EvalResult(Value::Tuple(vec![]))),
            ("(. (+ 1 2) (. \"s\"))", EvalResult(val(vec![val(3), val(vec![val("s")])]))),
            // === COMMENTS ===
            ("(# this is ignored (/ 1 0))", Void),
            ("(# note) ; 5", success(5)),
            // === CHAINS ===
            ("(let x 5) ; x", success(5)),
            ("(let x 1) ; (let y 2) ; (+ x y)", success(3)),
            ("(let sq (fn (n) (* n n))) ; (sq 7)", success(49)),
            ("(+ 1 2) ; (* 2 3)", success(6)),
            ("(+ (let z 4) ; z 1)", success(5)),
            // === ERRORS ===
            ("()", SpecificError("Cannot evaluate empty list")),
            ("undefined-var", SpecificError("undefined binding: undefined-var")),
            ("(1 2 3)", SpecificError("cannot call non-function value: 1")),
            ("(\"f\" 1)", AnyError),
            ("((let x 1) 2)", SpecificError("cannot call non-function value: #<void>")),
            ("(unknown 1)", SpecificError("undefined binding: unknown")),
        ];

        run_comprehensive_tests(test_cases);
    }

    #[test]
    fn test_tuple_values_from_builtins() {
        let mut env = create_global_env();
        env.register_builtin_operation::<(Value, Value), _>("pair", |a: Value, b: Value| {
            Value::Tuple(vec![a, b])
        });
        let result = eval(&parse_one("(pair 1 (pair true \"s\"))"), &mut env).unwrap();
        assert_eq!(result, val(vec![val(1), val(vec![val(true), val("s")])]));
        assert_eq!(result.to_string(), "(1 (true \"s\"))");
    }

    #[test]
    fn test_environment_persistence() {
        let test_environments = vec![
            TestEnvironment(vec![
                ("(let x 10)", Void),
                ("(let y 20)", Void),
                ("(+ x y)", success(30)),
                ("(let x 1)", Void),
                ("(+ x y)", success(21)),
            ]),
            TestEnvironment(vec![
                ("(let base 100)", Void),
                ("(let add-base (fn (n) (+ n base)))", Void),
                ("(add-base 5)", success(105)),
                // Closures see their defining environment, not later rebindings
                ("(let base 0)", Void),
                ("(add-base 5)", success(105)),
            ]),
            TestEnvironment(vec![
                ("(let f (fn (a) a))", Void),
                ("(f 1)", success(1)),
                // Parameters do not leak into the caller
                ("a", SpecificError("undefined binding: a")),
            ]),
            TestEnvironment(vec![
                // A let-bound closure sees its own name, so runaway recursion
                // stops at the depth limit
                ("(let loop (fn (n) (loop n)))", Void),
                ("(loop 1)", SpecificError("Evaluation depth limit exceeded")),
            ]),
            TestEnvironment(vec![
                (
                    "(let fact (fn (n) (if (< n 2) 1 (* n (fact (- n 1))))))",
                    Void,
                ),
                ("(fact 10)", success(3_628_800)),
                ("(let count-down (fn (n) (if (== n 0) \"done\" (count-down (- n 1)))))", Void),
                ("(count-down 5)", success("done")),
                // Recursive calls do not leak parameters into the caller
                ("n", SpecificError("undefined binding: n")),
                // Only the bound name is visible, later rebindings are not
                ("(let alias fact)", Void),
                ("(alias 4)", success(24)),
                ("(let fact (fn (n) 0))", Void),
                ("(alias 4)", success(24)),
                // Scoped let names the closure too
                ("(let sum (fn (n) (if (< n 1) 0 (+ n (sum (- n 1))))) (sum 4))", success(10)),
                // A parameter shadows the closure's own name
                ("(let shadow (fn (shadow) shadow) (shadow 7))", success(7)),
            ]),
        ];

        run_tests_in_environment(test_environments);
    }

    #[test]
    fn test_many_closures_share_captured_environments() {
        // Each capture shares the environment instead of copying it, so a long run
        // of definitions stays linear
        let mut env = create_global_env();
        let count = 200;
        for i in 0..count {
            let source = format!("(let f{i} (fn (x) (+ x {i})))");
            let result = eval(&parse_one(&source), &mut env).unwrap();
            assert!(result.is_void(), "definition #{i} returned {result:?}");
        }

        assert_eq!(eval(&parse_one("(f0 1)"), &mut env).unwrap(), val(1));
        assert_eq!(
            eval(&parse_one(&format!("(f{} 1)", count - 1)), &mut env).unwrap(),
            val(count)
        );
        assert_eq!(env.len(), create_global_env().len() + 200);

        // A closure captures the environment as it was, later definitions excluded
        let Some(Value::Closure { env: captured, .. }) = env.get("f0").cloned() else {
            panic!("f0 should be a closure");
        };
        assert_eq!(captured, create_global_env());
        assert!(captured.get("f1").is_none());
    }

    #[test]
    fn test_scoped_let_restores_environment() {
        let mut env = create_global_env();
        eval(&parse_one("(let x 1)"), &mut env).unwrap();
        let before = env.clone();
        let result = eval(&parse_one("(let y 2 (let z 3 (+ x (+ y z))))"), &mut env).unwrap();
        assert_eq!(result, val(6));
        assert_eq!(env, before);
        assert!(env.get("y").is_none());
    }

    #[test]
    fn test_closure_values() {
        let mut env = create_global_env();
        let closure = eval(&parse_one("(fn (a b) (+ a b))"), &mut env).unwrap();
        assert_eq!(closure.to_string(), "(fn (a b) (+ a b))");
        let Value::Closure { params, body, .. } = &closure else {
            panic!("expected a closure, got {closure:?}");
        };
        assert_eq!(params, &vec!["a".to_owned(), "b".to_owned()]);
        assert_eq!(**body, list([sym("+"), sym("a"), sym("b")]));

        let builtin = eval(&parse_one("+"), &mut env).unwrap();
        assert_eq!(builtin.to_string(), "#<builtin:+>");
    }

    #[test]
    fn test_error_context() {
        let mut env = create_global_env();
        let err = eval(&parse_one("(let x 1 (+ x (/ 1 0)))"), &mut env).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("division by zero"), "{msg}");
        assert!(msg.contains("while evaluating: (/ 1 0)"), "{msg}");

        let err = eval(&parse_one("((fn (n) (/ n 0)) 3)"), &mut env).unwrap_err();
        assert!(err.to_string().contains("In fn: (/ n 0)"), "{err}");
    }

    #[test]
    fn test_depth_limit() {
        // Self-application never terminates and must hit the depth limit
        let mut env = create_global_env();
        let expr = parse_one("((fn (f) (f f)) (fn (f) (f f)))");
        let err = eval(&expr, &mut env).unwrap_err();
        assert!(
            err.to_string().contains("Evaluation depth limit exceeded"),
            "{err}"
        );
    }
}
