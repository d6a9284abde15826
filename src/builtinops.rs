//! Built-in operations registry.
//!
//! Every native builtin is defined once here, with its name, its type signature and
//! its implementation. Both passes derive their starting environments from this
//! registry: the type checker seeds its dynamic layer with the signatures
//! ([`crate::typechecker::TypeEnv::new`]) and the evaluator binds the implementations
//! ([`crate::evaluator::create_global_env`]), so the two can never disagree about
//! which builtins exist.
//!
//! ```text
//! (+ 1 2)      ; 3
//! (/ 7 2)      ; 3, integer division
//! (== 4 4)     ; true
//! (< 1 2)      ; true
//! ```
//!
//! ## Error Handling
//!
//! - **Type Safety**: arguments of the wrong kind are a `TypeError`, there is no coercion
//! - **Overflow Detection**: arithmetic reports overflow as an `EvalError`
//! - **Division by zero** is an `EvalError`
//! - **Arity Checking**: argument counts are validated by the adapter layer
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** with typed parameters, e.g. `fn(i64, i64) -> Result<i64, Error>`
//! 2. **Add it to BUILTIN_OPS** with its name and signature
//! 3. **Add tests** covering edge cases and error conditions

use std::fmt;
use std::sync::{Arc, LazyLock};

use crate::Error;
use crate::ast::IntegerType;
use crate::evaluator::intooperation::{IntoOperation, OperationFn};
use crate::types::Type;
use crate::value::Value;

/// Definition of a built-in operation
#[derive(Clone)]
pub struct BuiltinOp {
    /// The symbol this operation is bound to
    pub id: &'static str,
    /// The type the checker assigns to the symbol
    pub signature: Type,
    /// The erased implementation
    pub func: Arc<OperationFn>,
}

impl fmt::Debug for BuiltinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinOp")
            .field("id", &self.id)
            .field("signature", &self.signature.to_string())
            .finish_non_exhaustive()
    }
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        // Operations are uniquely identified by their id
        self.id == other.id
    }
}

impl BuiltinOp {
    /// The runtime value bound to this operation's symbol
    pub fn to_value(&self) -> Value {
        Value::Builtin {
            id: self.id.to_owned(),
            func: Arc::clone(&self.func),
        }
    }
}

//
// Builtin Function Implementations
//

// Macro to generate checked integer arithmetic
macro_rules! checked_arithmetic {
    ($name:ident, $method:ident, $what:expr) => {
        fn $name(a: IntegerType, b: IntegerType) -> Result<IntegerType, Error> {
            a.$method(b)
                .ok_or_else(|| Error::EvalError(concat!("integer overflow in ", $what).into()))
        }
    };
}

checked_arithmetic!(builtin_add, checked_add, "addition");
checked_arithmetic!(builtin_sub, checked_sub, "subtraction");
checked_arithmetic!(builtin_mul, checked_mul, "multiplication");

fn builtin_div(a: IntegerType, b: IntegerType) -> Result<IntegerType, Error> {
    if b == 0 {
        return Err(Error::EvalError("division by zero".into()));
    }
    a.checked_div(b)
        .ok_or_else(|| Error::EvalError("integer overflow in division".into()))
}

// Macro to generate integer comparisons
macro_rules! integer_comparison {
    ($name:ident, $op:tt) => {
        fn $name(a: IntegerType, b: IntegerType) -> bool {
            a $op b
        }
    };
}

integer_comparison!(builtin_eq, ==);
integer_comparison!(builtin_lt, <);
integer_comparison!(builtin_gt, >);

/// Global registry of all built-in operations, built once on first use.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    fn builtin_fixed<Args, F>(f: F) -> Arc<OperationFn>
    where
        F: IntoOperation<Args>,
    {
        <F as IntoOperation<Args>>::into_operation(f)
    }

    let int_binary = Type::function(vec![Type::INT, Type::INT], Type::INT);
    let int_predicate = Type::function(vec![Type::INT, Type::INT], Type::BOOL);

    vec![
        // Arithmetic operations
        BuiltinOp {
            id: "+",
            signature: int_binary.clone(),
            func: builtin_fixed::<(IntegerType, IntegerType), _>(builtin_add),
        },
        BuiltinOp {
            id: "-",
            signature: int_binary.clone(),
            func: builtin_fixed::<(IntegerType, IntegerType), _>(builtin_sub),
        },
        BuiltinOp {
            id: "*",
            signature: int_binary.clone(),
            func: builtin_fixed::<(IntegerType, IntegerType), _>(builtin_mul),
        },
        BuiltinOp {
            id: "/",
            signature: int_binary,
            func: builtin_fixed::<(IntegerType, IntegerType), _>(builtin_div),
        },
        // Comparison operations
        BuiltinOp {
            id: "==",
            signature: int_predicate.clone(),
            func: builtin_fixed::<(IntegerType, IntegerType), _>(builtin_eq),
        },
        BuiltinOp {
            id: "<",
            signature: int_predicate.clone(),
            func: builtin_fixed::<(IntegerType, IntegerType), _>(builtin_lt),
        },
        BuiltinOp {
            id: ">",
            signature: int_predicate,
            func: builtin_fixed::<(IntegerType, IntegerType), _>(builtin_gt),
        },
    ]
});

/// Get all builtin operations, in registry order
pub fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::value::val;

    fn find_builtin_op(id: &str) -> Option<&'static BuiltinOp> {
        get_builtin_ops().iter().find(|op| op.id == id)
    }

    /// Invoke a builtin through the registry using the erased signature,
    /// which exercises the adapter layer as well as the implementation
    fn call_builtin(name: &str, args: &[Value]) -> Result<Value, Error> {
        let op = find_builtin_op(name).unwrap();
        (op.func)(args.to_vec())
    }

    #[test]
    fn test_builtin_ops_registry() {
        let ids: Vec<&str> = get_builtin_ops().iter().map(|op| op.id).collect();
        assert_eq!(ids, vec!["+", "-", "*", "/", "==", "<", ">"]);

        let add = find_builtin_op("+").unwrap();
        assert_eq!(add.signature, Type::function(vec![Type::INT, Type::INT], Type::INT));
        assert_eq!(add.signature.to_string(), "(fn (int int) int)");
        assert_eq!(add.to_value().to_string(), "#<builtin:+>");

        let lt = find_builtin_op("<").unwrap();
        assert_eq!(lt.signature.to_string(), "(fn (int int) bool)");

        assert!(std::ptr::eq(add, &get_builtin_ops()[0]));
        assert!(find_builtin_op("print").is_none());
        assert!(find_builtin_op("unknown").is_none());
    }

    /// Macro to create test cases, invoking builtins via the registry.
    macro_rules! test {
        ($name:expr, $args:expr, $expected:expr) => {
            ($name, call_builtin($name, $args), $expected)
        };
    }

    #[test]
    fn test_builtin_function_implementations() {
        type TestCase = (&'static str, Result<Value, Error>, Option<Value>);

        let test_cases: Vec<TestCase> = vec![
            // Arithmetic
            test!("+", &[val(1), val(2)], Some(val(3))),
            test!("+", &[val(-5), val(10)], Some(val(5))),
            test!("-", &[val(10), val(3)], Some(val(7))),
            test!("-", &[val(0), val(5)], Some(val(-5))),
            test!("*", &[val(6), val(7)], Some(val(42))),
            test!("*", &[val(-2), val(3)], Some(val(-6))),
            test!("/", &[val(7), val(2)], Some(val(3))),
            test!("/", &[val(-7), val(2)], Some(val(-3))),
            // Overflow and division by zero
            test!("+", &[val(i64::MAX), val(1)], None),
            test!("-", &[val(i64::MIN), val(1)], None),
            test!("*", &[val(i64::MAX / 2 + 1), val(2)], None),
            test!("/", &[val(1), val(0)], None),
            test!("/", &[val(i64::MIN), val(-1)], None),
            // Comparisons
            test!("==", &[val(4), val(4)], Some(val(true))),
            test!("==", &[val(4), val(5)], Some(val(false))),
            test!("<", &[val(1), val(2)], Some(val(true))),
            test!("<", &[val(2), val(2)], Some(val(false))),
            test!(">", &[val(3), val(2)], Some(val(true))),
            test!(">", &[val(-3), val(2)], Some(val(false))),
            // No coercion
            test!("+", &[val(1), val(2.0)], None),
            test!("+", &[val("1"), val(2)], None),
            test!("==", &[val(true), val(true)], None),
            test!("<", &[val(1.0), val(2.0)], None),
            // Arity
            test!("+", &[val(1)], None),
            test!("+", &[val(1), val(2), val(3)], None),
            test!("==", &[], None),
        ];

        for (test_expr, result, expected) in test_cases {
            match (result, expected) {
                (Ok(actual), Some(expected_val)) => {
                    assert_eq!(actual, expected_val, "Failed for test case: {test_expr}");
                }
                (Err(_), None) => {} // Expected error
                (actual, expected) => panic!(
                    "Unexpected result for test case: {test_expr}\nGot: {actual:?}, Expected: {expected:?}"
                ),
            }
        }
    }

    #[test]
    fn test_error_messages() {
        let test_cases = vec![
            (
                call_builtin("/", &[val(1), val(0)]),
                Error::EvalError("division by zero".into()),
            ),
            (
                call_builtin("+", &[val(i64::MAX), val(1)]),
                Error::EvalError("integer overflow in addition".into()),
            ),
            (
                call_builtin("-", &[val(true), val(1)]),
                Error::TypeError("expected int, found bool".into()),
            ),
            (call_builtin("*", &[val(1)]), Error::arity_error(2, 1)),
        ];

        for (i, (result, expected)) in test_cases.into_iter().enumerate() {
            assert_eq!(result.unwrap_err(), expected, "Error test #{}", i + 1);
        }
    }
}
