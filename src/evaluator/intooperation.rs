use crate::Error;
use crate::ast::IntegerType;
use crate::value::Value;
use std::sync::Arc;

// Adapter layer that turns strongly-typed Rust functions into the
// erased `OperationFn` stored in `Value::Builtin`.
//
// Embedders register builtins through `Environment` in `evaluator.rs`;
// the registry in `builtinops.rs` goes through the same adapters so
// argument extraction and arity checking behave identically for both.

/// Canonical erased builtin function type used by the evaluator.
///
/// Builtins receive ownership of their argument vector, enabling
/// implementations that consume or rearrange arguments if desired.
pub type OperationFn = dyn Fn(Vec<Value>) -> Result<Value, Error> + Send + Sync;

// =====================================================================
// Argument conversion
// =====================================================================

/// Turns an evaluated argument into a strongly-typed parameter.
///
/// The associated `Param<'a>` type is the parameter type as seen by
/// the builtin for a given lifetime of the local `Value` slot used
/// during argument conversion.
pub trait FromParam {
    type Param<'a>;

    /// Convert a single argument into this parameter type, either
    /// borrowing from the slot (`&str`) or moving out of it.
    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error>;
}

impl FromParam for Value {
    type Param<'a> = Value;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        Ok(std::mem::replace(value, Value::Void))
    }
}

/// By-value parameters extracted through `TryFrom<Value>` (see `value.rs`)
macro_rules! from_param_by_value {
    ($($T:ty),+) => {
        $(
            impl FromParam for $T {
                type Param<'a> = $T;

                fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
                    <$T>::try_from(std::mem::replace(value, Value::Void))
                }
            }
        )+
    };
}

from_param_by_value!(IntegerType, f64, bool, String);

impl FromParam for &str {
    type Param<'a> = &'a str;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        match value {
            Value::Literal(crate::ast::Literal::String(s)) => Ok(s.as_str()),
            other => Err(Error::TypeError(format!(
                "expected string, found {}",
                other.type_name()
            ))),
        }
    }
}

// =====================================================================
// Return-type adaptation
// =====================================================================

/// Normalizes builtin return types to the canonical
/// `Result<Value, Error>` expected by the evaluator.
pub trait IntoValueResult {
    fn into_value_result(self) -> Result<Value, Error>;
}

impl<T> IntoValueResult for Result<T, Error>
where
    T: Into<Value>,
{
    fn into_value_result(self) -> Result<Value, Error> {
        self.map(Into::into)
    }
}

impl<T> IntoValueResult for T
where
    T: Into<Value>,
{
    fn into_value_result(self) -> Result<Value, Error> {
        Ok(self.into())
    }
}

// =====================================================================
// Fixed-arity adapters
// =====================================================================

/// Conversion of a strongly-typed Rust function or closure into the
/// erased [`OperationFn`], parameterized by its argument tuple type.
pub trait IntoOperation<Args> {
    fn into_operation(self) -> Arc<OperationFn>;
}

// 0-arg functions / closures
impl<F, R> IntoOperation<()> for F
where
    F: Fn() -> R + Send + Sync + 'static,
    R: IntoValueResult,
{
    fn into_operation(self) -> Arc<OperationFn> {
        Arc::new(move |args: Vec<Value>| {
            if !args.is_empty() {
                return Err(Error::arity_error(0, args.len()));
            }

            let result: R = (self)();
            result.into_value_result()
        })
    }
}

/// Implements `IntoOperation` for one arity.
///
/// Arity is checked up front, then the owned `Vec<Value>` is
/// destructured into local slots so that `FromParam` can borrow from
/// or consume each argument before the builtin is invoked.
macro_rules! impl_into_operation_for_arity {
    ($arity:expr, $( $v:ident, $p:ident : $A:ident ),+ ) => {
        impl<F, R, $( $A ),+> IntoOperation<( $( $A, )+ )> for F
        where
            F: for<'a> Fn( $( <$A as FromParam>::Param<'a> ),+ ) -> R
                + Send
                + Sync
                + 'static,
            $( $A: FromParam, )+
            R: IntoValueResult,
        {
            fn into_operation(self) -> Arc<OperationFn> {
                Arc::new(move |mut args: Vec<Value>| {
                    let len = args.len();
                    match args.as_mut_slice() {
                        &mut [ $( ref mut $v ),+ ] => {
                            $(
                                let $p: <$A as FromParam>::Param<'_> =
                                    <$A as FromParam>::from_arg($v)?;
                            )+

                            let result: R = (self)( $( $p ),+ );
                            result.into_value_result()
                        }
                        _ => Err(Error::arity_error($arity, len)),
                    }
                })
            }
        }
    };
}

impl_into_operation_for_arity!(1, v0, p0: A1);
impl_into_operation_for_arity!(2, v0, p0: A1, v1, p1: A2);
impl_into_operation_for_arity!(3, v0, p0: A1, v1, p1: A2, v2, p2: A3);
impl_into_operation_for_arity!(4, v0, p0: A1, v1, p1: A2, v2, p2: A3, v3, p3: A4);
