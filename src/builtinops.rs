//! Native functions of the global environment.
//!
//! Each native is declared by a signature written in the same pattern
//! language as the special-form rules:
//!
//! ```text
//! (+ :number :number)   ; two numbers
//! (print :any)          ; any single value
//! ```
//!
//! The evaluator checks the argument count against the signature before
//! evaluating anything, then evaluates and forces every argument and checks
//! its kind. Implementations can therefore destructure their arguments
//! without re-validating them.
//!
//! ## Error Handling
//!
//! - **No coercion**: `(+ (quote a) 1)` is a type error, never `NaN`
//! - **Overflow detection**: results that leave the finite range are errors
//! - **Division by zero** is an error rather than an infinity
//!
//! Comparisons return the symbols `true` and `false`; the language has no
//! separate boolean type.
//!
//! ## Adding New Natives
//!
//! 1. Implement `fn(&[Value]) -> Result<Value, Error>`
//! 2. Add its signature to `BUILTIN_SIGNATURES`
//! 3. Add test cases to `test_builtin_function_implementations`

use std::sync::{Arc, LazyLock};

use crate::Error;
use crate::ast::NumberType;
use crate::dispatcher::Arity;
use crate::environment::native_from_signature;
use crate::value::{NativeFunction, Value};

type NativeImpl = fn(&[Value]) -> Result<Value, Error>;

fn number_operands(name: &str, args: &[Value]) -> Result<(NumberType, NumberType), Error> {
    match args {
        [a, b] => Ok((a.try_into()?, b.try_into()?)),
        _ => Err(Error::arity_error(name, Arity::Exact(2), args.len())),
    }
}

fn finite(result: NumberType, operation: &str) -> Result<Value, Error> {
    if result.is_finite() {
        Ok(Value::Number(result))
    } else {
        Err(Error::RuntimeError(format!("Number overflow in {operation}")))
    }
}

// Macro to generate binary arithmetic functions
macro_rules! numeric_arithmetic {
    ($name:ident, $op:tt, $op_str:expr, $operation:expr) => {
        fn $name(args: &[Value]) -> Result<Value, Error> {
            let (a, b) = number_operands($op_str, args)?;
            finite(a $op b, $operation)
        }
    };
}

numeric_arithmetic!(builtin_add, +, "+", "addition");
numeric_arithmetic!(builtin_sub, -, "-", "subtraction");
numeric_arithmetic!(builtin_mul, *, "*", "multiplication");

fn builtin_div(args: &[Value]) -> Result<Value, Error> {
    let (a, b) = number_operands("/", args)?;
    if b == 0.0 {
        return Err(Error::RuntimeError("Division by zero".to_owned()));
    }
    finite(a / b, "division")
}

// Macro to generate numeric comparison functions
macro_rules! numeric_comparison {
    ($name:ident, $op:tt, $op_str:expr) => {
        fn $name(args: &[Value]) -> Result<Value, Error> {
            let (a, b) = number_operands($op_str, args)?;
            Ok(Value::boolean(a $op b))
        }
    };
}

numeric_comparison!(builtin_lt, <, "<");
numeric_comparison!(builtin_gt, >, ">");
numeric_comparison!(builtin_eq, ==, "=");

/// Writes its argument to standard output and returns it
fn builtin_print(args: &[Value]) -> Result<Value, Error> {
    match args {
        [value] => {
            println!("{value}");
            Ok(value.clone())
        }
        _ => Err(Error::arity_error("print", Arity::Exact(1), args.len())),
    }
}

const BUILTIN_SIGNATURES: &[(&str, NativeImpl)] = &[
    // Arithmetic
    ("(+ :number :number)", builtin_add),
    ("(- :number :number)", builtin_sub),
    ("(* :number :number)", builtin_mul),
    ("(/ :number :number)", builtin_div),
    // Comparison
    ("(< :number :number)", builtin_lt),
    ("(> :number :number)", builtin_gt),
    ("(= :number :number)", builtin_eq),
    // Output
    ("(print :any)", builtin_print),
];

/// Global registry of the native functions, built once from their signatures
static BUILTIN_NATIVES: LazyLock<Vec<NativeFunction>> = LazyLock::new(|| {
    BUILTIN_SIGNATURES
        .iter()
        .map(|&(signature, implementation)| {
            native_from_signature(signature, Arc::new(implementation))
                .expect("built-in native signatures are well-formed")
        })
        .collect()
});

pub(crate) fn get_builtin_natives() -> &'static [NativeFunction] {
    &BUILTIN_NATIVES
}
