//! calcy - a minimal Lisp-family evaluator for studying evaluation order
//!
//! This crate provides a small s-expression language whose only interesting
//! property is *when* it evaluates things. The same engine runs programs under
//! three argument-passing disciplines:
//!
//! ```text
//! ;; call-by-value: arguments are evaluated before the call
//! ;; call-by-name:  arguments are passed as thunks, re-evaluated on every use
//! ;; call-by-need:  arguments are passed as thunks, evaluated at most once
//! (define getFun (function (x y) (function (i j) (- (+ x y) (+ i j)))))
//! (define fun (getFun 5 4))
//! (fun 3 2)            ; => 4
//! ```
//!
//! Special forms are not hard-coded in the evaluator. They are registered in a
//! declarative rule table whose patterns are themselves written as
//! s-expressions:
//!
//! ```text
//! (define :symbol :any)
//! (function :list<symbol> :any)
//! (:any ...)
//! ```
//!
//! ## Language
//!
//! - One numeric type (`f64`) and symbols; `quote` produces list data
//! - `define` binds a name exactly once; rebinding is an error
//! - `function`/`lambda` build call-by-value closures, `callByName` builds
//!   closures whose arguments are passed unevaluated
//! - `if` evaluates exactly one branch; `lazy` defers an expression explicitly
//! - `evaluate` forces a deferred value or evaluates quoted data as code
//!
//! ## Modules
//!
//! - `ast`: parsed program representation
//! - `reader`: s-expression parsing from text
//! - `value`: runtime values, thunks and the pretty-printer
//! - `environment`: chained, shared, bind-once scopes
//! - `dispatcher`: pattern-driven rule table for special forms
//! - `evaluator`: the evaluation engine and its strategies
//! - `builtinops`: native functions of the global environment

use std::fmt;

/// Maximum parsing depth to prevent stack overflow on pathological input
pub const MAX_PARSE_DEPTH: usize = 64;

/// Default evaluation depth budget.
///
/// Every nested evaluation and every thunk force consumes one unit. The host
/// stack is grown on demand, so this budget and not the platform's stack size
/// decides when runaway recursion reports `RecursionLimitExceeded`.
pub const DEFAULT_MAX_EVAL_DEPTH: usize = 1000;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Clone)]
pub enum ParseErrorKind {
    /// Unexpected token, such as a stray closing parenthesis
    InvalidSyntax,
    /// Input ended before the expression was complete (unclosed parens, empty input)
    Incomplete,
    /// Expression nesting exceeded the maximum parse depth
    TooDeeplyNested,
    /// Extra input found after a complete, valid expression
    TrailingContent,
    /// A token that starts like a number but is not one
    InvalidNumber,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
    /// The problematic token encountered, if identifiable
    pub found: Option<String>,
}

impl ParseError {
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

    /// Create a ParseError with a kind and message but no context
    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None, None)
    }

    /// Create a ParseError with context extracted from input at a given offset
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
        found: Option<String>,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        let context_start = error_offset.saturating_sub(20);
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

        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        Self::new(kind, message, Some(display_context), found)
    }
}

/// Error types for the evaluator and its reader
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed program or rule pattern text
    SyntaxError(ParseError),
    /// Wrong number of arguments for a form or function
    ArityError {
        name: String,
        expected: dispatcher::Arity,
        got: usize,
    },
    /// Argument kind does not match a declared signature
    TypeError(String),
    /// Unbound variable, redefinition, application of a non-function
    RuntimeError(String),
    /// The evaluation depth budget was exhausted
    RecursionLimitExceeded { max_depth: usize },
}

impl Error {
    pub fn arity_error(name: impl Into<String>, expected: dispatcher::Arity, got: usize) -> Self {
        Error::ArityError {
            name: name.into(),
            expected,
            got,
        }
    }

    pub fn unbound_variable(name: &str) -> Self {
        Error::RuntimeError(format!(
            "Can't find \"{name}\" variable. Use `(define {name} ...)` to define it"
        ))
    }

    pub fn redefinition(name: &str) -> Self {
        Error::RuntimeError(format!("Can't redefine \"{name}\" variable"))
    }

    pub fn reserved_keyword(name: &str) -> Self {
        Error::RuntimeError(format!("Can't redefine built-in \"{name}\""))
    }

    /// `"{name}" expects {expected} as the {position} argument, instead got "{found}"`
    pub fn argument_type(
        name: &str,
        position: usize,
        expected: impl fmt::Display,
        found: impl fmt::Display,
    ) -> Self {
        Error::TypeError(format!(
            "\"{name}\" expects {expected} as the {position} argument, instead got \"{found}\""
        ))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::SyntaxError(e) => {
                write!(f, "{}", e.message)?;
                if let Some(context) = &e.context {
                    write!(f, "\nContext: {context}")?;
                }
                Ok(())
            }
            Error::ArityError {
                name,
                expected,
                got,
            } => write!(f, "\"{name}\" expects {expected} arguments, instead got {got}"),
            Error::TypeError(msg) | Error::RuntimeError(msg) => write!(f, "{msg}"),
            Error::RecursionLimitExceeded { max_depth } => {
                write!(f, "Maximum evaluation depth exceeded (max: {max_depth})")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<ParseError> for Error {
    fn from(error: ParseError) -> Self {
        Error::SyntaxError(error)
    }
}

pub mod ast;
pub mod builtinops;
pub mod dispatcher;
pub mod environment;
pub mod evaluator;
pub mod reader;
pub mod value;

pub use ast::Ast;
pub use environment::Environment;
pub use evaluator::{EvalConfig, EvaluationContext, Strategy, create_global_env, evaluate};
pub use reader::parse;
pub use value::Value;
