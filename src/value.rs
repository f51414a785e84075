//! Runtime values produced by evaluation.
//!
//! Besides plain data (numbers, symbols and quoted lists) a value can be a
//! native function, a closure, or a thunk: an expression paired with the
//! environment it must later be evaluated in. The `Display` implementation is
//! the pretty-printer used by the REPL; the evaluator never consults it.

use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::Error;
use crate::ast::{Ast, NumberType, format_number};
use crate::dispatcher::{ArgKind, Arity};
use crate::environment::Environment;

/// Canonical erased native function type.
///
/// Natives receive their arguments already evaluated, forced and checked
/// against the declared argument kinds.
pub type OperationFn = dyn Fn(&[Value]) -> Result<Value, Error> + Send + Sync;

/// Core runtime value
#[derive(Clone)]
pub enum Value {
    Number(NumberType),
    /// Symbol data, produced by `quote` and by comparison natives
    Symbol(String),
    /// List data, produced by `quote`
    List(Vec<Value>),
    NativeFunction(Rc<NativeFunction>),
    Closure(Rc<Closure>),
    /// A postponed expression; see [`Thunk`]
    Thunk(Rc<Thunk>),
}

/// A function implemented in Rust, with a declared signature
#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub arity: Arity,
    /// Expected kind per argument position; positions past the end accept anything
    pub kinds: Vec<ArgKind>,
    pub func: Arc<OperationFn>,
}

impl NativeFunction {
    pub fn new(
        name: impl Into<String>,
        arity: Arity,
        kinds: Vec<ArgKind>,
        func: Arc<OperationFn>,
    ) -> Self {
        NativeFunction {
            name: name.into(),
            arity,
            kinds,
            func,
        }
    }

    /// Check the argument count, then each argument against its declared kind
    pub fn validate(&self, args: &[Value]) -> Result<(), Error> {
        self.arity.validate(&self.name, args.len())?;
        for (position, (kind, arg)) in self.kinds.iter().zip(args).enumerate() {
            if !kind.matches_value(arg) {
                return Err(Error::argument_type(&self.name, position + 1, kind, arg));
            }
        }
        Ok(())
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, Error> {
        self.validate(args)?;
        (self.func)(args)
    }
}

/// How a closure receives its arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosureMode {
    /// Built by `function`/`lambda`; argument passing follows the active strategy
    Eager,
    /// Built by `callByName`; arguments are always passed unevaluated
    ByName,
}

impl ClosureMode {
    /// The form that builds closures of this mode
    pub fn keyword(self) -> &'static str {
        match self {
            ClosureMode::Eager => "function",
            ClosureMode::ByName => "callByName",
        }
    }
}

/// A user function together with the environment it was created in
pub struct Closure {
    pub params: Vec<String>,
    /// Declared kind per parameter, written `x:number`; `Any` when undeclared
    pub kinds: Vec<ArgKind>,
    pub body: Ast,
    /// Captured by reference: later definitions in this frame are visible
    pub env: Environment,
    pub mode: ClosureMode,
}

impl Closure {
    /// Parameters as written, with their declared kinds
    fn write_params(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (param, kind)) in self.params.iter().zip(&self.kinds).enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            match kind {
                ArgKind::Any => write!(f, "{param}")?,
                kind => write!(f, "{param}:{kind}")?,
            }
        }
        Ok(())
    }
}

/// A suspended expression.
///
/// Forcing evaluates `expr` in `env`. A memoizing thunk keeps the first
/// result and returns it on every later force (call-by-need); otherwise the
/// expression is evaluated again each time (call-by-name).
pub struct Thunk {
    pub expr: Ast,
    pub env: Environment,
    memoize: bool,
    cached: OnceCell<Value>,
}

impl Thunk {
    pub fn new(expr: Ast, env: Environment, memoize: bool) -> Self {
        Thunk {
            expr,
            env,
            memoize,
            cached: OnceCell::new(),
        }
    }

    pub fn memoizes(&self) -> bool {
        self.memoize
    }

    pub fn is_evaluated(&self) -> bool {
        self.cached.get().is_some()
    }

    pub fn cached(&self) -> Option<&Value> {
        self.cached.get()
    }

    /// Record a forced result if this thunk memoizes. A nested force of the
    /// same thunk may have finished first; its result is kept.
    pub(crate) fn remember(&self, value: &Value) {
        if self.memoize {
            let _ = self.cached.set(value.clone());
        }
    }

    /// The handles this thunk keeps alive, for releasing long chains
    pub(crate) fn into_parts(self) -> (Environment, Option<Value>) {
        (self.env, self.cached.into_inner())
    }
}

impl Value {
    pub fn thunk(expr: Ast, env: Environment, memoize: bool) -> Self {
        Value::Thunk(Rc::new(Thunk::new(expr, env, memoize)))
    }

    /// Name of the value's kind, as used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Symbol(_) => "symbol",
            Value::List(_) => "list",
            Value::NativeFunction(_) => "nativeFunction",
            Value::Closure(_) => "function",
            Value::Thunk(_) => "thunk",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::NativeFunction(_) | Value::Closure(_))
    }

    /// Symbol or list data that can be evaluated as code
    pub fn is_data(&self) -> bool {
        matches!(self, Value::Symbol(_) | Value::List(_))
    }

    /// Convert data back into a program. Functions and thunks have no
    /// syntax of their own and are rejected.
    pub fn to_ast(&self) -> Result<Ast, Error> {
        match self {
            Value::Number(n) => Ok(Ast::Number(*n)),
            Value::Symbol(s) => Ok(Ast::Symbol(s.clone())),
            Value::List(elements) => elements
                .iter()
                .map(Value::to_ast)
                .collect::<Result<Vec<_>, _>>()
                .map(Ast::List),
            other => Err(Error::TypeError(format!(
                "Can't use {} \"{other}\" as an expression",
                other.type_name()
            ))),
        }
    }

    /// The boolean symbols returned by comparisons
    pub fn boolean(b: bool) -> Self {
        Value::Symbol(if b { "true" } else { "false" }.to_owned())
    }
}

impl From<&Ast> for Value {
    fn from(ast: &Ast) -> Self {
        match ast {
            Ast::Number(n) => Value::Number(*n),
            Ast::Symbol(s) => Value::Symbol(s.clone()),
            Ast::List(elements) => Value::List(elements.iter().map(Value::from).collect()),
        }
    }
}

impl From<NumberType> for Value {
    fn from(n: NumberType) -> Self {
        Value::Number(n)
    }
}

impl TryFrom<&Value> for NumberType {
    type Error = Error;

    fn try_from(value: &Value) -> Result<NumberType, Error> {
        if let Value::Number(n) = value {
            Ok(*n)
        } else {
            Err(Error::TypeError(format!("expected number, got \"{value}\"")))
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::List(list) => f.debug_tuple("List").field(list).finish(),
            Value::NativeFunction(native) => write!(f, "NativeFunction({})", native.name),
            // Closures and thunks hold their environment, which may hold them:
            // print the code only.
            Value::Closure(closure) => write!(
                f,
                "Closure({:?}, params={:?}, body={})",
                closure.mode, closure.params, closure.body
            ),
            Value::Thunk(thunk) => match thunk.cached() {
                Some(value) => write!(f, "Thunk({}, cached={value:?})", thunk.expr),
                None => write!(f, "Thunk({})", thunk.expr),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => format_number(*n, f),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::List(elements) => {
                write!(f, "(")?;
                for (i, elem) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, ")")
            }
            Value::NativeFunction(native) => write!(f, "#<native-function:{}>", native.name),
            Value::Closure(closure) => {
                write!(f, "({} (", closure.mode.keyword())?;
                closure.write_params(f)?;
                write!(f, ") {})", closure.body)
            }
            Value::Thunk(thunk) => match thunk.cached() {
                Some(value) => write!(f, "(lazy {} => {value})", thunk.expr),
                None => write!(f, "(lazy {})", thunk.expr),
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            // Natives are identified by name, closures and thunks by identity
            (Value::NativeFunction(a), Value::NativeFunction(b)) => a.name == b.name,
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Thunk(a), Value::Thunk(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}
