use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use tracing::{debug, trace};

use crate::ast::Ast;
use crate::dispatcher::{ArgKind, Arity, RuleTable};
use crate::environment::{Environment, is_reserved};
use crate::value::{Closure, ClosureMode, Thunk, Value};
use crate::{DEFAULT_MAX_EVAL_DEPTH, Error, builtinops, reader};

/// When arguments of `function` closures are evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Call-by-value: arguments are evaluated before the call
    #[default]
    Eager,
    /// Call-by-name: arguments are passed as thunks, evaluated on every use
    ByName,
    /// Call-by-need: arguments are passed as thunks, evaluated at most once.
    /// `define` also defers its value.
    ByNeed,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::Eager, Strategy::ByName, Strategy::ByNeed];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::Eager => "eager",
            Strategy::ByName => "by-name",
            Strategy::ByNeed => "by-need",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eager" | "value" | "call-by-value" => Ok(Strategy::Eager),
            "by-name" | "name" | "call-by-name" => Ok(Strategy::ByName),
            "by-need" | "need" | "lazy" | "call-by-need" => Ok(Strategy::ByNeed),
            other => Err(format!(
                "Unknown strategy \"{other}\", expected one of: eager, by-name, by-need"
            )),
        }
    }
}

/// Evaluation settings, fixed for the duration of one top-level evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalConfig {
    pub strategy: Strategy,
    /// Depth budget; see [`DEFAULT_MAX_EVAL_DEPTH`]
    pub max_depth: usize,
    /// Whether `lazy` and by-need thunks keep their first result
    pub memoize_thunks: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            strategy: Strategy::default(),
            max_depth: DEFAULT_MAX_EVAL_DEPTH,
            memoize_thunks: true,
        }
    }
}

impl EvalConfig {
    pub fn new(strategy: Strategy) -> Self {
        EvalConfig {
            strategy,
            ..EvalConfig::default()
        }
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn with_memoization(mut self, memoize_thunks: bool) -> Self {
        self.memoize_thunks = memoize_thunks;
        self
    }
}

/// Everything a handler needs besides the node itself.
///
/// Contexts are never mutated: a nested evaluation derives a new one with
/// [`deeper`](Self::deeper) or [`with_env`](Self::with_env).
#[derive(Debug, Clone)]
pub struct EvaluationContext<'r> {
    pub env: Environment,
    pub config: EvalConfig,
    pub depth: usize,
    rules: &'r RuleTable,
}

impl EvaluationContext<'static> {
    /// A top-level context using the standard rules
    pub fn new(env: Environment, config: EvalConfig) -> Self {
        EvaluationContext::with_rules(env, config, RuleTable::builtin())
    }
}

impl<'r> EvaluationContext<'r> {
    pub fn with_rules(env: Environment, config: EvalConfig, rules: &'r RuleTable) -> Self {
        EvaluationContext {
            env,
            config,
            depth: 0,
            rules,
        }
    }

    /// The context for a nested evaluation, one level deeper
    pub fn deeper(&self) -> Self {
        EvaluationContext {
            depth: self.depth + 1,
            ..self.clone()
        }
    }

    /// The same context evaluating in another scope
    pub fn with_env(&self, env: Environment) -> Self {
        EvaluationContext { env, ..self.clone() }
    }

    pub fn rules(&self) -> &'r RuleTable {
        self.rules
    }

    /// Postpone `expr` in the current scope. Number literals cannot observe
    /// when they are evaluated and are passed as they are.
    fn delay(&self, expr: &Ast, memoize: bool) -> Value {
        match expr {
            Ast::Number(n) => Value::Number(*n),
            _ => Value::thunk(expr.clone(), self.env.clone(), memoize),
        }
    }

    fn memoize(&self) -> bool {
        self.config.memoize_thunks
    }
}

/// Evaluate a program and force its result.
///
/// This is the entry point for callers: the returned value is never a thunk.
/// A top-level `define` whose deferred value fails to force is withdrawn, so
/// a failed definition leaves the environment as it was.
pub fn evaluate(node: &Ast, env: &Environment, config: EvalConfig) -> Result<Value, Error> {
    let ctx = EvaluationContext::new(env.clone(), config);
    let value = eval(node, &ctx)?;
    force(value.clone(), &ctx).inspect_err(|_| {
        if let Some(name) = defined_name(node) {
            if env.unbind(name, &value) {
                debug!(name = %name, "withdrew failed definition");
            }
        }
    })
}

/// The name bound by a `(define name expr)` node
fn defined_name(node: &Ast) -> Option<&str> {
    match list_elements(node) {
        [Ast::Symbol(head), Ast::Symbol(name), _] if head == "define" => Some(name),
        _ => None,
    }
}

/// Parse and evaluate one expression
pub fn eval_str(source: &str, env: &Environment, config: EvalConfig) -> Result<Value, Error> {
    evaluate(&reader::parse(source)?, env, config)
}

/// Evaluate a node in a context. Under the lazy strategies the result may
/// be a thunk; use [`force`] where a concrete value is required.
pub fn eval(node: &Ast, ctx: &EvaluationContext<'_>) -> Result<Value, Error> {
    if ctx.depth >= ctx.config.max_depth {
        return Err(Error::RecursionLimitExceeded {
            max_depth: ctx.config.max_depth,
        });
    }
    trace!(depth = ctx.depth, %node, "eval");
    ensure_sufficient_stack(|| ctx.rules.dispatch(node, ctx))
}

/// Reduce a value to a non-thunk value, evaluating postponed expressions
pub fn force(value: Value, ctx: &EvaluationContext<'_>) -> Result<Value, Error> {
    match value {
        Value::Thunk(thunk) => force_thunk(&thunk, ctx),
        other => Ok(other),
    }
}

fn force_thunk(thunk: &Thunk, ctx: &EvaluationContext<'_>) -> Result<Value, Error> {
    if let Some(value) = thunk.cached() {
        return Ok(value.clone());
    }

    let inner = ctx.deeper().with_env(thunk.env.clone());
    debug!(depth = inner.depth, expr = %thunk.expr, memoize = thunk.memoizes(), "forcing thunk");
    let value = ensure_sufficient_stack(|| force(eval(&thunk.expr, &inner)?, &inner))?;
    thunk.remember(&value);
    Ok(value)
}

#[cfg(not(target_arch = "wasm32"))]
fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    const RED_ZONE: usize = 100 * 1024;
    const STACK_PER_RECURSION: usize = 1024 * 1024;
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[cfg(target_arch = "wasm32")]
fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

fn list_elements(node: &Ast) -> &[Ast] {
    match node {
        Ast::List(elements) => elements,
        _ => &[],
    }
}

/// A handler was given a node its rule should have rejected
fn malformed(node: &Ast) -> Error {
    Error::RuntimeError(format!("Malformed expression \"{node}\""))
}

/// `:number`
pub fn eval_number(node: &Ast, _ctx: &EvaluationContext<'_>) -> Result<Value, Error> {
    node.as_number().map(Value::Number).ok_or_else(|| malformed(node))
}

/// `:symbol`: variable reference
pub fn eval_symbol(node: &Ast, ctx: &EvaluationContext<'_>) -> Result<Value, Error> {
    let name = node.as_symbol().ok_or_else(|| malformed(node))?;
    ctx.env.lookup(name)
}

/// `(define name expr)`: bind once in the current frame, returning the bound value
pub fn eval_define(node: &Ast, ctx: &EvaluationContext<'_>) -> Result<Value, Error> {
    let [_, Ast::Symbol(name), expr] = list_elements(node) else {
        return Err(malformed(node));
    };

    // Fail before evaluating anything
    ctx.env.check_bindable(name)?;

    let value = match ctx.config.strategy {
        Strategy::ByNeed => ctx.delay(expr, ctx.memoize()),
        Strategy::Eager | Strategy::ByName => eval(expr, &ctx.deeper())?,
    };
    ctx.env.bind(name, value.clone())?;
    debug!(name = %name, depth = ctx.depth, "define");
    Ok(value)
}

/// `(function (params...) body)` and its alias `lambda`
pub fn eval_function(node: &Ast, ctx: &EvaluationContext<'_>) -> Result<Value, Error> {
    make_closure(node, ctx, ClosureMode::Eager)
}

/// `(callByName (params...) body)`
pub fn eval_call_by_name(node: &Ast, ctx: &EvaluationContext<'_>) -> Result<Value, Error> {
    make_closure(node, ctx, ClosureMode::ByName)
}

fn make_closure(node: &Ast, ctx: &EvaluationContext<'_>, mode: ClosureMode) -> Result<Value, Error> {
    let [_, Ast::List(param_nodes), body] = list_elements(node) else {
        return Err(malformed(node));
    };

    let mut params: Vec<String> = Vec::with_capacity(param_nodes.len());
    let mut kinds = Vec::with_capacity(param_nodes.len());
    for param in param_nodes {
        let (name, kind) = parse_param(param.as_symbol().ok_or_else(|| malformed(node))?)?;
        if is_reserved(name) {
            return Err(Error::reserved_keyword(name));
        }
        if params.iter().any(|p| p == name) {
            return Err(Error::RuntimeError(format!("Duplicate parameter \"{name}\"")));
        }
        params.push(name.to_owned());
        kinds.push(kind);
    }

    Ok(Value::Closure(Rc::new(Closure {
        params,
        kinds,
        body: body.clone(),
        env: ctx.env.clone(),
        mode,
    })))
}

/// Split a parameter written `name` or `name:kind`
fn parse_param(param: &str) -> Result<(&str, ArgKind), Error> {
    let Some((name, kind_name)) = param.split_once(':') else {
        return Ok((param, ArgKind::Any));
    };
    if name.is_empty() {
        return Err(Error::RuntimeError(format!("Parameter \"{param}\" has no name")));
    }
    let kind = ArgKind::from_name(kind_name).ok_or_else(|| {
        Error::TypeError(format!("Unknown kind \"{kind_name}\" for parameter \"{name}\""))
    })?;
    Ok((name, kind))
}

/// `(if condition then else)`: exactly one branch is evaluated
pub fn eval_if(node: &Ast, ctx: &EvaluationContext<'_>) -> Result<Value, Error> {
    let [_, condition, then_branch, else_branch] = list_elements(node) else {
        return Err(malformed(node));
    };

    let inner = ctx.deeper();
    let test = force(eval(condition, &inner)?, &inner)?;
    match &test {
        Value::Symbol(s) if s == "true" => eval(then_branch, &inner),
        Value::Symbol(s) if s == "false" => eval(else_branch, &inner),
        other => Err(Error::TypeError(format!(
            "\"if\" condition should evaluate to true or false, instead got \"{other}\""
        ))),
    }
}

/// `(quote datum)`
pub fn eval_quote(node: &Ast, _ctx: &EvaluationContext<'_>) -> Result<Value, Error> {
    match list_elements(node) {
        [_, datum] => Ok(Value::from(datum)),
        _ => Err(malformed(node)),
    }
}

/// `(lazy expr)`: an explicit thunk over the current scope
pub fn eval_lazy(node: &Ast, ctx: &EvaluationContext<'_>) -> Result<Value, Error> {
    match list_elements(node) {
        [_, expr] => Ok(Value::thunk(expr.clone(), ctx.env.clone(), ctx.memoize())),
        _ => Err(malformed(node)),
    }
}

/// `(evaluate expr)` and its alias `eval`: force the value of `expr`; if it
/// is symbol or list data, evaluate that data as code in the current scope.
pub fn eval_evaluate(node: &Ast, ctx: &EvaluationContext<'_>) -> Result<Value, Error> {
    let [_, expr] = list_elements(node) else {
        return Err(malformed(node));
    };

    let inner = ctx.deeper();
    let value = force(eval(expr, &inner)?, &inner)?;
    if !value.is_data() {
        return Ok(value);
    }
    let code = value.to_ast()?;
    force(eval(&code, &inner)?, &inner)
}

/// `(f args...)`: function application
pub fn eval_application(node: &Ast, ctx: &EvaluationContext<'_>) -> Result<Value, Error> {
    let Some((head, args)) = list_elements(node).split_first() else {
        return Err(Error::RuntimeError("Cannot evaluate empty list".to_owned()));
    };

    let inner = ctx.deeper();
    let callee = force(eval(head, &inner)?, &inner)?;
    apply(&callee, &head.to_string(), args, &inner)
}

/// Apply a forced callee to unevaluated argument expressions.
/// `name` is how the callee was written, for error messages.
fn apply(callee: &Value, name: &str, args: &[Ast], ctx: &EvaluationContext<'_>) -> Result<Value, Error> {
    match callee {
        Value::NativeFunction(native) => {
            native.arity.validate(&native.name, args.len())?;
            let values = args
                .iter()
                .map(|arg| force(eval(arg, ctx)?, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            trace!(function = %native.name, "calling native");
            native.call(&values)
        }
        Value::Closure(closure) => apply_closure(closure, name, args, ctx),
        _ => Err(Error::RuntimeError(format!("\"{name}\" is not a function"))),
    }
}

fn apply_closure(
    closure: &Closure,
    name: &str,
    args: &[Ast],
    ctx: &EvaluationContext<'_>,
) -> Result<Value, Error> {
    Arity::Exact(closure.params.len()).validate(name, args.len())?;

    // Parameters with a declared kind are strict under every strategy: the
    // argument is forced on entry so it can be checked.
    let values = args
        .iter()
        .zip(&closure.kinds)
        .enumerate()
        .map(|(position, (arg, kind))| match (kind, closure.mode, ctx.config.strategy) {
            (ArgKind::Any, ClosureMode::ByName, _)
            | (ArgKind::Any, ClosureMode::Eager, Strategy::ByName) => Ok(ctx.delay(arg, false)),
            (ArgKind::Any, ClosureMode::Eager, Strategy::ByNeed) => {
                Ok(ctx.delay(arg, ctx.memoize()))
            }
            (ArgKind::Any, ClosureMode::Eager, Strategy::Eager) => force(eval(arg, ctx)?, ctx),
            (kind, _, _) => {
                let value = force(eval(arg, ctx)?, ctx)?;
                if kind.matches_value(&value) {
                    Ok(value)
                } else {
                    Err(Error::argument_type(name, position + 1, kind, &value))
                }
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    let frame = closure.env.bind_parameters(&closure.params, values)?;
    debug!(function = %name, depth = ctx.depth, mode = ?closure.mode, "apply");
    eval(&closure.body, &ctx.with_env(frame))
}

/// Create a global environment with the native functions bound
pub fn create_global_env() -> Environment {
    let env = Environment::new();
    for native in builtinops::get_builtin_natives() {
        env.define(native.name.clone(), Value::NativeFunction(Rc::new(native.clone())));
    }
    env
}
