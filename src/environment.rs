//! Chained variable scopes.
//!
//! An [`Environment`] is a shared handle to a frame of bindings plus an
//! optional parent frame. Closures and thunks keep the handle of the frame
//! they were created in, so a name defined in that frame after the closure
//! was built is still visible to it; this is what lets a top-level function
//! refer to itself.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::Error;
use crate::dispatcher::Pattern;
use crate::value::{NativeFunction, Value};

/// Names claimed by the built-in special forms. They can never be bound,
/// neither by `define` nor as function parameters.
pub const RESERVED_KEYWORDS: &[&str] = &[
    "define",
    "function",
    "lambda",
    "callByName",
    "if",
    "quote",
    "lazy",
    "evaluate",
    "eval",
];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_KEYWORDS.contains(&name)
}

#[derive(Default)]
struct Frame {
    bindings: RefCell<HashMap<String, Value>>,
    parent: Option<Environment>,
}

/// Shared handle to a scope frame
#[derive(Clone, Default)]
pub struct Environment(Rc<Frame>);

impl Environment {
    /// A new, empty root frame
    pub fn new() -> Self {
        Environment::default()
    }

    /// A new, empty frame whose lookups fall back to `self`
    pub fn child(&self) -> Self {
        Environment(Rc::new(Frame {
            bindings: RefCell::default(),
            parent: Some(self.clone()),
        }))
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.0.bindings.borrow().get(name) {
            return Some(value.clone());
        }
        self.0.parent.as_ref().and_then(|parent| parent.get(name))
    }

    /// Whether `name` resolves in this frame or any ancestor
    pub fn contains(&self, name: &str) -> bool {
        self.0.bindings.borrow().contains_key(name)
            || self
                .0
                .parent
                .as_ref()
                .is_some_and(|parent| parent.contains(name))
    }

    /// Resolve `name` through the chain of frames
    pub fn lookup(&self, name: &str) -> Result<Value, Error> {
        self.get(name).ok_or_else(|| Error::unbound_variable(name))
    }

    /// Check that `name` may be bound by `define` in this frame
    pub fn check_bindable(&self, name: &str) -> Result<(), Error> {
        if is_reserved(name) {
            return Err(Error::reserved_keyword(name));
        }
        if self.contains(name) {
            return Err(Error::redefinition(name));
        }
        Ok(())
    }

    /// Bind `name` in this frame. Fails if the name is reserved or already
    /// resolves anywhere in the chain; a failed bind leaves the frame untouched.
    pub fn bind(&self, name: &str, value: Value) -> Result<(), Error> {
        self.check_bindable(name)?;
        self.0.bindings.borrow_mut().insert(name.to_owned(), value);
        Ok(())
    }

    /// Remove `name` from this frame if it is still bound to `value`.
    /// Used to withdraw a definition whose value failed to evaluate.
    pub(crate) fn unbind(&self, name: &str, value: &Value) -> bool {
        let mut bindings = self.0.bindings.borrow_mut();
        if bindings.get(name) == Some(value) {
            bindings.remove(name);
            true
        } else {
            false
        }
    }

    /// Bind without checks, for seeding the global frame
    pub(crate) fn define(&self, name: String, value: Value) {
        self.0.bindings.borrow_mut().insert(name, value);
    }

    /// Create the frame for a function call: a child of `self` with each
    /// parameter bound to its argument. Parameters may shadow outer names.
    pub fn bind_parameters(&self, params: &[String], args: Vec<Value>) -> Result<Self, Error> {
        let frame = self.child();
        {
            let mut bindings = frame.0.bindings.borrow_mut();
            for (param, arg) in params.iter().zip(args) {
                if is_reserved(param) {
                    return Err(Error::reserved_keyword(param));
                }
                if bindings.insert(param.clone(), arg).is_some() {
                    return Err(Error::RuntimeError(format!(
                        "Duplicate parameter \"{param}\""
                    )));
                }
            }
        }
        Ok(frame)
    }

    /// Register a native function from a signature such as `"(+ :number :number)"`.
    ///
    /// # Example
    /// ```
    /// use calcy::{EvalConfig, Value, create_global_env, evaluator::eval_str};
    ///
    /// let env = create_global_env();
    /// env.register_native("(negate :number)", |args| match args {
    ///     [Value::Number(n)] => Ok(Value::Number(-n)),
    ///     _ => unreachable!("checked against the signature"),
    /// })
    /// .unwrap();
    ///
    /// let result = eval_str("(negate 4)", &env, EvalConfig::default()).unwrap();
    /// assert_eq!(result, Value::Number(-4.0));
    /// ```
    pub fn register_native<F>(&self, signature: &str, func: F) -> Result<(), Error>
    where
        F: Fn(&[Value]) -> Result<Value, Error> + Send + Sync + 'static,
    {
        let native = native_from_signature(signature, Arc::new(func))?;
        let name = native.name.clone();
        self.bind(&name, Value::NativeFunction(Rc::new(native)))
    }

    /// All bindings visible from this frame, inner frames winning, sorted by name
    pub fn bindings(&self) -> Vec<(String, Value)> {
        let mut visible = match &self.0.parent {
            Some(parent) => parent.bindings().into_iter().collect(),
            None => HashMap::new(),
        };
        for (name, value) in self.0.bindings.borrow().iter() {
            visible.insert(name.clone(), value.clone());
        }

        let mut result: Vec<_> = visible.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

/// Build a native function from its declared form, e.g. `"(print :any)"`
pub(crate) fn native_from_signature(
    signature: &str,
    func: Arc<crate::value::OperationFn>,
) -> Result<NativeFunction, Error> {
    match Pattern::parse(signature)? {
        Pattern::Form { head, arity, kinds } => Ok(NativeFunction::new(head, arity, kinds, func)),
        other => Err(Error::TypeError(format!(
            "Native signature must name the function, got \"{other}\""
        ))),
    }
}

impl Drop for Frame {
    // Thunk chains link one frame per call; release them iteratively.
    fn drop(&mut self) {
        let mut values: Vec<Value> = self.bindings.get_mut().drain().map(|(_, v)| v).collect();
        let mut frames: Vec<Environment> = self.parent.take().into_iter().collect();

        loop {
            if let Some(Environment(frame)) = frames.pop() {
                if let Ok(mut frame) = Rc::try_unwrap(frame) {
                    values.extend(frame.bindings.get_mut().drain().map(|(_, v)| v));
                    frames.extend(frame.parent.take());
                }
                continue;
            }
            let Some(value) = values.pop() else {
                break;
            };
            match value {
                Value::Thunk(thunk) => {
                    if let Ok(thunk) = Rc::try_unwrap(thunk) {
                        let (env, cached) = thunk.into_parts();
                        frames.push(env);
                        values.extend(cached);
                    }
                }
                Value::Closure(closure) => {
                    if let Ok(closure) = Rc::try_unwrap(closure) {
                        frames.push(closure.env);
                    }
                }
                Value::List(elements) => values.extend(elements),
                Value::Number(_) | Value::Symbol(_) | Value::NativeFunction(_) => {}
            }
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Frames are reachable from their own closures: list names only.
        let mut names: Vec<_> = self.0.bindings.borrow().keys().cloned().collect();
        names.sort();
        f.debug_struct("Environment")
            .field("bindings", &names)
            .field("parent", &self.0.parent)
            .finish()
    }
}
