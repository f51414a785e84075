//! Pattern-driven dispatch of special forms.
//!
//! Every syntactic construct of the language is described by a rule: a
//! pattern written as an s-expression and the handler that evaluates nodes
//! matching it. Patterns use `:kind` placeholders for arguments:
//!
//! ```text
//! :number                        ; a number literal
//! :symbol                        ; a variable reference
//! (define :symbol :any)          ; a form with a fixed head and argument kinds
//! (function :list<symbol> :any)  ; list<k> requires every element to be a k
//! (print :any ...)               ; `...` accepts any number of extra arguments
//! (:number ...)                  ; a list whose head is a number
//! (:any ...)                     ; any other non-empty list (application)
//! ```
//!
//! Selection priority for a node is: a form whose head symbol matches
//! exactly, then typed-head list rules in registration order, then the
//! application rule, then whole-node kind rules, then the `:any` fallback.
//! Once a form rule is selected its arity and argument kinds are checked
//! before the handler runs, so handlers may rely on the shape of their node.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use crate::ast::Ast;
use crate::evaluator::{self, EvaluationContext};
use crate::reader;
use crate::value::Value;
use crate::{Error, ParseError, ParseErrorKind};

/// Number of arguments a form or function accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly n arguments
    Exact(usize),
    /// At least n arguments
    AtLeast(usize),
    /// Any number of arguments
    Any,
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Any => true,
        }
    }

    /// Check argument count, reporting mismatches against `name`
    pub fn validate(self, name: &str, got: usize) -> Result<(), Error> {
        if self.accepts(got) {
            Ok(())
        } else {
            Err(Error::arity_error(name, self, got))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// Expected kind of one argument, written `:kind` in patterns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgKind {
    Number,
    Symbol,
    List,
    /// A list whose elements all have the given kind
    ListOf(Box<ArgKind>),
    /// A native function or closure; only meaningful for evaluated arguments
    Function,
    Any,
}

impl ArgKind {
    /// Parse a `:kind` placeholder; `:all` is accepted as a synonym of `:any`
    pub fn parse(token: &str) -> Option<ArgKind> {
        let name = token.strip_prefix(':')?;
        Self::from_name(name)
    }

    /// Parse a kind name without its colon, as in the parameter `x:number`
    pub fn from_name(name: &str) -> Option<ArgKind> {
        match name {
            "number" => Some(ArgKind::Number),
            "symbol" => Some(ArgKind::Symbol),
            "list" => Some(ArgKind::List),
            "function" => Some(ArgKind::Function),
            "any" | "all" => Some(ArgKind::Any),
            _ => {
                let element = name.strip_prefix("list<")?.strip_suffix('>')?;
                Self::from_name(element).map(|kind| ArgKind::ListOf(Box::new(kind)))
            }
        }
    }

    /// Check an unevaluated node
    pub fn matches_ast(&self, node: &Ast) -> bool {
        match (self, node) {
            (ArgKind::Any, _) => true,
            (ArgKind::Number, Ast::Number(_)) => true,
            (ArgKind::Symbol, Ast::Symbol(_)) => true,
            (ArgKind::List, Ast::List(_)) => true,
            (ArgKind::ListOf(kind), Ast::List(elements)) => {
                elements.iter().all(|element| kind.matches_ast(element))
            }
            _ => false,
        }
    }

    /// Check an evaluated, forced value
    pub fn matches_value(&self, value: &Value) -> bool {
        match (self, value) {
            (ArgKind::Any, _) => true,
            (ArgKind::Number, Value::Number(_)) => true,
            (ArgKind::Symbol, Value::Symbol(_)) => true,
            (ArgKind::List, Value::List(_)) => true,
            (ArgKind::ListOf(kind), Value::List(elements)) => {
                elements.iter().all(|element| kind.matches_value(element))
            }
            (ArgKind::Function, value) => value.is_callable(),
            _ => false,
        }
    }
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgKind::Number => write!(f, "number"),
            ArgKind::Symbol => write!(f, "symbol"),
            ArgKind::List => write!(f, "list"),
            ArgKind::ListOf(kind) => write!(f, "list<{kind}>"),
            ArgKind::Function => write!(f, "function"),
            ArgKind::Any => write!(f, "any"),
        }
    }
}

/// A parsed rule pattern
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    /// `(head :k1 :k2)` or `(head :k1 ...)`
    Form {
        head: String,
        arity: Arity,
        kinds: Vec<ArgKind>,
    },
    /// `(:kind ...)`: a non-empty list whose head has the given kind
    TypedHead(ArgKind),
    /// `(:any ...)`
    Application,
    /// `:kind`: a whole node of the given kind
    Kind(ArgKind),
}

const VARIADIC: &str = "...";

impl Pattern {
    pub fn parse(source: &str) -> Result<Pattern, Error> {
        let invalid = |reason: &str| {
            Error::SyntaxError(ParseError::from_message(
                ParseErrorKind::InvalidSyntax,
                format!("Invalid pattern \"{source}\": {reason}"),
            ))
        };

        match reader::parse(source)? {
            Ast::Symbol(token) => ArgKind::parse(&token)
                .map(Pattern::Kind)
                .ok_or_else(|| invalid("expected a :kind placeholder")),
            Ast::Number(_) => Err(invalid("numbers are not patterns")),
            Ast::List(elements) => {
                let Some((head, rest)) = elements.split_first() else {
                    return Err(invalid("empty list"));
                };
                let head = head
                    .as_symbol()
                    .ok_or_else(|| invalid("the head must be a symbol or a :kind"))?;

                let (rest, variadic) = match rest.split_last() {
                    Some((last, fixed)) if last.as_symbol() == Some(VARIADIC) => (fixed, true),
                    _ => (rest, false),
                };

                if let Some(kind) = ArgKind::parse(head) {
                    return match (kind, rest.is_empty() && variadic) {
                        (ArgKind::Any, true) => Ok(Pattern::Application),
                        (kind, true) => Ok(Pattern::TypedHead(kind)),
                        (_, false) => Err(invalid("a :kind head must be followed by ... only")),
                    };
                }
                if head == VARIADIC {
                    return Err(invalid("... must come last"));
                }

                let kinds = rest
                    .iter()
                    .map(|element| {
                        element
                            .as_symbol()
                            .and_then(ArgKind::parse)
                            .ok_or_else(|| invalid(&format!("\"{element}\" is not a :kind")))
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                let arity = if variadic {
                    Arity::AtLeast(kinds.len())
                } else {
                    Arity::Exact(kinds.len())
                };
                Ok(Pattern::Form {
                    head: head.to_owned(),
                    arity,
                    kinds,
                })
            }
        }
    }

    /// Check a node already routed to this pattern against its declared shape
    fn validate(&self, node: &Ast) -> Result<(), Error> {
        let Pattern::Form { head, arity, kinds } = self else {
            return Ok(());
        };
        let Ast::List(elements) = node else {
            return Ok(());
        };
        let args = &elements[1..];
        arity.validate(head, args.len())?;
        for (position, (kind, arg)) in kinds.iter().zip(args).enumerate() {
            if !kind.matches_ast(arg) {
                return Err(Error::argument_type(head, position + 1, kind, arg));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Form { head, arity, kinds } => {
                write!(f, "({head}")?;
                for kind in kinds {
                    write!(f, " :{kind}")?;
                }
                if matches!(arity, Arity::AtLeast(_) | Arity::Any) {
                    write!(f, " {VARIADIC}")?;
                }
                write!(f, ")")
            }
            Pattern::TypedHead(kind) => write!(f, "(:{kind} {VARIADIC})"),
            Pattern::Application => write!(f, "(:any {VARIADIC})"),
            Pattern::Kind(kind) => write!(f, ":{kind}"),
        }
    }
}

/// Evaluates a node matched by a rule. Handlers receive the node unevaluated.
pub type Handler = fn(&Ast, &EvaluationContext<'_>) -> Result<Value, Error>;

/// A pattern paired with its handler
#[derive(Clone)]
pub struct Rule {
    pub pattern: Pattern,
    pub handler: Handler,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rule({})", self.pattern)
    }
}

/// The rules of a language, indexed for selection
#[derive(Debug, Default)]
pub struct RuleTable {
    forms: HashMap<String, Rule>,
    typed_heads: Vec<Rule>,
    application: Option<Rule>,
    kinds: Vec<Rule>,
    fallback: Option<Rule>,
}

impl RuleTable {
    /// Build a table from `(pattern, handler)` pairs.
    ///
    /// Fails on a malformed pattern or when two rules would compete for the
    /// same nodes.
    pub fn new(rules: &[(&str, Handler)]) -> Result<Self, Error> {
        let mut table = RuleTable::default();
        for &(source, handler) in rules {
            table.register(Rule {
                pattern: Pattern::parse(source)?,
                handler,
            })?;
        }
        Ok(table)
    }

    /// The rules of the standard language
    pub fn builtin() -> &'static RuleTable {
        &BUILTIN_TABLE
    }

    pub fn register(&mut self, rule: Rule) -> Result<(), Error> {
        let taken = match &rule.pattern {
            Pattern::Form { head, .. } => self.forms.contains_key(head),
            Pattern::TypedHead(_) => self.typed_heads.iter().any(|r| r.pattern == rule.pattern),
            Pattern::Application => self.application.is_some(),
            Pattern::Kind(ArgKind::Any) => self.fallback.is_some(),
            Pattern::Kind(_) => self.kinds.iter().any(|r| r.pattern == rule.pattern),
        };
        if taken {
            return Err(Error::RuntimeError(format!(
                "Duplicate rule for \"{}\"",
                rule.pattern
            )));
        }

        match &rule.pattern {
            Pattern::Form { head, .. } => {
                let head = head.clone();
                self.forms.insert(head, rule);
            }
            Pattern::TypedHead(_) => self.typed_heads.push(rule),
            Pattern::Application => self.application = Some(rule),
            Pattern::Kind(ArgKind::Any) => self.fallback = Some(rule),
            Pattern::Kind(_) => self.kinds.push(rule),
        }
        Ok(())
    }

    /// Heads of all registered forms
    pub fn heads(&self) -> impl Iterator<Item = &str> {
        self.forms.keys().map(String::as_str)
    }

    /// All rules, forms sorted by head
    pub fn rules(&self) -> Vec<&Rule> {
        let mut forms: Vec<_> = self.forms.values().collect();
        forms.sort_by(|a, b| a.pattern.to_string().cmp(&b.pattern.to_string()));
        forms
            .into_iter()
            .chain(&self.typed_heads)
            .chain(&self.application)
            .chain(&self.kinds)
            .chain(&self.fallback)
            .collect()
    }

    /// Find the rule for `node` and check the node against it
    pub fn select(&self, node: &Ast) -> Result<&Rule, Error> {
        let rule = self.find(node)?;
        rule.pattern.validate(node)?;
        Ok(rule)
    }

    fn find(&self, node: &Ast) -> Result<&Rule, Error> {
        if let Ast::List(elements) = node {
            let Some(head) = elements.first() else {
                return Err(Error::RuntimeError("Cannot evaluate empty list".to_owned()));
            };
            if let Some(rule) = head.as_symbol().and_then(|name| self.forms.get(name)) {
                return Ok(rule);
            }
            let typed = self.typed_heads.iter().find(|rule| {
                matches!(&rule.pattern, Pattern::TypedHead(kind) if kind.matches_ast(head))
            });
            if let Some(rule) = typed.or(self.application.as_ref()) {
                return Ok(rule);
            }
        }

        let by_kind = self
            .kinds
            .iter()
            .find(|rule| matches!(&rule.pattern, Pattern::Kind(kind) if kind.matches_ast(node)));
        by_kind
            .or(self.fallback.as_ref())
            .ok_or_else(|| Error::RuntimeError(format!("No rule to evaluate \"{node}\"")))
    }

    /// Select the rule for `node` and run its handler
    pub fn dispatch(&self, node: &Ast, ctx: &EvaluationContext<'_>) -> Result<Value, Error> {
        let rule = self.select(node)?;
        (rule.handler)(node, ctx)
    }
}

/// Rules of the standard language. Every form head here is also listed in
/// `environment::RESERVED_KEYWORDS`.
const BUILTIN_RULES: &[(&str, Handler)] = &[
    (":number", evaluator::eval_number),
    (":symbol", evaluator::eval_symbol),
    ("(define :symbol :any)", evaluator::eval_define),
    ("(function :list<symbol> :any)", evaluator::eval_function),
    ("(lambda :list<symbol> :any)", evaluator::eval_function),
    ("(callByName :list<symbol> :any)", evaluator::eval_call_by_name),
    ("(if :any :any :any)", evaluator::eval_if),
    ("(quote :any)", evaluator::eval_quote),
    ("(lazy :any)", evaluator::eval_lazy),
    ("(evaluate :any)", evaluator::eval_evaluate),
    ("(eval :any)", evaluator::eval_evaluate),
    ("(:any ...)", evaluator::eval_application),
];

static BUILTIN_TABLE: LazyLock<RuleTable> = LazyLock::new(|| {
    RuleTable::new(BUILTIN_RULES).expect("built-in rule patterns are well-formed")
});

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{list, num, sym};
    use crate::environment::is_reserved;
    use crate::evaluator::{EvalConfig, eval};
    use crate::{Environment, create_global_env, parse};

    #[test]
    fn test_pattern_parsing() {
        let form = |head: &str, arity, kinds| Pattern::Form {
            head: head.to_owned(),
            arity,
            kinds,
        };
        let symbols = ArgKind::ListOf(Box::new(ArgKind::Symbol));
        let cases = vec![
            (":number", Pattern::Kind(ArgKind::Number)),
            (":all", Pattern::Kind(ArgKind::Any)),
            (
                "(define :symbol :all)",
                form("define", Arity::Exact(2), vec![ArgKind::Symbol, ArgKind::Any]),
            ),
            (
                "(function :list<symbol> :any)",
                form("function", Arity::Exact(2), vec![symbols, ArgKind::Any]),
            ),
            ("(print :any ...)", form("print", Arity::AtLeast(1), vec![ArgKind::Any])),
            ("(now)", form("now", Arity::Exact(0), vec![])),
            ("(:number ...)", Pattern::TypedHead(ArgKind::Number)),
            ("(:all ...)", Pattern::Application),
        ];
        for (source, expected) in cases {
            let pattern = Pattern::parse(source).unwrap();
            assert_eq!(pattern, expected, "parsing {source}");
            // Display gives back a pattern that parses to the same thing
            assert_eq!(Pattern::parse(&pattern.to_string()).unwrap(), pattern);
        }
    }

    #[test]
    fn test_malformed_patterns() {
        for source in [
            "number",
            "42",
            "()",
            "(define symbol)",
            "(define :bogus)",
            "(:number :any)",
            "(... :any)",
            "(define :list<bogus>)",
            "(define :any",
        ] {
            assert!(
                matches!(Pattern::parse(source), Err(Error::SyntaxError(_))),
                "{source} should be rejected"
            );
        }

        let err = Pattern::parse("(define :bogus)").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid pattern \"(define :bogus)\": \":bogus\" is not a :kind"
        );
    }

    #[test]
    fn test_arg_kinds() {
        let symbols = ArgKind::parse(":list<symbol>").unwrap();
        assert!(symbols.matches_ast(&list([sym("x"), sym("y")])));
        assert!(symbols.matches_ast(&list([])));
        assert!(!symbols.matches_ast(&list([sym("x"), num(1)])));
        assert!(!symbols.matches_ast(&sym("x")));

        assert!(ArgKind::Number.matches_value(&Value::Number(1.0)));
        assert!(!ArgKind::Number.matches_value(&Value::Symbol("1".to_owned())));
        assert!(!ArgKind::Function.matches_ast(&sym("f")));
        assert_eq!(symbols.to_string(), "list<symbol>");
    }

    #[test]
    fn test_arity_display_and_validation() {
        assert_eq!(Arity::Exact(2).to_string(), "2");
        assert_eq!(Arity::AtLeast(1).to_string(), "at least 1");
        assert!(Arity::Any.accepts(0));

        let err = Arity::Exact(2).validate("+", 3).unwrap_err();
        assert_eq!(err.to_string(), "\"+\" expects 2 arguments, instead got 3");
    }

    #[test]
    fn test_builtin_selection() {
        let table = RuleTable::builtin();
        let pattern_of = |source: &str| {
            table
                .select(&parse(source).unwrap())
                .map(|rule| rule.pattern.to_string())
        };

        let cases = vec![
            ("42", Ok(":number")),
            ("x", Ok(":symbol")),
            ("(define x 1)", Ok("(define :symbol :any)")),
            ("(lambda (x) x)", Ok("(lambda :list<symbol> :any)")),
            ("(f 1 2)", Ok("(:any ...)")),
            ("((function (x) x) 1)", Ok("(:any ...)")),
            ("(1 2)", Ok("(:any ...)")),
            ("()", Err("Cannot evaluate empty list")),
            ("(define x)", Err("\"define\" expects 2 arguments, instead got 1")),
            ("(quote 1 2)", Err("\"quote\" expects 1 arguments, instead got 2")),
            (
                "(define 1 2)",
                Err("\"define\" expects symbol as the 1 argument, instead got \"1\""),
            ),
            (
                "(function (x 1) x)",
                Err("\"function\" expects list<symbol> as the 1 argument, instead got \"(x 1)\""),
            ),
        ];
        for (source, expected) in cases {
            let actual = pattern_of(source).map_err(|e| e.to_string());
            match expected {
                Ok(pattern) => assert_eq!(actual.as_deref(), Ok(pattern), "{source}"),
                Err(message) => assert_eq!(actual, Err(message.to_owned()), "{source}"),
            }
        }
    }

    #[test]
    fn test_builtin_heads_are_reserved() {
        for head in RuleTable::builtin().heads() {
            assert!(is_reserved(head), "{head} should be reserved");
        }
    }

    #[test]
    fn test_duplicate_rules_rejected() {
        let duplicates: &[&[(&str, Handler)]] = &[
            &[
                ("(quote :any)", evaluator::eval_quote),
                ("(quote :number)", evaluator::eval_quote),
            ],
            &[
                (":number", evaluator::eval_number),
                (":number", evaluator::eval_number),
            ],
            &[
                ("(:any ...)", evaluator::eval_application),
                ("(:all ...)", evaluator::eval_application),
            ],
        ];
        for rules in duplicates {
            let err = RuleTable::new(rules).unwrap_err();
            assert!(err.to_string().starts_with("Duplicate rule"), "{err}");
        }
    }

    /// `(3 a b c)` evaluates to the third element, counting from one
    fn eval_index(node: &Ast, ctx: &EvaluationContext<'_>) -> Result<Value, Error> {
        let Ast::List(elements) = node else {
            unreachable!("routed by (:number ...)");
        };
        let index = elements[0].as_number().unwrap_or_default() as usize;
        match elements.get(index) {
            Some(element) => eval(element, &ctx.deeper()),
            None => Err(Error::RuntimeError(format!("No element {index} in \"{node}\""))),
        }
    }

    #[test]
    fn test_custom_typed_head_rule() {
        let table = RuleTable::new(&[
            (":number", evaluator::eval_number),
            (":symbol", evaluator::eval_symbol),
            ("(:number ...)", eval_index),
            ("(:any ...)", evaluator::eval_application),
        ])
        .unwrap();

        let env = create_global_env();
        let ctx = EvaluationContext::with_rules(env, EvalConfig::default(), &table);

        let node = parse("(2 10 20 30)").unwrap();
        assert_eq!(table.select(&node).unwrap().pattern, Pattern::TypedHead(ArgKind::Number));
        assert_eq!(eval(&node, &ctx).unwrap(), Value::Number(20.0));
        assert_eq!(
            eval(&parse("(2 10 (+ 1 2))").unwrap(), &ctx).unwrap(),
            Value::Number(3.0)
        );
        assert!(eval(&parse("(7 1)").unwrap(), &ctx).is_err());

        // Forms unknown to this table fall through to application
        let err = eval(&parse("(quote x)").unwrap(), &ctx).unwrap_err();
        assert!(err.to_string().contains("Can't find \"quote\" variable"), "{err}");
    }

    #[test]
    fn test_table_without_fallback() {
        let table = RuleTable::new(&[(":number", evaluator::eval_number)]).unwrap();
        let ctx = EvaluationContext::with_rules(Environment::new(), EvalConfig::default(), &table);
        assert_eq!(eval(&num(5), &ctx).unwrap(), Value::Number(5.0));
        let err = eval(&sym("x"), &ctx).unwrap_err();
        assert_eq!(err.to_string(), "No rule to evaluate \"x\"");
    }
}
