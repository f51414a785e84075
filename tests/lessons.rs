//! End-to-end programs contrasting the three evaluation strategies.

#![expect(clippy::unwrap_used)] // test code OK

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use calcy::dispatcher::Arity;
use calcy::evaluator::eval_str;
use calcy::{EvalConfig, Environment, Error, Strategy, Value, create_global_env};
use pretty_assertions::assert_eq;

/// Run a program line by line in one session, returning the last result
fn run(program: &[&str], env: &Environment, config: EvalConfig) -> Result<Value, Error> {
    let (last, setup) = program.split_last().unwrap();
    for line in setup {
        eval_str(line, env, config).unwrap_or_else(|e| panic!("{line}: {e}"));
    }
    eval_str(last, env, config)
}

fn run_fresh(program: &[&str], strategy: Strategy) -> Result<Value, Error> {
    run(program, &create_global_env(), EvalConfig::new(strategy))
}

#[test]
fn test_basic_session() {
    let env = create_global_env();
    let config = EvalConfig::default();

    assert_eq!(eval_str("(- 5 (+ 2 1))", &env, config), Ok(Value::Number(2.0)));

    assert_eq!(eval_str("(define x 1)", &env, config), Ok(Value::Number(1.0)));
    let err = eval_str("(define x 2)", &env, config).unwrap_err();
    assert!(matches!(err, Error::RuntimeError(_)));
    assert!(err.to_string().contains("\"x\""), "{err}");
    assert_eq!(eval_str("x", &env, config), Ok(Value::Number(1.0)));

    assert_eq!(
        eval_str("(+ 1 2 3)", &env, config),
        Err(Error::ArityError {
            name: "+".to_owned(),
            expected: Arity::Exact(2),
            got: 3,
        })
    );

    let err = eval_str("(define 5 1)", &env, config).unwrap_err();
    assert_eq!(
        err.to_string(),
        "\"define\" expects symbol as the 1 argument, instead got \"5\""
    );

    let err = eval_str("(+ 1", &env, config).unwrap_err();
    assert!(matches!(err, Error::SyntaxError(_)));
}

#[test]
fn test_closures_capture_their_scope() {
    let program = [
        "(define getFun (function (x y) (function (i j) (- (+ x y) (+ i j)))))",
        "(define fun (getFun 5 4))",
        "(fun 3 2)",
    ];
    for strategy in Strategy::ALL {
        assert_eq!(run_fresh(&program, strategy), Ok(Value::Number(4.0)), "{strategy}");
    }
}

#[test]
fn test_user_defined_conditional() {
    let program = [
        "(define my-if (function (c t e) (if c t e)))",
        "(my-if (< 1 2) 100 unknownVariable)",
    ];

    // Eager evaluation of the arguments reaches the unbound branch
    let err = run_fresh(&program, Strategy::Eager).unwrap_err();
    assert!(err.to_string().contains("unknownVariable"), "{err}");

    for strategy in [Strategy::ByName, Strategy::ByNeed] {
        assert_eq!(run_fresh(&program, strategy), Ok(Value::Number(100.0)), "{strategy}");
    }
}

#[test]
fn test_call_by_name_conditional() {
    let program = [
        "(define my-if (callByName (c t e) (if c t e)))",
        "(my-if (< 2 1) unknownVariable 100)",
    ];
    for strategy in Strategy::ALL {
        assert_eq!(run_fresh(&program, strategy), Ok(Value::Number(100.0)), "{strategy}");
    }
}

#[test]
fn test_conditional_with_wrapped_branches() {
    // Functions postpone their bodies even under eager evaluation
    let program = [
        "(define true (function (x y) x))",
        "(define false (function (x y) y))",
        "(define my-if (function (c t e) ((c t e))))",
        "(my-if true (function () 100) (function () unknownVariable))",
    ];
    for strategy in Strategy::ALL {
        assert_eq!(run_fresh(&program, strategy), Ok(Value::Number(100.0)), "{strategy}");
    }
}

#[test]
fn test_church_booleans() {
    let program = [
        "(define true (function (x y) x))",
        "(define false (function (x y) y))",
        // `<` returns a symbol naming one of the two functions above
        "(define less (function (x y) (evaluate (< x y))))",
        "(define my-if (function (c t e) (c t e)))",
        "(my-if (less 1 2) 100 unknownVariable)",
    ];

    assert!(run_fresh(&program, Strategy::Eager).is_err());
    assert_eq!(run_fresh(&program, Strategy::ByNeed), Ok(Value::Number(100.0)));
    assert_eq!(run_fresh(&program, Strategy::ByName), Ok(Value::Number(100.0)));

    // `if` is reserved and only accepts the symbols true and false, so a
    // function-valued condition needs the user-defined conditional above.
    let mut builtin_if = program[..3].to_vec();
    builtin_if.push("(if (less 2 1) (function () unknownVariable) (function () 100))");
    for strategy in Strategy::ALL {
        let err = run_fresh(&builtin_if, strategy).unwrap_err();
        assert!(matches!(err, Error::TypeError(_)), "{strategy}: {err}");
    }
}

#[test]
fn test_typed_parameters() {
    let program = [
        "(define area (function (w:number h:number) (* w h)))",
        "(area 3 (quote tall))",
    ];
    for strategy in Strategy::ALL {
        let err = run_fresh(&program, strategy).unwrap_err();
        assert_eq!(
            err.to_string(),
            "\"area\" expects number as the 2 argument, instead got \"tall\"",
            "{strategy}"
        );
    }
}

#[test]
fn test_y_combinator_with_call_by_name() {
    let program = [
        "(define Y (function (f) (f (Y f))))",
        "(define factorial (Y (callByName (fact) \
            (function (n) (if (< n 2) 1 (* n ((evaluate fact) (- n 1))))))))",
        "(factorial 5)",
    ];
    for strategy in Strategy::ALL {
        assert_eq!(run_fresh(&program, strategy), Ok(Value::Number(120.0)), "{strategy}");
    }
}

#[test]
fn test_y_combinator_needs_lazy_arguments() {
    let setup = "(define Y (function (f) (f (Y f))))";
    let factorial = "(define factorial (Y (function (fact) \
        (function (n) (if (< n 2) 1 (* n (fact (- n 1))))))))";

    // (Y f) is evaluated before f is called, forever
    let env = create_global_env();
    let config = EvalConfig::new(Strategy::Eager);
    eval_str(setup, &env, config).unwrap();
    assert_eq!(
        eval_str(factorial, &env, config),
        Err(Error::RecursionLimitExceeded {
            max_depth: config.max_depth,
        })
    );
    assert!(env.get("factorial").is_none());

    for strategy in [Strategy::ByName, Strategy::ByNeed] {
        let result = run_fresh(&[setup, factorial, "(factorial 6)"], strategy);
        assert_eq!(result, Ok(Value::Number(720.0)), "{strategy}");
    }
}

#[test]
fn test_sharing_of_argument_values() {
    // (strategy, calls to the native after (square (slow 3)))
    let cases = [(Strategy::Eager, 1), (Strategy::ByName, 2), (Strategy::ByNeed, 1)];

    for (strategy, expected_calls) in cases {
        let env = create_global_env();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        env.register_native("(slow :number)", move |args| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(args[0].clone())
        })
        .unwrap();

        let result = run(
            &["(define square (function (x) (* x x)))", "(square (slow 3))"],
            &env,
            EvalConfig::new(strategy),
        );
        assert_eq!(result, Ok(Value::Number(9.0)), "{strategy}");
        assert_eq!(calls.load(Ordering::SeqCst), expected_calls, "{strategy}");
    }
}

#[test]
fn test_quoted_programs() {
    let program = [
        "(define program (quote (function (x) (* x 10))))",
        "((evaluate program) 4)",
    ];
    for strategy in Strategy::ALL {
        assert_eq!(run_fresh(&program, strategy), Ok(Value::Number(40.0)), "{strategy}");
    }

    let env = create_global_env();
    let value = eval_str("(quote (a (1 b)))", &env, EvalConfig::default()).unwrap();
    assert_eq!(value.to_string(), "(a (1 b))");
}
