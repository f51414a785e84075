use calcy::dispatcher::RuleTable;
use calcy::evaluator::{self, EvalConfig, Strategy};
use calcy::reader::{ParseConfig, parse_with_config};
use calcy::{Environment, Error, ParseErrorKind, Value};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::panic;
use std::process;

fn main() {
    init_tracing();

    let result = panic::catch_unwind(|| {
        run_repl();
    });

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

/// Evaluation traces go to stderr, and only when `RUST_LOG` is set,
/// e.g. `RUST_LOG=calcy=debug` to watch thunks being forced.
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .with(EnvFilter::from_default_env())
            .init();
    }
}

/// An unclosed list: keep reading lines into the same expression
fn needs_more_input(error: &Error) -> bool {
    matches!(error, Error::SyntaxError(e)
        if e.kind == ParseErrorKind::Incomplete && e.message.starts_with("Expected \")\""))
}

fn run_repl() {
    println!("calcy - call-by-value, call-by-name and call-by-need in one evaluator");
    println!("Enter S-expressions like: (define square (function (x) (* x x)))");
    println!("Type :help for more commands, or Ctrl+C to exit.");
    println!();

    let mut rl = DefaultEditor::new().expect("Could not initialize REPL");
    let env = evaluator::create_global_env();
    let mut config = EvalConfig::default();
    let parse_config = ParseConfig::default();
    let mut pending = String::new();

    loop {
        let prompt = if pending.is_empty() {
            format!("calcy[{}]> ", config.strategy)
        } else {
            "... ".to_owned()
        };

        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() && pending.is_empty() {
                    continue;
                }

                if pending.is_empty() {
                    let _ = rl.add_history_entry(line);

                    if let Some(command) = line.strip_prefix(':') {
                        if !run_command(command, &env, &mut config) {
                            println!("Goodbye!");
                            break;
                        }
                        continue;
                    }
                }

                if !pending.is_empty() {
                    pending.push('\n');
                }
                pending.push_str(line);

                let expr = match parse_with_config(&pending, parse_config) {
                    Ok(expr) => expr,
                    Err(e) if needs_more_input(&e) => continue,
                    Err(e) => {
                        println!("Error: {e}");
                        pending.clear();
                        continue;
                    }
                };
                pending.clear();

                match evaluator::evaluate(&expr, &env, config) {
                    Ok(result) => println!("= {result}"),
                    Err(e) => println!("Error: {e}"),
                }
            }

            Err(ReadlineError::Interrupted) if !pending.is_empty() => {
                pending.clear();
            }
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

/// Run a `:command`. Returns false when the REPL should exit.
fn run_command(command: &str, env: &Environment, config: &mut EvalConfig) -> bool {
    let mut words = command.split_whitespace();
    match (words.next(), words.next()) {
        (Some("help"), _) => print_help(),
        (Some("env"), _) => print_environment(env),
        (Some("strategy"), None) => println!("Strategy: {}", config.strategy),
        (Some("strategy"), Some(name)) => match name.parse::<Strategy>() {
            Ok(strategy) => {
                config.strategy = strategy;
                println!("Strategy: {strategy}");
            }
            Err(e) => println!("Error: {e}"),
        },
        (Some("memo"), Some("on")) => config.memoize_thunks = true,
        (Some("memo"), Some("off")) => config.memoize_thunks = false,
        (Some("memo"), _) => println!(
            "Memoization: {}",
            if config.memoize_thunks { "on" } else { "off" }
        ),
        (Some("depth"), Some(n)) => match n.parse() {
            Ok(max_depth) => config.max_depth = max_depth,
            Err(e) => println!("Error: {e}"),
        },
        (Some("rules"), _) => {
            for rule in RuleTable::builtin().rules() {
                println!("  {}", rule.pattern);
            }
        }
        (Some("quit" | "exit"), _) => return false,
        _ => println!("Unknown command :{command}, try :help"),
    }
    true
}

fn print_help() {
    println!("Commands:");
    println!("  :help              - Show this help message");
    println!("  :env               - Show current environment bindings");
    println!("  :strategy [name]   - Show or set the strategy (eager, by-name, by-need)");
    println!("  :memo [on|off]     - Show or set memoization of lazy values");
    println!("  :depth <n>         - Set the evaluation depth budget");
    println!("  :rules             - List the special-form patterns");
    println!("  :quit, :exit       - Exit the interpreter");
    println!("  Ctrl+C             - Cancel a multi-line expression, or exit");
    println!();
    println!("Special forms:");
    println!("  (define name expr)          bind a name, once");
    println!("  (function (x y) body)       closure; `lambda` is an alias");
    println!("  (function (n:number) body)  parameters may declare a kind");
    println!("  (callByName (x y) body)     closure taking unevaluated arguments");
    println!("  (if test then else)         test must be true or false");
    println!("  (quote expr)                expr as data");
    println!("  (lazy expr)                 postpone expr");
    println!("  (evaluate expr)             force, and run quoted data as code");
    println!();
    println!("Examples:");
    println!("  (define Y (function (f) (f (Y f))))");
    println!("  (define fact (Y (callByName (fact)");
    println!("    (function (n) (if (< n 2) 1 (* n ((evaluate fact) (- n 1))))))))");
    println!("  (fact 5)");
    println!();
}

fn print_environment(env: &Environment) {
    let bindings = env.bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    // Separate natives from user-defined values
    let mut natives = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in bindings {
        match value {
            Value::NativeFunction(_) => natives.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    if !natives.is_empty() {
        println!("Native functions ({}):", natives.len());
        let mut col = 0;
        for name in natives {
            print!("  {name:<15}");
            col += 1;
            if col % 4 == 0 {
                println!();
            }
        }
        if col % 4 != 0 {
            println!();
        }
        println!();
    }

    if !user_defined.is_empty() {
        println!("User-defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}
