use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use spork::Error;
use spork::evaluator::{self, Environment};
use spork::reader::{Reader, parse_program};
use spork::typechecker::{TypeEnv, infer, infer_toplevel};
use spork::value::Value;

/// Reader, type checker and evaluator for the Spork expression language
#[derive(Parser, Debug)]
#[command(name = "spork", version, about)]
struct Cli {
    /// Source file to run; starts an interactive session when omitted
    file: Option<PathBuf>,

    /// Type-check each top-level expression before evaluating it
    #[arg(long)]
    check: bool,

    /// Print the inferred type of each expression instead of evaluating it
    #[arg(long, conflicts_with = "check")]
    types: bool,
}

/// Only installs a subscriber when RUST_LOG is set, e.g. `RUST_LOG=spork=trace`
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .with(EnvFilter::from_default_env())
            .init();
    }
}

/// State shared by every expression of a file or REPL session
struct Session {
    env: Environment,
    types: TypeEnv,
    check: bool,
    types_only: bool,
}

impl Session {
    fn new(cli: &Cli) -> Self {
        Session {
            env: evaluator::create_global_env(),
            types: TypeEnv::new(),
            check: cli.check,
            types_only: cli.types,
        }
    }

    /// Read, check and evaluate each top-level expression in `source`, printing
    /// results as it goes. Stops at the first error.
    fn run(&mut self, source: &str) -> Result<(), Error> {
        for expr in Reader::new(source) {
            let expr = expr?;

            // Bindings only reach the type environment when the whole expression checks
            let mut scratch = self.types.clone();
            match infer_toplevel(&expr, &mut scratch) {
                Ok(ty) => {
                    self.types = scratch;
                    if self.types_only {
                        if let Some(ty) = ty {
                            println!("{ty}");
                        }
                        continue;
                    }
                }
                Err(err) if self.check || self.types_only => return Err(err),
                Err(err) => tracing::debug!(error = %err, "evaluating unchecked expression"),
            }

            let result = evaluator::eval(&expr, &mut self.env)?;
            if !result.is_void() {
                println!("{result}");
            }
        }
        Ok(())
    }
}

fn run_file(cli: &Cli, path: &PathBuf) -> ExitCode {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("cannot read {}: {err}", path.display());
            return ExitCode::FAILURE;
        }
    };

    let mut session = Session::new(cli);
    match session.run(&source) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run_repl(cli: &Cli) -> ExitCode {
    println!("Spork expression evaluator");
    println!("Enter expressions like: (let x 5 (* x x))");
    println!("Type :help for more commands, or Ctrl+D to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("could not initialize line editor: {err}");
            return ExitCode::FAILURE;
        }
    };
    let mut session = Session::new(cli);

    loop {
        match rl.readline("spork> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match line {
                    ":help" => {
                        print_help();
                        continue;
                    }
                    ":env" => {
                        print_environment(&session.env);
                        continue;
                    }
                    ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                if let Some(source) = line.strip_prefix(":type") {
                    if let Err(err) = print_types(source, &session.types) {
                        println!("Error: {err}");
                    }
                    continue;
                }

                if let Err(err) = session.run(line) {
                    println!("Error: {err}");
                }
            }

            Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

fn print_types(source: &str, types: &TypeEnv) -> Result<(), Error> {
    for expr in parse_program(source)? {
        println!("{}", infer(&expr, types)?);
    }
    Ok(())
}

fn print_help() {
    println!("Commands:");
    println!("  :help       - Show this help message");
    println!("  :env        - Show current environment bindings");
    println!("  :type EXPR  - Show the inferred type of EXPR without evaluating it");
    println!("  :quit       - Exit the interpreter");
    println!("  :exit       - Exit the interpreter");
    println!("  Ctrl+D      - Exit the interpreter");
    println!();
    println!("Forms:");
    println!("  (let x 5)                  bind x for later expressions");
    println!("  (let x 5 (* x x))          bind x for the body only");
    println!("  (fn (a b) (+ a b))         function");
    println!("  (if (< 1 2) \"yes\" \"no\")    conditional, the condition must be a bool");
    println!("  (. 1 2.0 true)             tuple");
    println!("  (# anything)               comment");
    println!("  (let x 1) ; (+ x 1)        sequence");
    println!();
    println!("Builtins: + - * / on ints, == < > comparing ints");
    println!();
}

fn print_environment(env: &Environment) {
    let bindings = env.get_all_bindings();

    let mut builtins = Vec::new();
    let mut user_defined = Vec::new();
    for (name, value) in bindings {
        match value {
            Value::Builtin { .. } => builtins.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    if !builtins.is_empty() {
        println!("Built-in functions ({}): {}", builtins.len(), builtins.join(" "));
    }
    if user_defined.is_empty() {
        println!("No user-defined values.");
    } else {
        println!("User-defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match &cli.file {
        Some(path) => run_file(&cli, path),
        None => run_repl(&cli),
    }
}
