//! Purpose: `filigree` CLI entry point and bootstrap.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Results go to stdout; errors are JSON on stderr when piped.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: All engine traffic goes through `api::Engine` (host types only).
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;

use filigree::api::{Engine, Error, ErrorKind, to_exit_code};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    init_tracing();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                let rendered = err.to_string();
                let summary = rendered.lines().next().unwrap_or("invalid arguments");
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(summary)
                    .with_hint("Run `filigree --help` for usage."));
            }
        },
    };

    command_dispatch::dispatch_command(cli.command, cli.defs)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser)]
#[command(
    name = "filigree",
    version,
    about = "Evaluate expressions through an embedded engine without touching its API"
)]
struct Cli {
    /// Load `def ..;` declarations from a file before running (repeatable).
    #[arg(long = "defs", value_name = "FILE", global = true, value_hint = ValueHint::FilePath)]
    defs: Vec<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate an expression against a JSON input (stdin or --input-json).
    Eval {
        expr: String,
        /// JSON input value; defaults to stdin, or `null` on a terminal.
        #[arg(long = "input-json", value_name = "JSON")]
        input_json: Option<String>,
    },
    /// Call a defined function with JSON argument literals.
    Call {
        name: String,
        /// Arguments, each a JSON value.
        args: Vec<String>,
        #[arg(long = "input-json", value_name = "JSON")]
        input_json: Option<String>,
    },
    /// Check that an expression compiles against the loaded definitions.
    Check { expr: String },
    /// Print version information as JSON.
    Version,
    /// Generate shell completion scripts.
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn setup_engine(defs: &[PathBuf]) -> Result<&'static Engine, Error> {
    let engine = Engine::global();
    engine.init()?;
    // The CLI is one-shot; start from a clean prelude each run.
    engine.reset()?;
    for path in defs {
        let source = std::fs::read_to_string(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("failed to read defs file `{}`", path.display()))
                .with_source(err)
        })?;
        engine.define(&source).map_err(|err| {
            err.with_hint(format!(
                "Definitions came from `{}`; each must be a `def name: body;` declaration.",
                path.display()
            ))
        })?;
    }
    Ok(engine)
}

fn resolve_input(input_json: Option<String>) -> Result<Value, Error> {
    if let Some(raw) = input_json {
        return parse_json_arg(&raw, "--input-json");
    }
    if io::stdin().is_terminal() {
        return Ok(Value::Null);
    }
    let mut raw = String::new();
    io::stdin().read_to_string(&mut raw).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read input from stdin")
            .with_source(err)
    })?;
    if raw.trim().is_empty() {
        return Ok(Value::Null);
    }
    parse_json_arg(&raw, "stdin")
}

fn parse_json_arg(raw: &str, what: &str) -> Result<Value, Error> {
    serde_json::from_str(raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("{what} is not valid JSON"))
            .with_hint("Pass a JSON value, e.g. '{\"x\":1}' or 'null'.")
            .with_source(err)
    })
}

fn emit_results(results: &[Value]) {
    let pretty = io::stdout().is_terminal();
    for result in results {
        emit_json_value(result, pretty);
    }
}

fn emit_json(value: Value) {
    let pretty = io::stdout().is_terminal();
    emit_json_value(&value, pretty);
}

fn emit_json_value(value: &Value, pretty: bool) {
    let encoded = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    println!(
        "{}",
        encoded.unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string())
    );
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }
    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert(
        "message".to_string(),
        json!(err.message().unwrap_or("unknown error")),
    );
    if let Some(expr) = err.expr() {
        inner.insert("expr".to_string(), json!(expr));
    }
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        causes.push(cause.to_string());
        source = cause.source();
    }
    causes
}

fn error_text(err: &Error) -> String {
    let mut text = format!("error: {}", err.message().unwrap_or("unknown error"));
    if let Some(expr) = err.expr() {
        text.push_str(&format!("\n  expr: {expr}"));
    }
    for cause in error_causes(err) {
        text.push_str(&format!("\n  cause: {cause}"));
    }
    if let Some(hint) = err.hint() {
        text.push_str(&format!("\nhint: {hint}"));
    }
    text
}
