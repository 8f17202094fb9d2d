//! Purpose: Hold top-level CLI command dispatch for `filigree`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Output envelopes and exit code semantics stay unchanged.
//! Invariants: Helpers in `main.rs` remain the source of I/O conventions.

use super::*;

pub(super) fn dispatch_command(command: Command, defs: Vec<PathBuf>) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "filigree", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_json(json!({
                "name": "filigree",
                "version": env!("CARGO_PKG_VERSION"),
            }));
            Ok(RunOutcome::ok())
        }
        Command::Eval { expr, input_json } => {
            let engine = setup_engine(&defs)?;
            let input = resolve_input(input_json)?;
            let results = engine.evaluate(&expr, &input)?;
            emit_results(&results);
            Ok(RunOutcome::ok())
        }
        Command::Call {
            name,
            args,
            input_json,
        } => {
            let engine = setup_engine(&defs)?;
            let mut parsed = Vec::with_capacity(args.len());
            for (idx, arg) in args.iter().enumerate() {
                parsed.push(parse_json_arg(arg, &format!("argument {}", idx + 1))?);
            }
            let input = resolve_input(input_json)?;
            let results = engine.call(&name, &parsed, &input)?;
            emit_results(&results);
            Ok(RunOutcome::ok())
        }
        Command::Check { expr } => {
            let engine = setup_engine(&defs)?;
            engine.check(&expr)?;
            emit_json(json!({ "ok": true, "expr": expr }));
            Ok(RunOutcome::ok())
        }
    }
}
