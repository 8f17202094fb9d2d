//! Purpose: Own the lifecycle of the embedded engine's process-wide state.
//! Exports: `Engine`.
//! Role: Serialize all interpreter traffic behind one lock; host types only.
//! Invariants: Operations before `init` (or after `shutdown`) fail with `Init`.
//! Invariants: `init` and `shutdown` are idempotent; neither corrupts state.
//! Invariants: The lock is held for the full compile+run of each operation.

use std::sync::{Mutex, MutexGuard, OnceLock};

use serde_json::Value;
use tracing::debug;

use crate::core::error::{Error, ErrorKind};
use crate::core::interp;

/// Host-typed facade over the embedded expression engine.
///
/// The engine starts uninitialized; call [`Engine::init`] before anything
/// else. Every operation takes and returns host JSON values, never the
/// embedded engine's own types.
pub struct Engine {
    state: Mutex<Option<State>>,
}

struct State {
    defs: Vec<String>,
}

impl State {
    fn prelude(&self) -> String {
        self.defs.join("\n")
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }

    /// The process-wide engine instance shared by the C ABI and the CLI.
    pub fn global() -> &'static Engine {
        static GLOBAL: OnceLock<Engine> = OnceLock::new();
        GLOBAL.get_or_init(Engine::new)
    }

    /// Bring up the embedded engine. Safe to call more than once; repeated
    /// calls keep existing definitions.
    pub fn init(&self) -> Result<(), Error> {
        let mut state = self.locked()?;
        if state.is_some() {
            return Ok(());
        }
        // Probe the embedded engine with the identity program so a broken
        // embedding surfaces here, not on first use.
        interp::compile("", ".").map_err(|err| {
            Error::new(ErrorKind::Init)
                .with_message("embedded engine failed to start")
                .with_source(err)
        })?;
        *state = Some(State { defs: Vec::new() });
        debug!("engine initialized");
        Ok(())
    }

    /// Tear down the embedded engine. Safe to call more than once.
    pub fn shutdown(&self) -> Result<(), Error> {
        let mut state = self.locked()?;
        if state.take().is_some() {
            debug!("engine shut down");
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.is_some())
            .unwrap_or(false)
    }

    /// Compile and run `expr` against `input`, returning every produced value.
    pub fn evaluate(&self, expr: &str, input: &Value) -> Result<Vec<Value>, Error> {
        let guard = self.locked()?;
        let state = Self::ready(&guard)?;
        let program = interp::compile(&state.prelude(), expr)?;
        let results = program.run(input)?;
        debug!(expr, results = results.len(), "evaluated expression");
        Ok(results)
    }

    /// Compile-only validation of `expr` against the current definitions.
    pub fn check(&self, expr: &str) -> Result<(), Error> {
        let guard = self.locked()?;
        let state = Self::ready(&guard)?;
        interp::compile(&state.prelude(), expr).map(|_| ())
    }

    /// Invoke a defined function by name. Arguments are injected as JSON
    /// literals; `input` becomes the function's input value.
    pub fn call(&self, name: &str, args: &[Value], input: &Value) -> Result<Vec<Value>, Error> {
        if !is_function_name(name) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("`{name}` is not a valid function name"))
                .with_hint("Function names use letters, digits, and underscores."));
        }
        let expr = render_call(name, args)?;
        self.evaluate(&expr, input).map_err(|err| {
            if err.kind() == ErrorKind::Usage {
                err.with_hint(format!(
                    "Is `{name}` defined? Add it first, e.g. `def {name}: .;`"
                ))
            } else {
                err
            }
        })
    }

    /// Add one or more `def name(..): ..;` declarations to the engine's
    /// prelude. The chunk is validated before it is kept; on failure the
    /// existing definitions are untouched.
    pub fn define(&self, decl: &str) -> Result<(), Error> {
        let decl = decl.trim();
        if !decl.starts_with("def ") {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("definitions must be `def` declarations")
                .with_expr(decl)
                .with_hint("Example: def double: . * 2;"));
        }
        let mut guard = self.locked()?;
        let state = guard
            .as_mut()
            .ok_or_else(Self::not_initialized)?;
        let mut candidate = state.prelude();
        if !candidate.is_empty() {
            candidate.push('\n');
        }
        candidate.push_str(decl);
        interp::compile(&candidate, ".")?;
        state.defs.push(decl.to_string());
        debug!(defs = state.defs.len(), "definition added");
        Ok(())
    }

    /// Drop all user definitions, keeping the engine initialized.
    pub fn reset(&self) -> Result<(), Error> {
        let mut guard = self.locked()?;
        let state = guard
            .as_mut()
            .ok_or_else(Self::not_initialized)?;
        state.defs.clear();
        debug!("definitions cleared");
        Ok(())
    }

    fn locked(&self) -> Result<MutexGuard<'_, Option<State>>, Error> {
        self.state.lock().map_err(|_| {
            Error::new(ErrorKind::Internal).with_message("engine lock poisoned by a panic")
        })
    }

    fn ready<'a>(guard: &'a MutexGuard<'_, Option<State>>) -> Result<&'a State, Error> {
        guard.as_ref().ok_or_else(Self::not_initialized)
    }

    fn not_initialized() -> Error {
        Error::new(ErrorKind::Init)
            .with_message("engine is not initialized")
            .with_hint("Call init() before using the engine.")
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

fn is_function_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn render_call(name: &str, args: &[Value]) -> Result<String, Error> {
    if args.is_empty() {
        return Ok(name.to_string());
    }
    let mut rendered = Vec::with_capacity(args.len());
    for arg in args {
        let literal = serde_json::to_string(arg).map_err(|err| {
            Error::new(ErrorKind::Convert)
                .with_message("argument cannot be encoded as JSON")
                .with_source(err)
        })?;
        rendered.push(literal);
    }
    Ok(format!("{name}({})", rendered.join("; ")))
}
