//! Purpose: C ABI bridge for bindings (libfiligree).
//! Exports: C-callable engine lifecycle/eval functions and buffer/error helpers.
//! Role: Stable ABI surface for non-Rust consumers of the host library.
//! Invariants: JSON bytes in/out; explicit free functions; no interpreter types.
//! Invariants: Error kinds map 1:1 with core error kinds.
//! Invariants: All calls route through the process-wide `Engine::global()`.

use crate::api::{Engine, Error, ErrorKind};
use serde_json::Value;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

#[repr(C)]
pub struct flg_buf {
    pub data: *mut u8,
    pub len: usize,
}

#[repr(C)]
pub struct flg_error {
    pub kind: i32,
    pub message: *mut c_char,
    pub expr: *mut c_char,
    pub hint: *mut c_char,
}

#[unsafe(no_mangle)]
pub extern "C" fn flg_init(out_err: *mut *mut flg_error) -> i32 {
    match Engine::global().init() {
        Ok(()) => 0,
        Err(err) => fail(out_err, err),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn flg_shutdown(out_err: *mut *mut flg_error) -> i32 {
    match Engine::global().shutdown() {
        Ok(()) => 0,
        Err(err) => fail(out_err, err),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn flg_reset(out_err: *mut *mut flg_error) -> i32 {
    match Engine::global().reset() {
        Ok(()) => 0,
        Err(err) => fail(out_err, err),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn flg_define(decl: *const c_char, out_err: *mut *mut flg_error) -> i32 {
    let decl = match parse_cstr(decl, "decl", out_err) {
        Ok(decl) => decl,
        Err(code) => return code,
    };
    match Engine::global().define(&decl) {
        Ok(()) => 0,
        Err(err) => fail(out_err, err),
    }
}

/// Evaluate `expr` against `input_json` (NULL means a `null` input). On
/// success, `out_results` holds a JSON array of every produced value.
#[unsafe(no_mangle)]
pub extern "C" fn flg_eval(
    expr: *const c_char,
    input_json: *const c_char,
    out_results: *mut flg_buf,
    out_err: *mut *mut flg_error,
) -> i32 {
    let expr = match parse_cstr(expr, "expr", out_err) {
        Ok(expr) => expr,
        Err(code) => return code,
    };
    let input = match parse_input(input_json, out_err) {
        Ok(input) => input,
        Err(code) => return code,
    };
    let results = match Engine::global().evaluate(&expr, &input) {
        Ok(results) => results,
        Err(err) => return fail(out_err, err),
    };
    fill_results(results, out_results, out_err)
}

/// Call a defined function by name. `args_json` is a JSON array of argument
/// values (NULL means no arguments); `input_json` as in `flg_eval`.
#[unsafe(no_mangle)]
pub extern "C" fn flg_call(
    name: *const c_char,
    args_json: *const c_char,
    input_json: *const c_char,
    out_results: *mut flg_buf,
    out_err: *mut *mut flg_error,
) -> i32 {
    let name = match parse_cstr(name, "name", out_err) {
        Ok(name) => name,
        Err(code) => return code,
    };
    let args = if args_json.is_null() {
        Vec::new()
    } else {
        let raw = match parse_cstr(args_json, "args_json", out_err) {
            Ok(raw) => raw,
            Err(code) => return code,
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(args)) => args,
            Ok(_) => {
                return fail(
                    out_err,
                    Error::new(ErrorKind::Usage).with_message("args_json must be a JSON array"),
                );
            }
            Err(err) => {
                return fail(
                    out_err,
                    Error::new(ErrorKind::Usage)
                        .with_message("args_json is not valid JSON")
                        .with_source(err),
                );
            }
        }
    };
    let input = match parse_input(input_json, out_err) {
        Ok(input) => input,
        Err(code) => return code,
    };
    let results = match Engine::global().call(&name, &args, &input) {
        Ok(results) => results,
        Err(err) => return fail(out_err, err),
    };
    fill_results(results, out_results, out_err)
}

#[unsafe(no_mangle)]
pub extern "C" fn flg_buf_free(buf: *mut flg_buf) {
    if buf.is_null() {
        return;
    }
    unsafe {
        let buf = &mut *buf;
        if !buf.data.is_null() && buf.len != 0 {
            drop(Vec::from_raw_parts(buf.data, buf.len, buf.len));
        }
        buf.data = ptr::null_mut();
        buf.len = 0;
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn flg_error_free(err: *mut flg_error) {
    if err.is_null() {
        return;
    }
    unsafe {
        let err = Box::from_raw(err);
        if !err.message.is_null() {
            drop(CString::from_raw(err.message));
        }
        if !err.expr.is_null() {
            drop(CString::from_raw(err.expr));
        }
        if !err.hint.is_null() {
            drop(CString::from_raw(err.hint));
        }
    }
}

fn parse_cstr(
    ptr: *const c_char,
    what: &str,
    out_err: *mut *mut flg_error,
) -> Result<String, i32> {
    if ptr.is_null() {
        return Err(fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message(format!("{what} is null")),
        ));
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map(|s| s.to_string())
        .map_err(|_| {
            fail(
                out_err,
                Error::new(ErrorKind::Usage).with_message(format!("{what} is not valid UTF-8")),
            )
        })
}

fn parse_input(input_json: *const c_char, out_err: *mut *mut flg_error) -> Result<Value, i32> {
    if input_json.is_null() {
        return Ok(Value::Null);
    }
    let raw = parse_cstr(input_json, "input_json", out_err)?;
    serde_json::from_str(&raw).map_err(|err| {
        fail(
            out_err,
            Error::new(ErrorKind::Usage)
                .with_message("input_json is not valid JSON")
                .with_source(err),
        )
    })
}

fn fill_results(results: Vec<Value>, out_results: *mut flg_buf, out_err: *mut *mut flg_error) -> i32 {
    if out_results.is_null() {
        return fail(
            out_err,
            Error::new(ErrorKind::Usage).with_message("out_results is null"),
        );
    }
    let encoded = match serde_json::to_vec(&Value::Array(results)) {
        Ok(encoded) => encoded,
        Err(err) => {
            return fail(
                out_err,
                Error::new(ErrorKind::Internal)
                    .with_message("failed to encode results")
                    .with_source(err),
            );
        }
    };
    // Boxed-slice roundtrip so capacity == len, matching `flg_buf_free`.
    let mut encoded = encoded.into_boxed_slice().into_vec();
    let len = encoded.len();
    let data = encoded.as_mut_ptr();
    std::mem::forget(encoded);
    unsafe {
        (*out_results).data = data;
        (*out_results).len = len;
    }
    0
}

fn fail(out_err: *mut *mut flg_error, err: Error) -> i32 {
    let code = error_kind_code(err.kind());
    if out_err.is_null() {
        return code;
    }
    let error = Box::new(flg_error {
        kind: code,
        message: to_c_string(err.message().unwrap_or("")),
        expr: err.expr().map(to_c_string).unwrap_or(ptr::null_mut()),
        hint: err.hint().map(to_c_string).unwrap_or(ptr::null_mut()),
    });
    unsafe {
        *out_err = Box::into_raw(error);
    }
    code
}

fn error_kind_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::Init => 3,
        ErrorKind::Eval => 4,
        ErrorKind::Convert => 5,
        ErrorKind::Io => 6,
    }
}

fn to_c_string(input: &str) -> *mut c_char {
    CString::new(input)
        .map(|s| s.into_raw())
        .unwrap_or(ptr::null_mut())
}
