// C ABI contract test. Runs as one ordered scenario because the ABI is
// backed by the process-wide engine instance.
use std::ffi::{CStr, CString};
use std::ptr;

use filigree::abi::{
    flg_buf, flg_buf_free, flg_call, flg_define, flg_error, flg_error_free, flg_eval, flg_init,
    flg_reset, flg_shutdown,
};
use serde_json::Value;

fn empty_buf() -> flg_buf {
    flg_buf {
        data: ptr::null_mut(),
        len: 0,
    }
}

fn buf_json(buf: &flg_buf) -> Value {
    let bytes = unsafe { std::slice::from_raw_parts(buf.data, buf.len) };
    serde_json::from_slice(bytes).expect("buffer holds valid json")
}

fn take_error(err: &mut *mut flg_error) -> (i32, String) {
    assert!(!err.is_null(), "expected an error struct");
    let (kind, message) = unsafe {
        let e = &**err;
        let message = if e.message.is_null() {
            String::new()
        } else {
            CStr::from_ptr(e.message).to_string_lossy().into_owned()
        };
        (e.kind, message)
    };
    flg_error_free(*err);
    *err = ptr::null_mut();
    (kind, message)
}

#[test]
fn abi_full_lifecycle_roundtrip() {
    let mut err: *mut flg_error = ptr::null_mut();
    let add = CString::new("1 + 2").unwrap();

    // Before init: Init kind code, no crash.
    let mut buf = empty_buf();
    let code = flg_eval(add.as_ptr(), ptr::null(), &mut buf, &mut err);
    assert_eq!(code, 3);
    let (kind, message) = take_error(&mut err);
    assert_eq!(kind, 3);
    assert!(message.contains("not initialized"));

    // Init is idempotent.
    assert_eq!(flg_init(&mut err), 0);
    assert_eq!(flg_init(&mut err), 0);

    // Transparent relay of a trivial expression.
    let mut buf = empty_buf();
    assert_eq!(flg_eval(add.as_ptr(), ptr::null(), &mut buf, &mut err), 0);
    assert_eq!(buf_json(&buf), serde_json::json!([3]));
    flg_buf_free(&mut buf);
    assert!(buf.data.is_null());
    assert_eq!(buf.len, 0);

    // Definitions and calls, with and without arguments.
    let triple = CString::new("def triple: . * 3;").unwrap();
    assert_eq!(flg_define(triple.as_ptr(), &mut err), 0);
    let name = CString::new("triple").unwrap();
    let input = CString::new("7").unwrap();
    let mut buf = empty_buf();
    assert_eq!(
        flg_call(name.as_ptr(), ptr::null(), input.as_ptr(), &mut buf, &mut err),
        0
    );
    assert_eq!(buf_json(&buf), serde_json::json!([21]));
    flg_buf_free(&mut buf);

    let add_def = CString::new("def add(n): . + n;").unwrap();
    assert_eq!(flg_define(add_def.as_ptr(), &mut err), 0);
    let name = CString::new("add").unwrap();
    let args = CString::new("[5]").unwrap();
    let input = CString::new("10").unwrap();
    let mut buf = empty_buf();
    assert_eq!(
        flg_call(name.as_ptr(), args.as_ptr(), input.as_ptr(), &mut buf, &mut err),
        0
    );
    assert_eq!(buf_json(&buf), serde_json::json!([15]));
    flg_buf_free(&mut buf);

    // Invalid expression surfaces the Usage code and an error struct.
    let broken = CString::new(".[(").unwrap();
    let mut buf = empty_buf();
    let code = flg_eval(broken.as_ptr(), ptr::null(), &mut buf, &mut err);
    assert_eq!(code, 2);
    let (kind, _message) = take_error(&mut err);
    assert_eq!(kind, 2);

    // Reset drops definitions.
    assert_eq!(flg_reset(&mut err), 0);
    let name = CString::new("triple").unwrap();
    let mut buf = empty_buf();
    let code = flg_call(name.as_ptr(), ptr::null(), ptr::null(), &mut buf, &mut err);
    assert_eq!(code, 2);
    let (kind, _message) = take_error(&mut err);
    assert_eq!(kind, 2);

    // Shutdown is idempotent and disables evaluation.
    assert_eq!(flg_shutdown(&mut err), 0);
    assert_eq!(flg_shutdown(&mut err), 0);
    let mut buf = empty_buf();
    let code = flg_eval(add.as_ptr(), ptr::null(), &mut buf, &mut err);
    assert_eq!(code, 3);
    let (kind, _message) = take_error(&mut err);
    assert_eq!(kind, 3);
}

#[test]
fn null_arguments_are_usage_errors_not_crashes() {
    let mut err: *mut flg_error = ptr::null_mut();
    let mut buf = empty_buf();
    let code = flg_eval(ptr::null(), ptr::null(), &mut buf, &mut err);
    assert_eq!(code, 2);
    let (kind, message) = take_error(&mut err);
    assert_eq!(kind, 2);
    assert!(message.contains("null"));

    let code = flg_define(ptr::null(), &mut err);
    assert_eq!(code, 2);
    let (kind, _message) = take_error(&mut err);
    assert_eq!(kind, 2);
}
