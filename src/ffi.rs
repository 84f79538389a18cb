//! FFI bindings for form telemetry
//!
//! This module exposes the session reducer to hosts that own their own timers and
//! lifecycle (for example a WebView shell). All functions use C strings
//! (null-terminated) and return allocated memory that must be freed by the
//! caller using `fta_free_string`. Timestamps are Unix epoch milliseconds.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;

use chrono::{DateTime, TimeZone, Utc};

use crate::event::Event;
use crate::reducer::{open_session, reduce_session};
use crate::schema::field_names_from_str;
use crate::types::{SessionId, SessionRecord};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn timestamp(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Parse a JSON array of identifiers; NULL means an empty list
unsafe fn parse_id_list(ptr: *const c_char, what: &str) -> Result<Vec<String>, String> {
    if ptr.is_null() {
        return Ok(Vec::new());
    }
    let json = cstr_to_string(ptr).ok_or_else(|| format!("Invalid {what} string pointer"))?;
    serde_json::from_str(&json).map_err(|e| format!("Invalid {what} JSON: {e}"))
}

// ============================================================================
// Session API
// ============================================================================

/// Opaque handle to a session record
pub struct FormSessionHandle {
    record: SessionRecord,
    implicit_section: bool,
}

/// Open a session.
///
/// # Safety
/// - `fields_json` and `sections_json` must be NULL or valid null-terminated C
///   strings holding JSON arrays of strings. An empty section list activates the
///   implicit default section.
/// - Returns a pointer that must be freed with `fta_session_free`.
/// - Returns NULL on error; call `fta_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn fta_session_new(
    fields_json: *const c_char,
    sections_json: *const c_char,
    started_at_ms: i64,
) -> *mut FormSessionHandle {
    clear_last_error();

    let fields = match parse_id_list(fields_json, "fields") {
        Ok(fields) => fields,
        Err(e) => {
            set_last_error(&e);
            return ptr::null_mut();
        }
    };

    let sections = match parse_id_list(sections_json, "sections") {
        Ok(sections) => sections,
        Err(e) => {
            set_last_error(&e);
            return ptr::null_mut();
        }
    };

    let Some(started_at) = timestamp(started_at_ms) else {
        set_last_error("Invalid start timestamp");
        return ptr::null_mut();
    };

    let implicit_section = sections.is_empty();
    let record = open_session(SessionId::new(), fields, sections, started_at);
    Box::into_raw(Box::new(FormSessionHandle {
        record,
        implicit_section,
    }))
}

/// Free a session.
///
/// # Safety
/// - `session` must be a valid pointer returned by `fta_session_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn fta_session_free(session: *mut FormSessionHandle) {
    if !session.is_null() {
        drop(Box::from_raw(session));
    }
}

/// Apply a JSON event (e.g. `{"type":"tabChange","target":"payment"}`).
///
/// A `reset` on a session opened without sections re-activates the default
/// section, as `fta_session_new` does.
///
/// # Safety
/// - `session` must be a valid pointer returned by `fta_session_new`.
/// - `event_json` must be a valid null-terminated C string.
/// - Returns 0 on success, -1 on error; call `fta_last_error` for details.
#[no_mangle]
pub unsafe extern "C" fn fta_session_dispatch(
    session: *mut FormSessionHandle,
    event_json: *const c_char,
    at_ms: i64,
) -> c_int {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }

    let handle = &mut *session;

    let json = match cstr_to_string(event_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid event string pointer");
            return -1;
        }
    };

    let event: Event = match serde_json::from_str(&json) {
        Ok(event) => event,
        Err(e) => {
            set_last_error(&format!("Invalid event JSON: {e}"));
            return -1;
        }
    };

    let Some(at) = timestamp(at_ms) else {
        set_last_error("Invalid event timestamp");
        return -1;
    };

    handle.record = reduce_session(&handle.record, &event, at, handle.implicit_section);
    0
}

/// Serialize the session record as ingestion JSON.
///
/// # Safety
/// - `session` must be a valid pointer returned by `fta_session_new`.
/// - Returns a newly allocated string that must be freed with `fta_free_string`.
/// - Returns NULL on error; call `fta_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn fta_session_snapshot(session: *const FormSessionHandle) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    match (*session).record.to_json() {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Derive field names from a schema document, as a JSON array.
///
/// # Safety
/// - `schema_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `fta_free_string`.
/// - Unresolvable schemas yield `[]`.
#[no_mangle]
pub unsafe extern "C" fn fta_fields_from_schema(schema_json: *const c_char) -> *mut c_char {
    clear_last_error();

    let json = match cstr_to_string(schema_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid schema string pointer");
            return ptr::null_mut();
        }
    };

    match serde_json::to_string(&field_names_from_str(&json)) {
        Ok(names) => string_to_cstr(&names),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by any `fta_*` function.
///
/// # Safety
/// - `s` must be a pointer returned by an `fta_*` function, or NULL.
#[no_mangle]
pub unsafe extern "C" fn fta_free_string(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next `fta_*` call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn fta_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn fta_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
