//! C facade over a single process-wide model.
//!
//! The host drives the model through `initialize` / `update` /
//! `update_until` / `finalize`, reads state through `get_value_ptr`,
//! and pulls failure details from `get_last_error`. Every call returns
//! 0 on success and non-zero on failure. Pointers handed out by
//! `get_value_ptr` alias model-owned buffers and stay valid until
//! `finalize`; the buffers are allocated once at load and never
//! resized.

use std::ffi::{c_char, c_double, c_int, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Mutex;

use crate::io::loader::load_model;
use crate::misc::configuration::Configuration;
use crate::model::Model;

static CONTEXT: Mutex<Option<Model>> = Mutex::new(None);
static LAST_ERROR: Mutex<String> = Mutex::new(String::new());

const OK: c_int = 0;
const FAILURE: c_int = 1;

fn set_error(message: impl Into<String>) -> c_int {
    *LAST_ERROR.lock().unwrap() = message.into();
    FAILURE
}

fn clear_error() {
    LAST_ERROR.lock().unwrap().clear();
}

fn with_model<R>(f: impl FnOnce(&mut Model) -> Result<R, String>) -> Result<R, String> {
    let mut guard = CONTEXT.lock().unwrap();
    match guard.as_mut() {
        Some(model) => f(model),
        None => Err("no model is initialized".to_string()),
    }
}

fn guarded(f: impl FnOnce() -> Result<(), String>) -> c_int {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => {
            clear_error();
            OK
        }
        Ok(Err(message)) => set_error(message),
        Err(_) => set_error("internal panic"),
    }
}

unsafe fn c_string<'a>(ptr: *const c_char) -> Result<&'a str, String> {
    if ptr.is_null() {
        return Err("null string argument".to_string());
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| "string argument is not valid utf-8".to_string())
}

/// Load the model described by a TOML configuration file.
///
/// # Safety
/// `config_path` must be a valid NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn initialize(config_path: *const c_char) -> c_int {
    guarded(|| {
        let path = unsafe { c_string(config_path) }?;
        let configuration = Configuration::from_file(path).map_err(|e| e.to_string())?;
        let config_dir = Path::new(path).parent().unwrap_or(Path::new("."));
        let model = load_model(configuration, config_dir).map_err(|e| e.to_string())?;
        let mut guard = CONTEXT.lock().unwrap();
        if guard.is_some() {
            return Err("a model is already initialized".to_string());
        }
        *guard = Some(model);
        Ok(())
    })
}

/// Advance the model by one save interval.
#[no_mangle]
pub extern "C" fn update() -> c_int {
    guarded(|| {
        with_model(|model| {
            let target = (model.t + model.configuration.saveat).min(model.t_end);
            model.advance_to(target).map_err(|e| e.to_string())
        })
    })
}

/// Advance the model to the given time (seconds since start).
#[no_mangle]
pub extern "C" fn update_until(time: c_double) -> c_int {
    guarded(|| {
        with_model(|model| {
            if time < model.t {
                return Err(format!(
                    "cannot integrate backwards, current time is {}",
                    model.t
                ));
            }
            model.advance_to(time).map_err(|e| e.to_string())
        })
    })
}

/// Write the results and drop the model.
#[no_mangle]
pub extern "C" fn finalize() -> c_int {
    guarded(|| {
        let mut guard = CONTEXT.lock().unwrap();
        match guard.take() {
            Some(model) => model.write_outputs().map_err(|e| e.to_string()),
            None => Err("no model is initialized".to_string()),
        }
    })
}

unsafe fn write_time(out: *mut c_double, value: f64) -> c_int {
    if out.is_null() {
        return set_error("null output pointer");
    }
    unsafe { *out = value };
    clear_error();
    OK
}

/// # Safety
/// `time` must point to writable memory for one f64.
#[no_mangle]
pub unsafe extern "C" fn get_current_time(time: *mut c_double) -> c_int {
    match with_model(|model| Ok(model.t)) {
        Ok(value) => unsafe { write_time(time, value) },
        Err(message) => set_error(message),
    }
}

/// # Safety
/// `time` must point to writable memory for one f64.
#[no_mangle]
pub unsafe extern "C" fn get_start_time(time: *mut c_double) -> c_int {
    match with_model(|_| Ok(0.0)) {
        Ok(value) => unsafe { write_time(time, value) },
        Err(message) => set_error(message),
    }
}

/// # Safety
/// `time` must point to writable memory for one f64.
#[no_mangle]
pub unsafe extern "C" fn get_end_time(time: *mut c_double) -> c_int {
    match with_model(|model| Ok(model.t_end)) {
        Ok(value) => unsafe { write_time(time, value) },
        Err(message) => set_error(message),
    }
}

/// # Safety
/// `time_step` must point to writable memory for one f64.
#[no_mangle]
pub unsafe extern "C" fn get_time_step(time_step: *mut c_double) -> c_int {
    match with_model(|model| Ok(model.configuration.saveat)) {
        Ok(value) => unsafe { write_time(time_step, value) },
        Err(message) => set_error(message),
    }
}

fn known_variable(name: &str) -> bool {
    matches!(name, "basin.storage" | "basin.level" | "flow")
}

/// # Safety
/// `name` must be a valid C string; `dest` must have room for at least
/// 7 bytes.
#[no_mangle]
pub unsafe extern "C" fn get_var_type(name: *const c_char, dest: *mut c_char) -> c_int {
    let var = match unsafe { c_string(name) } {
        Ok(var) => var,
        Err(message) => return set_error(message),
    };
    if !known_variable(var) {
        return set_error(format!("unknown variable '{}'", var));
    }
    if dest.is_null() {
        return set_error("null output pointer");
    }
    let bytes = b"double\0";
    unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr() as *const c_char, dest, bytes.len()) };
    clear_error();
    OK
}

/// # Safety
/// `name` must be a valid C string; `rank` must be writable.
#[no_mangle]
pub unsafe extern "C" fn get_var_rank(name: *const c_char, rank: *mut c_int) -> c_int {
    let var = match unsafe { c_string(name) } {
        Ok(var) => var,
        Err(message) => return set_error(message),
    };
    if !known_variable(var) {
        return set_error(format!("unknown variable '{}'", var));
    }
    if rank.is_null() {
        return set_error("null output pointer");
    }
    unsafe { *rank = 1 };
    clear_error();
    OK
}

/// # Safety
/// `name` must be a valid C string; `shape` must have room for one int.
#[no_mangle]
pub unsafe extern "C" fn get_var_shape(name: *const c_char, shape: *mut c_int) -> c_int {
    let var = match unsafe { c_string(name) } {
        Ok(var) => var.to_string(),
        Err(message) => return set_error(message),
    };
    let length = with_model(|model| {
        Ok(match var.as_str() {
            "basin.storage" | "basin.level" => model.store.basin.len(),
            "flow" => model.graph.flow_count(),
            _ => return Err(format!("unknown variable '{}'", var)),
        })
    });
    match length {
        Ok(length) => {
            if shape.is_null() {
                return set_error("null output pointer");
            }
            unsafe { *shape = length as c_int };
            clear_error();
            OK
        }
        Err(message) => set_error(message),
    }
}

/// Pointer into model-owned storage, refreshed to the current state.
/// Valid until `finalize`.
///
/// # Safety
/// `name` must be a valid C string.
#[no_mangle]
pub unsafe extern "C" fn get_value_ptr(name: *const c_char) -> *mut c_double {
    let var = match unsafe { c_string(name) } {
        Ok(var) => var.to_string(),
        Err(message) => {
            set_error(message);
            return std::ptr::null_mut();
        }
    };
    let pointer = with_model(|model| {
        model.flows();
        Ok(match var.as_str() {
            "basin.storage" => model.caches.real.storage.as_mut_ptr(),
            "basin.level" => model.caches.real.level.as_mut_ptr(),
            "flow" => model.caches.real.flow.as_mut_ptr(),
            _ => return Err(format!("unknown variable '{}'", var)),
        })
    });
    match pointer {
        Ok(pointer) => {
            clear_error();
            pointer
        }
        Err(message) => {
            set_error(message);
            std::ptr::null_mut()
        }
    }
}

/// Copy the last error message into the caller's buffer.
///
/// # Safety
/// `buffer` must have room for `capacity` bytes.
#[no_mangle]
pub unsafe extern "C" fn get_last_error(buffer: *mut c_char, capacity: c_int) -> c_int {
    if buffer.is_null() || capacity <= 0 {
        return FAILURE;
    }
    let message = LAST_ERROR.lock().unwrap();
    let bytes = message.as_bytes();
    let n = bytes.len().min(capacity as usize - 1);
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr() as *const c_char, buffer, n);
        *buffer.add(n) = 0;
    }
    OK
}

/// Load, run to completion, write results and tear down: the one-call
/// equivalent of the CLI.
///
/// # Safety
/// `config_path` must be a valid NUL-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn execute(config_path: *const c_char) -> c_int {
    let status = unsafe { initialize(config_path) };
    if status != OK {
        return status;
    }
    let status = guarded(|| {
        with_model(|model| model.run().map_err(|e| e.to_string()))
    });
    if status != OK {
        // Still tear down, keeping the run error as the last error
        let mut guard = CONTEXT.lock().unwrap();
        if let Some(model) = guard.take() {
            let _ = model.write_outputs();
        }
        return status;
    }
    finalize()
}
