//! Structure-aware mutation strategies and the Mutator Coordinator (spec
//! §4.6, §4.7), exported as `extern "C"` hooks a grey-box fuzzer's
//! custom-mutator API `dlopen`s (spec §6.5) — the same boundary shape as a
//! `pyo3`-style `cdylib` export, minus any foreign runtime: a thin `extern
//! "C"` shim over a pure-Rust [`Coordinator`] that is itself unit-tested
//! without going anywhere near the FFI boundary.

pub mod config;
pub mod coordinator;
pub mod dict;
pub mod havoc;
pub mod strategies;

pub use coordinator::Coordinator;

use std::ffi::{c_char, c_int, c_void, CString};
use std::slice;

struct Handle {
    coordinator: Coordinator,
    last_output: Vec<u8>,
    last_describe: CString,
}

/// # Safety
/// `seed` is whatever the host fuzzer supplies for reproducibility; every
/// other hook requires a non-null `handle` returned by this function.
#[no_mangle]
pub unsafe extern "C" fn gurthang_mutator_init(seed: u64) -> *mut c_void {
    let config = match config::MutatorConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("gurthang-mutator: invalid configuration: {e}");
            return std::ptr::null_mut();
        }
    };

    gurthang_runtime::logging::init(config.log_sink.as_ref(), config.debug);

    let dictionaries = match dict::load_all(&config.dict_paths) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("gurthang-mutator: failed to load dictionaries: {e}");
            return std::ptr::null_mut();
        }
    };

    let handle = Box::new(Handle {
        coordinator: Coordinator::new(config, dictionaries, seed),
        last_output: Vec::new(),
        last_describe: CString::default(),
    });
    Box::into_raw(handle) as *mut c_void
}

/// # Safety
/// `handle` must be a pointer returned by [`gurthang_mutator_init`] and not
/// already deinitialized.
#[no_mangle]
pub unsafe extern "C" fn gurthang_mutator_deinit(handle: *mut c_void) {
    if !handle.is_null() {
        drop(Box::from_raw(handle as *mut Handle));
    }
}

unsafe fn handle<'a>(ptr: *mut c_void) -> &'a mut Handle {
    &mut *(ptr as *mut Handle)
}

/// # Safety
/// `data` must point to `len` readable bytes; `handle` must be live.
#[no_mangle]
pub unsafe extern "C" fn gurthang_mutator_judge(handle_ptr: *mut c_void, data: *const u8, len: usize) -> c_int {
    let h = handle(handle_ptr);
    let input = slice::from_raw_parts(data, len);
    h.coordinator.judge(input) as c_int
}

/// # Safety
/// Same contract as [`gurthang_mutator_judge`].
#[no_mangle]
pub unsafe extern "C" fn gurthang_mutator_fuzz_budget(
    handle_ptr: *mut c_void,
    data: *const u8,
    len: usize,
    previous: u32,
) -> u32 {
    let h = handle(handle_ptr);
    let input = slice::from_raw_parts(data, len);
    h.coordinator.fuzz_budget(previous, input)
}

/// # Safety
/// `data` must point to `len` readable bytes; `out_len` must be writable.
/// The returned pointer is owned by `handle` and remains valid only until
/// the next call through this handle.
#[no_mangle]
pub unsafe extern "C" fn gurthang_mutator_fuzz(
    handle_ptr: *mut c_void,
    data: *const u8,
    len: usize,
    max_size: usize,
    out_len: *mut usize,
) -> *const u8 {
    let h = handle(handle_ptr);
    let input = slice::from_raw_parts(data, len);
    h.last_output = h.coordinator.fuzz(input, Some(max_size));
    *out_len = h.last_output.len();
    h.last_output.as_ptr()
}

/// # Safety
/// Same contract as [`gurthang_mutator_fuzz`].
#[no_mangle]
pub unsafe extern "C" fn gurthang_mutator_havoc(
    handle_ptr: *mut c_void,
    data: *const u8,
    len: usize,
    max_size: usize,
    out_len: *mut usize,
) -> *const u8 {
    let h = handle(handle_ptr);
    let input = slice::from_raw_parts(data, len);
    h.last_output = h.coordinator.havoc(input, Some(max_size));
    *out_len = h.last_output.len();
    h.last_output.as_ptr()
}

/// # Safety
/// `handle` must be live.
#[no_mangle]
pub unsafe extern "C" fn gurthang_mutator_havoc_probability(handle_ptr: *mut c_void) -> u32 {
    handle(handle_ptr).coordinator.havoc_probability()
}

/// # Safety
/// `handle` must be live. The returned pointer is owned by `handle` and
/// remains valid only until the next call through this handle.
#[no_mangle]
pub unsafe extern "C" fn gurthang_mutator_describe(handle_ptr: *mut c_void) -> *const c_char {
    let h = handle(handle_ptr);
    h.last_describe = CString::new(h.coordinator.describe()).unwrap_or_default();
    h.last_describe.as_ptr()
}

/// # Safety
/// `data` must point to `len` readable bytes; `handle` must be live.
#[no_mangle]
pub unsafe extern "C" fn gurthang_mutator_trim_init(
    handle_ptr: *mut c_void,
    data: *const u8,
    len: usize,
) -> usize {
    let h = handle(handle_ptr);
    let input = slice::from_raw_parts(data, len);
    h.coordinator.trim_init(input)
}

/// # Safety
/// `handle` must be live and `gurthang_mutator_trim_init` must have run
/// first. The returned pointer is owned by `handle`.
#[no_mangle]
pub unsafe extern "C" fn gurthang_mutator_trim_step(handle_ptr: *mut c_void, out_len: *mut usize) -> *const u8 {
    let h = handle(handle_ptr);
    h.last_output = h.coordinator.trim_step();
    *out_len = h.last_output.len();
    h.last_output.as_ptr()
}

/// # Safety
/// `handle` must be live.
#[no_mangle]
pub unsafe extern "C" fn gurthang_mutator_trim_post_step(handle_ptr: *mut c_void, success: c_int) -> usize {
    handle(handle_ptr).coordinator.trim_post_step(success != 0)
}
