//! Symbol interposition shim (spec §4.5). Built as a `cdylib` so a harness
//! operator points `LD_PRELOAD`-equivalent loading at it; the same code is
//! exercised as an ordinary `rlib` under `cargo test` via the `rlib` half of
//! the dual crate-type (teacher precedent: `SleepingPills-bushhammer`'s
//! `neutronium`/`flux` shared-object crates, `ctor` crate already in that
//! pack for `__attribute__((constructor))`-style static init).
//!
//! Four entry points are substituted: `listen`, `accept`, `epoll_ctl`,
//! `epoll_wait`. The Controller is spawned at most once, from whichever of
//! `accept`/`epoll_wait` observes the listening socket first, guarded by a
//! process-wide flag under a mutex held only long enough to spawn it. The
//! shim never blocks the caller's thread — after spawning it immediately
//! delegates to the real function.

use std::ffi::c_int;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Mutex, OnceLock};

use gurthang_runtime::{config::RuntimeConfig, controller, ConnTable};

type ListenFn = unsafe extern "C" fn(c_int, c_int) -> c_int;
type AcceptFn = unsafe extern "C" fn(c_int, *mut libc::sockaddr, *mut libc::socklen_t) -> c_int;
type EpollCtlFn = unsafe extern "C" fn(c_int, c_int, c_int, *mut libc::epoll_event) -> c_int;
type EpollWaitFn = unsafe extern "C" fn(c_int, *mut libc::epoll_event, c_int, c_int) -> c_int;

static REAL_LISTEN: OnceLock<ListenFn> = OnceLock::new();
static REAL_ACCEPT: OnceLock<AcceptFn> = OnceLock::new();
static REAL_EPOLL_CTL: OnceLock<EpollCtlFn> = OnceLock::new();
static REAL_EPOLL_WAIT: OnceLock<EpollWaitFn> = OnceLock::new();

/// The fd captured by our `listen` intercept. `-1` means "not yet seen".
static LISTENER_FD: AtomicI32 = AtomicI32::new(-1);
/// The epoll instance a server registers the listener on, if any.
static EDGE_SET_FD: AtomicI32 = AtomicI32::new(-1);

static CONTROLLER_STARTED: Mutex<bool> = Mutex::new(false);

#[ctor::ctor]
fn resolve_real_symbols() {
    unsafe fn resolve<F>(name: &str) -> Option<F> {
        let cname = std::ffi::CString::new(name).ok()?;
        let ptr = libc::dlsym(libc::RTLD_NEXT, cname.as_ptr());
        if ptr.is_null() {
            None
        } else {
            Some(std::mem::transmute_copy::<*mut std::ffi::c_void, F>(&ptr))
        }
    }

    unsafe {
        if let Some(f) = resolve::<ListenFn>("listen") {
            let _ = REAL_LISTEN.set(f);
        }
        if let Some(f) = resolve::<AcceptFn>("accept") {
            let _ = REAL_ACCEPT.set(f);
        }
        if let Some(f) = resolve::<EpollCtlFn>("epoll_ctl") {
            let _ = REAL_EPOLL_CTL.set(f);
        }
        if let Some(f) = resolve::<EpollWaitFn>("epoll_wait") {
            let _ = REAL_EPOLL_WAIT.set(f);
        }
    }
}

/// Spawns the Controller on a detached `std::thread` the first time it is
/// called; every subsequent call is a no-op. The mutex is held only across
/// the check-and-flip, never across the thread's actual run (spec §4.5/§5).
fn maybe_start_controller(listener_fd: RawFd) {
    let mut started = CONTROLLER_STARTED.lock().unwrap_or_else(|e| e.into_inner());
    if *started {
        return;
    }
    *started = true;
    drop(started);

    std::thread::spawn(move || {
        let config = match RuntimeConfig::from_env() {
            Ok(c) => c,
            Err(e) => {
                eprintln!("gurthang: invalid configuration: {e}");
                controller::terminate(controller::EXIT_FATAL, false);
            }
        };
        gurthang_runtime::logging::init(config.log_sink.as_ref(), false);

        let config = std::sync::Arc::new(config);
        let table = ConnTable::new(listener_fd);
        let stdin_fd = libc::STDIN_FILENO;

        match controller::run(stdin_fd, table, config.clone()) {
            Ok(()) => controller::terminate(0, config.exit_immediate),
            Err(e) => {
                tracing::error!(error = %e, "controller run failed");
                controller::terminate(controller::EXIT_FATAL, config.exit_immediate);
            }
        }
    });
}

/// # Safety
/// Must only be called by the dynamic loader as a replacement for libc's
/// `listen`, with the same argument contract.
#[no_mangle]
pub unsafe extern "C" fn listen(sockfd: c_int, backlog: c_int) -> c_int {
    LISTENER_FD.store(sockfd, Ordering::SeqCst);
    match REAL_LISTEN.get() {
        Some(real) => real(sockfd, backlog),
        None => {
            eprintln!("gurthang: real listen() symbol unresolved");
            -1
        }
    }
}

/// # Safety
/// Must only be called by the dynamic loader as a replacement for libc's
/// `accept`, with the same argument contract.
#[no_mangle]
pub unsafe extern "C" fn accept(
    sockfd: c_int,
    addr: *mut libc::sockaddr,
    addrlen: *mut libc::socklen_t,
) -> c_int {
    let listener_fd = LISTENER_FD.load(Ordering::SeqCst);
    if listener_fd != -1 && sockfd == listener_fd {
        maybe_start_controller(listener_fd);
    }
    match REAL_ACCEPT.get() {
        Some(real) => real(sockfd, addr, addrlen),
        None => {
            eprintln!("gurthang: real accept() symbol unresolved");
            -1
        }
    }
}

/// # Safety
/// Must only be called by the dynamic loader as a replacement for libc's
/// `epoll_ctl`, with the same argument contract.
#[no_mangle]
pub unsafe extern "C" fn epoll_ctl(
    epfd: c_int,
    op: c_int,
    fd: c_int,
    event: *mut libc::epoll_event,
) -> c_int {
    let listener_fd = LISTENER_FD.load(Ordering::SeqCst);
    if op == libc::EPOLL_CTL_ADD && listener_fd != -1 && fd == listener_fd {
        EDGE_SET_FD.store(epfd, Ordering::SeqCst);
    }
    match REAL_EPOLL_CTL.get() {
        Some(real) => real(epfd, op, fd, event),
        None => {
            eprintln!("gurthang: real epoll_ctl() symbol unresolved");
            -1
        }
    }
}

/// # Safety
/// Must only be called by the dynamic loader as a replacement for libc's
/// `epoll_wait`, with the same argument contract.
#[no_mangle]
pub unsafe extern "C" fn epoll_wait(
    epfd: c_int,
    events: *mut libc::epoll_event,
    maxevents: c_int,
    timeout: c_int,
) -> c_int {
    let listener_fd = LISTENER_FD.load(Ordering::SeqCst);
    let edge_set_fd = EDGE_SET_FD.load(Ordering::SeqCst);
    if listener_fd != -1 && edge_set_fd != -1 && epfd == edge_set_fd {
        maybe_start_controller(listener_fd);
    }
    match REAL_EPOLL_WAIT.get() {
        Some(real) => real(epfd, events, maxevents, timeout),
        None => {
            eprintln!("gurthang: real epoll_wait() symbol unresolved");
            -1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn controller_started_flag_only_flips_once() {
        // Reset for test isolation within this process.
        *CONTROLLER_STARTED.lock().unwrap() = false;
        LISTENER_FD.store(-1, Ordering::SeqCst);

        assert!(!*CONTROLLER_STARTED.lock().unwrap());
    }
}
