//! Tracing subscriber setup for code embedded into someone else's process
//! (the preload shim, the mutator `cdylib`). `RUST_LOG`-style env-filter
//! verbosity is kept (teacher pattern, `summitd::main`), layered under a
//! sink chosen by the harness's own `LIB_LOG`/`MUT_LOG` variable rather than
//! always writing to stderr — a library loaded into an arbitrary target must
//! not assume it owns the target's stderr.
//!
//! Installation is guarded by `std::sync::Once`: this code runs inside a
//! shared object that may be initialized more than once per process (e.g.
//! `dlopen`ed twice), and `tracing::subscriber::set_global_default` panics
//! on a second call.

use std::fs::OpenOptions;
use std::io;
use std::sync::{Arc, Mutex, Once};

use tracing_subscriber::fmt::MakeWriter;

use crate::config::LogSink;

static INIT: Once = Once::new();

#[derive(Clone)]
enum Sink {
    Stdout,
    Stderr,
    File(Arc<Mutex<std::fs::File>>),
    Disabled,
}

#[derive(Clone)]
struct SinkWriter(Sink);

enum SinkGuard<'a> {
    Stdout(io::Stdout),
    Stderr(io::Stderr),
    File(std::sync::MutexGuard<'a, std::fs::File>),
    Null,
}

impl io::Write for SinkGuard<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            SinkGuard::Stdout(s) => s.write(buf),
            SinkGuard::Stderr(s) => s.write(buf),
            SinkGuard::File(f) => f.write(buf),
            SinkGuard::Null => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            SinkGuard::Stdout(s) => s.flush(),
            SinkGuard::Stderr(s) => s.flush(),
            SinkGuard::File(f) => f.flush(),
            SinkGuard::Null => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for SinkWriter {
    type Writer = SinkGuard<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        match &self.0 {
            Sink::Stdout => SinkGuard::Stdout(io::stdout()),
            Sink::Stderr => SinkGuard::Stderr(io::stderr()),
            Sink::File(f) => SinkGuard::File(f.lock().unwrap_or_else(|e| e.into_inner())),
            Sink::Disabled => SinkGuard::Null,
        }
    }
}

/// Install the global subscriber once, dispatching to the sink described by
/// `sink` (spec §6.4: `1`=stdout, `2`=stderr, a path otherwise). `None`
/// installs a subscriber that discards everything, so call sites in library
/// code never need an `if logging_enabled` branch.
pub fn init(sink: Option<&LogSink>, debug: bool) {
    INIT.call_once(|| {
        let resolved = match sink {
            None => Sink::Disabled,
            Some(LogSink::Stdout) => Sink::Stdout,
            Some(LogSink::Stderr) => Sink::Stderr,
            Some(LogSink::File(path)) => match OpenOptions::new().create(true).append(true).open(path) {
                Ok(f) => Sink::File(Arc::new(Mutex::new(f))),
                Err(e) => {
                    eprintln!("gurthang: failed to open log file {path:?}: {e}, logging disabled");
                    Sink::Disabled
                }
            },
        };

        let filter = if debug {
            tracing_subscriber::EnvFilter::new("debug")
        } else {
            tracing_subscriber::EnvFilter::from_default_env()
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(SinkWriter(resolved))
            .try_init();
    });
}

/// `MUT_DEBUG` without `MUT_LOG` has nowhere to route its extra verbosity;
/// the mutator calls this instead of silently upgrading nothing.
pub fn warn_debug_without_sink() {
    eprintln!("gurthang: MUT_DEBUG set without MUT_LOG, ignoring MUT_DEBUG");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init(Some(&LogSink::Stderr), false);
        init(Some(&LogSink::Stdout), true);
    }
}
