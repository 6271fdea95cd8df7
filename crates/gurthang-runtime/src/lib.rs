//! The Connection Table, Chunk Worker, and Controller (spec §4.2-§4.4), plus
//! the environment-driven configuration and logging surface shared by
//! everything that embeds this crate: the preload shim and, indirectly
//! through its own config module, the mutator.

pub mod config;
pub mod conntable;
pub mod controller;
pub mod error;
pub mod logging;
pub mod worker;

pub use config::RuntimeConfig;
pub use conntable::{AcquireRole, Acquired, ConnStatus, ConnTable};
pub use controller::EXIT_FATAL;
pub use error::FatalError;
pub use worker::{run_chunk_worker, ChunkWork, PayloadSource};
