//! Fatal runtime errors (spec §7). Anything in this enum is written as a
//! diagnostic line via `tracing::error!` and then terminates the process
//! with [`crate::EXIT_FATAL`] — there is no recovery path. Recoverable
//! conditions belong to `gurthang_codec::ParseError`, not here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FatalError {
    #[error("failed to decode input: {0}")]
    Decode(#[from] gurthang_codec::ParseError),

    #[error("connection {conn_id} has zero chunks, violating I1")]
    EmptyConnection { conn_id: u32 },

    #[error("failed to query listener address: {0}")]
    ListenerQueryFailed(#[source] std::io::Error),

    #[error("failed to open socket for connection {conn_id}: {source}")]
    SocketCreateFailed {
        conn_id: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect socket for connection {conn_id}: {source}")]
    ConnectFailed {
        conn_id: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected I/O error on connection {conn_id}: {source}")]
    UnexpectedIo {
        conn_id: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write response bytes to standard output: {0}")]
    StdoutWriteFailed(#[source] std::io::Error),

    #[error("failed to read chunk payload at offset {offset}: {source}")]
    PayloadReadFailed {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid runtime configuration: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("the connection table mutex was poisoned")]
    PoisonedTable,
}
