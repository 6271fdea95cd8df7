//! Closed taxonomy of recoverable parse errors (spec §4.1).
//!
//! Every decode primitive in this crate returns one of these variants on
//! malformed input. None of them panics and none of them performs I/O beyond
//! what the caller handed it — a `ParseError` is always recoverable by the
//! caller (reject the input, synthesize a replacement, etc.).

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unexpected end of input")]
    Eof,

    #[error("bad magic bytes")]
    BadMagic,

    #[error("unsupported version {0}, only 0 is accepted")]
    BadVersion(u32),

    #[error("num_conns {0} out of range [1, {})", crate::MAX_NUM_CONNS)]
    BadNumConns(u32),

    #[error("num_chunks {0} out of range [1, {})", crate::MAX_NUM_CHUNKS)]
    BadNumChunks(u32),

    #[error("conn_id {conn_id} out of range [0, {num_conns})")]
    BadConnId { conn_id: u32, num_conns: u32 },

    #[error("data_len {0} would overflow the running payload offset")]
    BadConnLen(u64),

    /// Reserved for a future ordering constraint on `schedule`. The wire
    /// format's error taxonomy names this variant but spec §3.2's I3 leaves
    /// schedule values otherwise unconstrained, so no decode path currently
    /// constructs it; see DESIGN.md.
    #[error("schedule value rejected")]
    BadSched,

    #[error("reserved flag bits set: {0:#x}")]
    BadFlags(u32),

    #[error("declared data_len exceeds the bytes actually present")]
    ConnLenMismatch,
}
