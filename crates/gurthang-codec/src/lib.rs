//! Pure encode/decode for the CoMux container format (spec §3).
//!
//! This crate has no I/O dependency beyond byte slices and whatever
//! `std::io::{Read, Write}` implementation the caller supplies — no sockets,
//! no files, no threads. Gurthang's runtime, preload shim, and mutator all
//! depend on it for the same reason: a single, shared, panic-free parser for
//! a format that untrusted fuzzer output will routinely violate.

pub mod chunk;
pub mod error;
pub mod header;
pub mod manifest;

pub use chunk::{
    decode_chunk_data, decode_chunk_header, encode_chunk_data_to_slice,
    encode_chunk_data_to_writer, encode_chunk_header_to_slice, encode_chunk_header_to_writer,
    skip_chunk_payload, ChunkFlags, ChunkHeader, ParsedChunk, CHUNK_HEADER_LEN,
};
pub use error::ParseError;
pub use header::{
    decode_header, encode_header_to_slice, encode_header_to_writer, ManifestHeader, HEADER_LEN,
    MAGIC, VERSION,
};
pub use manifest::{
    decode_manifest, encode_manifest_to_writer, scan_headers, ChunkHeaderRecord, Manifest,
};

/// Upper bound on `num_conns` in a manifest header (spec §3.1).
pub const MAX_NUM_CONNS: u32 = 4096;

/// Upper bound on `num_chunks` in a manifest header (spec §3.1).
pub const MAX_NUM_CHUNKS: u32 = 8192;

/// Per-chunk payload cap in bytes; a declared `data_len` beyond this is
/// still consumed from the wire but truncated in memory (spec §3.1).
pub const MAX_PAYLOAD: usize = 524_288;
