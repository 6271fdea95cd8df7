//! CoMux container header (spec §3.1).
//!
//! Wire layout, 20 bytes, little-endian:
//!
//! ```text
//! magic[8]  version[4]  num_conns[4]  num_chunks[4]
//! ```

use std::io::{self, Read, Write};

use static_assertions::const_assert_eq;

use crate::error::ParseError;
use crate::{MAX_NUM_CHUNKS, MAX_NUM_CONNS};

pub const MAGIC: [u8; 8] = *b"comux!!!";
pub const VERSION: u32 = 0;
pub const HEADER_LEN: usize = 20;

const_assert_eq!(HEADER_LEN, 8 + 4 + 4 + 4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestHeader {
    pub version: u32,
    pub num_conns: u32,
    pub num_chunks: u32,
}

impl ManifestHeader {
    pub fn new(num_conns: u32, num_chunks: u32) -> Result<Self, ParseError> {
        validate_num_conns(num_conns)?;
        validate_num_chunks(num_chunks)?;
        Ok(Self {
            version: VERSION,
            num_conns,
            num_chunks,
        })
    }
}

fn validate_num_conns(num_conns: u32) -> Result<(), ParseError> {
    if num_conns == 0 || num_conns > MAX_NUM_CONNS {
        return Err(ParseError::BadNumConns(num_conns));
    }
    Ok(())
}

fn validate_num_chunks(num_chunks: u32) -> Result<(), ParseError> {
    if num_chunks == 0 || num_chunks > MAX_NUM_CHUNKS {
        return Err(ParseError::BadNumChunks(num_chunks));
    }
    Ok(())
}

/// Encode into a byte slice. Returns the number of bytes written on success,
/// or `-(needed as isize)` when `buf` is too small (spec §4.1, §8.1 P2).
pub fn encode_header_to_slice(header: &ManifestHeader, buf: &mut [u8]) -> isize {
    if buf.len() < HEADER_LEN {
        return -(HEADER_LEN as isize);
    }
    buf[0..8].copy_from_slice(&MAGIC);
    buf[8..12].copy_from_slice(&header.version.to_le_bytes());
    buf[12..16].copy_from_slice(&header.num_conns.to_le_bytes());
    buf[16..20].copy_from_slice(&header.num_chunks.to_le_bytes());
    HEADER_LEN as isize
}

/// Encode to any `Write`, retrying on short writes (spec §4.1).
/// I/O failure here is the caller's fatal error to raise, not a `ParseError`.
pub fn encode_header_to_writer<W: Write>(header: &ManifestHeader, w: &mut W) -> io::Result<usize> {
    let mut buf = [0u8; HEADER_LEN];
    encode_header_to_slice(header, &mut buf);
    w.write_all(&buf)?;
    Ok(HEADER_LEN)
}

pub fn decode_header<R: Read>(source: &mut R) -> Result<ManifestHeader, ParseError> {
    let mut buf = [0u8; HEADER_LEN];
    read_exact_or_eof(source, &mut buf)?;

    if buf[0..8] != MAGIC {
        return Err(ParseError::BadMagic);
    }
    let version = u32::from_le_bytes(buf[8..12].try_into().unwrap());
    if version != VERSION {
        return Err(ParseError::BadVersion(version));
    }
    let num_conns = u32::from_le_bytes(buf[12..16].try_into().unwrap());
    validate_num_conns(num_conns)?;
    let num_chunks = u32::from_le_bytes(buf[16..20].try_into().unwrap());
    validate_num_chunks(num_chunks)?;

    Ok(ManifestHeader {
        version,
        num_conns,
        num_chunks,
    })
}

/// `Read::read_exact` but a short read becomes `ParseError::Eof` rather than
/// an `io::Error`, since header truncation is a recoverable parse outcome.
pub(crate) fn read_exact_or_eof<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<(), ParseError> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => return Err(ParseError::Eof),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => return Err(ParseError::Eof),
        }
    }
    Ok(())
}
