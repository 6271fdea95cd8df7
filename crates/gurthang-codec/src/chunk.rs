//! CoMux chunk records (spec §3.1, §3.3).
//!
//! Wire layout of a chunk header, 20 bytes, little-endian, immediately
//! followed by `data_len` payload bytes:
//!
//! ```text
//! conn_id[4]  data_len[8]  schedule[4]  flags[4]
//! ```

use std::io::{self, Read, Write};

use bytes::Bytes;
use static_assertions::const_assert_eq;

use crate::error::ParseError;
use crate::header::read_exact_or_eof;
use crate::MAX_PAYLOAD;

pub const CHUNK_HEADER_LEN: usize = 20;

const_assert_eq!(CHUNK_HEADER_LEN, 4 + 8 + 4 + 4);

/// Recognized flag bits (spec §3.1). All other bits are reserved.
pub struct ChunkFlags;

impl ChunkFlags {
    pub const AWAIT_RESPONSE: u32 = 0x1;
    pub const NO_SHUTDOWN: u32 = 0x2;
    pub const KNOWN_MASK: u32 = Self::AWAIT_RESPONSE | Self::NO_SHUTDOWN;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub conn_id: u32,
    pub data_len: u64,
    pub schedule: u32,
    pub flags: u32,
}

impl ChunkHeader {
    pub fn await_response(&self) -> bool {
        self.flags & ChunkFlags::AWAIT_RESPONSE != 0
    }

    pub fn no_shutdown(&self) -> bool {
        self.flags & ChunkFlags::NO_SHUTDOWN != 0
    }
}

fn validate_flags(flags: u32) -> Result<(), ParseError> {
    if flags & !ChunkFlags::KNOWN_MASK != 0 {
        return Err(ParseError::BadFlags(flags));
    }
    Ok(())
}

/// A fully materialized chunk: header, owned payload, and the absolute file
/// offset of the payload region (spec §3.3). `file_offset` is meaningful
/// only for manifests decoded from a seekable/positional source; it is
/// always recomputed on decode and never trusted across a re-encode (see
/// SPEC_FULL.md §9, the offset-recomputation open question).
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedChunk {
    pub header: ChunkHeader,
    pub data: Bytes,
    pub file_offset: u64,
}

pub fn encode_chunk_header_to_slice(header: &ChunkHeader, buf: &mut [u8]) -> isize {
    if buf.len() < CHUNK_HEADER_LEN {
        return -(CHUNK_HEADER_LEN as isize);
    }
    buf[0..4].copy_from_slice(&header.conn_id.to_le_bytes());
    buf[4..12].copy_from_slice(&header.data_len.to_le_bytes());
    buf[12..16].copy_from_slice(&header.schedule.to_le_bytes());
    buf[16..20].copy_from_slice(&header.flags.to_le_bytes());
    CHUNK_HEADER_LEN as isize
}

pub fn encode_chunk_header_to_writer<W: Write>(
    header: &ChunkHeader,
    w: &mut W,
) -> io::Result<usize> {
    let mut buf = [0u8; CHUNK_HEADER_LEN];
    encode_chunk_header_to_slice(header, &mut buf);
    w.write_all(&buf)?;
    Ok(CHUNK_HEADER_LEN)
}

pub fn decode_chunk_header<R: Read>(source: &mut R) -> Result<ChunkHeader, ParseError> {
    let mut buf = [0u8; CHUNK_HEADER_LEN];
    read_exact_or_eof(source, &mut buf)?;

    let conn_id = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    let data_len = u64::from_le_bytes(buf[4..12].try_into().unwrap());
    let schedule = u32::from_le_bytes(buf[12..16].try_into().unwrap());
    let flags = u32::from_le_bytes(buf[16..20].try_into().unwrap());
    validate_flags(flags)?;

    Ok(ChunkHeader {
        conn_id,
        data_len,
        schedule,
        flags,
    })
}

/// Encode the payload bytes as-is. `data.len()` is always `<= MAX_PAYLOAD`
/// for a chunk that was itself decoded through this crate, but this function
/// does not re-enforce that — callers constructing chunks by hand are
/// responsible for respecting the cap before encoding.
pub fn encode_chunk_data_to_slice(data: &[u8], buf: &mut [u8]) -> isize {
    if buf.len() < data.len() {
        return -(data.len() as isize);
    }
    buf[..data.len()].copy_from_slice(data);
    data.len() as isize
}

pub fn encode_chunk_data_to_writer<W: Write>(data: &[u8], w: &mut W) -> io::Result<usize> {
    w.write_all(data)?;
    Ok(data.len())
}

/// Read the payload belonging to `header`, capped at `MAX_PAYLOAD` bytes
/// (spec §3.1). When `data_len` exceeds the cap, the remaining declared
/// bytes are still consumed from `source` (and discarded) so the stream
/// position lands correctly on the next record; a short read anywhere in
/// that region is `ConnLenMismatch`, not `Eof`.
pub fn decode_chunk_data<R: Read>(header: &ChunkHeader, source: &mut R) -> Result<Bytes, ParseError> {
    let captured_len = header.data_len.min(MAX_PAYLOAD as u64) as usize;
    let mut buf = vec![0u8; captured_len];
    read_exact_mismatch(source, &mut buf)?;

    let overflow = header.data_len - captured_len as u64;
    discard_bytes(source, overflow)?;

    Ok(Bytes::from(buf))
}

/// Skip a chunk's payload without materializing it — the Controller's lean
/// header-scan path (spec §4.4 step 2) uses this instead of
/// `decode_chunk_data` so it never buffers bytes it doesn't need yet.
pub fn skip_chunk_payload<R: Read>(data_len: u64, source: &mut R) -> Result<(), ParseError> {
    discard_bytes(source, data_len)
}

fn read_exact_mismatch<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<(), ParseError> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => return Err(ParseError::ConnLenMismatch),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => return Err(ParseError::ConnLenMismatch),
        }
    }
    Ok(())
}

fn discard_bytes<R: Read>(source: &mut R, mut remaining: u64) -> Result<(), ParseError> {
    let mut scratch = [0u8; 4096];
    while remaining > 0 {
        let want = remaining.min(scratch.len() as u64) as usize;
        match source.read(&mut scratch[..want]) {
            Ok(0) => return Err(ParseError::ConnLenMismatch),
            Ok(n) => remaining -= n as u64,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => return Err(ParseError::ConnLenMismatch),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn header(conn_id: u32, data_len: u64, schedule: u32, flags: u32) -> ChunkHeader {
        ChunkHeader {
            conn_id,
            data_len,
            schedule,
            flags,
        }
    }

    #[test]
    fn chunk_header_round_trip() {
        let h = header(3, 11, 7, ChunkFlags::AWAIT_RESPONSE);
        let mut buf = [0u8; CHUNK_HEADER_LEN];
        encode_chunk_header_to_slice(&h, &mut buf);
        let decoded = decode_chunk_header(&mut Cursor::new(&buf[..])).unwrap();
        assert_eq!(decoded, h);
        assert!(decoded.await_response());
        assert!(!decoded.no_shutdown());
    }

    #[test]
    fn rejects_reserved_flag_bits() {
        let h = header(0, 0, 0, 0x4);
        let mut buf = [0u8; CHUNK_HEADER_LEN];
        encode_chunk_header_to_slice(&h, &mut buf);
        assert_eq!(
            decode_chunk_header(&mut Cursor::new(&buf[..])),
            Err(ParseError::BadFlags(0x4))
        );
    }

    #[test]
    fn decode_chunk_data_reads_exact_payload() {
        let h = header(0, 4, 0, 0);
        let mut source = Cursor::new(b"PING".to_vec());
        let data = decode_chunk_data(&h, &mut source).unwrap();
        assert_eq!(&data[..], b"PING");
    }

    #[test]
    fn decode_chunk_data_caps_at_max_payload_but_still_consumes_declared_bytes() {
        let declared = (MAX_PAYLOAD + 10) as u64;
        let h = header(0, declared, 0, 0);
        let mut bytes = vec![0xABu8; MAX_PAYLOAD];
        bytes.extend_from_slice(&[0xCDu8; 10]);
        bytes.extend_from_slice(b"NEXT"); // bytes belonging to the following record
        let mut source = Cursor::new(bytes);

        let data = decode_chunk_data(&h, &mut source).unwrap();
        assert_eq!(data.len(), MAX_PAYLOAD);
        assert!(data.iter().all(|&b| b == 0xAB));

        let mut rest = Vec::new();
        source.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"NEXT");
    }

    #[test]
    fn short_payload_is_conn_len_mismatch() {
        let h = header(0, 10, 0, 0);
        let mut source = Cursor::new(b"abc".to_vec());
        assert_eq!(
            decode_chunk_data(&h, &mut source),
            Err(ParseError::ConnLenMismatch)
        );
    }
}
