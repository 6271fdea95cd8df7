//! Whole-container decode/encode (spec §3.1, §3.3, §4.4).
//!
//! Two entry points over the chunk stream:
//!
//! - [`decode_manifest`] — eager, materializes every chunk's payload. What a
//!   mutator or a test harness wants: the whole thing in memory.
//! - [`scan_headers`] — lean, yields chunk headers and file offsets without
//!   buffering payload bytes. What the Controller's validation pass wants
//!   before it commits to dispatching anything (spec §4.4 step 2).

use std::io::Read;

use crate::chunk::{
    decode_chunk_data, decode_chunk_header, encode_chunk_data_to_writer,
    encode_chunk_header_to_writer, skip_chunk_payload, ChunkHeader, ParsedChunk,
};
use crate::error::ParseError;
use crate::header::{decode_header, encode_header_to_writer, ManifestHeader};

#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub header: ManifestHeader,
    pub chunks: Vec<ParsedChunk>,
}

/// A chunk header plus the file offset of its payload, without the payload
/// itself. Produced by [`scan_headers`].
#[derive(Debug, Clone, Copy)]
pub struct ChunkHeaderRecord {
    pub header: ChunkHeader,
    pub file_offset: u64,
}

/// Tracks cumulative bytes consumed from an underlying [`Read`] without
/// relying on `Seek` — the input may be a non-seekable pipe when only a
/// header scan is needed.
struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R: Read> CountingReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, count: 0 }
    }

    fn position(&self) -> u64 {
        self.count
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

/// Decode the full container, materializing every chunk's payload in
/// memory. Chunks are returned in file order (the order they appear on the
/// wire), not schedule order — ordering by `schedule` is the Controller's
/// job (spec §4.4), not the codec's.
pub fn decode_manifest<R: Read>(source: R) -> Result<Manifest, ParseError> {
    let mut reader = CountingReader::new(source);
    let header = decode_header(&mut reader)?;

    let mut chunks = Vec::with_capacity(header.num_chunks as usize);
    for _ in 0..header.num_chunks {
        let chunk_header = decode_chunk_header(&mut reader)?;
        if chunk_header.conn_id >= header.num_conns {
            return Err(ParseError::BadConnId {
                conn_id: chunk_header.conn_id,
                num_conns: header.num_conns,
            });
        }
        let file_offset = reader.position();
        let data = decode_chunk_data(&chunk_header, &mut reader)?;
        chunks.push(ParsedChunk {
            header: chunk_header,
            data,
            file_offset,
        });
    }

    Ok(Manifest { header, chunks })
}

/// Walk the container's headers only, skipping payload bytes without
/// buffering them. Returns the manifest header plus one [`ChunkHeaderRecord`]
/// per chunk, in file order.
pub fn scan_headers<R: Read>(
    source: R,
) -> Result<(ManifestHeader, Vec<ChunkHeaderRecord>), ParseError> {
    let mut reader = CountingReader::new(source);
    let header = decode_header(&mut reader)?;

    let mut records = Vec::with_capacity(header.num_chunks as usize);
    for _ in 0..header.num_chunks {
        let chunk_header = decode_chunk_header(&mut reader)?;
        if chunk_header.conn_id >= header.num_conns {
            return Err(ParseError::BadConnId {
                conn_id: chunk_header.conn_id,
                num_conns: header.num_conns,
            });
        }
        let file_offset = reader.position();
        skip_chunk_payload(chunk_header.data_len, &mut reader)?;
        records.push(ChunkHeaderRecord {
            header: chunk_header,
            file_offset,
        });
    }

    Ok((header, records))
}

/// Serialize a manifest back to the wire. `chunk.file_offset` is never
/// consulted here — offsets are a decode-time derivation, recomputed fresh
/// on the next decode, never round-tripped (SPEC_FULL.md §9).
pub fn encode_manifest_to_writer<W: std::io::Write>(
    manifest: &Manifest,
    w: &mut W,
) -> std::io::Result<()> {
    encode_header_to_writer(&manifest.header, w)?;
    for chunk in &manifest.chunks {
        encode_chunk_header_to_writer(&chunk.header, w)?;
        encode_chunk_data_to_writer(&chunk.data, w)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkFlags;
    use crate::header::ManifestHeader;
    use std::io::Cursor;

    fn sample_manifest() -> Manifest {
        let header = ManifestHeader::new(2, 2).unwrap();
        let chunks = vec![
            ParsedChunk {
                header: ChunkHeader {
                    conn_id: 0,
                    data_len: 4,
                    schedule: 0,
                    flags: 0,
                },
                data: bytes::Bytes::from_static(b"ping"),
                file_offset: 0,
            },
            ParsedChunk {
                header: ChunkHeader {
                    conn_id: 1,
                    data_len: 4,
                    schedule: 1,
                    flags: ChunkFlags::AWAIT_RESPONSE,
                },
                data: bytes::Bytes::from_static(b"pong"),
                file_offset: 0,
            },
        ];
        Manifest { header, chunks }
    }

    #[test]
    fn manifest_round_trip() {
        let manifest = sample_manifest();
        let mut buf = Vec::new();
        encode_manifest_to_writer(&manifest, &mut buf).unwrap();

        let decoded = decode_manifest(Cursor::new(&buf)).unwrap();
        assert_eq!(decoded.header, manifest.header);
        assert_eq!(decoded.chunks.len(), 2);
        assert_eq!(&decoded.chunks[0].data[..], b"ping");
        assert_eq!(&decoded.chunks[1].data[..], b"pong");
        assert!(decoded.chunks[1].header.await_response());
    }

    #[test]
    fn scan_headers_matches_decode_manifest_offsets() {
        let manifest = sample_manifest();
        let mut buf = Vec::new();
        encode_manifest_to_writer(&manifest, &mut buf).unwrap();

        let decoded = decode_manifest(Cursor::new(&buf)).unwrap();
        let (scanned_header, records) = scan_headers(Cursor::new(&buf)).unwrap();

        assert_eq!(scanned_header, manifest.header);
        assert_eq!(records.len(), decoded.chunks.len());
        for (record, chunk) in records.iter().zip(decoded.chunks.iter()) {
            assert_eq!(record.header, chunk.header);
            assert_eq!(record.file_offset, chunk.file_offset);
        }
    }

    #[test]
    fn rejects_conn_id_out_of_range() {
        let mut manifest = sample_manifest();
        manifest.chunks[0].header.conn_id = 99;
        let mut buf = Vec::new();
        encode_manifest_to_writer(&manifest, &mut buf).unwrap();

        assert_eq!(
            decode_manifest(Cursor::new(&buf)),
            Err(ParseError::BadConnId {
                conn_id: 99,
                num_conns: 2
            })
        );
    }
}
