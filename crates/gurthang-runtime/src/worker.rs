//! Chunk Worker (spec §4.3): a short-lived thread performing the I/O for
//! exactly one chunk. Payload bytes come from positional `pread(2)` against
//! the shared input descriptor (`nix::sys::uio::pread`) rather than a
//! shared, lock-guarded cursor — concurrent workers under Parallel dispatch
//! read disjoint regions of the same file descriptor with no coordination
//! required at all, a stronger generalization of spec §5's note that the
//! listener address needs no synchronization because it is written once.

use std::io::Write;
use std::net::{Shutdown, TcpStream};
use std::os::unix::io::{AsRawFd, BorrowedFd, RawFd};
use std::sync::Arc;

use bytes::Bytes;
use nix::sys::socket::{send, MsgFlags};
use nix::sys::uio::pread;

use gurthang_codec::{ChunkHeader, MAX_PAYLOAD};

use crate::config::RuntimeConfig;
use crate::conntable::{Acquired, ConnTable};
use crate::error::FatalError;

/// Where a chunk's payload bytes come from. The Controller hands workers a
/// `File` source when streaming from standard input; the mutator's own
/// tests (and any future in-memory replay path) use `Memory` directly.
pub enum PayloadSource {
    File { fd: RawFd, offset: u64 },
    Memory(Bytes),
}

pub struct ChunkWork {
    pub header: ChunkHeader,
    pub is_final_for_connection: bool,
    pub payload: PayloadSource,
}

pub fn run_chunk_worker(
    table: &ConnTable,
    config: &RuntimeConfig,
    work: ChunkWork,
) -> Result<(), FatalError> {
    let conn_id = work.header.conn_id;

    let socket = match table.acquire(conn_id)? {
        Acquired::ClosedByPeer => return Ok(()),
        Acquired::Socket(socket, _role) => socket,
    };

    let data = load_payload(&work.payload, work.header.data_len)?;

    if let Some(peer_closed) = write_payload(conn_id, &socket, &data, config.send_buffsize)? {
        if peer_closed {
            table.mark_closed(conn_id)?;
        }
        return Ok(());
    }

    if work.is_final_for_connection && !work.header.no_shutdown() {
        let _ = socket.shutdown(Shutdown::Write);
    }

    if work.header.await_response() {
        if drain_response(conn_id, &socket, config.recv_buffsize)? {
            table.mark_closed(conn_id)?;
        }
    }

    Ok(())
}

fn load_payload(source: &PayloadSource, data_len: u64) -> Result<Bytes, FatalError> {
    match source {
        PayloadSource::Memory(bytes) => Ok(bytes.clone()),
        PayloadSource::File { fd, offset } => {
            let capped = data_len.min(MAX_PAYLOAD as u64) as usize;
            let mut buf = vec![0u8; capped];
            let mut filled = 0;
            while filled < buf.len() {
                let borrowed_fd = unsafe { BorrowedFd::borrow_raw(*fd) };
                let n = pread(borrowed_fd, &mut buf[filled..], *offset as i64 + filled as i64).map_err(
                    |errno| FatalError::PayloadReadFailed {
                        offset: *offset,
                        source: std::io::Error::from(errno),
                    },
                )?;
                if n == 0 {
                    return Err(FatalError::PayloadReadFailed {
                        offset: *offset,
                        source: std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "pread returned 0 before data_len was satisfied",
                        ),
                    });
                }
                filled += n;
            }
            Ok(Bytes::from(buf))
        }
    }
}

/// Writes `data` in `buffsize`-sized blocks using `MSG_NOSIGNAL` so a peer
/// reset surfaces as `EPIPE`/`ECONNRESET` rather than `SIGPIPE` killing the
/// process. Returns `Ok(Some(true))` if the peer closed (caller should mark
/// the table entry and stop), `Ok(Some(false))` is never produced, `Ok(None)`
/// on full success.
fn write_payload(
    conn_id: u32,
    socket: &Arc<TcpStream>,
    data: &[u8],
    buffsize: usize,
) -> Result<Option<bool>, FatalError> {
    let fd = socket.as_raw_fd();
    let mut sent = 0;
    while sent < data.len() {
        let end = (sent + buffsize).min(data.len());
        match send(fd, &data[sent..end], MsgFlags::MSG_NOSIGNAL) {
            Ok(n) => sent += n,
            Err(nix::Error::EPIPE) | Err(nix::Error::ECONNRESET) => return Ok(Some(true)),
            Err(errno) => {
                return Err(FatalError::UnexpectedIo {
                    conn_id,
                    source: std::io::Error::from(errno),
                })
            }
        }
    }
    Ok(None)
}

/// Reads the response to EOF, writing each block to standard output (spec
/// §4.3 step 5). Returns `true` if the peer reset mid-read (not fatal, just
/// recorded), `false` on a clean EOF.
fn drain_response(conn_id: u32, socket: &TcpStream, buffsize: usize) -> Result<bool, FatalError> {
    use std::io::Read;

    let mut reader = socket;
    let mut buf = vec![0u8; buffsize];
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                out.write_all(b"\n").map_err(FatalError::StdoutWriteFailed)?;
                return Ok(false);
            }
            Ok(n) => {
                out.write_all(&buf[..n])
                    .map_err(FatalError::StdoutWriteFailed)?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => return Ok(true),
            Err(e) => {
                return Err(FatalError::UnexpectedIo {
                    conn_id,
                    source: e,
                })
            }
        }
    }
}
