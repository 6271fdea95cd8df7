//! Shared helpers for scenario tests: building CoMux manifests on disk and
//! standing up a loopback target that plays the victim server's part.

use std::fs::File;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::Bytes;

use gurthang_codec::chunk::ChunkHeader;
use gurthang_codec::header::ManifestHeader;
use gurthang_codec::manifest::{encode_manifest_to_writer, Manifest};
use gurthang_codec::ParsedChunk;
use gurthang_runtime::config::RuntimeConfig;
use gurthang_runtime::conntable::ConnTable;

pub fn chunk(conn_id: u32, schedule: u32, data: &[u8], flags: u32) -> ParsedChunk {
    ParsedChunk {
        header: ChunkHeader {
            conn_id,
            data_len: data.len() as u64,
            schedule,
            flags,
        },
        data: Bytes::copy_from_slice(data),
        file_offset: 0,
    }
}

/// Writes a manifest built from `num_conns` and `chunks` to a fresh temp
/// file and returns the open `File` — the Controller reads from a raw fd,
/// not a path, so the caller keeps this alive for the duration of the run.
pub fn manifest_file(num_conns: u32, chunks: Vec<ParsedChunk>) -> File {
    let header = ManifestHeader::new(num_conns, chunks.len() as u32).unwrap();
    let manifest = Manifest { header, chunks };

    let mut buf = Vec::new();
    encode_manifest_to_writer(&manifest, &mut buf).unwrap();

    let path = std::env::temp_dir().join(format!(
        "gurthang-it-{}-{}.bin",
        std::process::id(),
        unique_suffix()
    ));
    std::fs::write(&path, &buf).unwrap();
    let file = File::open(&path).unwrap();
    std::fs::remove_file(&path).ok();
    file
}

fn unique_suffix() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A listener plus a `ConnTable` resolved against it — what a real
/// interposed `listen()`/`accept()` pair would hand the Controller.
pub fn table_over_fresh_listener() -> (Arc<ConnTable>, TcpListener) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let table = ConnTable::new(listener.as_raw_fd());
    (table, listener)
}

pub fn serial_config() -> Arc<RuntimeConfig> {
    Arc::new(RuntimeConfig::default())
}

pub fn parallel_config() -> Arc<RuntimeConfig> {
    Arc::new(RuntimeConfig {
        parallel_dispatch: true,
        ..RuntimeConfig::default()
    })
}

pub fn manifest_fd(file: &File) -> RawFd {
    file.as_raw_fd()
}

/// Spawns a thread that accepts exactly one connection, echoes every read
/// back verbatim prefixed with nothing (a no-op passthrough), and returns
/// once the peer half-closes.
pub fn spawn_echo_peer(listener: TcpListener) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut received = Vec::new();
        stream.read_to_end(&mut received).unwrap();
        stream.write_all(&received).unwrap();
        let _ = stream.shutdown(Shutdown::Write);
        received
    })
}

/// Spawns a thread that accepts `n` connections in sequence, recording the
/// full bytes sent on each before half-closing its own write side.
pub fn spawn_multi_peer(listener: TcpListener, n: usize) -> JoinHandle<Vec<Vec<u8>>> {
    thread::spawn(move || {
        let mut all = Vec::with_capacity(n);
        for _ in 0..n {
            let (mut stream, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            stream.read_to_end(&mut received).unwrap();
            all.push(received);
        }
        all
    })
}

/// Spawns a thread that accepts one connection and closes it after reading
/// exactly `after_bytes` bytes, without ever writing a response (spec S7).
pub fn spawn_hostile_peer(listener: TcpListener, after_bytes: usize) -> JoinHandle<()> {
    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut buf = vec![0u8; after_bytes];
        let _ = read_exact_best_effort(&stream, &mut buf);
        drop(stream);
    })
}

fn read_exact_best_effort(mut stream: &TcpStream, buf: &mut [u8]) -> std::io::Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(())
}
