//! Controller (spec §4.4): spawned at most once per process, on its own
//! thread. Owns the input descriptor, validates the manifest, orders chunks
//! by schedule, and drives Chunk Workers to completion.
//!
//! Concurrency here is `std::thread::spawn`, never a `tokio` task — spec §9
//! forbids coroutines for this subsystem outright, so the teacher's usual
//! `tokio::spawn` idiom (`summitd::chunk::send_worker`) is rebuilt on
//! `std::thread::JoinHandle`, keeping the "collect handles, then join all"
//! shape for Parallel dispatch and a simple spawn-then-join loop for Serial.

use std::collections::HashMap;
use std::fs::File;
use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd, RawFd};
use std::sync::Arc;

use gurthang_codec::{scan_headers, ChunkHeaderRecord, ParseError};

use crate::config::RuntimeConfig;
use crate::conntable::ConnTable;
use crate::error::FatalError;
use crate::worker::{run_chunk_worker, ChunkWork, PayloadSource};

/// Exit code on any fatal internal error (spec §6.3).
pub const EXIT_FATAL: i32 = 24060;

/// Runs the controller to completion against `stdin_fd` (normally the
/// process's standard input, spec §4.4). Returns `Ok(())` on a clean run;
/// any `Err` is fatal and the caller is expected to log it and terminate
/// with [`EXIT_FATAL`].
pub fn run(stdin_fd: RawFd, table: Arc<ConnTable>, config: Arc<RuntimeConfig>) -> Result<(), FatalError> {
    let (header, records) = scan_input(stdin_fd)?;
    assert_every_connection_has_a_chunk(header.num_conns, &records)?;

    let dispatch_order = dispatch_order(&records);
    let final_flags = final_for_connection_flags(&dispatch_order);

    let work_items: Vec<ChunkWork> = dispatch_order
        .iter()
        .enumerate()
        .map(|(i, record)| ChunkWork {
            header: record.header,
            is_final_for_connection: final_flags[i],
            payload: PayloadSource::File {
                fd: stdin_fd,
                offset: record.file_offset,
            },
        })
        .collect();

    if config.parallel_dispatch {
        dispatch_parallel(&table, &config, work_items)
    } else {
        dispatch_serial(&table, &config, work_items)
    }
}

fn scan_input(fd: RawFd) -> Result<(gurthang_codec::ManifestHeader, Vec<ChunkHeaderRecord>), ParseError> {
    // Borrow the descriptor as a `File` just long enough to run the
    // sequential header scan, then hand the raw fd back unclosed — Chunk
    // Workers still need it for positional `pread` afterward.
    let mut file = unsafe { File::from_raw_fd(fd) };
    let result = scan_headers(&mut file);
    let _ = file.into_raw_fd();
    result
}

fn assert_every_connection_has_a_chunk(
    num_conns: u32,
    records: &[ChunkHeaderRecord],
) -> Result<(), FatalError> {
    let mut seen = vec![false; num_conns as usize];
    for record in records {
        seen[record.header.conn_id as usize] = true;
    }
    match seen.iter().position(|&present| !present) {
        Some(conn_id) => Err(FatalError::EmptyConnection {
            conn_id: conn_id as u32,
        }),
        None => Ok(()),
    }
}

/// Stable sort by `(schedule, file_index)` — P6.
fn dispatch_order(records: &[ChunkHeaderRecord]) -> Vec<ChunkHeaderRecord> {
    let mut indexed: Vec<(usize, ChunkHeaderRecord)> =
        records.iter().copied().enumerate().collect();
    indexed.sort_by_key(|(file_index, record)| (record.header.schedule, *file_index));
    indexed.into_iter().map(|(_, record)| record).collect()
}

/// Walks dispatch order decrementing per-`conn_id` survivor counts; a chunk
/// is final for its connection the moment the count reaches zero (spec §4.4
/// step 4).
fn final_for_connection_flags(dispatch_order: &[ChunkHeaderRecord]) -> Vec<bool> {
    let mut remaining: HashMap<u32, u32> = HashMap::new();
    for record in dispatch_order {
        *remaining.entry(record.header.conn_id).or_insert(0) += 1;
    }

    dispatch_order
        .iter()
        .map(|record| {
            let count = remaining.get_mut(&record.header.conn_id).unwrap();
            *count -= 1;
            *count == 0
        })
        .collect()
}

fn dispatch_serial(
    table: &Arc<ConnTable>,
    config: &Arc<RuntimeConfig>,
    work_items: Vec<ChunkWork>,
) -> Result<(), FatalError> {
    for work in work_items {
        let table = Arc::clone(table);
        let config = Arc::clone(config);
        let handle = std::thread::spawn(move || run_chunk_worker(&table, &config, work));
        handle
            .join()
            .unwrap_or_else(|_| Err(FatalError::PoisonedTable))?;
    }
    Ok(())
}

fn dispatch_parallel(
    table: &Arc<ConnTable>,
    config: &Arc<RuntimeConfig>,
    work_items: Vec<ChunkWork>,
) -> Result<(), FatalError> {
    let handles: Vec<_> = work_items
        .into_iter()
        .map(|work| {
            let table = Arc::clone(table);
            let config = Arc::clone(config);
            std::thread::spawn(move || run_chunk_worker(&table, &config, work))
        })
        .collect();

    let mut first_error = None;
    for handle in handles {
        let result = handle.join().unwrap_or_else(|_| Err(FatalError::PoisonedTable));
        if let Err(e) = result {
            if first_error.is_none() {
                first_error = Some(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Terminates the process per spec §4.4 step 6 / §6.3. `immediate` bypasses
/// registered exit handlers (`LIB_EXIT_IMMEDIATE`) — some targets install
/// handlers that assume they run only on their own threads and deadlock or
/// crash otherwise.
pub fn terminate(code: i32, immediate: bool) -> ! {
    if immediate {
        unsafe { libc::_exit(code) }
    } else {
        std::process::exit(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gurthang_codec::ChunkHeader;

    fn record(conn_id: u32, schedule: u32) -> ChunkHeaderRecord {
        ChunkHeaderRecord {
            header: ChunkHeader {
                conn_id,
                data_len: 0,
                schedule,
                flags: 0,
            },
            file_offset: 0,
        }
    }

    #[test]
    fn dispatch_order_sorts_by_schedule_then_file_order() {
        // S2: (0,1), (1,0), (0,2)
        let records = vec![record(0, 1), record(1, 0), record(0, 2)];
        let ordered = dispatch_order(&records);
        let conns: Vec<u32> = ordered.iter().map(|r| r.header.conn_id).collect();
        assert_eq!(conns, vec![1, 0, 0]);
    }

    #[test]
    fn final_flags_mark_last_chunk_per_connection() {
        let records = vec![record(0, 1), record(1, 0), record(0, 2)];
        let ordered = dispatch_order(&records);
        let flags = final_for_connection_flags(&ordered);
        // ordered: conn1(sched0), conn0(sched1), conn0(sched2)
        assert_eq!(flags, vec![true, false, true]);
    }

    #[test]
    fn missing_connection_chunks_is_fatal() {
        let records = vec![record(0, 0), record(2, 0)];
        let err = assert_every_connection_has_a_chunk(3, &records).unwrap_err();
        assert!(matches!(err, FatalError::EmptyConnection { conn_id: 1 }));
    }
}
