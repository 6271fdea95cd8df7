//! Black-box scenarios from spec §8.2, driven through
//! [`gurthang_runtime::controller::run`] against real loopback listeners —
//! no `cdylib` load, no fuzzer, just the same entry point the interposer
//! calls once it has a listener fd in hand.

use std::sync::Arc;

use gurthang_codec::chunk::ChunkFlags;
use gurthang_runtime::conntable::ConnStatus;
use gurthang_runtime::controller;
use gurthang_runtime::error::FatalError;

use crate::infra::*;

/// S1: one connection, one chunk, AWAIT_RESPONSE. The target echoes the
/// payload back and half-closes; the Controller must finish cleanly.
#[test]
fn s1_single_connection_await_response() {
    let (table, listener) = table_over_fresh_listener();
    let peer = spawn_echo_peer(listener);

    let file = manifest_file(1, vec![chunk(0, 0, b"PING", ChunkFlags::AWAIT_RESPONSE)]);
    let config = serial_config();

    controller::run(manifest_fd(&file), table, config).unwrap();

    let received = peer.join().unwrap();
    assert_eq!(received, b"PING");
}

/// S2: two connections, out-of-order schedule. (0,1), (1,0), (0,2) — conn 1
/// must be dispatched before conn 0's first chunk.
#[test]
fn s2_out_of_order_schedule_dispatches_by_schedule() {
    let (table, listener) = table_over_fresh_listener();
    let peer = spawn_multi_peer(listener, 2);

    let file = manifest_file(
        2,
        vec![
            chunk(0, 1, b"a-first", 0),
            chunk(1, 0, b"b-only", 0),
            chunk(0, 2, b"a-second", 0),
        ],
    );
    let config = serial_config();

    controller::run(manifest_fd(&file), Arc::clone(&table), config).unwrap();

    let received = peer.join().unwrap();
    // First accepted connection is whichever dispatches first: conn 1 (sched 0).
    assert_eq!(received[0], b"b-only");
    assert_eq!(received[1], b"a-firsta-second");

    assert_eq!(table.query(0).unwrap(), ConnStatus::Alive);
    assert_eq!(table.query(1).unwrap(), ConnStatus::Alive);
}

/// S3: a connection id declared in `num_conns` never appears in any chunk.
/// Controller must refuse to dispatch anything.
#[test]
fn s3_connection_with_no_chunks_is_fatal() {
    let (table, listener) = table_over_fresh_listener();
    drop(listener);

    let file = manifest_file(3, vec![chunk(0, 0, b"x", 0), chunk(2, 0, b"y", 0)]);
    let config = serial_config();

    let err = controller::run(manifest_fd(&file), table, config).unwrap_err();
    assert!(matches!(err, FatalError::EmptyConnection { conn_id: 1 }));
}

/// S7: the target closes the socket mid-stream. The chunk in flight
/// observes the reset, marks the connection closed, and later chunks for
/// the same connection exit without attempting I/O — the whole run still
/// completes with `Ok(())`.
#[test]
fn s7_peer_closes_early_is_not_fatal() {
    let (table, listener) = table_over_fresh_listener();
    let peer = spawn_hostile_peer(listener, 4);

    let file = manifest_file(
        1,
        vec![chunk(0, 0, b"abcd", 0), chunk(0, 1, b"efgh", 0)],
    );
    let config = serial_config();

    controller::run(manifest_fd(&file), Arc::clone(&table), config).unwrap();
    peer.join().unwrap();

    assert_eq!(table.query(0).unwrap(), ConnStatus::ClosedByPeer);
}

/// Parallel dispatch (`LIB_NO_WAIT`) must reach the same two connections as
/// serial dispatch, just without an ordering guarantee across connections.
#[test]
fn parallel_dispatch_reaches_every_connection() {
    let (table, listener) = table_over_fresh_listener();
    let peer = spawn_multi_peer(listener, 2);

    let file = manifest_file(2, vec![chunk(0, 0, b"one", 0), chunk(1, 0, b"two", 0)]);
    let config = parallel_config();

    controller::run(manifest_fd(&file), table, config).unwrap();

    let mut received = peer.join().unwrap();
    received.sort();
    assert_eq!(received, vec![b"one".to_vec(), b"two".to_vec()]);
}
