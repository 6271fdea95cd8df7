//! Connection Table (spec §3.3, §4.2): the one shared mutable structure in
//! the process. A single `std::sync::Mutex<HashMap<u32, ConnEntry>>` behind
//! an `Arc`, grounded in `summitd::session::state::HandshakeTracker`'s
//! `Arc<Mutex<HandshakeTracker>>` rather than the `DashMap`-sharded registries
//! elsewhere in the teacher (`summit-services::trust::TrustRegistry`) — spec
//! §4.2/§5 requires serialization by *one* mutex, which is itself a tested
//! invariant, not an implementation detail free to shard away.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6, TcpStream};
use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex};

use nix::sys::socket::{getsockname, SockaddrStorage};
use socket2::{Domain, Socket, Type};

use crate::error::FatalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnStatus {
    Dead,
    Alive,
    ClosedByPeer,
}

struct ConnEntry {
    status: ConnStatus,
    socket: Option<Arc<TcpStream>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireRole {
    Fresh,
    Reused,
}

pub enum Acquired {
    Socket(Arc<TcpStream>, AcquireRole),
    ClosedByPeer,
}

/// Process-wide, created once at interposer init, shared by every Chunk
/// Worker for the lifetime of the process (spec §3.3).
pub struct ConnTable {
    entries: Mutex<HashMap<u32, ConnEntry>>,
    listener_fd: RawFd,
}

impl ConnTable {
    pub fn new(listener_fd: RawFd) -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            listener_fd,
        })
    }

    /// `acquire(conn_id)` (spec §4.2). On `Dead`/missing, resolves the
    /// listening address and connects a fresh socket *without* holding the
    /// table lock (spec §5: the mutex guards table mutations, not `connect`
    /// or `send`), then records `Alive` under the lock.
    pub fn acquire(&self, conn_id: u32) -> Result<Acquired, FatalError> {
        if let Some(result) = self.try_fast_path(conn_id)? {
            return Ok(result);
        }

        let addr = resolve_listener_addr(self.listener_fd)?;
        let socket = connect_fresh(conn_id, addr)?;
        let socket = Arc::new(socket);

        let mut table = self.lock()?;
        match table.get(&conn_id) {
            Some(entry) if entry.status == ConnStatus::Alive => {
                return Ok(Acquired::Socket(
                    entry.socket.clone().expect("alive entry always has a socket"),
                    AcquireRole::Reused,
                ));
            }
            Some(entry) if entry.status == ConnStatus::ClosedByPeer => {
                return Ok(Acquired::ClosedByPeer);
            }
            _ => {}
        }
        table.insert(
            conn_id,
            ConnEntry {
                status: ConnStatus::Alive,
                socket: Some(socket.clone()),
            },
        );
        Ok(Acquired::Socket(socket, AcquireRole::Fresh))
    }

    fn try_fast_path(&self, conn_id: u32) -> Result<Option<Acquired>, FatalError> {
        let table = self.lock()?;
        match table.get(&conn_id) {
            Some(entry) if entry.status == ConnStatus::Alive => Ok(Some(Acquired::Socket(
                entry.socket.clone().expect("alive entry always has a socket"),
                AcquireRole::Reused,
            ))),
            Some(entry) if entry.status == ConnStatus::ClosedByPeer => {
                Ok(Some(Acquired::ClosedByPeer))
            }
            _ => Ok(None),
        }
    }

    /// Atomically transitions `Alive -> ClosedByPeer` and drops our handle to
    /// the socket (spec §4.2). Never revives an entry within a run.
    pub fn mark_closed(&self, conn_id: u32) -> Result<(), FatalError> {
        let mut table = self.lock()?;
        let entry = table.entry(conn_id).or_insert(ConnEntry {
            status: ConnStatus::Dead,
            socket: None,
        });
        if let Some(socket) = &entry.socket {
            let _ = socket.shutdown(std::net::Shutdown::Both);
        }
        entry.status = ConnStatus::ClosedByPeer;
        entry.socket = None;
        Ok(())
    }

    /// `query(conn_id)` (spec §4.2): the chunk worker's fast-exit check.
    pub fn query(&self, conn_id: u32) -> Result<ConnStatus, FatalError> {
        let table = self.lock()?;
        Ok(table.get(&conn_id).map(|e| e.status).unwrap_or(ConnStatus::Dead))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<u32, ConnEntry>>, FatalError> {
        self.entries.lock().map_err(|_| FatalError::PoisonedTable)
    }
}

fn resolve_listener_addr(fd: RawFd) -> Result<SocketAddr, FatalError> {
    let storage: SockaddrStorage =
        getsockname(fd).map_err(|e| FatalError::ListenerQueryFailed(std::io::Error::from(e)))?;

    if let Some(v4) = storage.as_sockaddr_in() {
        Ok(SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::from(v4.ip()),
            v4.port(),
        )))
    } else if let Some(v6) = storage.as_sockaddr_in6() {
        Ok(SocketAddr::V6(SocketAddrV6::new(
            Ipv6Addr::from(v6.ip()),
            v6.port(),
            0,
            0,
        )))
    } else {
        Err(FatalError::ListenerQueryFailed(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "listener socket is neither AF_INET nor AF_INET6",
        )))
    }
}

fn connect_fresh(conn_id: u32, addr: SocketAddr) -> Result<TcpStream, FatalError> {
    let domain = match addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };
    let socket = Socket::new(domain, Type::STREAM, None)
        .map_err(|source| FatalError::SocketCreateFailed { conn_id, source })?;
    socket
        .connect(&addr.into())
        .map_err(|source| FatalError::ConnectFailed { conn_id, source })?;
    Ok(TcpStream::from(socket))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream as StdTcpStream};
    use std::os::unix::io::AsRawFd;

    fn table_over_loopback_listener() -> (Arc<ConnTable>, TcpListener) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let table = ConnTable::new(listener.as_raw_fd());
        (table, listener)
    }

    #[test]
    fn acquire_is_fresh_then_reused() {
        let (table, listener) = table_over_loopback_listener();

        let first = table.acquire(0).unwrap();
        assert!(matches!(first, Acquired::Socket(_, AcquireRole::Fresh)));
        let _accepted: StdTcpStream = listener.accept().unwrap().0;

        let second = table.acquire(0).unwrap();
        assert!(matches!(second, Acquired::Socket(_, AcquireRole::Reused)));
    }

    #[test]
    fn mark_closed_short_circuits_future_acquires() {
        let (table, listener) = table_over_loopback_listener();
        table.acquire(1).unwrap();
        let _accepted = listener.accept().unwrap().0;

        table.mark_closed(1).unwrap();
        assert_eq!(table.query(1).unwrap(), ConnStatus::ClosedByPeer);
        assert!(matches!(table.acquire(1).unwrap(), Acquired::ClosedByPeer));
    }

    #[test]
    fn query_on_unknown_conn_id_is_dead() {
        let (table, _listener) = table_over_loopback_listener();
        assert_eq!(table.query(42).unwrap(), ConnStatus::Dead);
    }
}
