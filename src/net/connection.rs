//! Connection lifecycle and non-blocking transport I/O.
//!
//! # Responsibilities
//! - Track connection state (Open → Closing → Closed)
//! - Generate unique connection IDs for registry keys and tracing
//! - Buffer outbound data until the flush pass can write it
//! - Drive the optional TLS session incrementally, one tick at a time
//!
//! A connection is exclusively owned by the server's registry from
//! acceptance until close; nothing else holds a mutating reference to it
//! outside the service and flush passes.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::net::tls::TlsAcceptor;

/// Global atomic counter for connection IDs.
/// Relaxed ordering is sufficient since we only need uniqueness.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// How much is read from the transport per `read` call during a tick.
const READ_CHUNK: usize = 16 * 1024;

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection state for lifecycle tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connection is live and serviced every tick.
    Open,
    /// Peer closed or a fault occurred; the next sweep closes it.
    Closing,
    /// Transport released; the connection is inert.
    Closed,
}

/// One accepted transport with its buffers and optional TLS session.
pub struct Connection {
    id: ConnectionId,
    stream: TcpStream,
    peer_addr: SocketAddr,
    tls: Option<rustls::ServerConnection>,
    handshaking: bool,
    state: ConnectionState,
    outbound: Vec<u8>,
}

impl Connection {
    /// Wrap a freshly accepted stream, switching it to non-blocking mode.
    pub fn new(stream: TcpStream, peer_addr: SocketAddr) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;

        Ok(Self {
            id: ConnectionId::new(),
            stream,
            peer_addr,
            tls: None,
            handshaking: false,
            state: ConnectionState::Open,
            outbound: Vec::new(),
        })
    }

    /// This connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The peer's address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True while the connection is live and serviced.
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Whether a TLS session is attached.
    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Attach a server-side TLS session, before any application data flows.
    ///
    /// A disabled acceptor leaves the connection in plaintext. The handshake
    /// itself completes incrementally across subsequent ticks; a session
    /// that cannot even be created marks the connection closing instead of
    /// surfacing a fault to the accept loop.
    pub fn enable_tls(&mut self, acceptor: &TlsAcceptor) {
        if self.tls.is_some() || self.state != ConnectionState::Open {
            return;
        }
        let Some(config) = acceptor.server_config() else {
            return;
        };

        match rustls::ServerConnection::new(config) {
            Ok(session) => {
                self.tls = Some(session);
                self.handshaking = true;
            }
            Err(err) => {
                tracing::error!(
                    connection = %self.id,
                    peer = %self.peer_addr,
                    error = %err,
                    "failed to start TLS session"
                );
                self.state = ConnectionState::Closing;
            }
        }
    }

    /// Attempt a non-blocking read, returning whatever bytes arrived.
    ///
    /// Detects orderly or abrupt peer close and transitions to Closing; the
    /// owning server's sweep performs the actual close.
    pub fn receive(&mut self) -> Vec<u8> {
        if self.state != ConnectionState::Open {
            return Vec::new();
        }
        if self.tls.is_some() {
            return self.receive_tls();
        }

        let mut received = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    tracing::debug!(connection = %self.id, peer = %self.peer_addr, "peer closed");
                    self.state = ConnectionState::Closing;
                    break;
                }
                Ok(n) => received.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    tracing::debug!(
                        connection = %self.id,
                        peer = %self.peer_addr,
                        error = %err,
                        "read failed"
                    );
                    self.state = ConnectionState::Closing;
                    break;
                }
            }
        }
        received
    }

    fn receive_tls(&mut self) -> Vec<u8> {
        let mut received = Vec::new();
        let Some(tls) = self.tls.as_mut() else {
            return received;
        };

        loop {
            match tls.read_tls(&mut self.stream) {
                Ok(0) => {
                    tracing::debug!(connection = %self.id, peer = %self.peer_addr, "peer closed");
                    self.state = ConnectionState::Closing;
                    break;
                }
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    tracing::debug!(
                        connection = %self.id,
                        peer = %self.peer_addr,
                        error = %err,
                        "read failed"
                    );
                    self.state = ConnectionState::Closing;
                    break;
                }
            }

            let io_state = match tls.process_new_packets() {
                Ok(io_state) => io_state,
                Err(err) => {
                    tracing::error!(
                        connection = %self.id,
                        peer = %self.peer_addr,
                        error = %err,
                        "TLS error, closing connection"
                    );
                    self.state = ConnectionState::Closing;
                    break;
                }
            };

            let available = io_state.plaintext_bytes_to_read();
            if available > 0 {
                let start = received.len();
                received.resize(start + available, 0);
                if let Err(err) = tls.reader().read_exact(&mut received[start..]) {
                    tracing::error!(
                        connection = %self.id,
                        error = %err,
                        "failed to drain decrypted data"
                    );
                    received.truncate(start);
                    self.state = ConnectionState::Closing;
                    break;
                }
            }

            if self.handshaking && !tls.is_handshaking() {
                self.handshaking = false;
                tracing::debug!(
                    connection = %self.id,
                    peer = %self.peer_addr,
                    "TLS handshake completed"
                );
            }

            if io_state.peer_has_closed() {
                self.state = ConnectionState::Closing;
                break;
            }
        }
        received
    }

    /// Queue bytes for the next flush pass.
    pub fn send(&mut self, data: &[u8]) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.outbound.extend_from_slice(data);
    }

    /// True iff buffered output or pending TLS traffic remains for a
    /// subsequent tick.
    pub fn has_work(&self) -> bool {
        if self.state == ConnectionState::Closed {
            return false;
        }
        if !self.outbound.is_empty() {
            return true;
        }
        self.tls.as_ref().is_some_and(|tls| tls.wants_write())
    }

    /// Attempt to write pending outbound bytes.
    ///
    /// `Ok(0)` means there was nothing to write (or the socket would block);
    /// an `Err` is a genuine write failure the caller isolates and logs.
    pub fn flush(&mut self) -> io::Result<usize> {
        if self.state == ConnectionState::Closed {
            return Ok(0);
        }
        if self.tls.is_some() {
            return self.flush_tls();
        }

        let mut written = 0;
        while !self.outbound.is_empty() {
            match self.stream.write(&self.outbound) {
                Ok(0) => break,
                Ok(n) => {
                    self.outbound.drain(..n);
                    written += n;
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(written)
    }

    fn flush_tls(&mut self) -> io::Result<usize> {
        let Some(tls) = self.tls.as_mut() else {
            return Ok(0);
        };

        // Plaintext only enters the session once the handshake is done.
        if !tls.is_handshaking() && !self.outbound.is_empty() {
            match tls.writer().write(&self.outbound) {
                Ok(n) => {
                    self.outbound.drain(..n);
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                Err(err) => return Err(err),
            }
        }

        let mut written = 0;
        while tls.wants_write() {
            match tls.write_tls(&mut self.stream) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(written)
    }

    /// Mark the connection for close; the owning server's sweep finishes it.
    pub fn begin_close(&mut self) {
        if self.state == ConnectionState::Open {
            self.state = ConnectionState::Closing;
        }
    }

    /// Release the transport. Idempotent.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        if let Some(tls) = self.tls.as_mut() {
            tls.send_close_notify();
            let _ = tls.write_tls(&mut self.stream);
        }
        let _ = self.stream.shutdown(Shutdown::Both);
        self.state = ConnectionState::Closed;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("state", &self.state)
            .field("tls", &self.tls.is_some())
            .field("outbound_len", &self.outbound.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn connection_id_displays_with_prefix() {
        let id = ConnectionId::new();
        assert!(id.to_string().starts_with("conn-"));
    }
}
