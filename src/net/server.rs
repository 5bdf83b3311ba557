//! Server lifecycle and the cooperative tick loop.
//!
//! # Responsibilities
//! - Bind the listening socket (SO_REUSEADDR + SO_REUSEPORT, non-blocking)
//! - Drive one bounded unit of work per tick: timers, accept, read, flush
//! - Own the connection and timer registries and the wrapper instance
//!
//! # Design Decisions
//! - Single logical thread of control; no locks, no suspension mid-tick
//! - Registries are never mutated mid-iteration: passes walk a stable
//!   snapshot of ids and structural changes are applied afterwards
//! - One failing connection never blocks, delays, or corrupts another

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::time::Instant;

use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;

use crate::config::schema::ServerSettings;
use crate::net::connection::{Connection, ConnectionId};
use crate::net::tls::{TlsAcceptor, TlsError};
use crate::timer::{Timer, TimerId, TimerKind};
use crate::wrapper::{Wrapper, WrapperError};

/// Error type for server startup.
///
/// Everything past startup degrades gracefully; only these conditions keep
/// the server from reaching Running.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind listener: {0}")]
    Bind(#[source] io::Error),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("wrapper initialization failed: {0}")]
    Wrapper(#[from] WrapperError),
}

/// Server lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Running,
}

/// A single-process, non-blocking TCP/TLS server.
///
/// The server owns the listening transport, the connection registry, the
/// timer registry and the injected wrapper. An external driver calls
/// [`Server::tick`] repeatedly; each call is one bounded unit of work and
/// never blocks on I/O.
pub struct Server {
    settings: ServerSettings,
    listener: Option<TcpListener>,
    tls: TlsAcceptor,
    state: ServerState,
    started_at: Option<Instant>,
    connections: HashMap<ConnectionId, Connection>,
    timers: HashMap<TimerId, Timer>,
    wrapper: Box<dyn Wrapper>,
}

impl Server {
    /// Create a stopped server with the given settings and protocol wrapper.
    pub fn new(settings: ServerSettings, wrapper: Box<dyn Wrapper>) -> Self {
        Self {
            settings,
            listener: None,
            tls: TlsAcceptor::disabled(),
            state: ServerState::Stopped,
            started_at: None,
            connections: HashMap::new(),
            timers: HashMap::new(),
            wrapper,
        }
    }

    /// Bind and listen, transitioning Stopped → Running.
    ///
    /// Loads TLS material when configured, runs the wrapper's one-time
    /// `init` hook, then binds. A bind failure is fatal to startup: the OS
    /// error code and message are logged and the error is returned so the
    /// process can exit non-zero. It is not retried.
    pub fn start(&mut self) -> Result<(), ServerError> {
        if self.state == ServerState::Running {
            return Ok(());
        }

        self.tls = match self.settings.tls.as_ref() {
            Some(tls) if tls.is_enabled() => TlsAcceptor::from_settings(tls)?,
            _ => TlsAcceptor::disabled(),
        };

        self.wrapper.init()?;

        let listener = bind_listener(&self.settings).map_err(|err| {
            tracing::error!(
                code = err.raw_os_error().unwrap_or(-1),
                error = %err,
                bind_address = %self.settings.bind_address,
                port = self.settings.port,
                "failed to bind listener"
            );
            ServerError::Bind(err)
        })?;

        tracing::debug!(
            bind_address = %self.settings.bind_address,
            port = self.settings.port,
            tls = self.tls.is_enabled(),
            "server is listening"
        );

        self.listener = Some(listener);
        self.started_at = Some(Instant::now());
        self.state = ServerState::Running;
        Ok(())
    }

    /// Run one tick of the event loop.
    ///
    /// A no-op returning `false` unless Running. Otherwise: advance due
    /// timers, accept a bounded batch of new connections, service every
    /// live connection for incoming data, flush every live connection's
    /// outbound buffer, then sweep closed connections out of the registry.
    ///
    /// Returns `true` if a connection was accepted this tick or any
    /// connection still has pending work after flushing; `false` tells the
    /// driver it may idle before the next call.
    pub fn tick(&mut self) -> bool {
        if self.state != ServerState::Running {
            return false;
        }

        self.timer_tick();
        let accepted = self.accept_pending();
        self.service_pass();
        let pending = self.flush_pass();
        self.sweep_closed();

        accepted > 0 || pending
    }

    /// Register a timer, returning its id.
    pub fn add_timer(&mut self, timer: Timer) -> TimerId {
        let id = timer.id();
        self.timers.insert(id, timer);
        id
    }

    /// Remove a timer. Removing an absent id is a no-op.
    pub fn remove_timer(&mut self, id: TimerId) {
        self.timers.remove(&id);
    }

    /// Remove a connection from the registry. Always safe to call, even if
    /// the connection was already removed.
    pub fn on_disconnect(&mut self, id: ConnectionId) {
        self.connections.remove(&id);
    }

    /// Stop the server. Idempotent: a no-op unless Running.
    ///
    /// Notifies the wrapper, closes every registered connection, releases
    /// the listening transport and transitions to Stopped.
    pub fn stop(&mut self) {
        if self.state != ServerState::Running {
            return;
        }

        tracing::debug!("closing connections");
        self.wrapper.on_stop();

        for (_, mut conn) in self.connections.drain() {
            conn.close();
        }

        self.listener = None;
        self.state = ServerState::Stopped;

        tracing::debug!("server is stopped");
    }

    /// Whether the server is accepting and servicing connections.
    pub fn is_running(&self) -> bool {
        self.state == ServerState::Running
    }

    /// Whether accepted connections are upgraded to TLS.
    pub fn is_tls(&self) -> bool {
        self.tls.is_enabled()
    }

    /// The address the listener is actually bound to, once Running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Time since the last successful `start`, if any.
    pub fn uptime(&self) -> Option<std::time::Duration> {
        self.started_at.map(|t| t.elapsed())
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of registered timers.
    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    /// The injected protocol wrapper.
    pub fn wrapper(&self) -> &dyn Wrapper {
        self.wrapper.as_ref()
    }

    /// Log the current uptime, broken into hours, minutes and seconds.
    pub fn log_uptime(&self) {
        let uptime = self.uptime().unwrap_or_default().as_secs();
        tracing::debug!(
            bind_address = %self.settings.bind_address,
            port = self.settings.port,
            "current uptime is {}h {}m {}s",
            uptime / 3600,
            (uptime % 3600) / 60,
            uptime % 60
        );
    }

    /// Log the number of currently active connections.
    pub fn log_status(&self) {
        tracing::debug!(connections = self.connections.len(), "currently active connections");
    }

    /// Execute every due timer over a stable snapshot of ids.
    ///
    /// Timeout timers are removed right after their single execution; a
    /// failing callback is logged and never aborts the remaining timers.
    fn timer_tick(&mut self) {
        let now = Instant::now();
        let due: Vec<TimerId> = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.is_due(now))
            .map(|(id, _)| *id)
            .collect();

        for id in due {
            let Some(timer) = self.timers.get_mut(&id) else {
                continue;
            };
            if let Err(err) = timer.fire() {
                tracing::error!(timer = %id, error = %err, "timer callback failed");
            }
            if timer.kind() == TimerKind::Timeout {
                self.timers.remove(&id);
            }
        }
    }

    /// Accept up to `accept_limit` pending connections.
    ///
    /// "Nothing pending" and transient accept faults both end the batch for
    /// this tick without being errors; remaining peers are admitted on
    /// subsequent ticks.
    fn accept_pending(&mut self) -> usize {
        let mut accepted = 0;
        while accepted < self.settings.accept_limit {
            let result = match self.listener.as_ref() {
                Some(listener) => listener.accept(),
                None => break,
            };

            match result {
                Ok((stream, peer)) => {
                    let mut conn = match Connection::new(stream, peer) {
                        Ok(conn) => conn,
                        Err(err) => {
                            tracing::debug!(
                                peer = %peer,
                                error = %err,
                                "dropping connection that could not be configured"
                            );
                            continue;
                        }
                    };

                    if self.tls.is_enabled() {
                        conn.enable_tls(&self.tls);
                    }
                    if !conn.is_open() {
                        // TLS session creation failed; already logged.
                        continue;
                    }

                    tracing::debug!(connection = %conn.id(), peer = %peer, "client connected");
                    self.wrapper.on_connect(&mut conn);
                    self.connections.insert(conn.id(), conn);
                    accepted += 1;
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    tracing::debug!(error = %err, "accept failed, ending batch");
                    break;
                }
            }
        }
        accepted
    }

    /// Read every live connection once, handing received bytes to the
    /// wrapper.
    fn service_pass(&mut self) {
        let ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        for id in ids {
            let Some(conn) = self.connections.get_mut(&id) else {
                continue;
            };
            let data = conn.receive();
            if !data.is_empty() {
                self.wrapper.on_data(conn, &data);
            }
        }
    }

    /// Write every live connection's pending output.
    ///
    /// A write failure on one connection is logged and that connection is
    /// marked closing; the remaining connections still get flushed. Returns
    /// whether any connection has work left for a subsequent tick.
    fn flush_pass(&mut self) -> bool {
        let mut has_work = false;
        let ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        for id in ids {
            let Some(conn) = self.connections.get_mut(&id) else {
                continue;
            };
            match conn.flush() {
                Ok(_) => {
                    if conn.has_work() {
                        has_work = true;
                    }
                }
                Err(err) => {
                    tracing::error!(
                        connection = %id,
                        error = %err,
                        "write failed, closing connection"
                    );
                    conn.begin_close();
                }
            }
        }
        has_work
    }

    /// Remove connections that finished closing, notifying the wrapper.
    fn sweep_closed(&mut self) {
        let finished: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|(_, conn)| !conn.is_open())
            .map(|(id, _)| *id)
            .collect();

        for id in finished {
            if let Some(mut conn) = self.connections.remove(&id) {
                conn.close();
                self.wrapper.on_disconnect(&conn);
                tracing::debug!(connection = %id, "client disconnected");
            }
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Create the listening socket with the configured backlog hint.
///
/// SO_REUSEADDR and SO_REUSEPORT are always requested so multiple listener
/// instances may share the port. The socket is non-blocking before it is
/// handed to the accept loop.
fn bind_listener(settings: &ServerSettings) -> io::Result<TcpListener> {
    let addr = settings.socket_addr()?;
    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };

    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;

    socket.bind(&addr.into())?;
    socket.listen(settings.backlog as i32)?;
    socket.set_nonblocking(true)?;

    Ok(socket.into())
}
