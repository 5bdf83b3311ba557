//! Protocol wrapper subsystem.
//!
//! # Data Flow
//! ```text
//! config [wrapper] name + options
//!     → registry.rs (name → factory, configuration-time resolution)
//!     → Box<dyn Wrapper> injected into the Server
//!     → hooks invoked from the tick loop:
//!         init        once, before the listener binds
//!         on_connect  once per admitted connection
//!         on_data     whenever the service pass reads bytes
//!         on_disconnect when a connection leaves the registry
//!         on_stop     once, during shutdown, before connections close
//! ```
//!
//! # Design Decisions
//! - The server never inspects wrapper-internal state; protocol state per
//!   connection is the wrapper's own business
//! - Hooks receive `&mut Connection` so protocols queue replies through the
//!   connection's outbound buffer and let the flush pass deliver them

pub mod raw_tcp;
pub mod registry;

use thiserror::Error;

use crate::net::connection::Connection;

/// Error type for wrapper resolution and setup.
#[derive(Debug, Error)]
pub enum WrapperError {
    #[error("unknown wrapper '{0}'")]
    Unknown(String),

    #[error("invalid wrapper options: {0}")]
    Options(String),

    #[error("initialization failed: {0}")]
    Init(String),
}

/// The protocol strategy driven by the server's tick loop.
///
/// Implementations may hold their own per-connection state keyed by
/// [`crate::ConnectionId`]; the core only calls these hooks at the
/// documented points and never looks inside.
pub trait Wrapper {
    /// One-time setup, invoked before the server starts accepting.
    fn init(&mut self) -> Result<(), WrapperError> {
        Ok(())
    }

    /// Invoked once per newly accepted connection.
    fn on_connect(&mut self, conn: &mut Connection);

    /// Invoked with the bytes a connection received this tick.
    fn on_data(&mut self, conn: &mut Connection, data: &[u8]);

    /// Invoked when a connection is removed from the registry.
    fn on_disconnect(&mut self, _conn: &Connection) {}

    /// Invoked once during shutdown, before connections are closed.
    fn on_stop(&mut self) {}
}
