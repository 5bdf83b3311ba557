//! Single-threaded non-blocking TCP/TLS server core.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────┐
//!                 │                   SERVER                      │
//!                 │                                               │
//!   Client ───────┼─▶ listener (non-blocking accept, bounded) ──┐│
//!                 │                                              ││
//!                 │  ┌─────────┐   ┌────────────┐   ┌─────────┐ ││
//!                 │  │  timer  │   │ connection │◀──│ wrapper │◀┘│
//!                 │  │registry │   │  registry  │──▶│ (hooks) │  │
//!                 │  └─────────┘   └────────────┘   └─────────┘  │
//!                 │                                               │
//!                 │  one tick() = timers → accept → read → flush │
//!                 └──────────────────────────────────────────────┘
//! ```
//!
//! The server never spawns threads and never blocks on I/O. An external
//! driver calls [`Server::tick`] repeatedly; the boolean it returns is the
//! idle hint (`false` means the driver may sleep before the next tick).
//! Protocol behavior is injected as a [`Wrapper`] strategy resolved by name
//! through the [`WrapperRegistry`] at configuration time.

// Core subsystems
pub mod config;
pub mod net;
pub mod timer;
pub mod wrapper;

// Cross-cutting concerns
pub mod observability;

pub use config::schema::{Config, ServerSettings, TlsSettings, WrapperSelection};
pub use net::connection::{Connection, ConnectionId, ConnectionState};
pub use net::server::{Server, ServerError, ServerState};
pub use net::tls::{TlsAcceptor, TlsError};
pub use timer::{Timer, TimerId, TimerKind};
pub use wrapper::registry::WrapperRegistry;
pub use wrapper::{Wrapper, WrapperError};
