//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → server.rs (bounded non-blocking accept, one batch per tick)
//!     → tls.rs (optional TLS session attach, handshake driven per tick)
//!     → connection.rs (lifecycle, buffers, non-blocking read/write)
//!     → wrapper hooks (on_connect / on_data / on_disconnect)
//!
//! Connection states:
//!     Open → Closing → Closed
//! ```
//!
//! # Design Decisions
//! - All socket operations are non-blocking; "nothing available" is a value,
//!   never an error
//! - The server exclusively owns the listener and both registries; each
//!   connection exclusively owns its transport and buffers until closed
//! - Per-connection faults (handshake, write) are isolated to that
//!   connection and reported through the logging sink

pub mod connection;
pub mod server;
pub mod tls;
