//! Observability subsystem.
//!
//! The core consumes a logging sink; it never implements one. All lifecycle
//! notices and isolated per-connection faults flow through `tracing`, and
//! the binary installs the subscriber at startup.

pub mod logging;
