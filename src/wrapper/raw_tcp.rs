//! Raw TCP echo wrapper, the default protocol.
//!
//! Echoes every received byte back to the sender. Useful as a smoke-test
//! protocol and as the smallest example of the wrapper contract.

use crate::net::connection::Connection;
use crate::wrapper::{Wrapper, WrapperError};

/// Echo protocol over raw TCP.
pub struct RawTcp {
    served: u64,
}

impl RawTcp {
    pub fn new() -> Self {
        Self { served: 0 }
    }

    /// Build from the opaque config options. RawTcp takes none.
    pub fn from_options(_options: &toml::Table) -> Result<Self, WrapperError> {
        Ok(Self::new())
    }

    /// Connections served since startup.
    pub fn served(&self) -> u64 {
        self.served
    }
}

impl Default for RawTcp {
    fn default() -> Self {
        Self::new()
    }
}

impl Wrapper for RawTcp {
    fn init(&mut self) -> Result<(), WrapperError> {
        tracing::debug!("raw tcp wrapper ready");
        Ok(())
    }

    fn on_connect(&mut self, conn: &mut Connection) {
        self.served += 1;
        tracing::debug!(connection = %conn.id(), peer = %conn.peer_addr(), "raw tcp client");
    }

    fn on_data(&mut self, conn: &mut Connection, data: &[u8]) {
        conn.send(data);
    }

    fn on_stop(&mut self) {
        tracing::debug!(served = self.served, "raw tcp wrapper stopping");
    }
}
