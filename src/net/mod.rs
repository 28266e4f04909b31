//! Network I/O initialization.
//!
//! A lightweight availability probe: the platform either lets us open a
//! loopback listener or network-dependent subsystems (the web UI) are
//! skipped. Failure here is non-fatal by policy.

use std::net::TcpListener;

pub struct NetIo {
    available: bool,
}

impl NetIo {
    /// Probe for basic network I/O availability.
    pub fn init() -> Self {
        let available = match TcpListener::bind(("127.0.0.1", 0)) {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(error = %err, "network I/O probe failed");
                false
            }
        };
        Self { available }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn dismiss(&mut self) {
        self.available = false;
    }
}
