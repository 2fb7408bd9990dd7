// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Backend existence probe
//!
//! Best-effort startup check that the network filesystem endpoint actually
//! exists: the backend's DNS name only resolves for a live filesystem, so a
//! successful resolve of `<server>:2049` is taken as confirmation. The caller
//! logs a failure as a warning and continues; the probe is never fatal.

use std::net::{SocketAddr, ToSocketAddrs};

/// NFS service port used for the resolve
pub const NFS_PORT: u16 = 2049;

pub struct BackendProbe {
    server: String,
}

impl BackendProbe {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
        }
    }

    /// Resolve the backend endpoint. Blocking (standard resolver).
    pub fn resolve(&self) -> std::io::Result<SocketAddr> {
        let mut addrs = (self.server.as_str(), NFS_PORT).to_socket_addrs()?;
        addrs.next().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} resolved to no addresses", self.server),
            )
        })
    }
}
