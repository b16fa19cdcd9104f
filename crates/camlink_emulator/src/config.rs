//! Emulator configuration.

use camlink_protocol::{PropertyName, KNOWN_PROPERTIES};
use std::net::SocketAddr;

/// Configuration for the device emulator.
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    /// Address to bind to. Port 0 picks a free port.
    pub bind_addr: SocketAddr,
    /// Path prefix of every HTTP resource.
    pub base_path: String,
    /// Names returned by `listProperties`, in order.
    pub properties: Vec<PropertyName>,
}

impl EmulatorConfig {
    /// Creates a configuration with the default resource layout.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            base_path: "/control/api/v1".to_string(),
            properties: KNOWN_PROPERTIES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Binds to an ephemeral port on loopback.
    pub fn ephemeral() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 0)))
    }

    /// Sets the resource prefix.
    pub fn with_base_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.base_path = path.trim_end_matches('/').to_string();
        self
    }

    /// Sets the advertised property list.
    pub fn with_properties<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PropertyName>,
    {
        self.properties = names.into_iter().map(Into::into).collect();
        self
    }
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 8000)))
    }
}
