use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// A capture-capable network interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    /// Device system name (used for capture operations)
    pub name: String,

    /// First IPv4 address (if available)
    pub ipv4_address: Option<String>,

    /// First IPv6 address (if available)
    pub ipv6_address: Option<String>,
}

impl InterfaceInfo {
    /// Create a new interface info with just the device name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ipv4_address: None,
            ipv6_address: None,
        }
    }

    /// Record an address, keeping the first one seen per family
    pub fn with_address(mut self, address: IpAddr) -> Self {
        match address {
            IpAddr::V4(v4) if self.ipv4_address.is_none() => {
                self.ipv4_address = Some(v4.to_string());
            }
            IpAddr::V6(v6) if self.ipv6_address.is_none() => {
                self.ipv6_address = Some(v6.to_string());
            }
            _ => {}
        }
        self
    }

    pub fn has_address(&self) -> bool {
        self.ipv4_address.is_some() || self.ipv6_address.is_some()
    }
}
