use std::net::IpAddr;

use crate::models::filter::{FilterSpec, Protocol};

/// Header fields a frame is matched on, taken before the full record is built
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFields {
    /// Source and destination address, when a network layer was recognized
    pub addresses: Option<(IpAddr, IpAddr)>,

    pub protocol: Option<Protocol>,

    /// Source and destination port, when a transport layer was recognized
    pub ports: Option<(u16, u16)>,
}

/// Decide whether a frame is forwarded. Host, then protocol, then port.
pub fn matches(spec: &FilterSpec, fields: &FrameFields) -> bool {
    if let Some(host) = &spec.host {
        match &fields.addresses {
            Some((source, destination)) if host.matches(source, destination) => {}
            _ => return false,
        }
    }

    if let Some(protocol) = spec.protocol {
        if fields.protocol != Some(protocol) {
            return false;
        }
    }

    if let Some(port) = &spec.port {
        match &fields.ports {
            Some((source, destination)) if port.matches(source, destination) => {}
            _ => return false,
        }
    }

    true
}
