//! Capture source boundary: device listing, opening a device, and reading frames.

use std::fmt;
use std::sync::Arc;

use crate::models::interface::InterfaceInfo;
use crate::utils::error::CaptureError;

/// How to interpret the outermost header of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Ethernet,
    /// BSD loopback: 4-byte address family header
    Null,
    /// OpenBSD loopback: address family in network byte order
    Loop,
    /// Bare IPv4 or IPv6, version taken from the first nibble
    RawIp,
    Ipv4,
    Ipv6,
    /// Linux cooked capture (the "any" device)
    LinuxSll,
    Other(i32),
}

impl LinkType {
    /// Map a libpcap DLT value
    pub fn from_dlt(dlt: i32) -> Self {
        match dlt {
            0 => LinkType::Null,
            1 => LinkType::Ethernet,
            12 | 14 | 101 => LinkType::RawIp,
            108 => LinkType::Loop,
            113 => LinkType::LinuxSll,
            228 => LinkType::Ipv4,
            229 => LinkType::Ipv6,
            other => LinkType::Other(other),
        }
    }
}

/// One captured frame
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub data: Vec<u8>,

    /// Milliseconds since the epoch
    pub timestamp_ms: i64,

    /// Length on the wire; `data` may be shorter when truncated by the snap length
    pub length: u32,

    pub link_type: LinkType,
}

/// Closes a frame source from another thread, unblocking a pending read.
/// Calling it more than once is harmless.
#[derive(Clone)]
pub struct Interrupter(Arc<dyn Fn() + Send + Sync>);

impl Interrupter {
    pub fn new(close: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(close))
    }

    pub fn interrupt(&self) {
        (self.0)()
    }
}

impl fmt::Debug for Interrupter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Interrupter")
    }
}

/// An open capture handle yielding frames until closed or failed
pub trait FrameSource: Send {
    /// Blocks for the next frame. `Ok(None)` once the source is closed.
    fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError>;

    fn interrupter(&self) -> Interrupter;
}

/// Device access used by capture sessions
pub trait CaptureSource: Send + Sync {
    fn list_devices(&self) -> Result<Vec<InterfaceInfo>, CaptureError>;

    fn open(&self, interface: &str) -> Result<Box<dyn FrameSource>, CaptureError>;
}
