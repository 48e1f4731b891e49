//! Synthetic frames and a scripted capture source for tests.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::net::Ipv6Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::capture::source::{CaptureSource, FrameSource, Interrupter, LinkType, RawFrame};
use crate::models::interface::InterfaceInfo;
use crate::utils::error::CaptureError;

pub fn ethernet_frame(ethertype: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x02, 0, 0, 0, 0, 0x02, 0x02, 0, 0, 0, 0, 0x01];
    frame.extend_from_slice(&ethertype.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

pub fn ipv4_packet(src: [u8; 4], dst: [u8; 4], protocol: u8, payload: &[u8]) -> Vec<u8> {
    let total = (20 + payload.len()) as u16;
    let mut packet = vec![0x45, 0];
    packet.extend_from_slice(&total.to_be_bytes());
    // identification, don't-fragment, ttl
    packet.extend_from_slice(&[0, 1, 0x40, 0, 64, protocol, 0, 0]);
    packet.extend_from_slice(&src);
    packet.extend_from_slice(&dst);
    packet.extend_from_slice(payload);
    packet
}

pub fn ipv6_packet(src: Ipv6Addr, dst: Ipv6Addr, next_header: u8, payload: &[u8]) -> Vec<u8> {
    let mut packet = vec![0x60, 0, 0, 0];
    packet.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    packet.extend_from_slice(&[next_header, 64]);
    packet.extend_from_slice(&src.octets());
    packet.extend_from_slice(&dst.octets());
    packet.extend_from_slice(payload);
    packet
}

pub fn udp_datagram(src: u16, dst: u16, payload: &[u8]) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(8 + payload.len());
    datagram.extend_from_slice(&src.to_be_bytes());
    datagram.extend_from_slice(&dst.to_be_bytes());
    datagram.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
    datagram.extend_from_slice(&[0, 0]);
    datagram.extend_from_slice(payload);
    datagram
}

/// PSH+ACK segment with no options
pub fn tcp_segment(src: u16, dst: u16, payload: &[u8]) -> Vec<u8> {
    TcpBuilder::new(src, dst).flags(0x18).payload(payload).build()
}

/// TCP segment builder; options must be padded to a multiple of four bytes
pub struct TcpBuilder {
    src: u16,
    dst: u16,
    sequence: u32,
    acknowledgment: u32,
    flags: u8,
    ns: bool,
    window: u16,
    checksum: u16,
    urgent: u16,
    options: Vec<u8>,
    payload: Vec<u8>,
}

impl TcpBuilder {
    pub fn new(src: u16, dst: u16) -> Self {
        Self {
            src,
            dst,
            sequence: 1,
            acknowledgment: 0,
            flags: 0,
            ns: false,
            window: 1024,
            checksum: 0,
            urgent: 0,
            options: Vec::new(),
            payload: Vec::new(),
        }
    }

    pub fn sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn acknowledgment(mut self, acknowledgment: u32) -> Self {
        self.acknowledgment = acknowledgment;
        self
    }

    pub fn flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    pub fn ns(mut self, ns: bool) -> Self {
        self.ns = ns;
        self
    }

    pub fn window(mut self, window: u16) -> Self {
        self.window = window;
        self
    }

    pub fn checksum(mut self, checksum: u16) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn urgent(mut self, urgent: u16) -> Self {
        self.urgent = urgent;
        self
    }

    pub fn options(mut self, options: &[u8]) -> Self {
        self.options = options.to_vec();
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn build(self) -> Vec<u8> {
        assert_eq!(self.options.len() % 4, 0, "unpadded tcp options");
        let data_offset = ((20 + self.options.len()) / 4) as u8;

        let mut segment = Vec::new();
        segment.extend_from_slice(&self.src.to_be_bytes());
        segment.extend_from_slice(&self.dst.to_be_bytes());
        segment.extend_from_slice(&self.sequence.to_be_bytes());
        segment.extend_from_slice(&self.acknowledgment.to_be_bytes());
        segment.push(data_offset << 4 | self.ns as u8);
        segment.push(self.flags);
        segment.extend_from_slice(&self.window.to_be_bytes());
        segment.extend_from_slice(&self.checksum.to_be_bytes());
        segment.extend_from_slice(&self.urgent.to_be_bytes());
        segment.extend_from_slice(&self.options);
        segment.extend_from_slice(&self.payload);
        segment
    }
}

fn raw(data: Vec<u8>) -> RawFrame {
    let length = data.len() as u32;
    RawFrame {
        data,
        timestamp_ms: 1_700_000_000_000,
        length,
        link_type: LinkType::Ethernet,
    }
}

/// Ethernet + IPv4 + TCP frame
pub fn tcp_frame(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16, payload: &[u8]) -> RawFrame {
    let ip = ipv4_packet(src, dst, 6, &tcp_segment(sport, dport, payload));
    raw(ethernet_frame(0x0800, &ip))
}

/// Ethernet + IPv4 + UDP frame
pub fn udp_frame(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16, payload: &[u8]) -> RawFrame {
    let ip = ipv4_packet(src, dst, 17, &udp_datagram(sport, dport, payload));
    raw(ethernet_frame(0x0800, &ip))
}

/// What a scripted handle does once its frames run out
#[derive(Debug, Clone)]
pub enum Ending {
    /// End of input
    Close,
    /// Read failure
    Fail(String),
    /// Wait until interrupted, like an idle interface
    Block,
    /// Wait until interrupted, then fail the read, like a driver torn down mid-read
    FailOnInterrupt(String),
}

#[derive(Debug, Clone)]
pub struct Script {
    pub frames: Vec<RawFrame>,
    pub ending: Ending,
}

impl Script {
    pub fn new(frames: Vec<RawFrame>, ending: Ending) -> Self {
        Self { frames, ending }
    }

    pub fn idle() -> Self {
        Self::new(Vec::new(), Ending::Block)
    }
}

#[derive(Default)]
struct Shared {
    scripts: Mutex<VecDeque<Script>>,
    devices: Mutex<Vec<InterfaceInfo>>,
    events: Mutex<Vec<String>>,
    open_now: AtomicUsize,
    max_open: AtomicUsize,
}

/// Capture source that plays back one queued script per `open` and records
/// open/close ordering. Opening with no script queued fails.
#[derive(Clone, Default)]
pub struct ScriptedSource {
    shared: Arc<Shared>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, script: Script) -> &Self {
        self.shared.scripts.lock().push_back(script);
        self
    }

    pub fn with_devices(self, devices: Vec<InterfaceInfo>) -> Self {
        *self.shared.devices.lock() = devices;
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.shared.events.lock().clone()
    }

    /// Highest number of handles that were open at the same time
    pub fn max_open(&self) -> usize {
        self.shared.max_open.load(Ordering::SeqCst)
    }

    pub fn open_now(&self) -> usize {
        self.shared.open_now.load(Ordering::SeqCst)
    }
}

impl CaptureSource for ScriptedSource {
    fn list_devices(&self) -> Result<Vec<InterfaceInfo>, CaptureError> {
        Ok(self.shared.devices.lock().clone())
    }

    fn open(&self, interface: &str) -> Result<Box<dyn FrameSource>, CaptureError> {
        let script = self
            .shared
            .scripts
            .lock()
            .pop_front()
            .ok_or_else(|| CaptureError::Source(format!("{}: no such device", interface)))?;

        self.shared.events.lock().push(format!("open:{}", interface));
        let now = self.shared.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_open.fetch_max(now, Ordering::SeqCst);

        Ok(Box::new(ScriptedFrames {
            interface: interface.to_string(),
            frames: script.frames.into(),
            ending: Some(script.ending),
            closed: Arc::new((Mutex::new(false), Condvar::new())),
            shared: self.shared.clone(),
        }))
    }
}

struct ScriptedFrames {
    interface: String,
    frames: VecDeque<RawFrame>,
    ending: Option<Ending>,
    closed: Arc<(Mutex<bool>, Condvar)>,
    shared: Arc<Shared>,
}

impl FrameSource for ScriptedFrames {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError> {
        let (closed, wake) = &*self.closed;
        if *closed.lock() {
            return match self.ending.take() {
                Some(Ending::FailOnInterrupt(message)) => Err(self.fail(message)),
                _ => Ok(None),
            };
        }
        if let Some(frame) = self.frames.pop_front() {
            return Ok(Some(frame));
        }

        match self.ending.take() {
            Some(Ending::Fail(message)) => Err(self.fail(message)),
            Some(Ending::Block) => {
                let mut guard = closed.lock();
                while !*guard {
                    wake.wait(&mut guard);
                }
                Ok(None)
            }
            Some(Ending::FailOnInterrupt(message)) => {
                let mut guard = closed.lock();
                while !*guard {
                    wake.wait(&mut guard);
                }
                drop(guard);
                Err(self.fail(message))
            }
            Some(Ending::Close) | None => Ok(None),
        }
    }

    fn interrupter(&self) -> Interrupter {
        let closed = self.closed.clone();
        Interrupter::new(move || {
            let (flag, wake) = &*closed;
            *flag.lock() = true;
            wake.notify_all();
        })
    }
}

impl ScriptedFrames {
    fn fail(&self, message: String) -> CaptureError {
        self.shared
            .events
            .lock()
            .push(format!("fail:{}", self.interface));
        CaptureError::Source(message)
    }
}

impl Drop for ScriptedFrames {
    fn drop(&mut self) {
        self.shared.open_now.fetch_sub(1, Ordering::SeqCst);
        self.shared
            .events
            .lock()
            .push(format!("close:{}", self.interface));
    }
}
