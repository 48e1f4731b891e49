use log::{debug, info};
use pcap::{Active, BreakLoop, Capture, Device};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::capture::source::{CaptureSource, FrameSource, Interrupter, LinkType, RawFrame};
use crate::models::config::AppConfig;
use crate::models::interface::InterfaceInfo;
use crate::utils::error::CaptureError;

/// Live capture through libpcap / Npcap
pub struct PcapSource {
    promiscuous: bool,
    snaplen: i32,
    read_timeout_ms: i32,
}

impl PcapSource {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            promiscuous: config.promiscuous,
            snaplen: config.snaplen,
            read_timeout_ms: config.read_timeout_ms,
        }
    }
}

impl CaptureSource for PcapSource {
    fn list_devices(&self) -> Result<Vec<InterfaceInfo>, CaptureError> {
        let devices = Device::list()?;
        debug!("pcap reported {} devices", devices.len());

        Ok(devices
            .into_iter()
            .map(|device| {
                device
                    .addresses
                    .iter()
                    .fold(InterfaceInfo::new(device.name.clone()), |info, address| {
                        info.with_address(address.addr)
                    })
            })
            .filter(InterfaceInfo::has_address)
            .collect())
    }

    fn open(&self, interface: &str) -> Result<Box<dyn FrameSource>, CaptureError> {
        info!(
            "Opening capture on {} (promiscuous: {}, snaplen: {})",
            interface, self.promiscuous, self.snaplen
        );

        let mut capture = Capture::from_device(interface)?
            .promisc(self.promiscuous)
            .snaplen(self.snaplen)
            .timeout(self.read_timeout_ms)
            .immediate_mode(true)
            .open()?;

        let link_type = supported_link_type(interface, capture.get_datalink().0)?;
        debug!("Capture on {} uses link type {:?}", interface, link_type);

        let breaker = capture.breakloop_handle();

        Ok(Box::new(PcapFrames {
            capture,
            link_type,
            closed: Arc::new(AtomicBool::new(false)),
            breaker: Arc::new(breaker),
        }))
    }
}

/// Refuse devices whose frames could never be decoded
fn supported_link_type(interface: &str, dlt: i32) -> Result<LinkType, CaptureError> {
    match LinkType::from_dlt(dlt) {
        LinkType::Other(dlt) => Err(CaptureError::Source(format!(
            "{}: unsupported link type {}",
            interface, dlt
        ))),
        link_type => Ok(link_type),
    }
}

struct PcapFrames {
    capture: Capture<Active>,
    link_type: LinkType,
    closed: Arc<AtomicBool>,
    breaker: Arc<BreakLoop>,
}

impl FrameSource for PcapFrames {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError> {
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Ok(None);
            }

            match self.capture.next_packet() {
                Ok(packet) => {
                    let ts = &packet.header.ts;
                    return Ok(Some(RawFrame {
                        data: packet.data.to_vec(),
                        timestamp_ms: ts.tv_sec as i64 * 1000 + ts.tv_usec as i64 / 1000,
                        length: packet.header.len,
                        link_type: self.link_type,
                    }));
                }
                // read timeouts only exist so the closed flag gets rechecked
                Err(pcap::Error::TimeoutExpired) => continue,
                // breakloop surfaces as end of input
                Err(pcap::Error::NoMorePackets) => return Ok(None),
                Err(_) if self.closed.load(Ordering::SeqCst) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn interrupter(&self) -> Interrupter {
        let closed = self.closed.clone();
        let breaker = self.breaker.clone();
        Interrupter::new(move || {
            closed.store(true, Ordering::SeqCst);
            breaker.breakloop();
        })
    }
}
