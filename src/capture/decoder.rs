use log::{log_enabled, trace, Level};
use pnet::packet::{
    ethernet::{EtherType, EtherTypes, EthernetPacket},
    ip::{IpNextHeaderProtocol, IpNextHeaderProtocols},
    ipv4::Ipv4Packet,
    ipv6::Ipv6Packet,
    tcp::TcpPacket,
    udp::UdpPacket,
    vlan::VlanPacket,
    Packet as PnetPacket,
};
use std::net::IpAddr;

use crate::capture::filter::FrameFields;
use crate::capture::source::{LinkType, RawFrame};
use crate::models::filter::Protocol;
use crate::models::record::{OutputRecord, TcpOptionRecord, TcpSegment, UdpDatagram};

const IPV4_MIN_HEADER: usize = 20;
const IPV6_HEADER: usize = 40;
const TCP_MIN_HEADER: usize = 20;
const UDP_HEADER: usize = 8;
const SLL_HEADER: usize = 16;
const NULL_HEADER: usize = 4;
const MAX_VLAN_TAGS: usize = 2;

const IPV4_MORE_FRAGMENTS: u8 = 0b001;
const ETHERTYPE_QINQ: EtherType = EtherType(0x88a8);

const TCP_OPTION_END: u8 = 0;
const TCP_OPTION_NOP: u8 = 1;

/// Address family values used in loopback headers across BSDs, macOS and Linux
const AF_INET: u32 = 2;
const AF_INET6: [u32; 4] = [10, 24, 28, 30];

/// Decodes raw frames into output records
#[derive(Debug, Default, Clone, Copy)]
pub struct PacketDecoder {}

/// A frame split into network and transport headers, before any payload is copied
#[derive(Debug)]
pub struct Dissection<'a> {
    addresses: Option<(IpAddr, IpAddr)>,
    transport: Option<Transport<'a>>,
}

#[derive(Debug)]
enum Transport<'a> {
    Tcp(TcpHeader<'a>),
    Udp(UdpPacket<'a>),
}

#[derive(Debug)]
struct TcpHeader<'a> {
    packet: TcpPacket<'a>,
    header_len: usize,
    options: Vec<TcpOptionRecord>,
    padding: &'a [u8],
}

enum Network<'a> {
    V4(&'a [u8]),
    V6(&'a [u8]),
}

impl PacketDecoder {
    /// Create a new packet decoder
    pub fn new() -> Self {
        Self {}
    }

    /// Decode a frame, or `None` when it carries no TCP or UDP header
    #[cfg(test)]
    pub fn decode(&self, frame: &RawFrame) -> Option<OutputRecord> {
        self.dissect(frame).into_record(frame)
    }

    /// Locate the IP and transport headers of a frame
    pub fn dissect<'a>(&self, frame: &'a RawFrame) -> Dissection<'a> {
        let dissection = match self.network_layer(frame) {
            Some(Network::V4(bytes)) => self.dissect_ipv4(bytes),
            Some(Network::V6(bytes)) => self.dissect_ipv6(bytes),
            None => Dissection {
                addresses: None,
                transport: None,
            },
        };

        if log_enabled!(Level::Trace) {
            trace!(
                "Frame ({:?}, {} bytes): addresses {:?}, transport {:?}",
                frame.link_type,
                frame.data.len(),
                dissection.addresses,
                dissection.fields().protocol
            );
        }

        dissection
    }

    /// Strip the link-layer header
    fn network_layer<'a>(&self, frame: &'a RawFrame) -> Option<Network<'a>> {
        let data = frame.data.as_slice();
        match frame.link_type {
            LinkType::Ethernet => {
                let eth = EthernetPacket::new(data)?;
                let mut ethertype = eth.get_ethertype();
                let mut offset = EthernetPacket::minimum_packet_size();
                for _ in 0..MAX_VLAN_TAGS {
                    if ethertype != EtherTypes::Vlan && ethertype != ETHERTYPE_QINQ {
                        break;
                    }
                    let vlan = VlanPacket::new(&data[offset..])?;
                    ethertype = vlan.get_ethertype();
                    offset += VlanPacket::minimum_packet_size();
                }
                by_ethertype(ethertype, &data[offset..])
            }
            LinkType::LinuxSll => {
                if data.len() < SLL_HEADER {
                    return None;
                }
                let ethertype = EtherType(u16::from_be_bytes([data[14], data[15]]));
                by_ethertype(ethertype, &data[SLL_HEADER..])
            }
            LinkType::Null | LinkType::Loop => {
                if data.len() < NULL_HEADER {
                    return None;
                }
                let raw = [data[0], data[1], data[2], data[3]];
                let family = if frame.link_type == LinkType::Loop {
                    u32::from_be_bytes(raw)
                } else {
                    // host byte order of the capturing machine, which may not be ours
                    let le = u32::from_le_bytes(raw);
                    if le > 0xffff {
                        u32::from_be_bytes(raw)
                    } else {
                        le
                    }
                };
                let payload = &data[NULL_HEADER..];
                if family == AF_INET {
                    Some(Network::V4(payload))
                } else if AF_INET6.contains(&family) {
                    Some(Network::V6(payload))
                } else {
                    None
                }
            }
            LinkType::RawIp => match data.first().map(|b| b >> 4) {
                Some(4) => Some(Network::V4(data)),
                Some(6) => Some(Network::V6(data)),
                _ => None,
            },
            LinkType::Ipv4 => Some(Network::V4(data)),
            LinkType::Ipv6 => Some(Network::V6(data)),
            LinkType::Other(_) => None,
        }
    }

    fn dissect_ipv4<'a>(&self, bytes: &'a [u8]) -> Dissection<'a> {
        let Some(packet) = Ipv4Packet::new(bytes) else {
            return Dissection::empty();
        };
        let header_len = packet.get_header_length() as usize * 4;
        let total_len = match packet.get_total_length() as usize {
            // segmentation offload leaves the length unset
            0 => bytes.len(),
            len => len,
        };
        if packet.get_version() != 4
            || header_len < IPV4_MIN_HEADER
            || header_len > bytes.len()
            || total_len < header_len
        {
            return Dissection::empty();
        }

        let addresses = Some((
            IpAddr::V4(packet.get_source()),
            IpAddr::V4(packet.get_destination()),
        ));

        let fragmented = packet.get_fragment_offset() != 0
            || packet.get_flags() & IPV4_MORE_FRAGMENTS != 0;
        let transport = if fragmented {
            None
        } else {
            let payload = &bytes[header_len..total_len.min(bytes.len())];
            dissect_transport(packet.get_next_level_protocol(), payload)
        };

        Dissection {
            addresses,
            transport,
        }
    }

    fn dissect_ipv6<'a>(&self, bytes: &'a [u8]) -> Dissection<'a> {
        let Some(packet) = Ipv6Packet::new(bytes) else {
            return Dissection::empty();
        };
        if packet.get_version() != 6 {
            return Dissection::empty();
        }

        let addresses = Some((
            IpAddr::V6(packet.get_source()),
            IpAddr::V6(packet.get_destination()),
        ));

        let body = &bytes[IPV6_HEADER..];
        let body = match packet.get_payload_length() as usize {
            // jumbogram: length lives in a hop-by-hop option
            0 => body,
            len => &body[..len.min(body.len())],
        };

        let transport = skip_extension_headers(packet.get_next_header(), body)
            .and_then(|(protocol, payload)| dissect_transport(protocol, payload));

        Dissection {
            addresses,
            transport,
        }
    }
}

impl<'a> Dissection<'a> {
    fn empty() -> Self {
        Self {
            addresses: None,
            transport: None,
        }
    }

    /// Fields the filter engine matches on
    pub fn fields(&self) -> FrameFields {
        let (protocol, ports) = match &self.transport {
            Some(Transport::Tcp(tcp)) => (
                Some(Protocol::Tcp),
                Some((tcp.packet.get_source(), tcp.packet.get_destination())),
            ),
            Some(Transport::Udp(udp)) => (
                Some(Protocol::Udp),
                Some((udp.get_source(), udp.get_destination())),
            ),
            None => (None, None),
        };

        FrameFields {
            addresses: self.addresses,
            protocol,
            ports,
        }
    }

    /// Build the output record. Frames without TCP or UDP produce nothing.
    pub fn into_record(self, frame: &RawFrame) -> Option<OutputRecord> {
        let transport = self.transport?;
        let (source_address, destination_address) = self
            .addresses
            .map(|(src, dst)| (src.to_string(), dst.to_string()))
            .unwrap_or_default();

        let mut record = OutputRecord {
            timestamp: frame.timestamp_ms,
            frame_length: frame.length,
            source_address,
            destination_address,
            protocol: None,
            tcp: None,
            udp: None,
        };

        match transport {
            Transport::Tcp(tcp) => {
                record.protocol = Some(Protocol::Tcp);
                record.tcp = Some(tcp.into_segment());
            }
            Transport::Udp(udp) => {
                record.protocol = Some(Protocol::Udp);
                record.udp = Some(UdpDatagram {
                    source_port: udp.get_source(),
                    destination_port: udp.get_destination(),
                    length: udp.get_length(),
                    checksum: udp.get_checksum(),
                    payload: udp.packet()[UDP_HEADER..].to_vec(),
                });
            }
        }

        Some(record)
    }
}

impl<'a> TcpHeader<'a> {
    fn into_segment(self) -> TcpSegment {
        let raw = self.packet.packet();
        let flags = raw[13];

        TcpSegment {
            source_port: self.packet.get_source(),
            destination_port: self.packet.get_destination(),
            sequence: self.packet.get_sequence(),
            acknowledgment: self.packet.get_acknowledgement(),
            data_offset: self.packet.get_data_offset(),
            fin: flags & 0x01 != 0,
            syn: flags & 0x02 != 0,
            rst: flags & 0x04 != 0,
            psh: flags & 0x08 != 0,
            ack: flags & 0x10 != 0,
            urg: flags & 0x20 != 0,
            ece: flags & 0x40 != 0,
            cwr: flags & 0x80 != 0,
            ns: raw[12] & 0x01 != 0,
            window: self.packet.get_window(),
            checksum: self.packet.get_checksum(),
            urgent: self.packet.get_urgent_ptr(),
            payload: raw[self.header_len..].to_vec(),
            options: self.options,
            padding: self.padding.to_vec(),
        }
    }
}

fn by_ethertype(ethertype: EtherType, payload: &[u8]) -> Option<Network<'_>> {
    match ethertype {
        EtherTypes::Ipv4 => Some(Network::V4(payload)),
        EtherTypes::Ipv6 => Some(Network::V6(payload)),
        _ => None,
    }
}

/// Walk IPv6 extension headers up to the upper-layer protocol.
/// Returns `None` for non-initial fragments and truncated chains.
fn skip_extension_headers(
    mut protocol: IpNextHeaderProtocol,
    mut body: &[u8],
) -> Option<(IpNextHeaderProtocol, &[u8])> {
    loop {
        match protocol {
            IpNextHeaderProtocols::Hopopt
            | IpNextHeaderProtocols::Ipv6Route
            | IpNextHeaderProtocols::Ipv6Opts => {
                if body.len() < 2 {
                    return None;
                }
                let len = (body[1] as usize + 1) * 8;
                if len > body.len() {
                    return None;
                }
                protocol = IpNextHeaderProtocol(body[0]);
                body = &body[len..];
            }
            IpNextHeaderProtocols::Ipv6Frag => {
                if body.len() < 8 {
                    return None;
                }
                let offset = u16::from_be_bytes([body[2], body[3]]) >> 3;
                let more = body[3] & 0x01 != 0;
                if offset != 0 || more {
                    return None;
                }
                protocol = IpNextHeaderProtocol(body[0]);
                body = &body[8..];
            }
            _ => return Some((protocol, body)),
        }
    }
}

fn dissect_transport(protocol: IpNextHeaderProtocol, payload: &[u8]) -> Option<Transport<'_>> {
    match protocol {
        IpNextHeaderProtocols::Tcp => dissect_tcp(payload).map(Transport::Tcp),
        IpNextHeaderProtocols::Udp => UdpPacket::new(payload).map(Transport::Udp),
        _ => None,
    }
}

fn dissect_tcp(segment: &[u8]) -> Option<TcpHeader<'_>> {
    let packet = TcpPacket::new(segment)?;
    let header_len = packet.get_data_offset() as usize * 4;
    if header_len < TCP_MIN_HEADER || header_len > segment.len() {
        return None;
    }
    let (options, padding) = parse_tcp_options(&segment[TCP_MIN_HEADER..header_len])?;

    Some(TcpHeader {
        packet,
        header_len,
        options,
        padding,
    })
}

/// Parse the option area of a TCP header. Bytes following an end-of-list
/// option are returned as padding. A malformed option rejects the header.
fn parse_tcp_options(bytes: &[u8]) -> Option<(Vec<TcpOptionRecord>, &[u8])> {
    let mut options = Vec::new();
    let mut rest = bytes;

    while let Some(&kind) = rest.first() {
        match kind {
            TCP_OPTION_END => {
                options.push(TcpOptionRecord {
                    kind,
                    length: 1,
                    data: Vec::new(),
                });
                return Some((options, &rest[1..]));
            }
            TCP_OPTION_NOP => {
                options.push(TcpOptionRecord {
                    kind,
                    length: 1,
                    data: Vec::new(),
                });
                rest = &rest[1..];
            }
            _ => {
                let length = *rest.get(1)?;
                let len = length as usize;
                if len < 2 || len > rest.len() {
                    return None;
                }
                options.push(TcpOptionRecord {
                    kind,
                    length,
                    data: rest[2..len].to_vec(),
                });
                rest = &rest[len..];
            }
        }
    }

    Some((options, &[]))
}
