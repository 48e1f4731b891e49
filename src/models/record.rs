use serde::{Serialize, Serializer};

use crate::models::filter::Protocol;

/// One decoded frame as streamed to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputRecord {
    /// Capture time, milliseconds since the epoch
    pub timestamp: i64,

    /// Length of the frame on the wire (may exceed the captured bytes)
    #[serde(rename = "packet_size")]
    pub frame_length: u32,

    /// Empty when the frame had no IP header
    #[serde(rename = "src_ip")]
    pub source_address: String,

    #[serde(rename = "dst_ip")]
    pub destination_address: String,

    #[serde(rename = "proto", serialize_with = "protocol_tag")]
    pub protocol: Option<Protocol>,

    pub tcp: Option<TcpSegment>,

    pub udp: Option<UdpDatagram>,
}

/// Decoded TCP header and payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TcpSegment {
    #[serde(rename = "src")]
    pub source_port: u16,

    #[serde(rename = "dst")]
    pub destination_port: u16,

    #[serde(rename = "seq")]
    pub sequence: u32,

    #[serde(rename = "ack")]
    pub acknowledgment: u32,

    /// Header length in 32-bit words
    pub data_offset: u8,

    #[serde(rename = "FIN")]
    pub fin: bool,
    #[serde(rename = "SYN")]
    pub syn: bool,
    #[serde(rename = "RST")]
    pub rst: bool,
    #[serde(rename = "PSH")]
    pub psh: bool,
    #[serde(rename = "ACK")]
    pub ack: bool,
    #[serde(rename = "URG")]
    pub urg: bool,
    #[serde(rename = "ECE")]
    pub ece: bool,
    #[serde(rename = "CWR")]
    pub cwr: bool,
    #[serde(rename = "NS")]
    pub ns: bool,

    pub window: u16,

    pub checksum: u16,

    pub urgent: u16,

    #[serde(serialize_with = "base64_bytes")]
    pub payload: Vec<u8>,

    /// Options in wire order
    pub options: Vec<TcpOptionRecord>,

    /// Bytes after an end-of-options marker, up to the data offset
    #[serde(serialize_with = "base64_bytes")]
    pub padding: Vec<u8>,
}

/// A single TCP option, kept verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TcpOptionRecord {
    #[serde(rename = "type")]
    pub kind: u8,

    pub length: u8,

    #[serde(serialize_with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// Decoded UDP header and payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UdpDatagram {
    #[serde(rename = "src")]
    pub source_port: u16,

    #[serde(rename = "dst")]
    pub destination_port: u16,

    pub length: u16,

    pub checksum: u16,

    #[serde(serialize_with = "base64_bytes")]
    pub payload: Vec<u8>,
}

fn protocol_tag<S: Serializer>(protocol: &Option<Protocol>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(protocol.map(|p| p.as_str()).unwrap_or(""))
}

fn base64_bytes<T: AsRef<[u8]>, S: Serializer>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error> {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    serializer.serialize_str(&STANDARD.encode(bytes.as_ref()))
}
