use chrono::{DateTime, Utc};
use std::net::IpAddr;

/// A decoded packet from a capture file
#[derive(Debug, Clone)]
pub struct Packet {
    /// Capture timestamp from the pcap record header
    pub timestamp: DateTime<Utc>,

    /// Length of the captured frame in bytes
    pub length: usize,

    /// Protocol (e.g., TCP, UDP, ICMP)
    pub protocol: String,

    /// Source IP address
    pub source_ip: Option<IpAddr>,

    /// Destination IP address
    pub destination_ip: Option<IpAddr>,

    /// Source port (for TCP/UDP)
    pub source_port: Option<u16>,

    /// Destination port (for TCP/UDP)
    pub destination_port: Option<u16>,

    /// Transport payload (application data)
    pub payload: Option<Vec<u8>>,
}

impl Packet {
    /// An undecoded packet: counted, but carries no protocol data
    pub fn opaque(timestamp: DateTime<Utc>, length: usize) -> Self {
        Self {
            timestamp,
            length,
            protocol: "Unknown".to_string(),
            source_ip: None,
            destination_ip: None,
            source_port: None,
            destination_port: None,
            payload: None,
        }
    }

    /// Whether this is a TCP segment with a non-empty payload
    pub fn has_tcp_payload(&self) -> bool {
        self.protocol == "TCP" && self.payload.as_ref().map_or(false, |p| !p.is_empty())
    }

    /// Payload bytes, empty if there are none
    pub fn payload_bytes(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or(&[])
    }
}
