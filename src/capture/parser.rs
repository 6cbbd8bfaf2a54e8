use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use log::{log_enabled, trace, Level};
use pnet::packet::{
    ethernet::{EtherType, EtherTypes, EthernetPacket},
    ip::{IpNextHeaderProtocol, IpNextHeaderProtocols},
    ipv4::Ipv4Packet,
    ipv6::Ipv6Packet,
    sll::SLLPacket,
    tcp::TcpPacket,
    udp::UdpPacket,
    Packet as PnetPacket,
};
use std::net::IpAddr;

use crate::models::packet::Packet;

/// Link layer framing of a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Ethernet,
    /// Linux cooked capture, as written by `tcpdump -i any`
    LinuxSll,
    RawIp,
}

impl LinkKind {
    /// Map a pcap link type number to a supported framing
    pub fn from_linktype(linktype: i32) -> Option<Self> {
        match linktype {
            1 => Some(LinkKind::Ethernet),
            113 => Some(LinkKind::LinuxSll),
            // DLT_RAW values differ between platforms
            12 | 14 | 101 => Some(LinkKind::RawIp),
            _ => None,
        }
    }
}

/// Decodes captured frames down to the TCP payload
pub struct PacketParser {
    link: LinkKind,
}

impl PacketParser {
    /// Create a new packet parser for the given framing
    pub fn new(link: LinkKind) -> Self {
        Self { link }
    }

    /// Parse one captured frame into a Packet
    pub fn parse_packet(&self, data: &[u8], timestamp: DateTime<Utc>) -> Result<Packet> {
        let mut packet = Packet::opaque(timestamp, data.len());

        match self.link {
            LinkKind::Ethernet => {
                let eth = EthernetPacket::new(data).ok_or_else(|| anyhow!("Failed to parse Ethernet frame"))?;
                self.parse_ethertype(eth.get_ethertype(), eth.payload(), &mut packet)?;
            }
            LinkKind::LinuxSll => {
                let sll = SLLPacket::new(data).ok_or_else(|| anyhow!("Failed to parse Linux cooked frame"))?;
                self.parse_ethertype(sll.get_protocol(), sll.payload(), &mut packet)?;
            }
            LinkKind::RawIp => match data.first().map(|b| b >> 4) {
                Some(4) => self.parse_ipv4(data, &mut packet)?,
                Some(6) => self.parse_ipv6(data, &mut packet)?,
                _ => return Err(anyhow!("Raw frame is not IPv4 or IPv6")),
            },
        }

        Ok(packet)
    }

    fn parse_ethertype(&self, ethertype: EtherType, data: &[u8], packet: &mut Packet) -> Result<()> {
        if log_enabled!(Level::Trace) {
            trace!("EtherType: {:?}, {} bytes", ethertype, data.len());
        }

        match ethertype {
            EtherTypes::Ipv4 => self.parse_ipv4(data, packet),
            EtherTypes::Ipv6 => self.parse_ipv6(data, packet),
            _ => {
                packet.protocol = format!("Other ({:?})", ethertype);
                Ok(())
            }
        }
    }

    /// Parse IPv4 packet
    fn parse_ipv4(&self, data: &[u8], packet: &mut Packet) -> Result<()> {
        let ipv4 = Ipv4Packet::new(data).ok_or_else(|| anyhow!("Failed to parse IPv4 packet"))?;

        packet.source_ip = Some(IpAddr::V4(ipv4.get_source()));
        packet.destination_ip = Some(IpAddr::V4(ipv4.get_destination()));

        // Trim link layer padding using the IP total length
        let header_len = ipv4.get_header_length() as usize * 4;
        let end = (ipv4.get_total_length() as usize).min(data.len());
        let payload = data.get(header_len..end).unwrap_or(&[]);

        self.parse_transport_protocol(ipv4.get_next_level_protocol(), payload, packet)
    }

    /// Parse IPv6 packet
    fn parse_ipv6(&self, data: &[u8], packet: &mut Packet) -> Result<()> {
        let ipv6 = Ipv6Packet::new(data).ok_or_else(|| anyhow!("Failed to parse IPv6 packet"))?;

        packet.source_ip = Some(IpAddr::V6(ipv6.get_source()));
        packet.destination_ip = Some(IpAddr::V6(ipv6.get_destination()));

        self.parse_transport_protocol(ipv6.get_next_header(), ipv6.payload(), packet)
    }

    /// Parse transport layer protocols
    fn parse_transport_protocol(&self, proto: IpNextHeaderProtocol, data: &[u8], packet: &mut Packet) -> Result<()> {
        match proto {
            IpNextHeaderProtocols::Tcp => self.parse_tcp(data, packet),
            IpNextHeaderProtocols::Udp => self.parse_udp(data, packet),
            IpNextHeaderProtocols::Icmp | IpNextHeaderProtocols::Icmpv6 => {
                packet.protocol = "ICMP".to_string();
                Ok(())
            }
            _ => {
                packet.protocol = format!("IP({:?})", proto);
                Ok(())
            }
        }
    }

    /// Parse TCP segment
    fn parse_tcp(&self, data: &[u8], packet: &mut Packet) -> Result<()> {
        let tcp = TcpPacket::new(data).ok_or_else(|| anyhow!("Failed to parse TCP segment"))?;

        packet.protocol = "TCP".to_string();
        packet.source_port = Some(tcp.get_source());
        packet.destination_port = Some(tcp.get_destination());

        if log_enabled!(Level::Trace) {
            trace!(
                "TCP - src port: {}, dst port: {}, payload: {} bytes",
                tcp.get_source(),
                tcp.get_destination(),
                tcp.payload().len()
            );
        }

        if !tcp.payload().is_empty() {
            packet.payload = Some(tcp.payload().to_vec());
        }

        Ok(())
    }

    /// Parse UDP datagram; its payload is never queue traffic
    fn parse_udp(&self, data: &[u8], packet: &mut Packet) -> Result<()> {
        let udp = UdpPacket::new(data).ok_or_else(|| anyhow!("Failed to parse UDP datagram"))?;

        packet.protocol = "UDP".to_string();
        packet.source_port = Some(udp.get_source());
        packet.destination_port = Some(udp.get_destination());

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Ethernet + IPv4 + TCP frame carrying `payload`
    pub(crate) fn ethernet_tcp_frame(src: [u8; 4], dst_port: u16, payload: &[u8]) -> Vec<u8> {
        let mut frame = Vec::new();
        frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 0x01]);
        frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 0x02]);
        frame.extend_from_slice(&[0x08, 0x00]);

        let total_len = (20 + 20 + payload.len()) as u16;
        frame.extend_from_slice(&[0x45, 0x00]);
        frame.extend_from_slice(&total_len.to_be_bytes());
        frame.extend_from_slice(&[0, 0, 0x40, 0x00, 64, 6, 0, 0]);
        frame.extend_from_slice(&src);
        frame.extend_from_slice(&[10, 0, 0, 1]);

        frame.extend_from_slice(&40000u16.to_be_bytes());
        frame.extend_from_slice(&dst_port.to_be_bytes());
        frame.extend_from_slice(&[0, 0, 0, 1, 0, 0, 0, 0]);
        frame.extend_from_slice(&[0x50, 0x18, 0xff, 0xff, 0, 0, 0, 0]);

        frame.extend_from_slice(payload);
        frame
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn ethernet_tcp_payload_is_extracted() {
        let frame = ethernet_tcp_frame([10, 0, 0, 5], 22133, b"get jobs/open\r\n");
        let packet = PacketParser::new(LinkKind::Ethernet).parse_packet(&frame, now()).unwrap();

        assert_eq!(packet.protocol, "TCP");
        assert_eq!(packet.source_ip, Some("10.0.0.5".parse().unwrap()));
        assert_eq!(packet.destination_port, Some(22133));
        assert_eq!(packet.payload_bytes(), b"get jobs/open\r\n");
        assert!(packet.has_tcp_payload());
    }

    #[test]
    fn ethernet_padding_is_not_payload() {
        let mut frame = ethernet_tcp_frame([10, 0, 0, 5], 22133, b"");
        frame.extend_from_slice(&[0u8; 6]);
        let packet = PacketParser::new(LinkKind::Ethernet).parse_packet(&frame, now()).unwrap();

        assert_eq!(packet.protocol, "TCP");
        assert!(!packet.has_tcp_payload());
    }

    #[test]
    fn raw_ip_frames_skip_the_link_header() {
        let frame = ethernet_tcp_frame([192, 168, 1, 2], 22133, b"set q 0 0 1\r\nx\r\n");
        let packet = PacketParser::new(LinkKind::RawIp).parse_packet(&frame[14..], now()).unwrap();

        assert_eq!(packet.source_ip, Some("192.168.1.2".parse().unwrap()));
        assert_eq!(packet.payload_bytes(), b"set q 0 0 1\r\nx\r\n");
    }

    #[test]
    fn truncated_frame_is_an_error() {
        assert!(PacketParser::new(LinkKind::Ethernet).parse_packet(&[0u8; 6], now()).is_err());
    }

    #[test]
    fn known_link_types() {
        assert_eq!(LinkKind::from_linktype(1), Some(LinkKind::Ethernet));
        assert_eq!(LinkKind::from_linktype(113), Some(LinkKind::LinuxSll));
        assert_eq!(LinkKind::from_linktype(101), Some(LinkKind::RawIp));
        assert_eq!(LinkKind::from_linktype(105), None);
    }
}
