//! Frame parser
//!
//! Zero-copy decode of Ethernet → IPv4 → TCP/UDP/ICMP headers. Every layer
//! checks its minimum length before touching a byte, and payload views are
//! clamped to the end of the buffer. No checksum validation, no reassembly.

use crate::category::{Priority, TrafficCategory};
use crate::error::{FlowcastError, Layer, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Ethernet header length
pub const ETHERNET_HEADER_LEN: usize = 14;
/// Minimum IPv4 header length (IHL = 5)
pub const IPV4_MIN_HEADER_LEN: usize = 20;
/// Fixed TCP portion decoded before options (ports, seq, ack, offset/flags)
pub const TCP_FIXED_LEN: usize = 14;
/// Minimum TCP header length (data offset = 5)
pub const TCP_MIN_HEADER_LEN: usize = 20;
/// UDP header length
pub const UDP_HEADER_LEN: usize = 8;
/// ICMP type, code and checksum
pub const ICMP_HEADER_LEN: usize = 4;

/// EtherType for IPv4
pub const ETHERTYPE_IPV4: u16 = 0x0800;
/// IP protocol numbers
pub const IPPROTO_ICMP: u8 = 1;
/// TCP
pub const IPPROTO_TCP: u8 = 6;
/// UDP
pub const IPPROTO_UDP: u8 = 17;

/// Raw captured frame
///
/// Immutable once captured. Cloning shares the underlying buffer.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Capture timestamp
    pub timestamp: DateTime<Utc>,
    data: Bytes,
}

impl RawFrame {
    /// Wrap captured bytes
    pub fn new(timestamp: DateTime<Utc>, data: impl Into<Bytes>) -> Self {
        Self { timestamp, data: data.into() }
    }

    /// Wrap bytes captured now
    pub fn now(data: impl Into<Bytes>) -> Self {
        Self::new(Utc::now(), data)
    }

    /// Frame bytes
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Captured length
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the frame is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// MAC address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Ethernet II header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    /// Destination MAC
    pub destination: MacAddr,
    /// Source MAC
    pub source: MacAddr,
    /// EtherType
    pub ethertype: u16,
}

impl EthernetHeader {
    /// Decode the header, returning it with the remaining bytes
    pub fn parse(data: &[u8]) -> Result<(Self, &[u8])> {
        if data.len() < ETHERNET_HEADER_LEN {
            return Err(FlowcastError::malformed(
                Layer::Ethernet,
                ETHERNET_HEADER_LEN,
                data.len(),
            ));
        }

        let mut destination = [0u8; 6];
        let mut source = [0u8; 6];
        destination.copy_from_slice(&data[0..6]);
        source.copy_from_slice(&data[6..12]);

        let header = Self {
            destination: MacAddr(destination),
            source: MacAddr(source),
            ethertype: u16::from_be_bytes([data[12], data[13]]),
        };
        Ok((header, &data[ETHERNET_HEADER_LEN..]))
    }
}

/// IPv4 header (fixed part) with a view of its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header<'a> {
    /// Version nibble
    pub version: u8,
    /// Header length in bytes (IHL × 4)
    pub header_len: usize,
    /// Time to live
    pub ttl: u8,
    /// Protocol number
    pub protocol: u8,
    /// Source address
    pub source: Ipv4Addr,
    /// Destination address
    pub destination: Ipv4Addr,
    /// Bytes after the header (options skipped)
    pub payload: &'a [u8],
}

impl<'a> Ipv4Header<'a> {
    /// Decode from the start of `data`
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < IPV4_MIN_HEADER_LEN {
            return Err(FlowcastError::malformed(
                Layer::Ipv4,
                IPV4_MIN_HEADER_LEN,
                data.len(),
            ));
        }

        let version = data[0] >> 4;
        let header_len = ((data[0] & 0x0F) as usize) * 4;
        if header_len < IPV4_MIN_HEADER_LEN {
            return Err(FlowcastError::malformed(
                Layer::Ipv4,
                IPV4_MIN_HEADER_LEN,
                header_len,
            ));
        }
        if data.len() < header_len {
            return Err(FlowcastError::malformed(Layer::Ipv4, header_len, data.len()));
        }

        Ok(Self {
            version,
            header_len,
            ttl: data[8],
            protocol: data[9],
            source: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
            destination: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
            payload: &data[header_len..],
        })
    }
}

/// TCP control flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TcpFlags {
    /// Urgent pointer significant
    pub urg: bool,
    /// Acknowledgment significant
    pub ack: bool,
    /// Push
    pub psh: bool,
    /// Reset
    pub rst: bool,
    /// Synchronize
    pub syn: bool,
    /// Finish
    pub fin: bool,
}

impl TcpFlags {
    /// Decode bits 5..0 of the flags byte (URG, ACK, PSH, RST, SYN, FIN)
    #[inline]
    pub const fn from_bits(bits: u8) -> Self {
        Self {
            urg: bits & 0x20 != 0,
            ack: bits & 0x10 != 0,
            psh: bits & 0x08 != 0,
            rst: bits & 0x04 != 0,
            syn: bits & 0x02 != 0,
            fin: bits & 0x01 != 0,
        }
    }

    /// Encode back into the low six bits
    pub const fn bits(&self) -> u8 {
        (self.urg as u8) << 5
            | (self.ack as u8) << 4
            | (self.psh as u8) << 3
            | (self.rst as u8) << 2
            | (self.syn as u8) << 1
            | (self.fin as u8)
    }
}

/// TCP segment header with payload view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpSegment<'a> {
    /// Source port
    pub source_port: u16,
    /// Destination port
    pub destination_port: u16,
    /// Sequence number
    pub sequence: u32,
    /// Acknowledgment number
    pub acknowledgment: u32,
    /// Data offset in bytes (top nibble × 4)
    pub data_offset: usize,
    /// Control flags
    pub flags: TcpFlags,
    /// Bytes after the header
    pub payload: &'a [u8],
}

impl<'a> TcpSegment<'a> {
    /// Decode from an IPv4 payload
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < TCP_FIXED_LEN {
            return Err(FlowcastError::malformed(Layer::Tcp, TCP_FIXED_LEN, data.len()));
        }

        let offset_flags = u16::from_be_bytes([data[12], data[13]]);
        let data_offset = ((offset_flags >> 12) as usize) * 4;
        let start = data_offset.max(TCP_MIN_HEADER_LEN).min(data.len());

        Ok(Self {
            source_port: u16::from_be_bytes([data[0], data[1]]),
            destination_port: u16::from_be_bytes([data[2], data[3]]),
            sequence: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            acknowledgment: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            data_offset,
            flags: TcpFlags::from_bits((offset_flags & 0x00FF) as u8),
            payload: &data[start..],
        })
    }
}

/// UDP datagram header with payload view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpSegment<'a> {
    /// Source port
    pub source_port: u16,
    /// Destination port
    pub destination_port: u16,
    /// Declared length (header + data)
    pub length: u16,
    /// Bytes after the header
    pub payload: &'a [u8],
}

impl<'a> UdpSegment<'a> {
    /// Decode from an IPv4 payload
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < UDP_HEADER_LEN {
            return Err(FlowcastError::malformed(Layer::Udp, UDP_HEADER_LEN, data.len()));
        }

        Ok(Self {
            source_port: u16::from_be_bytes([data[0], data[1]]),
            destination_port: u16::from_be_bytes([data[2], data[3]]),
            length: u16::from_be_bytes([data[4], data[5]]),
            payload: &data[UDP_HEADER_LEN..],
        })
    }
}

/// ICMP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpHeader {
    /// Message type
    pub icmp_type: u8,
    /// Message code
    pub code: u8,
    /// Checksum as carried (not verified)
    pub checksum: u16,
}

impl IcmpHeader {
    /// Decode from an IPv4 payload
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < ICMP_HEADER_LEN {
            return Err(FlowcastError::malformed(Layer::Icmp, ICMP_HEADER_LEN, data.len()));
        }

        Ok(Self {
            icmp_type: data[0],
            code: data[1],
            checksum: u16::from_be_bytes([data[2], data[3]]),
        })
    }
}

/// Transport-layer summary kept on a parsed packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Transport {
    /// TCP segment
    Tcp {
        /// Sequence number
        sequence: u32,
        /// Acknowledgment number
        acknowledgment: u32,
        /// Control flags
        flags: TcpFlags,
    },
    /// UDP datagram
    Udp {
        /// Declared length
        length: u16,
    },
    /// ICMP message
    Icmp {
        /// Message type
        icmp_type: u8,
        /// Message code
        code: u8,
    },
    /// IPv4 with another protocol, or a non-IPv4 frame
    Other,
}

/// Decoded packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedPacket {
    /// Capture timestamp
    pub timestamp: DateTime<Utc>,
    /// Link-layer EtherType
    pub ethertype: u16,
    /// Source address (IPv4 only)
    pub source_ip: Option<Ipv4Addr>,
    /// Destination address (IPv4 only)
    pub destination_ip: Option<Ipv4Addr>,
    /// IP protocol number (IPv4 only)
    pub protocol: Option<u8>,
    /// Time to live (IPv4 only)
    pub ttl: Option<u8>,
    /// Whole frame length in bytes
    pub size: usize,
    /// Source port (TCP/UDP only)
    pub source_port: Option<u16>,
    /// Destination port (TCP/UDP only)
    pub destination_port: Option<u16>,
    /// Transport summary
    pub transport: Transport,
    /// Traffic category (`Unknown` until classified)
    pub category: TrafficCategory,
    /// Priority (0 until classified)
    pub priority: Priority,
}

impl ParsedPacket {
    /// Decode a captured frame
    pub fn parse(frame: &RawFrame) -> Result<Self> {
        Self::parse_bytes(frame.data(), frame.timestamp)
    }

    /// Decode raw bytes captured at `timestamp`
    pub fn parse_bytes(data: &[u8], timestamp: DateTime<Utc>) -> Result<Self> {
        let (eth, l3) = EthernetHeader::parse(data)?;

        let mut packet = Self {
            timestamp,
            ethertype: eth.ethertype,
            source_ip: None,
            destination_ip: None,
            protocol: None,
            ttl: None,
            size: data.len(),
            source_port: None,
            destination_port: None,
            transport: Transport::Other,
            category: TrafficCategory::Unknown,
            priority: 0,
        };

        if eth.ethertype != ETHERTYPE_IPV4 {
            return Ok(packet);
        }

        let ip = Ipv4Header::parse(l3)?;
        packet.source_ip = Some(ip.source);
        packet.destination_ip = Some(ip.destination);
        packet.protocol = Some(ip.protocol);
        packet.ttl = Some(ip.ttl);

        match ip.protocol {
            IPPROTO_TCP => {
                let tcp = TcpSegment::parse(ip.payload)?;
                packet.source_port = Some(tcp.source_port);
                packet.destination_port = Some(tcp.destination_port);
                packet.transport = Transport::Tcp {
                    sequence: tcp.sequence,
                    acknowledgment: tcp.acknowledgment,
                    flags: tcp.flags,
                };
            }
            IPPROTO_UDP => {
                let udp = UdpSegment::parse(ip.payload)?;
                packet.source_port = Some(udp.source_port);
                packet.destination_port = Some(udp.destination_port);
                packet.transport = Transport::Udp { length: udp.length };
            }
            IPPROTO_ICMP => {
                let icmp = IcmpHeader::parse(ip.payload)?;
                packet.transport = Transport::Icmp {
                    icmp_type: icmp.icmp_type,
                    code: icmp.code,
                };
            }
            _ => {}
        }

        Ok(packet)
    }

    /// Whether the frame carried IPv4
    pub fn is_ipv4(&self) -> bool {
        self.ethertype == ETHERTYPE_IPV4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::FrameBuilder;
    use proptest::prelude::*;

    #[test]
    fn test_parse_tcp_frame() {
        let frame = FrameBuilder::tcp([192, 168, 1, 1], [10, 0, 0, 1], 12345, 443)
            .flags(TcpFlags { syn: true, ack: true, ..Default::default() })
            .sequence(1000)
            .acknowledgment(2000)
            .payload(b"hello")
            .build();

        let packet = ParsedPacket::parse(&frame).unwrap();
        assert_eq!(packet.source_ip, Some(Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(packet.destination_ip, Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(packet.protocol, Some(IPPROTO_TCP));
        assert_eq!(packet.source_port, Some(12345));
        assert_eq!(packet.destination_port, Some(443));
        assert_eq!(packet.size, frame.len());
        match packet.transport {
            Transport::Tcp { sequence, acknowledgment, flags } => {
                assert_eq!(sequence, 1000);
                assert_eq!(acknowledgment, 2000);
                assert!(flags.syn && flags.ack);
                assert!(!flags.fin && !flags.rst && !flags.psh && !flags.urg);
            }
            other => panic!("expected tcp, got {:?}", other),
        }
    }

    #[test]
    fn test_tcp_payload_view() {
        let frame = FrameBuilder::tcp([1, 1, 1, 1], [2, 2, 2, 2], 1, 2)
            .payload(b"abc")
            .build();
        let ip = Ipv4Header::parse(&frame.data()[ETHERNET_HEADER_LEN..]).unwrap();
        let tcp = TcpSegment::parse(ip.payload).unwrap();
        assert_eq!(tcp.data_offset, 20);
        assert_eq!(tcp.payload, b"abc");
    }

    #[test]
    fn test_flag_bit_positions() {
        let flags = TcpFlags::from_bits(0b0010_0001);
        assert!(flags.urg);
        assert!(flags.fin);
        assert!(!flags.ack && !flags.psh && !flags.rst && !flags.syn);
        assert_eq!(flags.bits(), 0b0010_0001);
    }

    #[test]
    fn test_parse_udp_frame() {
        let frame = FrameBuilder::udp([10, 0, 0, 5], [8, 8, 8, 8], 40000, 53)
            .payload(&[0u8; 12])
            .build();
        let packet = ParsedPacket::parse(&frame).unwrap();
        assert_eq!(packet.destination_port, Some(53));
        assert_eq!(packet.transport, Transport::Udp { length: 20 });
    }

    #[test]
    fn test_parse_icmp_frame() {
        let frame = FrameBuilder::icmp([10, 0, 0, 5], [10, 0, 0, 1], 8, 0).build();
        let packet = ParsedPacket::parse(&frame).unwrap();
        assert_eq!(packet.protocol, Some(IPPROTO_ICMP));
        assert_eq!(packet.source_port, None);
        assert_eq!(packet.transport, Transport::Icmp { icmp_type: 8, code: 0 });
    }

    #[test]
    fn test_non_ipv4_is_unknown() {
        let mut data = vec![0u8; 60];
        data[12] = 0x86;
        data[13] = 0xDD; // IPv6
        let packet = ParsedPacket::parse(&RawFrame::now(data)).unwrap();
        assert_eq!(packet.ethertype, 0x86DD);
        assert_eq!(packet.category, TrafficCategory::Unknown);
        assert_eq!(packet.source_port, None);
        assert_eq!(packet.source_ip, None);
        assert_eq!(packet.size, 60);
    }

    #[test]
    fn test_ipv4_options_skipped() {
        let frame = FrameBuilder::udp([1, 2, 3, 4], [5, 6, 7, 8], 5060, 5060)
            .ip_options(&[0x01; 8])
            .build();
        let ip = Ipv4Header::parse(&frame.data()[ETHERNET_HEADER_LEN..]).unwrap();
        assert_eq!(ip.header_len, 28);
        let packet = ParsedPacket::parse(&frame).unwrap();
        assert_eq!(packet.source_port, Some(5060));
    }

    #[test]
    fn test_truncated_layers() {
        let tcp = FrameBuilder::tcp([1, 1, 1, 1], [2, 2, 2, 2], 1, 2).build();
        // Ethernet + IPv4 + 10 bytes of TCP
        let short = RawFrame::now(tcp.data()[..ETHERNET_HEADER_LEN + 20 + 10].to_vec());
        match ParsedPacket::parse(&short) {
            Err(FlowcastError::MalformedFrame { layer, needed, actual }) => {
                assert_eq!(layer, Layer::Tcp);
                assert_eq!(needed, TCP_FIXED_LEN);
                assert_eq!(actual, 10);
            }
            other => panic!("expected malformed tcp, got {:?}", other),
        }

        let udp = FrameBuilder::udp([1, 1, 1, 1], [2, 2, 2, 2], 1, 2).build();
        let short = RawFrame::now(udp.data()[..ETHERNET_HEADER_LEN + 20 + 4].to_vec());
        assert!(matches!(
            ParsedPacket::parse(&short),
            Err(FlowcastError::MalformedFrame { layer: Layer::Udp, .. })
        ));

        let short = RawFrame::now(udp.data()[..ETHERNET_HEADER_LEN + 12].to_vec());
        assert!(matches!(
            ParsedPacket::parse(&short),
            Err(FlowcastError::MalformedFrame { layer: Layer::Ipv4, .. })
        ));
    }

    #[test]
    fn test_ihl_beyond_buffer() {
        let mut data = FrameBuilder::udp([1, 1, 1, 1], [2, 2, 2, 2], 1, 2)
            .frame_size(ETHERNET_HEADER_LEN + 64)
            .build_bytes();
        data[ETHERNET_HEADER_LEN] = 0x4F; // IHL = 15 → 60 bytes
        data.truncate(ETHERNET_HEADER_LEN + 40);
        assert_eq!(data.len(), ETHERNET_HEADER_LEN + 40);
        assert!(matches!(
            ParsedPacket::parse(&RawFrame::now(data)),
            Err(FlowcastError::MalformedFrame { layer: Layer::Ipv4, needed: 60, actual: 40 })
        ));
    }

    #[test]
    fn test_ihl_below_minimum() {
        let mut data = FrameBuilder::udp([1, 1, 1, 1], [2, 2, 2, 2], 1, 2).build().data().to_vec();
        data[ETHERNET_HEADER_LEN] = 0x43; // IHL = 3
        assert!(matches!(
            ParsedPacket::parse(&RawFrame::now(data)),
            Err(FlowcastError::MalformedFrame { layer: Layer::Ipv4, .. })
        ));
    }

    #[test]
    fn test_tcp_offset_beyond_segment() {
        let mut data = FrameBuilder::tcp([1, 1, 1, 1], [2, 2, 2, 2], 80, 8080).build().data().to_vec();
        data[ETHERNET_HEADER_LEN + 20 + 12] = 0xF0; // data offset 60 > 20 available
        let ip = Ipv4Header::parse(&data[ETHERNET_HEADER_LEN..]).unwrap();
        let tcp = TcpSegment::parse(ip.payload).unwrap();
        assert_eq!(tcp.data_offset, 60);
        assert!(tcp.payload.is_empty());
    }

    proptest! {
        #[test]
        fn prop_tcp_round_trip(
            src in any::<[u8; 4]>(),
            dst in any::<[u8; 4]>(),
            sport in any::<u16>(),
            dport in any::<u16>(),
            seq in any::<u32>(),
            bits in 0u8..64,
        ) {
            let frame = FrameBuilder::tcp(src, dst, sport, dport)
                .sequence(seq)
                .flags(TcpFlags::from_bits(bits))
                .build();
            let packet = ParsedPacket::parse(&frame).unwrap();
            prop_assert_eq!(packet.source_ip, Some(Ipv4Addr::from(src)));
            prop_assert_eq!(packet.destination_ip, Some(Ipv4Addr::from(dst)));
            prop_assert_eq!(packet.source_port, Some(sport));
            prop_assert_eq!(packet.destination_port, Some(dport));
            match packet.transport {
                Transport::Tcp { sequence, flags, .. } => {
                    prop_assert_eq!(sequence, seq);
                    prop_assert_eq!(flags.bits(), bits);
                }
                _ => prop_assert!(false, "expected tcp"),
            }
        }

        #[test]
        fn prop_short_buffers_rejected(data in proptest::collection::vec(any::<u8>(), 0..ETHERNET_HEADER_LEN)) {
            let result = ParsedPacket::parse_bytes(&data, Utc::now());
            let is_ethernet_malformed = matches!(
                result,
                Err(FlowcastError::MalformedFrame { layer: Layer::Ethernet, .. })
            );
            prop_assert!(is_ethernet_malformed);
        }

        #[test]
        fn prop_parse_never_panics(data in proptest::collection::vec(any::<u8>(), 0..128)) {
            let _ = ParsedPacket::parse_bytes(&data, Utc::now());
        }
    }
}
