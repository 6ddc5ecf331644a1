//! Frame encoder for fixtures
//!
//! Builds Ethernet/IPv4/TCP/UDP/ICMP frames byte-for-byte so the parser,
//! the fixture frame source and the benchmarks can run without a live
//! interface. Checksums are left zero.

use crate::packet::{RawFrame, TcpFlags, ETHERTYPE_IPV4, IPPROTO_ICMP, IPPROTO_TCP, IPPROTO_UDP};
use bytes::{BufMut, BytesMut};
use chrono::{DateTime, Utc};

const SRC_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
const DST_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x02];

#[derive(Debug, Clone, Copy)]
enum L4 {
    Tcp { source_port: u16, destination_port: u16 },
    Udp { source_port: u16, destination_port: u16 },
    Icmp { icmp_type: u8, code: u8 },
}

/// Builder for a single IPv4 frame
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    source: [u8; 4],
    destination: [u8; 4],
    l4: L4,
    ttl: u8,
    sequence: u32,
    acknowledgment: u32,
    flags: TcpFlags,
    ip_options: Vec<u8>,
    payload: Vec<u8>,
    timestamp: Option<DateTime<Utc>>,
}

impl FrameBuilder {
    fn new(source: [u8; 4], destination: [u8; 4], l4: L4) -> Self {
        Self {
            source,
            destination,
            l4,
            ttl: 64,
            sequence: 0,
            acknowledgment: 0,
            flags: TcpFlags::default(),
            ip_options: Vec::new(),
            payload: Vec::new(),
            timestamp: None,
        }
    }

    /// TCP segment between two endpoints
    pub fn tcp(source: [u8; 4], destination: [u8; 4], source_port: u16, destination_port: u16) -> Self {
        Self::new(source, destination, L4::Tcp { source_port, destination_port })
    }

    /// UDP datagram between two endpoints
    pub fn udp(source: [u8; 4], destination: [u8; 4], source_port: u16, destination_port: u16) -> Self {
        Self::new(source, destination, L4::Udp { source_port, destination_port })
    }

    /// ICMP message
    pub fn icmp(source: [u8; 4], destination: [u8; 4], icmp_type: u8, code: u8) -> Self {
        Self::new(source, destination, L4::Icmp { icmp_type, code })
    }

    /// TCP sequence number
    pub fn sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    /// TCP acknowledgment number
    pub fn acknowledgment(mut self, acknowledgment: u32) -> Self {
        self.acknowledgment = acknowledgment;
        self
    }

    /// TCP flags
    pub fn flags(mut self, flags: TcpFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Time to live
    pub fn ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    /// IPv4 options, zero-padded to a 4-byte boundary (max 40 bytes)
    pub fn ip_options(mut self, options: &[u8]) -> Self {
        let mut options = options.to_vec();
        options.truncate(40);
        while options.len() % 4 != 0 {
            options.push(0);
        }
        self.ip_options = options;
        self
    }

    /// Transport payload
    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    /// Pad the payload so the whole frame is `size` bytes
    pub fn frame_size(mut self, size: usize) -> Self {
        let current = self.encoded_len();
        if size > current {
            self.payload.resize(self.payload.len() + size - current, 0);
        }
        self
    }

    /// Capture timestamp
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    fn l4_header_len(&self) -> usize {
        match self.l4 {
            L4::Tcp { .. } => 20,
            L4::Udp { .. } | L4::Icmp { .. } => 8,
        }
    }

    fn encoded_len(&self) -> usize {
        14 + 20 + self.ip_options.len() + self.l4_header_len() + self.payload.len()
    }

    /// Encode to bytes
    pub fn build_bytes(&self) -> Vec<u8> {
        let ip_header_len = 20 + self.ip_options.len();
        let l4_len = self.l4_header_len() + self.payload.len();
        let mut buf = BytesMut::with_capacity(self.encoded_len());

        // Ethernet
        buf.put_slice(&DST_MAC);
        buf.put_slice(&SRC_MAC);
        buf.put_u16(ETHERTYPE_IPV4);

        // IPv4
        let protocol = match self.l4 {
            L4::Tcp { .. } => IPPROTO_TCP,
            L4::Udp { .. } => IPPROTO_UDP,
            L4::Icmp { .. } => IPPROTO_ICMP,
        };
        buf.put_u8(0x40 | (ip_header_len / 4) as u8);
        buf.put_u8(0);
        buf.put_u16((ip_header_len + l4_len) as u16);
        buf.put_u16(0);
        buf.put_u16(0x4000);
        buf.put_u8(self.ttl);
        buf.put_u8(protocol);
        buf.put_u16(0);
        buf.put_slice(&self.source);
        buf.put_slice(&self.destination);
        buf.put_slice(&self.ip_options);

        match self.l4 {
            L4::Tcp { source_port, destination_port } => {
                buf.put_u16(source_port);
                buf.put_u16(destination_port);
                buf.put_u32(self.sequence);
                buf.put_u32(self.acknowledgment);
                buf.put_u8(5 << 4);
                buf.put_u8(self.flags.bits());
                buf.put_u16(0xFFFF);
                buf.put_u16(0);
                buf.put_u16(0);
            }
            L4::Udp { source_port, destination_port } => {
                buf.put_u16(source_port);
                buf.put_u16(destination_port);
                buf.put_u16(l4_len as u16);
                buf.put_u16(0);
            }
            L4::Icmp { icmp_type, code } => {
                buf.put_u8(icmp_type);
                buf.put_u8(code);
                buf.put_u16(0);
                buf.put_u32(0);
            }
        }
        buf.put_slice(&self.payload);

        buf.to_vec()
    }

    /// Encode into a captured frame
    pub fn build(&self) -> RawFrame {
        RawFrame::new(self.timestamp.unwrap_or_else(Utc::now), self.build_bytes())
    }
}

/// Ethernet frame with an arbitrary EtherType and body
pub fn ethernet_frame(ethertype: u16, body: &[u8]) -> RawFrame {
    let mut buf = BytesMut::with_capacity(14 + body.len());
    buf.put_slice(&DST_MAC);
    buf.put_slice(&SRC_MAC);
    buf.put_u16(ethertype);
    buf.put_slice(body);
    RawFrame::now(buf.freeze())
}
