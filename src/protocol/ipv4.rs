//! IPv4 header view - RFC 791

use crate::{Error, Result};
use std::net::Ipv4Addr;

/// Minimum IPv4 header size (without options)
pub const MIN_HEADER_SIZE: usize = 20;

/// Protocol number carried in the IPv4 header for TCP
pub const PROTO_TCP: u8 = 6;

/// Parsed IPv4 header (zero-copy reference)
#[derive(Debug)]
pub struct Ipv4Header<'a> {
    buffer: &'a [u8],
    header_len: usize,
}

impl<'a> Ipv4Header<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < MIN_HEADER_SIZE {
            return Err(Error::Parse("IPv4 header too short".into()));
        }

        let version = buffer[0] >> 4;
        if version != 4 {
            return Err(Error::Parse("not an IPv4 packet".into()));
        }

        let ihl = (buffer[0] & 0x0F) as usize;
        let header_len = ihl * 4;

        if header_len < MIN_HEADER_SIZE {
            return Err(Error::Parse("IPv4 IHL too small".into()));
        }

        if buffer.len() < header_len {
            return Err(Error::Parse("IPv4 header truncated".into()));
        }

        Ok(Self { buffer, header_len })
    }

    pub fn version(&self) -> u8 {
        self.buffer[0] >> 4
    }

    pub fn ihl(&self) -> u8 {
        self.buffer[0] & 0x0F
    }

    pub fn total_length(&self) -> u16 {
        u16::from_be_bytes([self.buffer[2], self.buffer[3]])
    }

    pub fn ttl(&self) -> u8 {
        self.buffer[8]
    }

    pub fn protocol(&self) -> u8 {
        self.buffer[9]
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.buffer[12],
            self.buffer[13],
            self.buffer[14],
            self.buffer[15],
        )
    }

    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(
            self.buffer[16],
            self.buffer[17],
            self.buffer[18],
            self.buffer[19],
        )
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Bytes after the header, i.e. the transport segment
    pub fn payload(&self) -> &[u8] {
        &self.buffer[self.header_len..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_packet() -> Vec<u8> {
        // IPv4: src=192.168.1.1, dst=192.168.1.2, TTL=64, TCP, 8 payload bytes
        vec![
            0x45, // Version=4, IHL=5
            0x00, // DSCP=0, ECN=0
            0x00, 0x1c, // Total length = 28
            0x00, 0x00, // Identification
            0x40, 0x00, // Flags=DF, Fragment offset=0
            0x40, // TTL=64
            0x06, // Protocol=TCP
            0x00, 0x00, // Checksum (not validated here)
            192, 168, 1, 1, // Source
            192, 168, 1, 2, // Destination
            // Payload (8 bytes)
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08,
        ]
    }

    #[test]
    fn test_parse_simple() {
        let data = make_packet();
        let hdr = Ipv4Header::parse(&data).unwrap();

        assert_eq!(hdr.version(), 4);
        assert_eq!(hdr.ihl(), 5);
        assert_eq!(hdr.header_len(), 20);
        assert_eq!(hdr.total_length(), 28);
        assert_eq!(hdr.ttl(), 64);
        assert_eq!(hdr.protocol(), PROTO_TCP);
        assert_eq!(hdr.src_addr(), Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(hdr.dst_addr(), Ipv4Addr::new(192, 168, 1, 2));
        assert_eq!(hdr.payload().len(), 8);
    }

    #[test]
    fn test_parse_too_short() {
        let short = vec![0u8; 19];
        assert!(Ipv4Header::parse(&short).is_err());
    }

    #[test]
    fn test_parse_wrong_version() {
        let mut data = make_packet();
        data[0] = 0x65; // Version 6
        assert!(Ipv4Header::parse(&data).is_err());
    }

    #[test]
    fn test_parse_bad_ihl() {
        let mut data = make_packet();
        data[0] = 0x41; // IHL=1 (4 bytes, below minimum)
        assert!(Ipv4Header::parse(&data).is_err());
    }

    #[test]
    fn test_parse_truncated_header() {
        let mut data = make_packet();
        data[0] = 0x4F; // IHL=15 (60 bytes, longer than the buffer)
        assert!(Ipv4Header::parse(&data).is_err());
    }

    #[test]
    fn test_payload_with_options() {
        let mut data = make_packet();
        data[0] = 0x46; // IHL=6 (24-byte header, eats into former payload)
        let hdr = Ipv4Header::parse(&data).unwrap();
        assert_eq!(hdr.header_len(), 24);
        assert_eq!(hdr.payload(), &[0x05, 0x06, 0x07, 0x08]);
    }
}
