//! Connection endpoint classification
//!
//! Extracts human-readable `address:port` labels from IPv4/TCP packets for
//! diagnostic logging. The labels never influence the mark decision.
//! Anything that is not decodable IPv4/TCP yields empty labels;
//! classification itself cannot fail.

use crate::protocol::{Ipv4Header, TcpHeader, ipv4};

/// Source and destination labels for a classified packet.
///
/// Both labels are empty when the packet is not IPv4/TCP or could not be
/// decoded far enough to read the ports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoints {
    pub src: String,
    pub dst: String,
}

impl Endpoints {
    /// True when both labels carry an `address:port` pair.
    pub fn is_known(&self) -> bool {
        !self.src.is_empty() && !self.dst.is_empty()
    }
}

/// Classify raw packet bytes into endpoint labels.
///
/// Decode failure is a normal outcome here, not an error: short buffers,
/// non-IPv4 traffic, and non-TCP transports all come back as empty labels.
pub fn classify(data: &[u8]) -> Endpoints {
    let ip = match Ipv4Header::parse(data) {
        Ok(hdr) => hdr,
        Err(_) => return Endpoints::default(),
    };

    if ip.protocol() != ipv4::PROTO_TCP {
        return Endpoints::default();
    }

    let tcp = match TcpHeader::parse(ip.payload()) {
        Ok(hdr) => hdr,
        Err(_) => return Endpoints::default(),
    };

    Endpoints {
        src: format!("{}:{}", ip.src_addr(), tcp.src_port()),
        dst: format!("{}:{}", ip.dst_addr(), tcp.dst_port()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcp_packet(src: [u8; 4], src_port: u16, dst: [u8; 4], dst_port: u16) -> Vec<u8> {
        let mut pkt = vec![
            0x45, 0x00, // Version=4 IHL=5, TOS
            0x00, 0x28, // Total length = 40
            0x00, 0x00, 0x40, 0x00, // Id, Flags=DF
            0x40, 0x06, // TTL=64, Protocol=TCP
            0x00, 0x00, // Checksum
        ];
        pkt.extend_from_slice(&src);
        pkt.extend_from_slice(&dst);
        // TCP header, 20 bytes, no options
        pkt.extend_from_slice(&src_port.to_be_bytes());
        pkt.extend_from_slice(&dst_port.to_be_bytes());
        pkt.extend_from_slice(&[
            0x00, 0x00, 0x00, 0x01, // seq
            0x00, 0x00, 0x00, 0x00, // ack
            0x50, 0x02, // data_offset=5, flags=SYN
            0x72, 0x10, // window
            0x00, 0x00, // checksum
            0x00, 0x00, // urgent_ptr
        ]);
        pkt
    }

    #[test]
    fn test_classify_tcp_roundtrip() {
        let pkt = tcp_packet([192, 168, 1, 100], 54321, [93, 184, 216, 34], 443);
        let endpoints = classify(&pkt);

        assert!(endpoints.is_known());
        assert_eq!(endpoints.src, "192.168.1.100:54321");
        assert_eq!(endpoints.dst, "93.184.216.34:443");
    }

    #[test]
    fn test_classify_non_ip() {
        let endpoints = classify(b"definitely not a packet");
        assert!(!endpoints.is_known());
        assert_eq!(endpoints, Endpoints::default());
    }

    #[test]
    fn test_classify_empty() {
        assert_eq!(classify(&[]), Endpoints::default());
    }

    #[test]
    fn test_classify_udp_is_unknown() {
        let mut pkt = tcp_packet([10, 0, 0, 1], 53, [10, 0, 0, 2], 53);
        pkt[9] = 17; // Protocol=UDP
        assert_eq!(classify(&pkt), Endpoints::default());
    }

    #[test]
    fn test_classify_truncated_tcp() {
        let pkt = tcp_packet([10, 0, 0, 1], 80, [10, 0, 0, 2], 8080);
        // Keep the IPv4 header but cut the TCP header short
        let endpoints = classify(&pkt[..24]);
        assert_eq!(endpoints, Endpoints::default());
    }
}
