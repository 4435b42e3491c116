//! Packet header views
//!
//! Minimal zero-copy parsers over raw packet bytes. Only what endpoint
//! classification needs: enough of IPv4 to find the transport header, and
//! enough of TCP to read the ports.

pub mod ipv4;
pub mod tcp;

pub use ipv4::Ipv4Header;
pub use tcp::TcpHeader;
