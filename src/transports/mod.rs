//! Transport implementations

pub mod udp;

pub use udp::UdpTransport;
