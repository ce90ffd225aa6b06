//! UDP ASSOCIATE support
//!
//! The envelope codec for SOCKS5-encapsulated datagrams and the relay pump
//! that services one association until the client's TCP connection closes.

mod packet;
mod relay;

pub use packet::{encode_datagram, parse_datagram, UdpEnvelope};
pub use relay::{run_association, UDP_BUFFER_SIZE};
