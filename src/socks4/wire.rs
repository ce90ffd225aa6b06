//! SOCKS4/4A wire codec
//!
//! Pure functions over byte slices; the only SOCKS4 code that touches the
//! network byte order. The request is a fixed 8-byte header followed by the
//! NUL-terminated USER-ID and, for the 4A extension, a NUL-terminated
//! domain name:
//!
//! ```text
//! +----+----+----+----+----+----+----+----+----+....+------+
//! | VN | CD | DSTPORT |      DSTIP        |  USERID  | NULL |
//! +----+----+----+----+----+----+----+----+----+....+------+
//!    1    1      2              4           variable     1
//! ```

use crate::addr::DestAddr;
use crate::error::ProtocolError;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// SOCKS4 request version byte
pub const SOCKS4_VERSION: u8 = 0x04;

/// Version byte of every SOCKS4 reply
pub const SOCKS4_REPLY_VERSION: u8 = 0x00;

/// Fixed part of the request/reply message
pub const SOCKS4_HEADER_LEN: usize = 8;

/// SOCKS4 command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Establish a TCP connection to the destination
    Connect,
    /// Accept one inbound TCP connection on behalf of the client
    Bind,
}

impl Command {
    /// Parse a command byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Command::Connect),
            0x02 => Some(Command::Bind),
            _ => None,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Connect => write!(f, "CONNECT"),
            Command::Bind => write!(f, "BIND"),
        }
    }
}

/// SOCKS4 reply status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyCode {
    /// Request granted
    Granted = 90,
    /// Request rejected or failed
    Rejected = 91,
    /// Request rejected: the server cannot reach the destination
    ConnectionFailed = 92,
    /// Request rejected: client reported a different user-id
    ClientConflict = 93,
}

/// A validated SOCKS4/4A request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Requested command
    pub command: Command,
    /// Destination: a literal IPv4 endpoint, or a domain when the 4A form
    /// (DSTIP = 0.0.0.x, x != 0) was used
    pub dest: DestAddr,
    /// USER-ID bytes, compared byte-exactly against the configured value
    pub user_id: Vec<u8>,
}

/// Parse and validate one SOCKS4/4A request.
///
/// The USER-ID is the maximal NUL-terminated prefix starting at offset 8;
/// a USER-ID (or 4A domain) that is not terminated inside the received
/// buffer makes the request invalid.
pub fn parse_request(data: &[u8]) -> Result<Request, ProtocolError> {
    if data.len() < SOCKS4_HEADER_LEN {
        return Err(ProtocolError::Truncated {
            needed: SOCKS4_HEADER_LEN,
            got: data.len(),
        });
    }

    if data[0] != SOCKS4_VERSION {
        return Err(ProtocolError::BadVersion(data[0]));
    }

    let command = Command::from_byte(data[1]).ok_or(ProtocolError::BadCommand(data[1]))?;
    let port = u16::from_be_bytes([data[2], data[3]]);
    let raw_addr = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);

    let (user_id, tail) = split_nul_terminated(&data[SOCKS4_HEADER_LEN..], "user-id")?;

    // 4A extension: DSTIP of the form 0.0.0.x with x != 0 announces that a
    // domain name follows the USER-ID.
    let dest = if raw_addr & 0xFFFF_FF00 == 0 && raw_addr & 0xFF != 0 {
        let (domain, _) = split_nul_terminated(tail, "domain")?;
        let domain = std::str::from_utf8(domain).map_err(|_| ProtocolError::BadDomain)?;
        DestAddr::domain(domain.to_string(), port)
    } else {
        DestAddr::Ip(SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::from(raw_addr),
            port,
        )))
    };

    Ok(Request {
        command,
        dest,
        user_id: user_id.to_vec(),
    })
}

/// Encode a SOCKS4 reply: version 0x00, status, big-endian port, big-endian
/// IPv4 address. Failure replies pass 0.0.0.0:0.
pub fn encode_reply(code: ReplyCode, endpoint: SocketAddrV4) -> [u8; SOCKS4_HEADER_LEN] {
    let mut reply = [0u8; SOCKS4_HEADER_LEN];
    reply[0] = SOCKS4_REPLY_VERSION;
    reply[1] = code as u8;
    reply[2..4].copy_from_slice(&endpoint.port().to_be_bytes());
    reply[4..8].copy_from_slice(&endpoint.ip().octets());
    reply
}

/// The endpoint carried by failure replies
pub fn empty_endpoint() -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)
}

fn split_nul_terminated<'a>(
    data: &'a [u8],
    field: &'static str,
) -> Result<(&'a [u8], &'a [u8]), ProtocolError> {
    match data.iter().position(|&b| b == 0) {
        Some(pos) => Ok((&data[..pos], &data[pos + 1..])),
        None => Err(ProtocolError::Unterminated(field)),
    }
}
