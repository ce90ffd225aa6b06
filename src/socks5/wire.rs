//! SOCKS5 wire codec
//!
//! Pure functions over byte slices for the TCP side of RFC 1928: the
//! method-selection exchange and the request/reply messages. The UDP
//! envelope lives in [`crate::socks5::udp::packet`]. This module is the
//! only SOCKS5 TCP code that performs byte-order conversion.

use crate::addr::DestAddr;
use crate::error::ProtocolError;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// SOCKS5 protocol version
pub const SOCKS5_VERSION: u8 = 0x05;

/// RFC 1929 sub-negotiation version
pub const SOCKS5_AUTH_VERSION: u8 = 0x01;

/// No authentication required
pub const SOCKS5_AUTH_METHOD_NONE: u8 = 0x00;
/// Username/password authentication
pub const SOCKS5_AUTH_METHOD_PASSWORD: u8 = 0x02;
/// No acceptable methods
pub const SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE: u8 = 0xFF;

/// Reserved byte value (always 0x00)
pub const SOCKS5_RESERVED: u8 = 0x00;

/// IPv4 address type
pub const SOCKS5_ADDR_TYPE_IPV4: u8 = 0x01;
/// Domain name address type
pub const SOCKS5_ADDR_TYPE_DOMAIN: u8 = 0x03;
/// IPv6 address type
pub const SOCKS5_ADDR_TYPE_IPV6: u8 = 0x04;

/// Maximum domain name length
pub const MAX_DOMAIN_LEN: usize = 255;

/// SOCKS5 command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Establish a TCP connection to the destination
    Connect,
    /// Accept one inbound TCP connection on behalf of the client
    Bind,
    /// Relay UDP datagrams on behalf of the client
    UdpAssociate,
}

impl Command {
    /// Parse a command byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Command::Connect),
            0x02 => Some(Command::Bind),
            0x03 => Some(Command::UdpAssociate),
            _ => None,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Connect => write!(f, "CONNECT"),
            Command::Bind => write!(f, "BIND"),
            Command::UdpAssociate => write!(f, "UDP ASSOCIATE"),
        }
    }
}

/// SOCKS5 address type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    /// 4-byte IPv4 address
    Ipv4,
    /// Length-prefixed domain name
    Domain,
    /// 16-byte IPv6 address
    Ipv6,
}

impl AddressType {
    /// Parse an ATYP byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOCKS5_ADDR_TYPE_IPV4 => Some(AddressType::Ipv4),
            SOCKS5_ADDR_TYPE_DOMAIN => Some(AddressType::Domain),
            SOCKS5_ADDR_TYPE_IPV6 => Some(AddressType::Ipv6),
            _ => None,
        }
    }
}

/// SOCKS5 reply status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyCode {
    /// Succeeded
    Succeeded = 0x00,
    /// General SOCKS server failure
    GeneralFailure = 0x01,
    /// Connection not allowed by ruleset
    NotAllowed = 0x02,
    /// Network unreachable
    NetworkUnreachable = 0x03,
    /// Host unreachable
    HostUnreachable = 0x04,
    /// Connection refused
    ConnectionRefused = 0x05,
    /// TTL expired
    TtlExpired = 0x06,
    /// Command not supported
    CommandNotSupported = 0x07,
    /// Address type not supported
    AddressTypeNotSupported = 0x08,
}

/// A structurally valid SOCKS5 request.
///
/// The command byte is kept raw: an unknown command is not a structural
/// error, the session answers it with "command not supported".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Raw command byte from the wire
    pub command: u8,
    /// Address type of the destination field
    pub addr_type: AddressType,
    /// Requested destination
    pub dest: DestAddr,
}

impl Request {
    /// The command, when it is one the protocol defines
    pub fn command(&self) -> Option<Command> {
        Command::from_byte(self.command)
    }
}

/// Parse the version/method-selection message:
///
/// ```text
/// +-----+----------+----------+
/// | VER | NMETHODS |  METHODS |
/// +-----+----------+----------+
/// |  1  |    1     | 1 to 255 |
/// +-----+----------+----------+
/// ```
pub fn parse_method_offer(data: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if data.len() < 2 {
        return Err(ProtocolError::Truncated {
            needed: 2,
            got: data.len(),
        });
    }

    if data[0] != SOCKS5_VERSION {
        return Err(ProtocolError::BadVersion(data[0]));
    }

    let count = data[1] as usize;
    if count == 0 {
        return Err(ProtocolError::NoMethods);
    }

    if data.len() < 2 + count {
        return Err(ProtocolError::Truncated {
            needed: 2 + count,
            got: data.len(),
        });
    }

    Ok(data[2..2 + count].to_vec())
}

/// Encode the method-selection reply
pub fn encode_method_reply(method: u8) -> [u8; 2] {
    [SOCKS5_VERSION, method]
}

/// Parse and structurally validate a SOCKS5 request:
///
/// ```text
/// +-----+-----+-------+------+----------+----------+
/// | VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +-----+-----+-------+------+----------+----------+
/// |  1  |  1  | X'00' |  1   | Variable |    2     |
/// +-----+-----+-------+------+----------+----------+
/// ```
pub fn parse_request(data: &[u8]) -> Result<Request, ProtocolError> {
    if data.len() < 4 {
        return Err(ProtocolError::Truncated {
            needed: 4,
            got: data.len(),
        });
    }

    if data[0] != SOCKS5_VERSION {
        return Err(ProtocolError::BadVersion(data[0]));
    }

    let addr_type =
        AddressType::from_byte(data[3]).ok_or(ProtocolError::BadAddressType(data[3]))?;
    let (dest, _) = parse_address(addr_type, &data[4..])?;

    Ok(Request {
        command: data[1],
        addr_type,
        dest,
    })
}

/// Parse the ATYP-dependent address payload. Returns the destination and
/// the rest of the buffer after the port, which the UDP envelope codec
/// treats as the datagram payload.
pub(crate) fn parse_address(
    addr_type: AddressType,
    data: &[u8],
) -> Result<(DestAddr, &[u8]), ProtocolError> {
    match addr_type {
        AddressType::Ipv4 => {
            if data.len() < 6 {
                return Err(ProtocolError::Truncated {
                    needed: 6,
                    got: data.len(),
                });
            }
            let ip = Ipv4Addr::new(data[0], data[1], data[2], data[3]);
            let port = u16::from_be_bytes([data[4], data[5]]);
            Ok((DestAddr::ipv4(ip, port), &data[6..]))
        }

        AddressType::Domain => {
            if data.is_empty() {
                return Err(ProtocolError::Truncated {
                    needed: 1,
                    got: 0,
                });
            }
            let len = data[0] as usize;
            if len == 0 {
                return Err(ProtocolError::BadDomain);
            }
            if data.len() < 1 + len + 2 {
                return Err(ProtocolError::Truncated {
                    needed: 1 + len + 2,
                    got: data.len(),
                });
            }
            let domain = std::str::from_utf8(&data[1..1 + len])
                .map_err(|_| ProtocolError::BadDomain)?
                .to_string();
            let port = u16::from_be_bytes([data[1 + len], data[2 + len]]);
            Ok((DestAddr::domain(domain, port), &data[3 + len..]))
        }

        AddressType::Ipv6 => {
            if data.len() < 18 {
                return Err(ProtocolError::Truncated {
                    needed: 18,
                    got: data.len(),
                });
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&data[..16]);
            let port = u16::from_be_bytes([data[16], data[17]]);
            Ok((DestAddr::ipv6(Ipv6Addr::from(octets), port), &data[18..]))
        }
    }
}

/// Serialize an endpoint as `ATYP | ADDR | PORT`, the form shared by the
/// reply message and the UDP envelope. The ATYP always reflects the actual
/// address family.
pub(crate) fn encode_endpoint(buf: &mut Vec<u8>, endpoint: &SocketAddr) {
    match endpoint {
        SocketAddr::V4(addr) => {
            buf.push(SOCKS5_ADDR_TYPE_IPV4);
            buf.extend_from_slice(&addr.ip().octets());
            buf.extend_from_slice(&addr.port().to_be_bytes());
        }
        SocketAddr::V6(addr) => {
            buf.push(SOCKS5_ADDR_TYPE_IPV6);
            buf.extend_from_slice(&addr.ip().octets());
            buf.extend_from_slice(&addr.port().to_be_bytes());
        }
    }
}

/// Encode a SOCKS5 reply:
///
/// ```text
/// +-----+-----+-------+------+----------+----------+
/// | VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +-----+-----+-------+------+----------+----------+
/// |  1  |  1  | X'00' |  1   | Variable |    2     |
/// +-----+-----+-------+------+----------+----------+
/// ```
///
/// `None` stands for "no endpoint exists yet" and encodes 0.0.0.0:0.
pub fn encode_reply(code: ReplyCode, bound: Option<SocketAddr>) -> Vec<u8> {
    let bound =
        bound.unwrap_or_else(|| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0));

    let mut reply = vec![SOCKS5_VERSION, code as u8, SOCKS5_RESERVED];
    encode_endpoint(&mut reply, &bound);
    reply
}
