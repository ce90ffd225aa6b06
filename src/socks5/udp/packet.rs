//! UDP envelope encoding/decoding
//!
//! Every datagram on a SOCKS5 UDP association is wrapped in:
//!
//! ```text
//! +----+------+------+----------+----------+----------+
//! |RSV | FRAG | ATYP | DST.ADDR | DST.PORT |   DATA   |
//! +----+------+------+----------+----------+----------+
//! | 2  |  1   |  1   | Variable |    2     | Variable |
//! +----+------+------+----------+----------+----------+
//! ```

use crate::addr::DestAddr;
use crate::error::ProtocolError;
use crate::socks5::wire::{self, AddressType};
use bytes::{BufMut, Bytes, BytesMut};
use std::net::SocketAddr;

/// Fixed part of the envelope (RSV + FRAG + ATYP)
const ENVELOPE_HEADER_LEN: usize = 4;

/// One decoded UDP envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpEnvelope {
    /// Fragment number; anything non-zero is dropped by the relay
    pub frag: u8,
    /// Destination (client-to-application) or source (application-to-client)
    pub dest: DestAddr,
    /// The relayed payload
    pub payload: Bytes,
}

impl UdpEnvelope {
    /// True when the datagram is part of a fragment sequence
    pub fn is_fragmented(&self) -> bool {
        self.frag != 0
    }
}

/// Parse a client datagram into its envelope
pub fn parse_datagram(data: &[u8]) -> Result<UdpEnvelope, ProtocolError> {
    if data.len() < ENVELOPE_HEADER_LEN {
        return Err(ProtocolError::Truncated {
            needed: ENVELOPE_HEADER_LEN,
            got: data.len(),
        });
    }

    let reserved = u16::from_be_bytes([data[0], data[1]]);
    if reserved != 0 {
        return Err(ProtocolError::BadReserved(reserved));
    }

    let frag = data[2];
    let addr_type =
        AddressType::from_byte(data[3]).ok_or(ProtocolError::BadAddressType(data[3]))?;
    let (dest, payload) = wire::parse_address(addr_type, &data[ENVELOPE_HEADER_LEN..])?;

    Ok(UdpEnvelope {
        frag,
        dest,
        payload: Bytes::copy_from_slice(payload),
    })
}

/// Wrap an application datagram for delivery to the client. The envelope
/// carries the application's endpoint so the client can tell responders
/// apart.
pub fn encode_datagram(sender: &SocketAddr, payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(ENVELOPE_HEADER_LEN + 18 + payload.len());

    buf.put_u16(0); // RSV
    buf.put_u8(0); // FRAG

    let mut endpoint = Vec::with_capacity(19);
    wire::encode_endpoint(&mut endpoint, sender);
    buf.extend_from_slice(&endpoint);

    buf.extend_from_slice(payload);
    buf.to_vec()
}
