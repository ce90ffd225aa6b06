//! Error types for socksd
//!
//! The wire codecs return typed [`ProtocolError`] values; the session and
//! server layers wrap everything else in `anyhow` with context.

use thiserror::Error;

/// A malformed or unsupported message on the client leg.
///
/// Produced exclusively by the wire codecs; the session decides whether a
/// failure reply is owed (SOCKS5) or the connection is dropped without one
/// (SOCKS4 handshake).
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    /// Message shorter than its fixed or declared length
    #[error("message truncated: need at least {needed} bytes, got {got}")]
    Truncated {
        /// Minimum number of bytes the message requires
        needed: usize,
        /// Number of bytes actually received
        got: usize,
    },

    /// Wrong protocol version byte
    #[error("unsupported SOCKS version: {0}")]
    BadVersion(u8),

    /// Command byte outside the protocol's range
    #[error("unsupported command: {0}")]
    BadCommand(u8),

    /// SOCKS5 address type outside {IPv4, Domain, IPv6}
    #[error("unsupported address type: {0}")]
    BadAddressType(u8),

    /// A NUL-terminated field ran past the end of the received buffer
    #[error("unterminated {0} field")]
    Unterminated(&'static str),

    /// SOCKS5 authentication offer with an empty method list
    #[error("authentication offer lists no methods")]
    NoMethods,

    /// Domain name bytes are not valid UTF-8 or the length is out of range
    #[error("invalid domain name")]
    BadDomain,

    /// SOCKS5 UDP envelope with a non-zero reserved field
    #[error("non-zero reserved field in UDP envelope: {0}")]
    BadReserved(u16),

    /// RFC 1929 sub-negotiation message with an invalid version byte
    #[error("unsupported auth sub-negotiation version: {0}")]
    BadAuthVersion(u8),

    /// RFC 1929 sub-negotiation message whose declared field lengths do not
    /// match the received length
    #[error("auth sub-negotiation length mismatch")]
    BadAuthLength,
}
