//! Destination addresses and asynchronous resolution
//!
//! Both protocol variants carry a destination that is either a literal
//! endpoint or a domain name plus port. [`DestAddr`] is that destination;
//! resolution goes through the runtime's resolver and never blocks the
//! scheduler.

use anyhow::{Context, Result};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Destination address of a proxy request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestAddr {
    /// Literal IP endpoint
    Ip(SocketAddr),
    /// Domain name with port
    Domain(String, u16),
}

impl DestAddr {
    /// Create a destination from an IPv4 address and port
    pub fn ipv4(ip: Ipv4Addr, port: u16) -> Self {
        DestAddr::Ip(SocketAddr::new(IpAddr::V4(ip), port))
    }

    /// Create a destination from an IPv6 address and port
    pub fn ipv6(ip: Ipv6Addr, port: u16) -> Self {
        DestAddr::Ip(SocketAddr::new(IpAddr::V6(ip), port))
    }

    /// Create a destination from a domain name and port
    pub fn domain(domain: String, port: u16) -> Self {
        DestAddr::Domain(domain, port)
    }

    /// Get the port number
    pub fn port(&self) -> u16 {
        match self {
            DestAddr::Ip(addr) => addr.port(),
            DestAddr::Domain(_, port) => *port,
        }
    }

    /// Resolve to a socket address.
    ///
    /// Literal endpoints return immediately; domain names take the first
    /// endpoint the resolver produces, in whatever order it produces them.
    pub async fn resolve(&self) -> Result<SocketAddr> {
        match self {
            DestAddr::Ip(addr) => Ok(*addr),
            DestAddr::Domain(domain, port) => {
                let addr_str = format!("{}:{}", domain, port);
                let resolved = tokio::net::lookup_host(&addr_str)
                    .await
                    .with_context(|| format!("Failed to resolve domain: {}", domain))?
                    .next()
                    .with_context(|| format!("No addresses found for domain: {}", domain))?;
                Ok(resolved)
            }
        }
    }

    /// Resolve to an IPv4 socket address.
    ///
    /// SOCKS4 replies can only carry an IPv4 endpoint, so its sessions take
    /// the first IPv4 result and treat an IPv6-only answer as a resolution
    /// failure.
    pub async fn resolve_v4(&self) -> Result<SocketAddr> {
        match self {
            DestAddr::Ip(addr) => {
                anyhow::ensure!(addr.is_ipv4(), "Destination is not an IPv4 endpoint: {}", addr);
                Ok(*addr)
            }
            DestAddr::Domain(domain, port) => {
                let addr_str = format!("{}:{}", domain, port);
                let resolved = tokio::net::lookup_host(&addr_str)
                    .await
                    .with_context(|| format!("Failed to resolve domain: {}", domain))?
                    .find(SocketAddr::is_ipv4)
                    .with_context(|| format!("No IPv4 addresses found for domain: {}", domain))?;
                Ok(resolved)
            }
        }
    }
}

impl fmt::Display for DestAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestAddr::Ip(addr) => write!(f, "{}", addr),
            DestAddr::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

impl From<SocketAddr> for DestAddr {
    fn from(addr: SocketAddr) -> Self {
        DestAddr::Ip(addr)
    }
}
