//! # socksd - Dual SOCKS4/4A and SOCKS5 Proxy Server
//!
//! socksd exposes a SOCKS4 (with the 4A domain-name extension) endpoint and
//! a SOCKS5 endpoint at the same time, each on its own listener. A client
//! performs the version-specific handshake and asks the proxy to open an
//! outbound TCP connection (CONNECT), to accept one inbound TCP connection
//! on its behalf (BIND), or - for SOCKS5 - to relay UDP datagrams
//! (UDP ASSOCIATE). After a successful handshake the proxy is a transparent
//! byte pipe until either side closes.
//!
//! ## Features
//!
//! - **SOCKS4/4A**: CONNECT and BIND, optional USER-ID check
//! - **SOCKS5**: CONNECT, BIND and UDP ASSOCIATE per RFC 1928
//! - **Authentication**: none or username/password (RFC 1929)
//! - **Per-command policy**: every command can be disabled in `settings.ini`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use socksd::config::load_config;
//! use socksd::server::{Server, SocksVersion};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(load_config("settings.ini")?);
//!     let server = Server::bind(config, SocksVersion::Socks5).await?;
//!     server.run().await
//! }
//! ```
//!
//! ## Architecture
//!
//! Each listener accepts TCP connections and hands every one to a session
//! task registered in a [`server::SessionRegistry`]. The session drives the
//! protocol state machine (handshake, command dispatch, reply) and then
//! runs the relay until EOF or the first error:
//!
//! ```text
//! SOCKS Client -> socksd -> Target
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod addr;
pub mod config;
pub mod error;
pub mod relay;
pub mod server;
pub mod socks4;
pub mod socks5;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::ProtocolError;
pub use server::{Server, SocksVersion};

/// Version of the socksd library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
