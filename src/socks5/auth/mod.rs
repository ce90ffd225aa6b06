//! SOCKS5 authentication negotiators
//!
//! After the method-selection exchange the session runs exactly one
//! negotiator over the client socket: [`NoAuth`] succeeds immediately,
//! [`PasswordAuth`] performs the RFC 1929 sub-negotiation.

mod none;
mod password;

pub use none::NoAuth;
pub use password::PasswordAuth;

use crate::config::Socks5Config;
use crate::socks5::wire::{SOCKS5_AUTH_METHOD_NONE, SOCKS5_AUTH_METHOD_PASSWORD};
use anyhow::Result;
use async_trait::async_trait;
use tokio::net::TcpStream;

/// One authentication method's sub-negotiation.
///
/// `execute` reads whatever the method requires from the client socket,
/// writes any reply the method defines, and returns an error when access
/// is denied.
#[async_trait]
pub trait Negotiator: Send + Sync {
    /// The method byte announced in the selection reply
    fn method(&self) -> u8;

    /// Run the sub-negotiation on the client socket
    async fn execute(&self, stream: &mut TcpStream) -> Result<()>;
}

/// Pick the negotiator for this session.
///
/// With a configured username and password the server accepts only the
/// user/password method; otherwise it accepts only "no authentication".
/// `None` means the client offered nothing acceptable.
pub fn select_negotiator(offered: &[u8], config: &Socks5Config) -> Option<Box<dyn Negotiator>> {
    if config.has_credentials() {
        if offered.contains(&SOCKS5_AUTH_METHOD_PASSWORD) {
            return Some(Box::new(PasswordAuth::new(
                config.username.clone(),
                config.password.clone(),
            )));
        }
    } else if offered.contains(&SOCKS5_AUTH_METHOD_NONE) {
        return Some(Box::new(NoAuth));
    }

    None
}
