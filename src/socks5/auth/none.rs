//! No-authentication negotiator

use super::Negotiator;
use crate::socks5::wire::SOCKS5_AUTH_METHOD_NONE;
use anyhow::Result;
use async_trait::async_trait;
use tokio::net::TcpStream;

/// The "no authentication required" method.
///
/// Has no sub-negotiation; the session proceeds straight to the request.
pub struct NoAuth;

#[async_trait]
impl Negotiator for NoAuth {
    fn method(&self) -> u8 {
        SOCKS5_AUTH_METHOD_NONE
    }

    async fn execute(&self, _stream: &mut TcpStream) -> Result<()> {
        Ok(())
    }
}
