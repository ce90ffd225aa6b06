//! Username/password negotiator (RFC 1929)

use super::Negotiator;
use crate::error::ProtocolError;
use crate::socks5::wire::{SOCKS5_AUTH_METHOD_PASSWORD, SOCKS5_AUTH_VERSION};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Largest possible sub-negotiation message:
/// version + ulen + 255 + plen + 255.
const MAX_NEGOTIATION_LEN: usize = 513;

const AUTH_SUCCESS: u8 = 0x00;
const AUTH_FAILURE: u8 = 0x01;

/// The username/password method.
///
/// Reads one sub-negotiation message:
///
/// ```text
/// +----+------+----------+------+----------+
/// |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
/// +----+------+----------+------+----------+
/// | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
/// +----+------+----------+------+----------+
/// ```
///
/// and answers `VER STATUS` with status 0x00 on success. Anything else -
/// malformed message or credential mismatch - answers 0x01 and denies
/// access.
pub struct PasswordAuth {
    username: String,
    password: String,
}

impl PasswordAuth {
    /// Create a negotiator checking against the configured pair
    pub fn new(username: String, password: String) -> Self {
        PasswordAuth { username, password }
    }
}

#[async_trait]
impl Negotiator for PasswordAuth {
    fn method(&self) -> u8 {
        SOCKS5_AUTH_METHOD_PASSWORD
    }

    async fn execute(&self, stream: &mut TcpStream) -> Result<()> {
        let mut buf = [0u8; MAX_NEGOTIATION_LEN];
        let size = stream
            .read(&mut buf)
            .await
            .context("Failed to read the auth sub-negotiation message")?;

        match parse_credentials(&buf[..size]) {
            Ok((username, password))
                if username == self.username.as_bytes()
                    && password == self.password.as_bytes() =>
            {
                send_status(stream, AUTH_SUCCESS).await?;
                Ok(())
            }
            Ok((username, _)) => {
                send_status(stream, AUTH_FAILURE).await?;
                bail!(
                    "access denied for user '{}'",
                    String::from_utf8_lossy(username)
                );
            }
            Err(e) => {
                send_status(stream, AUTH_FAILURE).await?;
                Err(e).context("Malformed auth sub-negotiation message")
            }
        }
    }
}

/// Split one sub-negotiation message into username and password.
///
/// The declared lengths must account for the received buffer exactly; a
/// trailing or missing byte makes the message invalid.
fn parse_credentials(data: &[u8]) -> Result<(&[u8], &[u8]), ProtocolError> {
    if data.len() < 2 {
        return Err(ProtocolError::Truncated {
            needed: 2,
            got: data.len(),
        });
    }

    if data[0] != SOCKS5_AUTH_VERSION {
        return Err(ProtocolError::BadAuthVersion(data[0]));
    }

    let ulen = data[1] as usize;
    if data.len() < 2 + ulen + 1 {
        return Err(ProtocolError::BadAuthLength);
    }

    let username = &data[2..2 + ulen];
    let plen = data[2 + ulen] as usize;
    if data.len() != 3 + ulen + plen {
        return Err(ProtocolError::BadAuthLength);
    }

    Ok((username, &data[3 + ulen..]))
}

async fn send_status(stream: &mut TcpStream, status: u8) -> Result<()> {
    stream
        .write_all(&[SOCKS5_AUTH_VERSION, status])
        .await
        .context("Failed to send the auth sub-negotiation reply")
}
