//! SOCKS4/4A session handling
//!
//! Drives one accepted connection through the SOCKS4 state machine:
//! request parsing, USER-ID policy, CONNECT or BIND execution, reply, then
//! the shared TCP relay. Protocol violations terminate the session without
//! a reply; policy and connectivity failures answer with the protocol's
//! status codes first.

pub mod wire;

use crate::config::Socks4Config;
use crate::relay::{self, TCP_BUFFER_SIZE};
use anyhow::{bail, Result};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info};
use wire::{Command, ReplyCode, Request};

/// Handle one SOCKS4/4A session from handshake to relay end.
pub async fn handle_session(mut client: TcpStream, config: &Socks4Config) -> Result<()> {
    let peer = client.peer_addr()?;

    let mut buf = vec![0u8; TCP_BUFFER_SIZE];
    let size = match client.read(&mut buf).await {
        Ok(size) => size,
        Err(e) => {
            error!("Error reading the request message: {}", e);
            return Err(e.into());
        }
    };

    let request = match wire::parse_request(&buf[..size]) {
        Ok(request) => request,
        Err(e) => {
            // SOCKS4 owes no reply to a malformed request.
            error!("Invalid request message: {}", e);
            return Err(e.into());
        }
    };

    if !config.user_id.is_empty() && request.user_id != config.user_id.as_bytes() {
        error!(
            "Incorrect USER-ID '{}' from {}",
            String::from_utf8_lossy(&request.user_id),
            peer
        );
        return send_reply(&mut client, ReplyCode::ClientConflict, wire::empty_endpoint()).await;
    }

    match request.command {
        Command::Connect => {
            if !config.enable_connect {
                error!("The CONNECT command is disabled in the application configuration");
                return send_reply(&mut client, ReplyCode::Rejected, wire::empty_endpoint()).await;
            }
            connect_command(client, peer, request).await
        }
        Command::Bind => {
            if !config.enable_bind {
                error!("The BIND command is disabled in the application configuration");
                return send_reply(&mut client, ReplyCode::Rejected, wire::empty_endpoint()).await;
            }
            bind_command(client, peer).await
        }
    }
}

/// CONNECT: resolve the destination, open the outbound connection, reply
/// with the endpoint it connected to, then relay.
async fn connect_command(mut client: TcpStream, peer: SocketAddr, request: Request) -> Result<()> {
    // SOCKS4 replies carry an IPv4 endpoint, so only IPv4 results qualify.
    let endpoint = match request.dest.resolve_v4().await {
        Ok(endpoint) => endpoint,
        Err(e) => {
            error!("Domain name resolution error: {:#}", e);
            send_reply(&mut client, ReplyCode::ConnectionFailed, wire::empty_endpoint()).await?;
            bail!("resolution failed for {}", request.dest);
        }
    };

    let application = match TcpStream::connect(endpoint).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("Server connection error [{}]: {}", endpoint, e);
            send_reply(&mut client, ReplyCode::ConnectionFailed, wire::empty_endpoint()).await?;
            bail!("connect failed for {}", endpoint);
        }
    };

    let remote = to_v4(application.peer_addr()?);
    send_reply(&mut client, ReplyCode::Granted, remote).await?;

    info!(
        "Running the CONNECT command, client={}, server={}",
        peer, remote
    );
    relay::tunnel(client, application).await
}

/// BIND: listen on a wildcard IPv4 port, report the listener endpoint,
/// accept exactly one connection, report the peer, then relay.
async fn bind_command(mut client: TcpStream, peer: SocketAddr) -> Result<()> {
    let listener = match TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to open the BIND listener: {}", e);
            send_reply(&mut client, ReplyCode::ConnectionFailed, wire::empty_endpoint()).await?;
            bail!("bind listener failed");
        }
    };

    let local = to_v4(listener.local_addr()?);
    send_reply(&mut client, ReplyCode::Granted, local).await?;

    let (application, app_peer) = match listener.accept().await {
        Ok(accepted) => accepted,
        Err(e) => {
            error!("Failed to accept incoming connection in BIND command: {}", e);
            send_reply(&mut client, ReplyCode::ConnectionFailed, wire::empty_endpoint()).await?;
            bail!("bind accept failed");
        }
    };

    // One connection per BIND; the listener closes before the relay runs.
    drop(listener);

    send_reply(&mut client, ReplyCode::Granted, to_v4(app_peer)).await?;

    info!(
        "Running the BIND command, client={}, server={}",
        peer, app_peer
    );
    relay::tunnel(client, application).await
}

async fn send_reply(client: &mut TcpStream, code: ReplyCode, endpoint: SocketAddrV4) -> Result<()> {
    if let Err(e) = client.write_all(&wire::encode_reply(code, endpoint)).await {
        error!("Error sending a reply to the client: {}", e);
        return Err(e.into());
    }
    Ok(())
}

/// SOCKS4 replies cannot express IPv6; an IPv6 endpoint degrades to the
/// zero address with the original port.
fn to_v4(addr: SocketAddr) -> SocketAddrV4 {
    match addr {
        SocketAddr::V4(v4) => v4,
        SocketAddr::V6(v6) => SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, v6.port()),
    }
}
