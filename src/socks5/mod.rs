//! SOCKS5 session handling
//!
//! Drives one accepted connection through the RFC 1928 state machine:
//! method selection, the chosen authentication sub-negotiation, command
//! dispatch (CONNECT, BIND, UDP ASSOCIATE) under the configured policy,
//! the reply, and finally the relay.

pub mod auth;
pub mod udp;
pub mod wire;

use crate::config::Socks5Config;
use crate::error::ProtocolError;
use crate::relay::{self, TCP_BUFFER_SIZE};
use anyhow::{bail, Result};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tracing::{error, info};
use wire::{AddressType, Command, ReplyCode, Request};

/// Handle one SOCKS5 session from method selection to relay end.
pub async fn handle_session(mut client: TcpStream, config: &Socks5Config) -> Result<()> {
    let peer = client.peer_addr()?;
    let mut buf = vec![0u8; TCP_BUFFER_SIZE];

    // Version identifier / method selection message.
    let size = match client.read(&mut buf).await {
        Ok(size) => size,
        Err(e) => {
            error!("Error reading the authentication message: {}", e);
            return Err(e.into());
        }
    };

    let offered = match wire::parse_method_offer(&buf[..size]) {
        Ok(offered) => offered,
        Err(e) => {
            error!("Invalid authentication message: {}", e);
            let reply = wire::encode_method_reply(wire::SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE);
            let _ = client.write_all(&reply).await;
            return Err(e.into());
        }
    };

    let Some(negotiator) = auth::select_negotiator(&offered, config) else {
        // RFC 1928 asks for an explicit "no acceptable methods" reply
        // before the server closes the connection.
        error!("A suitable authentication method was not found");
        let reply = wire::encode_method_reply(wire::SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE);
        let _ = client.write_all(&reply).await;
        return Ok(());
    };

    let reply = wire::encode_method_reply(negotiator.method());
    if let Err(e) = client.write_all(&reply).await {
        error!("Failed to send the authentication method: {}", e);
        return Err(e.into());
    }

    if let Err(e) = negotiator.execute(&mut client).await {
        error!("Authentication error: {:#}", e);
        return Err(e);
    }

    // The request follows the method-dependent sub-negotiation.
    let size = match client.read(&mut buf).await {
        Ok(size) => size,
        Err(e) => {
            error!("Error reading the command request: {}", e);
            return Err(e.into());
        }
    };

    let request = match wire::parse_request(&buf[..size]) {
        Ok(request) => request,
        Err(e) => {
            error!("Invalid command message: {}", e);
            let code = match e {
                ProtocolError::BadAddressType(_) => ReplyCode::AddressTypeNotSupported,
                _ => ReplyCode::GeneralFailure,
            };
            send_reply(&mut client, code, None).await?;
            return Err(e.into());
        }
    };

    match request.command() {
        Some(Command::Connect) => {
            if !config.enable_connect {
                error!("The CONNECT command is disabled in the application configuration");
                return send_reply(&mut client, ReplyCode::NotAllowed, None).await;
            }
            connect_command(client, peer, request).await
        }
        Some(Command::Bind) => {
            if !config.enable_bind {
                error!("The BIND command is disabled in the application configuration");
                return send_reply(&mut client, ReplyCode::NotAllowed, None).await;
            }
            bind_command(client, peer, request.addr_type).await
        }
        Some(Command::UdpAssociate) => {
            if !config.enable_udp {
                error!("The UDP-ASSOCIATE command is disabled in the application configuration");
                return send_reply(&mut client, ReplyCode::NotAllowed, None).await;
            }
            udp_associate_command(client, request.addr_type).await
        }
        None => {
            error!("Unknown command: {}", request.command);
            send_reply(&mut client, ReplyCode::CommandNotSupported, None).await
        }
    }
}

/// CONNECT: resolve the destination, open the outbound connection, reply
/// with the endpoint it connected to, then relay.
async fn connect_command(mut client: TcpStream, peer: SocketAddr, request: Request) -> Result<()> {
    let endpoint = match request.dest.resolve().await {
        Ok(endpoint) => endpoint,
        Err(e) => {
            error!("Domain name resolution error: {:#}", e);
            send_reply(&mut client, ReplyCode::HostUnreachable, None).await?;
            bail!("resolution failed for {}", request.dest);
        }
    };

    let application = match TcpStream::connect(endpoint).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("Server connection error [{}]: {}", endpoint, e);
            send_reply(&mut client, ReplyCode::NetworkUnreachable, None).await?;
            bail!("connect failed for {}", endpoint);
        }
    };

    let remote = application.peer_addr()?;
    send_reply(&mut client, ReplyCode::Succeeded, Some(remote)).await?;

    info!(
        "Running the CONNECT command, client={}, server={}",
        peer, remote
    );
    relay::tunnel(client, application).await
}

/// BIND: listen on a wildcard port of the request's address family, report
/// the listener endpoint, accept exactly one connection, report the peer,
/// then relay.
async fn bind_command(
    mut client: TcpStream,
    peer: SocketAddr,
    addr_type: AddressType,
) -> Result<()> {
    let listener = match TcpListener::bind(wildcard(addr_type)).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to open the BIND listener: {}", e);
            send_reply(&mut client, ReplyCode::GeneralFailure, None).await?;
            bail!("bind listener failed");
        }
    };

    let local = listener.local_addr()?;
    send_reply(&mut client, ReplyCode::Succeeded, Some(local)).await?;

    let (application, app_peer) = match listener.accept().await {
        Ok(accepted) => accepted,
        Err(e) => {
            error!("Failed to accept incoming connection: {}", e);
            send_reply(&mut client, ReplyCode::ConnectionRefused, None).await?;
            bail!("bind accept failed");
        }
    };

    // One connection per BIND; the listener closes before the relay runs.
    drop(listener);

    send_reply(&mut client, ReplyCode::Succeeded, Some(app_peer)).await?;

    info!(
        "Running the BIND command, client={}, server={}",
        peer, app_peer
    );
    relay::tunnel(client, application).await
}

/// UDP ASSOCIATE: open a wildcard UDP socket of the request's address
/// family, report it, then pump datagrams until the TCP connection closes.
async fn udp_associate_command(mut client: TcpStream, addr_type: AddressType) -> Result<()> {
    let socket = match UdpSocket::bind(wildcard(addr_type)).await {
        Ok(socket) => socket,
        Err(e) => {
            error!("Failed to open the UDP relay socket: {}", e);
            send_reply(&mut client, ReplyCode::GeneralFailure, None).await?;
            bail!("udp bind failed");
        }
    };

    let local = socket.local_addr()?;
    send_reply(&mut client, ReplyCode::Succeeded, Some(local)).await?;

    info!("Running the UDP-ASSOCIATE command, relay={}", local);
    udp::run_association(&mut client, socket).await
}

async fn send_reply(
    client: &mut TcpStream,
    code: ReplyCode,
    bound: Option<SocketAddr>,
) -> Result<()> {
    if let Err(e) = client.write_all(&wire::encode_reply(code, bound)).await {
        error!("Error sending a reply to the client: {}", e);
        return Err(e.into());
    }
    Ok(())
}

/// Wildcard bind address matching the family the request named. The reply
/// later carries the actual bound endpoint, whatever family it has.
fn wildcard(addr_type: AddressType) -> SocketAddr {
    match addr_type {
        AddressType::Ipv6 => (Ipv6Addr::UNSPECIFIED, 0).into(),
        _ => (Ipv4Addr::UNSPECIFIED, 0).into(),
    }
}
