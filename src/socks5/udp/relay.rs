//! UDP association relay
//!
//! One UDP socket serves both directions of an association. The first
//! datagram's sender is latched as the client; datagrams from the client
//! are unwrapped and forwarded to their destination, datagrams from
//! anywhere else are wrapped in an envelope naming the sender and handed
//! to the client. A relay failure never ends the association - datagrams
//! are dropped and the pump continues - only the client closing its TCP
//! connection does.

use super::packet;
use std::net::SocketAddr;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, info, warn};

/// Buffer size for the UDP relay phase (the maximum datagram size)
pub const UDP_BUFFER_SIZE: usize = 65535;

/// Service one UDP association until the control connection closes.
///
/// The watch read on the control socket and the datagram servicing run in
/// the same loop, so the TCP side is observed from the first iteration on.
pub async fn run_association(control: &mut TcpStream, socket: UdpSocket) -> anyhow::Result<()> {
    let mut buf = vec![0u8; UDP_BUFFER_SIZE];
    let mut probe = [0u8; 1];
    let mut client_ep: Option<SocketAddr> = None;

    loop {
        tokio::select! {
            watched = control.read(&mut probe) => {
                match watched {
                    Ok(0) => {
                        info!("TCP connection was closed, ending the UDP association");
                        return Ok(());
                    }
                    Ok(_) => {
                        debug!("Unexpected data on the UDP control connection");
                    }
                    Err(e) => {
                        info!("TCP connection was closed, ending the UDP association: {}", e);
                        return Ok(());
                    }
                }
            }

            received = socket.recv_from(&mut buf) => {
                let (size, sender) = match received {
                    Ok(received) => received,
                    Err(e) => {
                        warn!("Failed to receive data from the UDP socket: {}", e);
                        continue;
                    }
                };

                // The sender of the first datagram is the client.
                let client = *client_ep.get_or_insert(sender);

                if sender == client {
                    relay_to_application(&socket, &buf[..size]).await;
                } else {
                    relay_to_client(&socket, client, sender, &buf[..size]).await;
                }
            }
        }
    }
}

/// Unwrap a client datagram and forward its payload to the destination.
/// Invalid envelopes, fragments and undeliverable datagrams are dropped.
async fn relay_to_application(socket: &UdpSocket, datagram: &[u8]) {
    let envelope = match packet::parse_datagram(datagram) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("Invalid UDP envelope: {}", e);
            return;
        }
    };

    // Fragmented datagrams are dropped without notice (RFC 1928).
    if envelope.is_fragmented() {
        return;
    }

    let endpoint = match envelope.dest.resolve().await {
        Ok(endpoint) => endpoint,
        Err(e) => {
            warn!("Domain name resolution error from UDP message: {:#}", e);
            return;
        }
    };

    if let Err(e) = socket.send_to(&envelope.payload, endpoint).await {
        warn!("Error sending UDP message to {}: {}", endpoint, e);
    }
}

/// Wrap an application datagram and deliver it to the client.
async fn relay_to_client(
    socket: &UdpSocket,
    client: SocketAddr,
    sender: SocketAddr,
    payload: &[u8],
) {
    let message = packet::encode_datagram(&sender, payload);

    if let Err(e) = socket.send_to(&message, client).await {
        warn!("Error sending UDP message to the client {}: {}", client, e);
    }
}
