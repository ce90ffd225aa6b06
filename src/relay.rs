//! Bidirectional TCP relay
//!
//! After a successful handshake the session turns into a byte pump between
//! the client socket and the application socket. The two directions are
//! independent chains of `read` followed by `write_all`, each with its own
//! buffer; the first EOF or error on either direction ends the relay.

use anyhow::Result;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, info};

/// Buffer size for every TCP phase of a session
pub const TCP_BUFFER_SIZE: usize = 4096;

/// Relay data bidirectionally between two streams.
///
/// Returns once either direction sees EOF or an error; the streams are
/// dropped (and thereby closed) on return. Peer EOF is an orderly shutdown
/// and is logged at info; transport errors are logged at error. Neither is
/// surfaced to the caller, a finished relay is a finished session.
pub async fn tunnel<A, B>(client: A, application: B) -> Result<()>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut app_read, mut app_write) = tokio::io::split(application);

    tokio::select! {
        result = pump(&mut client_read, &mut app_write) => finish("client->application", result),
        result = pump(&mut app_read, &mut client_write) => finish("application->client", result),
    }

    Ok(())
}

/// One relay direction: read a chunk, forward it, repeat until EOF or error.
async fn pump<R, W>(from: &mut R, to: &mut W) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; TCP_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let n = from.read(&mut buf).await?;
        if n == 0 {
            return Ok(total);
        }
        to.write_all(&buf[..n]).await?;
        total += n as u64;
    }
}

fn finish(direction: &str, result: io::Result<u64>) {
    match result {
        Ok(bytes) => info!("Relay {} closed by peer, {} bytes transferred", direction, bytes),
        Err(e) => error!("Relay {} failed: {}", direction, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_tunnel_forwards_both_directions() {
        let (mut client_a, server_a) = duplex(1024);
        let (mut client_b, server_b) = duplex(1024);

        let relay_handle = tokio::spawn(async move { tunnel(server_a, server_b).await });

        client_a.write_all(b"message A->B").await.unwrap();
        let mut buf_b = vec![0u8; 12];
        client_b.read_exact(&mut buf_b).await.unwrap();
        assert_eq!(&buf_b, b"message A->B");

        client_b.write_all(b"message B->A").await.unwrap();
        let mut buf_a = vec![0u8; 12];
        client_a.read_exact(&mut buf_a).await.unwrap();
        assert_eq!(&buf_a, b"message B->A");

        drop(client_a);
        drop(client_b);

        let result = tokio::time::timeout(Duration::from_secs(1), relay_handle).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_tunnel_preserves_large_stream() {
        let (mut client_a, server_a) = duplex(65536);
        let (mut client_b, server_b) = duplex(65536);

        let relay_handle = tokio::spawn(async move { tunnel(server_a, server_b).await });

        // Larger than the relay buffer, with a position-dependent pattern so
        // reordering or loss would be visible.
        let data: Vec<u8> = (0..50000u32).map(|i| (i % 251) as u8).collect();
        let expected = data.clone();

        let writer = tokio::spawn(async move {
            client_a.write_all(&data).await.unwrap();
            client_a
        });

        let mut received = vec![0u8; expected.len()];
        client_b.read_exact(&mut received).await.unwrap();
        assert_eq!(received, expected);

        drop(writer.await.unwrap());
        drop(client_b);

        let result = tokio::time::timeout(Duration::from_secs(1), relay_handle).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_tunnel_ends_on_eof() {
        let (client_a, server_a) = duplex(1024);
        let (client_b, server_b) = duplex(1024);

        let relay_handle = tokio::spawn(async move { tunnel(server_a, server_b).await });

        drop(client_a);
        drop(client_b);

        let result = tokio::time::timeout(Duration::from_secs(1), relay_handle).await;
        assert!(result.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_pump_counts_bytes() {
        let (mut tx, mut rx) = duplex(1024);
        let mut sink = Vec::new();

        tx.write_all(b"12345").await.unwrap();
        drop(tx);

        let total = pump(&mut rx, &mut sink).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(sink, b"12345");
    }
}
