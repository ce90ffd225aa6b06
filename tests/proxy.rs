//! End-to-end tests against live listeners on the loopback interface.
//!
//! Every test starts a real server on an ephemeral port, speaks the raw
//! protocol bytes a client would send, and checks the replies and the relay
//! behavior.

use socksd::config::Config;
use socksd::server::{Server, SessionRegistry, SocksVersion};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};

/// Start a proxy listener of the given version on an ephemeral port.
async fn start_server(
    mut config: Config,
    version: SocksVersion,
) -> (SocketAddr, Arc<SessionRegistry>) {
    config.socks4.address = "127.0.0.1".to_string();
    config.socks4.port = 0;
    config.socks5.address = "127.0.0.1".to_string();
    config.socks5.port = 0;

    let server = Server::bind(Arc::new(config), version).await.unwrap();
    let addr = server.local_addr().unwrap();
    let registry = server.registry();
    tokio::spawn(server.run());

    (addr, registry)
}

/// Start a TCP echo server that serves every connection until EOF.
async fn start_tcp_echo() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if stream.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    addr
}

/// A loopback port with nothing listening on it.
async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn socks4_connect_request(target: SocketAddr, user_id: &[u8]) -> Vec<u8> {
    let SocketAddr::V4(target) = target else {
        panic!("SOCKS4 targets are IPv4")
    };
    let mut request = vec![0x04, 0x01];
    request.extend_from_slice(&target.port().to_be_bytes());
    request.extend_from_slice(&target.ip().octets());
    request.extend_from_slice(user_id);
    request.push(0x00);
    request
}

async fn wait_for_empty(registry: &SessionRegistry) {
    for _ in 0..100 {
        if registry.is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("registry still has sessions");
}

#[tokio::test]
async fn socks4_connect_and_relay() {
    let echo = start_tcp_echo().await;
    let (proxy, registry) = start_server(Config::default(), SocksVersion::Socks4).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client
        .write_all(&socks4_connect_request(echo, b""))
        .await
        .unwrap();

    let mut reply = [0u8; 8];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[0], 0x00);
    assert_eq!(reply[1], 90);
    assert_eq!(u16::from_be_bytes([reply[2], reply[3]]), echo.port());

    client.write_all(b"hello through socks4").await.unwrap();
    let mut buf = [0u8; 20];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"hello through socks4");

    drop(client);
    wait_for_empty(&registry).await;
}

#[tokio::test]
async fn socks4_connect_failure_gets_code_92() {
    let (proxy, _registry) = start_server(Config::default(), SocksVersion::Socks4).await;
    let dead: SocketAddr = format!("127.0.0.1:{}", free_port().await).parse().unwrap();

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client
        .write_all(&socks4_connect_request(dead, b""))
        .await
        .unwrap();

    let mut reply = [0u8; 8];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x00, 92, 0, 0, 0, 0, 0, 0]);

    // The session closes after a failure reply.
    let mut buf = [0u8; 1];
    assert_eq!(client.read(&mut buf).await.unwrap(), 0);
}

#[tokio::test]
async fn socks4_user_id_mismatch_gets_code_93() {
    let echo = start_tcp_echo().await;
    let mut config = Config::default();
    config.socks4.user_id = "operator".to_string();
    let (proxy, _registry) = start_server(config, SocksVersion::Socks4).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client
        .write_all(&socks4_connect_request(echo, b"intruder"))
        .await
        .unwrap();

    let mut reply = [0u8; 8];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], 93);
}

#[tokio::test]
async fn socks4_user_id_match_is_accepted() {
    let echo = start_tcp_echo().await;
    let mut config = Config::default();
    config.socks4.user_id = "operator".to_string();
    let (proxy, _registry) = start_server(config, SocksVersion::Socks4).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client
        .write_all(&socks4_connect_request(echo, b"operator"))
        .await
        .unwrap();

    let mut reply = [0u8; 8];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], 90);
}

#[tokio::test]
async fn socks4_connect_disabled_gets_code_91() {
    let echo = start_tcp_echo().await;
    let mut config = Config::default();
    config.socks4.enable_connect = false;
    let (proxy, _registry) = start_server(config, SocksVersion::Socks4).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client
        .write_all(&socks4_connect_request(echo, b""))
        .await
        .unwrap();

    let mut reply = [0u8; 8];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], 91);
}

#[tokio::test]
async fn socks4a_domain_connect() {
    let echo = start_tcp_echo().await;
    let (proxy, _registry) = start_server(Config::default(), SocksVersion::Socks4).await;

    // DSTIP 0.0.0.1 announces the 4A form: a domain follows the USER-ID.
    let mut request = vec![0x04, 0x01];
    request.extend_from_slice(&echo.port().to_be_bytes());
    request.extend_from_slice(&[0, 0, 0, 1]);
    request.extend_from_slice(b"u1\0");
    request.extend_from_slice(b"127.0.0.1\0");

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(&request).await.unwrap();

    let mut reply = [0u8; 8];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], 90);

    client.write_all(b"4a").await.unwrap();
    let mut buf = [0u8; 2];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"4a");
}

#[tokio::test]
async fn socks4_malformed_request_closes_without_reply() {
    let (proxy, registry) = start_server(Config::default(), SocksVersion::Socks4).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    // Version byte 5 on the SOCKS4 port.
    client
        .write_all(&[0x05, 0x01, 0x00, 0x50, 1, 2, 3, 4, 0x00])
        .await
        .unwrap();

    let mut buf = [0u8; 8];
    assert_eq!(client.read(&mut buf).await.unwrap(), 0);
    wait_for_empty(&registry).await;
}

#[tokio::test]
async fn socks4_bind_accepts_one_connection() {
    let (proxy, _registry) = start_server(Config::default(), SocksVersion::Socks4).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    // BIND; the destination field names the expected application peer.
    let mut request = vec![0x04, 0x02, 0x00, 0x50, 127, 0, 0, 1];
    request.push(0x00);
    client.write_all(&request).await.unwrap();

    // First reply: the listener endpoint.
    let mut reply = [0u8; 8];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], 90);
    let bound_port = u16::from_be_bytes([reply[2], reply[3]]);
    assert_ne!(bound_port, 0);

    // The "application" connects in.
    let mut application = TcpStream::connect(("127.0.0.1", bound_port)).await.unwrap();

    // Second reply: the accepted peer endpoint.
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], 90);
    assert_eq!(
        u16::from_be_bytes([reply[2], reply[3]]),
        application.local_addr().unwrap().port()
    );

    // Relay runs in both directions.
    application.write_all(b"from-app").await.unwrap();
    let mut buf = [0u8; 8];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"from-app");

    client.write_all(b"from-cli").await.unwrap();
    application.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"from-cli");
}

fn socks5_connect_request(target: SocketAddr) -> Vec<u8> {
    let SocketAddr::V4(target) = target else {
        panic!("tests target IPv4")
    };
    let mut request = vec![0x05, 0x01, 0x00, 0x01];
    request.extend_from_slice(&target.ip().octets());
    request.extend_from_slice(&target.port().to_be_bytes());
    request
}

/// Run the no-auth method negotiation.
async fn socks5_greet(client: &mut TcpStream) {
    client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut reply = [0u8; 2];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x00]);
}

#[tokio::test]
async fn socks5_noauth_connect_and_relay() {
    let echo = start_tcp_echo().await;
    let (proxy, registry) = start_server(Config::default(), SocksVersion::Socks5).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    socks5_greet(&mut client).await;

    client
        .write_all(&socks5_connect_request(echo))
        .await
        .unwrap();

    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply[..4], &[0x05, 0x00, 0x00, 0x01]);
    assert_eq!(u16::from_be_bytes([reply[8], reply[9]]), echo.port());

    client.write_all(b"hello through socks5").await.unwrap();
    let mut buf = [0u8; 20];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"hello through socks5");

    drop(client);
    wait_for_empty(&registry).await;
}

#[tokio::test]
async fn socks5_connect_failure_gets_host_codes() {
    let (proxy, _registry) = start_server(Config::default(), SocksVersion::Socks5).await;
    let dead: SocketAddr = format!("127.0.0.1:{}", free_port().await).parse().unwrap();

    let mut client = TcpStream::connect(proxy).await.unwrap();
    socks5_greet(&mut client).await;
    client
        .write_all(&socks5_connect_request(dead))
        .await
        .unwrap();

    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();
    // Connect failure answers "network unreachable".
    assert_eq!(reply[1], 0x03);
}

#[tokio::test]
async fn socks5_domain_connect() {
    let echo = start_tcp_echo().await;
    let (proxy, _registry) = start_server(Config::default(), SocksVersion::Socks5).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    socks5_greet(&mut client).await;

    let domain = b"127.0.0.1";
    let mut request = vec![0x05, 0x01, 0x00, 0x03, domain.len() as u8];
    request.extend_from_slice(domain);
    request.extend_from_slice(&echo.port().to_be_bytes());
    client.write_all(&request).await.unwrap();

    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], 0x00);

    client.write_all(b"domain").await.unwrap();
    let mut buf = [0u8; 6];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"domain");
}

#[tokio::test]
async fn socks5_unresolvable_domain_gets_host_unreachable() {
    let (proxy, _registry) = start_server(Config::default(), SocksVersion::Socks5).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    socks5_greet(&mut client).await;

    let domain = b"this-domain-does-not-exist-12345.invalid";
    let mut request = vec![0x05, 0x01, 0x00, 0x03, domain.len() as u8];
    request.extend_from_slice(domain);
    request.extend_from_slice(&80u16.to_be_bytes());
    client.write_all(&request).await.unwrap();

    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], 0x04);
}

fn credentials_config() -> Config {
    let mut config = Config::default();
    config.socks5.username = "alice".to_string();
    config.socks5.password = "s3cr3t".to_string();
    config
}

#[tokio::test]
async fn socks5_password_auth_connect() {
    let echo = start_tcp_echo().await;
    let (proxy, _registry) = start_server(credentials_config(), SocksVersion::Socks5).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(&[0x05, 0x01, 0x02]).await.unwrap();
    let mut reply = [0u8; 2];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x02]);

    // RFC 1929 sub-negotiation for "alice" / "s3cr3t".
    client
        .write_all(&[
            0x01, 0x05, 0x61, 0x6c, 0x69, 0x63, 0x65, 0x06, 0x73, 0x33, 0x63, 0x72, 0x33, 0x74,
        ])
        .await
        .unwrap();
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x01, 0x00]);

    client
        .write_all(&socks5_connect_request(echo))
        .await
        .unwrap();
    let mut connect_reply = [0u8; 10];
    client.read_exact(&mut connect_reply).await.unwrap();
    assert_eq!(connect_reply[1], 0x00);
}

#[tokio::test]
async fn socks5_wrong_password_terminates() {
    let (proxy, registry) = start_server(credentials_config(), SocksVersion::Socks5).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(&[0x05, 0x01, 0x02]).await.unwrap();
    let mut reply = [0u8; 2];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x02]);

    let mut auth = vec![0x01, 0x05];
    auth.extend_from_slice(b"alice");
    auth.push(0x05);
    auth.extend_from_slice(b"wrong");
    client.write_all(&auth).await.unwrap();

    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x01, 0x01]);

    // No CONNECT is possible; the session is gone.
    let mut buf = [0u8; 1];
    assert_eq!(client.read(&mut buf).await.unwrap(), 0);
    wait_for_empty(&registry).await;
}

#[tokio::test]
async fn socks5_no_acceptable_method_gets_ff() {
    let (proxy, _registry) = start_server(credentials_config(), SocksVersion::Socks5).await;

    // Credentials are required but the client only offers "no auth".
    let mut client = TcpStream::connect(proxy).await.unwrap();
    client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();

    let mut reply = [0u8; 2];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0xff]);

    let mut buf = [0u8; 1];
    assert_eq!(client.read(&mut buf).await.unwrap(), 0);
}

#[tokio::test]
async fn socks5_unknown_command_gets_code_7() {
    let (proxy, _registry) = start_server(Config::default(), SocksVersion::Socks5).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    socks5_greet(&mut client).await;

    client
        .write_all(&[0x05, 0x09, 0x00, 0x01, 127, 0, 0, 1, 0x00, 0x50])
        .await
        .unwrap();

    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], 0x07);
}

#[tokio::test]
async fn socks5_disabled_command_gets_not_allowed() {
    let echo = start_tcp_echo().await;
    let mut config = Config::default();
    config.socks5.enable_connect = false;
    let (proxy, _registry) = start_server(config, SocksVersion::Socks5).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    socks5_greet(&mut client).await;
    client
        .write_all(&socks5_connect_request(echo))
        .await
        .unwrap();

    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], 0x02);
}

#[tokio::test]
async fn socks5_bind_accepts_one_connection() {
    let (proxy, _registry) = start_server(Config::default(), SocksVersion::Socks5).await;

    let mut client = TcpStream::connect(proxy).await.unwrap();
    socks5_greet(&mut client).await;

    client
        .write_all(&[0x05, 0x02, 0x00, 0x01, 0, 0, 0, 0, 0x00, 0x00])
        .await
        .unwrap();

    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], 0x00);
    let bound_port = u16::from_be_bytes([reply[8], reply[9]]);
    assert_ne!(bound_port, 0);

    let mut application = TcpStream::connect(("127.0.0.1", bound_port)).await.unwrap();

    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], 0x00);
    assert_eq!(
        u16::from_be_bytes([reply[8], reply[9]]),
        application.local_addr().unwrap().port()
    );

    application.write_all(b"from-app").await.unwrap();
    let mut buf = [0u8; 8];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"from-app");
}

#[tokio::test]
async fn socks5_udp_associate_round_trip() {
    let (proxy, registry) = start_server(Config::default(), SocksVersion::Socks5).await;

    // UDP echo standing in for the application.
    let app_socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let app_addr = app_socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 65535];
        while let Ok((len, from)) = app_socket.recv_from(&mut buf).await {
            let _ = app_socket.send_to(&buf[..len], from).await;
        }
    });

    let mut client = TcpStream::connect(proxy).await.unwrap();
    socks5_greet(&mut client).await;

    // UDP ASSOCIATE with a zero expected endpoint.
    client
        .write_all(&[0x05, 0x03, 0x00, 0x01, 0, 0, 0, 0, 0x00, 0x00])
        .await
        .unwrap();

    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply[..4], &[0x05, 0x00, 0x00, 0x01]);
    let relay_port = u16::from_be_bytes([reply[8], reply[9]]);
    assert_ne!(relay_port, 0);

    // Send an encapsulated datagram through the relay.
    let udp_client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let SocketAddr::V4(app_v4) = app_addr else {
        panic!()
    };
    let mut datagram = vec![0x00, 0x00, 0x00, 0x01];
    datagram.extend_from_slice(&app_v4.ip().octets());
    datagram.extend_from_slice(&app_v4.port().to_be_bytes());
    datagram.extend_from_slice(b"udp payload");
    udp_client
        .send_to(&datagram, ("127.0.0.1", relay_port))
        .await
        .unwrap();

    // The echoed payload comes back wrapped in an envelope naming the app.
    let mut buf = [0u8; 65535];
    let (len, _) = tokio::time::timeout(Duration::from_secs(2), udp_client.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(&buf[..4], &[0x00, 0x00, 0x00, 0x01]);
    assert_eq!(&buf[4..8], &app_v4.ip().octets());
    assert_eq!(&buf[8..10], &app_v4.port().to_be_bytes());
    assert_eq!(&buf[10..len], b"udp payload");

    // Closing the TCP connection tears the association down.
    drop(client);
    wait_for_empty(&registry).await;
}

#[tokio::test]
async fn registry_sees_one_removal_per_connection() {
    let echo = start_tcp_echo().await;
    let (proxy, registry) = start_server(Config::default(), SocksVersion::Socks4).await;

    for _ in 0..3 {
        let mut client = TcpStream::connect(proxy).await.unwrap();
        client
            .write_all(&socks4_connect_request(echo, b""))
            .await
            .unwrap();
        let mut reply = [0u8; 8];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[1], 90);
        drop(client);
    }

    wait_for_empty(&registry).await;
}
