//! End-to-end tests over real loopback sockets: raw-byte conversations
//! against the server, and full client-through-server round trips for
//! CONNECT and UDP ASSOCIATE.

mod common;

use common::*;
use soxide::addr::SocksAddr;
use soxide::client::Client;
use soxide::protocol::ServerProtocol;
use soxide::server::{AuthHandler, Server};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::test]
async fn server_connect_conversation() {
    let proxy = spawn_socks_server().await;
    let (target_listener, target) = test_listener().await;

    let mut conn = TcpStream::connect(proxy).await.unwrap();

    // greeting offering NO-AUTH and USERNAME/PASSWORD
    conn.write_all(&[0x05, 0x02, 0x00, 0x02]).await.unwrap();
    let mut selected = [0u8; 2];
    conn.read_exact(&mut selected).await.unwrap();
    assert_eq!(selected, [0x05, 0x00]);

    // CONNECT to the target listener
    let target_ip = match target.ip() {
        IpAddr::V4(ip) => ip.octets(),
        IpAddr::V6(_) => unreachable!(),
    };
    let mut request = vec![0x05, 0x01, 0x00, 0x01];
    request.extend_from_slice(&target_ip);
    request.extend_from_slice(&target.port().to_be_bytes());
    conn.write_all(&request).await.unwrap();

    let (mut target_conn, _) = target_listener.accept().await.unwrap();

    let mut reply = [0u8; 10];
    conn.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply[..4], &[0x05, 0x00, 0x00, 0x01]);
    // bind fields carry the proxy's outbound local endpoint
    let bind_ip = Ipv4Addr::new(reply[4], reply[5], reply[6], reply[7]);
    let bind_port = u16::from_be_bytes([reply[8], reply[9]]);
    assert_eq!(
        target_conn.peer_addr().unwrap(),
        SocketAddr::new(IpAddr::V4(bind_ip), bind_port)
    );

    // target -> client
    target_conn.write_all(b"asdf").await.unwrap();
    let mut buf = [0u8; 4];
    conn.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"asdf");

    // client -> target
    conn.write_all(b"1234").await.unwrap();
    target_conn.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"1234");
}

#[tokio::test]
async fn server_rejects_auth() {
    struct RejectAll;

    #[async_trait::async_trait]
    impl AuthHandler for RejectAll {
        async fn select(
            &self,
            _methods: &[u8],
            proto: &mut ServerProtocol<TcpStream>,
        ) -> anyhow::Result<()> {
            proto.reject_auth_method().await?;
            Ok(())
        }
    }

    let (listener, proxy) = test_listener().await;
    tokio::spawn(
        Server::new("ignored")
            .with_auth_handler(Arc::new(RejectAll))
            .serve(listener),
    );

    let mut conn = TcpStream::connect(proxy).await.unwrap();
    conn.write_all(&[0x05, 0x01, 0x00]).await.unwrap();

    let mut selected = [0u8; 2];
    conn.read_exact(&mut selected).await.unwrap();
    assert_eq!(selected, [0x05, 0xFF]);

    let mut rest = [0u8; 1];
    assert_eq!(conn.read(&mut rest).await.unwrap(), 0);
}

#[tokio::test]
async fn server_rejects_unsupported_command() {
    let proxy = spawn_socks_server().await;
    let mut conn = TcpStream::connect(proxy).await.unwrap();

    conn.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut selected = [0u8; 2];
    conn.read_exact(&mut selected).await.unwrap();
    assert_eq!(selected, [0x05, 0x00]);

    // BIND request
    conn.write_all(&[0x05, 0x02, 0x00, 0x01, 1, 2, 3, 4, 0x12, 0x34])
        .await
        .unwrap();
    let mut reply = [0u8; 10];
    conn.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x07, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);
}

#[tokio::test]
async fn server_rejects_failed_connect() {
    let proxy = spawn_socks_server().await;

    // bind a listener then drop it so the port is (very likely) closed
    let (closed_listener, closed) = test_listener().await;
    drop(closed_listener);

    let mut conn = TcpStream::connect(proxy).await.unwrap();
    conn.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut selected = [0u8; 2];
    conn.read_exact(&mut selected).await.unwrap();

    let mut request = vec![0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1];
    request.extend_from_slice(&closed.port().to_be_bytes());
    conn.write_all(&request).await.unwrap();

    let mut reply = [0u8; 10];
    conn.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[0], 0x05);
    assert_eq!(reply[1], 0x05); // connection refused
    assert_eq!(&reply[4..], &[0, 0, 0, 0, 0, 0]);
}

#[tokio::test]
async fn client_through_server_connect() {
    let proxy = spawn_socks_server().await;
    let echo = spawn_tcp_echo().await;

    let transport = TcpStream::connect(proxy).await.unwrap();
    let tunnel = Client::new(transport)
        .connect(&echo.ip().to_string(), echo.port())
        .await
        .unwrap();

    assert!(matches!(tunnel.bind_addr, SocksAddr::V4(_)));
    assert_ne!(tunnel.bind_port, 0);

    // bulk transfer through the relay, writing and reading concurrently
    let payload = junk(4096, 256 * 1024);
    let (mut read_half, mut write_half) = tokio::io::split(tunnel);
    let writer = tokio::spawn(async move {
        write_half.write_all(payload).await.unwrap();
        write_half
    });

    let mut received = vec![0u8; payload.len()];
    read_half.read_exact(&mut received).await.unwrap();
    assert_eq!(received.as_slice(), payload);
    writer.await.unwrap();
}

#[tokio::test]
async fn udp_associate_through_server() {
    let proxy = spawn_socks_server().await;
    let echo = spawn_udp_echo().await;

    let transport = TcpStream::connect(proxy).await.unwrap();
    let mut tunnel = Client::new(transport).udp_associate().await.unwrap();

    // the server binds its datagram socket unspecified, so the tunnel must
    // have substituted the proxy's IP
    assert_eq!(tunnel.server_endpoint().ip(), proxy.ip());

    let payload = junk(0, 512);
    let sent = tunnel.write_to(payload, echo).await.unwrap();
    assert_eq!(sent, payload.len());

    let mut buf = vec![0u8; 2048];
    let (n, peer) = tunnel.read_from(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], payload);
    // the reported peer is the original destination the answer came from
    assert_eq!(peer, echo);
}

#[tokio::test]
async fn udp_associate_multiple_datagrams() {
    let proxy = spawn_socks_server().await;
    let echo = spawn_udp_echo().await;

    let transport = TcpStream::connect(proxy).await.unwrap();
    let mut tunnel = Client::new(transport).udp_associate().await.unwrap();

    for i in 0..5usize {
        let payload = junk(i * 1000, 100 + i);
        tunnel.write_to(payload, echo).await.unwrap();

        let mut buf = vec![0u8; 2048];
        let (n, peer) = tunnel.read_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], payload);
        assert_eq!(peer, echo);
    }
}
