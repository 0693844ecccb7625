//! Shared helpers for the integration tests.

use rand::RngCore;
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::{TcpListener, TcpStream};

/// Size of the junk pool.
pub const JUNK_POOL_SIZE: usize = 1024 * 1024;

static JUNK_POOL: OnceLock<Vec<u8>> = OnceLock::new();

/// A slice into the shared 1 MiB junk pool, generated once and immutable
/// afterwards. Bulk-transfer tests pull arbitrary windows out of it.
pub fn junk(offset: usize, len: usize) -> &'static [u8] {
    let pool = JUNK_POOL.get_or_init(|| {
        let mut pool = vec![0u8; JUNK_POOL_SIZE];
        rand::thread_rng().fill_bytes(&mut pool);
        pool
    });
    &pool[offset..offset + len]
}

/// Bind a listener on an ephemeral loopback port.
pub async fn test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// A connected loopback TCP stream pair.
#[allow(dead_code)]
pub async fn tcp_stream_pair() -> (TcpStream, TcpStream) {
    let (listener, addr) = test_listener().await;
    let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
    (client.unwrap(), accepted.unwrap().0)
}

/// Spawn a SOCKS server with the default NO-AUTH handler, returning its
/// address.
pub async fn spawn_socks_server() -> SocketAddr {
    let (listener, addr) = test_listener().await;
    tokio::spawn(soxide::Server::new("ignored").serve(listener));
    addr
}

/// Spawn a TCP echo server, returning its address.
#[allow(dead_code)]
pub async fn spawn_tcp_echo() -> SocketAddr {
    let (listener, addr) = test_listener().await;
    tokio::spawn(async move {
        loop {
            let (mut conn, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => return,
            };
            tokio::spawn(async move {
                let (mut reader, mut writer) = conn.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

/// Spawn a UDP echo server, returning its address.
#[allow(dead_code)]
pub async fn spawn_udp_echo() -> SocketAddr {
    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 65536];
        loop {
            let (n, peer) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(_) => return,
            };
            let _ = socket.send_to(&buf[..n], peer).await;
        }
    });
    addr
}
