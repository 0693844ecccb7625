//! Client-side UDP tunnel for an established UDP association.

use crate::addr::SocksAddr;
use crate::consts::MAX_UDP_PACKET;
use crate::error::{Result, SocksError};
use crate::packet::{encode_datagram, parse_datagram};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A datagram tunnel through a SOCKS5 server.
///
/// Wraps a locally bound socket and the server's UDP endpoint. The TCP
/// control connection is watched in the background: the association dies
/// with it, so every operation first checks the watchdog's flag.
#[derive(Debug)]
pub struct UdpTunnel {
    socket: UdpSocket,
    server_ep: SocketAddr,
    closed: watch::Receiver<bool>,
    watchdog: JoinHandle<()>,
}

impl UdpTunnel {
    pub(super) async fn new<T>(transport: T, server_ep: SocketAddr) -> Result<Self>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let bind_addr: SocketAddr = match server_ep {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(bind_addr).await?;

        let (closed_tx, closed) = watch::channel(false);
        let watchdog = tokio::spawn(watch_control(transport, closed_tx));

        Ok(UdpTunnel {
            socket,
            server_ep,
            closed,
            watchdog,
        })
    }

    /// The local endpoint of the tunnel's datagram socket.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// The server's UDP endpoint datagrams are relayed through.
    pub fn server_endpoint(&self) -> SocketAddr {
        self.server_ep
    }

    fn check_control(&self) -> Result<()> {
        if *self.closed.borrow() {
            Err(SocksError::ControlClosed)
        } else {
            Ok(())
        }
    }

    /// Receive one relayed datagram into `buf`.
    ///
    /// Returns the payload length and the datagram's peer. The peer is the
    /// envelope's destination field, i.e. the original target the remote
    /// datagram answers for, not the relaying server.
    pub async fn read_from(&mut self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        self.check_control()?;

        let mut raw = vec![0u8; MAX_UDP_PACKET];
        let (n, from) = self.socket.recv_from(&mut raw).await?;
        debug!("udp tunnel: {} envelope bytes from {}", n, from);

        let (addr, port, payload) = parse_datagram(&raw[..n])?;
        let peer = match addr {
            SocksAddr::V4(ip) => SocketAddr::new(IpAddr::V4(ip), port),
            SocksAddr::V6(ip) => SocketAddr::new(IpAddr::V6(ip), port),
            SocksAddr::Domain(_) => {
                return Err(SocksError::BadAddressType(addr.atyp()));
            }
        };

        let len = payload.len().min(buf.len());
        buf[..len].copy_from_slice(&payload[..len]);
        Ok((len, peer))
    }

    /// Send `buf` to `peer` through the association.
    ///
    /// The return value counts payload bytes only.
    pub async fn write_to(&mut self, buf: &[u8], peer: SocketAddr) -> Result<usize> {
        self.write_to_socks_addr(buf, &SocksAddr::from_ip(peer.ip()), peer.port())
            .await
    }

    /// Send `buf` to a SOCKS address, allowing domain destinations the
    /// server resolves.
    pub async fn write_to_socks_addr(
        &mut self,
        buf: &[u8],
        addr: &SocksAddr,
        port: u16,
    ) -> Result<usize> {
        self.check_control()?;

        let packet = encode_datagram(addr, port, buf);
        let n = self.socket.send_to(&packet, self.server_ep).await?;
        if n != packet.len() {
            warn!(
                "udp tunnel: short write to server: {} of {} bytes",
                n,
                packet.len()
            );
        }

        let overhead = packet.len() - buf.len();
        Ok(n.saturating_sub(overhead))
    }
}

impl Drop for UdpTunnel {
    fn drop(&mut self) {
        // ends the watchdog and with it the TCP control connection
        self.watchdog.abort();
    }
}

/// Hold the TCP control connection open and flag its death. Payload on the
/// control connection during an association is a protocol violation.
async fn watch_control<T>(mut transport: T, closed_tx: watch::Sender<bool>)
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut byte = [0u8; 1];
    loop {
        match transport.read(&mut byte).await {
            Ok(0) => break,
            Ok(_) => warn!("udp tunnel: data received on TCP control connection"),
            Err(err) => {
                debug!("udp tunnel: control connection read failed: {}", err);
                break;
            }
        }
    }
    let _ = closed_tx.send(true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn operations_fail_after_control_close() {
        let (server_end, client_end) = duplex(64);
        let server_ep: SocketAddr = "127.0.0.1:1080".parse().unwrap();
        let mut tunnel = UdpTunnel::new(client_end, server_ep).await.unwrap();

        // control connection dies
        drop(server_end);
        tunnel.closed.changed().await.unwrap();

        let err = tunnel.write_to(b"x", server_ep).await.unwrap_err();
        assert!(matches!(err, SocksError::ControlClosed));
        assert_eq!(err.to_string(), "TCP control connection closed");

        let mut buf = [0u8; 16];
        let err = tunnel.read_from(&mut buf).await.unwrap_err();
        assert!(matches!(err, SocksError::ControlClosed));
    }

    #[tokio::test]
    async fn write_counts_payload_bytes_only() {
        let (_server_end, client_end) = duplex(64);

        // a throwaway socket stands in for the server's UDP endpoint
        let sink = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_ep = sink.local_addr().unwrap();

        let mut tunnel = UdpTunnel::new(client_end, server_ep).await.unwrap();
        let n = tunnel.write_to(b"payload", server_ep).await.unwrap();
        assert_eq!(n, 7);

        let mut raw = [0u8; 64];
        let (len, _) = sink.recv_from(&mut raw).await.unwrap();
        let (addr, port, payload) = parse_datagram(&raw[..len]).unwrap();
        assert_eq!(addr, SocksAddr::V4("127.0.0.1".parse().unwrap()));
        assert_eq!(port, server_ep.port());
        assert_eq!(payload, b"payload");
    }

    #[tokio::test]
    async fn read_returns_envelope_destination_as_peer() {
        let (_server_end, client_end) = duplex(64);

        let fake_server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_ep = fake_server.local_addr().unwrap();
        let mut tunnel = UdpTunnel::new(client_end, server_ep).await.unwrap();
        // the tunnel binds the wildcard address; reach it via loopback
        let tunnel_addr: SocketAddr = ([127, 0, 0, 1], tunnel.local_addr().unwrap().port()).into();

        // server relays a datagram that answers for 9.8.7.6:0x4321
        let origin = SocksAddr::V4("9.8.7.6".parse().unwrap());
        let packet = encode_datagram(&origin, 0x4321, b"answer");
        fake_server.send_to(&packet, tunnel_addr).await.unwrap();

        let mut buf = [0u8; 64];
        let (n, peer) = tunnel.read_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"answer");
        assert_eq!(peer, "9.8.7.6:17185".parse().unwrap());
    }
}
