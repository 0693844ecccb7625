//! Embeddable SOCKS5 client.
//!
//! [`Client`] wraps a transport already connected to a SOCKS server and
//! drives the [`ClientProtocol`] machine: [`connect`](Client::connect)
//! yields a [`StreamTunnel`], [`udp_associate`](Client::udp_associate) a
//! [`UdpTunnel`]. Auth handlers are a map from method byte to handler;
//! only NO-AUTH is installed by default.

mod udp;

pub use udp::UdpTunnel;

use crate::addr::SocksAddr;
use crate::consts::*;
use crate::error::{Result, SocksError};
use crate::net::RemoteAddr;
use crate::protocol::ClientProtocol;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::debug;

/// Client-side authentication handler for one method byte.
///
/// Called in state `Auth` after the server selects the method; performs
/// the method's sub-protocol on
/// [`transport_mut`](ClientProtocol::transport_mut) and returns. The
/// session calls `auth_done` afterwards.
#[async_trait]
pub trait ClientAuthHandler<T: Send>: Send + Sync {
    /// Run the sub-protocol for the selected method.
    async fn authenticate(&self, proto: &mut ClientProtocol<T>) -> anyhow::Result<()>;
}

/// Built-in NO-AUTH handler; the method has no sub-protocol.
pub struct NoAuthClient;

#[async_trait]
impl<T: Send> ClientAuthHandler<T> for NoAuthClient {
    async fn authenticate(&self, _proto: &mut ClientProtocol<T>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A SOCKS5 client session over a connected transport.
pub struct Client<T> {
    proto: ClientProtocol<T>,
    auth_handlers: HashMap<u8, Box<dyn ClientAuthHandler<T>>>,
}

impl<T> Client<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a transport, installing the NO-AUTH handler.
    pub fn new(transport: T) -> Self {
        let mut auth_handlers: HashMap<u8, Box<dyn ClientAuthHandler<T>>> = HashMap::new();
        auth_handlers.insert(AUTH_METHOD_NONE, Box::new(NoAuthClient));
        Client {
            proto: ClientProtocol::new(transport),
            auth_handlers,
        }
    }

    /// Install a handler for an additional method byte.
    pub fn with_auth_handler(
        mut self,
        method: u8,
        handler: Box<dyn ClientAuthHandler<T>>,
    ) -> Self {
        self.auth_handlers.insert(method, handler);
        self
    }

    /// Offer the installed methods, run the selected handler, finish auth.
    async fn negotiate(&mut self) -> Result<()> {
        let mut methods: Vec<u8> = self.auth_handlers.keys().copied().collect();
        methods.sort_unstable();

        self.proto.send_auth_methods(&methods).await?;
        let method = self.proto.receive_auth_method().await?;
        if method == AUTH_METHOD_REJECT {
            return Err(SocksError::MethodsRejected(methods));
        }

        let handler = self
            .auth_handlers
            .get(&method)
            .ok_or(SocksError::MethodNotImplemented(method))?;
        handler
            .authenticate(&mut self.proto)
            .await
            .map_err(|err| SocksError::AuthHandler(err.into()))?;
        self.proto.auth_done();
        Ok(())
    }

    /// Issue a CONNECT for `host:port` and return the established tunnel.
    ///
    /// IP literal hosts are sent in their IPv4/IPv6 form; anything else
    /// travels as a domain for the server to resolve.
    pub async fn connect(mut self, host: &str, port: u16) -> Result<StreamTunnel<T>> {
        self.negotiate().await?;

        let target = match host.parse::<IpAddr>() {
            Ok(ip) => SocksAddr::from_ip(ip),
            Err(_) => SocksAddr::Domain(host.to_string()),
        };
        self.proto.send_command(CMD_CONNECT, &target, port).await?;

        let (reply, bind_addr, bind_port) = self.proto.receive_reply().await?;
        if reply != REPLY_SUCCEEDED {
            return Err(SocksError::BadReply(reply));
        }
        debug!("connect established, bind {}:{}", bind_addr, bind_port);

        Ok(StreamTunnel {
            transport: self.proto.into_transport(),
            bind_addr,
            bind_port,
        })
    }

    /// Issue a UDP ASSOCIATE and return the datagram tunnel.
    ///
    /// The server's UDP endpoint comes from the reply; an unspecified bind
    /// address is substituted with the TCP peer's IP, which requires the
    /// transport to report one.
    pub async fn udp_associate(mut self) -> Result<UdpTunnel>
    where
        T: RemoteAddr + Send + 'static,
    {
        self.negotiate().await?;

        self.proto
            .send_command(CMD_UDP_ASSOCIATE, &SocksAddr::unspecified(), 0)
            .await?;

        let (reply, bind_addr, bind_port) = self.proto.receive_reply().await?;
        if reply != REPLY_SUCCEEDED {
            return Err(SocksError::BadReply(reply));
        }

        let transport = self.proto.into_transport();
        let server_ep = if bind_addr.is_unspecified() {
            let peer = transport.remote_addr().ok_or(SocksError::NoRemoteAddr)?;
            SocketAddr::new(peer.ip(), bind_port)
        } else {
            bind_addr.resolve(bind_port).await?
        };
        debug!("udp associate established, server endpoint {}", server_ep);

        UdpTunnel::new(transport, server_ep).await
    }
}

/// An established CONNECT tunnel: the transport plus the server's bind
/// endpoint from the reply.
#[derive(Debug)]
pub struct StreamTunnel<T> {
    transport: T,
    /// Bind address reported by the server.
    pub bind_addr: SocksAddr,
    /// Bind port reported by the server.
    pub bind_port: u16,
}

impl<T> StreamTunnel<T> {
    /// Unwrap the underlying transport.
    pub fn into_inner(self) -> T {
        self.transport
    }
}

impl<T: AsyncRead + Unpin> AsyncRead for StreamTunnel<T> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.transport).poll_read(cx, buf)
    }
}

impl<T: AsyncWrite + Unpin> AsyncWrite for StreamTunnel<T> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.transport).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.transport).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.transport).poll_shutdown(cx)
    }
}
