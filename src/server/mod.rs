//! SOCKS5 server: accept loop, session orchestration and the pluggable
//! auth handler seam.
//!
//! Every accepted connection runs as its own task. A session drives the
//! [`ServerProtocol`] machine through the handshake, then dispatches on
//! the command byte: CONNECT hands the surrendered transport to the
//! stream relay, UDP ASSOCIATE to the datagram relay. Anything else is
//! answered with "command not supported".

mod connect;
mod udp;

use crate::consts::*;
use crate::error::SocksError;
use crate::net::SocketOpts;
use crate::protocol::{ServerProtocol, ServerState};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// Server-side authentication handler.
///
/// Called with the client's offered methods and the protocol machine in
/// `MethodsGot`. The handler must call
/// [`accept_auth_method`](ServerProtocol::accept_auth_method) or
/// [`reject_auth_method`](ServerProtocol::reject_auth_method) exactly
/// once, and may then run its method's sub-protocol on
/// [`transport_mut`](ServerProtocol::transport_mut) before returning. The
/// session calls `auth_done` afterwards.
#[async_trait]
pub trait AuthHandler: Send + Sync {
    /// Negotiate one of `methods` on the given machine.
    async fn select(&self, methods: &[u8], proto: &mut ServerProtocol<TcpStream>) -> Result<()>;
}

/// Default handler: accepts NO-AUTH unconditionally.
pub struct NoAuth;

#[async_trait]
impl AuthHandler for NoAuth {
    async fn select(&self, _methods: &[u8], proto: &mut ServerProtocol<TcpStream>) -> Result<()> {
        proto.accept_auth_method(AUTH_METHOD_NONE).await?;
        Ok(())
    }
}

/// A SOCKS5 proxy server.
pub struct Server {
    listen: String,
    auth: Arc<dyn AuthHandler>,
    opts: SocketOpts,
    connect_timeout: Duration,
}

impl Server {
    /// Create a server that will listen on `listen` with the [`NoAuth`]
    /// handler.
    pub fn new(listen: impl Into<String>) -> Self {
        Server {
            listen: listen.into(),
            auth: Arc::new(NoAuth),
            opts: SocketOpts::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Replace the authentication handler.
    pub fn with_auth_handler(mut self, auth: Arc<dyn AuthHandler>) -> Self {
        self.auth = auth;
        self
    }

    /// Replace the TCP socket tuning.
    pub fn with_socket_opts(mut self, opts: SocketOpts) -> Self {
        self.opts = opts;
        self
    }

    /// Replace the outbound connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bind the configured address and serve forever.
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(&self.listen)
            .await
            .with_context(|| format!("cannot listen on {}", self.listen))?;
        self.serve(listener).await
    }

    /// Serve forever on an already-bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        info!("server started on {}", listener.local_addr()?);
        let server = Arc::new(self);

        loop {
            let (conn, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    error!("accept failed: {}", err);
                    continue;
                }
            };
            info!("accept {}", peer);

            let server = server.clone();
            tokio::spawn(async move {
                if let Err(err) = server.handle_connection(conn, peer).await {
                    error!("client {}: {:#}", peer, err);
                }
                info!("client {} gone", peer);
            });
        }
    }

    async fn handle_connection(&self, conn: TcpStream, peer: SocketAddr) -> Result<()> {
        if let Err(err) = self.opts.apply(&conn) {
            warn!("client {}: applying socket options: {}", peer, err);
        }

        let mut proto = ServerProtocol::new(conn);

        let methods = proto.get_auth_methods().await?;
        self.auth.select(&methods, &mut proto).await?;
        match proto.state() {
            ServerState::Auth => proto.auth_done(),
            ServerState::Close => {
                debug!("client {}: auth methods rejected", peer);
                return Ok(());
            }
            state => panic!("auth handler left protocol in state {:?}", state),
        }

        let (cmd, addr, port) = proto.get_request().await?;
        match cmd {
            CMD_CONNECT => {
                info!("client {}: cmd connect, target {}:{}", peer, addr, port);
                connect::handle(proto, addr, port, &self.opts, self.connect_timeout, peer).await
            }
            CMD_UDP_ASSOCIATE => {
                info!("client {}: cmd udp, client from {}:{}", peer, addr, port);
                udp::handle(proto, peer).await
            }
            other => {
                warn!("client {}: unsupported command {:#04x}", peer, other);
                proto.reject_request(REPLY_CMD_NOT_SUPPORTED).await?;
                Err(SocksError::BadCommand(other).into())
            }
        }
    }
}
