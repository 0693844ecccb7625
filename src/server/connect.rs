//! CONNECT command: outbound dial plus bidirectional stream relay.

use crate::addr::SocksAddr;
use crate::bridge::relay;
use crate::consts::*;
use crate::net::SocketOpts;
use crate::protocol::ServerProtocol;
use anyhow::{Context, Result};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{info, warn};

pub(super) async fn handle(
    mut proto: ServerProtocol<TcpStream>,
    addr: SocksAddr,
    port: u16,
    opts: &SocketOpts,
    connect_timeout: Duration,
    peer: SocketAddr,
) -> Result<()> {
    let target = match connect_target(&addr, port, connect_timeout).await {
        Ok(target) => target,
        Err(err) => {
            proto
                .reject_request(reply_for_io_error(&err))
                .await
                .context("sending failure reply")?;
            return Err(anyhow::Error::new(err)
                .context(format!("connect to {}:{} failed", addr, port)));
        }
    };

    if let Err(err) = opts.apply(&target) {
        warn!("client {}: applying socket options to target: {}", peer, err);
    }

    let local = target
        .local_addr()
        .context("cannot read target local address")?;
    info!("connected to {}:{} from {}", addr, port, local);

    let (bind_addr, bind_port) = SocksAddr::from_socket_addr(local);
    proto.accept_connection(&bind_addr, bind_port).await?;

    let client = proto.into_transport();
    relay(client, target).await?;
    Ok(())
}

/// Dial the target. IP variants connect directly; domain names go through
/// the OS resolver.
async fn connect_target(addr: &SocksAddr, port: u16, timeout: Duration) -> io::Result<TcpStream> {
    let dial = async {
        match addr {
            SocksAddr::V4(ip) => TcpStream::connect(SocketAddr::new((*ip).into(), port)).await,
            SocksAddr::V6(ip) => TcpStream::connect(SocketAddr::new((*ip).into(), port)).await,
            SocksAddr::Domain(domain) => TcpStream::connect((domain.as_str(), port)).await,
        }
    };
    match tokio::time::timeout(timeout, dial).await {
        Ok(res) => res,
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect timeout")),
    }
}

/// Map an outbound dial failure to a reply code.
fn reply_for_io_error(err: &io::Error) -> u8 {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => REPLY_CONNECTION_REFUSED,
        io::ErrorKind::TimedOut => REPLY_HOST_UNREACHABLE,
        io::ErrorKind::AddrNotAvailable => REPLY_HOST_UNREACHABLE,
        io::ErrorKind::PermissionDenied => REPLY_NOT_ALLOWED,
        _ => REPLY_GENERAL_FAILURE,
    }
}
