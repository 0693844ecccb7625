//! UDP ASSOCIATE command: two-socket datagram relay with a TCP watchdog.
//!
//! The association uses one socket facing the client (its bind endpoint
//! goes into the success reply) and one facing the remote targets, which
//! keeps the pairing by source address trivial. Three producers feed the
//! session loop: the TCP watchdog and one reader task per socket. The
//! watchdog's completion is the cancellation signal; per-datagram decode
//! and resolve failures never end the association, socket errors do.

use crate::addr::SocksAddr;
use crate::consts::MAX_UDP_PACKET;
use crate::packet::{encode_datagram, parse_datagram};
use crate::protocol::ServerProtocol;
use anyhow::{Context, Result};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// One received datagram, or the socket error that ended the reader.
type DatagramEvent = io::Result<(Vec<u8>, SocketAddr)>;

pub(super) async fn handle(mut proto: ServerProtocol<TcpStream>, peer: SocketAddr) -> Result<()> {
    let client_sock = Arc::new(
        UdpSocket::bind("0.0.0.0:0")
            .await
            .context("cannot bind client-facing udp socket")?,
    );
    let remote_sock = Arc::new(
        UdpSocket::bind("0.0.0.0:0")
            .await
            .context("cannot bind remote-facing udp socket")?,
    );

    let client_local = client_sock
        .local_addr()
        .context("cannot read client-facing udp bind")?;
    info!(
        "client {}: udp bind client {} remote {}",
        peer,
        client_local,
        remote_sock.local_addr()?
    );

    let (bind_addr, bind_port) = SocksAddr::from_socket_addr(client_local);
    proto.accept_udp_association(&bind_addr, bind_port).await?;

    // The TCP connection now only signals the association's lifetime.
    let transport = proto.into_transport();
    let (control_read, _control_write) = tokio::io::split(transport);
    let (ctrl_tx, ctrl_rx) = oneshot::channel();
    tokio::spawn(watch_control(control_read, ctrl_tx, peer));

    let (cancel_tx, _) = broadcast::channel(1);
    let mut client_rx = Some(spawn_reader(client_sock.clone(), cancel_tx.subscribe()));
    let mut remote_rx = Some(spawn_reader(remote_sock.clone(), cancel_tx.subscribe()));
    let mut ctrl = Some(ctrl_rx);

    // Advisory pin of the client's datagram source; updated (and logged)
    // when the observed source changes.
    let mut client_addr: Option<SocketAddr> = None;
    let mut session_err: Option<anyhow::Error> = None;

    while client_rx.is_some() || remote_rx.is_some() {
        tokio::select! {
            sig = async { ctrl.as_mut().unwrap().await }, if ctrl.is_some() => {
                ctrl = None;
                match sig {
                    Ok(None) | Err(_) => debug!("client {}: udp client leave", peer),
                    Ok(Some(err)) => {
                        if session_err.is_none() {
                            session_err =
                                Some(anyhow::Error::new(err).context("client tcp conn broken"));
                        }
                    }
                }
                let _ = cancel_tx.send(());
            }

            ev = async { client_rx.as_mut().unwrap().recv().await }, if client_rx.is_some() => {
                match ev {
                    None => client_rx = None,
                    Some(Err(err)) => {
                        client_rx = None;
                        if session_err.is_none() {
                            session_err =
                                Some(anyhow::Error::new(err).context("client udp read error"));
                        }
                        let _ = cancel_tx.send(());
                    }
                    Some(Ok((data, source))) => {
                        if let Some(prev) = client_addr {
                            if prev != source {
                                error!(
                                    "client {}: udp source changing from {} to {}",
                                    peer, prev, source
                                );
                            }
                        }
                        client_addr = Some(source);

                        if let Err(err) = forward_to_remote(&remote_sock, &data, peer).await {
                            if session_err.is_none() {
                                session_err =
                                    Some(anyhow::Error::new(err).context("remote udp write error"));
                            }
                            let _ = cancel_tx.send(());
                        }
                    }
                }
            }

            ev = async { remote_rx.as_mut().unwrap().recv().await }, if remote_rx.is_some() => {
                match ev {
                    None => remote_rx = None,
                    Some(Err(err)) => {
                        remote_rx = None;
                        if session_err.is_none() {
                            session_err =
                                Some(anyhow::Error::new(err).context("remote udp read error"));
                        }
                        let _ = cancel_tx.send(());
                    }
                    Some(Ok((data, source))) => match client_addr {
                        None => warn!(
                            "client {}: datagram from {} before any client datagram, dropping",
                            peer, source
                        ),
                        Some(dst) => {
                            if let Err(err) =
                                forward_to_client(&client_sock, &data, source, dst, peer).await
                            {
                                if session_err.is_none() {
                                    session_err = Some(
                                        anyhow::Error::new(err).context("client udp write error"),
                                    );
                                }
                                let _ = cancel_tx.send(());
                            }
                        }
                    },
                }
            }
        }
    }

    match session_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Decode a client envelope and forward its payload to the destination.
///
/// Decode and resolve failures are logged and swallowed; only a send
/// failure on the socket is returned.
async fn forward_to_remote(
    remote_sock: &UdpSocket,
    data: &[u8],
    peer: SocketAddr,
) -> io::Result<()> {
    let (dst_addr, dst_port, payload) = match parse_datagram(data) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!("client {}: dropping client datagram: {}", peer, err);
            return Ok(());
        }
    };

    let dest = match dst_addr.resolve(dst_port).await {
        Ok(dest) => dest,
        Err(err) => {
            warn!("client {}: cannot resolve {}: {}", peer, dst_addr, err);
            return Ok(());
        }
    };
    debug!("client {}: udp forward {} bytes to {}", peer, payload.len(), dest);

    let n = remote_sock.send_to(payload, dest).await?;
    if n != payload.len() {
        warn!(
            "client {}: udp short write to remote: {} of {} bytes",
            peer,
            n,
            payload.len()
        );
    }
    Ok(())
}

/// Wrap a remote datagram in an envelope and send it back to the client.
async fn forward_to_client(
    client_sock: &UdpSocket,
    data: &[u8],
    source: SocketAddr,
    dst: SocketAddr,
    peer: SocketAddr,
) -> io::Result<()> {
    let (src_addr, src_port) = SocksAddr::from_socket_addr(source);
    let packet = encode_datagram(&src_addr, src_port, data);
    debug!("client {}: udp return {} bytes from {}", peer, data.len(), source);

    let n = client_sock.send_to(&packet, dst).await?;
    if n != packet.len() {
        warn!(
            "client {}: udp short write to client: {} of {} bytes",
            peer,
            n,
            packet.len()
        );
    }
    Ok(())
}

/// Read the TCP control connection byte-by-byte for the association's
/// lifetime. Any payload is a protocol violation worth a warning; the
/// first read error ends the watch, with EOF normalized to success.
async fn watch_control<R>(mut reader: R, tx: oneshot::Sender<Option<io::Error>>, peer: SocketAddr)
where
    R: AsyncRead + Unpin,
{
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte).await {
            Ok(0) => {
                let _ = tx.send(None);
                return;
            }
            Ok(_) => warn!("client {}: data received after udp association cmd", peer),
            Err(err) => {
                let _ = tx.send(Some(err));
                return;
            }
        }
    }
}

/// Turn a shared socket into a stream of receive events. The task exits on
/// the first socket error (after reporting it) or on cancellation.
fn spawn_reader(
    sock: Arc<UdpSocket>,
    mut cancel: broadcast::Receiver<()>,
) -> mpsc::Receiver<DatagramEvent> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_UDP_PACKET];
        loop {
            tokio::select! {
                res = sock.recv_from(&mut buf) => {
                    let failed = res.is_err();
                    let event = res.map(|(n, source)| (buf[..n].to_vec(), source));
                    if tx.send(event).await.is_err() || failed {
                        return;
                    }
                }
                _ = cancel.recv() => return,
            }
        }
    });
    rx
}
