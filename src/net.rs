//! Socket helpers shared by the server and the client.

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;

/// TCP socket tuning applied to accepted and outbound streams.
#[derive(Debug, Clone)]
pub struct SocketOpts {
    /// Enable TCP_NODELAY.
    pub nodelay: bool,
    /// TCP keepalive idle time, disabled when `None`.
    pub keepalive_secs: Option<u64>,
    /// TCP keepalive probe interval.
    pub keepalive_interval: Option<u64>,
}

impl Default for SocketOpts {
    fn default() -> Self {
        SocketOpts {
            nodelay: true,
            keepalive_secs: Some(20),
            keepalive_interval: Some(8),
        }
    }
}

impl SocketOpts {
    /// Apply the options to a TCP stream.
    pub fn apply(&self, stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(self.nodelay)?;

        if let (Some(timeout), Some(interval)) = (self.keepalive_secs, self.keepalive_interval) {
            let socket = socket2::SockRef::from(stream);
            let keepalive = socket2::TcpKeepalive::new()
                .with_time(Duration::from_secs(timeout))
                .with_interval(Duration::from_secs(interval));
            socket.set_tcp_keepalive(&keepalive)?;
        }

        Ok(())
    }
}

/// Capability trait for transports that can report their remote endpoint.
///
/// The client's UDP ASSOCIATE path needs the TCP peer's IP to substitute
/// an unspecified bind address in the server's reply; transports that are
/// not real sockets can still opt in by implementing this.
pub trait RemoteAddr {
    /// The remote endpoint, when known.
    fn remote_addr(&self) -> Option<SocketAddr>;
}

impl RemoteAddr for TcpStream {
    fn remote_addr(&self) -> Option<SocketAddr> {
        self.peer_addr().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn socket_opts_apply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stream, _) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let stream = stream.unwrap();

        SocketOpts::default().apply(&stream).unwrap();
        SocketOpts {
            nodelay: false,
            keepalive_secs: None,
            keepalive_interval: None,
        }
        .apply(&stream)
        .unwrap();
    }

    #[tokio::test]
    async fn tcp_stream_reports_remote_addr() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stream, _) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let stream = stream.unwrap();

        assert_eq!(stream.remote_addr(), Some(addr));
    }
}
