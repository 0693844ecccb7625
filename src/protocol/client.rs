//! Client-side SOCKS5 protocol machine, the mirror image of
//! [`ServerProtocol`](super::ServerProtocol).

use super::{read_frame, write_frame};
use crate::addr::SocksAddr;
use crate::consts::*;
use crate::error::{Result, SocksError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// States of the client-side handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Nothing sent yet.
    Init,
    /// Method list sent, waiting for the server's pick.
    MethodsSent,
    /// Server picked a method; the auth sub-negotiation may run.
    Auth,
    /// Auth finished; a command may be sent.
    AuthDone,
    /// Command frame sent, waiting for the reply.
    ReqConnectSent,
    /// Success reply received; the transport is ready to surrender.
    ReplyConnectGot,
    /// Transport surrendered to the tunnel.
    CmdConnected,
    /// Negotiation refused cleanly (method or request rejected).
    Close,
    /// Protocol violation; the machine is unusable.
    Bad,
}

/// Sequence-enforced client side of the RFC 1928 handshake.
#[derive(Debug)]
pub struct ClientProtocol<T> {
    transport: T,
    state: ClientState,
}

impl<T> ClientProtocol<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a transport connected to a SOCKS server.
    pub fn new(transport: T) -> Self {
        ClientProtocol {
            transport,
            state: ClientState::Init,
        }
    }

    /// Current machine state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    fn check_state(&self, expect: ClientState) {
        assert!(
            self.state == expect,
            "client protocol operation in state {:?}, expected {:?}",
            self.state,
            expect
        );
    }

    /// Direct transport access for auth sub-negotiation I/O.
    ///
    /// Only legal while the server-selected method's sub-protocol is
    /// running.
    pub fn transport_mut(&mut self) -> &mut T {
        self.check_state(ClientState::Auth);
        &mut self.transport
    }

    /// Offer the given method list to the server.
    ///
    /// # Panics
    ///
    /// Panics if more than 255 methods are offered; the count must fit the
    /// one-byte NMETHODS field.
    pub async fn send_auth_methods(&mut self, methods: &[u8]) -> Result<()> {
        self.check_state(ClientState::Init);
        assert!(methods.len() <= u8::MAX as usize, "too many auth methods");

        let mut frame = Vec::with_capacity(2 + methods.len());
        frame.push(SOCKS_VERSION);
        frame.push(methods.len() as u8);
        frame.extend_from_slice(methods);

        let res: Result<()> = async {
            self.transport.write_all(&frame).await?;
            self.transport.flush().await?;
            Ok(())
        }
        .await;
        match res {
            Ok(()) => {
                self.state = ClientState::MethodsSent;
                Ok(())
            }
            Err(err) => {
                self.state = ClientState::Bad;
                Err(err)
            }
        }
    }

    /// Read the method the server selected. [`AUTH_METHOD_REJECT`] parks
    /// the machine in `Close`.
    pub async fn receive_auth_method(&mut self) -> Result<u8> {
        self.check_state(ClientState::MethodsSent);
        let res: Result<u8> = async {
            let mut buf = [0u8; 2];
            self.transport.read_exact(&mut buf).await?;
            if buf[0] != SOCKS_VERSION {
                return Err(SocksError::BadVersion(buf[0]));
            }
            Ok(buf[1])
        }
        .await;
        match res {
            Ok(method) => {
                self.state = if method == AUTH_METHOD_REJECT {
                    ClientState::Close
                } else {
                    ClientState::Auth
                };
                Ok(method)
            }
            Err(err) => {
                self.state = ClientState::Bad;
                Err(err)
            }
        }
    }

    /// Mark the auth sub-negotiation as finished. No I/O.
    pub fn auth_done(&mut self) {
        self.check_state(ClientState::Auth);
        self.state = ClientState::AuthDone;
    }

    /// Send a command frame for the target triple.
    pub async fn send_command(&mut self, cmd: u8, addr: &SocksAddr, port: u16) -> Result<()> {
        self.check_state(ClientState::AuthDone);
        match write_frame(&mut self.transport, cmd, addr, port).await {
            Ok(()) => {
                self.state = ClientState::ReqConnectSent;
                Ok(())
            }
            Err(err) => {
                self.state = ClientState::Bad;
                Err(err)
            }
        }
    }

    /// Read the server's reply, yielding the reply code and bind triple.
    /// A non-zero reply parks the machine in `Close`.
    pub async fn receive_reply(&mut self) -> Result<(u8, SocksAddr, u16)> {
        self.check_state(ClientState::ReqConnectSent);
        match read_frame(&mut self.transport).await {
            Ok((reply, addr, port)) => {
                self.state = if reply == REPLY_SUCCEEDED {
                    ClientState::ReplyConnectGot
                } else {
                    ClientState::Close
                };
                Ok((reply, addr, port))
            }
            Err(err) => {
                self.state = ClientState::Bad;
                Err(err)
            }
        }
    }

    /// Surrender the transport for the established command.
    ///
    /// # Panics
    ///
    /// Panics unless a success reply has been received.
    pub fn into_transport(self) -> T {
        assert!(
            self.state == ClientState::ReplyConnectGot,
            "transport surrendered in state {:?}",
            self.state
        );
        self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::io::duplex;

    #[tokio::test]
    async fn connect_handshake() {
        let (mut server, client) = duplex(256);
        let mut proto = ClientProtocol::new(client);

        proto.send_auth_methods(&[AUTH_METHOD_NONE]).await.unwrap();
        assert_eq!(proto.state(), ClientState::MethodsSent);
        let mut greeting = [0u8; 3];
        server.read_exact(&mut greeting).await.unwrap();
        assert_eq!(greeting, [0x05, 0x01, 0x00]);

        server.write_all(&[0x05, 0x00]).await.unwrap();
        let method = proto.receive_auth_method().await.unwrap();
        assert_eq!(method, AUTH_METHOD_NONE);
        assert_eq!(proto.state(), ClientState::Auth);

        proto.auth_done();

        let target = SocksAddr::V4(Ipv4Addr::new(2, 3, 4, 5));
        proto.send_command(CMD_CONNECT, &target, 0x2345).await.unwrap();
        let mut request = [0u8; 10];
        server.read_exact(&mut request).await.unwrap();
        assert_eq!(request, [0x05, 0x01, 0x00, 0x01, 2, 3, 4, 5, 0x23, 0x45]);

        server
            .write_all(&[0x05, 0x00, 0x00, 0x01, 10, 0, 0, 1, 0x04, 0x38])
            .await
            .unwrap();
        let (reply, bind_addr, bind_port) = proto.receive_reply().await.unwrap();
        assert_eq!(reply, REPLY_SUCCEEDED);
        assert_eq!(bind_addr, SocksAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(bind_port, 0x0438);
        assert_eq!(proto.state(), ClientState::ReplyConnectGot);

        let _transport = proto.into_transport();
    }

    #[tokio::test]
    async fn server_reject_closes() {
        let (mut server, client) = duplex(256);
        let mut proto = ClientProtocol::new(client);

        proto.send_auth_methods(&[AUTH_METHOD_NONE]).await.unwrap();
        server.write_all(&[0x05, 0xFF]).await.unwrap();
        let method = proto.receive_auth_method().await.unwrap();
        assert_eq!(method, AUTH_METHOD_REJECT);
        assert_eq!(proto.state(), ClientState::Close);
    }

    #[tokio::test]
    async fn failure_reply_closes() {
        let (mut server, client) = duplex(256);
        let mut proto = ClientProtocol::new(client);

        proto.send_auth_methods(&[AUTH_METHOD_NONE]).await.unwrap();
        server.write_all(&[0x05, 0x00]).await.unwrap();
        proto.receive_auth_method().await.unwrap();
        proto.auth_done();

        let target = SocksAddr::Domain("example.com".to_string());
        proto.send_command(CMD_CONNECT, &target, 80).await.unwrap();

        server
            .write_all(&[0x05, 0x05, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
            .await
            .unwrap();
        let (reply, _, _) = proto.receive_reply().await.unwrap();
        assert_eq!(reply, REPLY_CONNECTION_REFUSED);
        assert_eq!(proto.state(), ClientState::Close);
    }

    #[tokio::test]
    async fn bad_version_in_selection() {
        let (mut server, client) = duplex(256);
        let mut proto = ClientProtocol::new(client);

        proto.send_auth_methods(&[AUTH_METHOD_NONE]).await.unwrap();
        server.write_all(&[0x04, 0x00]).await.unwrap();
        let err = proto.receive_auth_method().await.unwrap_err();
        assert!(matches!(err, SocksError::BadVersion(0x04)));
        assert_eq!(proto.state(), ClientState::Bad);
    }

    #[tokio::test]
    #[should_panic(expected = "client protocol operation in state")]
    async fn command_before_auth_panics() {
        let (_server, client) = duplex(256);
        let mut proto = ClientProtocol::new(client);
        let target = SocksAddr::unspecified();
        let _ = proto.send_command(CMD_CONNECT, &target, 0).await;
    }
}
