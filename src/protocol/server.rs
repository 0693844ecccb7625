//! Server-side SOCKS5 protocol machine.

use super::{read_frame, write_frame};
use crate::addr::SocksAddr;
use crate::consts::*;
use crate::error::{Result, SocksError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// States of the server-side handshake.
///
/// `Close` is the clean-refusal sink (auth or request rejected); `Bad` is
/// the terminal sink for protocol violations and transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Nothing read yet.
    Init,
    /// Client's method list received.
    MethodsGot,
    /// A method was accepted; the auth sub-negotiation may run.
    Auth,
    /// Auth finished; waiting for the request frame.
    AuthDone,
    /// CONNECT (or another TCP command) request received.
    ReqConnectGot,
    /// UDP ASSOCIATE request received.
    ReqUdpGot,
    /// Success reply sent; the transport belongs to the TCP relay.
    CmdConnect,
    /// Success reply sent; the transport belongs to the UDP association.
    CmdUdp,
    /// Negotiation refused cleanly.
    Close,
    /// Protocol violation; the machine is unusable.
    Bad,
}

/// Sequence-enforced server side of the RFC 1928 handshake.
///
/// The machine owns the transport until [`into_transport`] surrenders it
/// for relaying.
///
/// [`into_transport`]: ServerProtocol::into_transport
#[derive(Debug)]
pub struct ServerProtocol<T> {
    transport: T,
    state: ServerState,
}

impl<T> ServerProtocol<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a freshly accepted transport.
    pub fn new(transport: T) -> Self {
        ServerProtocol {
            transport,
            state: ServerState::Init,
        }
    }

    /// Current machine state.
    pub fn state(&self) -> ServerState {
        self.state
    }

    fn check_state(&self, expect: ServerState) {
        assert!(
            self.state == expect,
            "server protocol operation in state {:?}, expected {:?}",
            self.state,
            expect
        );
    }

    /// Direct transport access for auth sub-negotiation I/O.
    ///
    /// Only legal while an accepted method's sub-protocol is running.
    pub fn transport_mut(&mut self) -> &mut T {
        self.check_state(ServerState::Auth);
        &mut self.transport
    }

    /// Read the client's `VER NMETHODS METHODS...` greeting.
    pub async fn get_auth_methods(&mut self) -> Result<Vec<u8>> {
        self.check_state(ServerState::Init);
        match self.read_auth_methods().await {
            Ok(methods) => {
                self.state = ServerState::MethodsGot;
                Ok(methods)
            }
            Err(err) => {
                self.state = ServerState::Bad;
                Err(err)
            }
        }
    }

    async fn read_auth_methods(&mut self) -> Result<Vec<u8>> {
        let mut head = [0u8; 2];
        self.transport.read_exact(&mut head).await?;

        let ver = head[0];
        if ver != SOCKS_VERSION {
            return Err(SocksError::BadVersion(ver));
        }

        let mut methods = vec![0u8; head[1] as usize];
        self.transport.read_exact(&mut methods).await?;
        Ok(methods)
    }

    /// Announce the selected method. Selecting [`AUTH_METHOD_REJECT`]
    /// refuses the negotiation and parks the machine in `Close`.
    pub async fn accept_auth_method(&mut self, method: u8) -> Result<()> {
        self.check_state(ServerState::MethodsGot);
        let res: Result<()> = async {
            self.transport.write_all(&[SOCKS_VERSION, method]).await?;
            self.transport.flush().await?;
            Ok(())
        }
        .await;
        match res {
            Ok(()) => {
                self.state = if method == AUTH_METHOD_REJECT {
                    ServerState::Close
                } else {
                    ServerState::Auth
                };
                Ok(())
            }
            Err(err) => {
                self.state = ServerState::Bad;
                Err(err)
            }
        }
    }

    /// Refuse every offered method.
    pub async fn reject_auth_method(&mut self) -> Result<()> {
        self.accept_auth_method(AUTH_METHOD_REJECT).await
    }

    /// Mark the auth sub-negotiation as finished. No I/O happens here; any
    /// sub-protocol traffic is the auth handler's business before calling.
    pub fn auth_done(&mut self) {
        self.check_state(ServerState::Auth);
        self.state = ServerState::AuthDone;
    }

    /// Read the request frame, yielding the command byte and target triple.
    ///
    /// CONNECT leaves the machine in `ReqConnectGot` and UDP ASSOCIATE in
    /// `ReqUdpGot`. Any other command that parses also lands in
    /// `ReqConnectGot` so the session can still answer it with
    /// [`reject_request`](ServerProtocol::reject_request).
    pub async fn get_request(&mut self) -> Result<(u8, SocksAddr, u16)> {
        self.check_state(ServerState::AuthDone);
        match read_frame(&mut self.transport).await {
            Ok((cmd, addr, port)) => {
                self.state = if cmd == CMD_UDP_ASSOCIATE {
                    ServerState::ReqUdpGot
                } else {
                    ServerState::ReqConnectGot
                };
                Ok((cmd, addr, port))
            }
            Err(err) => {
                self.state = ServerState::Bad;
                Err(err)
            }
        }
    }

    /// Reply success to a CONNECT request with the outbound bind endpoint.
    pub async fn accept_connection(&mut self, bind_addr: &SocksAddr, bind_port: u16) -> Result<()> {
        self.check_state(ServerState::ReqConnectGot);
        match write_frame(&mut self.transport, REPLY_SUCCEEDED, bind_addr, bind_port).await {
            Ok(()) => {
                self.state = ServerState::CmdConnect;
                Ok(())
            }
            Err(err) => {
                self.state = ServerState::Bad;
                Err(err)
            }
        }
    }

    /// Reply success to a UDP ASSOCIATE request with the endpoint that will
    /// accept the client's datagrams.
    pub async fn accept_udp_association(
        &mut self,
        bind_addr: &SocksAddr,
        bind_port: u16,
    ) -> Result<()> {
        self.check_state(ServerState::ReqUdpGot);
        match write_frame(&mut self.transport, REPLY_SUCCEEDED, bind_addr, bind_port).await {
            Ok(()) => {
                self.state = ServerState::CmdUdp;
                Ok(())
            }
            Err(err) => {
                self.state = ServerState::Bad;
                Err(err)
            }
        }
    }

    /// Refuse the request with the given reply code, carrying the wildcard
    /// address and port zero.
    pub async fn reject_request(&mut self, reply: u8) -> Result<()> {
        assert!(
            matches!(
                self.state,
                ServerState::ReqConnectGot | ServerState::ReqUdpGot
            ),
            "server protocol operation in state {:?}, expected a received request",
            self.state
        );
        match write_frame(&mut self.transport, reply, &SocksAddr::unspecified(), 0).await {
            Ok(()) => {
                self.state = ServerState::Close;
                Ok(())
            }
            Err(err) => {
                self.state = ServerState::Bad;
                Err(err)
            }
        }
    }

    /// Surrender the transport for relaying.
    ///
    /// # Panics
    ///
    /// Panics unless a success reply has been sent (`CmdConnect` or
    /// `CmdUdp`); before that point the handshake still owns the stream.
    pub fn into_transport(self) -> T {
        assert!(
            matches!(self.state, ServerState::CmdConnect | ServerState::CmdUdp),
            "transport surrendered in state {:?}",
            self.state
        );
        self.transport
    }
}
