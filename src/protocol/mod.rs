//! SOCKS5 protocol state machines.
//!
//! [`ServerProtocol`] and [`ClientProtocol`] drive the two sides of the
//! RFC 1928 handshake. Each machine exclusively owns its transport for the
//! duration of the handshake and surrenders it through `into_transport`
//! once a command exchange has reached its relay state; the machine cannot
//! be used afterwards.
//!
//! Every operation is guarded by an expected prior state. Calling an
//! operation in the wrong state is a caller bug and panics; I/O and parse
//! failures are returned to the caller and park the machine in its
//! terminal `Bad` state.

mod client;
mod server;

pub use client::{ClientProtocol, ClientState};
pub use server::{ServerProtocol, ServerState};

use crate::addr::SocksAddr;
use crate::consts::*;
use crate::error::{Result, SocksError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Read a request or reply frame:
/// `VER | CMD-or-REP | RSV | ATYP | addr | port`.
///
/// The reserved byte is ignored; a version byte other than 0x05 fails.
pub(crate) async fn read_frame<R>(reader: &mut R) -> Result<(u8, SocksAddr, u16)>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    reader.read_exact(&mut header).await?;

    let ver = header[0];
    if ver != SOCKS_VERSION {
        return Err(SocksError::BadVersion(ver));
    }
    let code = header[1];
    let atyp = header[3];

    let addr = SocksAddr::read_body(atyp, reader).await?;
    let port = reader.read_u16().await?;

    Ok((code, addr, port))
}

/// Write a request or reply frame with the layout of [`read_frame`].
pub(crate) async fn write_frame<W>(
    writer: &mut W,
    code: u8,
    addr: &SocksAddr,
    port: u16,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut frame = Vec::with_capacity(4 + addr.encoded_len() + 2);
    frame.push(SOCKS_VERSION);
    frame.push(code);
    frame.push(RESERVED);
    frame.extend_from_slice(&addr.to_bytes());
    frame.extend_from_slice(&port.to_be_bytes());

    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
