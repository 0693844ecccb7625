//! One-directional stream pump and the bidirectional relay built from a
//! pair of them.
//!
//! A bridge copies reader to writer through a fixed buffer and, when it
//! stops, emits exactly two completion signals: the reader's outcome (EOF
//! mapped to success) followed by the writer's outcome. The relay pairs
//! two bridges, waits for whichever finishes first, then drains all four
//! signals so the caller can tell a clean remote close from a real
//! failure.

use crate::consts::BRIDGE_BUFFER_SIZE;
use crate::error::{RelayError, RelayRole};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};

/// A completion signal; `None` means the side finished without error.
pub type BridgeSignal = Option<io::Error>;

/// Spawn a pump copying `reader` to `writer` until EOF, an error on either
/// side, or a shutdown signal.
///
/// The returned channel yields exactly two [`BridgeSignal`]s: reader
/// outcome first, writer outcome second. The channel is buffered for both,
/// so the signals arrive even if nobody is listening yet.
pub fn bridge<R, W>(
    mut reader: R,
    mut writer: W,
    mut shutdown: broadcast::Receiver<()>,
) -> mpsc::Receiver<BridgeSignal>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(2);
    tokio::spawn(async move {
        let mut buf = [0u8; BRIDGE_BUFFER_SIZE];
        let (read_sig, write_sig) = loop {
            let n = tokio::select! {
                res = reader.read(&mut buf) => match res {
                    Ok(0) => break (None, None),
                    Ok(n) => n,
                    Err(err) => break (Some(err), None),
                },
                _ = shutdown.recv() => break (None, None),
            };
            if let Err(err) = writer.write_all(&buf[..n]).await {
                break (None, Some(err));
            }
        };
        let _ = tx.send(read_sig).await;
        let _ = tx.send(write_sig).await;
    });
    rx
}

/// Relay bytes between `client` and `target` until either direction
/// finishes.
///
/// Both streams are consumed; they close when the relay returns and the
/// pump tasks drop their halves. Non-success signals are aggregated into a
/// [`RelayError`] keyed by direction role.
pub async fn relay<A, B>(client: A, target: B) -> Result<(), RelayError>
where
    A: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    B: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (target_read, target_write) = tokio::io::split(target);

    let (shutdown_tx, _) = broadcast::channel(1);
    let mut c2t = bridge(client_read, target_write, shutdown_tx.subscribe());
    let mut t2c = bridge(target_read, client_write, shutdown_tx.subscribe());

    let mut merr = RelayError::new();
    tokio::select! {
        sig = c2t.recv() => {
            merr.push(RelayRole::ReadClient, sig.flatten());
            merr.push(RelayRole::WriteTarget, c2t.recv().await.flatten());
            let _ = shutdown_tx.send(());
            merr.push(RelayRole::ReadTarget, t2c.recv().await.flatten());
            merr.push(RelayRole::WriteClient, t2c.recv().await.flatten());
        }
        sig = t2c.recv() => {
            merr.push(RelayRole::ReadTarget, sig.flatten());
            merr.push(RelayRole::WriteClient, t2c.recv().await.flatten());
            let _ = shutdown_tx.send(());
            merr.push(RelayRole::ReadClient, c2t.recv().await.flatten());
            merr.push(RelayRole::WriteTarget, c2t.recv().await.flatten());
        }
    }
    merr.into_result()
}
