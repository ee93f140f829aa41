//! TCP front end: one task per client, one reply frame per request frame

use crate::command::CommandExecutor;
use anyhow::{Context, Result};
use servo_core::codec::{FrameDecoder, FrameEncoder};
use servo_core::{ErrorKind, Reply, Request};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Accept clients until the listener fails
pub async fn serve(listener: TcpListener, executor: Arc<CommandExecutor>) -> Result<()> {
    let local = listener.local_addr().context("listener has no local address")?;
    info!("Servo service listening on {}", local);

    loop {
        let (socket, addr) = listener.accept().await.context("accept failed")?;
        info!("Client connected: {}", addr);

        let executor = executor.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, addr, executor).await {
                warn!("Connection {} closed with error: {:#}", addr, e);
            }
        });
    }
}

/// Serve one client until it disconnects or sends a malformed frame
pub async fn handle_connection<S>(
    mut stream: S,
    addr: SocketAddr,
    executor: Arc<CommandExecutor>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut decoder = FrameDecoder::new();
    let mut encoder = FrameEncoder::new();
    let mut buf = vec![0u8; 4096];

    loop {
        let n = stream.read(&mut buf).await.context("read failed")?;
        if n == 0 {
            info!("Client disconnected: {}", addr);
            return Ok(());
        }
        decoder.extend(&buf[..n]);

        // Process all complete frames
        loop {
            match decoder.decode_next::<Request>() {
                Ok(Some(request)) => {
                    let reply = executor.execute(request).await;
                    queue_reply(&mut encoder, &reply, addr)?;
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Malformed frame from {}: {}", addr, e);
                    encoder
                        .encode(&Reply::error(ErrorKind::Malformed, e.to_string()))
                        .context("failed to encode reply")?;
                    stream.write_all(&encoder.take()).await?;
                    stream.shutdown().await?;
                    return Ok(());
                }
            }
        }

        if !encoder.is_empty() {
            let out = encoder.take();
            debug!("Sending {} reply bytes to {}", out.len(), addr);
            stream.write_all(&out).await.context("write failed")?;
        }
    }
}

/// Queue a reply, substituting an error reply if it cannot be framed
///
/// Replies already queued for earlier requests stay in the encoder.
fn queue_reply(encoder: &mut FrameEncoder, reply: &Reply, addr: SocketAddr) -> Result<()> {
    if let Err(e) = encoder.encode(reply) {
        error!("Reply to {} could not be encoded: {}", addr, e);
        encoder
            .encode(&Reply::error(
                ErrorKind::Executor,
                format!("reply could not be encoded: {}", e),
            ))
            .context("failed to encode error reply")?;
    }
    Ok(())
}
