//! Line-delimited control loop
//!
//! Reads one JSON-RPC request per line and writes exactly one response line
//! per request, in order. Ends when input closes or the shutdown future
//! resolves, and always runs the plane's shutdown before returning.

use std::future::Future;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use super::plane::ControlPlane;
use crate::error::Result;

/// Serve requests from `reader` to `writer` until input closes or `shutdown`
pub async fn serve<R, W, F>(plane: &ControlPlane, reader: R, mut writer: W, shutdown: F) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    F: Future<Output = ()>,
{
    let result = tokio::select! {
        _ = shutdown => {
            tracing::info!("Shutdown signal received");
            Ok(())
        }
        result = request_loop(plane, reader, &mut writer) => result,
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Control channel failed");
    }

    plane.shutdown().await?;
    let _ = writer.flush().await;
    result
}

async fn request_loop<R, W>(plane: &ControlPlane, reader: R, writer: &mut W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = plane.respond(&line).await;
        writer.write_all(response.to_line().as_bytes()).await?;
        writer.flush().await?;
    }

    tracing::info!("Control input closed");
    Ok(())
}
