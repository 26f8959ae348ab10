//! Accept loop and client session
//!
//! One accept task per bridge. A client is only served after it wins the
//! exclusivity flag; any other connection is closed before a byte is written.
//!
//! ```text
//! accept ─► try_claim ─┬─ lost ─► close, count rejected
//!                      └─ won ──► spawn worker ─► pump frames ─► cancel,
//!                                                  join worker, release
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use crate::bridge::framing::{self, MAX_FRAME_LEN};
use crate::bridge::state::BridgeState;
use crate::bridge::Shared;
use crate::source::{CancelFlag, FrameSourceAdapter, SourceExit, SourceItem};

/// Why a client session ended
#[derive(Debug)]
enum SessionEnd {
    SourceEnded,
    ClientClosed,
    WriteFailed(std::io::Error),
    Stopped,
}

/// Resolve once the stop signal is raised or its sender is gone
pub(crate) async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Accept clients until stopped, then wait for the active session
pub(crate) async fn accept_loop(
    listener: TcpListener,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
) {
    let device = shared.device.mac.clone();
    shared.transition(BridgeState::Idle);

    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            _ = stopped(&mut shutdown) => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    if !shared.try_claim() {
                        shared.stats.on_rejected();
                        tracing::warn!(device = %device, peer = %peer, "Connection rejected: stream busy");
                        drop(socket);
                        continue;
                    }
                    shared.stats.on_connection();
                    tracing::info!(device = %device, peer = %peer, "Client connected");
                    sessions.spawn(serve_client(socket, peer, Arc::clone(&shared), shutdown.clone()));
                }
                Err(e) => {
                    tracing::error!(device = %device, error = %e, "Failed to accept connection");
                }
            },
            Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!(device = %device, error = %e, "Client session task failed");
                    shared.release_client();
                }
            }
        }
    }

    drop(listener);
    tracing::debug!(device = %device, "Listen socket closed");

    while let Some(joined) = sessions.join_next().await {
        if let Err(e) = joined {
            tracing::error!(device = %device, error = %e, "Client session task failed");
            shared.release_client();
        }
    }
}

async fn serve_client(
    socket: TcpStream,
    peer: SocketAddr,
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
) {
    let device = shared.device.mac.clone();

    if shared.config.tcp_nodelay {
        if let Err(e) = socket.set_nodelay(true) {
            tracing::debug!(device = %device, error = %e, "Failed to set TCP_NODELAY");
        }
    }

    let (tx, mut rx) = mpsc::channel(shared.config.queue_capacity);
    let cancel = CancelFlag::new();
    let adapter = FrameSourceAdapter::new(
        Arc::clone(&shared.device),
        Arc::clone(&shared.account),
        shared.native.clone(),
    );
    let worker = match adapter.spawn(tx, cancel.clone()) {
        Ok(worker) => Some(worker),
        Err(e) => {
            tracing::error!(device = %device, error = %e, "Failed to spawn frame source thread");
            None
        }
    };

    let (mut reader, mut writer) = socket.into_split();
    let end = match worker {
        Some(_) => pump(&shared, &mut rx, &mut reader, &mut writer, &mut shutdown).await,
        None => SessionEnd::SourceEnded,
    };

    cancel.cancel();
    // Unblocks a worker parked on a full queue.
    drop(rx);
    let _ = writer.shutdown().await;
    drop(writer);
    drop(reader);

    if let Some(worker) = worker {
        match tokio::task::spawn_blocking(move || worker.join()).await {
            Ok(Ok(SourceExit::Failed)) => shared.stats.on_source_failure(),
            Ok(Ok(_)) => {}
            Ok(Err(_)) | Err(_) => {
                shared.stats.on_source_failure();
                tracing::error!(device = %device, "Frame source thread panicked");
            }
        }
    }

    shared.release_client();

    match end {
        SessionEnd::WriteFailed(e) => {
            tracing::info!(device = %device, peer = %peer, error = %e, "Client disconnected")
        }
        other => tracing::info!(device = %device, peer = %peer, reason = ?other, "Client disconnected"),
    }
}

async fn pump(
    shared: &Shared,
    rx: &mut mpsc::Receiver<SourceItem>,
    reader: &mut OwnedReadHalf,
    writer: &mut OwnedWriteHalf,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let mut probe = [0u8; 256];

    loop {
        let frame = tokio::select! {
            biased;
            _ = stopped(shutdown) => return SessionEnd::Stopped,
            read = reader.read(&mut probe) => match read {
                Ok(0) | Err(_) => return SessionEnd::ClientClosed,
                // Inbound bytes carry no meaning.
                Ok(_) => continue,
            },
            item = rx.recv() => match item {
                Some(SourceItem::Frame(frame)) => frame,
                Some(SourceItem::End) | None => return SessionEnd::SourceEnded,
            },
        };

        if frame.len() > MAX_FRAME_LEN {
            shared.stats.on_frame_dropped();
            tracing::warn!(
                device = %shared.device.mac,
                size = frame.len(),
                "Frame too large for length prefix, dropped"
            );
            continue;
        }

        tokio::select! {
            _ = stopped(shutdown) => return SessionEnd::Stopped,
            written = framing::write_frame(writer, frame.data()) => match written {
                Ok(n) => {
                    shared.stats.on_frame_sent(n);
                    shared.touch();
                }
                Err(e) => return SessionEnd::WriteFailed(e),
            },
        }
    }
}
