//! Frame source adapter
//!
//! Drives a blocking native session on a dedicated OS thread and hands frames
//! to the async side through a bounded channel.
//!
//! ```text
//!   worker thread                         tokio task
//!   ┌──────────────────────┐  bounded   ┌────────────────────┐
//!   │ session.next_frame() │──mpsc(N)──►│ rx.recv().await    │──► TCP
//!   │ blocking_send()      │            │                    │
//!   └──────────────────────┘            └────────────────────┘
//!        ▲ cancel flag                        │ sets flag on disconnect
//!        └────────────────────────────────────┘
//! ```
//!
//! The channel is bounded, so a slow client blocks the worker instead of
//! growing memory. The worker always finishes with [`SourceItem::End`] and
//! always closes the native session, whichever way it exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::device::Device;
use crate::error::Result;
use crate::inventory::Account;
use crate::native::{FrameSession, NativeHandle};

/// One encoded media access unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Bytes,
}

impl Frame {
    /// Wrap a payload
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Payload bytes
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Payload length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Take the payload
    pub fn into_data(self) -> Bytes {
        self.data
    }
}

/// Item passed from the worker to the consumer
#[derive(Debug)]
pub enum SourceItem {
    /// A frame
    Frame(Frame),
    /// End of stream; nothing follows
    End,
}

/// Why the worker stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceExit {
    /// The native session ended on its own
    SessionEnded,
    /// The cancel flag was set
    Cancelled,
    /// The consumer went away
    ConsumerGone,
    /// The session could not be opened or failed mid-stream
    Failed,
}

/// Cooperative cancellation flag shared with the worker
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// New, unset flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the worker to stop at its next iteration
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Closes the native session when dropped
struct SessionGuard(Box<dyn FrameSession>);

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Pushes the end-of-stream marker when dropped
struct EndGuard(mpsc::Sender<SourceItem>);

impl Drop for EndGuard {
    fn drop(&mut self) {
        // Fails only if the consumer is gone, which is fine.
        let _ = self.0.blocking_send(SourceItem::End);
    }
}

/// Produces frames for one device
pub struct FrameSourceAdapter {
    device: Arc<Device>,
    account: Arc<Account>,
    native: NativeHandle,
}

impl FrameSourceAdapter {
    /// Create an adapter; nothing is opened until [`spawn`](Self::spawn)
    pub fn new(device: Arc<Device>, account: Arc<Account>, native: NativeHandle) -> Self {
        Self {
            device,
            account,
            native,
        }
    }

    /// Start the worker thread
    ///
    /// Frames are delivered on `tx`; the last item is always
    /// [`SourceItem::End`].
    pub fn spawn(
        self,
        tx: mpsc::Sender<SourceItem>,
        cancel: CancelFlag,
    ) -> std::io::Result<JoinHandle<SourceExit>> {
        std::thread::Builder::new()
            .name(format!("frame-source-{}", self.device.mac))
            .spawn(move || self.run(tx, cancel))
    }

    /// Run the receive loop on the current thread
    pub fn run(self, tx: mpsc::Sender<SourceItem>, cancel: CancelFlag) -> SourceExit {
        let end = EndGuard(tx);
        let device = &self.device.mac;

        let exit = match self.receive(&end.0, &cancel) {
            Ok(exit) => exit,
            Err(e) => {
                tracing::warn!(device = %device, error = %e, "Frame source failed");
                SourceExit::Failed
            }
        };

        tracing::debug!(device = %device, exit = ?exit, "Frame source stopped");
        exit
    }

    fn receive(&self, tx: &mpsc::Sender<SourceItem>, cancel: &CancelFlag) -> Result<SourceExit> {
        if cancel.is_cancelled() {
            return Ok(SourceExit::Cancelled);
        }

        let quality = self.device.quality();
        let mut session = SessionGuard(self.native.open_session(
            &self.account,
            &self.device,
            quality,
        )?);
        tracing::info!(
            device = %self.device.mac,
            frame_size = quality.frame_size,
            bitrate = quality.bitrate,
            "Native session opened"
        );

        loop {
            if cancel.is_cancelled() {
                return Ok(SourceExit::Cancelled);
            }

            let frame = match session.0.next_frame()? {
                Some(frame) => frame,
                None => return Ok(SourceExit::SessionEnded),
            };

            if cancel.is_cancelled() {
                return Ok(SourceExit::Cancelled);
            }

            // Blocks while the queue is full.
            if tx.blocking_send(SourceItem::Frame(frame)).is_err() {
                return Ok(SourceExit::ConsumerGone);
            }
        }
    }
}
