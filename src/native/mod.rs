//! Native P2P library boundary
//!
//! The vendor library is process-wide state: it is initialized once, every
//! stream shares it, and it is torn down once. That lifecycle is expressed
//! with two types:
//!
//! - [`NativeOwner`] is held by the control plane only. It is the single
//!   place teardown can happen, and teardown consumes it.
//! - [`NativeHandle`] is the cheap, cloneable read-only view handed to every
//!   stream bridge. It can open sessions but cannot tear anything down.
//!
//! ```text
//!   ControlPlane ── NativeOwner ──teardown()──► NativeContext::deinitialize
//!                        │
//!                   handle().clone()
//!          ┌─────────────┼─────────────┐
//!          ▼             ▼             ▼
//!     StreamBridge  StreamBridge  StreamBridge ── open_session() ──► FrameSession
//! ```

pub mod platform;
pub mod replay;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::device::{Device, StreamQuality};
use crate::error::{Component, Error, Result};
use crate::inventory::Account;
use crate::source::Frame;

pub use platform::{BinaryFetcher, HttpFetcher, PlatformBinary};
pub use replay::ReplayLibrary;

/// A connected native session producing frames
///
/// `next_frame` blocks the calling thread, so sessions are only ever driven
/// from a dedicated worker thread.
pub trait FrameSession: Send {
    /// Block until the next frame arrives
    ///
    /// Returns `Ok(None)` when the session ended normally.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the session
    ///
    /// Called exactly once, on every exit path of the worker.
    fn close(&mut self);
}

/// An initialized native library instance
pub trait NativeContext: Send + Sync + 'static {
    /// Connect to a device
    fn open_session(
        &self,
        account: &Account,
        device: &Device,
        quality: StreamQuality,
    ) -> Result<Box<dyn FrameSession>>;

    /// Release the library
    fn deinitialize(&self);
}

/// Loader for the native library
pub trait NativeLibrary: Send + Sync + 'static {
    /// Initialize the library from the platform binary at `binary`
    ///
    /// May block; callers run it off the async executor.
    fn initialize(&self, binary: &Path) -> Result<Arc<dyn NativeContext>>;
}

struct Shared {
    context: Arc<dyn NativeContext>,
    torn_down: AtomicBool,
}

/// Read-only view of the initialized native library
#[derive(Clone)]
pub struct NativeHandle {
    shared: Arc<Shared>,
}

impl NativeHandle {
    /// Open a session on `device`
    ///
    /// Fails once the owner has torn the library down.
    pub fn open_session(
        &self,
        account: &Account,
        device: &Device,
        quality: StreamQuality,
    ) -> Result<Box<dyn FrameSession>> {
        if self.is_torn_down() {
            return Err(Error::collaborator(
                Component::Native,
                "native library already deinitialized",
            ));
        }
        self.shared.context.open_session(account, device, quality)
    }

    /// Whether the library has been torn down
    pub fn is_torn_down(&self) -> bool {
        self.shared.torn_down.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeHandle")
            .field("torn_down", &self.is_torn_down())
            .field("refs", &Arc::strong_count(&self.shared))
            .finish()
    }
}

/// Sole owner of the native library lifecycle
pub struct NativeOwner {
    handle: NativeHandle,
}

impl NativeOwner {
    /// Take ownership of an initialized context
    pub fn new(context: Arc<dyn NativeContext>) -> Self {
        Self {
            handle: NativeHandle {
                shared: Arc::new(Shared {
                    context,
                    torn_down: AtomicBool::new(false),
                }),
            },
        }
    }

    /// Initialize `library` from `binary` on a blocking thread
    pub async fn initialize(library: Arc<dyn NativeLibrary>, binary: &Path) -> Result<Self> {
        let binary = binary.to_path_buf();
        let context = tokio::task::spawn_blocking(move || library.initialize(&binary))
            .await
            .map_err(|e| Error::collaborator(Component::Native, format!("init task failed: {}", e)))??;

        tracing::info!("Native library initialized");
        Ok(Self::new(context))
    }

    /// Handle to share with stream bridges
    pub fn handle(&self) -> NativeHandle {
        self.handle.clone()
    }

    /// Tear the library down
    ///
    /// Consumes the owner, so this can happen at most once per
    /// initialization. Outstanding handles can no longer open sessions.
    pub fn teardown(self) {
        self.release();
    }

    fn release(&self) {
        if self.handle.shared.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.handle.shared.context.deinitialize();
        tracing::info!("Native library deinitialized");
    }
}

impl Drop for NativeOwner {
    fn drop(&mut self) {
        self.release();
    }
}
