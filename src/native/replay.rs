//! Replay native library
//!
//! Stands in for the vendor library by playing back capture files, one per
//! device, named after the device MAC (`<dir>/<MAC>.rfc4571`). A capture file
//! holds the same length-prefixed records the bridge writes on the wire.
//! Frames are paced at a fixed interval and the capture can loop.

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::bridge::framing::FrameReader;
use crate::device::{Device, StreamQuality};
use crate::error::{Component, Error, Result};
use crate::inventory::Account;
use crate::source::Frame;

use super::{BinaryFetcher, FrameSession, NativeContext, NativeLibrary};

/// Capture file extension
pub const CAPTURE_EXTENSION: &str = "rfc4571";

const MARKER: &[u8] = b"replay\n";

/// Library that replays captured streams from a directory
#[derive(Debug, Clone)]
pub struct ReplayLibrary {
    dir: PathBuf,
    frame_interval: Duration,
    looping: bool,
}

impl ReplayLibrary {
    /// Replay captures from `dir`, 15 frames per second, looping
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            frame_interval: Duration::from_millis(66),
            looping: true,
        }
    }

    /// Set the delay before each frame
    pub fn frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Restart from the beginning when a capture ends
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Capture file for `mac`
    pub fn capture_path(&self, mac: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", mac, CAPTURE_EXTENSION))
    }
}

impl NativeLibrary for ReplayLibrary {
    fn initialize(&self, binary: &Path) -> Result<Arc<dyn NativeContext>> {
        if !binary.is_file() {
            return Err(Error::collaborator(
                Component::Native,
                format!("{}: platform binary missing", binary.display()),
            ));
        }
        if !self.dir.is_dir() {
            return Err(Error::collaborator(
                Component::Native,
                format!("{}: capture directory missing", self.dir.display()),
            ));
        }
        tracing::info!(dir = %self.dir.display(), looping = self.looping, "Replay library ready");
        Ok(Arc::new(self.clone()))
    }
}

impl NativeContext for ReplayLibrary {
    fn open_session(
        &self,
        _account: &Account,
        device: &Device,
        quality: StreamQuality,
    ) -> Result<Box<dyn FrameSession>> {
        let path = self.capture_path(&device.mac);
        let file = File::open(&path).map_err(|e| {
            Error::collaborator(Component::Native, format!("{}: {}", path.display(), e))
        })?;
        tracing::debug!(
            device = %device.mac,
            path = %path.display(),
            frame_size = quality.frame_size,
            "Replaying capture"
        );

        Ok(Box::new(ReplaySession {
            reader: FrameReader::new(BufReader::new(file)),
            path,
            interval: self.frame_interval,
            looping: self.looping,
            emitted_this_pass: 0,
        }))
    }

    fn deinitialize(&self) {
        tracing::debug!(dir = %self.dir.display(), "Replay library released");
    }
}

/// Writes a marker file where the vendor binary would go
#[async_trait]
impl BinaryFetcher for ReplayLibrary {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        tracing::debug!(url = %url, "Replay mode, skipping platform binary download");
        tokio::fs::write(dest, MARKER).await.map_err(|e| {
            Error::collaborator(
                Component::PlatformBinary,
                format!("{}: {}", dest.display(), e),
            )
        })
    }
}

struct ReplaySession {
    reader: FrameReader<BufReader<File>>,
    path: PathBuf,
    interval: Duration,
    looping: bool,
    emitted_this_pass: u64,
}

impl ReplaySession {
    fn rewind(&mut self) -> std::io::Result<()> {
        self.reader.get_mut().seek(SeekFrom::Start(0))?;
        self.emitted_this_pass = 0;
        Ok(())
    }
}

impl FrameSession for ReplaySession {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.interval.is_zero() {
            std::thread::sleep(self.interval);
        }

        let fail = |path: &Path, e: std::io::Error| {
            Error::collaborator(Component::Native, format!("{}: {}", path.display(), e))
        };

        loop {
            match self.reader.next_record() {
                Ok(Some(data)) => {
                    self.emitted_this_pass += 1;
                    return Ok(Some(Frame::new(data)));
                }
                Ok(None) if self.looping && self.emitted_this_pass > 0 => {
                    self.rewind().map_err(|e| fail(&self.path, e))?;
                }
                Ok(None) => return Ok(None),
                Err(e) => return Err(fail(&self.path, e)),
            }
        }
    }

    fn close(&mut self) {
        tracing::debug!(path = %self.path.display(), "Replay session closed");
    }
}
