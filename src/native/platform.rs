//! Platform binary acquisition
//!
//! The native library ships as one shared object per CPU architecture. It is
//! downloaded once into a local library directory and reused afterwards.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{Component, Error, Result};

/// Default download location, `{base}/lib.{arch}`
pub const DEFAULT_BINARY_BASE_URL: &str =
    "https://github.com/koush/docker-wyze-bridge/raw/main/app";

/// Downloads a platform binary to a local path
#[async_trait]
pub trait BinaryFetcher: Send + Sync + 'static {
    /// Fetch `url` and write it to `dest`
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Architecture-specific native library in a local directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformBinary {
    dir: PathBuf,
    suffix: &'static str,
}

impl PlatformBinary {
    /// Binary for the architecture this process runs on
    pub fn for_host(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::for_arch(dir, std::env::consts::ARCH)
    }

    /// Binary for a specific architecture
    pub fn for_arch(dir: impl Into<PathBuf>, arch: &str) -> Result<Self> {
        let suffix = match arch {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            other => {
                return Err(Error::collaborator(
                    Component::PlatformBinary,
                    format!("unsupported architecture: {}", other),
                ))
            }
        };
        Ok(Self {
            dir: dir.into(),
            suffix,
        })
    }

    /// File name, e.g. `lib.amd64`
    pub fn file_name(&self) -> String {
        format!("lib.{}", self.suffix)
    }

    /// Full path of the binary
    pub fn path(&self) -> PathBuf {
        self.dir.join(self.file_name())
    }

    /// Whether the binary is already on disk
    pub fn is_present(&self) -> bool {
        self.path().is_file()
    }

    /// Download URL under `base_url`
    pub fn url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.file_name())
    }

    /// Make sure the binary is on disk, downloading it if needed
    ///
    /// Downloads go to a temporary file that is renamed into place, so an
    /// interrupted download never leaves a truncated binary behind.
    pub async fn ensure(&self, fetcher: &dyn BinaryFetcher, base_url: &str) -> Result<PathBuf> {
        let path = self.path();
        if self.is_present() {
            tracing::debug!(path = %path.display(), "Platform binary present");
            return Ok(path);
        }

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            Error::collaborator(
                Component::PlatformBinary,
                format!("{}: {}", self.dir.display(), e),
            )
        })?;

        let url = self.url(base_url);
        let tmp = self.dir.join(format!("{}.tmp", self.file_name()));
        tracing::info!(url = %url, path = %path.display(), "Downloading platform binary");

        if let Err(e) = fetcher.fetch(&url, &tmp).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }

        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            Error::collaborator(
                Component::PlatformBinary,
                format!("{}: {}", path.display(), e),
            )
        })?;
        set_executable(&path).await?;

        tracing::info!(path = %path.display(), "Platform binary downloaded");
        Ok(path)
    }
}

#[cfg(unix)]
async fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(|e| {
            Error::collaborator(
                Component::PlatformBinary,
                format!("{}: {}", path.display(), e),
            )
        })
}

#[cfg(not(unix))]
async fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Fetcher downloading over HTTPS
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with a default client
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BinaryFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        let fail = |e: reqwest::Error| {
            Error::collaborator(Component::PlatformBinary, format!("{}: {}", url, e))
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(fail)?;
        let body = response.bytes().await.map_err(fail)?;

        tokio::fs::write(dest, &body).await.map_err(|e| {
            Error::collaborator(
                Component::PlatformBinary,
                format!("{}: {}", dest.display(), e),
            )
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Fetcher writing fixed bytes, or failing
    pub(crate) struct StubFetcher {
        pub calls: AtomicUsize,
        pub fail: bool,
    }

    impl StubFetcher {
        pub(crate) fn ok() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl BinaryFetcher for StubFetcher {
        async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::collaborator(
                    Component::PlatformBinary,
                    format!("{}: 404 Not Found", url),
                ));
            }
            tokio::fs::write(dest, b"\x7fELF").await?;
            Ok(())
        }
    }

    #[test]
    fn test_arch_mapping() {
        let bin = PlatformBinary::for_arch("/opt/lib", "x86_64").unwrap();
        assert_eq!(bin.file_name(), "lib.amd64");
        assert_eq!(bin.path(), PathBuf::from("/opt/lib/lib.amd64"));

        let bin = PlatformBinary::for_arch("/opt/lib", "aarch64").unwrap();
        assert_eq!(bin.file_name(), "lib.arm64");

        assert!(PlatformBinary::for_arch("/opt/lib", "riscv64").is_err());
    }

    #[test]
    fn test_url() {
        let bin = PlatformBinary::for_arch("/opt/lib", "x86_64").unwrap();
        assert_eq!(
            bin.url("https://example.com/app/"),
            "https://example.com/app/lib.amd64"
        );
    }

    #[tokio::test]
    async fn test_ensure_downloads_once() {
        let dir = tempfile::tempdir().unwrap();
        let bin = PlatformBinary::for_arch(dir.path().join("lib"), "x86_64").unwrap();
        let fetcher = StubFetcher::ok();

        let path = bin.ensure(&fetcher, "https://example.com").await.unwrap();
        assert!(path.is_file());
        assert!(bin.is_present());

        bin.ensure(&fetcher, "https://example.com").await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ensure_failure_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let bin = PlatformBinary::for_arch(dir.path(), "aarch64").unwrap();
        let fetcher = StubFetcher::failing();

        let result = bin.ensure(&fetcher, "https://example.com").await;
        assert!(matches!(
            result,
            Err(Error::Collaborator {
                component: Component::PlatformBinary,
                ..
            })
        ));
        assert!(!bin.is_present());
        assert!(!dir.path().join("lib.arm64.tmp").exists());
    }
}
