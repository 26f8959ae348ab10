//! Account authentication and device inventory
//!
//! The vendor cloud is an external collaborator reached through the
//! [`Inventory`] trait. [`InventoryCache`] keeps the most recent login and
//! device list on disk for a short time so that restarts don't hit the
//! vendor login endpoint every time.

pub mod cache;
pub mod file;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::device::DeviceRecord;
use crate::error::{Error, Result};

pub use cache::{CachedInventory, InventoryCache};
pub use file::StaticInventory;

/// Login input supplied by `initialize`
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    /// Account email
    #[serde(default)]
    pub email: String,
    /// Account password
    #[serde(default)]
    pub password: String,
    /// Developer API key id
    #[serde(default)]
    pub key_id: Option<String>,
    /// Developer API key
    #[serde(default)]
    pub api_key: Option<String>,
    /// TOTP secret for accounts with MFA
    #[serde(default)]
    pub totp_key: Option<String>,
}

impl Credentials {
    /// Check that the mandatory fields are present
    pub fn validate(&self) -> Result<()> {
        if self.email.trim().is_empty() || self.password.is_empty() {
            return Err(Error::Config("email and password are required".into()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("key_id", &self.key_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("totp_key", &self.totp_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Opaque session token issued by the vendor
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Bearer token
    pub access_token: String,
    /// Refresh token
    #[serde(default)]
    pub refresh_token: String,
    /// Account user id
    #[serde(default)]
    pub user_id: String,
    /// Phone id the token was issued for
    #[serde(default)]
    pub phone_id: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("user_id", &self.user_id)
            .field("phone_id", &self.phone_id)
            .finish_non_exhaustive()
    }
}

/// Account metadata needed to open native sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account user id
    pub user_id: String,
    /// Account email
    #[serde(default)]
    pub email: String,
    /// Display name
    #[serde(default)]
    pub nickname: String,
    /// Phone id used for P2P authentication
    #[serde(default)]
    pub phone_id: String,
    /// Open user id used for P2P authentication
    #[serde(default)]
    pub open_user_id: String,
}

/// Vendor account and inventory service
#[async_trait]
pub trait Inventory: Send + Sync + 'static {
    /// Authenticate and obtain a session token
    async fn login(&self, credentials: &Credentials) -> Result<Credential>;

    /// Fetch account metadata
    async fn get_account(&self, credential: &Credential) -> Result<Account>;

    /// Fetch the account's device list
    async fn list_devices(&self, credential: &Credential) -> Result<Vec<DeviceRecord>>;
}

/// Authenticate and fetch the device list, going through the cache
///
/// A cached entry is used only if it is within its TTL and its account email
/// is exactly the requested one. Fresh results are written back to the cache; a cache
/// write failure is logged and otherwise ignored.
pub async fn fetch_inventory(
    inventory: &dyn Inventory,
    cache: Option<&InventoryCache>,
    credentials: &Credentials,
) -> Result<CachedInventory> {
    if let Some(cache) = cache {
        if let Some(cached) = cache.load().await {
            if cached.account.email == credentials.email {
                tracing::info!(
                    devices = cached.devices.len(),
                    age_secs = cached.age_secs(chrono::Utc::now().timestamp()),
                    "Using cached inventory"
                );
                return Ok(cached);
            }
            tracing::debug!("Cached inventory belongs to another account, ignoring");
        }
    }

    tracing::info!(email = %credentials.email, "Logging in");
    let credential = inventory.login(credentials).await?;
    let account = inventory.get_account(&credential).await?;
    let devices = inventory.list_devices(&credential).await?;
    tracing::info!(devices = devices.len(), "Inventory fetched");

    let fresh = CachedInventory::new(credential, account, devices);

    if let Some(cache) = cache {
        if let Err(e) = cache.store(&fresh).await {
            tracing::warn!(error = %e, path = %cache.path().display(), "Failed to write inventory cache");
        }
    }

    Ok(fresh)
}
