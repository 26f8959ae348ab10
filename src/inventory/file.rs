//! Offline inventory backed by a JSON export
//!
//! Serves the account and device list from a local file instead of the vendor
//! cloud. Used for lab setups and replay deployments.
//!
//! ```json
//! {
//!   "account": { "user_id": "u-1", "email": "me@example.com", "phone_id": "p-1" },
//!   "devices": [ { "mac": "2CAA8E000001", "nickname": "Porch", "product_model": "WYZE_CAKP2" } ]
//! }
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use crate::device::DeviceRecord;
use crate::error::{Component, Error, Result};

use super::{Account, Credential, Credentials, Inventory};

#[derive(Debug, Deserialize)]
struct InventoryFile {
    account: Account,
    #[serde(default)]
    devices: Vec<DeviceRecord>,
}

/// Inventory read from a JSON file
#[derive(Debug, Clone)]
pub struct StaticInventory {
    path: PathBuf,
}

impl StaticInventory {
    /// Create an inventory reading from `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Inventory file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<InventoryFile> {
        let data = tokio::fs::read(&self.path).await.map_err(|e| {
            Error::collaborator(
                Component::Inventory,
                format!("{}: {}", self.path.display(), e),
            )
        })?;
        serde_json::from_slice(&data).map_err(|e| {
            Error::collaborator(
                Component::Inventory,
                format!("{}: {}", self.path.display(), e),
            )
        })
    }
}

#[async_trait]
impl Inventory for StaticInventory {
    async fn login(&self, credentials: &Credentials) -> Result<Credential> {
        credentials.validate()?;
        let file = self.read().await?;

        if !file.account.email.is_empty() && file.account.email != credentials.email {
            return Err(Error::collaborator(
                Component::Authentication,
                format!("{} is not the account in {}", credentials.email, self.path.display()),
            ));
        }

        Ok(Credential {
            access_token: format!("static:{}", file.account.user_id),
            refresh_token: String::new(),
            user_id: file.account.user_id,
            phone_id: file.account.phone_id,
        })
    }

    async fn get_account(&self, _credential: &Credential) -> Result<Account> {
        Ok(self.read().await?.account)
    }

    async fn list_devices(&self, _credential: &Credential) -> Result<Vec<DeviceRecord>> {
        Ok(self.read().await?.devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::tests::credentials;

    const FILE: &str = r#"{
        "account": { "user_id": "u-1", "email": "me@example.com", "phone_id": "p-1" },
        "devices": [
            { "mac": "2CAA8E000001", "nickname": "Porch", "product_model": "WYZE_CAKP2" },
            { "mac": "2CAA8E000002", "nickname": "Plug", "product_model": "WLPP1" }
        ]
    }"#;

    #[tokio::test]
    async fn test_static_inventory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");
        tokio::fs::write(&path, FILE).await.unwrap();
        let inventory = StaticInventory::new(&path);

        let credential = inventory.login(&credentials("me@example.com")).await.unwrap();
        assert_eq!(credential.user_id, "u-1");

        let account = inventory.get_account(&credential).await.unwrap();
        assert_eq!(account.phone_id, "p-1");

        let devices = inventory.list_devices(&credential).await.unwrap();
        assert_eq!(devices.len(), 2);
    }

    #[tokio::test]
    async fn test_static_inventory_wrong_account() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");
        tokio::fs::write(&path, FILE).await.unwrap();
        let inventory = StaticInventory::new(&path);

        let result = inventory.login(&credentials("other@example.com")).await;
        assert!(matches!(result, Err(Error::Collaborator { .. })));
    }

    #[tokio::test]
    async fn test_static_inventory_missing_file() {
        let inventory = StaticInventory::new("/nonexistent/inventory.json");
        let result = inventory.login(&credentials("me@example.com")).await;

        assert!(matches!(
            result,
            Err(Error::Collaborator {
                component: Component::Inventory,
                ..
            })
        ));
    }
}
