//! Device registry implementation

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::task::JoinSet;

use super::config::RegistryConfig;
use crate::bridge::{BridgeStatus, StreamBridge};
use crate::device::Device;
use crate::error::Result;
use crate::inventory::Account;
use crate::native::NativeHandle;

/// Canonical form of a MAC for lookups: upper case, no separators
pub fn normalize_mac(mac: &str) -> String {
    mac.chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Device id to bridge map, built once per initialization
///
/// Read-only after [`build`](Self::build); bridges keep their own runtime
/// state.
pub struct DeviceRegistry {
    /// Bridges in inventory order
    bridges: Vec<Arc<StreamBridge>>,

    /// Normalized MAC to position in `bridges`
    index: HashMap<String, usize>,

    /// Configuration
    config: RegistryConfig,
}

impl DeviceRegistry {
    /// Registry with no devices
    pub fn empty(config: RegistryConfig) -> Self {
        Self {
            bridges: Vec::new(),
            index: HashMap::new(),
            config,
        }
    }

    /// Create one bridge per device and start them all
    ///
    /// Duplicate MACs are dropped first, then ports are assigned in inventory
    /// order. Running out of ports fails the whole build before anything is
    /// bound. A bridge that cannot bind is kept in the registry, stopped, with
    /// its error recorded.
    pub async fn build(
        devices: Vec<Device>,
        account: Arc<Account>,
        native: NativeHandle,
        config: RegistryConfig,
    ) -> Result<Self> {
        config.validate()?;

        let mut unique = Vec::with_capacity(devices.len());
        let mut seen = HashSet::new();
        for device in devices {
            let key = normalize_mac(&device.mac);
            if !seen.insert(key.clone()) {
                tracing::warn!(device = %device.mac, "Duplicate device in inventory, skipped");
                continue;
            }
            unique.push((key, device));
        }

        let ports = (0..unique.len())
            .map(|i| config.port_for(i))
            .collect::<Result<Vec<u16>>>()?;

        let mut registry = Self::empty(config);

        for ((key, device), port) in unique.into_iter().zip(ports) {
            let bridge = Arc::new(StreamBridge::new(
                Arc::new(device),
                Arc::clone(&account),
                native.clone(),
                port,
                registry.config.bridge.clone(),
            ));
            registry.index.insert(key, registry.bridges.len());
            registry.bridges.push(bridge);
        }

        for bridge in &registry.bridges {
            if let Err(e) = bridge.start().await {
                tracing::warn!(device = %bridge.device().mac, error = %e, "Bridge not started");
            }
        }

        tracing::info!(
            devices = registry.len(),
            running = registry.running_count(),
            base_port = registry.config.base_port,
            "Device registry built"
        );
        Ok(registry)
    }

    /// Configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Look up a bridge by device MAC
    pub fn get(&self, mac: &str) -> Option<&Arc<StreamBridge>> {
        self.index
            .get(&normalize_mac(mac))
            .and_then(|&i| self.bridges.get(i))
    }

    /// All bridges in inventory order
    pub fn bridges(&self) -> impl Iterator<Item = &Arc<StreamBridge>> {
        self.bridges.iter()
    }

    /// Number of devices
    pub fn len(&self) -> usize {
        self.bridges.len()
    }

    /// Whether the registry has no devices
    pub fn is_empty(&self) -> bool {
        self.bridges.is_empty()
    }

    /// Bridges with a bound listen socket
    pub fn running_count(&self) -> usize {
        self.bridges.iter().filter(|b| b.is_running()).count()
    }

    /// Stream URL clients should connect to
    pub fn stream_url(&self, bridge: &StreamBridge) -> String {
        format!(
            "{}://{}:{}/{}",
            self.config.stream_scheme,
            self.config.advertise_host,
            bridge.port(),
            bridge.device().mac
        )
    }

    /// Status of every bridge
    pub fn statuses(&self) -> Vec<BridgeStatus> {
        self.bridges.iter().map(|b| b.status()).collect()
    }

    /// Stop every bridge concurrently
    ///
    /// Each bridge bounds its own stop; the whole call is additionally bounded
    /// by the registry shutdown timeout.
    pub async fn stop_all(&self) {
        let mut tasks = JoinSet::new();
        for bridge in &self.bridges {
            let bridge = Arc::clone(bridge);
            tasks.spawn(async move { bridge.stop().await });
        }

        let drained = tokio::time::timeout(self.config.shutdown_timeout, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Bridge stop task failed");
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                remaining = tasks.len(),
                timeout = ?self.config.shutdown_timeout,
                "Bridges did not stop in time"
            );
            tasks.abort_all();
        }

        tracing::info!(devices = self.len(), "All bridges stopped");
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("devices", &self.bridges.len())
            .field("base_port", &self.config.base_port)
            .finish()
    }
}
