//! Control plane
//!
//! Owns the native library, the device registry and the inventory session.
//! Requests are handled one at a time, in arrival order.
//!
//! ```text
//!   initialize ─► credentials ─► platform binary ─► NativeOwner::initialize
//!                                                     │
//!                       inventory (cache or login) ◄──┘
//!                                 │
//!                       resolve devices ─► DeviceRegistry::build (start all)
//!
//!   shutdown   ─► stop all bridges ─► NativeOwner::teardown
//! ```

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use super::config::PlaneConfig;
use super::health::{self, HealthReport};
use super::jsonrpc::{codes, decode, Incoming, Request, Response};
use crate::bridge::StreamBridge;
use crate::device::{resolve_devices, CameraFilter, CapabilitySet, MANUFACTURER};
use crate::error::{Error, Result};
use crate::inventory::{fetch_inventory, Credentials, Inventory, InventoryCache};
use crate::native::{BinaryFetcher, NativeLibrary, NativeOwner, PlatformBinary};
use crate::registry::DeviceRegistry;

/// Plugin identifier reported in camera entries
pub const PLUGIN_ID: &str = "wyze";

/// External services the control plane depends on
#[derive(Clone)]
pub struct Collaborators {
    /// Account and device inventory
    pub inventory: Arc<dyn Inventory>,
    /// Native P2P library
    pub library: Arc<dyn NativeLibrary>,
    /// Platform binary download
    pub fetcher: Arc<dyn BinaryFetcher>,
}

/// `initialize` params
#[derive(Debug, Default, Deserialize)]
pub struct InitializeParams {
    #[serde(flatten)]
    pub credentials: Credentials,
    /// Base media port
    #[serde(default, alias = "rtsp_port")]
    pub base_port: Option<u16>,
    /// Platform binary directory
    #[serde(default)]
    pub lib_dir: Option<String>,
    /// Host placed in stream URLs
    #[serde(default)]
    pub advertise_host: Option<String>,
    /// Restrict and rename cameras
    #[serde(default)]
    pub cameras: Vec<CameraFilter>,
}

#[derive(Debug, Deserialize)]
struct GetCameraParams {
    camera_id: String,
}

#[derive(Debug, Deserialize)]
struct AddCameraParams {
    mac: String,
    #[serde(default)]
    name: Option<String>,
}

/// Camera entry returned by `list_cameras`, `get_camera` and `add_camera`
#[derive(Debug, Clone, Serialize)]
pub struct CameraEntry {
    pub id: String,
    pub plugin_id: &'static str,
    pub name: String,
    pub model: &'static str,
    pub manufacturer: &'static str,
    pub host: String,
    pub main_stream: String,
    pub sub_stream: String,
    pub snapshot_url: String,
    pub capabilities: CapabilitySet,
    pub online: bool,
    pub last_seen: String,
}

/// Camera entry returned by `discover_cameras`
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredCamera {
    pub id: String,
    pub name: String,
    pub model: &'static str,
    pub manufacturer: &'static str,
    pub capabilities: CapabilitySet,
    pub firmware_version: String,
    pub serial: String,
}

/// Everything created by a successful `initialize`
struct Session {
    native: NativeOwner,
    registry: DeviceRegistry,
}

struct Inner {
    config: PlaneConfig,
    collaborators: Collaborators,
    session: Mutex<Option<Session>>,
}

/// Request handler for the control channel
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct ControlPlane {
    inner: Arc<Inner>,
}

fn params<T: DeserializeOwned>(value: Option<Value>) -> Result<T> {
    let value = match value {
        None | Some(Value::Null) => json!({}),
        Some(value) => value,
    };
    serde_json::from_value(value).map_err(|e| Error::InvalidParams(e.to_string()))
}

fn to_value<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl ControlPlane {
    /// Create an uninitialized control plane
    pub fn new(config: PlaneConfig, collaborators: Collaborators) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                collaborators,
                session: Mutex::new(None),
            }),
        }
    }

    /// Answer one control line
    ///
    /// Handlers run on their own task so that a panic becomes an internal
    /// error response instead of ending the loop.
    pub async fn respond(&self, line: &str) -> Response {
        let request = match decode(line) {
            Incoming::Request(request) => request,
            Incoming::Invalid(id) => {
                tracing::warn!("Invalid request");
                return Response::from_error(id, &Error::Protocol("Invalid Request".into()));
            }
            Incoming::Malformed => {
                tracing::warn!("Malformed control line");
                return Response::parse_error();
            }
        };

        let id = request.response_id();
        let method = request.method.clone();
        let plane = self.clone();

        match tokio::spawn(async move { plane.handle(request).await }).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(method = %method, error = %e, "Request handler panicked");
                Response::fail(id, codes::INTERNAL_ERROR, "Internal error")
            }
        }
    }

    /// Dispatch a decoded request
    pub async fn handle(&self, request: Request) -> Response {
        let id = request.response_id();
        tracing::debug!(method = %request.method, "Request");

        let result = match request.method.as_str() {
            "initialize" => match params::<InitializeParams>(request.params) {
                Ok(p) => self.initialize(p).await,
                Err(e) => Err(e),
            },
            "shutdown" => self.shutdown().await.map(|()| json!({"status": "ok"})),
            "health" => to_value(self.health().await),
            "discover_cameras" => to_value(self.discover_cameras().await),
            "list_cameras" => to_value(self.list_cameras().await),
            "get_camera" => match params::<GetCameraParams>(request.params) {
                Ok(p) => self.get_camera(&p.camera_id).await.and_then(to_value),
                Err(e) => Err(e),
            },
            "add_camera" => match params::<AddCameraParams>(request.params) {
                Ok(p) => self
                    .add_camera(&p.mac, p.name.as_deref())
                    .await
                    .and_then(to_value),
                Err(e) => Err(e),
            },
            other => {
                tracing::warn!(method = %other, "Unknown method");
                return Response::fail(
                    id,
                    codes::METHOD_NOT_FOUND,
                    format!("Method not found: {}", other),
                );
            }
        };

        match result {
            Ok(value) => Response::success(id, value),
            Err(e) => {
                tracing::error!(method = %request.method, error = %e, "Request failed");
                Response::from_error(id, &e)
            }
        }
    }

    /// Authenticate, initialize the native library and start every bridge
    ///
    /// Calling it again while initialized reports the existing camera count.
    pub async fn initialize(&self, params: InitializeParams) -> Result<Value> {
        params.credentials.validate()?;

        let mut session = self.inner.session.lock().await;
        if let Some(existing) = session.as_ref() {
            tracing::info!(cameras = existing.registry.len(), "Already initialized");
            return Ok(json!({"status": "ok", "cameras": existing.registry.len()}));
        }

        let mut config = self.inner.config.clone();
        if let Some(port) = params.base_port {
            config.registry.base_port = port;
        }
        if let Some(dir) = params.lib_dir.as_deref().filter(|d| !d.is_empty()) {
            config.lib_dir = dir.into();
        }
        if let Some(host) = params.advertise_host.as_deref().filter(|h| !h.is_empty()) {
            config.registry.advertise_host = host.to_string();
        }
        config.registry.validate()?;

        let collaborators = &self.inner.collaborators;

        let binary = PlatformBinary::for_host(&config.lib_dir)?;
        let path = binary
            .ensure(collaborators.fetcher.as_ref(), &config.binary_base_url)
            .await?;
        let native = NativeOwner::initialize(Arc::clone(&collaborators.library), &path).await?;

        let cache = config
            .cache_path
            .as_ref()
            .map(|path| InventoryCache::new(path, config.cache_ttl));
        let inventory = match fetch_inventory(
            collaborators.inventory.as_ref(),
            cache.as_ref(),
            &params.credentials,
        )
        .await
        {
            Ok(inventory) => inventory,
            Err(e) => {
                native.teardown();
                return Err(e);
            }
        };

        let devices = resolve_devices(&inventory.devices, &params.cameras);
        let account = Arc::new(inventory.account);
        for device in &devices {
            tracing::info!(device = %device.mac, name = %device.name, model = device.model(), "Found camera");
        }

        let registry = match DeviceRegistry::build(
            devices,
            account,
            native.handle(),
            config.registry.clone(),
        )
        .await
        {
            Ok(registry) => registry,
            Err(e) => {
                native.teardown();
                return Err(e);
            }
        };

        let cameras = registry.len();
        tracing::info!(cameras = cameras, running = registry.running_count(), "Initialized");
        *session = Some(Session { native, registry });

        Ok(json!({"status": "ok", "cameras": cameras}))
    }

    /// Stop every bridge, then tear the native library down
    ///
    /// Safe to call any number of times.
    pub async fn shutdown(&self) -> Result<()> {
        let session = self.inner.session.lock().await.take();
        let Some(Session { native, registry }) = session else {
            tracing::debug!("Shutdown with nothing to stop");
            return Ok(());
        };

        tracing::info!(cameras = registry.len(), "Shutting down");
        registry.stop_all().await;
        native.teardown();
        Ok(())
    }

    /// Whether `initialize` has succeeded and `shutdown` has not run since
    pub async fn is_initialized(&self) -> bool {
        self.inner.session.lock().await.is_some()
    }

    /// Aggregate health, recomputed on every call
    pub async fn health(&self) -> HealthReport {
        let session = self.inner.session.lock().await;
        let (authenticated, statuses) = match session.as_ref() {
            Some(s) => (true, s.registry.statuses()),
            None => (false, Vec::new()),
        };
        health::evaluate(authenticated, statuses, Utc::now())
    }

    /// Devices without stream URLs
    pub async fn discover_cameras(&self) -> Vec<DiscoveredCamera> {
        let session = self.inner.session.lock().await;
        let Some(session) = session.as_ref() else {
            return Vec::new();
        };

        session
            .registry
            .bridges()
            .map(|bridge| {
                let device = bridge.device();
                DiscoveredCamera {
                    id: device.mac.clone(),
                    name: device.name.clone(),
                    model: device.profile.name,
                    manufacturer: MANUFACTURER,
                    capabilities: device.capabilities,
                    firmware_version: device.firmware_version.clone(),
                    serial: device.mac.clone(),
                }
            })
            .collect()
    }

    /// Devices with stream URLs
    pub async fn list_cameras(&self) -> Vec<CameraEntry> {
        let session = self.inner.session.lock().await;
        let Some(session) = session.as_ref() else {
            return Vec::new();
        };

        session
            .registry
            .bridges()
            .map(|bridge| camera_entry(&session.registry, bridge, None))
            .collect()
    }

    /// One device by id
    pub async fn get_camera(&self, camera_id: &str) -> Result<CameraEntry> {
        let session = self.inner.session.lock().await;
        session
            .as_ref()
            .and_then(|s| {
                s.registry
                    .get(camera_id)
                    .map(|bridge| camera_entry(&s.registry, bridge, None))
            })
            .ok_or_else(|| Error::NotFound(camera_id.to_string()))
    }

    /// Confirm a device for registration, optionally under another name
    ///
    /// Bridges are only ever created by `initialize`; this never adds one.
    pub async fn add_camera(&self, mac: &str, name: Option<&str>) -> Result<CameraEntry> {
        let session = self.inner.session.lock().await;
        session
            .as_ref()
            .and_then(|s| {
                s.registry
                    .get(mac)
                    .map(|bridge| camera_entry(&s.registry, bridge, name.filter(|n| !n.is_empty())))
            })
            .ok_or_else(|| Error::NotFound(mac.to_string()))
    }
}

fn camera_entry(registry: &DeviceRegistry, bridge: &StreamBridge, name: Option<&str>) -> CameraEntry {
    let device = bridge.device();
    let status = bridge.status();

    CameraEntry {
        id: device.mac.clone(),
        plugin_id: PLUGIN_ID,
        name: name.unwrap_or(&device.name).to_string(),
        model: device.profile.name,
        manufacturer: MANUFACTURER,
        host: device.host.clone().unwrap_or_default(),
        main_stream: registry.stream_url(bridge),
        sub_stream: String::new(),
        snapshot_url: String::new(),
        capabilities: device.capabilities,
        online: status.connected,
        last_seen: status.last_activity.unwrap_or_else(now),
    }
}
