//! camera-bridge
//!
//! Exposes peer-to-peer cameras as plain TCP streams. Each camera gets one
//! listener serving RFC 4571 framed media; a newline-delimited JSON-RPC 2.0
//! control plane initializes the shared native library, builds the device
//! registry and answers health and inventory queries.
//!
//! ```text
//!  stdin ─► ControlPlane ─► DeviceRegistry ─► StreamBridge (:8564) ◄── client
//!  stdout ◄─┘     │                         ─► StreamBridge (:8565) ◄── client
//!                 └─ NativeOwner ── NativeHandle (shared by every bridge)
//! ```
//!
//! External services sit behind traits: [`inventory::Inventory`] for the
//! account and device list, [`native::NativeLibrary`] for the P2P sessions
//! and [`native::BinaryFetcher`] for the platform binary.

pub mod bridge;
pub mod control;
pub mod device;
pub mod error;
pub mod inventory;
pub mod native;
pub mod registry;
pub mod source;
pub mod stats;

pub use bridge::{BridgeConfig, BridgeState, BridgeStatus, StreamBridge};
pub use control::{serve, Collaborators, ControlPlane, PlaneConfig};
pub use device::{Device, DeviceRecord};
pub use error::{Error, Result};
pub use registry::{DeviceRegistry, RegistryConfig};
