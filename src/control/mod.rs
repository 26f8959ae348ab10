//! JSON-RPC control plane
//!
//! Newline-delimited JSON-RPC 2.0 over a byte stream (stdin/stdout in the
//! binary). The plane owns the native library and the device registry.

pub mod config;
pub mod health;
pub mod jsonrpc;
pub mod plane;
pub mod server;

pub use config::PlaneConfig;
pub use health::{HealthReport, HealthState};
pub use plane::{CameraEntry, Collaborators, ControlPlane, DiscoveredCamera, InitializeParams};
pub use server::serve;
