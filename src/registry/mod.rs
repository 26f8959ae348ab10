//! Device registry
//!
//! Maps device ids to their stream bridges. Built once per `initialize` from
//! the resolved inventory; every bridge is started immediately.
//!
//! ```text
//!                      DeviceRegistry
//!              ┌──────────────────────────────┐
//!              │ 2CAA8E000001 ─► bridge :8564 │
//!              │ 2CAA8E000002 ─► bridge :8565 │
//!              │ 2CAA8E000003 ─► bridge :8566 │
//!              └──────────────────────────────┘
//! ```

pub mod config;
pub mod store;

pub use config::{RegistryConfig, DEFAULT_BASE_PORT};
pub use store::{normalize_mac, DeviceRegistry};
