//! Error types
//!
//! One variant per failure class. Each error knows which JSON-RPC code it maps
//! to and which message is safe to show on the control channel.

use thiserror::Error;

use crate::control::jsonrpc::codes;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid credentials/options
    #[error("configuration error: {0}")]
    Config(String),

    /// An external collaborator (inventory, native session, binary fetch) failed
    #[error("{component} failed: {message}")]
    Collaborator {
        /// Which collaborator failed
        component: Component,
        /// Full detail, logged but not sent to the caller
        message: String,
    },

    /// A port is already bound, or a device is already being streamed
    #[error("resource busy: {0}")]
    ResourceBusy(String),

    /// Listen ports ran out while allocating device ports
    #[error("no listen port available for device #{index} from base port {base}")]
    PortExhausted {
        /// Configured base port
        base: u16,
        /// Ordinal of the device that could not be placed
        index: usize,
    },

    /// A requested device does not exist
    #[error("camera not found: {0}")]
    NotFound(String),

    /// Malformed control-channel input
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Method params could not be decoded
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error outside the control channel (cache file, inventory file)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// External collaborator that produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    /// Account authentication
    Authentication,
    /// Device inventory retrieval
    Inventory,
    /// Native library initialization or session
    Native,
    /// Platform binary acquisition
    PlatformBinary,
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Component::Authentication => "authentication",
            Component::Inventory => "device inventory",
            Component::Native => "native library",
            Component::PlatformBinary => "platform binary",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Shorthand for a collaborator error
    pub fn collaborator(component: Component, message: impl Into<String>) -> Self {
        Error::Collaborator {
            component,
            message: message.into(),
        }
    }

    /// JSON-RPC error code for this error
    pub fn rpc_code(&self) -> i64 {
        match self {
            Error::Config(_) | Error::InvalidParams(_) => codes::INVALID_PARAMS,
            Error::NotFound(_) => codes::NOT_FOUND,
            Error::Protocol(_) => codes::INVALID_REQUEST,
            Error::Collaborator { .. }
            | Error::ResourceBusy(_)
            | Error::PortExhausted { .. }
            | Error::Io(_)
            | Error::Json(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Message sent on the control channel
    ///
    /// Collaborator errors only name the component; the full detail stays in
    /// the log.
    pub fn public_message(&self) -> String {
        match self {
            Error::Collaborator { component, .. } => format!("{} failed", component),
            Error::Io(_) | Error::Json(_) => "Internal error".to_string(),
            Error::Protocol(message) => message.clone(),
            other => other.to_string(),
        }
    }
}
