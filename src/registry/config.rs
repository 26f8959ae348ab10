//! Registry configuration

use std::time::Duration;

use crate::bridge::BridgeConfig;
use crate::error::{Error, Result};

/// First media port when nothing else is configured
pub const DEFAULT_BASE_PORT: u16 = 8564;

/// Configuration for the device registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Port of the first device; device `i` listens on `base_port + i`
    pub base_port: u16,

    /// Host placed in stream URLs
    pub advertise_host: String,

    /// Scheme placed in stream URLs
    pub stream_scheme: String,

    /// Upper bound for stopping every bridge at shutdown
    pub shutdown_timeout: Duration,

    /// Settings applied to every bridge
    pub bridge: BridgeConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_port: DEFAULT_BASE_PORT,
            advertise_host: "127.0.0.1".to_string(),
            stream_scheme: "tcp".to_string(),
            shutdown_timeout: Duration::from_secs(10),
            bridge: BridgeConfig::default(),
        }
    }
}

impl RegistryConfig {
    /// Set the base port
    pub fn base_port(mut self, port: u16) -> Self {
        self.base_port = port;
        self
    }

    /// Set the advertised host
    pub fn advertise_host(mut self, host: impl Into<String>) -> Self {
        self.advertise_host = host.into();
        self
    }

    /// Set the stream URL scheme
    pub fn stream_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.stream_scheme = scheme.into();
        self
    }

    /// Set the shutdown timeout
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the per-bridge configuration
    pub fn bridge(mut self, bridge: BridgeConfig) -> Self {
        self.bridge = bridge;
        self
    }

    /// Reject settings no device could be served with
    pub fn validate(&self) -> Result<()> {
        if self.base_port == 0 {
            return Err(Error::Config("base port must be between 1 and 65535".into()));
        }
        Ok(())
    }

    /// Port for the device at `index`
    pub fn port_for(&self, index: usize) -> Result<u16> {
        (self.base_port as usize)
            .checked_add(index)
            .and_then(|port| u16::try_from(port).ok())
            .ok_or(Error::PortExhausted {
                base: self.base_port,
                index,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();

        assert_eq!(config.base_port, 8564);
        assert_eq!(config.advertise_host, "127.0.0.1");
        assert_eq!(config.stream_scheme, "tcp");
    }

    #[test]
    fn test_port_for() {
        let config = RegistryConfig::default().base_port(9000);

        assert_eq!(config.port_for(0).unwrap(), 9000);
        assert_eq!(config.port_for(7).unwrap(), 9007);
    }

    #[test]
    fn test_zero_base_port_rejected() {
        assert!(matches!(
            RegistryConfig::default().base_port(0).validate(),
            Err(Error::Config(_))
        ));
        assert!(RegistryConfig::default().base_port(1).validate().is_ok());
    }

    #[test]
    fn test_port_exhaustion() {
        let config = RegistryConfig::default().base_port(65534);

        assert_eq!(config.port_for(1).unwrap(), 65535);
        assert!(matches!(
            config.port_for(2),
            Err(Error::PortExhausted { base: 65534, index: 2 })
        ));
    }
}
