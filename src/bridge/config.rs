//! Bridge configuration

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Default frames buffered between the worker and the socket
pub const DEFAULT_QUEUE_CAPACITY: usize = 4;

/// Per-bridge configuration options
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Address the listen socket binds to
    pub bind_host: IpAddr,

    /// Frames buffered between the worker thread and the client writer
    pub queue_capacity: usize,

    /// How long `stop` waits for the accept loop, session and worker
    pub stop_timeout: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            stop_timeout: Duration::from_secs(5),
            tcp_nodelay: true, // Important for low latency
        }
    }
}

impl BridgeConfig {
    /// Set the bind address
    pub fn bind_host(mut self, host: IpAddr) -> Self {
        self.bind_host = host;
        self
    }

    /// Set the hand-off queue capacity (at least 1)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the stop timeout
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();

        assert!(config.bind_host.is_unspecified());
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.stop_timeout, Duration::from_secs(5));
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_builder_queue_capacity_min() {
        let config = BridgeConfig::default().queue_capacity(0);

        assert_eq!(config.queue_capacity, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let config = BridgeConfig::default()
            .bind_host(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .queue_capacity(8)
            .stop_timeout(Duration::from_millis(500))
            .tcp_nodelay(false);

        assert_eq!(config.bind_host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.stop_timeout, Duration::from_millis(500));
        assert!(!config.tcp_nodelay);
    }
}
