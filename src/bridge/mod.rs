//! Stream bridge
//!
//! Exposes one device as a TCP listener serving RFC 4571 framed media.
//!
//! ```text
//!                     ┌──────────────── StreamBridge ────────────────┐
//!  TCP client ◄──────│ accept task ── session ◄── mpsc ◄── worker ◄──│── FrameSession
//!  (one at a time)    └──────────────────────────────────────────────┘
//! ```
//!
//! At most one client, and therefore one native session, per device. The
//! exclusivity flag and the lifecycle state are updated under the same lock,
//! so a reader never sees `Connected` without a held flag.

pub mod config;
pub mod framing;
pub mod listener;
pub mod state;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::device::Device;
use crate::error::{Error, Result};
use crate::inventory::Account;
use crate::native::NativeHandle;
use crate::stats::{BridgeStats, StatsSnapshot};

pub use config::BridgeConfig;
pub use state::BridgeState;

#[derive(Debug)]
struct StatusCell {
    state: BridgeState,
    last_error: Option<String>,
    last_activity: Option<String>,
}

/// State shared between the bridge handle, its accept task and its session
pub(crate) struct Shared {
    pub(crate) device: Arc<Device>,
    pub(crate) account: Arc<Account>,
    pub(crate) native: NativeHandle,
    pub(crate) config: BridgeConfig,
    pub(crate) stats: BridgeStats,
    busy: AtomicBool,
    status: Mutex<StatusCell>,
}

impl Shared {
    fn cell(&self) -> std::sync::MutexGuard<'_, StatusCell> {
        // Poisoning only means a panic elsewhere; the cell is still coherent.
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply `next` if legal from the current state
    pub(crate) fn transition(&self, next: BridgeState) -> bool {
        let mut cell = self.cell();
        self.transition_locked(&mut cell, next)
    }

    fn transition_locked(&self, cell: &mut StatusCell, next: BridgeState) -> bool {
        if !cell.state.can_transition(next) {
            tracing::trace!(
                device = %self.device.mac,
                from = %cell.state,
                to = %next,
                "Ignoring state transition"
            );
            return false;
        }
        tracing::debug!(device = %self.device.mac, from = %cell.state, to = %next, "Bridge state");
        cell.state = next;
        true
    }

    /// Take the exclusivity flag for a new client
    pub(crate) fn try_claim(&self) -> bool {
        let mut cell = self.cell();
        if cell.state != BridgeState::Idle {
            return false;
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.transition_locked(&mut cell, BridgeState::Connected);
        cell.last_activity = Some(now());
        true
    }

    /// Return to `Idle` (unless stopping) and drop the exclusivity flag
    pub(crate) fn release_client(&self) {
        let mut cell = self.cell();
        if cell.state == BridgeState::Connected {
            self.transition_locked(&mut cell, BridgeState::Idle);
        }
        self.busy.store(false, Ordering::Release);
    }

    /// Record client activity
    pub(crate) fn touch(&self) {
        self.cell().last_activity = Some(now());
    }

    fn fail_start(&self, message: String) {
        let mut cell = self.cell();
        self.transition_locked(&mut cell, BridgeState::Stopped);
        cell.last_error = Some(message);
    }

    fn finish_stop(&self) {
        let mut cell = self.cell();
        self.transition_locked(&mut cell, BridgeState::Stopped);
        self.busy.store(false, Ordering::Release);
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

struct Running {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// Point-in-time view of a bridge
#[derive(Debug, Clone, Serialize)]
pub struct BridgeStatus {
    /// Device MAC
    pub camera_id: String,
    /// Assigned port
    pub port: u16,
    /// Lifecycle state
    pub state: BridgeState,
    /// Whether the listen socket is bound
    pub running: bool,
    /// Whether a client is being served
    pub connected: bool,
    /// Last start failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Last client connect or frame write (RFC 3339)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<String>,
    /// Counters
    pub stats: StatsSnapshot,
}

/// TCP listener serving one device
pub struct StreamBridge {
    port: u16,
    shared: Arc<Shared>,
    running: tokio::sync::Mutex<Option<Running>>,
}

impl StreamBridge {
    /// Create a stopped bridge for `device` on `port`
    pub fn new(
        device: Arc<Device>,
        account: Arc<Account>,
        native: NativeHandle,
        port: u16,
        config: BridgeConfig,
    ) -> Self {
        Self {
            port,
            shared: Arc::new(Shared {
                device,
                account,
                native,
                config,
                stats: BridgeStats::new(),
                busy: AtomicBool::new(false),
                status: Mutex::new(StatusCell {
                    state: BridgeState::Stopped,
                    last_error: None,
                    last_activity: None,
                }),
            }),
            running: tokio::sync::Mutex::new(None),
        }
    }

    /// Device this bridge serves
    pub fn device(&self) -> &Arc<Device> {
        &self.shared.device
    }

    /// Assigned port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bind the listen socket and start accepting
    ///
    /// A bind failure leaves the bridge `Stopped` with the error recorded.
    /// Starting a running bridge is a no-op.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }

        let device = &self.shared.device.mac;
        self.shared.transition(BridgeState::Starting);

        let addr = SocketAddr::new(self.shared.config.bind_host, self.port);
        let bound = match TcpListener::bind(addr).await {
            Ok(socket) => socket.local_addr().map(|local| (socket, local)),
            Err(e) => Err(e),
        };
        let (socket, local_addr) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                let message = format!("failed to bind {}: {}", addr, e);
                tracing::error!(device = %device, addr = %addr, error = %e, "Stream bridge failed to start");
                self.shared.fail_start(message.clone());
                return Err(Error::ResourceBusy(message));
            }
        };

        self.shared.cell().last_error = None;
        self.shared.transition(BridgeState::Listening);
        tracing::info!(device = %device, addr = %local_addr, "Stream bridge listening");

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(listener::accept_loop(
            socket,
            Arc::clone(&self.shared),
            shutdown_rx,
        ));

        *running = Some(Running {
            shutdown,
            task,
            local_addr,
        });
        Ok(())
    }

    /// Stop accepting, end any client session and wait for the worker
    ///
    /// Bounded by the configured stop timeout. Stopping a stopped bridge is a
    /// no-op.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };

        let device = &self.shared.device.mac;
        self.shared.transition(BridgeState::Stopping);
        let _ = running.shutdown.send(true);

        let mut task = running.task;
        match tokio::time::timeout(self.shared.config.stop_timeout, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(device = %device, error = %e, "Accept task failed"),
            Err(_) => {
                tracing::warn!(
                    device = %device,
                    timeout = ?self.shared.config.stop_timeout,
                    "Stream bridge did not stop in time, aborting"
                );
                task.abort();
                let _ = task.await;
            }
        }

        self.shared.finish_stop();
        tracing::info!(device = %device, port = self.port, "Stream bridge stopped");
    }

    /// Current lifecycle state
    pub fn state(&self) -> BridgeState {
        self.shared.cell().state
    }

    /// Whether the listen socket is bound
    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Whether a client is being served
    pub fn is_connected(&self) -> bool {
        self.state() == BridgeState::Connected
    }

    /// Bound address while running
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.local_addr)
    }

    /// Counters
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Point-in-time view
    pub fn status(&self) -> BridgeStatus {
        let cell = self.shared.cell();
        BridgeStatus {
            camera_id: self.shared.device.mac.clone(),
            port: self.port,
            state: cell.state,
            running: cell.state.is_running(),
            connected: cell.state == BridgeState::Connected,
            last_error: cell.last_error.clone(),
            last_activity: cell.last_activity.clone(),
            stats: self.shared.stats.snapshot(),
        }
    }
}

impl std::fmt::Debug for StreamBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamBridge")
            .field("device", &self.shared.device.mac)
            .field("port", &self.port)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    use super::*;
    use crate::device::tests::record;
    use crate::native::tests::{Ending, ScriptedContext};
    use crate::native::NativeOwner;

    pub(crate) fn account() -> Arc<Account> {
        Arc::new(Account {
            user_id: "u".into(),
            email: "user@example.com".into(),
            nickname: String::new(),
            phone_id: "p".into(),
            open_user_id: "o".into(),
        })
    }

    pub(crate) fn local_config() -> BridgeConfig {
        BridgeConfig::default()
            .bind_host(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .stop_timeout(Duration::from_secs(2))
    }

    fn bridge(context: Arc<ScriptedContext>) -> (StreamBridge, NativeOwner) {
        let owner = NativeOwner::new(context);
        let device = Arc::new(Device::from_record(&record("2CAA8E000001", "WYZE_CAKP2")).unwrap());
        let bridge = StreamBridge::new(device, account(), owner.handle(), 0, local_config());
        (bridge, owner)
    }

    async fn wait_for(bridge: &StreamBridge, state: BridgeState) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while bridge.state() != state {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("bridge never reached {}", state));
    }

    #[tokio::test]
    async fn test_frames_in_order_over_tcp() {
        let context = Arc::new(ScriptedContext::numbered(20, Ending::Eof));
        let (bridge, _owner) = bridge(context.clone());
        bridge.start().await.unwrap();
        let addr = bridge.local_addr().await.unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut received = Vec::new();
        while let Some(frame) = framing::read_frame(&mut client).await.unwrap() {
            received.push(frame);
        }

        let expected: Vec<Bytes> = (1..=20u8).map(|i| Bytes::from(vec![i])).collect();
        assert_eq!(received, expected);

        wait_for(&bridge, BridgeState::Idle).await;
        let stats = bridge.stats();
        assert_eq!(stats.connections, 1);
        assert_eq!(stats.frames_sent, 20);
        assert_eq!(stats.bytes_sent, 60);
        assert_eq!(context.closed.load(Ordering::SeqCst), 1);

        bridge.stop().await;
    }

    #[tokio::test]
    async fn test_second_client_rejected() {
        let context = Arc::new(
            ScriptedContext::new(Vec::new(), Ending::Endless).with_delay(Duration::from_millis(2)),
        );
        let (bridge, _owner) = bridge(context.clone());
        bridge.start().await.unwrap();
        let addr = bridge.local_addr().await.unwrap();

        let mut first = TcpStream::connect(addr).await.unwrap();
        assert!(framing::read_frame(&mut first).await.unwrap().is_some());
        assert!(bridge.is_connected());

        let mut second = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 16];
        let n = tokio::time::timeout(Duration::from_secs(2), second.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);

        assert_eq!(bridge.stats().rejected, 1);
        assert_eq!(context.opened.load(Ordering::SeqCst), 1);
        assert_eq!(context.max_active.load(Ordering::SeqCst), 1);

        // First client keeps streaming.
        assert!(framing::read_frame(&mut first).await.unwrap().is_some());

        drop(first);
        wait_for(&bridge, BridgeState::Idle).await;
        assert_eq!(context.closed.load(Ordering::SeqCst), 1);

        bridge.stop().await;
    }

    #[tokio::test]
    async fn test_source_failure_returns_to_idle() {
        let context = Arc::new(ScriptedContext::numbered(2, Ending::Fail));
        let (bridge, _owner) = bridge(context.clone());
        bridge.start().await.unwrap();
        let addr = bridge.local_addr().await.unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut count = 0;
        let closed = tokio::time::timeout(Duration::from_secs(2), async {
            while let Ok(Some(_)) = framing::read_frame(&mut client).await {
                count += 1;
            }
        })
        .await;

        assert!(closed.is_ok());
        assert_eq!(count, 2);
        wait_for(&bridge, BridgeState::Idle).await;
        assert_eq!(bridge.stats().source_failures, 1);

        // A new client can connect afterwards.
        let mut again = TcpStream::connect(addr).await.unwrap();
        assert!(framing::read_frame(&mut again).await.unwrap().is_some());

        bridge.stop().await;
    }

    #[tokio::test]
    async fn test_open_failure_closes_client() {
        let context = Arc::new(ScriptedContext::failing_open());
        let (bridge, _owner) = bridge(context.clone());
        bridge.start().await.unwrap();
        let addr = bridge.local_addr().await.unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        let frame = tokio::time::timeout(Duration::from_secs(2), framing::read_frame(&mut client))
            .await
            .unwrap();
        assert!(matches!(frame, Ok(None) | Err(_)));

        wait_for(&bridge, BridgeState::Idle).await;
        bridge.stop().await;
    }

    #[tokio::test]
    async fn test_bind_failure_records_error() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let context = Arc::new(ScriptedContext::new(Vec::new(), Ending::Eof));
        let owner = NativeOwner::new(context);
        let device = Arc::new(Device::from_record(&record("2CAA8E000001", "WYZE_CAKP2")).unwrap());
        let bridge = StreamBridge::new(device, account(), owner.handle(), port, local_config());

        let err = bridge.start().await.unwrap_err();
        assert!(matches!(err, Error::ResourceBusy(_)));

        let status = bridge.status();
        assert_eq!(status.state, BridgeState::Stopped);
        assert!(!status.running);
        assert!(status.last_error.is_some());
    }

    #[tokio::test]
    async fn test_stop_ends_active_session() {
        let context = Arc::new(
            ScriptedContext::new(Vec::new(), Ending::Endless).with_delay(Duration::from_millis(1)),
        );
        let (bridge, _owner) = bridge(context.clone());
        bridge.start().await.unwrap();
        let addr = bridge.local_addr().await.unwrap();
        assert!(bridge.is_running());

        let mut client = TcpStream::connect(addr).await.unwrap();
        assert!(framing::read_frame(&mut client).await.unwrap().is_some());

        tokio::time::timeout(Duration::from_secs(3), bridge.stop())
            .await
            .unwrap();

        assert_eq!(bridge.state(), BridgeState::Stopped);
        assert!(bridge.local_addr().await.is_none());
        assert_eq!(context.closed.load(Ordering::SeqCst), 1);
        assert_eq!(context.active.load(Ordering::SeqCst), 0);
        assert!(TcpStream::connect(addr).await.is_err());

        // Idempotent.
        bridge.stop().await;
    }
}
