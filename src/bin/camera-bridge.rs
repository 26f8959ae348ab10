//! camera-bridge process
//!
//! JSON-RPC requests on stdin, responses on stdout, logs on stderr.
//!
//! Usage:
//!   camera-bridge --inventory cameras.json --capture-dir ./captures
//!   camera-bridge --inventory cameras.json --capture-dir ./captures --base-port 9000
//!
//! Then, on stdin:
//!   {"jsonrpc":"2.0","id":1,"method":"initialize","params":{"email":"me@example.com","password":"..."}}
//!   {"jsonrpc":"2.0","id":2,"method":"list_cameras"}
//!
//! Set RUST_LOG to adjust verbosity (default: info).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use argh::FromArgs;
use tokio::io::BufReader;

use camera_bridge::control::{serve, Collaborators, ControlPlane, PlaneConfig};
use camera_bridge::inventory::StaticInventory;
use camera_bridge::native::{BinaryFetcher, HttpFetcher, ReplayLibrary};

/// Expose cameras as TCP streams behind a JSON-RPC control channel.
#[derive(FromArgs)]
struct Args {
    /// account and device inventory JSON file
    #[argh(option, short = 'i')]
    inventory: PathBuf,

    /// directory of per-camera capture files (<MAC>.rfc4571) to stream
    #[argh(option, short = 'c')]
    capture_dir: PathBuf,

    /// directory for the platform binary
    #[argh(option)]
    lib_dir: Option<PathBuf>,

    /// port of the first camera stream
    #[argh(option, short = 'p')]
    base_port: Option<u16>,

    /// host placed in stream URLs (default: 127.0.0.1)
    #[argh(option)]
    advertise_host: Option<String>,

    /// delay between replayed frames in milliseconds (default: 66)
    #[argh(option, default = "66")]
    frame_interval_ms: u64,

    /// stop each replay at the end of its capture instead of looping
    #[argh(switch)]
    no_loop: bool,

    /// download the platform binary over HTTPS when missing
    #[argh(switch)]
    download_binary: bool,

    /// do not read or write the inventory cache
    #[argh(switch)]
    no_cache: bool,
}

fn init_logging() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))?,
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
    Ok(())
}

fn plane_config(args: &Args) -> anyhow::Result<PlaneConfig> {
    let mut config = PlaneConfig::default()
        .with_env()
        .context("invalid environment configuration")?;

    if let Some(dir) = &args.lib_dir {
        config.lib_dir = dir.clone();
    }
    if let Some(port) = args.base_port {
        config.registry.base_port = port;
    }
    if let Some(host) = &args.advertise_host {
        config.registry.advertise_host = host.clone();
    }
    if args.no_cache {
        config.cache_path = None;
    }
    config
        .registry
        .validate()
        .context("invalid --base-port")?;
    Ok(config)
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();
    init_logging()?;

    let config = plane_config(&args)?;
    let replay = ReplayLibrary::new(&args.capture_dir)
        .frame_interval(Duration::from_millis(args.frame_interval_ms))
        .looping(!args.no_loop);
    let fetcher: Arc<dyn BinaryFetcher> = if args.download_binary {
        Arc::new(HttpFetcher::new())
    } else {
        Arc::new(replay.clone())
    };

    tracing::info!(
        inventory = %args.inventory.display(),
        captures = %args.capture_dir.display(),
        base_port = config.registry.base_port,
        lib_dir = %config.lib_dir.display(),
        "camera-bridge starting"
    );

    let plane = ControlPlane::new(
        config,
        Collaborators {
            inventory: Arc::new(StaticInventory::new(&args.inventory)),
            library: Arc::new(replay),
            fetcher,
        },
    );

    serve(
        &plane,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        shutdown_signal(),
    )
    .await
    .context("control channel failed")?;

    tracing::info!("camera-bridge stopped");
    Ok(())
}
