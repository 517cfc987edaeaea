//! Development HTTP server with live reload.
//!
//! Serves the project's HTML entry (with a reload client injected), static
//! files from the public directory and, optionally, the output of a watch
//! compiler. A polling file watcher pushes change events to browsers over
//! Server-Sent Events.

pub mod routes;
pub mod sse;
pub mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use crate::state::ChangeEvent;
use crate::state::AppState;

/// How long open connections get to finish after a stop request.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Everything needed to start a dev server.
#[derive(Debug, Clone)]
pub struct DevServerOptions {
    pub host: String,
    pub port: u16,
    pub index_html: PathBuf,
    pub public_dir: PathBuf,
    pub src_dir: PathBuf,
    /// Watch compiler output, served after the public dir.
    pub output_dir: Option<PathBuf>,
    /// Public path, e.g. `/` or `/app/`.
    pub public_path: String,
    pub poll_interval: Duration,
}

impl DevServerOptions {
    /// Options for `127.0.0.1` on an ephemeral port with no watch compiler.
    pub fn new(
        index_html: impl Into<PathBuf>,
        public_dir: impl Into<PathBuf>,
        src_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            index_html: index_html.into(),
            public_dir: public_dir.into(),
            src_dir: src_dir.into(),
            output_dir: None,
            public_path: "/".to_string(),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// A running dev server. Dropping it without [`DevServerHandle::stop`] aborts
/// the background tasks.
pub struct DevServerHandle {
    local_addr: SocketAddr,
    event_tx: std::sync::Arc<broadcast::Sender<ChangeEvent>>,
    shutdown_tx: watch::Sender<bool>,
    server: Option<JoinHandle<std::io::Result<()>>>,
    watcher: JoinHandle<()>,
}

/// Bind, then serve in the background. Returns once the socket is listening.
pub async fn start(options: DevServerOptions) -> Result<DevServerHandle> {
    if !options.public_path.starts_with('/') {
        return Err(anyhow!(
            "public path must start with '/', got {:?}",
            options.public_path
        ));
    }
    let listener = TcpListener::bind((options.host.as_str(), options.port))
        .await
        .with_context(|| format!("bind {}:{}", options.host, options.port))?;
    let local_addr = listener.local_addr().context("read bound address")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = AppState::new(&options, shutdown_rx.clone());
    let event_tx = state.event_tx.clone();
    let watcher = sse::start_file_watcher(state.clone(), options.poll_interval);
    let app = routes::router(state);

    let mut graceful = shutdown_rx;
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = graceful.wait_for(|stopping| *stopping).await;
            })
            .await
    });

    info!(addr = %local_addr, "dev server listening");
    Ok(DevServerHandle {
        local_addr,
        event_tx,
        shutdown_tx,
        server: Some(server),
        watcher,
    })
}

impl DevServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Subscribe to live-reload change events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.event_tx.subscribe()
    }

    /// Resolves if the server stops without being asked to. Cancel-safe.
    pub async fn wait(&mut self) -> Result<()> {
        let Some(server) = self.server.as_mut() else {
            return std::future::pending().await;
        };
        let joined = server.await;
        self.server = None;
        match joined {
            Ok(Ok(())) => Err(anyhow!("dev server stopped unexpectedly")),
            Ok(Err(err)) => Err(err).context("dev server failed"),
            Err(err) => Err(err).context("dev server task panicked"),
        }
    }

    /// Stop serving, close open event streams and release the listening socket.
    pub async fn stop(mut self) -> Result<()> {
        self.watcher.abort();
        let _ = self.shutdown_tx.send(true);
        let Some(mut server) = self.server.take() else {
            debug!("dev server already stopped");
            return Ok(());
        };
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
            Ok(joined) => {
                joined.context("dev server task panicked")??;
                info!(addr = %self.local_addr, "dev server stopped");
            }
            Err(_) => {
                warn!("dev server did not drain in time, aborting");
                server.abort();
            }
        }
        Ok(())
    }
}

impl Drop for DevServerHandle {
    fn drop(&mut self) {
        self.watcher.abort();
        if let Some(server) = &self.server {
            server.abort();
        }
    }
}
