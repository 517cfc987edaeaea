//! Shared application state for the dev server.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use crate::DevServerOptions;

/// Events broadcast to live-reload clients when files change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A source file changed and no watch compiler owns the rebuild.
    SourceChanged,
    /// A static asset under the public directory changed.
    StaticChanged,
    /// The watch compiler wrote new output.
    OutputChanged,
}

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// HTML entry served for `/` with the reload client injected.
    pub index_html: PathBuf,
    pub public_dir: PathBuf,
    pub src_dir: PathBuf,
    /// Output directory of the watch compiler, if one runs.
    pub output_dir: Option<PathBuf>,
    /// Replacement for `%PUBLIC_URL%` (public path without trailing slash).
    pub public_url: String,
    /// Broadcast sender for file change events.
    pub event_tx: Arc<broadcast::Sender<ChangeEvent>>,
    /// Flips to `true` when the server is stopping; ends open event streams.
    pub shutdown_rx: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(options: &DevServerOptions, shutdown_rx: watch::Receiver<bool>) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            index_html: options.index_html.clone(),
            public_dir: options.public_dir.clone(),
            src_dir: options.src_dir.clone(),
            output_dir: options.output_dir.clone(),
            public_url: options.public_path.trim_end_matches('/').to_string(),
            event_tx: Arc::new(event_tx),
            shutdown_rx,
        }
    }

    /// Directories the file watcher should observe, in priority order.
    pub fn watched_dirs(&self) -> Vec<&Path> {
        let mut dirs = vec![self.public_dir.as_path(), self.src_dir.as_path()];
        if let Some(out) = &self.output_dir {
            dirs.push(out.as_path());
        }
        dirs
    }

    /// Classify a changed path. `None` means the change triggers nothing.
    pub fn classify(&self, path: &Path) -> Option<ChangeEvent> {
        if let Some(out) = &self.output_dir
            && path.starts_with(out)
        {
            return Some(ChangeEvent::OutputChanged);
        }
        if path.starts_with(&self.src_dir) {
            // A watch compiler rebuilds from src; reload once its output lands.
            return match self.output_dir {
                Some(_) => None,
                None => Some(ChangeEvent::SourceChanged),
            };
        }
        if path.starts_with(&self.public_dir) {
            return Some(ChangeEvent::StaticChanged);
        }
        None
    }
}
