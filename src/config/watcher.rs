//! Hot reload of the node list.
//!
//! Every modification of the configuration file is re-parsed and
//! re-validated. Valid configurations are sent to the reload task, which
//! reconciles the registry; invalid ones are logged and dropped so the
//! running node list stays in place.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ProxyConfig;

pub struct ConfigWatcher {
    path: PathBuf,
    updates: mpsc::UnboundedSender<ProxyConfig>,
}

impl ConfigWatcher {
    /// Watcher for `path` and the receiving end of its validated reloads.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ProxyConfig>) {
        let (updates, rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            updates,
        };
        (watcher, rx)
    }

    /// Start watching. Dropping the returned handle stops the watch.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self { path, updates } = self;
        let reload_path = path.clone();

        let handler = move |event: notify::Result<Event>| match event {
            Ok(event) if is_content_change(&event.kind) => {
                match load_config(&reload_path) {
                    Ok(config) => {
                        tracing::info!(path = %reload_path.display(), nodes = config.nodes.len(), "Configuration reloaded");
                        let _ = updates.send(config);
                    }
                    Err(e) => tracing::error!(error = %e, "Reload rejected, keeping current node list"),
                }
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Configuration watch error"),
        };

        let mut watcher = RecommendedWatcher::new(handler, Config::default().with_poll_interval(Duration::from_secs(2)))?;
        watcher.watch(&path, RecursiveMode::NonRecursive)?;
        tracing::info!(path = %path.display(), "Watching configuration file");
        Ok(watcher)
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Modify(_) | EventKind::Create(_))
}
