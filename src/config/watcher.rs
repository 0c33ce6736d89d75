//! Input file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::{load_inputs, CompileInputs};

/// Watches the service description and options files and reloads both
/// whenever either changes.
pub struct ConfigWatcher {
    service_path: PathBuf,
    options_path: Option<PathBuf>,
    update_tx: mpsc::UnboundedSender<CompileInputs>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for reloaded inputs.
    pub fn new(service_path: &Path, options_path: Option<&Path>) -> (Self, mpsc::UnboundedReceiver<CompileInputs>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                service_path: service_path.to_path_buf(),
                options_path: options_path.map(Path::to_path_buf),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let service_path = self.service_path.clone();
        let options_path = self.options_path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    tracing::info!(paths = ?event.paths, "input change detected, reloading");
                    match load_inputs(&service_path, options_path.as_deref()) {
                        Ok(inputs) => {
                            if tx.send(inputs).is_err() {
                                tracing::debug!("reload receiver dropped");
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "failed to reload inputs; keeping current config");
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.service_path, RecursiveMode::NonRecursive)?;
        if let Some(options) = &self.options_path {
            watcher.watch(options, RecursiveMode::NonRecursive)?;
        }

        tracing::info!(
            service = ?self.service_path,
            options = ?self.options_path,
            "input watcher started"
        );
        Ok(watcher)
    }
}
