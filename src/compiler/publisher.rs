//! Snapshot publication.
//!
//! # Responsibilities
//! - Compile a new description and swap it in atomically
//! - Keep the last-known-good snapshot when a compile fails
//! - Start JWKS prefetch for newly published snapshots
//!
//! # Design Decisions
//! - Readers never block: `current()` is a lock-free load
//! - A snapshot whose output equals the live one is not republished,
//!   whatever its config id
//! - The previous snapshot is retained for one-step rollback
//! - Prefetch tasks share the publisher's `Shutdown`; none start after it fires

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::task::JoinHandle;

use super::{compile, CompileErrors, CompileWarning};
use crate::assembler::ConfigSnapshot;
use crate::auth::{spawn_prefetch, JwksFetcher};
use crate::config::CompilerOptions;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::service::ServiceDescription;

#[derive(Debug)]
pub enum PublishOutcome {
    Published {
        snapshot: Arc<ConfigSnapshot>,
        warnings: Vec<CompileWarning>,
        /// Background key-set fetches; dropping them does not cancel.
        prefetch: Vec<JoinHandle<()>>,
    },
    /// Same output as the live snapshot.
    Unchanged,
}

#[derive(Default)]
pub struct ConfigPublisher {
    current: ArcSwapOption<ConfigSnapshot>,
    previous: ArcSwapOption<ConfigSnapshot>,
    fetcher: Option<Arc<dyn JwksFetcher>>,
    shutdown: Shutdown,
}

impl ConfigPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fetcher(fetcher: Arc<dyn JwksFetcher>) -> Self {
        Self { fetcher: Some(fetcher), ..Self::default() }
    }

    /// Tie background work to an externally owned shutdown signal.
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn current(&self) -> Option<Arc<ConfigSnapshot>> {
        self.current.load_full()
    }

    pub fn previous(&self) -> Option<Arc<ConfigSnapshot>> {
        self.previous.load_full()
    }

    /// Compile and publish. On error the live snapshot is untouched.
    pub fn publish(
        &self,
        desc: &ServiceDescription,
        opts: &CompilerOptions,
    ) -> Result<PublishOutcome, CompileErrors> {
        let compiled = match compile(desc, opts) {
            Ok(compiled) => compiled,
            Err(errors) => {
                metrics::record_publish("rejected");
                tracing::warn!(
                    errors = errors.errors.len(),
                    live_config = %self.current().map(|s| s.config_id.clone()).unwrap_or_default(),
                    "keeping last-known-good config"
                );
                return Err(errors);
            }
        };

        if let Some(live) = self.current() {
            if live.same_content(&compiled.snapshot) {
                metrics::record_publish("unchanged");
                tracing::debug!(config_id = %live.config_id, "config unchanged; not republished");
                return Ok(PublishOutcome::Unchanged);
            }
        }

        let snapshot = compiled.snapshot;
        let replaced = self.current.swap(Some(snapshot.clone()));
        if replaced.is_some() {
            self.previous.store(replaced);
        }
        metrics::record_publish("published");
        metrics::record_operations(snapshot.operations.len());
        tracing::info!(
            service = %snapshot.service_name,
            config_id = %snapshot.config_id,
            rollout_id = %snapshot.rollout_id,
            "config published"
        );

        let prefetch = self.start_prefetch(&snapshot);
        Ok(PublishOutcome::Published {
            snapshot,
            warnings: compiled.warnings,
            prefetch,
        })
    }

    /// Restore the previous snapshot, if any.
    pub fn rollback(&self) -> Option<Arc<ConfigSnapshot>> {
        let previous = self.previous.swap(None)?;
        self.current.store(Some(previous.clone()));
        tracing::warn!(config_id = %previous.config_id, "rolled back to previous config");
        Some(previous)
    }

    fn start_prefetch(&self, snapshot: &ConfigSnapshot) -> Vec<JoinHandle<()>> {
        let Some(fetcher) = &self.fetcher else {
            return Vec::new();
        };
        if snapshot.jwks_prefetch.is_empty() || self.shutdown.is_triggered() {
            return Vec::new();
        }
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::debug!("no async runtime; JWKS prefetch skipped");
            return Vec::new();
        }
        spawn_prefetch(snapshot.jwks_prefetch.clone(), fetcher.clone(), self.shutdown.clone())
    }
}
