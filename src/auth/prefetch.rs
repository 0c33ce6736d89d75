//! Asynchronous key-set prefetch.
//!
//! # Responsibilities
//! - Derive the prefetch plan from compiled providers
//! - Run fire-and-forget fetches through a pluggable fetcher
//!
//! # Design Decisions
//! - Transport is not implemented here; callers supply a `JwksFetcher`
//! - A failed prefetch only logs; request-time fetch remains the fallback
//! - Retries use exponential backoff bounded by the provider policy
//! - Outstanding fetches stop when shutdown is triggered

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;

use super::provider::JwtProvider;
use crate::lifecycle::Shutdown;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrefetchTarget {
    pub provider_id: String,
    pub uri: String,
    pub discovery: bool,
    pub timeout_ms: u64,
    pub retries: u32,
    pub retry_backoff_ms: u64,
}

/// Providers whose key sets should be fetched ahead of the first request.
pub fn prefetch_plan(providers: &BTreeMap<String, JwtProvider>) -> Vec<PrefetchTarget> {
    providers
        .values()
        .filter(|p| p.fetch.async_fetch && p.jwks.cluster.is_some())
        .map(|p| PrefetchTarget {
            provider_id: p.id.clone(),
            uri: p.jwks.uri.clone(),
            discovery: p.jwks.discovery,
            timeout_ms: p.fetch.timeout_ms,
            retries: p.fetch.retries,
            retry_backoff_ms: p.fetch.retry_backoff_ms,
        })
        .collect()
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("key set endpoint unavailable: {0}")]
    Unavailable(String),

    #[error("invalid key set: {0}")]
    Invalid(String),

    #[error("fetch timed out after {0}ms")]
    Timeout(u64),
}

/// Transport for key-set retrieval.
#[async_trait]
pub trait JwksFetcher: Send + Sync {
    async fn fetch(&self, target: &PrefetchTarget) -> Result<(), FetchError>;
}

/// Spawn one background fetch per target. Never fails the caller.
pub fn spawn_prefetch(
    plan: Vec<PrefetchTarget>,
    fetcher: Arc<dyn JwksFetcher>,
    shutdown: Shutdown,
) -> Vec<JoinHandle<()>> {
    plan.into_iter()
        .map(|target| {
            let fetcher = fetcher.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let result = tokio::select! {
                    result = fetch_with_retries(fetcher.as_ref(), &target) => result,
                    _ = shutdown.wait() => {
                        tracing::debug!(provider = %target.provider_id, "JWKS prefetch cancelled by shutdown");
                        return;
                    }
                };
                match result {
                    Ok(()) => tracing::info!(provider = %target.provider_id, uri = %target.uri, "JWKS prefetched"),
                    Err(e) => tracing::warn!(
                        provider = %target.provider_id,
                        uri = %target.uri,
                        error = %e,
                        "JWKS prefetch failed; keys will be fetched on demand"
                    ),
                }
            })
        })
        .collect()
}

async fn fetch_with_retries(fetcher: &dyn JwksFetcher, target: &PrefetchTarget) -> Result<(), FetchError> {
    let mut attempt = 0;
    loop {
        let timeout = Duration::from_millis(target.timeout_ms);
        let result = match tokio::time::timeout(timeout, fetcher.fetch(target)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(target.timeout_ms)),
        };
        match result {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= target.retries => return Err(e),
            Err(e) => {
                let backoff = target.retry_backoff_ms.saturating_mul(1 << attempt.min(10));
                tracing::debug!(provider = %target.provider_id, attempt, error = %e, backoff_ms = backoff, "retrying JWKS fetch");
                tokio::time::sleep(Duration::from_millis(backoff)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyFetcher {
        calls: AtomicU32,
        succeed_after: u32,
    }

    #[async_trait]
    impl JwksFetcher for FlakyFetcher {
        async fn fetch(&self, _target: &PrefetchTarget) -> Result<(), FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n >= self.succeed_after {
                Ok(())
            } else {
                Err(FetchError::Unavailable("connection refused".into()))
            }
        }
    }

    fn target(retries: u32) -> PrefetchTarget {
        PrefetchTarget {
            provider_id: "p".into(),
            uri: "https://issuer.example.com/jwks".into(),
            discovery: false,
            timeout_ms: 1_000,
            retries,
            retry_backoff_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let fetcher = FlakyFetcher { calls: AtomicU32::new(0), succeed_after: 2 };
        assert!(fetch_with_retries(&fetcher, &target(3)).await.is_ok());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_retries() {
        let fetcher = FlakyFetcher { calls: AtomicU32::new(0), succeed_after: u32::MAX };
        let err = fetch_with_retries(&fetcher, &target(1)).await.unwrap_err();
        assert!(matches!(err, FetchError::Unavailable(_)));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_spawned_failure_does_not_panic() {
        let fetcher: Arc<dyn JwksFetcher> =
            Arc::new(FlakyFetcher { calls: AtomicU32::new(0), succeed_after: u32::MAX });
        for handle in spawn_prefetch(vec![target(0), target(0)], fetcher, Shutdown::new()) {
            handle.await.unwrap();
        }
    }

    struct HangingFetcher;

    #[async_trait]
    impl JwksFetcher for HangingFetcher {
        async fn fetch(&self, _target: &PrefetchTarget) -> Result<(), FetchError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_shutdown_stops_outstanding_fetches() {
        let shutdown = Shutdown::new();
        let mut slow = target(5);
        slow.timeout_ms = 60_000;
        let handles = spawn_prefetch(vec![slow], Arc::new(HangingFetcher), shutdown.clone());

        tokio::task::yield_now().await;
        shutdown.trigger();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .expect("prefetch stopped after shutdown")
                .unwrap();
        }
    }
}
