//! OS signal handling.
//!
//! # Responsibilities
//! - Listen for SIGTERM, SIGINT and SIGHUP
//! - Translate them into shutdown or reload events
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP reloads inputs instead of shutting down
//! - Non-unix targets only see ctrl-c

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    Shutdown,
    Reload,
}

/// Wait for the next signal of interest.
#[cfg(unix)]
pub async fn wait_for_signal() -> std::io::Result<SignalEvent> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    let event = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            SignalEvent::Shutdown
        }
        _ = terminate.recv() => SignalEvent::Shutdown,
        _ = hangup.recv() => SignalEvent::Reload,
    };
    tracing::info!(?event, "signal received");
    Ok(event)
}

#[cfg(not(unix))]
pub async fn wait_for_signal() -> std::io::Result<SignalEvent> {
    tokio::signal::ctrl_c().await?;
    tracing::info!(event = ?SignalEvent::Shutdown, "signal received");
    Ok(SignalEvent::Shutdown)
}
