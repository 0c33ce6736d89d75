//! Lifecycle management for watch mode.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!     SIGHUP         → forced reload of the inputs
//!
//! Shutdown (shutdown.rs):
//!     trigger → watcher loop exits → last snapshot flushed → exit
//! ```
//!
//! # Design Decisions
//! - One broadcast channel; every long-running task subscribes
//! - Triggering twice is harmless

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::{wait_for_signal, SignalEvent};
