//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Compile stages, publisher, watcher:
//!     → logging.rs (structured tracing events, text or JSON)
//!     → metrics.rs (compile counters and durations)
//!
//! Consumers:
//!     → stdout (log aggregation)
//!     → Prometheus scrape endpoint (watch mode only)
//! ```
//!
//! # Design Decisions
//! - `RUST_LOG` always overrides the configured level
//! - Metric updates are no-ops until a recorder is installed, so library
//!   users and tests pay nothing

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;
