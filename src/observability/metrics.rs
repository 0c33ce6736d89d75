//! Compile metrics.
//!
//! # Metrics
//! - `config_compiles_total` (counter): compiles by outcome
//! - `config_compile_duration_seconds` (histogram): wall time per compile
//! - `config_compile_warnings_total` (counter): warnings emitted
//! - `config_operations` (gauge): operations in the published snapshot
//! - `config_publishes_total` (counter): publish attempts by result
//!
//! # Design Decisions
//! - Labels are bounded enums, never selectors or paths

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape listener. Must run inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "failed to install metrics exporter"),
    }
}

pub fn record_compile(outcome: &'static str, started: Instant, warnings: usize) {
    metrics::counter!("config_compiles_total", "outcome" => outcome).increment(1);
    metrics::histogram!("config_compile_duration_seconds").record(started.elapsed().as_secs_f64());
    metrics::counter!("config_compile_warnings_total").increment(warnings as u64);
}

pub fn record_operations(count: usize) {
    metrics::gauge!("config_operations").set(count as f64);
}

pub fn record_publish(result: &'static str) {
    metrics::counter!("config_publishes_total", "result" => result).increment(1);
}
