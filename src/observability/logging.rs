//! Structured logging.
//!
//! # Responsibilities
//! - Install the global tracing subscriber
//! - Choose text or JSON output from options
//!
//! # Design Decisions
//! - JSON for production, human-readable text for development
//! - Installing twice is not an error (tests and re-entry from `main`)

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::schema::ObservabilityOptions;

/// Initialise logging; returns `false` when a subscriber was already set.
pub fn init_logging(opts: &ObservabilityOptions) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&opts.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if opts.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
            .is_ok()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
            .is_ok()
    };

    if installed {
        tracing::debug!(level = %opts.log_level, json = opts.log_json, "logging initialised");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        let opts = ObservabilityOptions::default();
        init_logging(&opts);
        assert!(!init_logging(&opts));
    }
}
