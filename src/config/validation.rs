//! Option validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Check that addresses and filter directives parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Pure function: CompilerOptions → Result<(), Vec<ValidationError>>
//! - Runs before options are handed to the compiler

use std::net::SocketAddr;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::backend::BackendAddress;
use crate::config::schema::CompilerOptions;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

pub fn validate_options(opts: &CompilerOptions) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if opts.listener.port == 0 {
        errors.push(ValidationError::new("listener.port", "must be non-zero"));
    }
    if opts.listener.address.is_empty() {
        errors.push(ValidationError::new("listener.address", "must not be empty"));
    }

    if let Err(e) = BackendAddress::parse(&opts.backend.local_address) {
        errors.push(ValidationError::new("backend.local_address", e.to_string()));
    }
    let positive = [
        ("backend.connect_timeout_ms", opts.backend.connect_timeout_ms),
        ("backend.default_deadline_ms", opts.backend.default_deadline_ms),
        ("backend.stream_idle_timeout_ms", opts.backend.stream_idle_timeout_ms),
        ("auth.jwks_fetch_timeout_ms", opts.auth.jwks_fetch_timeout_ms),
        ("service_control.check_timeout_ms", opts.service_control.check_timeout_ms),
        ("service_control.quota_timeout_ms", opts.service_control.quota_timeout_ms),
        ("service_control.report_timeout_ms", opts.service_control.report_timeout_ms),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    }

    if opts
        .service_control
        .url_override
        .as_ref()
        .is_some_and(|url| url.trim().is_empty())
    {
        errors.push(ValidationError::new("service_control.url_override", "must not be empty when set"));
    }

    if opts.cors.enabled && opts.cors.allow_origin.is_empty() {
        errors.push(ValidationError::new("cors.allow_origin", "required when CORS is enabled"));
    }

    if let Err(e) = EnvFilter::try_new(&opts.observability.log_level) {
        errors.push(ValidationError::new("observability.log_level", e.to_string()));
    }
    if opts.observability.metrics_enabled && opts.observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("`{}` is not a socket address", opts.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
