//! Compiler options schema.
//!
//! This module defines the process-level options that shape compiled
//! output independently of any one service description. All types derive
//! Serde traits for deserialization from TOML.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::{DEFAULT_RESPONSE_DEADLINE, DEFAULT_STREAM_IDLE_TIMEOUT};

/// Root options for the configuration compiler.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct CompilerOptions {
    /// Data-plane listener the compiled config is generated for.
    pub listener: ListenerOptions,

    /// Co-located backend and cluster defaults.
    pub backend: BackendOptions,

    /// JWT authentication defaults.
    pub auth: AuthOptions,

    /// Service-control calling policy.
    pub service_control: ServiceControlOptions,

    /// CORS filter settings.
    pub cors: CorsOptions,

    /// Overrides applied to the service description before compiling.
    pub service: ServiceOverrides,

    /// Logging and metrics.
    pub observability: ObservabilityOptions,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerOptions {
    pub address: String,
    pub port: u16,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// DNS resolution mode for remote clusters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DnsLookupFamily {
    #[default]
    Auto,
    V4Only,
    V6Only,
    V4Preferred,
    All,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BackendOptions {
    /// Address of the co-located backend; its scheme selects the protocol.
    pub local_address: String,

    pub connect_timeout_ms: u64,

    /// Circuit-breaker limit per cluster. Zero leaves the data-plane default.
    pub max_requests: u32,

    pub dns_lookup_family: DnsLookupFamily,

    /// Response deadline when no backend rule sets one.
    pub default_deadline_ms: u64,

    /// Global stream idle timeout.
    pub stream_idle_timeout_ms: u64,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            local_address: "http://127.0.0.1:8082".to_string(),
            connect_timeout_ms: 20_000,
            max_requests: 0,
            dns_lookup_family: DnsLookupFamily::Auto,
            default_deadline_ms: DEFAULT_RESPONSE_DEADLINE.as_millis() as u64,
            stream_idle_timeout_ms: DEFAULT_STREAM_IDLE_TIMEOUT.as_millis() as u64,
        }
    }
}

impl BackendOptions {
    pub fn default_deadline(&self) -> Duration {
        Duration::from_millis(self.default_deadline_ms)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_idle_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AuthOptions {
    pub jwks_cache_duration_secs: u64,

    /// Fetch key sets on demand instead of ahead of the first request.
    pub disable_jwks_async_fetch: bool,

    pub jwks_fetch_timeout_ms: u64,
    pub jwks_fetch_retries: u32,
    pub jwks_fetch_retry_backoff_ms: u64,

    /// Skip the service-name audience default for providers without audiences.
    pub disable_jwt_audience_service_name_check: bool,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            jwks_cache_duration_secs: 300,
            disable_jwks_async_fetch: false,
            jwks_fetch_timeout_ms: 5_000,
            jwks_fetch_retries: 0,
            jwks_fetch_retry_backoff_ms: 1_000,
            disable_jwt_audience_service_name_check: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServiceControlOptions {
    /// Omit the service-control filter entirely.
    pub skip: bool,

    /// Replaces `control.environment` from the description.
    pub url_override: Option<String>,

    /// Treat an unreachable service-control server as an implicit allow.
    pub network_fail_open: bool,

    pub check_retries: u32,
    pub check_timeout_ms: u64,
    pub quota_retries: u32,
    pub quota_timeout_ms: u64,
    pub report_retries: u32,
    pub report_timeout_ms: u64,
}

impl Default for ServiceControlOptions {
    fn default() -> Self {
        Self {
            skip: false,
            url_override: None,
            network_fail_open: false,
            check_retries: 3,
            check_timeout_ms: 1_000,
            quota_retries: 1,
            quota_timeout_ms: 1_000,
            report_retries: 5,
            report_timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CorsOptions {
    pub enabled: bool,
    pub allow_origin: String,
    pub allow_methods: String,
    pub allow_headers: String,
    pub expose_headers: String,
    pub allow_credentials: bool,
    pub max_age_secs: u64,
}

impl Default for CorsOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            allow_origin: "*".to_string(),
            allow_methods: "GET, POST, PUT, PATCH, DELETE, OPTIONS".to_string(),
            allow_headers: "DNT,User-Agent,X-Requested-With,If-Modified-Since,Cache-Control,Content-Type,Range,Authorization".to_string(),
            expose_headers: "Content-Length,Content-Range".to_string(),
            allow_credentials: false,
            max_age_secs: 1_728_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServiceOverrides {
    pub name: Option<String>,
    pub rollout_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityOptions {
    /// Default filter directive when `RUST_LOG` is unset.
    pub log_level: String,
    pub log_json: bool,
    pub metrics_enabled: bool,
    pub metrics_address: String,
}

impl Default for ObservabilityOptions {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_json: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
