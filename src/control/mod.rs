//! Service-control policy compiler.
//!
//! # Data Flow
//! ```text
//! usage.rules[]            → skip / allow-unregistered flags
//! quota.metricRules[]      → quota.rs (selector → metric costs)
//! systemParameters.rules[] → API-key locations
//! options.service_control  → calling.rs (retries, timeouts, fail-open)
//!     → policy.rs (ServiceControlConfig with one policy per operation)
//! ```
//!
//! # Design Decisions
//! - Disabled entirely when the service has no control environment
//! - Skipped operations keep a policy entry but lose the filter stage
//! - Network failures fail closed unless configured otherwise

pub mod calling;
pub mod credential;
pub mod policy;
pub mod quota;

pub use calling::{CallPolicy, CallingConfig, CheckFailurePolicy};
pub use credential::{CredentialId, JwtIdentity};
pub use policy::{
    compile_service_control, ApiKeyLocation, ApiKeyState, ConsumerRejection, ServiceControlConfig,
    ServiceControlPolicy, SERVICE_CONTROL_CLUSTER,
};
pub use quota::{cost_of, MetricCosts};
