//! Authentication policy compiler.
//!
//! # Data Flow
//! ```text
//! authentication.providers[]
//!     → provider.rs (key-set source, fetch policy, audiences, locations)
//! authentication.rules[]
//!     → requirement.rs (selector → OR-set of requirements)
//! compiled providers
//!     → prefetch.rs (plan; spawned after publish, never blocks compile)
//! ```
//!
//! # Design Decisions
//! - The compiler never validates tokens; `CompiledAuthPolicy::evaluate`
//!   models what the data plane does with the compiled requirement set
//! - Key-set problems are deferred to request time

pub mod prefetch;
pub mod provider;
pub mod requirement;

pub use prefetch::{prefetch_plan, spawn_prefetch, FetchError, JwksFetcher, PrefetchTarget};
pub use provider::{compile_providers, JwksSource, JwtLocations, JwtProvider};
pub use requirement::{
    compile_auth_rules, AuthDecision, AuthDenial, AuthRequirement, CompiledAuthPolicy,
    PresentedToken,
};
