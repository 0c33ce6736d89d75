//! Backend routing compiler.
//!
//! # Data Flow
//! ```text
//! backend.rules[] (selector → address, translation, deadline, audience)
//!     → address.rs (scheme/host/port/path)
//!     → translation.rs (path rewrite per route)
//!     → deadline.rs (response + idle timeouts)
//!     → policy.rs (BackendRoutePolicy per selector)
//!     → assembler (clusters, route entries)
//! ```
//!
//! # Design Decisions
//! - Methods without a rule go to the co-located backend unchanged
//! - An unparsable address is fatal for the whole compile
//! - A missing `jwtAudience` means no backend authentication at all

pub mod address;
pub mod deadline;
pub mod policy;
pub mod translation;

pub use address::{AddressError, BackendAddress, BackendScheme};
pub use deadline::{ResponseTimeout, RouteTimeouts, DEFAULT_RESPONSE_DEADLINE, DEFAULT_STREAM_IDLE_TIMEOUT};
pub use policy::{compile_backend_policies, local_backend, BackendAuth, BackendRoutePolicy};
pub use translation::{PathRewrite, PathTranslation, RewriteError};
