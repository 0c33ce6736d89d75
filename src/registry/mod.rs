//! Method registry.
//!
//! # Data Flow
//! ```text
//! ServiceDescription.apis[].methods   → one RegisteredMethod per selector
//! ServiceDescription.http.rules[]     → parsed bindings attached to methods
//! gRPC local backend                  → implicit POST /<api>/<method> bindings
//! endpoints[].allowCors               → synthetic OPTIONS methods (CORS_<n>)
//!     → MethodRegistry (selector-ordered, immutable)
//! ```
//!
//! # Design Decisions
//! - Selector-ordered map so every downstream stage iterates deterministically
//! - Bindings keep declaration order; the matcher decides precedence
//! - Problems are reported into `Diagnostics`, never returned early

pub mod method;

pub use method::{BindingKind, MethodRegistry, RegisteredMethod, ResolvedBinding};
