//! Path template matching.
//!
//! # Data Flow
//! ```text
//! Compile time:
//!     HTTP binding path string
//!     → template.rs (parse into segments, variables, custom verb)
//!     → matcher.rs (insert into segment trie, reject duplicates)
//!     → PathMatcher (immutable) + match sequence for the route table
//!
//! Verification / data plane model:
//!     (method, path?query)
//!     → matcher.rs (most specific route + variable bindings)
//!     → bindings.rs (field paths → JSON names → query parameters)
//! ```
//!
//! # Design Decisions
//! - Specificity is structural (literal > `*` > `**`), never regex order
//! - Deterministic: same registrations always produce the same sequence
//! - Equal specificity only arises for identical templates, which is an error

pub mod bindings;
pub mod matcher;
pub mod template;

pub use bindings::{bindings_to_query_params, merge_query, JsonNameMap, VariableBinding};
pub use matcher::{MatcherError, PathMatch, PathMatcher, PathMatcherBuilder, RouteId};
pub use template::{Segment, TemplateError, UriTemplate, Variable};
