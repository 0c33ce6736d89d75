//! Declarative API description consumed by the compiler.
//!
//! # Data Flow
//! ```text
//! service description file (JSON/YAML/TOML)
//!     → config::loader (deserialize)
//!     → ServiceDescription (immutable for one generation)
//!     → compiler::compile (reads only; overrides work on a clone)
//! ```
//!
//! # Design Decisions
//! - Field names follow the camelCase wire form of API descriptions
//! - Every section is optional and defaults to empty
//! - Rules refer to methods by selector string (`api.Method`)

pub mod descriptor;

pub use descriptor::{
    Api, ApiMethod, AuthProvider, AuthRequirementRule, Authentication, AuthenticationRule,
    BackendRule, BackendRules, Control, CustomPattern, Endpoint, FieldDescriptor, HttpRule,
    HttpRules, JwtLocationRule, MetricRule, PathTranslation, Quota, ServiceDescription,
    SystemParameter, SystemParameterRule, SystemParameters, TypeDescriptor, UsageRule,
    UsageRules,
};
