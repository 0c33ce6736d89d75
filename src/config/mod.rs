//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! options file (TOML)                 service description (JSON/YAML/TOML)
//!     → loader.rs (parse)                 → loader.rs (parse by extension)
//!     → validation.rs (semantic checks)
//!     → CompilerOptions + ServiceDescription
//!     → compiler::compile
//!
//! Watch mode:
//!     watcher.rs detects change
//!     → loader.rs reloads both inputs
//!     → publisher recompiles and swaps the snapshot
//! ```
//!
//! # Design Decisions
//! - All option fields have defaults so an empty file is valid
//! - Validation reports every problem, not just the first
//! - Syntactic errors (serde) and semantic errors (validation) stay separate

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_inputs, load_options, load_service, CompileInputs, ConfigError, ServiceFormat};
pub use schema::{
    AuthOptions, BackendOptions, CompilerOptions, CorsOptions, DnsLookupFamily, ListenerOptions,
    ObservabilityOptions, ServiceControlOptions, ServiceOverrides,
};
pub use validation::{validate_options, ValidationError};
pub use watcher::ConfigWatcher;
