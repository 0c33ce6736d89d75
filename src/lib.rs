//! API proxy configuration compiler.
//!
//! Turns a declarative API service description into the data-plane
//! configuration of an API gateway proxy: route table, filter chains,
//! upstream clusters and per-operation policies.

pub mod assembler;
pub mod auth;
pub mod backend;
pub mod compiler;
pub mod config;
pub mod control;
pub mod lifecycle;
pub mod observability;
pub mod registry;
pub mod routing;
pub mod service;

pub use assembler::ConfigSnapshot;
pub use compiler::{compile, Compilation, ConfigPublisher};
pub use config::CompilerOptions;
pub use service::ServiceDescription;
