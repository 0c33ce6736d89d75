//! Compile pipeline.
//!
//! # Data Flow
//! ```text
//! ServiceDescription + CompilerOptions
//!     → overrides (service name, rollout id)
//!     → registry (methods + bindings)
//!     → auth / backend / control (policies per selector)
//!     → assembler::routes (matcher; duplicate routes)
//!     → Diagnostics: any error → CompileErrors, stop
//!     → assembler::assemble → Compilation { snapshot, warnings }
//!     → publisher.rs (atomic swap, JWKS prefetch)
//! ```
//!
//! # Design Decisions
//! - One pass collects every error; nothing is assembled from a
//!   description with errors
//! - Compilation is pure and synchronous; the publisher owns side effects

pub mod diagnostics;
pub mod publisher;

pub use diagnostics::{CompileError, CompileErrors, CompileWarning, Diagnostics};
pub use publisher::{ConfigPublisher, PublishOutcome};

use std::sync::Arc;
use std::time::Instant;

use crate::assembler::{self, build_route_index, AssemblyInput, ClusterTable, ConfigSnapshot};
use crate::auth::{compile_auth_rules, compile_providers};
use crate::backend::compile_backend_policies;
use crate::config::CompilerOptions;
use crate::control::compile_service_control;
use crate::observability::metrics;
use crate::registry::MethodRegistry;
use crate::service::ServiceDescription;

/// A successful compile.
#[derive(Debug, Clone)]
pub struct Compilation {
    pub snapshot: Arc<ConfigSnapshot>,
    pub warnings: Vec<CompileWarning>,
}

pub fn compile(desc: &ServiceDescription, opts: &CompilerOptions) -> Result<Compilation, CompileErrors> {
    let started = Instant::now();
    let result = run(desc, opts);
    match &result {
        Ok(compiled) => {
            metrics::record_compile("success", started, compiled.warnings.len());
            tracing::info!(
                service = %compiled.snapshot.service_name,
                config_id = %compiled.snapshot.config_id,
                warnings = compiled.warnings.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "service config compiled"
            );
        }
        Err(failed) => {
            metrics::record_compile("error", started, failed.warnings.len());
            tracing::error!(
                service = %desc.name,
                errors = failed.errors.len(),
                first_error = %failed.errors.first().map(ToString::to_string).unwrap_or_default(),
                "service config rejected"
            );
        }
    }
    result
}

fn run(desc: &ServiceDescription, opts: &CompilerOptions) -> Result<Compilation, CompileErrors> {
    let desc = apply_overrides(desc, opts);
    if desc.name.is_empty() {
        return Err(CompileErrors {
            errors: vec![CompileError::MissingServiceName],
            warnings: Vec::new(),
        });
    }

    let mut diags = Diagnostics::new();
    let registry = MethodRegistry::build(&desc, opts, &mut diags);
    let providers = compile_providers(&desc, opts, &mut diags);
    let auth_rules = compile_auth_rules(&desc, &registry, &providers, &mut diags);
    let backends = compile_backend_policies(&desc, &registry, opts, &mut diags);
    let service_control = compile_service_control(&desc, &registry, opts, &mut diags);

    let mut clusters = ClusterTable::new(&opts.backend);
    let routes = build_route_index(&desc.name, &registry, &backends, &mut clusters, &mut diags);

    let warnings = diags.finish()?;
    let snapshot = assembler::assemble(AssemblyInput {
        desc: &desc,
        opts,
        registry: &registry,
        providers,
        auth_rules,
        backends,
        service_control,
        routes,
        clusters,
    });
    Ok(Compilation { snapshot: Arc::new(snapshot), warnings })
}

fn apply_overrides(desc: &ServiceDescription, opts: &CompilerOptions) -> ServiceDescription {
    let mut desc = desc.clone();
    if let Some(name) = opts.service.name.as_ref().filter(|n| !n.is_empty()) {
        desc.name = name.clone();
    }
    if let Some(rollout) = &opts.service.rollout_id {
        desc.rollout_id = rollout.clone();
    }
    desc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{Api, ApiMethod, HttpRule};

    fn description() -> ServiceDescription {
        let mut desc = ServiceDescription {
            name: "echo.example.com".into(),
            id: "2026-10-01r0".into(),
            ..Default::default()
        };
        desc.apis.push(Api {
            name: "Echo".into(),
            methods: vec![ApiMethod { name: "Echo".into(), ..Default::default() }],
            ..Default::default()
        });
        desc.http.rules.push(HttpRule {
            selector: "Echo.Echo".into(),
            post: Some("/echo".into()),
            body: "*".into(),
            ..Default::default()
        });
        desc
    }

    #[test]
    fn test_compile_minimal_service() {
        let compiled = compile(&description(), &CompilerOptions::default()).unwrap();
        assert!(compiled.warnings.is_empty());
        assert_eq!(compiled.snapshot.routes.len(), 1);
        assert_eq!(compiled.snapshot.config_id, "2026-10-01r0");
    }

    #[test]
    fn test_missing_name_is_rejected() {
        let mut desc = description();
        desc.name.clear();
        let err = compile(&desc, &CompilerOptions::default()).unwrap_err();
        assert_eq!(err.errors, vec![CompileError::MissingServiceName]);
    }

    #[test]
    fn test_overrides_apply_before_compile() {
        let mut desc = description();
        desc.name.clear();
        let mut opts = CompilerOptions::default();
        opts.service.name = Some("override.example.com".into());
        opts.service.rollout_id = Some("rollout-7".into());

        let compiled = compile(&desc, &opts).unwrap();
        assert_eq!(compiled.snapshot.service_name, "override.example.com");
        assert_eq!(compiled.snapshot.rollout_id, "rollout-7");
    }

    #[test]
    fn test_all_errors_reported_together() {
        let mut desc = description();
        desc.http.rules.push(HttpRule {
            selector: "Echo.Missing".into(),
            get: Some("/missing".into()),
            ..Default::default()
        });
        desc.backend.rules.push(crate::service::BackendRule {
            selector: "Echo.Echo".into(),
            address: "ftp://files.example.com".into(),
            ..Default::default()
        });
        let err = compile(&desc, &CompilerOptions::default()).unwrap_err();
        assert_eq!(err.errors.len(), 2);
    }

    #[test]
    fn test_out_of_range_deadline_is_reported_not_panicked() {
        let mut desc = description();
        desc.backend.rules.push(crate::service::BackendRule {
            selector: "Echo.Echo".into(),
            deadline: 1e20,
            ..Default::default()
        });
        let err = compile(&desc, &CompilerOptions::default()).unwrap_err();
        assert!(matches!(
            err.errors.as_slice(),
            [CompileError::InvalidDeadline { selector, .. }] if selector == "Echo.Echo"
        ));
    }
}
