//! Per-operation backend routing policy.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use super::address::BackendAddress;
use super::deadline::RouteTimeouts;
use super::translation::{PathRewrite, PathTranslation};
use crate::compiler::{CompileError, CompileWarning, Diagnostics};
use crate::config::CompilerOptions;
use crate::registry::MethodRegistry;
use crate::routing::UriTemplate;
use crate::service::{BackendRule, ServiceDescription};

/// Identity token minted for calls to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendAuth {
    pub jwt_audience: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendRoutePolicy {
    pub address: BackendAddress,
    /// Routed to the co-located backend.
    pub local: bool,
    pub translation: PathTranslation,
    pub timeouts: RouteTimeouts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_auth: Option<BackendAuth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_rewrite: Option<String>,
}

impl BackendRoutePolicy {
    /// Rewrite for a route bound with `template`.
    pub fn rewrite_for(&self, template: &UriTemplate) -> Option<PathRewrite> {
        let url_template = template.has_variables().then(|| template.normalized());
        PathRewrite::compile(self.translation, &self.address.path, url_template)
    }
}

/// Parses the local backend, reporting a fatal error when it is unusable.
pub fn local_backend(opts: &CompilerOptions, diags: &mut Diagnostics) -> Option<BackendAddress> {
    match BackendAddress::parse(&opts.backend.local_address) {
        Ok(addr) => Some(addr),
        Err(source) => {
            diags.error(CompileError::InvalidLocalBackend {
                address: opts.backend.local_address.clone(),
                source,
            });
            None
        }
    }
}

/// Backend policy for every registered method, keyed by selector.
pub fn compile_backend_policies(
    desc: &ServiceDescription,
    registry: &MethodRegistry,
    opts: &CompilerOptions,
    diags: &mut Diagnostics,
) -> BTreeMap<String, BackendRoutePolicy> {
    let Some(local) = local_backend(opts, diags) else {
        return BTreeMap::new();
    };

    // Last rule per selector wins; each remote address and deadline is parsed once.
    let mut rules: BTreeMap<&str, (&BackendRule, Option<BackendAddress>, Option<Duration>)> =
        BTreeMap::new();
    for rule in &desc.backend.rules {
        if !registry.contains(&rule.selector) {
            diags.warn(CompileWarning::UnknownPolicySelector {
                selector: rule.selector.clone(),
                policy: "backend",
            });
            continue;
        }
        let Ok(deadline) = rule.deadline() else {
            diags.error(CompileError::InvalidDeadline {
                selector: rule.selector.clone(),
                deadline: rule.deadline,
            });
            continue;
        };
        let address = if rule.address.is_empty() {
            None
        } else {
            match BackendAddress::parse(&rule.address) {
                Ok(addr) => Some(addr),
                Err(source) => {
                    diags.error(CompileError::InvalidBackendAddress {
                        selector: rule.selector.clone(),
                        address: rule.address.clone(),
                        source,
                    });
                    continue;
                }
            }
        };
        rules.insert(rule.selector.as_str(), (rule, address, deadline));
    }

    let mut policies = BTreeMap::new();
    for method in registry.methods() {
        let rule = rules.get(method.policy_selector());
        let (address, local_route, translation) = match rule {
            Some((rule, Some(address), _)) => (address.clone(), false, rule.path_translation),
            _ => (local.clone(), true, PathTranslation::None),
        };

        let timeouts = RouteTimeouts::compute(
            rule.and_then(|(_, _, deadline)| *deadline),
            method.is_streaming(),
            opts.backend.default_deadline(),
            opts.backend.stream_idle_timeout(),
        );
        let backend_auth = rule
            .filter(|(r, _, _)| !r.disable_auth)
            .and_then(|(r, _, _)| r.jwt_audience.clone())
            .filter(|aud| !aud.is_empty())
            .map(|jwt_audience| BackendAuth { jwt_audience });
        let host_rewrite = (!local_route).then(|| address.host.clone());

        policies.insert(
            method.selector.clone(),
            BackendRoutePolicy {
                address,
                local: local_route,
                translation,
                timeouts,
                backend_auth,
                host_rewrite,
            },
        );
    }
    policies
}
