//! Route table construction.
//!
//! # Responsibilities
//! - Register every resolved binding in the path matcher
//! - Attach cluster, timeouts and rewrite to each route
//! - Emit routes in the order a first-match data plane evaluates them

use std::collections::BTreeMap;

use serde::Serialize;

use super::clusters::ClusterTable;
use crate::backend::{BackendRoutePolicy, PathRewrite, RouteTimeouts};
use crate::compiler::{CompileError, Diagnostics};
use crate::registry::{BindingKind, MethodRegistry};
use crate::routing::{PathMatcher, PathMatcherBuilder};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteDescriptor {
    pub selector: String,
    pub method: String,
    pub path_template: String,
    /// Anchored regex equivalent of `path_template`.
    pub path_regex: String,
    pub kind: BindingKind,
    pub cluster: String,
    pub timeouts: RouteTimeouts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_rewrite: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_rewrite: Option<PathRewrite>,
    /// HTTP/JSON is transcoded to gRPC on this route.
    pub transcode: bool,
}

/// Matcher over every route plus the cluster chosen for each selector.
#[derive(Debug, Clone)]
pub struct RouteIndex {
    pub matcher: PathMatcher<RouteDescriptor>,
    pub operation_clusters: BTreeMap<String, String>,
}

impl RouteIndex {
    /// Routes in match order.
    pub fn ordered(&self) -> Vec<RouteDescriptor> {
        let routes = self.matcher.routes();
        self.matcher
            .match_sequence()
            .into_iter()
            .map(|id| routes[id].value.clone())
            .collect()
    }
}

pub fn build_route_index(
    service_name: &str,
    registry: &MethodRegistry,
    backends: &BTreeMap<String, BackendRoutePolicy>,
    clusters: &mut ClusterTable,
    diags: &mut Diagnostics,
) -> RouteIndex {
    let mut builder = PathMatcherBuilder::new();
    let mut operation_clusters = BTreeMap::new();

    for method in registry.methods() {
        // Missing only when the local backend failed to parse; already an error.
        let Some(policy) = backends.get(&method.selector) else {
            continue;
        };
        let cluster = if policy.local {
            clusters.add_local(service_name, &policy.address)
        } else {
            clusters.add_backend(&policy.address)
        };
        let transcode = method.needs_transcoding(registry.grpc_backend());

        for binding in &method.bindings {
            let route = RouteDescriptor {
                selector: method.selector.clone(),
                method: binding.http_method.clone(),
                path_template: binding.template.normalized(),
                path_regex: binding.template.to_regex(),
                kind: binding.kind,
                cluster: cluster.clone(),
                timeouts: policy.timeouts,
                host_rewrite: policy.host_rewrite.clone(),
                path_rewrite: policy.rewrite_for(&binding.template),
                transcode: transcode && binding.kind == BindingKind::Declared,
            };
            if let Err(source) = builder.register(&binding.http_method, binding.template.clone(), route) {
                diags.error(CompileError::DuplicateRoute {
                    selector: method.selector.clone(),
                    source,
                });
            }
        }
        operation_clusters.insert(method.selector.clone(), cluster);
    }

    let matcher = builder.build();
    tracing::debug!(routes = matcher.routes().len(), "route index built");
    RouteIndex { matcher, operation_clusters }
}
