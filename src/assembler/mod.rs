//! Config assembler.
//!
//! # Data Flow
//! ```text
//! MethodRegistry + BackendRoutePolicy per selector
//!     → clusters.rs (dedupe upstreams, add JWKS/service-control hosts)
//!     → routes.rs (PathMatcher<RouteDescriptor>, match-ordered table)
//! per-operation auth / service-control / backend policy
//!     → filters.rs (FilterChain per operation, listener HttpFilters)
//!     → snapshot.rs (ConfigSnapshot, deterministic JSON)
//! ```
//!
//! # Design Decisions
//! - Route registration runs before assembly so duplicate routes surface
//!   with every other compile error; `assemble` itself cannot fail
//! - A listener filter is emitted only when at least one operation uses it
//! - Iteration is over ordered maps only, so output is byte-stable

pub mod clusters;
pub mod filters;
pub mod routes;
pub mod snapshot;

pub use clusters::{ClusterDescriptor, ClusterTable, TlsContext, UpstreamProtocol};
pub use filters::{FilterChain, FilterKind, HttpFilter, OperationNeeds, PathMatcherRule};
pub use routes::{build_route_index, RouteDescriptor, RouteIndex};
pub use snapshot::{
    CompiledOperation, ConfigSnapshot, ListenerDescriptor, RouteRequestError, RoutedRequest,
};

use std::collections::{BTreeMap, BTreeSet};

use crate::auth::{prefetch_plan, CompiledAuthPolicy, JwtProvider};
use crate::backend::BackendRoutePolicy;
use crate::config::CompilerOptions;
use crate::control::ServiceControlConfig;
use crate::registry::MethodRegistry;
use crate::routing::JsonNameMap;
use crate::service::ServiceDescription;

/// Validated outputs of every compile stage.
pub struct AssemblyInput<'a> {
    pub desc: &'a ServiceDescription,
    pub opts: &'a CompilerOptions,
    pub registry: &'a MethodRegistry,
    pub providers: BTreeMap<String, JwtProvider>,
    pub auth_rules: BTreeMap<String, CompiledAuthPolicy>,
    pub backends: BTreeMap<String, BackendRoutePolicy>,
    pub service_control: Option<ServiceControlConfig>,
    pub routes: RouteIndex,
    pub clusters: ClusterTable,
}

pub fn assemble(input: AssemblyInput<'_>) -> ConfigSnapshot {
    let AssemblyInput {
        desc,
        opts,
        registry,
        providers,
        mut auth_rules,
        backends,
        service_control,
        routes,
        mut clusters,
    } = input;

    for provider in providers.values() {
        clusters.add_jwks(provider);
    }
    if let Some(sc) = &service_control {
        clusters.add_service_control(sc);
    }

    let mut operations = BTreeMap::new();
    let mut transcoded_apis = BTreeSet::new();
    for method in registry.methods() {
        let (Some(backend), Some(cluster)) = (
            backends.get(&method.selector),
            routes.operation_clusters.get(&method.selector),
        ) else {
            continue;
        };
        let auth = auth_rules.remove(&method.selector);
        let sc_policy = service_control
            .as_ref()
            .and_then(|sc| sc.operations.get(&method.selector))
            .cloned();
        let transcode = method.needs_transcoding(registry.grpc_backend());
        if transcode {
            transcoded_apis.insert(method.api_name.clone());
        }

        let needs = OperationNeeds {
            cors: opts.cors.enabled,
            jwt_authn: auth.is_some(),
            service_control: sc_policy.as_ref().is_some_and(|p| !p.skip_service_control),
            backend_auth: backend.backend_auth.is_some(),
            path_rewrite: method
                .bindings
                .iter()
                .any(|b| backend.rewrite_for(&b.template).is_some()),
            grpc_transcoder: transcode,
        };

        operations.insert(
            method.selector.clone(),
            CompiledOperation {
                selector: method.selector.clone(),
                streaming: method.is_streaming(),
                transcode,
                bindings: method
                    .bindings
                    .iter()
                    .map(|b| format!("{} {}", b.http_method, b.template.normalized()))
                    .collect(),
                cluster: cluster.clone(),
                backend: backend.clone(),
                auth,
                service_control: sc_policy,
                filter_chain: FilterChain::for_operation(needs),
            },
        );
    }

    let ordered = routes.ordered();
    let json_names = JsonNameMap::from_types(&desc.types);
    let http_filters = listener_filters(
        &operations,
        &ordered,
        &json_names,
        opts,
        &providers,
        service_control,
        transcoded_apis,
    );

    let snapshot = ConfigSnapshot {
        service_name: desc.name.clone(),
        config_id: desc.id.clone(),
        rollout_id: desc.rollout_id.clone(),
        listener: ListenerDescriptor {
            address: opts.listener.address.clone(),
            port: opts.listener.port,
            http_filters,
        },
        routes: ordered,
        clusters: clusters.into_clusters(),
        operations,
        jwks_prefetch: prefetch_plan(&providers),
        matcher: routes.matcher,
        json_names,
    };
    tracing::info!(
        service = %snapshot.service_name,
        config_id = %snapshot.config_id,
        routes = snapshot.routes.len(),
        clusters = snapshot.clusters.len(),
        operations = snapshot.operations.len(),
        "config assembled"
    );
    snapshot
}

fn listener_filters(
    operations: &BTreeMap<String, CompiledOperation>,
    routes: &[RouteDescriptor],
    json_names: &JsonNameMap,
    opts: &CompilerOptions,
    providers: &BTreeMap<String, JwtProvider>,
    service_control: Option<ServiceControlConfig>,
    transcoded_apis: BTreeSet<String>,
) -> Vec<HttpFilter> {
    let in_use: BTreeSet<FilterKind> = operations
        .values()
        .flat_map(|op| op.filter_chain.stages().iter().copied())
        .collect();

    let mut filters = vec![
        HttpFilter::PathMatcher {
            rules: routes
                .iter()
                .map(|r| PathMatcherRule {
                    selector: r.selector.clone(),
                    method: r.method.clone(),
                    path_template: r.path_template.clone(),
                })
                .collect(),
            segment_names: json_names.as_map().clone(),
        },
        HttpFilter::Router,
    ];

    if in_use.contains(&FilterKind::Cors) {
        filters.push(HttpFilter::Cors(opts.cors.clone()));
    }
    if in_use.contains(&FilterKind::JwtAuthn) {
        filters.push(HttpFilter::JwtAuthn {
            providers: providers.clone(),
            requirements: operations
                .iter()
                .filter_map(|(selector, op)| op.auth.clone().map(|a| (selector.clone(), a)))
                .collect(),
        });
    }
    if let Some(sc) = service_control.filter(|_| in_use.contains(&FilterKind::ServiceControl)) {
        filters.push(HttpFilter::ServiceControl(sc));
    }
    if in_use.contains(&FilterKind::BackendAuth) {
        let rules: BTreeMap<String, String> = operations
            .iter()
            .filter_map(|(selector, op)| {
                op.backend
                    .backend_auth
                    .as_ref()
                    .map(|auth| (selector.clone(), auth.jwt_audience.clone()))
            })
            .collect();
        let audiences: BTreeSet<String> = rules.values().cloned().collect();
        filters.push(HttpFilter::BackendAuth {
            audiences: audiences.into_iter().collect(),
            rules,
        });
    }
    if in_use.contains(&FilterKind::PathRewrite) {
        filters.push(HttpFilter::PathRewrite);
    }
    if in_use.contains(&FilterKind::GrpcTranscoder) {
        filters.push(HttpFilter::GrpcTranscoder {
            services: transcoded_apis.into_iter().collect(),
        });
    }
    filters.sort_by_key(HttpFilter::kind);
    filters
}
