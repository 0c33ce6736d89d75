//! HTTP filter chain composition.
//!
//! # Responsibilities
//! - Fix the canonical order of filter stages
//! - Derive each operation's chain from its compiled policies
//! - Carry the listener-level configuration of every filter in use

use std::collections::BTreeMap;

use serde::Serialize;

use crate::auth::{CompiledAuthPolicy, JwtProvider};
use crate::config::schema::CorsOptions;
use crate::control::ServiceControlConfig;

/// Filter stages in evaluation order; `Ord` follows declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    PathMatcher,
    Cors,
    JwtAuthn,
    ServiceControl,
    BackendAuth,
    PathRewrite,
    GrpcTranscoder,
    Router,
}

/// What an operation needs from the data plane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationNeeds {
    pub cors: bool,
    pub jwt_authn: bool,
    pub service_control: bool,
    pub backend_auth: bool,
    pub path_rewrite: bool,
    pub grpc_transcoder: bool,
}

/// Ordered stages for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FilterChain(Vec<FilterKind>);

impl FilterChain {
    pub fn for_operation(needs: OperationNeeds) -> Self {
        let optional = [
            (needs.cors, FilterKind::Cors),
            (needs.jwt_authn, FilterKind::JwtAuthn),
            (needs.service_control, FilterKind::ServiceControl),
            (needs.backend_auth, FilterKind::BackendAuth),
            (needs.path_rewrite, FilterKind::PathRewrite),
            (needs.grpc_transcoder, FilterKind::GrpcTranscoder),
        ];
        let mut stages = vec![FilterKind::PathMatcher];
        stages.extend(optional.into_iter().filter(|(on, _)| *on).map(|(_, kind)| kind));
        stages.push(FilterKind::Router);
        Self(stages)
    }

    pub fn contains(&self, kind: FilterKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn stages(&self) -> &[FilterKind] {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathMatcherRule {
    pub selector: String,
    pub method: String,
    pub path_template: String,
}

/// Listener-level filter configuration, in chain order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "filter", rename_all = "snake_case")]
pub enum HttpFilter {
    PathMatcher {
        rules: Vec<PathMatcherRule>,
        /// Field name → JSON name for variable extraction.
        #[serde(skip_serializing_if = "BTreeMap::is_empty")]
        segment_names: BTreeMap<String, String>,
    },
    Cors(CorsOptions),
    JwtAuthn {
        providers: BTreeMap<String, JwtProvider>,
        requirements: BTreeMap<String, CompiledAuthPolicy>,
    },
    ServiceControl(ServiceControlConfig),
    BackendAuth {
        /// Sorted, unique audiences tokens are minted for.
        audiences: Vec<String>,
        rules: BTreeMap<String, String>,
    },
    PathRewrite,
    GrpcTranscoder {
        services: Vec<String>,
    },
    Router,
}

impl HttpFilter {
    /// Stage this filter occupies; sorting by it yields chain order.
    pub fn kind(&self) -> FilterKind {
        match self {
            HttpFilter::PathMatcher { .. } => FilterKind::PathMatcher,
            HttpFilter::Cors(_) => FilterKind::Cors,
            HttpFilter::JwtAuthn { .. } => FilterKind::JwtAuthn,
            HttpFilter::ServiceControl(_) => FilterKind::ServiceControl,
            HttpFilter::BackendAuth { .. } => FilterKind::BackendAuth,
            HttpFilter::PathRewrite => FilterKind::PathRewrite,
            HttpFilter::GrpcTranscoder { .. } => FilterKind::GrpcTranscoder,
            HttpFilter::Router => FilterKind::Router,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_filters_sort_into_chain_order() {
        let mut filters = vec![
            HttpFilter::Router,
            HttpFilter::GrpcTranscoder { services: vec!["Svc".into()] },
            HttpFilter::PathRewrite,
            HttpFilter::BackendAuth { audiences: vec![], rules: BTreeMap::new() },
            HttpFilter::PathMatcher { rules: vec![], segment_names: BTreeMap::new() },
        ];
        filters.sort_by_key(HttpFilter::kind);
        let kinds: Vec<FilterKind> = filters.iter().map(HttpFilter::kind).collect();
        assert_eq!(
            kinds,
            vec![
                FilterKind::PathMatcher,
                FilterKind::BackendAuth,
                FilterKind::PathRewrite,
                FilterKind::GrpcTranscoder,
                FilterKind::Router,
            ]
        );
    }

    #[test]
    fn test_minimal_chain() {
        let chain = FilterChain::for_operation(OperationNeeds::default());
        assert_eq!(chain.stages(), &[FilterKind::PathMatcher, FilterKind::Router]);
    }

    #[test]
    fn test_full_chain_is_canonical_order() {
        let chain = FilterChain::for_operation(OperationNeeds {
            cors: true,
            jwt_authn: true,
            service_control: true,
            backend_auth: true,
            path_rewrite: true,
            grpc_transcoder: true,
        });
        let mut sorted = chain.stages().to_vec();
        sorted.sort();
        assert_eq!(chain.stages(), sorted.as_slice());
        assert_eq!(chain.stages().len(), 8);
    }

    #[test]
    fn test_skipped_service_control_absent() {
        let chain = FilterChain::for_operation(OperationNeeds { jwt_authn: true, ..Default::default() });
        assert!(chain.contains(FilterKind::JwtAuthn));
        assert!(!chain.contains(FilterKind::ServiceControl));
    }

    #[test]
    fn test_filter_serializes_with_tag() {
        let json = serde_json::to_value(HttpFilter::GrpcTranscoder { services: vec!["a.B".into()] }).unwrap();
        assert_eq!(json["filter"], "grpc_transcoder");
        assert_eq!(json["services"][0], "a.B");
    }
}
