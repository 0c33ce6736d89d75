//! The compiled, immutable configuration snapshot.
//!
//! # Responsibilities
//! - Hold everything the data plane needs for one config rollout
//! - Serialize deterministically (ordered maps, match-ordered routes)
//! - Replay a request through the compiled matcher and rewrite

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use super::clusters::ClusterDescriptor;
use super::filters::{FilterChain, HttpFilter};
use super::routes::RouteDescriptor;
use crate::auth::{CompiledAuthPolicy, PrefetchTarget};
use crate::backend::{BackendRoutePolicy, PathRewrite, RewriteError};
use crate::control::ServiceControlPolicy;
use crate::routing::{bindings_to_query_params, JsonNameMap, PathMatcher, VariableBinding};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListenerDescriptor {
    pub address: String,
    pub port: u16,
    pub http_filters: Vec<HttpFilter>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledOperation {
    pub selector: String,
    pub streaming: bool,
    pub transcode: bool,
    /// `METHOD /template` for every binding.
    pub bindings: Vec<String>,
    pub cluster: String,
    pub backend: BackendRoutePolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<CompiledAuthPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_control: Option<ServiceControlPolicy>,
    pub filter_chain: FilterChain,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigSnapshot {
    pub service_name: String,
    pub config_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub rollout_id: String,
    pub listener: ListenerDescriptor,
    pub routes: Vec<RouteDescriptor>,
    pub clusters: Vec<ClusterDescriptor>,
    pub operations: BTreeMap<String, CompiledOperation>,
    pub jwks_prefetch: Vec<PrefetchTarget>,
    #[serde(skip)]
    pub(crate) matcher: PathMatcher<RouteDescriptor>,
    #[serde(skip)]
    pub(crate) json_names: JsonNameMap,
}

/// Outcome of replaying one request against a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedRequest {
    pub selector: String,
    pub cluster: String,
    /// Path and query sent upstream.
    pub upstream_path: String,
    pub host_rewrite: Option<String>,
    pub bindings: Vec<VariableBinding>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteRequestError {
    #[error("no route for {method} {path}")]
    NoRoute { method: String, path: String },

    #[error(transparent)]
    Rewrite(#[from] RewriteError),
}

impl ConfigSnapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Whether both snapshots serialize to the same output. Routes, filters
    /// and clusters are all part of the output, so this covers option changes
    /// that leave the config id untouched.
    pub fn same_content(&self, other: &ConfigSnapshot) -> bool {
        match (serde_json::to_vec(self), serde_json::to_vec(other)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    pub fn operation(&self, selector: &str) -> Option<&CompiledOperation> {
        self.operations.get(selector)
    }

    /// Select a route for `method` + `path_and_query` and compute the
    /// upstream path exactly as the compiled config prescribes.
    pub fn route_request(&self, method: &str, path_and_query: &str) -> Result<RoutedRequest, RouteRequestError> {
        if path_and_query.contains('#') {
            return Err(RewriteError::Fragment(path_and_query.to_string()).into());
        }
        let found = self
            .matcher
            .lookup(method, path_and_query)
            .ok_or_else(|| RouteRequestError::NoRoute {
                method: method.to_string(),
                path: path_and_query.to_string(),
            })?;
        let route = &found.entry.value;

        let upstream_path = match &route.path_rewrite {
            Some(rewrite @ PathRewrite::ConstantPath { url_template: Some(_), .. }) => {
                let extracted = bindings_to_query_params(&found.bindings, &self.json_names);
                rewrite.apply(path_and_query, Some(&extracted))?
            }
            Some(rewrite) => rewrite.apply(path_and_query, None)?,
            None => path_and_query.to_string(),
        };

        Ok(RoutedRequest {
            selector: route.selector.clone(),
            cluster: route.cluster.clone(),
            upstream_path,
            host_rewrite: route.host_rewrite.clone(),
            bindings: found.bindings,
        })
    }
}
