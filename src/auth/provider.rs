//! JWT provider compilation.
//!
//! # Responsibilities
//! - Resolve each provider's key-set source (explicit URI or discovery)
//! - Apply cache, async-fetch and retry policy from options
//! - Resolve default audiences and token locations
//!
//! # Design Decisions
//! - No network I/O here: discovery is compiled as a URI to resolve later
//! - An unparsable key-set URI is a warning; the provider is still emitted
//!   and fails at request time

use std::collections::BTreeMap;

use serde::Serialize;
use url::Url;

use crate::compiler::{CompileWarning, Diagnostics};
use crate::config::CompilerOptions;
use crate::service::{AuthProvider, JwtLocationRule, ServiceDescription};

const OPENID_DISCOVERY_PATH: &str = "/.well-known/openid-configuration";
const SERVICE_ACCOUNT_JWKS_PREFIX: &str = "https://www.googleapis.com/service_accounts/v1/jwk/";
const SERVICE_ACCOUNT_SUFFIX: &str = "gserviceaccount.com";

pub const DEFAULT_AUTH_HEADER: &str = "Authorization";
pub const DEFAULT_AUTH_PREFIX: &str = "Bearer ";
pub const DEFAULT_IAP_HEADER: &str = "X-Goog-Iap-Jwt-Assertion";
pub const DEFAULT_QUERY_PARAM: &str = "access_token";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JwksSource {
    pub uri: String,
    /// `uri` is an OpenID discovery document, not the key set itself.
    pub discovery: bool,
    /// Cluster used to fetch `uri`; absent when the URI could not be parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(skip)]
    pub endpoint: Option<JwksEndpoint>,
}

/// Host the key set is fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JwksEndpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JwksFetchPolicy {
    pub cache_duration_secs: u64,
    pub async_fetch: bool,
    pub timeout_ms: u64,
    pub retries: u32,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JwtHeaderLocation {
    pub name: String,
    pub value_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JwtLocations {
    pub headers: Vec<JwtHeaderLocation>,
    pub query_params: Vec<String>,
}

impl JwtLocations {
    pub fn defaults() -> Self {
        Self {
            headers: vec![
                JwtHeaderLocation {
                    name: DEFAULT_AUTH_HEADER.to_string(),
                    value_prefix: DEFAULT_AUTH_PREFIX.to_string(),
                },
                JwtHeaderLocation {
                    name: DEFAULT_IAP_HEADER.to_string(),
                    value_prefix: String::new(),
                },
            ],
            query_params: vec![DEFAULT_QUERY_PARAM.to_string()],
        }
    }

    /// Custom locations replace the defaults entirely.
    fn from_rules(rules: &[JwtLocationRule]) -> Self {
        if rules.is_empty() {
            return Self::defaults();
        }
        let mut locations = Self { headers: Vec::new(), query_params: Vec::new() };
        for rule in rules {
            if let Some(header) = rule.header.as_ref().filter(|h| !h.is_empty()) {
                locations.headers.push(JwtHeaderLocation {
                    name: header.clone(),
                    value_prefix: rule.value_prefix.clone(),
                });
            } else if let Some(query) = rule.query.as_ref().filter(|q| !q.is_empty()) {
                locations.query_params.push(query.clone());
            }
        }
        locations
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JwtProvider {
    pub id: String,
    pub issuer: String,
    pub jwks: JwksSource,
    pub fetch: JwksFetchPolicy,
    /// Accepted audiences when a requirement does not name its own.
    /// Empty means the audience is not checked.
    pub audiences: Vec<String>,
    pub locations: JwtLocations,
}

/// Split a comma-separated audience list.
pub fn split_audiences(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(String::from)
        .collect()
}

/// `jwt-provider-cluster-<host>:<port>`.
pub fn jwks_cluster_name(host: &str, port: u16) -> String {
    format!("jwt-provider-cluster-{}:{}", host, port)
}

pub fn compile_providers(
    desc: &ServiceDescription,
    opts: &CompilerOptions,
    diags: &mut Diagnostics,
) -> BTreeMap<String, JwtProvider> {
    let mut providers = BTreeMap::new();
    for provider in &desc.authentication.providers {
        let compiled = compile_provider(provider, &desc.name, opts, diags);
        tracing::debug!(
            provider = %compiled.id,
            issuer = %compiled.issuer,
            jwks = %compiled.jwks.uri,
            "compiled JWT provider"
        );
        providers.insert(compiled.id.clone(), compiled);
    }
    providers
}

fn compile_provider(
    provider: &AuthProvider,
    service_name: &str,
    opts: &CompilerOptions,
    diags: &mut Diagnostics,
) -> JwtProvider {
    let jwks = resolve_jwks(provider, diags);

    let mut audiences = split_audiences(&provider.audiences);
    if audiences.is_empty() && !opts.auth.disable_jwt_audience_service_name_check {
        audiences = vec![service_name.to_string(), format!("https://{}", service_name)];
    }

    JwtProvider {
        id: provider.id.clone(),
        issuer: provider.issuer.clone(),
        jwks,
        fetch: JwksFetchPolicy {
            cache_duration_secs: opts.auth.jwks_cache_duration_secs,
            async_fetch: !opts.auth.disable_jwks_async_fetch,
            timeout_ms: opts.auth.jwks_fetch_timeout_ms,
            retries: opts.auth.jwks_fetch_retries,
            retry_backoff_ms: opts.auth.jwks_fetch_retry_backoff_ms,
        },
        audiences,
        locations: JwtLocations::from_rules(&provider.jwt_locations),
    }
}

fn resolve_jwks(provider: &AuthProvider, diags: &mut Diagnostics) -> JwksSource {
    let (uri, discovery) = if !provider.jwks_uri.is_empty() {
        (provider.jwks_uri.clone(), false)
    } else if provider.issuer.ends_with(SERVICE_ACCOUNT_SUFFIX) && !provider.issuer.contains("://") {
        (format!("{}{}", SERVICE_ACCOUNT_JWKS_PREFIX, provider.issuer), false)
    } else {
        (
            format!("{}{}", provider.issuer.trim_end_matches('/'), OPENID_DISCOVERY_PATH),
            true,
        )
    };

    let endpoint = match Url::parse(&uri) {
        Ok(url) => match (url.host_str(), url.port_or_known_default()) {
            (Some(host), Some(port)) if !host.is_empty() => Some(JwksEndpoint {
                host: host.to_string(),
                port,
                tls: url.scheme() == "https",
            }),
            _ => None,
        },
        Err(_) => None,
    };
    if endpoint.is_none() {
        diags.warn(CompileWarning::InvalidJwksUri {
            provider: provider.id.clone(),
            uri: uri.clone(),
            reason: "no usable host".to_string(),
        });
    }

    JwksSource {
        cluster: endpoint.as_ref().map(|e| jwks_cluster_name(&e.host, e.port)),
        uri,
        discovery,
        endpoint,
    }
}
