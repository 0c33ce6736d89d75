//! Upstream cluster table.
//!
//! # Responsibilities
//! - One cluster per distinct backend (scheme, host, port)
//! - Clusters for JWKS hosts and the service-control server
//! - Protocol, TLS and connection limits from backend options
//!
//! # Design Decisions
//! - SNI is always the backend host, so it never splits a cluster
//! - The co-located backend always gets its own cluster, even when a
//!   remote rule points at the same address

use std::collections::BTreeMap;

use serde::Serialize;

use crate::auth::JwtProvider;
use crate::backend::{BackendAddress, BackendScheme};
use crate::config::schema::{BackendOptions, DnsLookupFamily};
use crate::control::ServiceControlConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamProtocol {
    Http1,
    Http2,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TlsContext {
    pub sni: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alpn: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterDescriptor {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub protocol: UpstreamProtocol,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsContext>,
    pub connect_timeout_ms: u64,
    pub dns_lookup_family: DnsLookupFamily,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_requests: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ClusterTable {
    defaults: BackendOptions,
    clusters: BTreeMap<String, ClusterDescriptor>,
    by_backend: BTreeMap<(BackendScheme, String, u16), String>,
}

impl ClusterTable {
    pub fn new(defaults: &BackendOptions) -> Self {
        Self {
            defaults: defaults.clone(),
            clusters: BTreeMap::new(),
            by_backend: BTreeMap::new(),
        }
    }

    /// Name of the cluster serving `address`, creating it on first use.
    pub fn add_backend(&mut self, address: &BackendAddress) -> String {
        let key = (address.scheme, address.host.clone(), address.port);
        if let Some(name) = self.by_backend.get(&key) {
            return name.clone();
        }
        let name = format!(
            "backend-cluster-{}-{}",
            address.scheme.as_str(),
            address.authority()
        );
        self.insert(&name, &address.host, address.port, address.scheme);
        self.by_backend.insert(key, name.clone());
        name
    }

    pub fn add_local(&mut self, service_name: &str, address: &BackendAddress) -> String {
        let name = local_cluster_name(service_name);
        self.insert(&name, &address.host, address.port, address.scheme);
        name
    }

    /// Adds the key-set host of `provider`, if its URI resolved to one.
    pub fn add_jwks(&mut self, provider: &JwtProvider) {
        let (Some(name), Some(endpoint)) = (&provider.jwks.cluster, &provider.jwks.endpoint) else {
            return;
        };
        let scheme = if endpoint.tls { BackendScheme::Https } else { BackendScheme::Http };
        self.insert(name, &endpoint.host, endpoint.port, scheme);
    }

    pub fn add_service_control(&mut self, config: &ServiceControlConfig) {
        let address = &config.server.address;
        self.insert(&config.server.cluster, &address.host, address.port, address.scheme);
    }

    pub fn get(&self, name: &str) -> Option<&ClusterDescriptor> {
        self.clusters.get(name)
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Clusters sorted by name.
    pub fn into_clusters(self) -> Vec<ClusterDescriptor> {
        self.clusters.into_values().collect()
    }

    fn insert(&mut self, name: &str, host: &str, port: u16, scheme: BackendScheme) {
        if self.clusters.contains_key(name) {
            return;
        }
        let tls = scheme.is_tls().then(|| TlsContext {
            sni: host.to_string(),
            alpn: if scheme.is_grpc() { vec!["h2".to_string()] } else { Vec::new() },
        });
        let cluster = ClusterDescriptor {
            name: name.to_string(),
            host: host.to_string(),
            port,
            protocol: if scheme.is_grpc() { UpstreamProtocol::Http2 } else { UpstreamProtocol::Http1 },
            tls,
            connect_timeout_ms: self.defaults.connect_timeout_ms,
            dns_lookup_family: self.defaults.dns_lookup_family,
            max_requests: (self.defaults.max_requests > 0).then_some(self.defaults.max_requests),
        };
        tracing::debug!(cluster = %name, host = %host, port, "cluster added");
        self.clusters.insert(name.to_string(), cluster);
    }
}

pub fn local_cluster_name(service_name: &str) -> String {
    format!("{}_local", service_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(raw: &str) -> BackendAddress {
        BackendAddress::parse(raw).unwrap()
    }

    #[test]
    fn test_backend_clusters_dedupe_by_scheme_host_port() {
        let mut table = ClusterTable::new(&BackendOptions::default());
        let a = table.add_backend(&addr("https://pets.example.com/v1"));
        let b = table.add_backend(&addr("https://pets.example.com/v2"));
        let c = table.add_backend(&addr("http://pets.example.com:443"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, "backend-cluster-https-pets.example.com:443");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_tls_and_protocol() {
        let mut table = ClusterTable::new(&BackendOptions::default());
        let grpcs = table.add_backend(&addr("grpcs://api.example.com"));
        let http = table.add_backend(&addr("http://10.0.0.1:8080"));

        let grpcs = table.get(&grpcs).unwrap();
        assert_eq!(grpcs.protocol, UpstreamProtocol::Http2);
        let tls = grpcs.tls.as_ref().unwrap();
        assert_eq!(tls.sni, "api.example.com");
        assert_eq!(tls.alpn, vec!["h2".to_string()]);

        let http = table.get(&http).unwrap();
        assert_eq!(http.protocol, UpstreamProtocol::Http1);
        assert!(http.tls.is_none());
    }

    #[test]
    fn test_circuit_breaker_only_when_configured() {
        let mut table = ClusterTable::new(&BackendOptions::default());
        let name = table.add_backend(&addr("http://a.example.com"));
        assert_eq!(table.get(&name).unwrap().max_requests, None);

        let opts = BackendOptions { max_requests: 512, ..Default::default() };
        let mut table = ClusterTable::new(&opts);
        let name = table.add_backend(&addr("http://a.example.com"));
        assert_eq!(table.get(&name).unwrap().max_requests, Some(512));
    }

    #[test]
    fn test_local_cluster_is_separate() {
        let mut table = ClusterTable::new(&BackendOptions::default());
        let local = addr("http://127.0.0.1:8082");
        let name = table.add_local("bookstore", &local);
        let remote = table.add_backend(&local);
        assert_eq!(name, "bookstore_local");
        assert_ne!(name, remote);
        assert_eq!(table.into_clusters().len(), 2);
    }
}
