//! Per-operation service-control policy and the process-wide filter config.

use std::collections::BTreeMap;

use serde::Serialize;

use super::calling::{CallingConfig, CheckFailurePolicy};
use super::credential::{CredentialId, JwtIdentity};
use super::quota::{compile_quota_costs, MetricCosts};
use crate::backend::{BackendAddress, BackendScheme};
use crate::compiler::{CompileError, CompileWarning, Diagnostics};
use crate::config::CompilerOptions;
use crate::registry::MethodRegistry;
use crate::service::{ServiceDescription, UsageRule};

pub const SERVICE_CONTROL_CLUSTER: &str = "service-control-cluster";
const API_KEY_PARAMETER: &str = "api_key";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyLocation {
    Query(String),
    Header(String),
}

impl ApiKeyLocation {
    pub fn defaults() -> Vec<ApiKeyLocation> {
        vec![
            ApiKeyLocation::Query("key".to_string()),
            ApiKeyLocation::Query("api_key".to_string()),
            ApiKeyLocation::Header("x-api-key".to_string()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceControlPolicy {
    pub operation_name: String,
    pub api_name: String,
    pub api_version: String,
    /// No check, quota or report calls for this operation.
    pub skip_service_control: bool,
    /// A missing or invalid API key is tolerated.
    pub allow_unregistered_calls: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metric_costs: MetricCosts,
    pub api_key_locations: Vec<ApiKeyLocation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeyState<'a> {
    Missing,
    Valid(&'a str),
    Invalid(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerRejection {
    MissingApiKey,
    InvalidApiKey,
}

impl ServiceControlPolicy {
    /// Credential id for a request, or the reason it must be rejected.
    pub fn identify_consumer(
        &self,
        api_key: ApiKeyState<'_>,
        jwt: Option<&JwtIdentity>,
    ) -> Result<CredentialId, ConsumerRejection> {
        match api_key {
            ApiKeyState::Valid(key) => Ok(CredentialId::derive(Some(key), jwt)),
            ApiKeyState::Missing if !self.allow_unregistered_calls => Err(ConsumerRejection::MissingApiKey),
            ApiKeyState::Invalid(_) if !self.allow_unregistered_calls => Err(ConsumerRejection::InvalidApiKey),
            _ => Ok(CredentialId::derive(None, jwt)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceControlServer {
    pub uri: String,
    pub cluster: String,
    #[serde(skip)]
    pub address: BackendAddress,
}

/// Filter-level service-control configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceControlConfig {
    pub service_name: String,
    pub service_config_id: String,
    pub server: ServiceControlServer,
    pub calling: CallingConfig,
    pub check_failure_policy: CheckFailurePolicy,
    pub operations: BTreeMap<String, ServiceControlPolicy>,
}

/// `None` when service control is disabled for this service.
pub fn compile_service_control(
    desc: &ServiceDescription,
    registry: &MethodRegistry,
    opts: &CompilerOptions,
    diags: &mut Diagnostics,
) -> Option<ServiceControlConfig> {
    if opts.service_control.skip {
        tracing::info!("service control disabled by options");
        return None;
    }
    let environment = opts
        .service_control
        .url_override
        .clone()
        .unwrap_or_else(|| desc.control.environment.clone());
    if environment.is_empty() {
        tracing::info!(service = %desc.name, "no service control environment; filter omitted");
        return None;
    }
    let server = match parse_server(&environment) {
        Ok(server) => server,
        Err(reason) => {
            diags.error(CompileError::InvalidServiceControlAddress { address: environment, reason });
            return None;
        }
    };

    let usage = usage_rules(desc, registry, diags);
    let key_locations = api_key_locations(desc);
    let mut costs = compile_quota_costs(desc, registry, diags);

    let mut operations = BTreeMap::new();
    for method in registry.methods() {
        let rule = usage.get(method.selector.as_str());
        operations.insert(
            method.selector.clone(),
            ServiceControlPolicy {
                operation_name: method.selector.clone(),
                api_name: method.api_name.clone(),
                api_version: method.api_version.clone(),
                skip_service_control: rule.is_some_and(|r| r.skip_service_control),
                allow_unregistered_calls: method.is_cors_preflight()
                    || rule.is_some_and(|r| r.allow_unregistered_calls),
                metric_costs: costs.remove(&method.selector).unwrap_or_default(),
                api_key_locations: key_locations
                    .get(method.selector.as_str())
                    .cloned()
                    .unwrap_or_else(ApiKeyLocation::defaults),
            },
        );
    }

    let calling = CallingConfig::from_options(&opts.service_control);
    Some(ServiceControlConfig {
        service_name: desc.name.clone(),
        service_config_id: desc.id.clone(),
        server,
        check_failure_policy: calling.check_failure_policy(),
        calling,
        operations,
    })
}

fn parse_server(environment: &str) -> Result<ServiceControlServer, String> {
    let uri = if environment.contains("://") {
        environment.to_string()
    } else {
        format!("https://{}", environment)
    };
    let address = BackendAddress::parse(&uri).map_err(|e| e.to_string())?;
    if !matches!(address.scheme, BackendScheme::Http | BackendScheme::Https) {
        return Err(format!("unsupported scheme `{}`", address.scheme.as_str()));
    }
    Ok(ServiceControlServer {
        uri,
        cluster: SERVICE_CONTROL_CLUSTER.to_string(),
        address,
    })
}

fn usage_rules<'a>(
    desc: &'a ServiceDescription,
    registry: &MethodRegistry,
    diags: &mut Diagnostics,
) -> BTreeMap<&'a str, &'a UsageRule> {
    let mut rules = BTreeMap::new();
    for rule in &desc.usage.rules {
        if !registry.contains(&rule.selector) {
            diags.warn(CompileWarning::UnknownPolicySelector {
                selector: rule.selector.clone(),
                policy: "usage",
            });
            continue;
        }
        rules.insert(rule.selector.as_str(), rule);
    }
    rules
}

fn api_key_locations(desc: &ServiceDescription) -> BTreeMap<&str, Vec<ApiKeyLocation>> {
    let mut locations = BTreeMap::new();
    for rule in &desc.system_parameters.rules {
        let mut found = Vec::new();
        for param in rule.parameters.iter().filter(|p| p.name == API_KEY_PARAMETER) {
            if !param.http_header.is_empty() {
                found.push(ApiKeyLocation::Header(param.http_header.clone()));
            }
            if !param.url_query_parameter.is_empty() {
                found.push(ApiKeyLocation::Query(param.url_query_parameter.clone()));
            }
        }
        if !found.is_empty() {
            locations.insert(rule.selector.as_str(), found);
        }
    }
    locations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{Api, ApiMethod, MetricRule, SystemParameter, SystemParameterRule};

    fn description() -> ServiceDescription {
        let mut desc = ServiceDescription {
            name: "svc.example.com".into(),
            id: "2024-05-01r1".into(),
            ..Default::default()
        };
        desc.control.environment = "servicecontrol.googleapis.com".into();
        desc.apis.push(Api {
            name: "Api".into(),
            version: "v1".into(),
            methods: vec![
                ApiMethod { name: "Open".into(), ..Default::default() },
                ApiMethod { name: "Health".into(), ..Default::default() },
            ],
        });
        desc.usage.rules.push(UsageRule {
            selector: "Api.Health".into(),
            skip_service_control: true,
            ..Default::default()
        });
        desc.usage.rules.push(UsageRule {
            selector: "Api.Open".into(),
            allow_unregistered_calls: true,
            ..Default::default()
        });
        desc
    }

    fn compile(desc: &ServiceDescription, opts: &CompilerOptions) -> (Option<ServiceControlConfig>, Diagnostics) {
        let mut diags = Diagnostics::new();
        let registry = MethodRegistry::build(desc, opts, &mut diags);
        (compile_service_control(desc, &registry, opts, &mut diags), diags)
    }

    #[test]
    fn test_usage_flags_and_server() {
        let (config, diags) = compile(&description(), &CompilerOptions::default());
        let config = config.unwrap();
        assert!(!diags.has_errors());
        assert_eq!(config.server.uri, "https://servicecontrol.googleapis.com");
        assert_eq!(config.server.cluster, SERVICE_CONTROL_CLUSTER);
        assert_eq!(config.service_config_id, "2024-05-01r1");
        assert!(config.operations["Api.Health"].skip_service_control);
        assert!(config.operations["Api.Open"].allow_unregistered_calls);
        assert_eq!(config.operations["Api.Open"].api_version, "v1");
        assert_eq!(config.check_failure_policy, CheckFailurePolicy::DenyOnFailure);
    }

    #[test]
    fn test_disabled_without_environment_or_by_option() {
        let mut desc = description();
        desc.control.environment.clear();
        assert!(compile(&desc, &CompilerOptions::default()).0.is_none());

        let mut opts = CompilerOptions::default();
        opts.service_control.skip = true;
        assert!(compile(&description(), &opts).0.is_none());
    }

    #[test]
    fn test_url_override_and_fail_open() {
        let mut opts = CompilerOptions::default();
        opts.service_control.url_override = Some("http://127.0.0.1:9000".into());
        opts.service_control.network_fail_open = true;
        let config = compile(&description(), &opts).0.unwrap();
        assert_eq!(config.server.address.port, 9000);
        assert_eq!(config.check_failure_policy, CheckFailurePolicy::AllowOnFailure);
    }

    #[test]
    fn test_invalid_environment_is_fatal() {
        let mut desc = description();
        desc.control.environment = "grpc://sc.example.com".into();
        let (config, diags) = compile(&desc, &CompilerOptions::default());
        assert!(config.is_none());
        assert!(matches!(diags.errors()[0], CompileError::InvalidServiceControlAddress { .. }));
    }

    #[test]
    fn test_quota_costs_and_key_locations() {
        let mut desc = description();
        desc.quota.metric_rules.push(MetricRule {
            selector: "Api.Open".into(),
            metric_costs: [("read-requests".to_string(), 2)].into_iter().collect(),
        });
        desc.system_parameters.rules.push(SystemParameterRule {
            selector: "Api.Open".into(),
            parameters: vec![SystemParameter {
                name: "api_key".into(),
                http_header: "X-Key".into(),
                url_query_parameter: "k".into(),
            }],
        });
        let config = compile(&desc, &CompilerOptions::default()).0.unwrap();
        let open = &config.operations["Api.Open"];
        assert_eq!(open.metric_costs["read-requests"], 2);
        assert_eq!(
            open.api_key_locations,
            vec![ApiKeyLocation::Header("X-Key".into()), ApiKeyLocation::Query("k".into())]
        );
        assert_eq!(config.operations["Api.Health"].api_key_locations, ApiKeyLocation::defaults());
    }

    #[test]
    fn test_identify_consumer() {
        let config = compile(&description(), &CompilerOptions::default()).0.unwrap();
        let open = &config.operations["Api.Open"];
        let health = &config.operations["Api.Health"];

        assert_eq!(
            health.identify_consumer(ApiKeyState::Valid("k1"), None),
            Ok(CredentialId::ApiKey("k1".into()))
        );
        assert_eq!(
            health.identify_consumer(ApiKeyState::Missing, None),
            Err(ConsumerRejection::MissingApiKey)
        );
        assert_eq!(
            health.identify_consumer(ApiKeyState::Invalid("bad"), None),
            Err(ConsumerRejection::InvalidApiKey)
        );

        let jwt = JwtIdentity { issuer: "iss".into(), audiences: vec!["aud".into()] };
        assert_eq!(
            open.identify_consumer(ApiKeyState::Invalid("bad"), Some(&jwt)),
            Ok(CredentialId::Jwt { issuer: "iss".into(), audience: Some("aud".into()) })
        );
        assert_eq!(open.identify_consumer(ApiKeyState::Missing, None), Ok(CredentialId::Anonymous));
    }
}
