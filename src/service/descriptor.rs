//! Service description schema.
//!
//! All types derive Serde traits so a description can be read from any of
//! the supported file formats.

use std::collections::BTreeMap;
use std::time::{Duration, TryFromFloatSecsError};

use serde::{Deserialize, Serialize};

/// Root of an API description: methods, bindings and all attached policy.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceDescription {
    /// Service name, e.g. `bookstore.endpoints.example.com`.
    pub name: String,

    /// Config id of this generation.
    pub id: String,

    /// Rollout id the config was delivered under.
    pub rollout_id: String,

    pub apis: Vec<Api>,
    pub types: Vec<TypeDescriptor>,
    pub http: HttpRules,
    pub authentication: Authentication,
    pub backend: BackendRules,
    pub usage: UsageRules,
    pub quota: Quota,
    pub endpoints: Vec<Endpoint>,
    pub control: Control,
    pub system_parameters: SystemParameters,
}

impl ServiceDescription {
    /// True when any endpoint entry for this service allows CORS preflight.
    pub fn allows_cors(&self) -> bool {
        self.endpoints
            .iter()
            .any(|e| e.allow_cors && (e.name.is_empty() || e.name == self.name))
    }
}

/// One RPC interface.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Api {
    /// Fully-qualified interface name, e.g. `endpoints.examples.bookstore.Bookstore`.
    pub name: String,
    pub version: String,
    pub methods: Vec<ApiMethod>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApiMethod {
    pub name: String,
    pub request_type_url: String,
    pub request_streaming: bool,
    pub response_type_url: String,
    pub response_streaming: bool,
}

/// Message type reflection used to map field names to their JSON names.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TypeDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub name: String,
    pub json_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HttpRules {
    pub rules: Vec<HttpRule>,
}

/// URL-to-RPC binding. Exactly one of the verb fields or `custom` is set.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HttpRule {
    pub selector: String,
    pub get: Option<String>,
    pub put: Option<String>,
    pub post: Option<String>,
    pub delete: Option<String>,
    pub patch: Option<String>,
    pub custom: Option<CustomPattern>,
    pub body: String,
    pub additional_bindings: Vec<HttpRule>,
}

impl HttpRule {
    /// The HTTP verb and path template of this binding, if any.
    pub fn pattern(&self) -> Option<(String, &str)> {
        let verbs = [
            ("GET", &self.get),
            ("PUT", &self.put),
            ("POST", &self.post),
            ("DELETE", &self.delete),
            ("PATCH", &self.patch),
        ];
        for (verb, path) in verbs {
            if let Some(path) = path {
                return Some((verb.to_string(), path.as_str()));
            }
        }
        self.custom
            .as_ref()
            .map(|c| (c.kind.to_ascii_uppercase(), c.path.as_str()))
    }
}

/// Binding for a non-standard HTTP verb; `kind = "*"` matches every verb.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CustomPattern {
    pub kind: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Authentication {
    pub providers: Vec<AuthProvider>,
    pub rules: Vec<AuthenticationRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthProvider {
    pub id: String,
    pub issuer: String,
    /// Explicit key set URI. Empty means OpenID discovery from the issuer.
    pub jwks_uri: String,
    /// Comma-separated accepted audiences.
    pub audiences: String,
    pub jwt_locations: Vec<JwtLocationRule>,
}

/// Where a token may be carried. One of `header` or `query` is set.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JwtLocationRule {
    pub header: Option<String>,
    pub query: Option<String>,
    pub value_prefix: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthenticationRule {
    pub selector: String,
    pub requirements: Vec<AuthRequirementRule>,
    pub allow_without_credential: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthRequirementRule {
    pub provider_id: String,
    /// Comma-separated audiences overriding the provider's.
    pub audiences: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BackendRules {
    pub rules: Vec<BackendRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BackendRule {
    pub selector: String,
    pub address: String,
    /// Response deadline in seconds. Zero or negative means "use the default".
    pub deadline: f64,
    pub path_translation: PathTranslation,
    pub jwt_audience: Option<String>,
    pub disable_auth: bool,
}

impl BackendRule {
    /// The configured deadline, `None` when unset (zero, negative or NaN).
    /// Fails for values no `Duration` can hold, including infinity.
    pub fn deadline(&self) -> Result<Option<Duration>, TryFromFloatSecsError> {
        if self.deadline.is_nan() || self.deadline <= 0.0 {
            return Ok(None);
        }
        Duration::try_from_secs_f64(self.deadline).map(Some)
    }
}

/// How the outgoing request path is derived from the incoming one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PathTranslation {
    #[default]
    #[serde(alias = "PATH_TRANSLATION_UNSPECIFIED")]
    None,
    ConstantAddress,
    AppendPathToAddress,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UsageRules {
    pub rules: Vec<UsageRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UsageRule {
    pub selector: String,
    pub allow_unregistered_calls: bool,
    pub skip_service_control: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Quota {
    pub metric_rules: Vec<MetricRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetricRule {
    pub selector: String,
    pub metric_costs: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Endpoint {
    pub name: String,
    pub allow_cors: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Control {
    /// Service-control server address. Empty disables service control.
    pub environment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SystemParameters {
    pub rules: Vec<SystemParameterRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SystemParameterRule {
    pub selector: String,
    pub parameters: Vec<SystemParameter>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SystemParameter {
    pub name: String,
    pub http_header: String,
    pub url_query_parameter: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_camel_case_description() {
        let desc: ServiceDescription = serde_json::from_str(
            r#"{
                "name": "bookstore.example.com",
                "id": "2024-01-01r0",
                "apis": [{"name": "Bookstore", "methods": [{"name": "ListShelves"}]}],
                "http": {"rules": [{"selector": "Bookstore.ListShelves", "get": "/v1/shelves"}]},
                "backend": {"rules": [{"selector": "Bookstore.ListShelves",
                    "address": "https://backend.example.com/api",
                    "pathTranslation": "APPEND_PATH_TO_ADDRESS", "deadline": 7.5}]}
            }"#,
        )
        .unwrap();

        assert_eq!(desc.apis[0].methods[0].name, "ListShelves");
        let rule = &desc.backend.rules[0];
        assert_eq!(rule.path_translation, PathTranslation::AppendPathToAddress);
        assert_eq!(rule.deadline(), Ok(Some(Duration::from_millis(7500))));
    }

    #[test]
    fn test_http_rule_pattern() {
        let rule = HttpRule {
            selector: "a.B".into(),
            custom: Some(CustomPattern { kind: "head".into(), path: "/x".into() }),
            ..Default::default()
        };
        assert_eq!(rule.pattern(), Some(("HEAD".to_string(), "/x")));

        let empty = HttpRule::default();
        assert!(empty.pattern().is_none());
    }

    #[test]
    fn test_deadline_ignores_non_positive_values() {
        let rule = BackendRule { deadline: -3.0, ..Default::default() };
        assert_eq!(rule.deadline(), Ok(None));
        let rule = BackendRule { deadline: f64::NAN, ..Default::default() };
        assert_eq!(rule.deadline(), Ok(None));
    }

    #[test]
    fn test_deadline_out_of_range_is_error() {
        let rule = BackendRule { deadline: 1e20, ..Default::default() };
        assert!(rule.deadline().is_err());
        let rule = BackendRule { deadline: f64::INFINITY, ..Default::default() };
        assert!(rule.deadline().is_err());
    }

    #[test]
    fn test_unspecified_translation_alias() {
        let t: PathTranslation = serde_json::from_str("\"PATH_TRANSLATION_UNSPECIFIED\"").unwrap();
        assert_eq!(t, PathTranslation::None);
    }

    #[test]
    fn test_allows_cors() {
        let mut desc = ServiceDescription { name: "svc".into(), ..Default::default() };
        assert!(!desc.allows_cors());
        desc.endpoints.push(Endpoint { name: "other".into(), allow_cors: true });
        assert!(!desc.allows_cors());
        desc.endpoints.push(Endpoint { name: "svc".into(), allow_cors: true });
        assert!(desc.allows_cors());
    }
}
