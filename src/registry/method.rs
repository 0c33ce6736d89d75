//! Registered methods and their resolved HTTP bindings.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::backend::BackendAddress;
use crate::compiler::{CompileError, CompileWarning, Diagnostics};
use crate::config::CompilerOptions;
use crate::routing::UriTemplate;
use crate::service::{HttpRule, ServiceDescription};

/// Where a binding came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    /// Declared in an HTTP rule.
    Declared,
    /// Implicit `POST /<api>/<method>` for gRPC backends.
    GrpcPassthrough,
    /// Synthesised `OPTIONS` binding for CORS preflight.
    CorsPreflight,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBinding {
    pub http_method: String,
    pub template: UriTemplate,
    pub body: String,
    pub kind: BindingKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredMethod {
    pub selector: String,
    pub api_name: String,
    pub api_version: String,
    pub method_name: String,
    pub request_streaming: bool,
    pub response_streaming: bool,
    pub bindings: Vec<ResolvedBinding>,
    /// Selector mirrored by a synthetic CORS method.
    pub origin: Option<String>,
}

impl RegisteredMethod {
    pub fn is_streaming(&self) -> bool {
        self.request_streaming || self.response_streaming
    }

    /// Selector whose backend rule applies to this method.
    pub fn policy_selector(&self) -> &str {
        self.origin.as_deref().unwrap_or(&self.selector)
    }

    pub fn is_cors_preflight(&self) -> bool {
        self.origin.is_some()
    }

    /// HTTP/JSON bindings in front of a gRPC backend need transcoding.
    pub fn needs_transcoding(&self, grpc_backend: bool) -> bool {
        grpc_backend && self.bindings.iter().any(|b| b.kind == BindingKind::Declared)
    }
}

/// Every callable method of one service, keyed by selector.
#[derive(Debug, Clone, Default)]
pub struct MethodRegistry {
    methods: BTreeMap<String, RegisteredMethod>,
    /// (selector, binding index) of declared bindings in description order.
    declared: Vec<(String, usize)>,
    grpc_backend: bool,
}

impl MethodRegistry {
    pub fn build(desc: &ServiceDescription, opts: &CompilerOptions, diags: &mut Diagnostics) -> Self {
        let mut methods = BTreeMap::new();
        for api in &desc.apis {
            for m in &api.methods {
                let selector = format!("{}.{}", api.name, m.name);
                methods.insert(
                    selector.clone(),
                    RegisteredMethod {
                        selector,
                        api_name: api.name.clone(),
                        api_version: api.version.clone(),
                        method_name: m.name.clone(),
                        request_streaming: m.request_streaming,
                        response_streaming: m.response_streaming,
                        bindings: Vec::new(),
                        origin: None,
                    },
                );
            }
        }

        let grpc_backend = BackendAddress::parse(&opts.backend.local_address)
            .map(|a| a.scheme.is_grpc())
            .unwrap_or(false);
        let mut registry = Self { methods, declared: Vec::new(), grpc_backend };

        for rule in &desc.http.rules {
            registry.attach_rule(rule, diags);
        }
        if grpc_backend {
            registry.add_grpc_passthrough();
        }
        if desc.allows_cors() {
            registry.add_cors_preflight();
        }
        registry.warn_unreachable(desc, diags);

        tracing::debug!(methods = registry.methods.len(), grpc_backend, "method registry built");
        registry
    }

    pub fn get(&self, selector: &str) -> Option<&RegisteredMethod> {
        self.methods.get(selector)
    }

    pub fn contains(&self, selector: &str) -> bool {
        self.methods.contains_key(selector)
    }

    /// Methods in selector order.
    pub fn methods(&self) -> impl Iterator<Item = &RegisteredMethod> {
        self.methods.values()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// The co-located backend speaks gRPC.
    pub fn grpc_backend(&self) -> bool {
        self.grpc_backend
    }

    fn attach_rule(&mut self, rule: &HttpRule, diags: &mut Diagnostics) {
        let Some(method) = self.methods.get_mut(&rule.selector) else {
            diags.error(CompileError::UnknownSelector { selector: rule.selector.clone() });
            return;
        };

        for binding in std::iter::once(rule).chain(rule.additional_bindings.iter()) {
            let Some((verb, path)) = binding.pattern() else {
                diags.error(CompileError::MissingPattern { selector: rule.selector.clone() });
                continue;
            };
            match UriTemplate::parse(path) {
                Ok(template) => {
                    self.declared.push((rule.selector.clone(), method.bindings.len()));
                    method.bindings.push(ResolvedBinding {
                        http_method: verb,
                        template,
                        body: binding.body.clone(),
                        kind: BindingKind::Declared,
                    });
                }
                Err(source) => diags.error(CompileError::InvalidTemplate {
                    selector: rule.selector.clone(),
                    template: path.to_string(),
                    source,
                }),
            }
        }
    }

    fn add_grpc_passthrough(&mut self) {
        for method in self.methods.values_mut() {
            let path = format!("/{}/{}", method.api_name, method.method_name);
            match UriTemplate::parse(&path) {
                Ok(template) => method.bindings.push(ResolvedBinding {
                    http_method: "POST".to_string(),
                    template,
                    body: "*".to_string(),
                    kind: BindingKind::GrpcPassthrough,
                }),
                Err(e) => {
                    tracing::warn!(selector = %method.selector, error = %e, "no gRPC route for method");
                }
            }
        }
    }

    fn add_cors_preflight(&mut self) {
        let with_options: BTreeSet<String> = self
            .methods
            .values()
            .flat_map(|m| m.bindings.iter())
            .filter(|b| b.http_method == "OPTIONS")
            .map(|b| b.template.match_key())
            .collect();

        let mut seen = BTreeSet::new();
        let mut mirrored = Vec::new();
        for (selector, index) in &self.declared {
            let Some(method) = self.methods.get(selector) else {
                continue;
            };
            let Some(binding) = method.bindings.get(*index) else {
                continue;
            };
            let key = binding.template.match_key();
            if with_options.contains(&key) || !seen.insert(key) {
                continue;
            }
            mirrored.push((method.clone(), binding.template.clone()));
        }

        let mut next = 0;
        for (origin, template) in mirrored {
            // Declared methods keep their name; numbering skips past them.
            let (method_name, selector) = loop {
                let method_name = format!("CORS_{}", next);
                let selector = format!("{}.{}", origin.api_name, method_name);
                next += 1;
                if !self.methods.contains_key(&selector) {
                    break (method_name, selector);
                }
            };
            self.methods.insert(
                selector.clone(),
                RegisteredMethod {
                    selector,
                    api_name: origin.api_name,
                    api_version: origin.api_version,
                    method_name,
                    request_streaming: false,
                    response_streaming: false,
                    bindings: vec![ResolvedBinding {
                        http_method: "OPTIONS".to_string(),
                        template,
                        body: String::new(),
                        kind: BindingKind::CorsPreflight,
                    }],
                    origin: Some(origin.selector),
                },
            );
        }
    }

    fn warn_unreachable(&self, desc: &ServiceDescription, diags: &mut Diagnostics) {
        let allow_unregistered: BTreeSet<&str> = desc
            .usage
            .rules
            .iter()
            .filter(|r| r.allow_unregistered_calls)
            .map(|r| r.selector.as_str())
            .collect();

        for method in self.methods.values() {
            if method.bindings.is_empty() && !allow_unregistered.contains(method.selector.as_str()) {
                diags.warn(CompileWarning::UnreachableMethod { selector: method.selector.clone() });
            }
        }
    }
}
