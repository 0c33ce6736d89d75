//! Per-operation authentication requirements.
//!
//! # Responsibilities
//! - Compile authentication rules into OR-sets of provider requirements
//! - Model the data-plane evaluation of a compiled requirement set
//!
//! # Design Decisions
//! - Any one satisfied requirement authenticates the request
//! - A requirement's own audiences replace the provider's, never merge
//! - `allow_missing` only tolerates an absent token, not an invalid one
//! - Operations without rules are pass-through (no policy entry)

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::provider::{split_audiences, JwtProvider};
use crate::compiler::{CompileError, CompileWarning, Diagnostics};
use crate::registry::MethodRegistry;
use crate::service::ServiceDescription;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthRequirement {
    pub provider_id: String,
    /// Empty means "use the provider's audiences".
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub audiences: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledAuthPolicy {
    pub requirements: Vec<AuthRequirement>,
    pub allow_missing: bool,
}

/// A token after signature verification, as the data plane sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresentedToken {
    pub issuer: String,
    pub audiences: Vec<String>,
    /// Providers whose key sets validated the signature.
    pub verified_by: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    /// `provider` is `None` when a missing token was tolerated.
    Allowed { provider: Option<String> },
    Denied(AuthDenial),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDenial {
    MissingCredential,
    /// No listed provider validated the token.
    UnverifiedToken,
    AudienceMismatch,
}

impl CompiledAuthPolicy {
    pub fn evaluate(
        &self,
        providers: &BTreeMap<String, JwtProvider>,
        token: Option<&PresentedToken>,
    ) -> AuthDecision {
        let Some(token) = token else {
            return if self.allow_missing {
                AuthDecision::Allowed { provider: None }
            } else {
                AuthDecision::Denied(AuthDenial::MissingCredential)
            };
        };

        let mut verified = false;
        for req in &self.requirements {
            if !token.verified_by.contains(&req.provider_id) {
                continue;
            }
            verified = true;
            let accepted: &[String] = if req.audiences.is_empty() {
                providers
                    .get(&req.provider_id)
                    .map(|p| p.audiences.as_slice())
                    .unwrap_or_default()
            } else {
                &req.audiences
            };
            if accepted.is_empty() || token.audiences.iter().any(|aud| accepted.contains(aud)) {
                return AuthDecision::Allowed { provider: Some(req.provider_id.clone()) };
            }
        }

        AuthDecision::Denied(if verified {
            AuthDenial::AudienceMismatch
        } else {
            AuthDenial::UnverifiedToken
        })
    }
}

/// Authentication policy per selector. Selectors without one are absent.
pub fn compile_auth_rules(
    desc: &ServiceDescription,
    registry: &MethodRegistry,
    providers: &BTreeMap<String, JwtProvider>,
    diags: &mut Diagnostics,
) -> BTreeMap<String, CompiledAuthPolicy> {
    let mut policies = BTreeMap::new();
    for rule in &desc.authentication.rules {
        if !registry.contains(&rule.selector) {
            diags.warn(CompileWarning::UnknownPolicySelector {
                selector: rule.selector.clone(),
                policy: "authentication",
            });
            continue;
        }
        if rule.requirements.is_empty() {
            continue;
        }

        let mut requirements = Vec::with_capacity(rule.requirements.len());
        for req in &rule.requirements {
            if !providers.contains_key(&req.provider_id) {
                diags.error(CompileError::UnknownProvider {
                    selector: rule.selector.clone(),
                    provider: req.provider_id.clone(),
                });
                continue;
            }
            requirements.push(AuthRequirement {
                provider_id: req.provider_id.clone(),
                audiences: split_audiences(&req.audiences),
            });
        }

        policies.insert(
            rule.selector.clone(),
            CompiledAuthPolicy {
                requirements,
                allow_missing: rule.allow_without_credential,
            },
        );
    }
    policies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::provider::compile_providers;
    use crate::config::CompilerOptions;
    use crate::service::{Api, ApiMethod, AuthProvider, AuthRequirementRule, AuthenticationRule};

    fn description() -> ServiceDescription {
        let mut desc = ServiceDescription { name: "svc.example.com".into(), ..Default::default() };
        desc.apis.push(Api {
            name: "Api".into(),
            methods: vec![ApiMethod { name: "Call".into(), ..Default::default() }],
            ..Default::default()
        });
        for (id, aud) in [("providerA", "audX"), ("providerB", "audY")] {
            desc.authentication.providers.push(AuthProvider {
                id: id.into(),
                issuer: format!("https://{}.example.com", id),
                jwks_uri: format!("https://{}.example.com/jwks", id),
                audiences: aud.into(),
                ..Default::default()
            });
        }
        desc
    }

    fn compile(
        desc: &ServiceDescription,
        opts: &CompilerOptions,
    ) -> (BTreeMap<String, JwtProvider>, BTreeMap<String, CompiledAuthPolicy>, Diagnostics) {
        let mut diags = Diagnostics::new();
        let registry = MethodRegistry::build(desc, opts, &mut diags);
        let providers = compile_providers(desc, opts, &mut diags);
        let policies = compile_auth_rules(desc, &registry, &providers, &mut diags);
        (providers, policies, diags)
    }

    fn token(provider: &str, audiences: &[&str]) -> PresentedToken {
        PresentedToken {
            issuer: format!("https://{}.example.com", provider),
            audiences: audiences.iter().map(|a| a.to_string()).collect(),
            verified_by: [provider.to_string()].into_iter().collect(),
        }
    }

    fn rule(reqs: &[(&str, &str)], allow_missing: bool) -> AuthenticationRule {
        AuthenticationRule {
            selector: "Api.Call".into(),
            requirements: reqs
                .iter()
                .map(|(p, a)| AuthRequirementRule { provider_id: p.to_string(), audiences: a.to_string() })
                .collect(),
            allow_without_credential: allow_missing,
        }
    }

    #[test]
    fn test_or_semantics_across_providers() {
        let mut desc = description();
        desc.authentication.rules.push(rule(&[("providerA", "audX"), ("providerB", "audY")], false));
        let (providers, policies, _) = compile(&desc, &CompilerOptions::default());
        let policy = &policies["Api.Call"];

        assert_eq!(
            policy.evaluate(&providers, Some(&token("providerB", &["audY"]))),
            AuthDecision::Allowed { provider: Some("providerB".into()) }
        );
        assert_eq!(
            policy.evaluate(&providers, Some(&token("providerB", &["audX"]))),
            AuthDecision::Denied(AuthDenial::AudienceMismatch)
        );
        assert_eq!(
            policy.evaluate(&providers, Some(&token("other", &["audY"]))),
            AuthDecision::Denied(AuthDenial::UnverifiedToken)
        );
    }

    #[test]
    fn test_requirement_without_audience_uses_provider_audiences() {
        let mut desc = description();
        desc.authentication.rules.push(rule(&[("providerA", "")], false));
        let (providers, policies, _) = compile(&desc, &CompilerOptions::default());
        let policy = &policies["Api.Call"];
        assert!(policy.requirements[0].audiences.is_empty());
        assert!(matches!(
            policy.evaluate(&providers, Some(&token("providerA", &["audX"]))),
            AuthDecision::Allowed { .. }
        ));
    }

    #[test]
    fn test_allow_missing_only_tolerates_absent_token() {
        let mut desc = description();
        desc.authentication.rules.push(rule(&[("providerA", "")], true));
        let (providers, policies, _) = compile(&desc, &CompilerOptions::default());
        let policy = &policies["Api.Call"];

        assert_eq!(policy.evaluate(&providers, None), AuthDecision::Allowed { provider: None });
        assert_eq!(
            policy.evaluate(&providers, Some(&token("providerA", &["wrong"]))),
            AuthDecision::Denied(AuthDenial::AudienceMismatch)
        );
    }

    #[test]
    fn test_missing_token_denied_by_default() {
        let mut desc = description();
        desc.authentication.rules.push(rule(&[("providerA", "")], false));
        let (providers, policies, _) = compile(&desc, &CompilerOptions::default());
        assert_eq!(
            policies["Api.Call"].evaluate(&providers, None),
            AuthDecision::Denied(AuthDenial::MissingCredential)
        );
    }

    #[test]
    fn test_rule_without_requirements_is_pass_through() {
        let mut desc = description();
        desc.authentication.rules.push(rule(&[], false));
        let (_, policies, _) = compile(&desc, &CompilerOptions::default());
        assert!(policies.is_empty());
    }

    #[test]
    fn test_unknown_provider_is_fatal() {
        let mut desc = description();
        desc.authentication.rules.push(rule(&[("ghost", "")], false));
        let (_, _, diags) = compile(&desc, &CompilerOptions::default());
        assert!(matches!(diags.errors()[0], CompileError::UnknownProvider { .. }));
    }

    #[test]
    fn test_multi_audience_token_with_service_name_check() {
        let mut desc = description();
        desc.authentication.providers[0].audiences.clear();
        desc.authentication.rules.push(rule(&[("providerA", "")], false));
        let multi = token("providerA", &["https://other.example.com", "https://svc.example.com"]);
        let unrelated = token("providerA", &["https://other.example.com", "https://third.example.com"]);

        let (providers, policies, _) = compile(&desc, &CompilerOptions::default());
        assert!(matches!(
            policies["Api.Call"].evaluate(&providers, Some(&multi)),
            AuthDecision::Allowed { .. }
        ));
        assert_eq!(
            policies["Api.Call"].evaluate(&providers, Some(&unrelated)),
            AuthDecision::Denied(AuthDenial::AudienceMismatch)
        );

        let mut opts = CompilerOptions::default();
        opts.auth.disable_jwt_audience_service_name_check = true;
        let (providers, policies, _) = compile(&desc, &opts);
        assert!(matches!(
            policies["Api.Call"].evaluate(&providers, Some(&unrelated)),
            AuthDecision::Allowed { .. }
        ));
    }
}
