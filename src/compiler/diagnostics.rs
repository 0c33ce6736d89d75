//! Compile diagnostics.
//!
//! # Responsibilities
//! - Define fatal compile errors and non-fatal warnings
//! - Collect every problem of one compile in a single list
//!
//! # Design Decisions
//! - Stages push into one accumulator instead of returning early,
//!   so an operator sees all problems of a rollout at once
//! - Any error blocks assembly; warnings never do

use std::fmt;

use thiserror::Error;

use crate::backend::AddressError;
use crate::routing::{MatcherError, TemplateError};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error("service description has no name")]
    MissingServiceName,

    #[error("http rule references unknown method `{selector}`")]
    UnknownSelector { selector: String },

    #[error("http rule for `{selector}` declares no HTTP pattern")]
    MissingPattern { selector: String },

    #[error("invalid path template `{template}` for `{selector}`: {source}")]
    InvalidTemplate {
        selector: String,
        template: String,
        #[source]
        source: TemplateError,
    },

    #[error("route for `{selector}` rejected: {source}")]
    DuplicateRoute {
        selector: String,
        #[source]
        source: MatcherError,
    },

    #[error("backend rule for `{selector}` has invalid address `{address}`: {source}")]
    InvalidBackendAddress {
        selector: String,
        address: String,
        #[source]
        source: AddressError,
    },

    #[error("backend rule for `{selector}` has out-of-range deadline {deadline}s")]
    InvalidDeadline { selector: String, deadline: f64 },

    #[error("local backend address `{address}` is invalid: {source}")]
    InvalidLocalBackend {
        address: String,
        #[source]
        source: AddressError,
    },

    #[error("authentication rule for `{selector}` references unknown provider `{provider}`")]
    UnknownProvider { selector: String, provider: String },

    #[error("service control address `{address}` is invalid: {reason}")]
    InvalidServiceControlAddress { address: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileWarning {
    /// No HTTP binding and unregistered calls are not allowed.
    UnreachableMethod { selector: String },
    /// A later metric rule overrode an earlier cost.
    DuplicateQuotaCost { selector: String, metric: String },
    /// Deferred to request time; the provider is compiled without a fetch cluster.
    InvalidJwksUri { provider: String, uri: String, reason: String },
    /// A policy rule names a selector that is not a declared method.
    UnknownPolicySelector { selector: String, policy: &'static str },
}

impl fmt::Display for CompileWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileWarning::UnreachableMethod { selector } => {
                write!(f, "method `{}` has no HTTP binding and is unreachable", selector)
            }
            CompileWarning::DuplicateQuotaCost { selector, metric } => write!(
                f,
                "quota cost for metric `{}` on `{}` declared more than once; last one wins",
                metric, selector
            ),
            CompileWarning::InvalidJwksUri { provider, uri, reason } => {
                write!(f, "provider `{}` has invalid JWKS uri `{}`: {}", provider, uri, reason)
            }
            CompileWarning::UnknownPolicySelector { selector, policy } => {
                write!(f, "{} rule references unknown method `{}`", policy, selector)
            }
        }
    }
}

/// Problems found while compiling one service description.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    errors: Vec<CompileError>,
    warnings: Vec<CompileWarning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, error: CompileError) {
        tracing::debug!(error = %error, "compile error recorded");
        self.errors.push(error);
    }

    pub fn warn(&mut self, warning: CompileWarning) {
        tracing::warn!(warning = %warning, "compile warning");
        self.warnings.push(warning);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &[CompileError] {
        &self.errors
    }

    pub fn warnings(&self) -> &[CompileWarning] {
        &self.warnings
    }

    /// Split into warnings on success, or every problem on failure.
    pub fn finish(self) -> Result<Vec<CompileWarning>, CompileErrors> {
        if self.errors.is_empty() {
            Ok(self.warnings)
        } else {
            Err(CompileErrors { errors: self.errors, warnings: self.warnings })
        }
    }
}

/// A rejected compile: every error, plus the warnings seen on the way.
#[derive(Debug, Clone)]
pub struct CompileErrors {
    pub errors: Vec<CompileError>,
    pub warnings: Vec<CompileWarning>,
}

impl fmt::Display for CompileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "compile failed with {} error(s): ", self.errors.len())?;
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_without_errors_returns_warnings() {
        let mut diags = Diagnostics::new();
        diags.warn(CompileWarning::UnreachableMethod { selector: "a.B".into() });
        let warnings = diags.finish().unwrap();
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_finish_collects_all_errors() {
        let mut diags = Diagnostics::new();
        diags.error(CompileError::MissingServiceName);
        diags.error(CompileError::UnknownSelector { selector: "a.Missing".into() });
        assert!(diags.has_errors());

        let err = diags.finish().unwrap_err();
        assert_eq!(err.errors.len(), 2);
        let text = err.to_string();
        assert!(text.contains("2 error(s)"));
        assert!(text.contains("a.Missing"));
    }
}
