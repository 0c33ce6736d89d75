//! Service-control calling policy.
//!
//! # Responsibilities
//! - Retry count and per-try timeout for Check, Quota and Report calls
//! - Failure policy when the service-control server is unreachable
//!
//! # Design Decisions
//! - Fail closed unless `network_fail_open` is set
//! - Report calls never gate a request, so fail-open does not apply to them

use serde::Serialize;

use crate::config::schema::ServiceControlOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CallPolicy {
    pub max_retries: u32,
    pub per_try_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckFailurePolicy {
    AllowOnFailure,
    DenyOnFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CallingConfig {
    pub check: CallPolicy,
    pub quota: CallPolicy,
    pub report: CallPolicy,
    pub network_fail_open: bool,
}

impl CallingConfig {
    pub fn from_options(opts: &ServiceControlOptions) -> Self {
        Self {
            check: CallPolicy {
                max_retries: opts.check_retries,
                per_try_timeout_ms: opts.check_timeout_ms,
            },
            quota: CallPolicy {
                max_retries: opts.quota_retries,
                per_try_timeout_ms: opts.quota_timeout_ms,
            },
            report: CallPolicy {
                max_retries: opts.report_retries,
                per_try_timeout_ms: opts.report_timeout_ms,
            },
            network_fail_open: opts.network_fail_open,
        }
    }

    /// What a Check (or Quota) network failure means for the request.
    pub fn check_failure_policy(&self) -> CheckFailurePolicy {
        if self.network_fail_open {
            CheckFailurePolicy::AllowOnFailure
        } else {
            CheckFailurePolicy::DenyOnFailure
        }
    }
}

impl Default for CallingConfig {
    fn default() -> Self {
        Self::from_options(&ServiceControlOptions::default())
    }
}
