//! Quota metric costs.

use std::collections::BTreeMap;

use crate::compiler::{CompileWarning, Diagnostics};
use crate::registry::MethodRegistry;
use crate::service::ServiceDescription;

/// Metric name → cost, for one operation. Ordered by metric name.
pub type MetricCosts = BTreeMap<String, i64>;

/// Quota costs per selector. The last declaration of a selector+metric wins.
pub fn compile_quota_costs(
    desc: &ServiceDescription,
    registry: &MethodRegistry,
    diags: &mut Diagnostics,
) -> BTreeMap<String, MetricCosts> {
    let mut costs: BTreeMap<String, MetricCosts> = BTreeMap::new();
    for rule in &desc.quota.metric_rules {
        if !registry.contains(&rule.selector) {
            diags.warn(CompileWarning::UnknownPolicySelector {
                selector: rule.selector.clone(),
                policy: "quota",
            });
            continue;
        }
        let entry = costs.entry(rule.selector.clone()).or_default();
        for (metric, cost) in &rule.metric_costs {
            if entry.insert(metric.clone(), *cost).is_some() {
                diags.warn(CompileWarning::DuplicateQuotaCost {
                    selector: rule.selector.clone(),
                    metric: metric.clone(),
                });
            }
        }
    }
    costs
}

/// Cost of `metric`; zero when undeclared.
pub fn cost_of(costs: &MetricCosts, metric: &str) -> i64 {
    costs.get(metric).copied().unwrap_or(0)
}
