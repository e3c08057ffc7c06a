//! Content comparison deciding whether a scan is a new state.

use crate::types::{CheckStatus, RuleResult, SecurityScanResult};
use serde::{Deserialize, Serialize};

/// How rule results of two scans are paired up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleComparison {
    /// Pair by list position. Producers must emit rules in a stable order.
    Positional,
    /// Pair by rule code, ignoring list order.
    #[default]
    ByRuleCode,
}

impl RuleComparison {
    /// Whether `incoming` differs in content from `prior`.
    ///
    /// Only the overall status and each rule's status and message count;
    /// timestamps never do.
    pub fn is_new_state(self, prior: &SecurityScanResult, incoming: &SecurityScanResult) -> bool {
        if prior.overall_status != incoming.overall_status {
            return true;
        }
        if prior.rule_results.len() != incoming.rule_results.len() {
            return true;
        }

        match self {
            Self::Positional => prior
                .rule_results
                .iter()
                .zip(&incoming.rule_results)
                .any(|(a, b)| a.status != b.status || a.message != b.message),
            Self::ByRuleCode => sorted_by_code(&prior.rule_results)
                .into_iter()
                .zip(sorted_by_code(&incoming.rule_results))
                .any(|(a, b)| a != b),
        }
    }
}

// Repeated codes keep a deterministic order through the status/message tie-break.
fn sorted_by_code(results: &[RuleResult]) -> Vec<(&str, CheckStatus, &str)> {
    let mut sorted: Vec<_> = results
        .iter()
        .map(|r| (r.rule_code.as_str(), r.status, r.message.as_str()))
        .collect();
    sorted.sort();
    sorted
}
