//! Approval rule evaluation.
//!
//! Pure decision logic: given a rule and the usernames that currently
//! approve an MR, produce the merge-permission decision. No I/O, no
//! state; everything observable about a decision is a function of its
//! inputs.

use crate::config::ApprovalRule;
use crate::models::MergeStatus;

/// Outcome of evaluating a rule against an approval snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub status: MergeStatus,
    pub reason: Option<String>,
}

/// Evaluate `rule` against the approvers of a freshly fetched snapshot.
///
/// Each allow-listed approver can satisfy at most one unit of the
/// requirement, no matter how often they appear in `approved_by`.
/// Approvals from users outside the allow-list never count.
pub fn decide(rule: &ApprovalRule, approved_by: &[String]) -> Decision {
    let mut remaining = rule.min_approvals as i64;

    for approver in &rule.approvers {
        if approved_by.iter().any(|name| name == approver) {
            remaining -= 1;
        }
    }

    if remaining <= 0 {
        Decision {
            status: MergeStatus::CanBeMerged,
            reason: None,
        }
    } else {
        Decision {
            status: MergeStatus::CannotBeMerged,
            reason: Some(format!(
                "requires {} more approval(s) from [{}]",
                remaining,
                rule.approvers.join(", ")
            )),
        }
    }
}
