//! Approval snapshot model.

/// Current approval state of one merge request, as fetched from GitLab.
///
/// Built fresh for every reconciliation and discarded after evaluation.
/// Never cached: a stale snapshot must not outlive the decision made
/// from it.
#[derive(Debug, Clone)]
pub struct ApprovalSnapshot {
    /// GitLab project ID.
    pub project_id: i64,

    /// Project-scoped MR number.
    pub mr_iid: i64,

    /// Usernames that currently approve the MR, in API response order.
    /// May contain duplicates or users outside any allow-list; the
    /// evaluator sorts that out.
    pub approved_by: Vec<String>,
}
