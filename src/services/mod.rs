//! Service layer: GitLab access, rule evaluation, reconciliation, HTTP.

pub mod evaluator;
pub mod gitlab_client;
pub mod reconciler;
pub mod server;
