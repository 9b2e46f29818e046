//! merge-gate - approval-policy gate for GitLab merge requests.
//!
//! For each configured project, enforces "at least N approvals from an
//! allow-list of reviewers" and persists the merge-permission decision.
//! Triggered by GitLab webhooks and by a startup sweep over all open MRs.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use config::{ApprovalRule, Config};
pub use error::AppError;
