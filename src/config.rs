//! Service configuration and approval policy rules.
//!
//! Loaded once at startup from a JSON file and shared read-only for the
//! process lifetime. Changing policy requires a restart. Any validation
//! failure here is fatal: the service must not start gating merges with
//! a policy it cannot trust.

use crate::error::AppError;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

/// Approval policy for a single project.
#[derive(Debug, Clone, Deserialize)]
pub struct ApprovalRule {
    /// GitLab project ID the rule applies to.
    pub project_id: i64,

    /// Allow-listed reviewer usernames. Only these can satisfy the rule.
    pub approvers: Vec<String>,

    /// Minimum number of allow-listed approvals required.
    pub min_approvals: u32,

    /// Per-project webhook token; falls back to the global token when unset.
    #[serde(default)]
    pub webhook_token: Option<String>,
}

/// Full service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the GitLab instance (e.g., `https://gitlab.example.com`).
    pub gitlab_url: String,

    /// Private token for GitLab API calls.
    pub gitlab_token: String,

    /// Global expected `X-Gitlab-Token` header value; optional.
    #[serde(default)]
    pub webhook_token: Option<String>,

    /// Postgres connection string.
    pub database_url: String,

    /// Per-project approval rules.
    pub projects: Vec<ApprovalRule>,
}

impl Config {
    /// Load and validate configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Arc<Self>, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| {
            AppError::config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(Arc::new(config))
    }

    /// Validate invariants the rest of the service relies on.
    fn validate(&self) -> Result<(), AppError> {
        if self.gitlab_url.trim().is_empty() {
            return Err(AppError::config("gitlab_url must not be empty"));
        }
        if self.gitlab_token.trim().is_empty() {
            return Err(AppError::config("gitlab_token must not be empty"));
        }
        if self.database_url.trim().is_empty() {
            return Err(AppError::config("database_url must not be empty"));
        }
        for rule in &self.projects {
            if rule.project_id <= 0 {
                return Err(AppError::config(format!(
                    "project_id must be positive, got {}",
                    rule.project_id
                )));
            }
            if rule.approvers.is_empty() {
                return Err(AppError::config(format!(
                    "project {}: approvers must not be empty",
                    rule.project_id
                )));
            }
            if rule.min_approvals == 0 {
                return Err(AppError::config(format!(
                    "project {}: min_approvals must be at least 1",
                    rule.project_id
                )));
            }
        }
        Ok(())
    }

    /// Rules whose project matches the given ID.
    ///
    /// A project may appear in more than one rule; each matching rule is
    /// applied independently.
    pub fn rules_for_project(&self, project_id: i64) -> impl Iterator<Item = &ApprovalRule> {
        self.projects
            .iter()
            .filter(move |r| r.project_id == project_id)
    }
}

impl ApprovalRule {
    /// Expected webhook token for this rule: per-project override first,
    /// then the global token.
    pub fn expected_token<'a>(&'a self, global: Option<&'a str>) -> Option<&'a str> {
        self.webhook_token.as_deref().or(global)
    }
}
