//! GitLab API client.
//!
//! Read-only client for GitLab API v4: approval state of one MR, and the
//! list of open MRs for a project. No retries, no caching: a failed call
//! surfaces immediately and the next webhook or sweep retries naturally.

use crate::error::AppError;
use crate::models::ApprovalSnapshot;
use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// GitLab API client configuration.
#[derive(Debug, Clone)]
pub struct GitLabClientConfig {
    /// Base URL of the GitLab instance (e.g., `https://gitlab.com`).
    pub base_url: String,

    /// Private access token for authentication.
    pub token: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

/// Capability interface over the platform's merge-request data.
///
/// The reconciler depends on this trait rather than on a concrete HTTP
/// client so it can be driven with a test double.
#[async_trait]
pub trait MergeRequestSource: Send + Sync {
    /// Fetch the current approval state of one MR.
    async fn approval_state(
        &self,
        project_id: i64,
        mr_iid: i64,
    ) -> Result<ApprovalSnapshot, AppError>;

    /// List the IIDs of all open MRs in a project.
    async fn list_open(&self, project_id: i64) -> Result<Vec<i64>, AppError>;
}

/// GitLab API client.
#[derive(Debug, Clone)]
pub struct GitLabClient {
    client: Client,
    base_url: String,
}

/// Response from the MR approvals endpoint.
#[derive(Debug, Deserialize)]
struct ApprovalsResponse {
    approved_by: Vec<ApprovedBy>,
}

#[derive(Debug, Deserialize)]
struct ApprovedBy {
    user: GitLabUser,
}

#[derive(Debug, Deserialize)]
struct GitLabUser {
    username: String,
}

/// Merge request from the list endpoint; only the IID is of interest.
#[derive(Debug, Deserialize)]
struct OpenMergeRequest {
    iid: i64,
}

impl GitLabClient {
    /// Create a new GitLab client.
    pub fn new(config: GitLabClientConfig) -> Result<Self, AppError> {
        let mut headers = header::HeaderMap::new();

        let token_value = header::HeaderValue::from_str(&config.token)
            .map_err(|_| AppError::config("gitlab_token contains invalid header characters"))?;
        headers.insert("PRIVATE-TOKEN", token_value);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url,
        })
    }

    /// Get the full URL for an API v4 path.
    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v4{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Handle API response errors.
    async fn handle_response<T: DeserializeOwned>(
        response: Response,
        endpoint: &str,
    ) -> Result<T, AppError> {
        let status = response.status();

        if status.is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| AppError::decode(format!("failed to parse {}: {}", endpoint, e)))
        } else if status == StatusCode::UNAUTHORIZED {
            Err(AppError::gitlab_api_full(
                "GitLab token rejected (401)",
                status.as_u16(),
                endpoint,
            ))
        } else {
            let status_code = status.as_u16();
            let body = response.text().await.unwrap_or_default();
            // GitLab returns errors as {"message": "..."} or {"error": "..."}
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| {
                    v.get("message")
                        .or_else(|| v.get("error"))
                        .map(|m| m.as_str().map(String::from).unwrap_or_else(|| m.to_string()))
                })
                .unwrap_or_else(|| format!("request failed ({})", status_code));

            Err(AppError::gitlab_api_full(message, status_code, endpoint))
        }
    }
}

#[async_trait]
impl MergeRequestSource for GitLabClient {
    async fn approval_state(
        &self,
        project_id: i64,
        mr_iid: i64,
    ) -> Result<ApprovalSnapshot, AppError> {
        let endpoint = format!(
            "/projects/{}/merge_requests/{}/approvals",
            project_id, mr_iid
        );
        let response = self.client.get(self.api_url(&endpoint)).send().await?;
        let approvals: ApprovalsResponse = Self::handle_response(response, &endpoint).await?;

        Ok(ApprovalSnapshot {
            project_id,
            mr_iid,
            approved_by: approvals
                .approved_by
                .into_iter()
                .map(|a| a.user.username)
                .collect(),
        })
    }

    async fn list_open(&self, project_id: i64) -> Result<Vec<i64>, AppError> {
        let endpoint = format!("/projects/{}/merge_requests", project_id);
        let response = self
            .client
            .get(self.api_url(&endpoint))
            .query(&[("state", "opened")])
            .send()
            .await?;
        let mrs: Vec<OpenMergeRequest> = Self::handle_response(response, &endpoint).await?;

        Ok(mrs.into_iter().map(|mr| mr.iid).collect())
    }
}
