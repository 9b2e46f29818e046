//! HTTP surface: webhook ingress and the readiness probe.
//!
//! `POST /approve` accepts GitLab merge-request webhooks, validates the
//! `X-Gitlab-Token` header against the configured token, and triggers a
//! reconciliation per matching rule. `GET /state` is a liveness probe
//! excluded from all policy logic.

use crate::config::Config;
use crate::error::AppError;
use crate::models::{MergeStatus, WebhookEvent};
use crate::services::reconciler::Reconciler;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

/// Shared state for the axum routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub reconciler: Arc<Reconciler>,
}

/// JSON acknowledgement body.
#[derive(Serialize)]
struct Ack {
    msg: &'static str,
}

/// JSON error body.
#[derive(Serialize)]
struct ApiError {
    error: String,
}

/// Wrapper mapping `AppError` onto an HTTP response.
struct ApiErr(AppError);

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AppError::TokenMismatch | AppError::Decode { .. } => StatusCode::BAD_REQUEST,
            AppError::Network { .. } | AppError::GitLabApi { .. } => StatusCode::BAD_GATEWAY,
            AppError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(ApiError {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/state", get(get_state))
        .route("/approve", post(post_approval))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Liveness probe.
async fn get_state() -> &'static str {
    "Service is ready"
}

/// Webhook ingress handler.
///
/// The body is decoded by hand rather than through the `Json` extractor
/// so that malformed payloads are rejected with a logged 400 before any
/// rule matching happens.
async fn post_approval(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "rejecting malformed webhook body");
            return ApiErr(AppError::from(e)).into_response();
        }
    };

    if !event.is_relevant() {
        debug!(
            object_kind = %event.object_kind,
            action = %event.object_attributes.action,
            "ignoring irrelevant webhook event"
        );
        return (StatusCode::OK, Json(Ack { msg: "event ignored" })).into_response();
    }

    let project_id = event.object_attributes.target_project_id;
    let mr_iid = event.object_attributes.iid;
    let header_token = headers
        .get("X-Gitlab-Token")
        .and_then(|v| v.to_str().ok());

    debug!(
        project_id,
        mr_iid,
        action = %event.object_attributes.action,
        user = %event.user.username,
        "webhook event received"
    );

    let mut matched = false;
    for rule in state.config.rules_for_project(project_id) {
        matched = true;

        // An empty configured token means no token is expected.
        let expected = rule
            .expected_token(state.config.webhook_token.as_deref())
            .filter(|t| !t.is_empty());

        match expected {
            Some(expected) => {
                // Absent header and wrong header are the same rejection;
                // the header is an Option and is never assumed present.
                if header_token != Some(expected) {
                    warn!(project_id, mr_iid, "webhook token mismatch");
                    if let Err(e) = state
                        .reconciler
                        .force_status(
                            project_id,
                            mr_iid,
                            MergeStatus::CannotBeMerged,
                            "token mismatch",
                        )
                        .await
                    {
                        return ApiErr(e).into_response();
                    }
                    return ApiErr(AppError::TokenMismatch).into_response();
                }
            }
            None => {
                if header_token.is_some() {
                    warn!(
                        project_id,
                        "webhook carries X-Gitlab-Token but no token is configured to check it"
                    );
                }
            }
        }

        if let Err(e) = state.reconciler.reconcile_one(rule, mr_iid).await {
            // Already logged with identifiers by the reconciler.
            return ApiErr(e).into_response();
        }
    }

    if !matched {
        // Projects without a rule are outside policy scope.
        info!(project_id, mr_iid, "no rule configured for project, acknowledging");
    }

    (StatusCode::OK, Json(Ack { msg: "merge event received" })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApprovalRule;
    use crate::db::MergeStatusWriter;
    use crate::models::ApprovalSnapshot;
    use crate::services::gitlab_client::MergeRequestSource;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    struct NullSource;

    #[async_trait]
    impl MergeRequestSource for NullSource {
        async fn approval_state(
            &self,
            project_id: i64,
            mr_iid: i64,
        ) -> Result<ApprovalSnapshot, AppError> {
            Ok(ApprovalSnapshot {
                project_id,
                mr_iid,
                approved_by: vec![],
            })
        }

        async fn list_open(&self, _project_id: i64) -> Result<Vec<i64>, AppError> {
            Ok(vec![])
        }
    }

    struct NullStore;

    #[async_trait]
    impl MergeStatusWriter for NullStore {
        async fn upsert(
            &self,
            _project_id: i64,
            _mr_iid: i64,
            _status: MergeStatus,
            _reason: Option<&str>,
        ) -> Result<(), AppError> {
            Ok(())
        }
    }

    fn test_router() -> Router {
        let config = Arc::new(Config {
            gitlab_url: "https://gitlab.example.com".into(),
            gitlab_token: "glpat-test".into(),
            webhook_token: None,
            database_url: "postgres://unused".into(),
            projects: vec![ApprovalRule {
                project_id: 42,
                approvers: vec!["alice".into()],
                min_approvals: 1,
                webhook_token: None,
            }],
        });
        let reconciler = Arc::new(Reconciler::new(Arc::new(NullSource), Arc::new(NullStore)));
        router(AppState { config, reconciler })
    }

    #[tokio::test]
    async fn test_state_probe() {
        let response = test_router()
            .oneshot(Request::get("/state").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_malformed_body_is_400() {
        let response = test_router()
            .oneshot(
                Request::post("/approve")
                    .header("content-type", "application/json")
                    .body(Body::from("{ not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
