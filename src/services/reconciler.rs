//! Approval reconciliation engine.
//!
//! For one (project, MR) pair: fetch the current approval state, evaluate
//! it against the configured rule, persist the decision. The same path
//! serves webhook triggers and the startup sweep.
//!
//! Webhook deliveries can duplicate and race. Reconciliations for the
//! same (project, MR) are serialized on a per-key lock held across the
//! whole fetch→evaluate→store cycle, so the decision written last is the
//! one computed from the last fetched snapshot. Independent keys run
//! concurrently without coordination.

use crate::config::ApprovalRule;
use crate::db::MergeStatusWriter;
use crate::error::AppError;
use crate::models::MergeStatus;
use crate::services::evaluator;
use crate::services::gitlab_client::MergeRequestSource;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Outcome counts of a bulk sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    /// MRs reconciled successfully.
    pub reconciled: usize,
    /// MRs whose reconciliation failed and was skipped.
    pub failed: usize,
    /// Projects whose open-MR listing failed entirely.
    pub projects_skipped: usize,
}

/// Drives fetch → evaluate → store for merge requests.
pub struct Reconciler {
    source: Arc<dyn MergeRequestSource>,
    store: Arc<dyn MergeStatusWriter>,
    /// Per-(project, MR) locks serializing concurrent reconciliations.
    locks: Mutex<HashMap<(i64, i64), Arc<Mutex<()>>>>,
    shutdown: CancellationToken,
}

impl Reconciler {
    pub fn new(source: Arc<dyn MergeRequestSource>, store: Arc<dyn MergeStatusWriter>) -> Self {
        Self {
            source,
            store,
            locks: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Refuse new reconciliations. In-flight ones run to completion.
    pub fn begin_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Lock guarding one (project, MR) key.
    async fn key_lock(&self, project_id: i64, mr_iid: i64) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry((project_id, mr_iid))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Reconcile one merge request against one rule.
    ///
    /// Fetches a fresh approval snapshot, evaluates it, and stores the
    /// decision. Any stage failure aborts the operation and is returned
    /// to the caller; nothing is written on a failed fetch.
    pub async fn reconcile_one(&self, rule: &ApprovalRule, mr_iid: i64) -> Result<(), AppError> {
        if self.shutdown.is_cancelled() {
            return Err(AppError::Unavailable);
        }

        let lock = self.key_lock(rule.project_id, mr_iid).await;
        let _guard = lock.lock().await;

        let snapshot = self
            .source
            .approval_state(rule.project_id, mr_iid)
            .await
            .map_err(|e| {
                error!(
                    project_id = rule.project_id,
                    mr_iid, error = %e,
                    "failed to fetch approval state"
                );
                e
            })?;

        let decision = evaluator::decide(rule, &snapshot.approved_by);
        info!(
            project_id = rule.project_id,
            mr_iid,
            status = %decision.status,
            approvals = snapshot.approved_by.len(),
            "evaluated approval rule"
        );

        self.store
            .upsert(
                rule.project_id,
                mr_iid,
                decision.status,
                decision.reason.as_deref(),
            )
            .await
            .map_err(|e| {
                error!(
                    project_id = rule.project_id,
                    mr_iid, error = %e,
                    "failed to store merge status"
                );
                e
            })
    }

    /// Store a decision without consulting GitLab.
    ///
    /// Used when a webhook fails token validation: the MR is forced to
    /// `CannotBeMerged` and no platform call is made.
    pub async fn force_status(
        &self,
        project_id: i64,
        mr_iid: i64,
        status: MergeStatus,
        reason: &str,
    ) -> Result<(), AppError> {
        let lock = self.key_lock(project_id, mr_iid).await;
        let _guard = lock.lock().await;

        self.store
            .upsert(project_id, mr_iid, status, Some(reason))
            .await
            .map_err(|e| {
                error!(project_id, mr_iid, error = %e, "failed to force merge status");
                e
            })
    }

    /// Reconcile every open MR of every configured project.
    ///
    /// Runs once at startup, before webhook traffic is accepted, so the
    /// stored state catches up with approvals missed during downtime.
    /// Failures are isolated: a project whose listing fails is skipped,
    /// an MR whose reconciliation fails does not stop the rest.
    pub async fn reconcile_all_open(&self, rules: &[ApprovalRule]) -> SweepSummary {
        let mut summary = SweepSummary::default();

        for rule in rules {
            let open = match self.source.list_open(rule.project_id).await {
                Ok(iids) => iids,
                Err(e) => {
                    warn!(
                        project_id = rule.project_id,
                        error = %e,
                        "listing open merge requests failed, skipping project"
                    );
                    summary.projects_skipped += 1;
                    continue;
                }
            };

            for mr_iid in open {
                match self.reconcile_one(rule, mr_iid).await {
                    Ok(()) => summary.reconciled += 1,
                    // Already logged with identifiers inside reconcile_one.
                    Err(_) => summary.failed += 1,
                }
            }
        }

        info!(
            reconciled = summary.reconciled,
            failed = summary.failed,
            projects_skipped = summary.projects_skipped,
            "startup sweep finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ApprovalSnapshot;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Programmable in-memory platform double.
    struct FakeSource {
        /// approved_by per (project, mr); missing key fails the fetch.
        approvals: HashMap<(i64, i64), Vec<String>>,
        /// open MRs per project; missing key fails the listing.
        open: HashMap<i64, Vec<i64>>,
        fetches: AtomicUsize,
    }

    impl FakeSource {
        fn new() -> Self {
            Self {
                approvals: HashMap::new(),
                open: HashMap::new(),
                fetches: AtomicUsize::new(0),
            }
        }

        fn with_approvals(mut self, project_id: i64, mr_iid: i64, names: &[&str]) -> Self {
            self.approvals.insert(
                (project_id, mr_iid),
                names.iter().map(|s| s.to_string()).collect(),
            );
            self
        }

        fn with_open(mut self, project_id: i64, iids: &[i64]) -> Self {
            self.open.insert(project_id, iids.to_vec());
            self
        }
    }

    #[async_trait]
    impl MergeRequestSource for FakeSource {
        async fn approval_state(
            &self,
            project_id: i64,
            mr_iid: i64,
        ) -> Result<ApprovalSnapshot, AppError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.approvals
                .get(&(project_id, mr_iid))
                .map(|approved_by| ApprovalSnapshot {
                    project_id,
                    mr_iid,
                    approved_by: approved_by.clone(),
                })
                .ok_or_else(|| AppError::network("connection refused"))
        }

        async fn list_open(&self, project_id: i64) -> Result<Vec<i64>, AppError> {
            self.open
                .get(&project_id)
                .cloned()
                .ok_or_else(|| AppError::network("connection refused"))
        }
    }

    /// In-memory status store capturing every write.
    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<HashMap<(i64, i64), (MergeStatus, Option<String>)>>,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl MergeStatusWriter for MemoryStore {
        async fn upsert(
            &self,
            project_id: i64,
            mr_iid: i64,
            status: MergeStatus,
            reason: Option<&str>,
        ) -> Result<(), AppError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.rows
                .lock()
                .await
                .insert((project_id, mr_iid), (status, reason.map(String::from)));
            Ok(())
        }
    }

    fn rule(project_id: i64, approvers: &[&str], min: u32) -> ApprovalRule {
        ApprovalRule {
            project_id,
            approvers: approvers.iter().map(|s| s.to_string()).collect(),
            min_approvals: min,
            webhook_token: None,
        }
    }

    fn reconciler(source: FakeSource) -> (Reconciler, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        (
            Reconciler::new(Arc::new(source), store.clone()),
            store,
        )
    }

    #[tokio::test]
    async fn test_reconcile_one_stores_decision() {
        let source = FakeSource::new().with_approvals(42, 7, &["alice", "bob"]);
        let (rec, store) = reconciler(source);

        rec.reconcile_one(&rule(42, &["alice", "bob"], 2), 7)
            .await
            .unwrap();

        let rows = store.rows.lock().await;
        let (status, reason) = rows.get(&(42, 7)).unwrap();
        assert_eq!(*status, MergeStatus::CanBeMerged);
        assert_eq!(*reason, None);
    }

    #[tokio::test]
    async fn test_reconcile_one_is_idempotent() {
        // Two runs over an unchanged snapshot store the same decision.
        let source = FakeSource::new().with_approvals(42, 7, &["alice"]);
        let (rec, store) = reconciler(source);
        let r = rule(42, &["alice", "bob"], 2);

        rec.reconcile_one(&r, 7).await.unwrap();
        let first = store.rows.lock().await.get(&(42, 7)).cloned().unwrap();
        rec.reconcile_one(&r, 7).await.unwrap();
        let second = store.rows.lock().await.get(&(42, 7)).cloned().unwrap();

        assert_eq!(first, second);
        assert_eq!(first.0, MergeStatus::CannotBeMerged);
    }

    #[tokio::test]
    async fn test_fetch_failure_writes_nothing() {
        // Scenario E: the fetch fails, so no decision may be stored.
        let (rec, store) = reconciler(FakeSource::new());

        let err = rec.reconcile_one(&rule(42, &["alice"], 1), 7).await.unwrap_err();
        assert!(matches!(err, AppError::Network { .. }));
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_force_status_skips_fetch() {
        let source = FakeSource::new();
        let (rec, store) = reconciler(source);

        rec.force_status(42, 7, MergeStatus::CannotBeMerged, "token mismatch")
            .await
            .unwrap();

        let rows = store.rows.lock().await;
        let (status, reason) = rows.get(&(42, 7)).unwrap();
        assert_eq!(*status, MergeStatus::CannotBeMerged);
        assert_eq!(reason.as_deref(), Some("token mismatch"));
    }

    #[tokio::test]
    async fn test_shutdown_refuses_new_work() {
        let source = FakeSource::new().with_approvals(42, 7, &["alice"]);
        let (rec, store) = reconciler(source);

        rec.begin_shutdown();
        let err = rec.reconcile_one(&rule(42, &["alice"], 1), 7).await.unwrap_err();
        assert!(matches!(err, AppError::Unavailable));
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_sweep_isolates_failures() {
        // Project 1 lists fine but MR 6 fails its fetch; project 2 fails
        // to list at all; project 3 is healthy. The sweep must reach
        // everything reachable.
        let source = FakeSource::new()
            .with_open(1, &[5, 6])
            .with_approvals(1, 5, &["alice"])
            .with_open(3, &[9])
            .with_approvals(3, 9, &[]);
        let (rec, store) = reconciler(source);

        let rules = vec![
            rule(1, &["alice"], 1),
            rule(2, &["bob"], 1),
            rule(3, &["carol"], 1),
        ];
        let summary = rec.reconcile_all_open(&rules).await;

        assert_eq!(summary.reconciled, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.projects_skipped, 1);

        let rows = store.rows.lock().await;
        assert_eq!(rows.get(&(1, 5)).unwrap().0, MergeStatus::CanBeMerged);
        assert!(rows.get(&(1, 6)).is_none());
        assert_eq!(rows.get(&(3, 9)).unwrap().0, MergeStatus::CannotBeMerged);
    }

    #[tokio::test]
    async fn test_concurrent_reconciliations_serialize_per_key() {
        let source = FakeSource::new().with_approvals(42, 7, &["alice", "bob"]);
        let (rec, store) = reconciler(source);
        let rec = Arc::new(rec);
        let r = rule(42, &["alice", "bob"], 2);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let rec = rec.clone();
            let r = r.clone();
            handles.push(tokio::spawn(async move { rec.reconcile_one(&r, 7).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // All eight ran; the stored row reflects the (identical) snapshot.
        assert_eq!(store.writes.load(Ordering::SeqCst), 8);
        let rows = store.rows.lock().await;
        assert_eq!(rows.get(&(42, 7)).unwrap().0, MergeStatus::CanBeMerged);
    }
}
