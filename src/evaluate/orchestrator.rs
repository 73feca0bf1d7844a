//! `BatchJobOrchestrator` — runs work items through one or two models, one
//! item at a time, isolating failures per item.
//!
//! # Flow per item
//!
//! ```text
//! cancelled? ──yes──▶ stop, report cancelled
//!     │ no
//!     ▼
//! append Pending ─▶ progress "processing i/n: label" ─▶ Processing
//!     │
//!     ├─ single model ──────────────▶ infer(A)
//!     ├─ compare, bucket/recording ─▶ compare(A, B)
//!     └─ compare, local file ───────▶ infer(A), infer(B), Comparison::between
//!     │
//!     ├─ Ok  ─▶ Success
//!     └─ Err ─▶ Error(message), continue with the next item
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::SessionStore;
use crate::lock_or_recover;
use crate::remote::{Comparison, InferenceResult, ModelSelector, RemoteError, RemoteJobClient};

use super::types::{
    BatchReport, BatchRequest, BatchResult, BatchStatus, BatchView, SharedBatch, WorkItem,
};

// ---------------------------------------------------------------------------
// BatchError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// Rejected before any call was made.
    #[error("invalid batch: {0}")]
    InvalidConfiguration(String),

    #[error("a batch is already running")]
    Busy,
}

// ---------------------------------------------------------------------------
// CancelHandle
// ---------------------------------------------------------------------------

/// Cooperative cancellation for the running batch.  Checked between items;
/// the item in flight always finishes.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// BatchJobOrchestrator
// ---------------------------------------------------------------------------

type ItemOutcome = (InferenceResult, Option<InferenceResult>, Option<Comparison>);

pub struct BatchJobOrchestrator {
    client: Arc<dyn RemoteJobClient>,
    shared: SharedBatch,
    updates: Option<mpsc::Sender<BatchResult>>,
    cancel: CancelHandle,
    session: Mutex<SessionStore>,
}

/// Message recorded on an entry whose run was dropped mid-item.
const ABANDONED: &str = "cancelled";

/// Clears `running` and the progress string however `run` exits.  If the
/// `run` future was dropped mid-item, the entries it left unfinished are
/// marked failed.
struct RunGuard<'a> {
    shared: &'a SharedBatch,
    ids: HashSet<&'a str>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut view = lock_or_recover(self.shared);
        view.running = false;
        view.progress = None;
        for result in view.results.iter_mut() {
            if self.ids.contains(result.id.as_str()) && !result.status.is_terminal() {
                log::warn!("batch: {} abandoned mid-run", result.label);
                result.status = BatchStatus::Error;
                result.error = Some(ABANDONED.to_string());
            }
        }
    }
}

impl BatchJobOrchestrator {
    pub fn new(client: Arc<dyn RemoteJobClient>, shared: SharedBatch) -> Self {
        Self {
            client,
            shared,
            updates: None,
            cancel: CancelHandle::default(),
            session: Mutex::new(SessionStore::default()),
        }
    }

    /// Remember the models of every accepted run in `session`.
    pub fn with_session(mut self, session: SessionStore) -> Self {
        self.session = Mutex::new(session);
        self
    }

    /// Also send every result state change to `tx`, in order.
    pub fn with_updates(mut self, tx: mpsc::Sender<BatchResult>) -> Self {
        self.updates = Some(tx);
        self
    }

    /// Handle for cancelling the current run.  A cancel issued while no run
    /// is active is discarded when the next run starts.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Copy of the session, including the models of the last accepted run.
    pub fn session(&self) -> SessionStore {
        lock_or_recover(&self.session).clone()
    }

    /// Run every item of `request` in order.
    ///
    /// Item failures never abort the batch; they are recorded on the item and
    /// counted in the returned report.  Dropping the future mid-item leaves
    /// that item as `Error("cancelled")`.
    pub async fn run(&self, request: BatchRequest) -> Result<BatchReport, BatchError> {
        validate(&request)?;
        self.claim(&request.items)?;
        let _guard = RunGuard {
            shared: &self.shared,
            ids: request.items.iter().map(|item| item.id.as_str()).collect(),
        };
        self.cancel.reset();

        let model_b = request.comparing();
        lock_or_recover(&self.session).remember_models(&request.model_a, model_b);
        let total = request.items.len();
        let mut results = Vec::with_capacity(total);
        let mut cancelled = false;

        log::info!(
            "batch: starting {total} item(s) with {}{}",
            request.model_a.label(),
            model_b.map(|b| format!(" vs {}", b.label())).unwrap_or_default()
        );

        for (i, item) in request.items.iter().enumerate() {
            if self.cancel.is_cancelled() {
                log::info!("batch: cancelled after {i} of {total} item(s)");
                cancelled = true;
                break;
            }

            let mut result = BatchResult::pending(item);
            let progress = format!("processing {}/{}: {}", i + 1, total, result.label);
            log::debug!("batch: {progress}");
            {
                let mut view = lock_or_recover(&self.shared);
                view.results.push(result.clone());
                view.progress = Some(progress);
            }
            self.publish(&result).await;

            result.status = BatchStatus::Processing;
            self.update(&result).await;

            match self.process(item, &request.model_a, model_b).await {
                Ok((a, b, comparison)) => {
                    result.status = BatchStatus::Success;
                    result.result_a = Some(a);
                    result.result_b = b;
                    result.comparison = comparison;
                }
                Err(e) => {
                    log::warn!("batch: {} failed: {e}", result.label);
                    result.status = BatchStatus::Error;
                    result.error = Some(e.to_string());
                }
            }
            self.update(&result).await;
            results.push(result);
        }

        let failed = results
            .iter()
            .filter(|r| r.status == BatchStatus::Error)
            .count();
        let succeeded = results.len() - failed;

        if total == 1 {
            if let Some(only) = results.first() {
                lock_or_recover(&self.shared).last_single = Some(only.clone());
            }
        }
        log::info!("batch: finished, {failed} of {} failed", results.len());

        Ok(BatchReport {
            results,
            succeeded,
            failed,
            cancelled,
        })
    }

    /// Delete one result.  Returns whether anything was removed; unknown ids
    /// are ignored.
    pub fn remove(&self, id: &str) -> bool {
        let mut view = lock_or_recover(&self.shared);
        let before = view.results.len();
        view.results.retain(|r| r.id != id);
        before != view.results.len()
    }

    /// Drop every result.  Refused while a run is active.
    pub fn clear(&self) -> Result<(), BatchError> {
        let mut view = lock_or_recover(&self.shared);
        if view.running {
            return Err(BatchError::Busy);
        }
        view.results.clear();
        view.last_single = None;
        Ok(())
    }

    /// Copy of the current view.
    pub fn view(&self) -> BatchView {
        lock_or_recover(&self.shared).clone()
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Mark the orchestrator running, unless busy or an item id is taken.
    fn claim(&self, items: &[WorkItem]) -> Result<(), BatchError> {
        let mut view = lock_or_recover(&self.shared);
        if view.running {
            return Err(BatchError::Busy);
        }
        if let Some(taken) = items
            .iter()
            .find(|item| view.results.iter().any(|r| r.id == item.id))
        {
            return Err(BatchError::InvalidConfiguration(format!(
                "'{}' already has a result; remove it before resubmitting",
                taken.id
            )));
        }
        view.running = true;
        Ok(())
    }

    async fn process(
        &self,
        item: &WorkItem,
        model_a: &ModelSelector,
        model_b: Option<&ModelSelector>,
    ) -> Result<ItemOutcome, RemoteError> {
        let Some(model_b) = model_b else {
            let a = self.client.infer(model_a, &item.audio).await?;
            return Ok((a, None, None));
        };

        if item.audio.supports_joint_compare() {
            let outcome = self.client.compare(model_a, model_b, &item.audio).await?;
            return Ok((
                outcome.model_a,
                Some(outcome.model_b),
                Some(outcome.comparison),
            ));
        }

        let a = self.client.infer(model_a, &item.audio).await?;
        let b = self.client.infer(model_b, &item.audio).await?;
        let comparison = Comparison::between(&a, &b);
        Ok((a, Some(b), Some(comparison)))
    }

    /// Write `result` into the shared list and publish it.  Results removed
    /// while in flight stay removed.
    async fn update(&self, result: &BatchResult) {
        let present = {
            let mut view = lock_or_recover(&self.shared);
            match view.find_mut(&result.id) {
                Some(slot) => {
                    *slot = result.clone();
                    true
                }
                None => false,
            }
        };

        if present {
            self.publish(result).await;
        } else {
            log::debug!("batch: {} was removed, dropping update", result.id);
        }
    }

    async fn publish(&self, result: &BatchResult) {
        if let Some(tx) = &self.updates {
            // a gone receiver just means nobody is watching
            let _ = tx.send(result.clone()).await;
        }
    }
}

fn validate(request: &BatchRequest) -> Result<(), BatchError> {
    if request.items.is_empty() {
        return Err(BatchError::InvalidConfiguration("no items to evaluate".into()));
    }
    if !request.model_a.is_configured() {
        return Err(BatchError::InvalidConfiguration("model A is not selected".into()));
    }

    let mut seen = HashSet::new();
    for item in &request.items {
        if !seen.insert(item.id.as_str()) {
            return Err(BatchError::InvalidConfiguration(format!(
                "duplicate item '{}'",
                item.id
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::types::new_shared_batch;
    use crate::remote::mock::result;
    use crate::remote::{AudioSource, MockJobClient};
    use tokio::sync::Notify;

    fn orchestrator(mock: MockJobClient) -> (BatchJobOrchestrator, Arc<MockJobClient>) {
        let mock = Arc::new(mock);
        let orc = BatchJobOrchestrator::new(mock.clone(), new_shared_batch());
        (orc, mock)
    }

    fn bucket_items(names: &[&str]) -> Vec<WorkItem> {
        names
            .iter()
            .map(|n| WorkItem::from_bucket("voices", &format!("test/{n}.wav")))
            .collect()
    }

    fn model_a() -> ModelSelector {
        ModelSelector::custom("run1", Some("ct2"))
    }

    /// Fails for audio whose display name starts with `fail_prefix`.
    fn failing_on(fail_prefix: &'static str) -> MockJobClient {
        MockJobClient::with_infer(move |_, audio| {
            if audio.display_name().starts_with(fail_prefix) {
                Err(RemoteError::Request("connection reset by peer".into()))
            } else {
                Ok(result("ok", 0.85, 120))
            }
        })
    }

    fn statuses(report: &BatchReport) -> Vec<BatchStatus> {
        report.results.iter().map(|r| r.status).collect()
    }

    // ---- ordering and failure isolation ---

    #[tokio::test]
    async fn one_result_per_item_in_order() {
        let (orc, _mock) = orchestrator(MockJobClient::ok("สวัสดี", 0.9));
        let report = orc
            .run(BatchRequest::single_model(bucket_items(&["a", "b", "c", "d"]), model_a()))
            .await
            .unwrap();

        let ids: Vec<_> = report.results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["test/a.wav", "test/b.wav", "test/c.wav", "test/d.wav"]);
        assert_eq!(orc.view().results, report.results);
        assert_eq!(report.succeeded, 4);
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn middle_failure_does_not_abort_batch() {
        let (orc, mock) = orchestrator(failing_on("b"));
        let report = orc
            .run(BatchRequest::single_model(bucket_items(&["a", "b", "c"]), model_a()))
            .await
            .unwrap();

        assert_eq!(
            statuses(&report),
            vec![BatchStatus::Success, BatchStatus::Error, BatchStatus::Success]
        );
        assert_eq!(report.failed, 1);
        assert_eq!(report.succeeded, 2);
        assert_eq!(mock.count("infer"), 3);
    }

    #[tokio::test]
    async fn network_error_then_success() {
        let (orc, _mock) = orchestrator(failing_on("first"));
        let report = orc
            .run(BatchRequest::single_model(bucket_items(&["first", "second"]), model_a()))
            .await
            .unwrap();

        let first = &report.results[0];
        assert_eq!(first.status, BatchStatus::Error);
        assert!(first
            .error
            .as_deref()
            .is_some_and(|e| e.contains("connection reset")));
        assert!(first.result_a.is_none());

        let second = &report.results[1];
        assert_eq!(second.status, BatchStatus::Success);
        assert_eq!(second.result_a.as_ref().map(|r| r.confidence), Some(0.85));
        assert!(second.error.is_none());
    }

    // ---- validation ---

    #[tokio::test]
    async fn empty_batch_is_rejected_without_calls() {
        let (orc, mock) = orchestrator(MockJobClient::ok("x", 0.5));
        let err = orc
            .run(BatchRequest::single_model(vec![], model_a()))
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::InvalidConfiguration(_)));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn unselected_model_is_rejected_without_calls() {
        let (orc, mock) = orchestrator(MockJobClient::ok("x", 0.5));
        let err = orc
            .run(BatchRequest::single_model(
                bucket_items(&["a"]),
                ModelSelector::custom("", None),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::InvalidConfiguration(_)));
        assert!(mock.calls().is_empty());
        assert!(orc.view().results.is_empty());
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let (orc, mock) = orchestrator(MockJobClient::ok("x", 0.5));
        let err = orc
            .run(BatchRequest::single_model(bucket_items(&["a", "a"]), model_a()))
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::InvalidConfiguration(_)));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn resubmission_requires_remove() {
        let (orc, _mock) = orchestrator(failing_on("a"));
        orc.run(BatchRequest::single_model(bucket_items(&["a"]), model_a()))
            .await
            .unwrap();

        let again = orc
            .run(BatchRequest::single_model(bucket_items(&["a"]), model_a()))
            .await;
        assert!(matches!(again, Err(BatchError::InvalidConfiguration(_))));

        assert!(orc.remove("test/a.wav"));
        let report = orc
            .run(BatchRequest::single_model(bucket_items(&["a"]), model_a()))
            .await
            .unwrap();
        assert_eq!(report.results.len(), 1);
        assert_eq!(orc.view().results.len(), 1);
    }

    // ---- remove / clear ---

    #[tokio::test]
    async fn remove_unknown_id_is_a_no_op() {
        let (orc, mock) = orchestrator(MockJobClient::ok("x", 0.5));
        orc.run(BatchRequest::single_model(bucket_items(&["a", "b"]), model_a()))
            .await
            .unwrap();
        let calls = mock.calls().len();

        assert!(!orc.remove("nope"));
        assert!(!orc.remove("nope"));
        assert_eq!(orc.view().results.len(), 2);
        assert_eq!(mock.calls().len(), calls);

        assert!(orc.remove("test/a.wav"));
        let ids: Vec<_> = orc.view().results.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["test/b.wav"]);
    }

    #[tokio::test]
    async fn runs_append_and_clear_empties() {
        let (orc, _mock) = orchestrator(MockJobClient::ok("x", 0.5));
        orc.run(BatchRequest::single_model(bucket_items(&["a"]), model_a()))
            .await
            .unwrap();
        orc.run(BatchRequest::single_model(bucket_items(&["b", "c"]), model_a()))
            .await
            .unwrap();
        assert_eq!(orc.view().results.len(), 3);

        orc.clear().unwrap();
        let view = orc.view();
        assert!(view.results.is_empty());
        assert!(view.last_single.is_none());
    }

    // ---- single-item convenience ---

    #[tokio::test]
    async fn last_single_only_for_one_item_runs() {
        let (orc, _mock) = orchestrator(MockJobClient::ok("x", 0.5));
        orc.run(BatchRequest::single_model(bucket_items(&["a", "b"]), model_a()))
            .await
            .unwrap();
        assert!(orc.view().last_single.is_none());

        orc.run(BatchRequest::single_model(bucket_items(&["solo"]), model_a()))
            .await
            .unwrap();
        let single = orc.view().last_single.unwrap();
        assert_eq!(single.id, "test/solo.wav");
        assert_eq!(single.status, BatchStatus::Success);
    }

    // ---- compare mode ---

    fn by_model() -> MockJobClient {
        MockJobClient::with_infer(|model, _| match model.name() {
            "run1" => Ok(result("a", 0.9, 200)),
            _ => Ok(result("b", 0.7, 300)),
        })
    }

    #[tokio::test]
    async fn bucket_items_use_joint_compare() {
        let (orc, mock) = orchestrator(by_model());
        let report = orc
            .run(BatchRequest::compare(
                bucket_items(&["a"]),
                model_a(),
                ModelSelector::official("openai/whisper-large-v3"),
            ))
            .await
            .unwrap();

        assert_eq!(mock.count("compare"), 1);
        assert_eq!(mock.count("infer"), 0);
        let r = &report.results[0];
        assert_eq!(r.result_b.as_ref().unwrap().transcription, "b");
        let cmp = r.comparison.unwrap();
        assert!((cmp.confidence_diff - 0.2).abs() < 1e-9);
        assert_eq!(cmp.speed_ratio, 1.5);
    }

    #[tokio::test]
    async fn joint_compare_keeps_service_comparison() {
        let mock = by_model().compare_with(|_, _, _| {
            Ok(crate::remote::CompareOutcome {
                model_a: result("a", 0.8, 100),
                model_b: result("b", 0.6, 400),
                comparison: Comparison {
                    speed_ratio: 4.0,
                    confidence_diff: 0.2,
                },
            })
        });
        let (orc, _mock) = orchestrator(mock);
        let report = orc
            .run(BatchRequest::compare(
                vec![WorkItem::new("rec", AudioSource::Recorded(vec![0; 16]))],
                model_a(),
                ModelSelector::official("openai/whisper-small"),
            ))
            .await
            .unwrap();

        let r = &report.results[0];
        assert_eq!(r.result_a.as_ref().unwrap().confidence, 0.8);
        assert_eq!(r.comparison.unwrap().speed_ratio, 4.0);
    }

    #[tokio::test]
    async fn local_files_compare_with_two_inferences() {
        let (orc, mock) = orchestrator(by_model());
        let item = WorkItem::new("clip", AudioSource::LocalFile("/tmp/clip.wav".into()));
        let report = orc
            .run(BatchRequest::compare(
                vec![item],
                model_a(),
                ModelSelector::official("openai/whisper-large-v3"),
            ))
            .await
            .unwrap();

        assert_eq!(mock.count("compare"), 0);
        assert_eq!(mock.count("infer"), 2);
        let cmp = report.results[0].comparison.unwrap();
        assert!((cmp.confidence_diff - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn compare_failure_on_b_fails_the_item() {
        let mock = MockJobClient::with_infer(|model, _| match model.name() {
            "run1" => Ok(result("a", 0.9, 200)),
            _ => Err(RemoteError::Status {
                status: 500,
                detail: "model not found".into(),
            }),
        });
        let (orc, _mock) = orchestrator(mock);
        let item = WorkItem::new("clip", AudioSource::LocalFile("/tmp/clip.wav".into()));
        let report = orc
            .run(BatchRequest::compare(vec![item], model_a(), ModelSelector::official("missing")))
            .await
            .unwrap();

        assert_eq!(report.results[0].status, BatchStatus::Error);
        assert!(report.results[0].result_a.is_none());
    }

    #[tokio::test]
    async fn compare_mode_without_model_b_runs_single() {
        let (orc, mock) = orchestrator(by_model());
        let request = BatchRequest {
            items: bucket_items(&["a"]),
            model_a: model_a(),
            model_b: None,
            compare_mode: true,
        };
        let report = orc.run(request).await.unwrap();
        assert_eq!(mock.count("infer"), 1);
        assert!(report.results[0].result_b.is_none());
        assert!(report.results[0].comparison.is_none());
    }

    // ---- updates stream ---

    #[tokio::test]
    async fn updates_arrive_in_item_order() {
        let (tx, mut rx) = mpsc::channel(64);
        let mock = Arc::new(failing_on("b"));
        let orc = BatchJobOrchestrator::new(mock, new_shared_batch()).with_updates(tx);

        orc.run(BatchRequest::single_model(bucket_items(&["a", "b"]), model_a()))
            .await
            .unwrap();
        drop(orc);

        let mut seen = Vec::new();
        while let Some(r) = rx.recv().await {
            seen.push((r.label, r.status));
        }
        assert_eq!(
            seen,
            vec![
                ("a.wav".to_string(), BatchStatus::Pending),
                ("a.wav".to_string(), BatchStatus::Processing),
                ("a.wav".to_string(), BatchStatus::Success),
                ("b.wav".to_string(), BatchStatus::Pending),
                ("b.wav".to_string(), BatchStatus::Processing),
                ("b.wav".to_string(), BatchStatus::Error),
            ]
        );
    }

    // ---- cancellation ---

    #[tokio::test]
    async fn cancel_stops_between_items() {
        let cancel = CancelHandle::default();
        let trigger = cancel.clone();
        let mock = Arc::new(MockJobClient::with_infer(move |_, _| {
            trigger.cancel();
            Ok(result("x", 0.5, 10))
        }));
        let orc = BatchJobOrchestrator {
            cancel,
            ..BatchJobOrchestrator::new(mock.clone(), new_shared_batch())
        };

        let report = orc
            .run(BatchRequest::single_model(bucket_items(&["a", "b", "c"]), model_a()))
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(statuses(&report), vec![BatchStatus::Success]);
        assert_eq!(orc.view().results.len(), 1);
        assert_eq!(mock.count("infer"), 1);
    }

    #[tokio::test]
    async fn stale_cancel_does_not_affect_next_run() {
        let (orc, _mock) = orchestrator(MockJobClient::ok("x", 0.5));
        orc.cancel_handle().cancel();
        let report = orc
            .run(BatchRequest::single_model(bucket_items(&["a", "b"]), model_a()))
            .await
            .unwrap();
        assert!(!report.cancelled);
        assert_eq!(report.results.len(), 2);
    }

    // ---- concurrency ---

    async fn wait_for_calls(mock: &MockJobClient, prefix: &str, n: usize) {
        while mock.count(prefix) < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn second_run_is_busy_and_progress_is_visible() {
        let gate = Arc::new(Notify::new());
        let mock = Arc::new(MockJobClient::ok("x", 0.5).gated(gate.clone()));
        let orc = Arc::new(BatchJobOrchestrator::new(mock.clone(), new_shared_batch()));

        let first = {
            let orc = Arc::clone(&orc);
            tokio::spawn(async move {
                orc.run(BatchRequest::single_model(bucket_items(&["a"]), model_a()))
                    .await
            })
        };
        wait_for_calls(&mock, "infer", 1).await;

        let view = orc.view();
        assert!(view.running);
        assert_eq!(view.progress.as_deref(), Some("processing 1/1: a.wav"));
        assert_eq!(view.results[0].status, BatchStatus::Processing);

        let second = orc
            .run(BatchRequest::single_model(bucket_items(&["b"]), model_a()))
            .await;
        assert_eq!(second.unwrap_err(), BatchError::Busy);
        assert_eq!(orc.clear(), Err(BatchError::Busy));

        gate.notify_one();
        first.await.unwrap().unwrap();

        let view = orc.view();
        assert!(!view.running);
        assert!(view.progress.is_none());
    }

    #[tokio::test]
    async fn removed_in_flight_result_stays_removed() {
        let gate = Arc::new(Notify::new());
        let mock = Arc::new(MockJobClient::ok("x", 0.5).gated(gate.clone()));
        let orc = Arc::new(BatchJobOrchestrator::new(mock.clone(), new_shared_batch()));

        let run = {
            let orc = Arc::clone(&orc);
            tokio::spawn(async move {
                orc.run(BatchRequest::single_model(bucket_items(&["a", "b"]), model_a()))
                    .await
            })
        };
        wait_for_calls(&mock, "infer", 1).await;
        assert!(orc.remove("test/a.wav"));

        gate.notify_one();
        wait_for_calls(&mock, "infer", 2).await;
        gate.notify_one();
        let report = run.await.unwrap().unwrap();

        assert_eq!(report.results.len(), 2);
        let ids: Vec<_> = orc.view().results.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["test/b.wav"]);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_run_finishes_in_flight_entry() {
        let gate = Arc::new(Notify::new());
        let mock = Arc::new(MockJobClient::ok("x", 0.5).gated(gate.clone()));
        let orc = BatchJobOrchestrator::new(mock.clone(), new_shared_batch());

        let outcome = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            orc.run(BatchRequest::single_model(bucket_items(&["a", "b"]), model_a())),
        )
        .await;
        assert!(outcome.is_err());

        let view = orc.view();
        assert!(!view.running);
        assert!(view.progress.is_none());
        assert_eq!(view.results.len(), 1);
        assert_eq!(view.results[0].status, BatchStatus::Error);
        assert_eq!(view.results[0].error.as_deref(), Some("cancelled"));

        // finished like any failed entry: remove, then resubmit
        assert!(orc.remove("test/a.wav"));
        gate.notify_one();
        let report = orc
            .run(BatchRequest::single_model(bucket_items(&["a"]), model_a()))
            .await
            .unwrap();
        assert_eq!(statuses(&report), vec![BatchStatus::Success]);
    }

    // ---- session ---

    #[tokio::test]
    async fn accepted_run_remembers_models() {
        let mock = Arc::new(MockJobClient::ok("x", 0.5));
        let orc = BatchJobOrchestrator::new(mock, new_shared_batch())
            .with_session(SessionStore {
                last_bucket: Some("voices".into()),
                ..SessionStore::default()
            });
        let b = ModelSelector::official("large-v3");

        orc.run(BatchRequest::compare(bucket_items(&["a"]), model_a(), b.clone()))
            .await
            .unwrap();

        let session = orc.session();
        assert_eq!(session.last_model_a, Some(model_a()));
        assert_eq!(session.last_model_b, Some(b));
        assert_eq!(session.last_bucket.as_deref(), Some("voices"));
    }

    #[tokio::test]
    async fn rejected_run_remembers_nothing() {
        let (orc, _mock) = orchestrator(MockJobClient::ok("x", 0.5));
        let err = orc
            .run(BatchRequest::single_model(Vec::new(), model_a()))
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::InvalidConfiguration(_)));
        assert_eq!(orc.session(), SessionStore::default());
    }
}
