//! Scripted [`RemoteJobClient`] used by the orchestrator, pipeline and
//! channel tests.  Never touches the network.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::sync::Notify;

use super::client::{PushEvent, PushStream, RemoteError, RemoteJobClient};
use super::types::{
    AudioSource, CompareOutcome, Comparison, InferenceResult, ModelInfo, ModelSelector,
    PipelineSnapshot, PipelineStatus, TrainingConfig,
};

type InferFn =
    Box<dyn Fn(&ModelSelector, &AudioSource) -> Result<InferenceResult, RemoteError> + Send + Sync>;

type CompareFn = Box<
    dyn Fn(&ModelSelector, &ModelSelector, &AudioSource) -> Result<CompareOutcome, RemoteError>
        + Send
        + Sync,
>;

/// One scripted push connection.
struct ScriptedStream {
    events: Vec<Result<PushEvent, RemoteError>>,
    keep_open: bool,
}

pub struct MockJobClient {
    infer: InferFn,
    compare: Option<CompareFn>,
    start_result: Mutex<Result<(), RemoteError>>,
    stop_result: Mutex<Result<(), RemoteError>>,
    statuses: Mutex<VecDeque<Result<PipelineSnapshot, RemoteError>>>,
    streams: Mutex<VecDeque<ScriptedStream>>,
    gate: Option<Arc<Notify>>,
    calls: Mutex<Vec<String>>,
}

impl MockJobClient {
    /// Every inference succeeds with `transcription` at `confidence`.
    pub fn ok(transcription: &str, confidence: f64) -> Self {
        let transcription = transcription.to_string();
        Self::with_infer(move |_, _| Ok(result(&transcription, confidence, 100)))
    }

    pub fn with_infer<F>(f: F) -> Self
    where
        F: Fn(&ModelSelector, &AudioSource) -> Result<InferenceResult, RemoteError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            infer: Box::new(f),
            compare: None,
            start_result: Mutex::new(Ok(())),
            stop_result: Mutex::new(Ok(())),
            statuses: Mutex::new(VecDeque::new()),
            streams: Mutex::new(VecDeque::new()),
            gate: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Override the joint compare endpoint.  By default it is answered from
    /// the infer closure.
    pub fn compare_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&ModelSelector, &ModelSelector, &AudioSource) -> Result<CompareOutcome, RemoteError>
            + Send
            + Sync
            + 'static,
    {
        self.compare = Some(Box::new(f));
        self
    }

    pub fn start_fails(self, error: RemoteError) -> Self {
        *self.start_result.lock().unwrap() = Err(error);
        self
    }

    pub fn stop_fails(self, error: RemoteError) -> Self {
        *self.stop_result.lock().unwrap() = Err(error);
        self
    }

    /// Queue status responses.  The last one repeats forever.
    pub fn statuses(self, statuses: Vec<Result<PipelineSnapshot, RemoteError>>) -> Self {
        self.statuses.lock().unwrap().extend(statuses);
        self
    }

    /// Queue one push connection.  With `keep_open` the stream stays pending
    /// after the scripted events instead of ending.
    pub fn push_stream(self, events: Vec<Result<PushEvent, RemoteError>>, keep_open: bool) -> Self {
        self.streams
            .lock()
            .unwrap()
            .push_back(ScriptedStream { events, keep_open });
        self
    }

    /// Make every inference wait for one permit on `gate`.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Calls received so far, e.g. `"infer run1 a.wav"`, `"status"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    async fn wait_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
    }
}

#[async_trait]
impl RemoteJobClient for MockJobClient {
    async fn infer(
        &self,
        model: &ModelSelector,
        audio: &AudioSource,
    ) -> Result<InferenceResult, RemoteError> {
        self.record(format!("infer {} {}", model.name(), audio.display_name()));
        self.wait_gate().await;
        (self.infer)(model, audio)
    }

    async fn compare(
        &self,
        model_a: &ModelSelector,
        model_b: &ModelSelector,
        audio: &AudioSource,
    ) -> Result<CompareOutcome, RemoteError> {
        self.record(format!(
            "compare {} {} {}",
            model_a.name(),
            model_b.name(),
            audio.display_name()
        ));
        self.wait_gate().await;
        if let Some(compare) = &self.compare {
            return compare(model_a, model_b, audio);
        }
        let a = (self.infer)(model_a, audio)?;
        let b = (self.infer)(model_b, audio)?;
        let comparison = Comparison::between(&a, &b);
        Ok(CompareOutcome {
            model_a: a,
            model_b: b,
            comparison,
        })
    }

    async fn start_pipeline(&self, config: &TrainingConfig) -> Result<(), RemoteError> {
        self.record(format!("start {}", config.model_name));
        self.start_result.lock().unwrap().clone()
    }

    async fn stop_pipeline(&self) -> Result<(), RemoteError> {
        self.record("stop".into());
        self.stop_result.lock().unwrap().clone()
    }

    async fn pipeline_status(&self) -> Result<PipelineSnapshot, RemoteError> {
        self.record("status".into());
        let mut statuses = self.statuses.lock().unwrap();
        if statuses.len() > 1 {
            return statuses.pop_front().unwrap();
        }
        statuses
            .front()
            .cloned()
            .unwrap_or_else(|| Ok(snapshot(PipelineStatus::Idle, &[], -1, &[])))
    }

    async fn open_events(&self) -> Result<PushStream, RemoteError> {
        self.record("events".into());
        let scripted = self.streams.lock().unwrap().pop_front();
        match scripted {
            Some(ScriptedStream { events, keep_open }) => {
                let scripted = stream::iter(events);
                if keep_open {
                    Ok(scripted.chain(stream::pending()).boxed())
                } else {
                    Ok(scripted.boxed())
                }
            }
            None => Err(RemoteError::Request("push channel unavailable".into())),
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, RemoteError> {
        self.record("models".into());
        Ok(Vec::new())
    }

    async fn base_models(&self) -> Result<Vec<String>, RemoteError> {
        self.record("base_models".into());
        Ok(vec!["openai/whisper-large-v3".into()])
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn result(transcription: &str, confidence: f64, ms: u64) -> InferenceResult {
    InferenceResult {
        transcription: transcription.to_string(),
        confidence,
        inference_time_ms: ms,
        language: Some("th".into()),
        model_label: None,
    }
}

pub fn snapshot(
    status: PipelineStatus,
    stages: &[&str],
    current: i64,
    logs: &[&str],
) -> PipelineSnapshot {
    PipelineSnapshot {
        status,
        log_lines: logs.iter().map(|s| s.to_string()).collect(),
        stages: stages.iter().map(|s| s.to_string()).collect(),
        current_stage_index: current,
        current_task: usize::try_from(current)
            .ok()
            .and_then(|i| stages.get(i))
            .map(|s| s.to_string()),
    }
}

/// A push event carrying `snap` the way the service encodes it.
pub fn status_event(snap: &PipelineSnapshot) -> PushEvent {
    let index = if snap.current_stage_index < 0 {
        serde_json::Value::Null
    } else {
        serde_json::json!(snap.current_stage_index)
    };
    PushEvent {
        kind: "training_status".into(),
        data: serde_json::json!({
            "status": snap.status,
            "current_task": snap.current_task,
            "steps": snap.stages,
            "current_step_index": index,
            "total_steps": snap.stages.len(),
            "logs": snap.log_lines,
        })
        .to_string(),
    }
}

pub fn metrics_event(cpu: f64) -> PushEvent {
    PushEvent {
        kind: "system_stats".into(),
        data: serde_json::json!({ "cpu": { "usage_percent": cpu } }).to_string(),
    }
}
