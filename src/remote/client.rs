//! The `RemoteJobClient` trait and its error type.
//!
//! The orchestrator and the pipeline state machine only ever talk to the
//! service through this trait, so tests can swap in a scripted client and the
//! HTTP details stay in [`HttpJobClient`](super::HttpJobClient).

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

use super::types::{
    AudioSource, CompareOutcome, InferenceResult, ModelInfo, ModelSelector, PipelineSnapshot,
    TrainingConfig,
};

// ---------------------------------------------------------------------------
// RemoteError
// ---------------------------------------------------------------------------

/// Transport-level failures of a single call.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// Connection refused, reset, DNS failure …
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out")]
    Timeout,

    /// The service answered with a non-success status.
    #[error("service returned {status}: {detail}")]
    Status { status: u16, detail: String },

    /// The response body did not have the expected shape.
    #[error("unexpected response: {0}")]
    Parse(String),

    /// The service has no endpoint for this combination of inputs.
    #[error("unsupported request: {0}")]
    Unsupported(String),

    /// Reading local audio failed before anything was sent.
    #[error("local I/O failed: {0}")]
    Io(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RemoteError::Timeout
        } else if e.is_decode() {
            RemoteError::Parse(e.to_string())
        } else {
            RemoteError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Push events
// ---------------------------------------------------------------------------

/// One raw event off the push stream: the event name and its JSON payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEvent {
    pub kind: String,
    pub data: String,
}

/// The push stream as handed to the status channel.
pub type PushStream = Pin<Box<dyn Stream<Item = Result<PushEvent, RemoteError>> + Send>>;

// ---------------------------------------------------------------------------
// RemoteJobClient trait
// ---------------------------------------------------------------------------

/// Typed access to the service's inference, comparison and pipeline-control
/// endpoints.  Pure transport: no retries, no state.
#[async_trait]
pub trait RemoteJobClient: Send + Sync {
    /// Run one model over one piece of audio.
    async fn infer(
        &self,
        model: &ModelSelector,
        audio: &AudioSource,
    ) -> Result<InferenceResult, RemoteError>;

    /// Run two models over the same audio in one request.
    async fn compare(
        &self,
        model_a: &ModelSelector,
        model_b: &ModelSelector,
        audio: &AudioSource,
    ) -> Result<CompareOutcome, RemoteError>;

    async fn start_pipeline(&self, config: &TrainingConfig) -> Result<(), RemoteError>;

    async fn stop_pipeline(&self) -> Result<(), RemoteError>;

    /// Fetch the current pipeline snapshot.
    async fn pipeline_status(&self) -> Result<PipelineSnapshot, RemoteError>;

    /// Open the server push stream.
    async fn open_events(&self) -> Result<PushStream, RemoteError>;

    /// Models available for evaluation.
    async fn list_models(&self) -> Result<Vec<ModelInfo>, RemoteError>;

    /// Base checkpoints the pipeline can fine-tune.
    async fn base_models(&self) -> Result<Vec<String>, RemoteError>;
}

// Compile-time assertion: Box<dyn RemoteJobClient> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn RemoteJobClient>) {}
};
