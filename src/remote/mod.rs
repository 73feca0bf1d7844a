//! Typed access to the remote inference / training service.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  RemoteJobClient (trait)                     │
//! │                                                              │
//! │  infer / compare ──────▶ POST evaluate/infer | infer-upload  │
//! │                          POST evaluate/compare               │
//! │  start / stop ─────────▶ POST train/start | train/stop       │
//! │  pipeline_status ──────▶ GET  train/status                   │
//! │  open_events ──────────▶ GET  events  (text/event-stream)    │
//! │                               │                              │
//! │                               ▼                              │
//! │                         SseDecoder → PushEvent               │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`HttpJobClient`] is the only production implementation.  The batch
//! orchestrator, the pipeline state machine and the status channel all hold
//! an `Arc<dyn RemoteJobClient>`.

pub mod client;
pub mod http;
pub mod sse;
pub mod types;

#[cfg(test)]
pub mod mock;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use client::{PushEvent, PushStream, RemoteError, RemoteJobClient};
pub use http::{HttpJobClient, EVENT_SYSTEM_STATS, EVENT_TRAINING_STATUS};
pub use sse::{SseDecoder, SseFrame};
pub use types::{
    default_selector, AudioSource, CompareOutcome, Comparison, InferenceResult, ModelInfo,
    ModelSelector, PipelineSnapshot, PipelineStatus, SystemMetrics, TrainingConfig,
};

#[cfg(test)]
pub use mock::MockJobClient;
