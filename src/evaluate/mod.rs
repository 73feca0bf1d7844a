//! Batch evaluation of audio samples against one or two models.
//!
//! This module provides:
//! * [`BatchJobOrchestrator`] — sequential, failure-isolating batch runner.
//! * [`WorkItem`] / [`BatchRequest`] — what to run.
//! * [`BatchResult`] / [`BatchReport`] — what came back, per item and per run.
//! * [`SharedBatch`] — the result list, progress string and single-result
//!   slot the presentation layer reads.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use whisper_lab::config::AppConfig;
//! use whisper_lab::evaluate::{new_shared_batch, BatchJobOrchestrator, BatchRequest, WorkItem};
//! use whisper_lab::remote::{HttpJobClient, ModelSelector};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let client = Arc::new(HttpJobClient::from_config(&config.server));
//!     let orchestrator = BatchJobOrchestrator::new(client, new_shared_batch());
//!
//!     let items = vec![
//!         WorkItem::from_bucket("voices", "test/clip_01.wav"),
//!         WorkItem::from_bucket("voices", "test/clip_02.wav"),
//!     ];
//!     let report = orchestrator
//!         .run(BatchRequest::single_model(items, ModelSelector::custom("run1", Some("ct2"))))
//!         .await
//!         .unwrap();
//!     println!("{} of {} failed", report.failed, report.results.len());
//! }
//! ```

pub mod orchestrator;
pub mod types;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use orchestrator::{BatchError, BatchJobOrchestrator, CancelHandle};
pub use types::{
    new_shared_batch, BatchReport, BatchRequest, BatchResult, BatchStatus, BatchView,
    KnownMetadata, SharedBatch, WorkItem,
};
