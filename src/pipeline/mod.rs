//! Training pipeline state machine.
//!
//! # Architecture
//!
//! ```text
//! start(config) / stop()
//!        │
//!        ▼
//! PipelineStateMachine ──commands──▶ RemoteJobClient ──▶ service
//!        ▲
//!        │ ChannelEvent::Status (push or poll)
//! StatusChannel::subscribe() ──▶ follow()
//!
//! SharedPipeline (Arc<Mutex<PipelineView>>) ←─── read by the presentation layer
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use whisper_lab::channel::StatusChannel;
//! use whisper_lab::config::{AppConfig, SessionStore};
//! use whisper_lab::pipeline::{new_shared_pipeline, PipelineStateMachine};
//! use whisper_lab::remote::{HttpJobClient, RemoteJobClient, TrainingConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let client: Arc<dyn RemoteJobClient> = Arc::new(HttpJobClient::from_config(&config.server));
//!     let machine = Arc::new(PipelineStateMachine::new(
//!         client.clone(),
//!         new_shared_pipeline(),
//!         SessionStore::default(),
//!     ));
//!
//!     let sub = StatusChannel::subscribe(client, config.channel.clone());
//!     let follower = Arc::clone(&machine);
//!     tokio::spawn(async move { follower.follow(sub, None).await });
//!
//!     machine.start(TrainingConfig::default()).await.unwrap();
//! }
//! ```

pub mod machine;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use machine::{PipelineError, PipelineStateMachine};
pub use state::{
    derive_stage_status, new_shared_pipeline, stages_for, PendingCommand, PipelineState,
    PipelineView, SharedPipeline, StageStatus, StageView, STAGE_CONVERTING, STAGE_MERGING,
    STAGE_TRAINING, STAGE_UPLOADING,
};
