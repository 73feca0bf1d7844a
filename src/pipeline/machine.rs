//! `PipelineStateMachine` — start/stop commands and snapshot application for
//! the single remote training job slot.
//!
//! Commands go out through [`RemoteJobClient`]; authoritative state comes
//! back only as [`PipelineSnapshot`]s, either applied directly or consumed
//! from a status [`Subscription`] by [`follow`](PipelineStateMachine::follow).

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::mpsc;

use crate::channel::{ChannelEvent, Subscription};
use crate::config::SessionStore;
use crate::lock_or_recover;
use crate::remote::{
    PipelineSnapshot, PipelineStatus, RemoteError, RemoteJobClient, SystemMetrics, TrainingConfig,
};

use super::state::{stages_for, PendingCommand, PipelineView, SharedPipeline, StageView};

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// Rejected locally before anything was sent.
    #[error("invalid training configuration: {0}")]
    InvalidConfiguration(String),

    /// The service (or the local view of it) refused the command.
    #[error("pipeline command rejected: {0}")]
    RemoteRejected(String),

    #[error("cannot {command} while the pipeline is {from}")]
    InvalidTransition {
        from: PipelineStatus,
        command: &'static str,
    },

    /// The command never got an answer.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Map a failed command call: service refusals become `RemoteRejected`.
fn rejected(e: RemoteError) -> PipelineError {
    match e {
        RemoteError::Status { detail, .. } => PipelineError::RemoteRejected(detail),
        other => PipelineError::Remote(other),
    }
}

// ---------------------------------------------------------------------------
// PipelineStateMachine
// ---------------------------------------------------------------------------

pub struct PipelineStateMachine {
    client: Arc<dyn RemoteJobClient>,
    shared: SharedPipeline,
    session: Mutex<SessionStore>,
}

impl PipelineStateMachine {
    pub fn new(
        client: Arc<dyn RemoteJobClient>,
        shared: SharedPipeline,
        session: SessionStore,
    ) -> Self {
        Self {
            client,
            shared,
            session: Mutex::new(session),
        }
    }

    /// Start a new run.
    ///
    /// Blank bucket and upload fields are filled from the session first.  On
    /// any failure the state is left exactly as it was.
    pub async fn start(&self, config: TrainingConfig) -> Result<(), PipelineError> {
        let config = config.with_session_defaults(&lock_or_recover(&self.session));
        config
            .validate()
            .map_err(PipelineError::InvalidConfiguration)?;

        let current = self.state_status();
        if current.is_active() {
            return Err(PipelineError::RemoteRejected(format!(
                "a pipeline is already {current}"
            )));
        }

        let stages = stages_for(&config);
        log::debug!("pipeline: starting {} with stages {:?}", config.model_name, stages);
        self.client.start_pipeline(&config).await.map_err(rejected)?;

        lock_or_recover(&self.shared).state.begin_run(stages);
        lock_or_recover(&self.session).remember_training(&config);
        log::info!("pipeline: started fine-tuning {}", config.model_name);
        Ok(())
    }

    /// Ask the service to stop the running job.
    ///
    /// The status becomes `Stopping` until a snapshot says otherwise.
    pub async fn stop(&self) -> Result<(), PipelineError> {
        let from = self.state_status();
        if from != PipelineStatus::Running {
            return Err(PipelineError::InvalidTransition {
                from,
                command: "stop",
            });
        }

        self.client.stop_pipeline().await.map_err(rejected)?;

        let mut view = lock_or_recover(&self.shared);
        // a snapshot may already have moved us on
        if view.state.status == PipelineStatus::Running {
            view.state.status = PipelineStatus::Stopping;
            view.state.pending = Some(PendingCommand::Stop);
        }
        log::info!("pipeline: stop requested");
        Ok(())
    }

    pub fn apply_snapshot(&self, snapshot: &PipelineSnapshot) {
        let mut view = lock_or_recover(&self.shared);
        let previous = view.state.status;
        view.state.apply_snapshot(snapshot);

        if previous != snapshot.status {
            log::info!("pipeline: {previous} → {}", snapshot.status);
        }
    }

    pub fn stage_statuses(&self) -> Vec<StageView> {
        lock_or_recover(&self.shared).state.stage_statuses()
    }

    /// Copy of the current view.
    pub fn view(&self) -> PipelineView {
        lock_or_recover(&self.shared).clone()
    }

    /// Copy of the session, including values remembered by `start`.
    pub fn session(&self) -> SessionStore {
        lock_or_recover(&self.session).clone()
    }

    /// Consume a status subscription until it ends.
    ///
    /// Snapshots are applied, host metrics are forwarded to `metrics` when a
    /// receiver is attached (dropped if it lags), and transport changes are
    /// reflected in [`PipelineView::transport_degraded`].
    pub async fn follow(
        &self,
        mut subscription: Subscription,
        metrics: Option<mpsc::Sender<SystemMetrics>>,
    ) {
        while let Some(event) = subscription.recv().await {
            match event {
                ChannelEvent::Status(snapshot) => self.apply_snapshot(&snapshot),
                ChannelEvent::SystemMetrics(m) => {
                    if let Some(tx) = &metrics {
                        if tx.try_send(m).is_err() {
                            log::debug!("pipeline: metrics receiver lagging, sample dropped");
                        }
                    }
                }
                ChannelEvent::PushConnected => {
                    lock_or_recover(&self.shared).transport_degraded = false;
                }
                ChannelEvent::TransportLost { reason } => {
                    log::warn!("pipeline: status push lost ({reason}), relying on polling");
                    lock_or_recover(&self.shared).transport_degraded = true;
                }
            }
        }
        log::debug!("pipeline: status subscription ended");
    }

    fn state_status(&self) -> PipelineStatus {
        lock_or_recover(&self.shared).state.status
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
