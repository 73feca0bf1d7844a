//! Canonical pipeline state and the pure stage derivation.
//!
//! [`PipelineState`] is the local view of the one remote training job slot.
//! The presentation layer reads it through [`SharedPipeline`]; only
//! [`PipelineStateMachine`](super::PipelineStateMachine) writes it.
//!
//! ```text
//! Idle ──start──▶ Running ──snapshot──▶ Completed | Error
//!                    │
//!                    └──stop──▶ Stopping ──snapshot──▶ Stopped | Completed | Error
//! Completed / Error / Stopped ──start──▶ Running
//! ```

use std::sync::{Arc, Mutex};

use crate::remote::{PipelineSnapshot, PipelineStatus, TrainingConfig};

pub const STAGE_TRAINING: &str = "Training";
pub const STAGE_MERGING: &str = "Merging";
pub const STAGE_CONVERTING: &str = "Converting";
pub const STAGE_UPLOADING: &str = "Uploading";

/// Stage names a run of `config` goes through, in order.
pub fn stages_for(config: &TrainingConfig) -> Vec<String> {
    let mut stages = vec![STAGE_TRAINING.to_string()];
    if config.do_merge {
        stages.push(STAGE_MERGING.to_string());
    }
    if config.do_convert {
        stages.push(STAGE_CONVERTING.to_string());
    }
    if config.do_upload {
        stages.push(STAGE_UPLOADING.to_string());
    }
    stages
}

// ---------------------------------------------------------------------------
// Stage derivation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Pending,
    Active,
    Completed,
    Error,
}

/// Status of stage `index` given the current stage index and overall status.
///
/// ```
/// use whisper_lab::pipeline::{derive_stage_status, StageStatus};
/// use whisper_lab::remote::PipelineStatus;
///
/// assert_eq!(derive_stage_status(0, 1, PipelineStatus::Running), StageStatus::Completed);
/// assert_eq!(derive_stage_status(1, 1, PipelineStatus::Running), StageStatus::Active);
/// ```
pub fn derive_stage_status(index: usize, current: i64, status: PipelineStatus) -> StageStatus {
    let index = index as i64;
    if status == PipelineStatus::Completed || index < current {
        StageStatus::Completed
    } else if status == PipelineStatus::Error && index == current {
        StageStatus::Error
    } else if status == PipelineStatus::Running && index == current {
        StageStatus::Active
    } else {
        StageStatus::Pending
    }
}

/// One stage as the presentation layer renders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageView {
    pub name: String,
    pub status: StageStatus,
}

// ---------------------------------------------------------------------------
// PipelineState
// ---------------------------------------------------------------------------

/// A local command the service has not confirmed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingCommand {
    Stop,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineState {
    pub status: PipelineStatus,
    pub stages: Vec<String>,
    /// `-1` before the first stage starts.
    pub current_stage_index: i64,
    pub log_lines: Vec<String>,
    pub current_task: Option<String>,
    /// Set while `status` is an optimistic local label.  Cleared by the next
    /// snapshot.
    pub pending: Option<PendingCommand>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            status: PipelineStatus::Idle,
            stages: Vec::new(),
            current_stage_index: -1,
            log_lines: Vec::new(),
            current_task: None,
            pending: None,
        }
    }

    /// Replace every server-owned field with the snapshot's.
    ///
    /// The service only reports a stage index while running.  A terminal
    /// snapshot without one keeps the index last seen for the same stage
    /// list; an `error` snapshot with nothing to keep blames the first stage.
    pub fn apply_snapshot(&mut self, snapshot: &PipelineSnapshot) {
        self.current_stage_index = self.resolve_stage_index(snapshot);
        self.status = snapshot.status;
        self.stages = snapshot.stages.clone();
        self.log_lines = snapshot.log_lines.clone();
        self.current_task = snapshot.current_task.clone();
        self.pending = None;
    }

    fn resolve_stage_index(&self, snapshot: &PipelineSnapshot) -> i64 {
        if snapshot.current_stage_index >= 0 || !snapshot.status.is_terminal() {
            return snapshot.current_stage_index;
        }
        if self.current_stage_index >= 0 && self.stages == snapshot.stages {
            self.current_stage_index
        } else if snapshot.status == PipelineStatus::Error && !snapshot.stages.is_empty() {
            0
        } else {
            -1
        }
    }

    /// Reset for an accepted start.
    pub fn begin_run(&mut self, stages: Vec<String>) {
        self.status = PipelineStatus::Running;
        self.current_task = stages.first().cloned();
        self.stages = stages;
        self.current_stage_index = 0;
        self.log_lines.clear();
        self.pending = None;
    }

    pub fn stage_statuses(&self) -> Vec<StageView> {
        self.stages
            .iter()
            .enumerate()
            .map(|(i, name)| StageView {
                name: name.clone(),
                status: derive_stage_status(i, self.current_stage_index, self.status),
            })
            .collect()
    }

    /// `true` while `status` reflects a local command, not server data.
    pub fn is_optimistic(&self) -> bool {
        self.pending.is_some()
    }
}

// ---------------------------------------------------------------------------
// SharedPipeline
// ---------------------------------------------------------------------------

/// Everything the presentation layer reads about the pipeline slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineView {
    pub state: PipelineState,
    /// Set after the push stream drops; cleared when it reconnects.
    pub transport_degraded: bool,
}

/// Thread-safe handle to [`PipelineView`].
///
/// Lock for a short critical section; do **not** hold the lock across
/// `.await` points.
pub type SharedPipeline = Arc<Mutex<PipelineView>>;

pub fn new_shared_pipeline() -> SharedPipeline {
    Arc::new(Mutex::new(PipelineView::default()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
