//! Batch evaluation data: work items, per-item results and the shared list
//! the presentation layer reads.

use std::sync::{Arc, Mutex};

use crate::remote::{AudioSource, Comparison, InferenceResult, ModelSelector};

// ---------------------------------------------------------------------------
// WorkItem
// ---------------------------------------------------------------------------

/// Metadata already known for an item, shown next to the results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownMetadata {
    pub transcription: Option<String>,
    pub tags: Vec<String>,
}

/// One audio sample to evaluate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: String,
    pub audio: AudioSource,
    /// Display label for progress messages; defaults to the id.
    pub label: Option<String>,
    pub known: Option<KnownMetadata>,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, audio: AudioSource) -> Self {
        Self {
            id: id.into(),
            audio,
            label: None,
            known: None,
        }
    }

    /// An item for a bucket object, identified by its object path.
    pub fn from_bucket(bucket: &str, object: &str) -> Self {
        let audio = AudioSource::bucket(bucket, object);
        let label = audio.display_name();
        Self::new(object, audio).with_label(label)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_known(mut self, known: KnownMetadata) -> Self {
        self.known = Some(known);
        self
    }

    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }
}

// ---------------------------------------------------------------------------
// BatchResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Pending,
    Processing,
    Success,
    Error,
}

impl BatchStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

/// Outcome of one work item.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub id: String,
    pub label: String,
    pub status: BatchStatus,
    pub result_a: Option<InferenceResult>,
    pub result_b: Option<InferenceResult>,
    pub comparison: Option<Comparison>,
    pub error: Option<String>,
    pub known: Option<KnownMetadata>,
}

impl BatchResult {
    pub fn pending(item: &WorkItem) -> Self {
        Self {
            id: item.id.clone(),
            label: item.display_label().to_string(),
            status: BatchStatus::Pending,
            result_a: None,
            result_b: None,
            comparison: None,
            error: None,
            known: item.known.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// BatchRequest / BatchReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub items: Vec<WorkItem>,
    pub model_a: ModelSelector,
    pub model_b: Option<ModelSelector>,
    pub compare_mode: bool,
}

impl BatchRequest {
    pub fn single_model(items: Vec<WorkItem>, model: ModelSelector) -> Self {
        Self {
            items,
            model_a: model,
            model_b: None,
            compare_mode: false,
        }
    }

    pub fn compare(items: Vec<WorkItem>, model_a: ModelSelector, model_b: ModelSelector) -> Self {
        Self {
            items,
            model_a,
            model_b: Some(model_b),
            compare_mode: true,
        }
    }

    /// Model B, when compare mode is on and B has a name.
    pub fn comparing(&self) -> Option<&ModelSelector> {
        if !self.compare_mode {
            return None;
        }
        self.model_b.as_ref().filter(|b| b.is_configured())
    }
}

/// What one `run` produced, in item order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub results: Vec<BatchResult>,
    pub succeeded: usize,
    pub failed: usize,
    /// The run stopped early; items after the last entry were never started.
    pub cancelled: bool,
}

// ---------------------------------------------------------------------------
// SharedBatch
// ---------------------------------------------------------------------------

/// Everything the presentation layer reads about batch evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchView {
    pub results: Vec<BatchResult>,
    /// `"processing i/n: <label>"` while a run is active.
    pub progress: Option<String>,
    /// Result of the latest one-item run.
    pub last_single: Option<BatchResult>,
    pub running: bool,
}

impl BatchView {
    pub(crate) fn find_mut(&mut self, id: &str) -> Option<&mut BatchResult> {
        self.results.iter_mut().find(|r| r.id == id)
    }
}

/// Thread-safe handle to [`BatchView`].
pub type SharedBatch = Arc<Mutex<BatchView>>;

pub fn new_shared_batch() -> SharedBatch {
    Arc::new(Mutex::new(BatchView::default()))
}
