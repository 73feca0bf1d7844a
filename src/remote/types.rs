//! Value types exchanged with the inference / training service.
//!
//! Everything here is plain data: the selectors and audio references that go
//! out in requests, and the results and snapshots that come back.  Field
//! names follow the service's JSON where the type is decoded straight off the
//! wire.

use std::path::PathBuf;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::SessionStore;

// ---------------------------------------------------------------------------
// ModelSelector
// ---------------------------------------------------------------------------

/// Identifies an inference target on the service.
///
/// Custom models are LoRA fine-tunes produced by the training pipeline and
/// come in several variants (`"lora"`, `"merged"`, `"ct2"`).  Official models
/// are the upstream Whisper checkpoints and have no variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ModelSelector {
    /// A model trained by this service.
    Custom {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        variant: Option<String>,
    },
    /// An upstream checkpoint such as `openai/whisper-large-v3`.
    Official { name: String },
}

impl ModelSelector {
    pub fn custom(name: impl Into<String>, variant: Option<&str>) -> Self {
        Self::Custom {
            name: name.into(),
            variant: variant.map(str::to_string),
        }
    }

    pub fn official(name: impl Into<String>) -> Self {
        Self::Official { name: name.into() }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Custom { name, .. } | Self::Official { name } => name,
        }
    }

    /// `true` when a model name has actually been chosen.
    pub fn is_configured(&self) -> bool {
        !self.name().trim().is_empty()
    }

    /// Display label, `name/variant` for custom models.
    pub fn label(&self) -> String {
        match self {
            Self::Custom {
                name,
                variant: Some(variant),
            } => format!("{name}/{variant}"),
            Self::Custom { name, variant: None } | Self::Official { name } => name.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// AudioSource
// ---------------------------------------------------------------------------

/// Where the audio for one inference request comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// An object already stored in a dataset bucket, e.g. `train/a.wav`.
    Bucket { bucket: String, object: String },
    /// A file on the local disk, uploaded with the request.
    LocalFile(PathBuf),
    /// Audio captured in-process (encoded WAV bytes).
    Recorded(Vec<u8>),
}

impl AudioSource {
    pub fn bucket(bucket: impl Into<String>, object: impl Into<String>) -> Self {
        Self::Bucket {
            bucket: bucket.into(),
            object: object.into(),
        }
    }

    /// Whether the service's joint compare endpoint accepts this source.
    ///
    /// The compare endpoint only takes JSON bodies, so uploaded files have to
    /// go through two single inferences instead.
    pub fn supports_joint_compare(&self) -> bool {
        matches!(self, Self::Bucket { .. } | Self::Recorded(_))
    }

    /// Short name used in progress messages.
    pub fn display_name(&self) -> String {
        match self {
            Self::Bucket { object, .. } => object
                .rsplit('/')
                .next()
                .unwrap_or(object.as_str())
                .to_string(),
            Self::LocalFile(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            Self::Recorded(_) => "recording".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// InferenceResult / Comparison
// ---------------------------------------------------------------------------

/// Outcome of a single inference call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    pub transcription: String,
    /// Mean token confidence, 0.0 – 1.0.
    pub confidence: f64,
    /// Wall-clock inference time on the service.  Sent as a float; rounded.
    #[serde(deserialize_with = "millis_from_number")]
    pub inference_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// `name/variant` label echoed back by the compare endpoint.
    #[serde(default, rename = "name", skip_serializing_if = "Option::is_none")]
    pub model_label: Option<String>,
}

fn millis_from_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    if !raw.is_finite() || raw < 0.0 {
        return Err(D::Error::custom(format!(
            "inference_time_ms must be a non-negative number, got {raw}"
        )));
    }
    Ok(raw.round() as u64)
}

/// Metrics derived from a pair of results for the same audio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// `time_b / time_a`, two decimals.  `0.0` when either time is zero.
    pub speed_ratio: f64,
    /// `confidence_a - confidence_b`, three decimals.
    pub confidence_diff: f64,
}

impl Comparison {
    /// Derive the metrics the same way the service's compare endpoint does.
    ///
    /// ```
    /// use whisper_lab::remote::{Comparison, InferenceResult};
    ///
    /// let a = InferenceResult { transcription: "a".into(), confidence: 0.9,
    ///     inference_time_ms: 200, language: None, model_label: None };
    /// let b = InferenceResult { transcription: "b".into(), confidence: 0.7,
    ///     inference_time_ms: 300, language: None, model_label: None };
    /// let cmp = Comparison::between(&a, &b);
    /// assert_eq!(cmp.speed_ratio, 1.5);
    /// assert!((cmp.confidence_diff - 0.2).abs() < 1e-9);
    /// ```
    pub fn between(a: &InferenceResult, b: &InferenceResult) -> Self {
        let speed_ratio = if a.inference_time_ms > 0 && b.inference_time_ms > 0 {
            round_to(b.inference_time_ms as f64 / a.inference_time_ms as f64, 2)
        } else {
            0.0
        };

        Self {
            speed_ratio,
            confidence_diff: round_to(a.confidence - b.confidence, 3),
        }
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Response body of the joint compare endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CompareOutcome {
    pub model_a: InferenceResult,
    pub model_b: InferenceResult,
    pub comparison: Comparison,
}

// ---------------------------------------------------------------------------
// ModelInfo
// ---------------------------------------------------------------------------

/// One entry of the service's evaluation model listing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub path: String,
    /// `"custom"` or `"official"`.
    pub source: String,
    #[serde(default)]
    pub variants: Vec<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl ModelInfo {
    /// Build a selector for this model, preferring the CTranslate2 variant.
    pub fn selector(&self) -> ModelSelector {
        if self.source == "official" {
            return ModelSelector::official(self.name.clone());
        }
        let variant = self
            .variants
            .iter()
            .find(|v| v.as_str() == "ct2")
            .or_else(|| self.variants.first());
        ModelSelector::custom(self.name.clone(), variant.map(String::as_str))
    }
}

/// Pick the default model A: the first custom model, if any.
pub fn default_selector(models: &[ModelInfo]) -> Option<ModelSelector> {
    models
        .iter()
        .find(|m| m.source == "custom")
        .map(ModelInfo::selector)
}

// ---------------------------------------------------------------------------
// TrainingConfig
// ---------------------------------------------------------------------------

/// Body of the pipeline start command.
///
/// Defaults mirror the service's own defaults so a partially filled config
/// behaves the same whether or not a field was sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub model_name: String,
    pub bucket_name: Option<String>,
    pub output_dir: String,
    pub max_steps: u32,
    pub learning_rate: f64,
    pub per_device_train_batch_size: u32,
    pub eval_steps: u32,
    pub do_merge: bool,
    pub do_convert: bool,
    pub do_upload: bool,
    pub hf_repo_id: String,
    pub hf_token: String,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            model_name: "openai/whisper-large-v3".into(),
            bucket_name: None,
            output_dir: "lora-whisper".into(),
            max_steps: 100,
            learning_rate: 1e-4,
            per_device_train_batch_size: 1,
            eval_steps: 50,
            do_merge: false,
            do_convert: false,
            do_upload: false,
            hf_repo_id: String::new(),
            hf_token: String::new(),
        }
    }
}

impl TrainingConfig {
    /// Fill blank bucket / Hugging Face fields from remembered session values.
    ///
    /// Explicit values always win over the session.
    pub fn with_session_defaults(mut self, session: &SessionStore) -> Self {
        let blank = |s: &Option<String>| s.as_deref().map_or(true, |v| v.trim().is_empty());

        if blank(&self.bucket_name) {
            if let Some(bucket) = &session.last_bucket {
                self.bucket_name = Some(bucket.clone());
            }
        }
        if self.hf_repo_id.trim().is_empty() {
            if let Some(repo) = &session.hf_repo_id {
                self.hf_repo_id = repo.clone();
            }
        }
        if self.hf_token.trim().is_empty() {
            if let Some(token) = &session.hf_token {
                self.hf_token = token.clone();
            }
        }
        self
    }

    /// Check the fields the service cannot run without.
    pub fn validate(&self) -> Result<(), String> {
        if self.model_name.trim().is_empty() {
            return Err("base model name is empty".into());
        }
        if self.do_upload && self.hf_repo_id.trim().is_empty() {
            return Err("upload requested without a Hugging Face repo id".into());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PipelineStatus / PipelineSnapshot
// ---------------------------------------------------------------------------

/// Lifecycle status of the remote training pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    #[default]
    Idle,
    Running,
    /// Stop requested; waiting for the service to confirm.
    Stopping,
    Completed,
    Error,
    /// The service confirmed a user stop.
    Stopped,
}

impl PipelineStatus {
    /// `true` while a job occupies the slot.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Stopping)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Stopped)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Complete description of the pipeline at one instant, as served by both
/// the status endpoint and the push stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PipelineSnapshot {
    pub status: PipelineStatus,
    #[serde(default, rename = "logs")]
    pub log_lines: Vec<String>,
    #[serde(default, rename = "steps")]
    pub stages: Vec<String>,
    /// `-1` when the service sends `null`, which it does outside `running`.
    #[serde(
        default = "no_stage",
        rename = "current_step_index",
        deserialize_with = "stage_index"
    )]
    pub current_stage_index: i64,
    #[serde(default, rename = "current_task")]
    pub current_task: Option<String>,
}

fn no_stage() -> i64 {
    -1
}

fn stage_index<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or(-1))
}

// ---------------------------------------------------------------------------
// SystemMetrics
// ---------------------------------------------------------------------------

/// Host metrics pushed alongside pipeline status.  Not interpreted here;
/// handed to the presentation layer as received.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemMetrics(pub serde_json::Value);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
