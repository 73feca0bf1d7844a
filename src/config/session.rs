//! Remembered session values: last bucket, last model picks and the
//! Hugging Face credentials used for uploads.
//!
//! Loaded once at process start and handed to whoever needs it; saved only
//! when the caller decides to.  Stored as `session.toml` next to
//! `settings.toml`.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::remote::{ModelSelector, TrainingConfig};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionStore {
    pub last_bucket: Option<String>,
    pub last_model_a: Option<ModelSelector>,
    pub last_model_b: Option<ModelSelector>,
    pub hf_repo_id: Option<String>,
    pub hf_token: Option<String>,
}

impl SessionStore {
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().session_file)
    }

    /// Missing file → empty session.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().session_file)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Record the models picked for an evaluation run.
    pub fn remember_models(&mut self, model_a: &ModelSelector, model_b: Option<&ModelSelector>) {
        self.last_model_a = Some(model_a.clone());
        if let Some(b) = model_b {
            self.last_model_b = Some(b.clone());
        }
    }

    /// Record the non-empty bucket and upload fields of a started pipeline.
    pub fn remember_training(&mut self, config: &TrainingConfig) {
        let non_empty = |s: &str| {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        };

        if let Some(bucket) = config.bucket_name.as_deref().and_then(non_empty) {
            self.last_bucket = Some(bucket);
        }
        if let Some(repo) = non_empty(&config.hf_repo_id) {
            self.hf_repo_id = Some(repo);
        }
        if let Some(token) = non_empty(&config.hf_token) {
            self.hf_token = Some(token);
        }
    }
}
