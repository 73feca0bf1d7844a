//! `HttpJobClient` — [`RemoteJobClient`] over the service's REST + SSE API.
//!
//! All connection details come from [`ServerConfig`]; nothing is hardcoded
//! except the endpoint paths themselves.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::config::ServerConfig;

use super::client::{PushEvent, PushStream, RemoteError, RemoteJobClient};
use super::sse::{SseDecoder, SseFrame};
use super::types::{
    AudioSource, CompareOutcome, InferenceResult, ModelInfo, ModelSelector, PipelineSnapshot,
    TrainingConfig,
};

/// Push event name carrying a [`PipelineSnapshot`].
pub const EVENT_TRAINING_STATUS: &str = "training_status";
/// Push event name carrying host metrics.
pub const EVENT_SYSTEM_STATS: &str = "system_stats";

// ---------------------------------------------------------------------------
// HttpJobClient
// ---------------------------------------------------------------------------

pub struct HttpJobClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpJobClient {
    /// Build a client from the server section of the app config.
    ///
    /// No timeout is set unless `request_timeout_secs` is configured; long
    /// model loads on the service can take minutes.
    pub fn from_config(config: &ServerConfig) -> Self {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, RemoteError> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        read_json(response).await
    }

    async fn infer_upload(
        &self,
        model: &ModelSelector,
        path: &Path,
    ) -> Result<InferenceResult, RemoteError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| RemoteError::Io(format!("{}: {e}", path.display())))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_string());

        let (name, source, variant) = selector_fields(model);
        let mut form = reqwest::multipart::Form::new()
            .text("model_name", name.to_string())
            .text("source", source);
        if let Some(variant) = variant {
            form = form.text("variant", variant.to_string());
        }
        form = form.part(
            "audio_file",
            reqwest::multipart::Part::bytes(bytes).file_name(file_name),
        );

        log::debug!("remote: infer-upload {} with {}", path.display(), model.label());
        let response = self
            .client
            .post(self.url("evaluate/infer-upload"))
            .multipart(form)
            .send()
            .await?;
        read_json(response).await
    }
}

// ---------------------------------------------------------------------------
// Request building
// ---------------------------------------------------------------------------

/// `(model_name, source, variant)` as the service expects them.
fn selector_fields(model: &ModelSelector) -> (&str, &'static str, Option<&str>) {
    match model {
        ModelSelector::Custom { name, variant } => (name.as_str(), "custom", variant.as_deref()),
        ModelSelector::Official { name } => (name.as_str(), "official", None),
    }
}

fn selector_json(model: &ModelSelector) -> Value {
    let (name, source, variant) = selector_fields(model);
    json!({ "name": name, "source": source, "variant": variant })
}

/// JSON audio fields for bucket objects and recordings.
fn audio_fields(audio: &AudioSource) -> Result<Map<String, Value>, RemoteError> {
    let mut fields = Map::new();
    match audio {
        AudioSource::Bucket { bucket, object } => {
            fields.insert("audio_source".into(), json!("bucket"));
            fields.insert("bucket_name".into(), json!(bucket));
            fields.insert("file_name".into(), json!(object));
        }
        AudioSource::Recorded(bytes) => {
            fields.insert("audio_source".into(), json!("recording"));
            fields.insert(
                "audio_base64".into(),
                json!(base64::engine::general_purpose::STANDARD.encode(bytes)),
            );
        }
        AudioSource::LocalFile(path) => {
            return Err(RemoteError::Unsupported(format!(
                "{} must be uploaded, not referenced",
                path.display()
            )));
        }
    }
    Ok(fields)
}

// ---------------------------------------------------------------------------
// Response handling
// ---------------------------------------------------------------------------

/// Turn non-success responses into [`RemoteError::Status`], pulling the
/// `detail` message out of the body when there is one.
async fn check(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| {
            v.get("detail").map(|d| match d.as_str() {
                Some(s) => s.to_string(),
                None => d.to_string(),
            })
        })
        .unwrap_or(body);

    Err(RemoteError::Status {
        status: status.as_u16(),
        detail,
    })
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RemoteError> {
    let response = check(response).await?;
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| RemoteError::Parse(e.to_string()))
}

#[derive(Deserialize)]
struct ModelList<T> {
    models: Vec<T>,
}

// ---------------------------------------------------------------------------
// RemoteJobClient impl
// ---------------------------------------------------------------------------

#[async_trait]
impl RemoteJobClient for HttpJobClient {
    async fn infer(
        &self,
        model: &ModelSelector,
        audio: &AudioSource,
    ) -> Result<InferenceResult, RemoteError> {
        if let AudioSource::LocalFile(path) = audio {
            return self.infer_upload(model, path).await;
        }

        let (name, source, variant) = selector_fields(model);
        let mut body = audio_fields(audio)?;
        body.insert("model_name".into(), json!(name));
        body.insert("source".into(), json!(source));
        body.insert("variant".into(), json!(variant));

        log::debug!("remote: infer {} on {}", model.label(), audio.display_name());
        self.post_json("evaluate/infer", &Value::Object(body)).await
    }

    async fn compare(
        &self,
        model_a: &ModelSelector,
        model_b: &ModelSelector,
        audio: &AudioSource,
    ) -> Result<CompareOutcome, RemoteError> {
        let mut body = audio_fields(audio)?;
        body.insert("model_a".into(), selector_json(model_a));
        body.insert("model_b".into(), selector_json(model_b));

        log::debug!(
            "remote: compare {} vs {} on {}",
            model_a.label(),
            model_b.label(),
            audio.display_name()
        );
        self.post_json("evaluate/compare", &Value::Object(body)).await
    }

    async fn start_pipeline(&self, config: &TrainingConfig) -> Result<(), RemoteError> {
        let response = self
            .client
            .post(self.url("train/start"))
            .json(config)
            .send()
            .await?;
        check(response).await.map(|_| ())
    }

    async fn stop_pipeline(&self) -> Result<(), RemoteError> {
        let response = self.client.post(self.url("train/stop")).send().await?;
        check(response).await.map(|_| ())
    }

    async fn pipeline_status(&self) -> Result<PipelineSnapshot, RemoteError> {
        let response = self.client.get(self.url("train/status")).send().await?;
        read_json(response).await
    }

    async fn open_events(&self) -> Result<PushStream, RemoteError> {
        let response = self
            .client
            .get(self.url("events"))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = check(response).await?;

        let events = futures_util::stream::unfold(
            (
                Box::pin(response.bytes_stream()),
                SseDecoder::new(),
                VecDeque::<SseFrame>::new(),
            ),
            |(mut bytes, mut decoder, mut pending)| async move {
                loop {
                    if let Some(frame) = pending.pop_front() {
                        let event = PushEvent {
                            kind: frame.event,
                            data: frame.data,
                        };
                        return Some((Ok(event), (bytes, decoder, pending)));
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => pending.extend(decoder.feed(&chunk)),
                        Some(Err(e)) => {
                            return Some((Err(RemoteError::from(e)), (bytes, decoder, pending)))
                        }
                        None => return None,
                    }
                }
            },
        );

        Ok(Box::pin(events))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, RemoteError> {
        let response = self.client.get(self.url("evaluate/models")).send().await?;
        let list: ModelList<ModelInfo> = read_json(response).await?;
        Ok(list.models)
    }

    async fn base_models(&self) -> Result<Vec<String>, RemoteError> {
        let response = self.client.get(self.url("train/models")).send().await?;
        let list: ModelList<String> = read_json(response).await?;
        Ok(list.models)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
