//! Ollama generator over the native `/api/generate` endpoint
//!
//! Ollama answers with newline-delimited JSON: one object per fragment, the
//! last one carrying `done: true` plus timing and token counts. A reader task
//! decodes lines into [`GenerationChunk`]s and hands them over a bounded
//! channel, so a slow consumer applies back-pressure to the socket.

use crate::http;
use async_trait::async_trait;
use futures::StreamExt;
use ragframe_kernel::rag::{
    CancelSignal, ChunkStream, FinishReason, GenerateOptions, GenerationChunk, GenerationResult, Generator,
    ResponseFormatKind, TokenUsage, cancellable, collect_stream, terminated,
};
use ragframe_kernel::{RagError, RagResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

const BACKEND: &str = "ollama";
const CHANNEL_CAPACITY: usize = 32;

/// Ollama provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Base URL (default: http://localhost:11434)
    pub base_url: String,
    /// Default model id, e.g. mistral
    pub model: String,
    /// Request timeout, covering the whole streamed response
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "mistral".to_string(),
            timeout_secs: 120,
        }
    }
}

impl OllamaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            cfg.model = model;
        }
        if let Ok(base_url) = std::env::var("OLLAMA_BASE_URL") {
            cfg.base_url = base_url.trim_end_matches('/').to_string();
        }
        cfg
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[derive(Debug, Default, Serialize)]
struct ModelOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: ModelOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GenerateLine {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

fn finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        _ => FinishReason::Other,
    }
}

/// Decode one NDJSON line. Blank lines yield `None`.
fn parse_line(line: &[u8]) -> RagResult<Option<GenerationChunk>> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return Ok(None);
    }

    let raw: Value = serde_json::from_slice(line).map_err(|e| RagError::decode(format!("{BACKEND}: {e}")))?;
    let parsed: GenerateLine = serde_json::from_value(raw.clone())?;

    if let Some(error) = parsed.error {
        return Err(RagError::backend(BACKEND, None, error));
    }

    let usage = match (parsed.prompt_eval_count, parsed.eval_count) {
        (None, None) => None,
        (input, output) => Some(TokenUsage::new(input.unwrap_or(0), output.unwrap_or(0))),
    };
    let finish = match (&parsed.done_reason, parsed.done) {
        (Some(reason), _) => Some(finish_reason(reason)),
        (None, true) => Some(FinishReason::Stop),
        (None, false) => None,
    };

    Ok(Some(GenerationChunk {
        delta: parsed.response,
        is_last: parsed.done,
        raw: Some(raw),
        finish_reason: finish,
        usage,
    }))
}

/// Read an NDJSON response body on a background task.
///
/// The task stops at the first `done` line, on the first error, or as soon
/// as the receiving side is dropped.
fn spawn_reader(response: reqwest::Response) -> ChunkStream<GenerationChunk> {
    let (tx, rx) = mpsc::channel::<RagResult<GenerationChunk>>(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut body = response.bytes_stream();
        let mut buf: Vec<u8> = Vec::new();

        loop {
            let next = tokio::select! {
                _ = tx.closed() => return,
                next = body.next() => next,
            };
            let bytes = match next {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => {
                    let _ = tx.send(Err(http::map_error(BACKEND, e))).await;
                    return;
                }
                None => break,
            };
            buf.extend_from_slice(&bytes);

            while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buf.drain(..=pos).collect();
                match parse_line(&line) {
                    Ok(None) => {}
                    Ok(Some(chunk)) => {
                        let last = chunk.is_last;
                        if tx.send(Ok(chunk)).await.is_err() || last {
                            return;
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(Err(err)).await;
                        return;
                    }
                }
            }
        }

        // Trailing line without a newline terminator.
        match parse_line(&buf) {
            Ok(Some(chunk)) => {
                let _ = tx.send(Ok(chunk)).await;
            }
            Ok(None) => {}
            Err(err) => {
                let _ = tx.send(Err(err)).await;
            }
        }
    });

    Box::pin(ReceiverStream::new(rx))
}

/// Ollama text generator
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: reqwest::Client,
    config: OllamaConfig,
}

impl OllamaGenerator {
    pub fn new() -> Self {
        Self::with_config(OllamaConfig::default())
    }

    pub fn from_env() -> Self {
        Self::with_config(OllamaConfig::from_env())
    }

    pub fn with_config(config: OllamaConfig) -> Self {
        Self {
            client: http::client(config.timeout_secs),
            config,
        }
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn build_request(&self, prompt: &str, opts: &GenerateOptions) -> RagResult<GenerateRequest> {
        opts.validate()?;

        let mut prompt = prompt.to_string();
        let mut format = None;
        if let Some(rf) = &opts.response_format {
            match rf.kind {
                ResponseFormatKind::Text => {}
                ResponseFormatKind::Json => {
                    format = Some(rf.schema.clone().unwrap_or_else(|| Value::String("json".to_string())));
                }
                ResponseFormatKind::Markdown => {
                    if let Some(instruction) = rf.instruction() {
                        prompt = format!("{prompt}\n\n{instruction}");
                    }
                }
            }
        }

        Ok(GenerateRequest {
            model: opts.model.clone().unwrap_or_else(|| self.config.model.clone()),
            prompt,
            stream: true,
            options: ModelOptions {
                temperature: opts.temperature,
                num_predict: opts.effective_max_tokens(),
                stop: opts.stop_sequences.clone(),
            },
            format,
        })
    }

    async fn open_stream(&self, prompt: &str, opts: &GenerateOptions) -> RagResult<ChunkStream<GenerationChunk>> {
        let request = self.build_request(prompt, opts)?;
        debug!(model = %request.model, prompt_len = request.prompt.len(), "ollama generate");

        let response = self
            .client
            .post(http::join(&self.config.base_url, "api/generate"))
            .json(&request)
            .send()
            .await
            .map_err(|e| http::map_error(BACKEND, e))?;
        let response = http::check_status(BACKEND, response).await?;

        Ok(spawn_reader(response))
    }
}

impl Default for OllamaGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> RagResult<GenerationResult> {
        let stream = self.open_stream(prompt, opts).await?;
        collect_stream(terminated(stream)).await
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        opts: &GenerateOptions,
        signal: CancelSignal,
    ) -> RagResult<ChunkStream<GenerationChunk>> {
        let stream = signal.run(self.open_stream(prompt, opts)).await?;
        Ok(terminated(cancellable(stream, signal)))
    }
}
