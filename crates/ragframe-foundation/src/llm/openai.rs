//! OpenAI generator (and OpenAI-compatible servers) via `async-openai`
//!
//! The prompt is sent as a single user message. When a response format needs
//! an instruction the API cannot express natively, it goes in a system
//! message ahead of it.

use async_openai::{
    Client,
    config::OpenAIConfig as AsyncOpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
        CreateChatCompletionStreamResponse, FinishReason as OpenAIFinishReason, ResponseFormat as OpenAIResponseFormat,
    },
};
use async_trait::async_trait;
use futures::StreamExt;
use ragframe_kernel::rag::{
    CancelSignal, ChunkStream, FinishReason, GenerateOptions, GenerationChunk, GenerationResult, Generator,
    ResponseFormatKind, TokenUsage, cancellable, terminated,
};
use ragframe_kernel::{RagError, RagResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

const BACKEND: &str = "openai";

/// OpenAI provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAIConfig {
    pub api_key: String,
    /// Override for OpenAI-compatible servers, e.g. http://localhost:8000/v1
    pub base_url: Option<String>,
    pub model: String,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: None,
            model: "gpt-4o-mini".to_string(),
        }
    }
}

impl OpenAIConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Read `OPENAI_API_KEY`, `OPENAI_BASE_URL` and `OPENAI_MODEL`.
    pub fn from_env() -> Self {
        let mut cfg = Self::new(std::env::var("OPENAI_API_KEY").unwrap_or_default());
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            cfg.base_url = Some(base_url);
        }
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            cfg.model = model;
        }
        cfg
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// OpenAI chat-completion generator
#[derive(Debug, Clone)]
pub struct OpenAIGenerator {
    client: Client<AsyncOpenAIConfig>,
    config: OpenAIConfig,
}

impl OpenAIGenerator {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_config(OpenAIConfig::new(api_key))
    }

    pub fn from_env() -> Self {
        Self::with_config(OpenAIConfig::from_env())
    }

    pub fn with_config(config: OpenAIConfig) -> Self {
        let mut openai_config = AsyncOpenAIConfig::new().with_api_key(&config.api_key);
        if let Some(ref base_url) = config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        Self {
            client: Client::with_config(openai_config),
            config,
        }
    }

    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    fn build_request(&self, prompt: &str, opts: &GenerateOptions, stream: bool) -> RagResult<CreateChatCompletionRequest> {
        opts.validate()?;

        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(2);
        let mut native_json = false;
        if let Some(rf) = &opts.response_format {
            // JSON mode requires the word "JSON" somewhere in the messages.
            native_json = rf.kind == ResponseFormatKind::Json;
            if let Some(instruction) = rf.instruction() {
                messages.push(
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(instruction)
                        .build()
                        .map_err(convert_error)?
                        .into(),
                );
            }
        }
        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(convert_error)?
                .into(),
        );

        let model = opts.model.clone().unwrap_or_else(|| self.config.model.clone());
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(model).messages(messages).stream(stream);

        if let Some(temperature) = opts.temperature {
            builder.temperature(temperature);
        }
        if let Some(max_tokens) = opts.effective_max_tokens() {
            #[allow(deprecated)]
            builder.max_tokens(max_tokens);
        }
        if !opts.stop_sequences.is_empty() {
            builder.stop(opts.stop_sequences.clone());
        }
        if native_json {
            builder.response_format(OpenAIResponseFormat::JsonObject);
        }

        builder.build().map_err(convert_error)
    }
}

fn convert_finish_reason(reason: OpenAIFinishReason) -> FinishReason {
    match reason {
        OpenAIFinishReason::Stop => FinishReason::Stop,
        OpenAIFinishReason::Length => FinishReason::Length,
        OpenAIFinishReason::ContentFilter => FinishReason::ContentFilter,
        _ => FinishReason::Other,
    }
}

fn convert_response(response: CreateChatCompletionResponse) -> RagResult<GenerationResult> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| RagError::decode("openai response has no choices"))?;

    let mut result = GenerationResult::new(choice.message.content.unwrap_or_default());
    result.finish_reason = choice.finish_reason.map(convert_finish_reason);
    result.usage = response
        .usage
        .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens));
    result
        .metadata
        .insert("model".to_string(), serde_json::Value::String(response.model));
    Ok(result)
}

/// Map one stream event. The event carrying a finish reason is terminal.
fn convert_chunk(chunk: CreateChatCompletionStreamResponse) -> GenerationChunk {
    let usage = chunk
        .usage
        .as_ref()
        .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens));
    let raw = serde_json::to_value(&chunk).ok();

    let (delta, finish) = chunk
        .choices
        .into_iter()
        .next()
        .map(|c| (c.delta.content.unwrap_or_default(), c.finish_reason))
        .unwrap_or_default();

    GenerationChunk {
        delta,
        is_last: finish.is_some(),
        raw,
        finish_reason: finish.map(convert_finish_reason),
        usage,
    }
}

fn convert_error(err: OpenAIError) -> RagError {
    match err {
        OpenAIError::ApiError(api_err) => RagError::backend(BACKEND, None, api_err.message),
        OpenAIError::Reqwest(e) => RagError::Connection(format!("{BACKEND}: {e}")),
        OpenAIError::JSONDeserialize(e) => RagError::decode(format!("{BACKEND}: {e}")),
        OpenAIError::StreamError(msg) => RagError::Connection(format!("{BACKEND}: {msg}")),
        OpenAIError::InvalidArgument(msg) => RagError::validation(msg),
        other => RagError::backend(BACKEND, None, other.to_string()),
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> RagResult<GenerationResult> {
        let request = self.build_request(prompt, opts, false)?;
        debug!(model = %request.model, "openai chat completion");

        let response = self.client.chat().create(request).await.map_err(convert_error)?;
        convert_response(response)
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        opts: &GenerateOptions,
        signal: CancelSignal,
    ) -> RagResult<ChunkStream<GenerationChunk>> {
        let request = self.build_request(prompt, opts, true)?;
        debug!(model = %request.model, "openai chat completion stream");

        let stream = signal
            .run(async { self.client.chat().create_stream(request).await.map_err(convert_error) })
            .await?;
        let converted: ChunkStream<GenerationChunk> = Box::pin(stream.map(|item| match item {
            Ok(chunk) => Ok(convert_chunk(chunk)),
            Err(e) => Err(convert_error(e)),
        }));

        Ok(terminated(cancellable(converted, signal)))
    }
}
