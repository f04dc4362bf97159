use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use ragframe_kernel::rag::{
    CancelSignal, ChunkStream, FinishReason, GenerateOptions, GenerationChunk, GenerationResult, Generator,
    TokenUsage, cancellable, terminated,
};
use ragframe_kernel::{RagError, RagResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// A mock generator with predefined responses keyed by prompt substring.
///
/// Keys are checked in registration order and the first one the prompt
/// contains wins; with no match the fallback response is returned. Streaming uses the
/// default one-chunk-plus-terminal delivery.
#[derive(Clone)]
pub struct MockGenerator {
    predefined_responses: Arc<RwLock<Vec<(String, String)>>>,
    fallback_response: String,
    error: Option<RagError>,
    calls: Arc<AtomicUsize>,
    prompts: Arc<RwLock<Vec<String>>>,
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            predefined_responses: Arc::new(RwLock::new(Vec::new())),
            fallback_response: "This is a fallback mock response.".to_string(),
            error: None,
            calls: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// A generator whose every call fails with `error`.
    pub fn failing(error: RagError) -> Self {
        Self {
            error: Some(error),
            ..Self::new()
        }
    }

    /// Return `response` whenever the prompt contains `prompt_key`.
    ///
    /// Registering an existing key replaces its response in place.
    pub fn add_mock_response(&self, prompt_key: &str, response: &str) {
        if let Ok(mut resps) = self.predefined_responses.write() {
            match resps.iter_mut().find(|(key, _)| key == prompt_key) {
                Some((_, existing)) => *existing = response.to_string(),
                None => resps.push((prompt_key.to_string(), response.to_string())),
            }
        }
    }

    pub fn set_fallback_response(&mut self, response: &str) {
        self.fallback_response = response.to_string();
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.read().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts().pop()
    }

    fn respond(&self, prompt: &str) -> String {
        if let Ok(resps) = self.predefined_responses.read() {
            for (key, response) in resps.iter() {
                if prompt.contains(key) {
                    return response.clone();
                }
            }
        }
        self.fallback_response.clone()
    }
}

#[async_trait]
impl Generator for MockGenerator {
    fn name(&self) -> &str {
        "mock-generator"
    }

    async fn generate(&self, prompt: &str, _opts: &GenerateOptions) -> RagResult<GenerationResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.write() {
            prompts.push(prompt.to_string());
        }

        if let Some(err) = &self.error {
            return Err(err.clone());
        }

        let text = self.respond(prompt);
        let usage = TokenUsage::new(tokens_u32(self.count_tokens(prompt)), tokens_u32(self.count_tokens(&text)));
        Ok(GenerationResult::new(text)
            .with_usage(usage)
            .with_finish_reason(FinishReason::Stop))
    }
}

fn tokens_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// A generator that streams a fixed script of fragments.
///
/// Each fragment becomes one chunk; a terminal chunk follows unless
/// [`without_terminal`](Self::without_terminal) was called, which leaves the
/// end of the stream to signal completion.
#[derive(Clone)]
pub struct ScriptedStreamGenerator {
    fragments: Vec<String>,
    delay: Option<Duration>,
    emit_terminal: bool,
    calls: Arc<AtomicUsize>,
}

impl ScriptedStreamGenerator {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            delay: None,
            emit_terminal: true,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sleep this long before each chunk.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn without_terminal(mut self) -> Self {
        self.emit_terminal = false;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn script(&self) -> Vec<GenerationChunk> {
        let mut chunks: Vec<GenerationChunk> = self.fragments.iter().map(GenerationChunk::text).collect();
        if self.emit_terminal {
            let mut last = GenerationChunk::last();
            last.finish_reason = Some(FinishReason::Stop);
            chunks.push(last);
        }
        chunks
    }
}

#[async_trait]
impl Generator for ScriptedStreamGenerator {
    fn name(&self) -> &str {
        "scripted-stream"
    }

    async fn generate(&self, _prompt: &str, _opts: &GenerateOptions) -> RagResult<GenerationResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(GenerationResult::new(self.fragments.concat()).with_finish_reason(FinishReason::Stop))
    }

    async fn generate_stream(
        &self,
        _prompt: &str,
        _opts: &GenerateOptions,
        signal: CancelSignal,
    ) -> RagResult<ChunkStream<GenerationChunk>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if signal.is_cancelled() {
            return Err(RagError::Cancelled);
        }

        let delay = self.delay;
        let chunks = stream::iter(self.script()).then(move |chunk| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok::<GenerationChunk, RagError>(chunk)
        });
        let stream = cancellable(Box::pin(chunks), signal);
        if self.emit_terminal {
            Ok(terminated(stream))
        } else {
            Ok(stream)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_mock_generator_matches_prompt_substring() {
        let generator = MockGenerator::new();
        generator.add_mock_response("France", "Paris");

        let hit = generator.generate("capital of France?", &GenerateOptions::default()).await.unwrap();
        let miss = generator.generate("capital of Peru?", &GenerateOptions::default()).await.unwrap();

        assert_eq!(hit.text, "Paris");
        assert_eq!(miss.text, "This is a fallback mock response.");
        assert_eq!(generator.call_count(), 2);
        assert_eq!(generator.last_prompt().as_deref(), Some("capital of Peru?"));
    }

    #[tokio::test]
    async fn test_first_registered_key_wins() {
        let generator = MockGenerator::new();
        generator.add_mock_response("capital", "first");
        generator.add_mock_response("France", "second");
        generator.add_mock_response("capital", "replaced");

        for _ in 0..10 {
            let out = generator
                .generate("capital of France?", &GenerateOptions::default())
                .await
                .unwrap();
            assert_eq!(out.text, "replaced");
        }
    }

    #[tokio::test]
    async fn test_scripted_stream_order() {
        let generator = ScriptedStreamGenerator::new(["a", "b", "c"]);
        let chunks: Vec<_> = generator
            .generate_stream("q", &GenerateOptions::default(), CancelSignal::never())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        let deltas: Vec<_> = chunks.iter().map(|c| c.delta.as_str()).collect();
        assert_eq!(deltas, vec!["a", "b", "c", ""]);
        assert!(chunks[3].is_last);
    }
}
