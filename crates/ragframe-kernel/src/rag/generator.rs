//! Generation contract

use crate::error::RagResult;
use crate::rag::options::GenerateOptions;
use crate::rag::streaming::{CancelSignal, ChunkStream, deliver};
use crate::rag::tokens::{CharBasedEstimator, TokenEstimator};
use crate::rag::types::{GenerationChunk, GenerationResult};
use async_trait::async_trait;
use futures::StreamExt;

/// A text-generation backend.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Backend name used in logs and error attribution.
    fn name(&self) -> &str;

    /// One-shot generation.
    ///
    /// Implementations that consume a chunked transport must accumulate every
    /// fragment before returning; partial output is never exposed here.
    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> RagResult<GenerationResult>;

    /// Streamed generation.
    ///
    /// The returned stream yields chunks in emission order and exactly one
    /// chunk with `is_last`, as its final item, unless it fails first.
    /// Wrap backend streams as `terminated(cancellable(stream, signal))`
    /// (see [`terminated`](crate::rag::streaming::terminated)) to get both
    /// guarantees.
    ///
    /// The default implementation runs `generate` and delivers the whole text
    /// as one fragment followed by the terminal chunk.
    async fn generate_stream(
        &self,
        prompt: &str,
        opts: &GenerateOptions,
        signal: CancelSignal,
    ) -> RagResult<ChunkStream<GenerationChunk>> {
        let result = signal.run(self.generate(prompt, opts)).await?;
        let last = GenerationChunk {
            finish_reason: result.finish_reason,
            usage: result.usage,
            ..GenerationChunk::last()
        };
        Ok(deliver(vec![GenerationChunk::text(result.text), last], signal))
    }

    /// Deterministic token estimate, monotonic in input length.
    fn count_tokens(&self, text: &str) -> usize {
        CharBasedEstimator::default().estimate(text)
    }
}

/// Drain a generation stream into a single result.
///
/// Fragments are concatenated in order; usage and finish reason are taken
/// from the last chunk that carries them.
pub async fn collect_stream(mut stream: ChunkStream<GenerationChunk>) -> RagResult<GenerationResult> {
    let mut result = GenerationResult::default();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        result.text.push_str(&chunk.delta);
        if chunk.usage.is_some() {
            result.usage = chunk.usage;
        }
        if chunk.finish_reason.is_some() {
            result.finish_reason = chunk.finish_reason;
        }
        if chunk.is_last {
            break;
        }
    }
    Ok(result)
}
