//! Query orchestration
//!
//! [`QueryOrchestrator`] drives one query through the retrieval and generation
//! collaborators:
//!
//! ```text
//! retrieving -> deciding -> generating        -> done
//!            \-> generating_direct (hybrid)   -> done
//! any stage  -> failed
//! ```
//!
//! It holds no mutable state, so one instance can serve concurrent queries as
//! long as its collaborators can.

use crate::error::QueryError;
use crate::rag::generator::{Generator, collect_stream};
use crate::rag::options::{FallbackTriggers, QueryOptions};
use crate::rag::prompt::build_prompt;
use crate::rag::retriever::Retriever;
use crate::rag::streaming::{CancelSignal, ChunkStream, cancellable, terminated};
use crate::rag::types::{ContextChunk, FallbackReason, GenerationChunk, QueryResult};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Orchestrator state, as reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStage {
    Retrieving,
    Deciding,
    Generating,
    GeneratingDirect,
    Done,
    Failed,
}

impl fmt::Display for QueryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Retrieving => "retrieving",
            Self::Deciding => "deciding",
            Self::Generating => "generating",
            Self::GeneratingDirect => "generating_direct",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of the deciding stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Inject these chunks into the prompt.
    UseContext(Vec<ContextChunk>),
    /// Generate from the bare query.
    Direct(FallbackReason),
    /// Nothing to generate from and no fallback applies.
    NoContext,
}

/// Decide whether retrieved chunks are sufficient.
///
/// `threshold` is only compared against chunk scores here when hybrid mode
/// has the low-score trigger enabled; the retriever has already filtered by
/// it, so chunks are never dropped one by one.
pub fn decide(
    chunks: Vec<ContextChunk>,
    threshold: Option<f32>,
    hybrid: bool,
    triggers: FallbackTriggers,
) -> Decision {
    if chunks.is_empty() {
        return if hybrid && triggers.on_empty {
            Decision::Direct(FallbackReason::NoMatches)
        } else {
            Decision::NoContext
        };
    }

    if hybrid && triggers.on_low_score {
        let best = chunks
            .iter()
            .filter_map(ContextChunk::score)
            .fold(None, |acc: Option<f32>, s| Some(acc.map_or(s, |a| a.max(s))));

        if let (Some(best), Some(threshold)) = (best, threshold) {
            if best < threshold {
                return Decision::Direct(FallbackReason::BelowThreshold { best, threshold });
            }
        }
    }

    Decision::UseContext(chunks)
}

/// Streaming answer to a query.
///
/// `contexts` and `fallback` are known up front; `chunks` yields the answer
/// and ends with exactly one terminal chunk unless it fails.
pub struct QueryStream {
    pub contexts: Vec<ContextChunk>,
    pub fallback: Option<FallbackReason>,
    pub chunks: ChunkStream<GenerationChunk>,
}

impl fmt::Debug for QueryStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryStream")
            .field("contexts", &self.contexts.len())
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

impl QueryStream {
    /// Drain the stream into a [`QueryResult`].
    pub async fn collect(self) -> Result<QueryResult, QueryError> {
        let result = collect_stream(self.chunks)
            .await
            .map_err(QueryError::Generation)?;

        Ok(QueryResult {
            answer: result.text,
            contexts: self.contexts,
            timestamp: Utc::now(),
            usage: result.usage,
            finish_reason: result.finish_reason,
            fallback: self.fallback,
        })
    }
}

struct Prepared {
    prompt: String,
    contexts: Vec<ContextChunk>,
    fallback: Option<FallbackReason>,
}

/// Retrieval-augmented query pipeline.
#[derive(Clone)]
pub struct QueryOrchestrator {
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn Generator>,
}

impl QueryOrchestrator {
    pub fn new(retriever: Arc<dyn Retriever>, generator: Arc<dyn Generator>) -> Self {
        Self {
            retriever,
            generator,
        }
    }

    pub fn retriever(&self) -> &Arc<dyn Retriever> {
        &self.retriever
    }

    pub fn generator(&self) -> &Arc<dyn Generator> {
        &self.generator
    }

    /// Answer `query` with one-shot generation.
    pub async fn query(&self, query: &str, opts: &QueryOptions) -> Result<QueryResult, QueryError> {
        self.query_with_signal(query, opts, CancelSignal::never()).await
    }

    /// Answer `query`, failing with a cancelled stage error if `signal` fires.
    pub async fn query_with_signal(
        &self,
        query: &str,
        opts: &QueryOptions,
        signal: CancelSignal,
    ) -> Result<QueryResult, QueryError> {
        let signal = with_deadline(signal, opts);
        let prepared = self.prepare(query, opts, &signal).await?;

        let result = signal
            .run(self.generator.generate(&prepared.prompt, &opts.generate))
            .await
            .map_err(|err| {
                debug!(stage = %QueryStage::Failed, generator = self.generator.name(), error = %err);
                QueryError::Generation(err)
            })?;

        debug!(
            stage = %QueryStage::Done,
            answer_len = result.text.len(),
            contexts = prepared.contexts.len()
        );

        Ok(QueryResult {
            answer: result.text,
            contexts: prepared.contexts,
            timestamp: Utc::now(),
            usage: result.usage,
            finish_reason: result.finish_reason,
            fallback: prepared.fallback,
        })
    }

    /// Answer `query` with streamed generation.
    ///
    /// Retrieval completes before this returns; the answer arrives through
    /// [`QueryStream::chunks`], which stops with `Cancelled` once `signal`
    /// fires.
    pub async fn query_stream(
        &self,
        query: &str,
        opts: &QueryOptions,
        signal: CancelSignal,
    ) -> Result<QueryStream, QueryError> {
        let signal = with_deadline(signal, opts);
        let prepared = self.prepare(query, opts, &signal).await?;

        let stream = signal
            .run(
                self.generator
                    .generate_stream(&prepared.prompt, &opts.generate, signal.clone()),
            )
            .await
            .map_err(|err| {
                debug!(stage = %QueryStage::Failed, generator = self.generator.name(), error = %err);
                QueryError::Generation(err)
            })?;

        Ok(QueryStream {
            contexts: prepared.contexts,
            fallback: prepared.fallback,
            chunks: terminated(cancellable(stream, signal)),
        })
    }

    async fn prepare(
        &self,
        query: &str,
        opts: &QueryOptions,
        signal: &CancelSignal,
    ) -> Result<Prepared, QueryError> {
        if query.trim().is_empty() {
            return Err(QueryError::Validation("query must not be empty".to_string()));
        }
        let resolved = opts.retrieve.resolve().map_err(QueryError::invalid)?;
        opts.generate.validate().map_err(QueryError::invalid)?;

        debug!(
            stage = %QueryStage::Retrieving,
            retriever = self.retriever.name(),
            top_k = resolved.top_k,
            hybrid = opts.hybrid
        );
        let retrieved = signal.run(self.retriever.retrieve(query, &opts.retrieve)).await;

        let decision = match retrieved {
            Err(err) if err.is_cancelled() => {
                debug!(stage = %QueryStage::Failed, "retrieval cancelled");
                return Err(QueryError::Retrieval(err));
            }
            Err(err) if opts.hybrid && opts.fallback.on_retrieval_error => {
                warn!(
                    retriever = self.retriever.name(),
                    error = %err,
                    "retrieval failed, falling back to direct generation"
                );
                Decision::Direct(FallbackReason::RetrievalFailed {
                    error: err.to_string(),
                })
            }
            Err(err) => {
                debug!(stage = %QueryStage::Failed, retriever = self.retriever.name(), error = %err);
                return Err(QueryError::Retrieval(err));
            }
            Ok(chunks) => {
                debug!(stage = %QueryStage::Deciding, retrieved = chunks.len());
                decide(chunks, resolved.score_threshold, opts.hybrid, opts.fallback)
            }
        };

        let (contexts, fallback, stage) = match decision {
            Decision::UseContext(chunks) => (chunks, None, QueryStage::Generating),
            Decision::Direct(reason) => (Vec::new(), Some(reason), QueryStage::GeneratingDirect),
            Decision::NoContext => {
                debug!(stage = %QueryStage::Failed, "no context retrieved");
                return Err(QueryError::NoContext);
            }
        };

        let prompt = build_prompt(query, &contexts);
        debug!(
            stage = %stage,
            generator = self.generator.name(),
            contexts = contexts.len(),
            prompt_tokens = self.generator.count_tokens(&prompt),
            fallback = ?fallback
        );

        Ok(Prepared {
            prompt,
            contexts,
            fallback,
        })
    }
}

fn with_deadline(signal: CancelSignal, opts: &QueryOptions) -> CancelSignal {
    match opts.timeout {
        Some(timeout) => signal.with_timeout(timeout),
        None => signal,
    }
}
