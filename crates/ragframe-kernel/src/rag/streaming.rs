//! Cancellable, ordered streaming
//!
//! Streamed output is an async [`Stream`] of `RagResult<T>` items rather than a
//! callback. A [`CancelSignal`] travels with each call; once it fires the
//! stream yields a single `Err(RagError::Cancelled)` and ends.

use crate::error::{RagError, RagResult};
use crate::rag::types::GenerationChunk;
use futures::stream::{self, Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Boxed stream of fallible items.
pub type ChunkStream<T> = Pin<Box<dyn Stream<Item = RagResult<T>> + Send>>;

/// Caller-controlled cancellation with an optional deadline.
///
/// Cloning shares the underlying token: cancelling any clone cancels all.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CancelSignal {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// A signal that only fires if someone cancels its token.
    pub fn never() -> Self {
        Self::default()
    }

    /// Add a deadline `timeout` from now. An earlier existing deadline wins.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        });
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the token is cancelled or the deadline passes.
    pub async fn cancelled(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Race `fut` against the signal.
    pub async fn run<T, F>(&self, fut: F) -> RagResult<T>
    where
        F: Future<Output = RagResult<T>>,
    {
        if self.is_cancelled() {
            return Err(RagError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(RagError::Cancelled),
            out = fut => out,
        }
    }
}

/// Stop `inner` as soon as `signal` fires.
///
/// Items are forwarded in order. After cancellation is observed exactly one
/// `Err(Cancelled)` is yielded and nothing else, even if `inner` already has
/// items ready. An error from `inner` ends the stream after being forwarded.
pub fn cancellable<T>(inner: ChunkStream<T>, signal: CancelSignal) -> ChunkStream<T>
where
    T: Send + 'static,
{
    let state = Some((inner, signal));
    Box::pin(stream::unfold(state, |state| async move {
        let (mut inner, signal) = match state {
            Some(state) => state,
            None => return None,
        };

        if signal.is_cancelled() {
            return Some((Err(RagError::Cancelled), None));
        }

        tokio::select! {
            biased;
            _ = signal.cancelled() => Some((Err(RagError::Cancelled), None)),
            next = inner.next() => match next {
                Some(Ok(item)) => Some((Ok(item), Some((inner, signal)))),
                Some(Err(err)) => Some((Err(err), None)),
                None => None,
            },
        }
    }))
}

/// Enforce the generation stream protocol.
///
/// Exactly one chunk with `is_last` is yielded and it is the final item, and
/// the source is never polled again after it. Compose it outermost, as
/// `terminated(cancellable(..))`, so a signal firing after the terminal
/// chunk cannot append an error to a finished answer. When
/// the source completes without one (completion signalled out of band), an
/// empty terminal chunk is synthesized. An error ends the stream without a
/// terminal chunk.
pub fn terminated(inner: ChunkStream<GenerationChunk>) -> ChunkStream<GenerationChunk> {
    Box::pin(stream::unfold(Some(inner), |state| async move {
        let mut inner = match state {
            Some(inner) => inner,
            None => return None,
        };
        match inner.next().await {
            Some(Ok(chunk)) if chunk.is_last => Some((Ok(chunk), None)),
            Some(Ok(chunk)) => Some((Ok(chunk), Some(inner))),
            Some(Err(err)) => Some((Err(err), None)),
            None => Some((Ok(GenerationChunk::last()), None)),
        }
    }))
}

/// Deliver an in-memory sequence in order, honoring `signal`.
///
/// The stream ends as soon as the last item has been delivered; a signal
/// that fires afterwards is not reported.
pub fn deliver<T>(items: Vec<T>, signal: CancelSignal) -> ChunkStream<T>
where
    T: Send + 'static,
{
    let state = Some((items.into_iter(), signal));
    Box::pin(stream::unfold(state, |state| async move {
        let (mut items, signal) = match state {
            Some(state) => state,
            None => return None,
        };
        let item = match items.next() {
            Some(item) => item,
            None => return None,
        };
        if signal.is_cancelled() {
            return Some((Err(RagError::Cancelled), None));
        }
        Some((Ok::<T, RagError>(item), Some((items, signal))))
    }))
}
