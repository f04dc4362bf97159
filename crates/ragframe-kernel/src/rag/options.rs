//! Caller options and their resolution against defaults
//!
//! Resolution is pure and happens before any collaborator is called, so an
//! invalid option never costs a network round-trip.

use crate::error::{RagError, RagResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Chunks returned when the caller leaves `top_k` unset (or zero).
pub const DEFAULT_TOP_K: usize = 5;

/// Upper bound on `top_k`.
pub const MAX_TOP_K: usize = 1000;

/// Temperature range accepted by every generator.
pub const TEMPERATURE_RANGE: std::ops::RangeInclusive<f32> = 0.0..=2.0;

/// Options for a retrieval call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieveOptions {
    /// Maximum chunks to return. `0` means [`DEFAULT_TOP_K`], never unlimited.
    pub top_k: usize,
    /// Minimum relevance, applied by the retriever itself.
    pub score_threshold: Option<f32>,
    /// Backend-specific metadata equality filters.
    pub filters: HashMap<String, serde_json::Value>,
}

/// Retrieval options after defaults and bounds have been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRetrieveOptions {
    pub top_k: usize,
    pub score_threshold: Option<f32>,
    pub filters: HashMap<String, serde_json::Value>,
}

impl RetrieveOptions {
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = Some(threshold);
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    /// Apply defaults and reject out-of-range values.
    pub fn resolve(&self) -> RagResult<ResolvedRetrieveOptions> {
        if self.top_k > MAX_TOP_K {
            return Err(RagError::validation(format!(
                "top_k must be at most {MAX_TOP_K}, got {}",
                self.top_k
            )));
        }

        if let Some(threshold) = self.score_threshold {
            if !(threshold.is_finite() && (0.0..=1.0).contains(&threshold)) {
                return Err(RagError::validation(format!(
                    "score_threshold must be within [0, 1], got {threshold}"
                )));
            }
        }

        Ok(ResolvedRetrieveOptions {
            top_k: if self.top_k == 0 { DEFAULT_TOP_K } else { self.top_k },
            score_threshold: self.score_threshold,
            filters: self.filters.clone(),
        })
    }
}

/// Structured-output flavor requested from the generator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormatKind {
    #[default]
    Text,
    Json,
    Markdown,
}

impl std::str::FromStr for ResponseFormatKind {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(RagError::validation(format!("unknown response format '{other}'"))),
        }
    }
}

/// Requested structure of the generated output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: ResponseFormatKind,
    /// JSON schema for `json` output, when the backend supports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
    /// Format-specific flags, e.g. `headers = "false"` for markdown.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub options: HashMap<String, String>,
}

impl ResponseFormat {
    pub fn new(kind: ResponseFormatKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    pub fn json_schema(schema: serde_json::Value) -> Self {
        Self {
            kind: ResponseFormatKind::Json,
            schema: Some(schema),
            options: HashMap::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Plain-language instruction for backends without native support.
    pub fn instruction(&self) -> Option<String> {
        match self.kind {
            ResponseFormatKind::Text => None,
            ResponseFormatKind::Json => Some(match &self.schema {
                Some(schema) => format!("Respond only with JSON matching this schema: {schema}"),
                None => "Respond only with a valid JSON object.".to_string(),
            }),
            ResponseFormatKind::Markdown => {
                let headers = self.options.get("headers").is_none_or(|v| v != "false");
                Some(if headers {
                    "Format the answer as Markdown.".to_string()
                } else {
                    "Format the answer as Markdown without headings.".to_string()
                })
            }
        }
    }
}

/// Options for a generation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateOptions {
    /// Backend model identifier; `None` uses the generator's configured model.
    pub model: Option<String>,
    /// Unset means the backend's own default; never synthesized here.
    pub temperature: Option<f32>,
    /// `0` means the backend default.
    pub max_tokens: u32,
    pub stop_sequences: Vec<String>,
    pub response_format: Option<ResponseFormat>,
}

impl GenerateOptions {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_stop_sequence(mut self, stop: impl Into<String>) -> Self {
        self.stop_sequences.push(stop.into());
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    pub fn validate(&self) -> RagResult<()> {
        match self.temperature {
            Some(t) if !(t.is_finite() && TEMPERATURE_RANGE.contains(&t)) => Err(
                RagError::validation(format!("temperature must be within [0, 2], got {t}")),
            ),
            _ => Ok(()),
        }
    }

    pub fn effective_max_tokens(&self) -> Option<u32> {
        (self.max_tokens > 0).then_some(self.max_tokens)
    }
}

/// Which conditions let hybrid mode generate without context.
///
/// Each trigger is independent. They are only consulted when
/// [`QueryOptions::hybrid`] is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackTriggers {
    pub on_retrieval_error: bool,
    pub on_empty: bool,
    pub on_low_score: bool,
}

impl Default for FallbackTriggers {
    fn default() -> Self {
        Self {
            on_retrieval_error: true,
            on_empty: true,
            on_low_score: true,
        }
    }
}

impl FallbackTriggers {
    pub fn none() -> Self {
        Self {
            on_retrieval_error: false,
            on_empty: false,
            on_low_score: false,
        }
    }
}

/// Options for a full query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    pub retrieve: RetrieveOptions,
    pub generate: GenerateOptions,
    /// Fall back to direct generation when retrieval fails or is insufficient.
    pub hybrid: bool,
    pub fallback: FallbackTriggers,
    /// Deadline for the whole query, retrieval and generation included.
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl QueryOptions {
    pub fn hybrid() -> Self {
        Self {
            hybrid: true,
            ..Default::default()
        }
    }

    pub fn with_retrieve(mut self, retrieve: RetrieveOptions) -> Self {
        self.retrieve = retrieve;
        self
    }

    pub fn with_generate(mut self, generate: GenerateOptions) -> Self {
        self.generate = generate;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackTriggers) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
