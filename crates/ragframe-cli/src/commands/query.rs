//! `ragframe query` command implementation

use crate::cli::{Format, QueryArgs};
use colored::Colorize;
use futures::StreamExt;
use ragframe_foundation::RagConfig;
use ragframe_kernel::rag::{
    CancelSignal, ContextChunk, FallbackReason, QueryOptions, QueryOrchestrator, QueryResult, ResponseFormat,
    ResponseFormatKind,
};
use std::io::Write;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Overlay command-line flags on the configured query defaults.
pub fn build_options(config: &RagConfig, args: &QueryArgs) -> QueryOptions {
    let mut opts = config.query.to_query_options();

    if let Some(top_k) = args.top_k {
        opts.retrieve.top_k = top_k;
    }
    if let Some(threshold) = args.threshold {
        opts.retrieve.score_threshold = Some(threshold);
    }
    for (key, value) in &args.filters {
        opts.retrieve.filters.insert(key.clone(), value.clone().into());
    }

    opts.hybrid |= args.hybrid;

    if let Some(temperature) = args.temperature {
        opts.generate.temperature = Some(temperature);
    }
    if let Some(max_tokens) = args.max_tokens {
        opts.generate.max_tokens = max_tokens;
    }
    if let Some(model) = &args.model {
        opts.generate.model = Some(model.clone());
    }
    opts.generate.stop_sequences.extend(args.stop.iter().cloned());
    opts.generate.response_format = args.format.map(|format| {
        ResponseFormat::new(match format {
            Format::Text => ResponseFormatKind::Text,
            Format::Json => ResponseFormatKind::Json,
            Format::Markdown => ResponseFormatKind::Markdown,
        })
    });

    if let Some(secs) = args.timeout {
        opts.timeout = Some(Duration::from_secs(secs));
    }

    opts
}

pub async fn run(config: &RagConfig, args: QueryArgs) -> anyhow::Result<()> {
    let retriever = super::retriever(args.db, config)?;
    let generator = super::generator(args.llm, config)?;
    let orchestrator = QueryOrchestrator::new(retriever, generator);
    let opts = build_options(config, &args);

    let token = CancellationToken::new();
    let signal = CancelSignal::new(token.clone());
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, cancelling query");
            token.cancel();
        }
    });

    let outcome = if args.stream {
        stream_answer(&orchestrator, &args.question, &opts, signal).await
    } else {
        orchestrator
            .query_with_signal(&args.question, &opts, signal)
            .await
            .map(|result| print_result(&result))
            .map_err(Into::into)
    };

    ctrl_c.abort();
    outcome
}

async fn stream_answer(
    orchestrator: &QueryOrchestrator,
    question: &str,
    opts: &QueryOptions,
    signal: CancelSignal,
) -> anyhow::Result<()> {
    let mut stream = orchestrator.query_stream(question, opts, signal).await?;
    print_fallback(stream.fallback.as_ref());

    let mut stdout = std::io::stdout();
    while let Some(chunk) = stream.chunks.next().await {
        let chunk = chunk?;
        write!(stdout, "{}", chunk.delta)?;
        stdout.flush()?;
        if chunk.is_last {
            break;
        }
    }
    writeln!(stdout)?;

    print_contexts(&stream.contexts);
    Ok(())
}

fn print_result(result: &QueryResult) {
    print_fallback(result.fallback.as_ref());
    println!("{}", result.answer);
    print_contexts(&result.contexts);
    if let Some(usage) = &result.usage {
        println!(
            "{} {} prompt + {} completion tokens",
            "usage:".dimmed(),
            usage.input_tokens,
            usage.output_tokens
        );
    }
}

fn print_fallback(fallback: Option<&FallbackReason>) {
    let Some(reason) = fallback else { return };
    let why = match reason {
        FallbackReason::RetrievalFailed { error } => format!("retrieval failed: {error}"),
        FallbackReason::NoMatches => "no matching context".to_string(),
        FallbackReason::BelowThreshold { best, threshold } => {
            format!("best score {best:.3} below threshold {threshold:.3}")
        }
    };
    println!("{} answering without context ({})", "!".yellow(), why);
}

fn print_contexts(contexts: &[ContextChunk]) {
    if contexts.is_empty() {
        return;
    }
    println!();
    println!("  {}", "Context".bold());
    for (i, chunk) in contexts.iter().enumerate() {
        let score = chunk
            .score()
            .map(|s| format!("{s:.3}"))
            .unwrap_or_else(|| "-".to_string());
        let source = chunk.metadata().source.as_deref().unwrap_or("");
        println!(
            "  {} [{}] {} {}",
            format!("{}.", i + 1).dimmed(),
            score.cyan(),
            preview(chunk.text(), 80),
            source.dimmed()
        );
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{cut}…")
    }
}
