use futures::{StreamExt, TryStreamExt};
use ragframe_foundation::{
    EmbedderConfig, HttpEmbedder, OllamaConfig, OllamaGenerator, WeaviateConfig, WeaviateRetriever,
};
use ragframe_kernel::rag::{
    CancelSignal, FallbackReason, GenerateOptions, Generator, QueryOptions, QueryOrchestrator, RelevanceScore,
    RetrieveOptions, Retriever, build_prompt,
};
use ragframe_kernel::{QueryError, RagError};
use ragframe_testing::{MockGenerator, MockRetriever, ScriptedStreamGenerator, scored_chunk};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn five_chunks() -> Vec<ragframe_kernel::rag::ContextChunk> {
    (0..5)
        .map(|i| scored_chunk(&format!("chunk {i}"), 0.9 - i as f32 * 0.1))
        .collect()
}

#[tokio::test]
async fn test_answer_uses_retrieved_context() {
    let retriever = MockRetriever::new(vec![scored_chunk("Paris is the capital of France.", 0.92)]);
    let generator = MockGenerator::new();
    generator.add_mock_response("Paris is the capital of France.", "Paris.");
    let orch = QueryOrchestrator::new(Arc::new(retriever.clone()), Arc::new(generator.clone()));

    let opts = QueryOptions::default().with_generate(GenerateOptions::default().with_temperature(0.0));
    let result = orch.query("What is the capital of France?", &opts).await.unwrap();

    assert_eq!(result.answer, "Paris.");
    assert_eq!(result.contexts.len(), 1);
    assert!(result.fallback.is_none());
    assert_eq!(
        generator.last_prompt(),
        Some(build_prompt("What is the capital of France?", &result.contexts))
    );
    ragframe_testing::assert_called!(retriever, 1);
    ragframe_testing::assert_called!(generator, 1);
}

#[tokio::test]
async fn test_hybrid_empty_retrieval_generates_directly() {
    let generator = MockGenerator::new();
    let orch = QueryOrchestrator::new(Arc::new(MockRetriever::empty()), Arc::new(generator.clone()));

    let result = orch.query("Tell me a joke", &QueryOptions::hybrid()).await.unwrap();

    assert!(result.contexts.is_empty());
    assert_eq!(result.fallback, Some(FallbackReason::NoMatches));
    assert_eq!(generator.last_prompt().as_deref(), Some("Tell me a joke"));
}

#[tokio::test]
async fn test_hybrid_retrieval_failure_generates_directly() {
    let generator = MockGenerator::new();
    let retriever = MockRetriever::failing(RagError::Connection("connection refused".to_string()));
    let orch = QueryOrchestrator::new(Arc::new(retriever), Arc::new(generator.clone()));

    let result = orch.query("q", &QueryOptions::hybrid()).await.unwrap();

    assert!(matches!(result.fallback, Some(FallbackReason::RetrievalFailed { .. })));
    ragframe_testing::assert_called!(generator, 1);
}

#[tokio::test]
async fn test_retrieval_failure_without_hybrid_skips_generation() {
    let generator = MockGenerator::new();
    let retriever = MockRetriever::failing(RagError::Connection("connection refused".to_string()));
    let orch = QueryOrchestrator::new(Arc::new(retriever), Arc::new(generator.clone()));

    let err = orch.query("q", &QueryOptions::default()).await.unwrap_err();

    assert!(matches!(err, QueryError::Retrieval(RagError::Connection(_))));
    ragframe_testing::assert_called!(generator, 0);
}

#[tokio::test]
async fn test_empty_retrieval_without_hybrid_is_no_context() {
    let generator = MockGenerator::new();
    let orch = QueryOrchestrator::new(Arc::new(MockRetriever::empty()), Arc::new(generator.clone()));

    let err = orch.query("q", &QueryOptions::default()).await.unwrap_err();

    assert!(matches!(err, QueryError::NoContext));
    ragframe_testing::assert_called!(generator, 0);
}

#[tokio::test]
async fn test_top_k_and_threshold_reach_retriever() {
    let retriever = MockRetriever::new(five_chunks());
    let orch = QueryOrchestrator::new(Arc::new(retriever.clone()), Arc::new(MockGenerator::new()));

    let opts = QueryOptions::default().with_retrieve(RetrieveOptions::default().with_top_k(3).with_score_threshold(0.75));
    let result = orch.query("q", &opts).await.unwrap();

    // scores 0.9 and 0.8 pass the threshold
    assert_eq!(result.contexts.len(), 2);
    let (query, seen) = retriever.history().pop().unwrap();
    assert_eq!(query, "q");
    assert_eq!(seen.top_k, 3);
}

#[tokio::test]
async fn test_invalid_options_fail_before_io() {
    let retriever = MockRetriever::new(five_chunks());
    let generator = MockGenerator::new();
    let orch = QueryOrchestrator::new(Arc::new(retriever.clone()), Arc::new(generator.clone()));

    let opts = QueryOptions::default().with_generate(GenerateOptions::default().with_temperature(3.5));
    let err = orch.query("q", &opts).await.unwrap_err();
    assert!(matches!(err, QueryError::Validation(_)));

    let err = orch.query("   ", &QueryOptions::default()).await.unwrap_err();
    assert!(matches!(err, QueryError::Validation(_)));

    ragframe_testing::assert_called!(retriever, 0);
    ragframe_testing::assert_called!(generator, 0);
}

#[tokio::test]
async fn test_retrieve_stream_stops_after_cancel() {
    let retriever = MockRetriever::new(five_chunks());
    let signal = CancelSignal::never();

    let mut stream = retriever
        .retrieve_stream("q", &RetrieveOptions::default(), signal.clone())
        .await
        .unwrap();

    assert_eq!(stream.next().await.unwrap().unwrap().text(), "chunk 0");
    assert_eq!(stream.next().await.unwrap().unwrap().text(), "chunk 1");
    signal.cancel();

    assert!(matches!(stream.next().await, Some(Err(RagError::Cancelled))));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_generate_stream_stops_after_cancel() {
    let generator = ScriptedStreamGenerator::new(["one ", "two ", "three ", "four ", "five"]);
    let signal = CancelSignal::never();

    let mut stream = generator
        .generate_stream("q", &GenerateOptions::default(), signal.clone())
        .await
        .unwrap();

    assert_eq!(stream.next().await.unwrap().unwrap().delta, "one ");
    assert_eq!(stream.next().await.unwrap().unwrap().delta, "two ");
    signal.cancel();

    assert!(matches!(stream.next().await, Some(Err(RagError::Cancelled))));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_query_stream_cancel_mid_answer() {
    let generator = ScriptedStreamGenerator::new(["a", "b", "c", "d", "e"]);
    let orch = QueryOrchestrator::new(Arc::new(MockRetriever::new(five_chunks())), Arc::new(generator));
    let signal = CancelSignal::never();

    let mut stream = orch
        .query_stream("q", &QueryOptions::default(), signal.clone())
        .await
        .unwrap();
    assert_eq!(stream.contexts.len(), 5);

    stream.chunks.next().await.unwrap().unwrap();
    stream.chunks.next().await.unwrap().unwrap();
    signal.cancel();

    assert!(matches!(stream.chunks.next().await, Some(Err(RagError::Cancelled))));
    assert!(stream.chunks.next().await.is_none());
}

#[tokio::test]
async fn test_query_stream_synthesizes_terminal_chunk() {
    let generator = ScriptedStreamGenerator::new(["x", "y"]).without_terminal();
    let orch = QueryOrchestrator::new(Arc::new(MockRetriever::new(five_chunks())), Arc::new(generator));

    let chunks: Vec<_> = orch
        .query_stream("q", &QueryOptions::default(), CancelSignal::never())
        .await
        .unwrap()
        .chunks
        .try_collect()
        .await
        .unwrap();

    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks.iter().filter(|c| c.is_last).count(), 1);
    assert!(chunks[2].is_last);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_cancels_slow_stream() {
    let generator = ScriptedStreamGenerator::new(["slow"]).with_delay(Duration::from_secs(5));
    let orch = QueryOrchestrator::new(Arc::new(MockRetriever::new(five_chunks())), Arc::new(generator));
    let opts = QueryOptions::default().with_timeout(Duration::from_millis(100));

    let mut stream = orch.query_stream("q", &opts, CancelSignal::never()).await.unwrap();

    assert!(matches!(stream.chunks.next().await, Some(Err(RagError::Cancelled))));
    assert!(stream.chunks.next().await.is_none());
}

#[tokio::test]
async fn test_cancelled_query_is_retrieval_error() {
    let generator = MockGenerator::new();
    let orch = QueryOrchestrator::new(Arc::new(MockRetriever::new(five_chunks())), Arc::new(generator.clone()));
    let signal = CancelSignal::never();
    signal.cancel();

    // a cancelled hybrid query must not fall back
    let err = orch.query_with_signal("q", &QueryOptions::hybrid(), signal).await.unwrap_err();

    assert!(err.is_cancelled());
    assert!(matches!(err, QueryError::Retrieval(RagError::Cancelled)));
    ragframe_testing::assert_called!(generator, 0);
}

#[tokio::test]
async fn test_stream_and_batch_answers_match() {
    let generator = MockGenerator::new();
    generator.add_mock_response("chunk 0", "Streaming and batch agree.");
    let orch = QueryOrchestrator::new(Arc::new(MockRetriever::new(five_chunks())), Arc::new(generator));
    let opts = QueryOptions::default();

    let batch = orch.query("q", &opts).await.unwrap();
    let streamed = orch
        .query_stream("q", &opts, CancelSignal::never())
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();

    assert_eq!(streamed.answer, batch.answer);
    assert_eq!(streamed.contexts, batch.contexts);
    assert_eq!(streamed.finish_reason, batch.finish_reason);
}

#[test]
fn test_token_count_is_monotonic() {
    let generator = MockGenerator::new();
    let mut text = String::new();
    let mut previous = generator.count_tokens(&text);
    assert_eq!(previous, 0);

    for word in ["alpha", " beta", " gamma", " δέλτα", " 😀"] {
        text.push_str(word);
        let current = generator.count_tokens(&text);
        assert!(current >= previous);
        previous = current;
    }
}

#[tokio::test]
async fn test_end_to_end_over_http() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([[0.5, 0.5]])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/graphql"))
        .and(body_string_contains("nearVector: {vector: [0.5,0.5]}"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "Get": { "Document": [
                { "text": "Paris is the capital of France.", "_additional": { "id": "a1", "certainty": 0.93 } }
            ] } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ndjson = concat!(
        "{\"model\":\"mistral\",\"response\":\"Paris\",\"done\":false}\n",
        "{\"model\":\"mistral\",\"response\":\".\",\"done\":false}\n",
        "{\"model\":\"mistral\",\"response\":\"\",\"done\":true,\"done_reason\":\"stop\",\"prompt_eval_count\":20,\"eval_count\":2}\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_string_contains("Paris is the capital of France."))
        .respond_with(ResponseTemplate::new(200).set_body_raw(ndjson, "application/x-ndjson"))
        .expect(1)
        .mount(&server)
        .await;

    let embedder = HttpEmbedder::new(EmbedderConfig::default().with_url(format!("{}/embed", server.uri())));
    let retriever = WeaviateRetriever::new(WeaviateConfig::default().with_url(server.uri())).with_embedder(Arc::new(embedder));
    let generator = OllamaGenerator::with_config(OllamaConfig::default().with_base_url(server.uri()));
    let orch = QueryOrchestrator::new(Arc::new(retriever), Arc::new(generator));

    let result = orch
        .query("What is the capital of France?", &QueryOptions::default())
        .await
        .unwrap();

    assert_eq!(result.answer, "Paris.");
    assert_eq!(result.contexts.len(), 1);
    assert_eq!(result.contexts[0].metadata().score, Some(RelevanceScore::Certainty(0.93)));
    assert_eq!(result.contexts[0].metadata().extra.get("object_id"), Some(&json!("a1")));
    assert_eq!(result.usage.map(|u| u.total_tokens), Some(22));
}
