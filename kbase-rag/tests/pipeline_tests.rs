//! Integration tests for folder ingestion and threshold-gated retrieval.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use kbase_rag::{
    EmbeddingProvider, EmbeddingVector, HashEmbeddingProvider, PipelineState, RagConfig, RagError,
    RagPipeline, Result, VectorIndex, grounding_context,
};
use tempfile::TempDir;

/// Looks vectors up by exact text; unknown text is a provider failure.
#[derive(Default)]
struct TableEmbedder {
    table: HashMap<String, Vec<f32>>,
    batch_calls: AtomicUsize,
}

impl TableEmbedder {
    fn new(entries: &[(&str, Vec<f32>)]) -> Self {
        Self {
            table: entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            batch_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for TableEmbedder {
    fn name(&self) -> &str {
        "table"
    }

    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        self.table
            .get(text)
            .cloned()
            .map(EmbeddingVector::new)
            .ok_or_else(|| RagError::provider("table", format!("no vector for '{text}'")))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<EmbeddingVector>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Simulates an unreachable embedding service.
struct UnavailableEmbedder;

#[async_trait]
impl EmbeddingProvider for UnavailableEmbedder {
    async fn embed(&self, _text: &str) -> Result<EmbeddingVector> {
        Err(RagError::provider("unavailable", "connection refused"))
    }
}

/// Returns one vector fewer than requested.
struct ShortBatchEmbedder;

#[async_trait]
impl EmbeddingProvider for ShortBatchEmbedder {
    async fn embed(&self, _text: &str) -> Result<EmbeddingVector> {
        Ok(EmbeddingVector::new(vec![1.0]))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<EmbeddingVector>> {
        Ok(texts.iter().skip(1).map(|_| EmbeddingVector::new(vec![1.0])).collect())
    }
}

/// Never answers.
struct PendingEmbedder;

#[async_trait]
impl EmbeddingProvider for PendingEmbedder {
    async fn embed(&self, _text: &str) -> Result<EmbeddingVector> {
        std::future::pending().await
    }
}

fn docs(files: &[(&str, &str)]) -> TempDir {
    let temp = tempfile::tempdir().unwrap();
    for (name, text) in files {
        fs::write(temp.path().join(name), text).unwrap();
    }
    temp
}

fn build_pipeline(dir: &Path, config: RagConfig, provider: Arc<dyn EmbeddingProvider>) -> RagPipeline {
    RagPipeline::builder()
        .config(config)
        .embedding_provider(provider)
        .documents_dir(dir)
        .build()
        .unwrap()
}

#[tokio::test]
async fn single_short_document_matches_identical_query_with_score_one() {
    let dir = docs(&[("a.txt", "refunds are issued within 30 days")]);
    let embedder = Arc::new(TableEmbedder::new(&[
        ("refunds are issued within 30 days", vec![0.6, 0.8]),
        ("refund policy?", vec![0.6, 0.8]),
    ]));
    let mut pipeline = build_pipeline(dir.path(), RagConfig::default(), embedder.clone());

    let report = pipeline.ingest().await.unwrap();
    assert_eq!(report.documents, 1);
    assert_eq!(report.chunks, 1);
    assert_eq!(report.dimensions, Some(2));
    assert_eq!(pipeline.state(), PipelineState::Ready);
    assert_eq!(pipeline.index().len(), 1);
    assert_eq!(pipeline.chunks()[0].overlap, 0);
    assert_eq!(embedder.batch_calls.load(Ordering::SeqCst), 1);

    let results = pipeline.retrieve("refund policy?").await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].score, 1.0);
    assert_eq!(results[0].text, "refunds are issued within 30 days");
    assert_eq!(results[0].source, "a.txt");
}

#[tokio::test]
async fn threshold_keeps_scores_at_or_above_and_drops_the_rest() {
    let dir = docs(&[("a.txt", "alpha"), ("b.txt", "beta"), ("c.txt", "gamma")]);
    let embedder = Arc::new(TableEmbedder::new(&[
        ("alpha", vec![0.1f32.sqrt(), 0.0]),
        ("beta", vec![0.0, 0.4f32.sqrt()]),
        ("gamma", vec![1.0, 0.0]),
        ("query", vec![0.0, 0.0]),
    ]));
    let mut pipeline = build_pipeline(dir.path(), RagConfig::default(), embedder);
    pipeline.ingest().await.unwrap();

    let results = pipeline.retrieve("query").await.unwrap();
    assert_eq!(results.iter().map(|r| r.text.as_str()).collect::<Vec<_>>(), vec!["alpha", "beta"]);
    assert!((results[0].score - 0.95).abs() < 1e-5);
    assert!((results[1].score - 0.8).abs() < 1e-5);
    assert!(results.iter().all(|r| r.score >= 0.75));

    // Lowering the threshold lets the distance-1.0 chunk (score 0.5) through.
    let dir = docs(&[("a.txt", "alpha"), ("b.txt", "beta"), ("c.txt", "gamma")]);
    let embedder = Arc::new(TableEmbedder::new(&[
        ("alpha", vec![0.1f32.sqrt(), 0.0]),
        ("beta", vec![0.0, 0.4f32.sqrt()]),
        ("gamma", vec![1.0, 0.0]),
        ("query", vec![0.0, 0.0]),
    ]));
    let config = RagConfig::builder().similarity_threshold(0.5).build().unwrap();
    let mut relaxed = build_pipeline(dir.path(), config, embedder);
    relaxed.ingest().await.unwrap();
    let results = relaxed.retrieve("query").await.unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[2].text, "gamma");
    assert_eq!(results[2].score, 0.5);
}

#[tokio::test]
async fn empty_folder_is_ready_and_returns_no_results() {
    let dir = tempfile::tempdir().unwrap();
    // The provider is never called for an empty knowledge base.
    let mut pipeline = build_pipeline(dir.path(), RagConfig::default(), Arc::new(UnavailableEmbedder));

    let report = pipeline.ingest().await.unwrap();
    assert_eq!(report.chunks, 0);
    assert_eq!(report.dimensions, None);
    assert_eq!(pipeline.state(), PipelineState::Ready);
    assert!(pipeline.index().is_empty());
    assert!(pipeline.retrieve("anything").await.unwrap().is_empty());
}

#[tokio::test]
async fn folder_with_only_empty_or_unrecognized_files_is_an_empty_index() {
    let dir = docs(&[("empty.txt", ""), ("notes.md", "not ingested")]);
    let mut pipeline = build_pipeline(dir.path(), RagConfig::default(), Arc::new(UnavailableEmbedder));

    let report = pipeline.ingest().await.unwrap();
    assert_eq!(report.documents, 1);
    assert_eq!(report.skipped_files, 1);
    assert_eq!(report.chunks, 0);
    assert!(pipeline.retrieve("anything").await.unwrap().is_empty());
}

#[tokio::test]
async fn retrieve_before_ingestion_is_not_ready() {
    let dir = docs(&[("a.txt", "alpha")]);
    let pipeline = build_pipeline(dir.path(), RagConfig::default(), Arc::new(TableEmbedder::default()));

    assert_eq!(pipeline.state(), PipelineState::Empty);
    let err = pipeline.retrieve("alpha").await.unwrap_err();
    assert!(matches!(err, RagError::NotReady(PipelineState::Empty)));
}

#[tokio::test]
async fn provider_failure_during_ingestion_leaves_pipeline_failed() {
    let dir = docs(&[("a.txt", "alpha")]);
    let mut pipeline = build_pipeline(dir.path(), RagConfig::default(), Arc::new(UnavailableEmbedder));

    let err = pipeline.ingest().await.unwrap_err();
    assert!(matches!(err, RagError::Provider { .. }));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert!(pipeline.failure().is_some_and(|msg| msg.contains("connection refused")));
    assert!(pipeline.chunks().is_empty());
    assert!(pipeline.index().is_empty());

    let err = pipeline.retrieve("alpha").await.unwrap_err();
    assert!(matches!(err, RagError::NotReady(PipelineState::Failed)));
}

#[tokio::test]
async fn ingestion_runs_only_once() {
    let dir = docs(&[("a.txt", "alpha")]);
    let embedder = Arc::new(TableEmbedder::new(&[("alpha", vec![1.0])]));
    let mut pipeline = build_pipeline(dir.path(), RagConfig::default(), embedder);

    pipeline.ingest().await.unwrap();
    let err = pipeline.ingest().await.unwrap_err();
    assert!(matches!(err, RagError::Pipeline(_)));
    assert_eq!(pipeline.state(), PipelineState::Ready);
}

#[tokio::test]
async fn missing_folder_fails_with_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = build_pipeline(
        &dir.path().join("missing"),
        RagConfig::default(),
        Arc::new(TableEmbedder::default()),
    );

    let err = pipeline.ingest().await.unwrap_err();
    assert!(matches!(err, RagError::Io { .. }));
    assert_eq!(pipeline.state(), PipelineState::Failed);
}

#[tokio::test]
async fn provider_returning_too_few_vectors_is_rejected() {
    let dir = docs(&[("a.txt", "alpha"), ("b.txt", "beta")]);
    let mut pipeline = build_pipeline(dir.path(), RagConfig::default(), Arc::new(ShortBatchEmbedder));

    let err = pipeline.ingest().await.unwrap_err();
    assert!(matches!(err, RagError::Provider { message, .. } if message.contains("1 embeddings for 2")));
    assert_eq!(pipeline.state(), PipelineState::Failed);
}

#[tokio::test]
async fn mixed_dimensions_fail_ingestion() {
    let dir = docs(&[("a.txt", "alpha"), ("b.txt", "beta")]);
    let embedder =
        Arc::new(TableEmbedder::new(&[("alpha", vec![1.0, 0.0]), ("beta", vec![1.0, 0.0, 0.0])]));
    let mut pipeline = build_pipeline(dir.path(), RagConfig::default(), embedder);

    let err = pipeline.ingest().await.unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatch { expected: 2, actual: 3 }));
    assert_eq!(pipeline.state(), PipelineState::Failed);
}

#[tokio::test]
async fn query_embedding_failure_is_an_error_not_an_empty_result() {
    let dir = docs(&[("a.txt", "alpha")]);
    let embedder = Arc::new(TableEmbedder::new(&[("alpha", vec![1.0])]));
    let mut pipeline = build_pipeline(dir.path(), RagConfig::default(), embedder);
    pipeline.ingest().await.unwrap();

    let err = pipeline.retrieve("unknown query").await.unwrap_err();
    assert!(matches!(err, RagError::Provider { .. }));
    assert!(pipeline.is_ready());
}

#[tokio::test]
async fn query_with_wrong_dimensions_is_rejected() {
    let dir = docs(&[("a.txt", "alpha")]);
    let embedder =
        Arc::new(TableEmbedder::new(&[("alpha", vec![1.0, 0.0]), ("query", vec![1.0])]));
    let mut pipeline = build_pipeline(dir.path(), RagConfig::default(), embedder);
    pipeline.ingest().await.unwrap();

    let err = pipeline.retrieve("query").await.unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatch { expected: 2, actual: 1 }));
}

#[tokio::test]
async fn nan_query_embedding_is_a_provider_error() {
    let dir = docs(&[("a.txt", "alpha")]);
    let embedder =
        Arc::new(TableEmbedder::new(&[("alpha", vec![1.0]), ("query", vec![f32::NAN])]));
    let mut pipeline = build_pipeline(dir.path(), RagConfig::default(), embedder);
    pipeline.ingest().await.unwrap();

    let err = pipeline.retrieve("query").await.unwrap_err();
    assert!(matches!(err, RagError::Provider { message, .. } if message.contains("non-finite")));
    assert!(pipeline.is_ready());
}

#[tokio::test]
async fn non_finite_chunk_embedding_fails_ingestion() {
    let dir = docs(&[("a.txt", "alpha"), ("b.txt", "beta")]);
    let embedder =
        Arc::new(TableEmbedder::new(&[("alpha", vec![-f32::NAN]), ("beta", vec![1.0])]));
    let config = RagConfig::builder().top_k(1).build().unwrap();
    let mut pipeline = build_pipeline(dir.path(), config, embedder);

    let err = pipeline.ingest().await.unwrap_err();
    assert!(matches!(err, RagError::Provider { message, .. } if message.contains("non-finite")));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert!(pipeline.index().is_empty());

    let dir = docs(&[("a.txt", "alpha")]);
    let embedder = Arc::new(TableEmbedder::new(&[("alpha", vec![0.5, f32::INFINITY])]));
    let mut pipeline = build_pipeline(dir.path(), RagConfig::default(), embedder);
    assert!(matches!(pipeline.ingest().await, Err(RagError::Provider { .. })));
}

#[tokio::test]
async fn abandoned_ingestion_stays_loading() {
    let dir = docs(&[("a.txt", "alpha")]);
    let mut pipeline = build_pipeline(dir.path(), RagConfig::default(), Arc::new(PendingEmbedder));

    let outcome = tokio::time::timeout(Duration::from_millis(100), pipeline.ingest()).await;
    assert!(outcome.is_err());
    assert_eq!(pipeline.state(), PipelineState::Loading);

    let err = pipeline.retrieve("alpha").await.unwrap_err();
    assert!(matches!(err, RagError::NotReady(PipelineState::Loading)));
    assert!(matches!(pipeline.ingest().await, Err(RagError::Pipeline(_))));
}

#[tokio::test]
async fn chunks_are_numbered_globally_and_never_span_documents() {
    let dir = docs(&[("b.txt", "xyz"), ("a.txt", "abcdefg")]);
    let config = RagConfig::builder().chunk_size(4).chunk_overlap(1).build().unwrap();
    let mut pipeline = build_pipeline(dir.path(), config, Arc::new(HashEmbeddingProvider::new(8)));

    let report = pipeline.ingest().await.unwrap();
    assert_eq!(report.chunks, 3);

    let chunks = pipeline.chunks();
    let summary: Vec<_> = chunks
        .iter()
        .map(|c| (c.position, c.source.as_str(), c.index, c.text.as_str(), c.overlap))
        .collect();
    assert_eq!(
        summary,
        vec![
            (0, "a.txt", 0, "abcd", 0),
            (1, "a.txt", 1, "defg", 1),
            (2, "b.txt", 0, "xyz", 0),
        ]
    );
    assert_eq!(pipeline.index().len(), 3);
}

#[tokio::test]
async fn top_k_override_limits_results() {
    let dir = docs(&[("a.txt", "alpha"), ("b.txt", "beta"), ("c.txt", "gamma")]);
    let embedder = Arc::new(TableEmbedder::new(&[
        ("alpha", vec![1.0, 0.0]),
        ("beta", vec![1.0, 0.0]),
        ("gamma", vec![1.0, 0.0]),
        ("query", vec![1.0, 0.0]),
    ]));
    let mut pipeline = build_pipeline(dir.path(), RagConfig::default(), embedder);
    pipeline.ingest().await.unwrap();

    assert_eq!(pipeline.retrieve("query").await.unwrap().len(), 3);
    let one = pipeline.retrieve_with_top_k("query", 1).await.unwrap();
    assert_eq!(one.len(), 1);
    // Equal distances resolve to the earliest position.
    assert_eq!(one[0].text, "alpha");
    assert!(pipeline.retrieve_with_top_k("query", 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn normalization_turns_distance_into_cosine_similarity() {
    let files = [("a.txt", "alpha")];
    let table = [("alpha", vec![2.0, 0.0]), ("query", vec![3.0, 0.0])];

    let dir = docs(&files);
    let mut raw = build_pipeline(dir.path(), RagConfig::default(), Arc::new(TableEmbedder::new(&table)));
    raw.ingest().await.unwrap();
    assert!(raw.retrieve("query").await.unwrap().is_empty());

    let config = RagConfig::builder().normalize_embeddings(true).build().unwrap();
    let mut normalized = build_pipeline(dir.path(), config, Arc::new(TableEmbedder::new(&table)));
    normalized.ingest().await.unwrap();
    let results = normalized.retrieve("query").await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].score, 1.0);
}

#[tokio::test]
async fn ready_pipeline_serves_concurrent_queries() {
    let dir = docs(&[
        ("python.txt", "Python is an interpreted language popular for data science and scripting."),
        ("rag.txt", "Retrieval augmented generation grounds model answers in retrieved documents."),
        ("rust.txt", "Rust guarantees memory safety without a garbage collector through ownership."),
    ]);
    let config = RagConfig::builder().similarity_threshold(0.3).build().unwrap();
    let mut pipeline = build_pipeline(dir.path(), config, Arc::new(HashEmbeddingProvider::new(256)));
    pipeline.ingest().await.unwrap();
    let pipeline = Arc::new(pipeline);

    let queries = [
        ("memory safety without garbage collection", "rust.txt"),
        ("data science language", "python.txt"),
        ("retrieved documents ground answers", "rag.txt"),
    ];
    let handles: Vec<_> = queries
        .iter()
        .map(|(query, _)| {
            let pipeline = Arc::clone(&pipeline);
            let query = query.to_string();
            tokio::spawn(async move { pipeline.retrieve(&query).await })
        })
        .collect();

    for (handle, (_, expected)) in handles.into_iter().zip(queries) {
        let results = handle.await.unwrap().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, expected);
        let context = grounding_context(&results).unwrap();
        assert_eq!(context, results[0].text);
    }
}

#[test]
fn builder_requires_provider_and_folder() {
    let err = RagPipeline::builder().documents_dir("docs").build().unwrap_err();
    assert!(matches!(err, RagError::Config(msg) if msg.contains("embedding_provider")));

    let err = RagPipeline::builder()
        .embedding_provider(Arc::new(HashEmbeddingProvider::default()))
        .build()
        .unwrap_err();
    assert!(matches!(err, RagError::Config(msg) if msg.contains("documents_dir")));

    let bad = RagConfig { chunk_overlap: 600, ..RagConfig::default() };
    let err = RagPipeline::builder()
        .config(bad)
        .embedding_provider(Arc::new(HashEmbeddingProvider::default()))
        .documents_dir("docs")
        .build()
        .unwrap_err();
    assert!(matches!(err, RagError::Config(_)));
}
