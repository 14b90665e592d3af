//! Property tests for similarity and MMR retrieval over the in-memory store.
//!
//! **Property 3: Similarity search ordering**
//! *For any* set of stored records and query vector, similarity search SHALL
//! return at most `k` results ordered by non-increasing score.
//!
//! **Property 4: MMR with λ = 1 is similarity search**
//! With no diversity weight, MMR SHALL select the same records in the same
//! order as similarity search.

mod common;

use std::sync::Arc;

use common::StaticEmbedder;
use proptest::prelude::*;
use ragkit::{
    Chunk, EmbeddedChunk, IndexDefinition, InMemoryVectorStore, MetadataFilter, Query, RagError,
    RetrievalMode, SimilarityMetric, VectorIndex, VectorStore,
};
use serde_json::json;

const DIM: usize = 16;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map("non-zero embedding", |mut v| {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm < 1e-3 {
            return None;
        }
        for val in &mut v {
            *val /= norm;
        }
        Some(v)
    })
}

fn record(text: &str, vector: Vec<f32>, page: i64) -> EmbeddedChunk {
    let mut chunk = Chunk {
        text: text.to_string(),
        source_offset: 0..text.chars().count(),
        metadata: Default::default(),
        document_id: "doc_1".to_string(),
        index: 0,
    };
    chunk.metadata.insert("page".into(), json!(page));
    EmbeddedChunk::new(chunk, vector)
}

fn arb_record(dim: usize) -> impl Strategy<Value = EmbeddedChunk> {
    ("[a-z ]{5,30}", arb_normalized_embedding(dim), 0i64..10)
        .prop_map(|(text, vector, page)| record(&text, vector, page))
}

/// Build a ready index whose query embedding is always `query`.
async fn ready_index(
    records: &[EmbeddedChunk],
    query: Vec<f32>,
    metric: SimilarityMetric,
) -> VectorIndex {
    let store = Arc::new(InMemoryVectorStore::new("test"));
    let definition = IndexDefinition::new("vector_index", query.len()).with_similarity(metric);
    let index = VectorIndex::create(definition, store, Arc::new(StaticEmbedder { vector: query }))
        .await
        .unwrap();
    index.insert_all(records).await.unwrap();
    assert!(index.status().await.unwrap().state.is_terminal());
    index
}

fn run<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(future)
}

mod prop_similarity_ordering {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_descending_and_bounded_by_k(
            records in proptest::collection::vec(arb_record(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            k in 1usize..25,
        ) {
            let results = run(async {
                let index = ready_index(&records, query, SimilarityMetric::Cosine).await;
                index.similarity_search(&Query::new("q").with_k(k)).await.unwrap()
            });

            prop_assert!(results.len() <= k);
            prop_assert_eq!(results.len(), k.min(records.len()));
            for window in results.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score,
                );
            }
        }

        #[test]
        fn mmr_with_full_relevance_matches_similarity(
            records in proptest::collection::vec(arb_record(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            k in 1usize..8,
            extra in 0usize..10,
        ) {
            let (similar, mmr) = run(async {
                let index = ready_index(&records, query, SimilarityMetric::Cosine).await;
                let q = Query::new("q").with_k(k).with_fetch_k(k + extra).with_lambda(1.0);
                (
                    index.search(&q, RetrievalMode::Similarity).await.unwrap(),
                    index.search(&q, RetrievalMode::Mmr).await.unwrap(),
                )
            });

            let texts = |results: &[ragkit::SearchResult]| -> Vec<String> {
                results.iter().map(|r| r.chunk.text.clone()).collect()
            };
            prop_assert_eq!(texts(&similar), texts(&mmr));
            let scores = |results: &[ragkit::SearchResult]| -> Vec<f32> {
                results.iter().map(|r| r.score).collect()
            };
            prop_assert_eq!(scores(&similar), scores(&mmr));
        }

        #[test]
        fn mmr_returns_min_of_k_and_stored_records(
            records in proptest::collection::vec(arb_record(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            k in 1usize..8,
            lambda in 0.0f32..=1.0,
        ) {
            let results = run(async {
                let index = ready_index(&records, query, SimilarityMetric::Cosine).await;
                let q = Query::new("q").with_k(k).with_fetch_k(k * 2).with_lambda(lambda);
                index.max_marginal_relevance_search(&q).await.unwrap()
            });
            prop_assert!(results.len() <= k);
            prop_assert_eq!(results.len(), k.min(records.len()));
        }
    }
}

#[tokio::test]
async fn mmr_rejects_fetch_k_below_k() {
    let records = [record("a", vec![1.0, 0.0], 1)];
    let index = ready_index(&records, vec![1.0, 0.0], SimilarityMetric::Cosine).await;
    let err = index
        .max_marginal_relevance_search(&Query::new("q").with_k(5).with_fetch_k(3))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::InvalidConfig(_)));
}

#[tokio::test]
async fn zero_k_is_rejected() {
    let records = [record("a", vec![1.0, 0.0], 1)];
    let index = ready_index(&records, vec![1.0, 0.0], SimilarityMetric::Cosine).await;
    let err = index.similarity_search(&Query::new("q").with_k(0)).await.unwrap_err();
    assert!(matches!(err, RagError::InvalidConfig(_)));
}

#[tokio::test]
async fn empty_collection_returns_no_results() {
    let index = ready_index(&[], vec![1.0, 0.0], SimilarityMetric::Cosine).await;
    assert!(index.similarity_search(&Query::new("q")).await.unwrap().is_empty());
    assert!(index.max_marginal_relevance_search(&Query::new("q")).await.unwrap().is_empty());
}

#[tokio::test]
async fn mmr_prefers_diverse_candidates() {
    let records = [
        record("near duplicate one", vec![0.99, 0.01, 0.0], 1),
        record("near duplicate two", vec![0.98, 0.02, 0.0], 1),
        record("different angle", vec![0.3, 0.0, 0.7], 2),
    ];
    let index = ready_index(&records, vec![1.0, 0.0, 0.0], SimilarityMetric::Cosine).await;

    let similar = index.similarity_search(&Query::new("q").with_k(2)).await.unwrap();
    let texts: Vec<&str> = similar.iter().map(|r| r.chunk.text.as_str()).collect();
    assert_eq!(texts, vec!["near duplicate one", "near duplicate two"]);

    let q = Query::new("q").with_k(2).with_fetch_k(3).with_lambda(0.3);
    let diverse = index.max_marginal_relevance_search(&q).await.unwrap();
    let texts: Vec<&str> = diverse.iter().map(|r| r.chunk.text.as_str()).collect();
    assert_eq!(texts, vec!["near duplicate one", "different angle"]);
}

#[tokio::test]
async fn metadata_filter_restricts_candidates() {
    let records = [
        record("page one", vec![1.0, 0.0], 1),
        record("page two", vec![0.9, 0.1], 2),
        record("page three", vec![0.8, 0.2], 3),
    ];
    let index = ready_index(&records, vec![1.0, 0.0], SimilarityMetric::Cosine).await;
    let q = Query::new("q").with_k(3).with_filter(MetadataFilter::gte("page", 2));
    let results = index.similarity_search(&q).await.unwrap();
    let texts: Vec<&str> = results.iter().map(|r| r.chunk.text.as_str()).collect();
    assert_eq!(texts, vec!["page two", "page three"]);
}

#[tokio::test]
async fn search_before_ready_is_a_store_error() {
    let store = Arc::new(InMemoryVectorStore::new("test").with_build_polls(3));
    let index = VectorIndex::create(
        IndexDefinition::new("vector_index", 2),
        store.clone(),
        Arc::new(StaticEmbedder { vector: vec![1.0, 0.0] }),
    )
    .await
    .unwrap();
    let err = index.similarity_search(&Query::new("q")).await.unwrap_err();
    assert!(matches!(err, RagError::VectorStoreError { .. }));
    assert_eq!(store.collection(), "test");
}

#[tokio::test]
async fn provider_dimension_must_match_index() {
    let err = VectorIndex::new(
        IndexDefinition::new("vector_index", 3),
        Arc::new(InMemoryVectorStore::new("test")),
        Arc::new(StaticEmbedder { vector: vec![1.0, 0.0] }),
    )
    .unwrap_err();
    assert!(matches!(err, RagError::InvalidConfig(_)));
}
