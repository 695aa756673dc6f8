//! Property tests for in-memory vector index ordering and deletion.

use std::collections::HashSet;

use proptest::prelude::*;
use simplify_rag::document::{EntryPayload, IndexEntry};
use simplify_rag::inmemory::InMemoryVectorIndex;
use simplify_rag::vectorstore::VectorIndex;
use simplify_rag::RagError;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-8 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

fn entry(chunk_id: String, document_id: String, vector: Vec<f32>) -> IndexEntry {
    IndexEntry {
        payload: EntryPayload {
            filename: document_id.clone(),
            text: format!("text of {chunk_id}"),
            start: 0,
            end: 10,
        },
        chunk_id,
        document_id,
        vector,
    }
}

/// Generate entries with unique chunk IDs spread over a few documents.
fn arb_entries(dim: usize) -> impl Strategy<Value = Vec<IndexEntry>> {
    proptest::collection::vec((0usize..4, arb_normalized_embedding(dim)), 1..20).prop_map(
        |rows| {
            rows.into_iter()
                .enumerate()
                .map(|(n, (doc, vector))| entry(format!("doc{doc}_{n}"), format!("doc{doc}"), vector))
                .collect()
        },
    )
}

/// *For any* set of entries stored in an InMemoryVectorIndex, querying with a
/// vector returns results ordered by descending cosine similarity, at most
/// `top_k` of them.
mod prop_inmemory_query_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_descending_and_bounded_by_top_k(
            entries in arb_entries(DIM),
            query in arb_normalized_embedding(DIM),
            top_k in 1usize..25,
        ) {
            let count = entries.len();
            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let index = InMemoryVectorIndex::with_dimension(DIM);
                index.add(entries).await.unwrap();
                index.query(&query, top_k).await.unwrap()
            });

            prop_assert_eq!(results.len(), top_k.min(count));
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
        fn identical_vectors_keep_insertion_order(
            vector in arb_normalized_embedding(DIM),
            copies in 2usize..10,
        ) {
            let entries: Vec<IndexEntry> = (0..copies)
                .map(|n| entry(format!("c{n}"), "doc".to_string(), vector.clone()))
                .collect();
            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let index = InMemoryVectorIndex::new();
                index.add(entries).await.unwrap();
                index.query(&vector, copies).await.unwrap()
            });

            let ids: Vec<String> = results.into_iter().map(|r| r.entry.chunk_id).collect();
            let expected: Vec<String> = (0..copies).map(|n| format!("c{n}")).collect();
            prop_assert_eq!(ids, expected);
        }

        #[test]
        fn delete_removes_exactly_one_document(
            entries in arb_entries(DIM),
            victim in 0usize..4,
        ) {
            let victim = format!("doc{victim}");
            let expected_removed = entries.iter().filter(|e| e.document_id == victim).count();
            let survivors: HashSet<String> = entries
                .iter()
                .filter(|e| e.document_id != victim)
                .map(|e| e.chunk_id.clone())
                .collect();

            let rt = tokio::runtime::Runtime::new().unwrap();
            let (removed, remaining) = rt.block_on(async {
                let index = InMemoryVectorIndex::with_dimension(DIM);
                index.add(entries).await.unwrap();
                let removed = index.delete(&victim).await.unwrap();
                (removed, index.entries().await.unwrap())
            });

            prop_assert_eq!(removed, expected_removed);
            let remaining: HashSet<String> = remaining.into_iter().map(|e| e.chunk_id).collect();
            prop_assert_eq!(remaining, survivors);
        }
    }
}

#[tokio::test]
async fn query_with_wrong_dimension_is_rejected() {
    let index = InMemoryVectorIndex::with_dimension(3);
    index.add(vec![entry("a_0".into(), "a".into(), vec![1.0, 0.0, 0.0])]).await.unwrap();

    let err = index.query(&[1.0, 0.0], 1).await.unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatch { expected: 3, actual: 2 }));
}

#[tokio::test]
async fn query_on_empty_index_is_empty() {
    let index = InMemoryVectorIndex::new();
    assert!(index.query(&[1.0, 0.0], 3).await.unwrap().is_empty());
}
