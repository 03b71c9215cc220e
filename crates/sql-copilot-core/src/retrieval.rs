//! Relevance retrieval: which tables matter for a question.
//!
//! The question is embedded once and scored against every index entry by
//! cosine similarity. Results are filtered to `score >= min_similarity`,
//! ordered by score descending with table name ascending as the tie-break,
//! and truncated to `top_k`.
//!
//! An empty index or a failing embedding backend is reported as
//! [`RetrievalUnavailable`], never as an empty result. An empty
//! [`RetrievalResult`] means the index answered and nothing was relevant.

use serde::Serialize;
use tracing::debug;

use crate::embedding::{embed_one, Embedder};
use crate::error::RetrievalUnavailable;
use crate::store::{sort_candidates, SchemaIndex, TableCandidate};

/// Ordered, thresholded retrieval output. Request-scoped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub tables: Vec<TableCandidate>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|c| c.table_name.clone()).collect()
    }
}

/// Retrieve the tables most relevant to `question`.
pub async fn retrieve(
    question: &str,
    top_k: usize,
    min_similarity: f32,
    embedder: &dyn Embedder,
    index: &dyn SchemaIndex,
) -> Result<RetrievalResult, RetrievalUnavailable> {
    let total = index
        .count()
        .await
        .map_err(|e| RetrievalUnavailable::Store(format!("{e:#}")))?;
    if total == 0 {
        return Err(RetrievalUnavailable::EmptyIndex);
    }

    let query_vec = embed_one(embedder, question)
        .await
        .map_err(|e| RetrievalUnavailable::Embedding(format!("{e:#}")))?;

    // Ask for everything so the threshold is applied before truncation.
    let mut candidates = index
        .search(&query_vec, total)
        .await
        .map_err(|e| RetrievalUnavailable::Store(format!("{e:#}")))?;

    candidates.retain(|c| c.score >= min_similarity);
    sort_candidates(&mut candidates);
    candidates.truncate(top_k);

    debug!(
        candidates = total,
        kept = candidates.len(),
        top = ?candidates.first().map(|c| &c.table_name),
        "retrieval scored tables"
    );

    Ok(RetrievalResult { tables: candidates })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::store_catalog;
    use crate::embedding::fakes::KeywordEmbedder;
    use crate::indexer::{index_catalog, IndexMode};
    use crate::store::memory::InMemoryIndex;

    fn embedder() -> KeywordEmbedder {
        KeywordEmbedder::new(vec!["customer", "order", "product", "categor", "email", "message"])
    }

    async fn indexed() -> InMemoryIndex {
        let index = InMemoryIndex::new();
        index_catalog(&store_catalog(), &embedder(), &index, &IndexMode::Incremental, 32)
            .await
            .unwrap();
        index
    }

    #[tokio::test]
    async fn test_empty_index_is_unavailable() {
        let index = InMemoryIndex::new();
        let err = retrieve("customers", 5, 0.3, &embedder(), &index)
            .await
            .unwrap_err();
        assert_eq!(err, RetrievalUnavailable::EmptyIndex);
    }

    #[tokio::test]
    async fn test_embedding_failure_is_unavailable() {
        let index = indexed().await;
        let err = retrieve("customers", 5, 0.3, &KeywordEmbedder::failing(), &index)
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalUnavailable::Embedding(_)));
    }

    #[tokio::test]
    async fn test_threshold_and_top_k() {
        let index = indexed().await;
        for (top_k, min) in [(1usize, 0.0f32), (3, 0.2), (10, 0.5), (10, 0.99)] {
            let result = retrieve("customer email", top_k, min, &embedder(), &index)
                .await
                .unwrap();
            assert!(result.tables.len() <= top_k);
            for c in &result.tables {
                assert!(c.score >= min, "{} scored {} < {}", c.table_name, c.score, min);
            }
            for pair in result.tables.windows(2) {
                assert!(
                    pair[0].score > pair[1].score
                        || (pair[0].score == pair[1].score
                            && pair[0].table_name < pair[1].table_name)
                );
            }
        }
    }

    #[tokio::test]
    async fn test_best_match_first_and_deterministic() {
        let index = indexed().await;
        let a = retrieve("which customer has an email", 3, 0.1, &embedder(), &index)
            .await
            .unwrap();
        let b = retrieve("which customer has an email", 3, 0.1, &embedder(), &index)
            .await
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.tables[0].table_name, "customers");
    }

    #[tokio::test]
    async fn test_nothing_relevant_is_empty_not_unavailable() {
        let index = indexed().await;
        let result = retrieve("weather tomorrow", 5, 0.9, &embedder(), &index)
            .await
            .unwrap();
        assert!(result.is_empty());
    }
}
