//! Exact in-process vector index
//!
//! Brute-force scoring over an insertion-ordered store. Ties keep store order.

use super::{DistanceMetric, IndexMatch, VectorIndex, VectorQuery, VectorRecord};
use async_trait::async_trait;
use moviemate_common::errors::{AppError, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Store {
    records: Vec<VectorRecord>,
    positions: HashMap<String, usize>,
}

/// In-memory vector index
pub struct InMemoryIndex {
    dimension: usize,
    metric: DistanceMetric,
    store: RwLock<Store>,
}

impl InMemoryIndex {
    pub fn new(dimension: usize, metric: DistanceMetric) -> Self {
        Self {
            dimension,
            metric,
            store: RwLock::new(Store::default()),
        }
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.store.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn is_finite(vector: &[f32]) -> bool {
    vector.iter().all(|x| x.is_finite())
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize> {
        if let Some(bad) = records.iter().find(|r| r.vector.len() != self.dimension) {
            return Err(AppError::config(format!(
                "record {} has dimension {}, index expects {}",
                bad.id,
                bad.vector.len(),
                self.dimension
            )));
        }
        if let Some(bad) = records.iter().find(|r| !is_finite(&r.vector)) {
            return Err(AppError::config(format!(
                "record {} has a non-finite vector component",
                bad.id
            )));
        }

        let count = records.len();
        let mut store = self.store.write().await;
        for record in records {
            match store.positions.get(&record.id).copied() {
                Some(pos) => store.records[pos] = record,
                None => {
                    let pos = store.records.len();
                    store.positions.insert(record.id.clone(), pos);
                    store.records.push(record);
                }
            }
        }

        tracing::debug!(upserted = count, total = store.records.len(), "In-memory upsert");
        Ok(count)
    }

    async fn search(&self, query: &VectorQuery) -> Result<Vec<IndexMatch>> {
        if query.vector.len() != self.dimension {
            return Err(AppError::retrieval(format!(
                "query vector has dimension {}, index expects {}",
                query.vector.len(),
                self.dimension
            )));
        }
        if !is_finite(&query.vector) {
            return Err(AppError::retrieval("query vector has a non-finite component"));
        }
        if query.top_k == 0 {
            return Ok(Vec::new());
        }

        let store = self.store.read().await;
        let mut scored: Vec<(usize, f32)> = store
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| query.filters.matches(&r.metadata))
            .map(|(i, r)| (i, self.metric.score(&query.vector, &r.vector)))
            .collect();

        // sort_by is stable, so equal scores stay in store order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(query.top_k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| {
                let record = &store.records[i];
                IndexMatch {
                    id: record.id.clone(),
                    score,
                    text: record.text.clone(),
                    metadata: record.metadata.clone(),
                }
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use moviemate_common::errors::ErrorCode;
    use moviemate_common::types::{Metadata, MetadataFilters, MetadataValue};

    fn record(id: &str, vector: Vec<f32>, genre: &str) -> VectorRecord {
        let mut metadata = Metadata::new();
        metadata.insert("genres".to_string(), MetadataValue::List(vec![genre.to_string()]));
        VectorRecord {
            id: id.to_string(),
            vector,
            text: format!("{} plot", id),
            metadata,
        }
    }

    fn query(vector: Vec<f32>, top_k: usize) -> VectorQuery {
        VectorQuery {
            vector,
            top_k,
            filters: MetadataFilters::new(),
        }
    }

    async fn seeded() -> InMemoryIndex {
        let index = InMemoryIndex::new(2, DistanceMetric::DotProduct);
        index
            .upsert(vec![
                record("matrix", vec![1.0, 0.0], "sci-fi"),
                record("titanic", vec![0.0, 1.0], "romance"),
                record("inception", vec![0.8, 0.2], "sci-fi"),
                record("alien", vec![0.6, 0.1], "horror"),
            ])
            .await
            .unwrap();
        index
    }

    #[tokio::test]
    async fn test_results_bounded_and_sorted() {
        let index = seeded().await;
        for k in 1..=5 {
            let results = index.search(&query(vec![0.7, 0.3], k)).await.unwrap();
            assert!(results.len() <= k);
            assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        }
    }

    #[tokio::test]
    async fn test_filters_restrict_candidates() {
        let index = seeded().await;
        let mut q = query(vec![0.0, 1.0], 10);
        q.filters = MetadataFilters::new().with("genres", ["sci-fi"]);

        let ids: Vec<_> = index.search(&q).await.unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.iter().all(|id| id == "matrix" || id == "inception"));
    }

    #[tokio::test]
    async fn test_empty_filter_matches_unfiltered() {
        let index = seeded().await;
        let plain = index.search(&query(vec![0.5, 0.5], 3)).await.unwrap();
        let mut q = query(vec![0.5, 0.5], 3);
        q.filters = MetadataFilters::default();
        assert_eq!(index.search(&q).await.unwrap(), plain);
    }

    #[tokio::test]
    async fn test_ties_keep_store_order() {
        let index = InMemoryIndex::new(2, DistanceMetric::DotProduct);
        index
            .upsert(vec![
                record("first", vec![1.0, 0.0], "a"),
                record("second", vec![1.0, 0.0], "a"),
                record("third", vec![1.0, 0.0], "a"),
            ])
            .await
            .unwrap();

        let ids: Vec<_> = index
            .search(&query(vec![1.0, 0.0], 3))
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_upsert_replaces_in_place() {
        let index = seeded().await;
        index
            .upsert(vec![record("matrix", vec![0.0, 1.0], "romance")])
            .await
            .unwrap();
        assert_eq!(index.len().await, 4);

        let top = index.search(&query(vec![0.0, 1.0], 1)).await.unwrap();
        // Both matrix and titanic now score 1.0; matrix is earlier in the store
        assert_eq!(top[0].id, "matrix");
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let index = seeded().await;
        assert!(index.upsert(vec![record("bad", vec![1.0], "x")]).await.is_err());
        assert!(index.search(&query(vec![1.0, 0.0, 0.0], 2)).await.is_err());
    }

    #[tokio::test]
    async fn test_non_finite_vectors_rejected() {
        let index = InMemoryIndex::new(1, DistanceMetric::DotProduct);
        let records: Vec<_> = (0..40)
            .map(|i| {
                let value = if i % 3 == 0 { f32::NAN } else { i as f32 };
                record(&format!("movie-{}", i), vec![value], "drama")
            })
            .collect();

        let err = index.upsert(records).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigurationError);
        assert!(index.is_empty().await);

        let err = index
            .upsert(vec![record("inf", vec![f32::INFINITY], "drama")])
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigurationError);

        let err = index.search(&query(vec![f32::NAN], 5)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::RetrievalError);
    }

    #[tokio::test]
    async fn test_many_records_sort_without_panic() {
        let index = InMemoryIndex::new(1, DistanceMetric::Euclidean);
        let records: Vec<_> = (0..40)
            .map(|i| record(&format!("movie-{}", i), vec![(i % 7) as f32 * 1e30], "drama"))
            .collect();
        index.upsert(records).await.unwrap();

        let results = index.search(&query(vec![f32::MAX], 5)).await.unwrap();
        assert_eq!(results.len(), 5);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }
}
