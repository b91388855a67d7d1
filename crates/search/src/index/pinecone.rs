//! Pinecone REST client
//!
//! Talks to an index host directly (`/vectors/upsert`, `/query`).
//! Chunk text travels in the metadata under `text`.

use super::{DistanceMetric, IndexMatch, VectorIndex, VectorQuery, VectorRecord};
use async_trait::async_trait;
use moviemate_common::config::IndexConfig;
use moviemate_common::errors::{AppError, Result};
use moviemate_common::types::{Metadata, MetadataFilters, MetadataValue};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Metadata key holding the chunk body
const TEXT_KEY: &str = "text";

/// Pinecone upsert limit per request
const UPSERT_BATCH_SIZE: usize = 100;

/// Pinecone-backed vector index
pub struct PineconeIndex {
    client: reqwest::Client,
    host: String,
    api_key: String,
    namespace: String,
    dimension: usize,
    metric: DistanceMetric,
}

#[derive(Serialize)]
struct PineconeVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: Map<String, Value>,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<PineconeVector<'a>>,
    namespace: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    upserted_count: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryBody<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    namespace: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Value>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<PineconeMatch>,
}

#[derive(Deserialize)]
struct PineconeMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

impl PineconeIndex {
    /// Create a client for the configured index host
    pub fn new(config: &IndexConfig, dimension: usize, metric: DistanceMetric) -> Result<Self> {
        let host = config
            .host
            .clone()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| AppError::config("Pinecone index requires index.host"))?;
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::config("Pinecone index requires index.api_key"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::config(format!("Failed to create HTTP client: {}", e)))?;

        let host = if host.starts_with("http") {
            host
        } else {
            format!("https://{}", host)
        };

        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            api_key,
            namespace: config.namespace.clone(),
            dimension,
            metric,
        })
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}{}", self.host, path))
            .header("Api-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::retrieval(format!("Pinecone request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::retrieval(format!(
                "Pinecone {} returned {}: {}",
                path, status, body
            )));
        }

        Ok(response)
    }
}

/// Translate filters into Pinecone's filter language
pub(crate) fn to_pinecone_filter(filters: &MetadataFilters) -> Option<Value> {
    let mut clauses: Vec<Value> = filters
        .iter()
        .map(|(key, values)| {
            let mut clause = Map::new();
            clause.insert(key.clone(), json!({ "$in": values }));
            Value::Object(clause)
        })
        .collect();

    match clauses.len() {
        0 => None,
        1 => clauses.pop(),
        _ => Some(json!({ "$and": clauses })),
    }
}

fn to_pinecone_metadata(record: &VectorRecord) -> Map<String, Value> {
    let mut metadata: Map<String, Value> = record
        .metadata
        .iter()
        .filter_map(|(k, v)| serde_json::to_value(v).ok().map(|v| (k.clone(), v)))
        .collect();
    metadata.insert(TEXT_KEY.to_string(), Value::String(record.text.clone()));
    metadata
}

fn from_pinecone_metadata(id: &str, raw: Map<String, Value>) -> (String, Metadata) {
    let mut text = String::new();
    let mut metadata = Metadata::new();

    for (key, value) in raw {
        if key == TEXT_KEY {
            if let Value::String(s) = value {
                text = s;
            }
            continue;
        }
        match serde_json::from_value::<MetadataValue>(value) {
            Ok(v) => {
                metadata.insert(key, v);
            }
            Err(_) => tracing::warn!(id, key = %key, "Skipping unsupported metadata value"),
        }
    }

    (text, metadata)
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    #[tracing::instrument(skip(self, records), fields(count = records.len()))]
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize> {
        if let Some(bad) = records.iter().find(|r| r.vector.len() != self.dimension) {
            return Err(AppError::config(format!(
                "record {} has dimension {}, index expects {}",
                bad.id,
                bad.vector.len(),
                self.dimension
            )));
        }

        let mut written = 0;
        for batch in records.chunks(UPSERT_BATCH_SIZE) {
            let request = UpsertRequest {
                vectors: batch
                    .iter()
                    .map(|r| PineconeVector {
                        id: &r.id,
                        values: &r.vector,
                        metadata: to_pinecone_metadata(r),
                    })
                    .collect(),
                namespace: &self.namespace,
            };

            let response: UpsertResponse = self
                .post("/vectors/upsert", &request)
                .await?
                .json()
                .await
                .map_err(|e| AppError::retrieval(format!("Invalid Pinecone upsert response: {}", e)))?;

            written += response.upserted_count.unwrap_or(batch.len());
        }

        Ok(written)
    }

    #[tracing::instrument(skip(self, query), fields(top_k = query.top_k))]
    async fn search(&self, query: &VectorQuery) -> Result<Vec<IndexMatch>> {
        if query.vector.len() != self.dimension {
            return Err(AppError::retrieval(format!(
                "query vector has dimension {}, index expects {}",
                query.vector.len(),
                self.dimension
            )));
        }

        let body = QueryBody {
            vector: &query.vector,
            top_k: query.top_k,
            include_metadata: true,
            include_values: false,
            namespace: &self.namespace,
            filter: to_pinecone_filter(&query.filters),
        };

        let response: QueryResponse = self
            .post("/query", &body)
            .await?
            .json()
            .await
            .map_err(|e| AppError::retrieval(format!("Invalid Pinecone query response: {}", e)))?;

        let mut matches: Vec<IndexMatch> = response
            .matches
            .into_iter()
            .map(|m| {
                let (text, metadata) = from_pinecone_metadata(&m.id, m.metadata.unwrap_or_default());
                IndexMatch {
                    id: m.id,
                    score: m.score,
                    text,
                    metadata,
                }
            })
            .collect();
        matches.truncate(query.top_k);

        Ok(matches)
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

    #[test]
    fn test_filter_translation() {
        assert!(to_pinecone_filter(&MetadataFilters::new()).is_none());

        let single = MetadataFilters::new().with("genres", ["sci-fi"]);
        assert_eq!(
            to_pinecone_filter(&single).unwrap(),
            json!({"genres": {"$in": ["sci-fi"]}})
        );

        let multi = MetadataFilters::new()
            .with("genres", ["sci-fi", "action"])
            .with("release_year", [1999_i64]);
        assert_eq!(
            to_pinecone_filter(&multi).unwrap(),
            json!({"$and": [
                {"genres": {"$in": ["sci-fi", "action"]}},
                {"release_year": {"$in": [1999.0]}}
            ]})
        );
    }

    #[test]
    fn test_metadata_roundtrip_keeps_text_separate() {
        let mut metadata = Metadata::new();
        metadata.insert("title".to_string(), MetadataValue::from("Inception"));
        metadata.insert("genres".to_string(), MetadataValue::from(vec!["sci-fi"]));
        let record = VectorRecord {
            id: "inception-0".to_string(),
            vector: vec![0.1, 0.2],
            text: "A thief enters dreams.".to_string(),
            metadata: metadata.clone(),
        };

        let wire = to_pinecone_metadata(&record);
        assert_eq!(wire["text"], json!("A thief enters dreams."));

        let (text, decoded) = from_pinecone_metadata("inception-0", wire);
        assert_eq!(text, "A thief enters dreams.");
        assert_eq!(decoded, metadata);
    }

    #[test]
    fn test_requires_host_and_key() {
        let config = IndexConfig {
            provider: "pinecone".to_string(),
            ..IndexConfig::default()
        };
        assert!(PineconeIndex::new(&config, 8, DistanceMetric::DotProduct).is_err());

        let config = IndexConfig {
            provider: "pinecone".to_string(),
            host: Some("movies-abc.svc.pinecone.io".to_string()),
            api_key: Some("pc-key".to_string()),
            ..IndexConfig::default()
        };
        let index = PineconeIndex::new(&config, 8, DistanceMetric::DotProduct).unwrap();
        assert_eq!(index.host, "https://movies-abc.svc.pinecone.io");
    }
}
