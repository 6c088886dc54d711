//! Pinecone REST implementation of the vector index
//!
//! Talks to the index data plane with the documented wire shapes. Field
//! names matter: the query endpoint accepts unknown fields without error,
//! so a misspelled `includeMetadata` silently returns matches with no
//! metadata. The serialization tests below pin the exact request shape.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use quiver_core::{IndexConfig, QueryMatch, QuiverError, Result, VectorRecord};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Pinecone index client.
///
/// Cheap to clone; independent shards may hold their own clone as long as
/// they never dispatch overlapping ids concurrently (upsert ordering for
/// the same id is last-write-wins with no defined order across tasks).
#[derive(Clone)]
pub struct PineconeIndex {
    client: Client,
    host: String,
    api_key: String,
    dimension: usize,
}

// ============================================================================
// Wire shapes
// ============================================================================

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_values: bool,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    #[serde(default)]
    vectors: HashMap<String, VectorRecord>,
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    dimension: usize,
}

// ============================================================================
// Client
// ============================================================================

impl PineconeIndex {
    /// Create a client for an index data-plane endpoint.
    pub fn new(
        host: impl Into<String>,
        api_key: impl Into<String>,
        dimension: usize,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| QuiverError::Index(format!("failed to build HTTP client: {e}")))?;

        let host = host.into();
        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            dimension,
        })
    }

    /// Create from config.
    pub fn from_config(config: &IndexConfig) -> Result<Self> {
        Self::new(
            config.host.clone(),
            config.api_key.clone(),
            config.dimension,
            config.timeout_secs,
        )
    }

    /// Compare the remote index dimension with the configured one.
    ///
    /// Run once at startup so a model/index mismatch fails before any
    /// document work.
    pub async fn check_dimension(&self) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/describe_index_stats", self.host))
            .header("Api-Key", &self.api_key)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| map_send_error("describe_index_stats", e))?;

        let response = check_status("describe_index_stats", response).await?;
        let stats: StatsResponse = parse_json("describe_index_stats", response).await?;

        if stats.dimension != self.dimension {
            return Err(QuiverError::DimensionMismatch {
                id: "<index>".to_string(),
                expected: self.dimension,
                got: stats.dimension,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl super::VectorIndex for PineconeIndex {
    async fn upsert(&self, records: &[VectorRecord], namespace: Option<&str>) -> Result<usize> {
        super::validate_dimensions(records, self.dimension)?;

        let request = UpsertRequest {
            vectors: records,
            namespace,
        };

        let response = self
            .client
            .post(format!("{}/vectors/upsert", self.host))
            .header("Api-Key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_send_error("upsert", e))?;

        let response = check_status("upsert", response).await?;
        let result: UpsertResponse = parse_json("upsert", response).await?;

        tracing::debug!(count = result.upserted_count, "upsert committed");
        Ok(result.upserted_count)
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: Option<&str>,
        include_metadata: bool,
    ) -> Result<Vec<QueryMatch>> {
        if vector.len() != self.dimension {
            return Err(QuiverError::DimensionMismatch {
                id: "<query>".to_string(),
                expected: self.dimension,
                got: vector.len(),
            });
        }

        let request = QueryRequest {
            vector,
            top_k,
            include_values: false,
            include_metadata,
            namespace,
        };

        let response = self
            .client
            .post(format!("{}/query", self.host))
            .header("Api-Key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_send_error("query", e))?;

        let response = check_status("query", response).await?;
        let result: QueryResponse = parse_json("query", response).await?;

        Ok(result.matches)
    }

    async fn fetch(
        &self,
        ids: &[String],
        namespace: Option<&str>,
    ) -> Result<HashMap<String, VectorRecord>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut params: Vec<(&str, &str)> = ids.iter().map(|id| ("ids", id.as_str())).collect();
        if let Some(ns) = namespace {
            params.push(("namespace", ns));
        }

        let response = self
            .client
            .get(format!("{}/vectors/fetch", self.host))
            .header("Api-Key", &self.api_key)
            .query(&params)
            .send()
            .await
            .map_err(|e| map_send_error("fetch", e))?;

        let response = check_status("fetch", response).await?;
        let result: FetchResponse = parse_json("fetch", response).await?;

        Ok(result.vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// Error mapping
// ============================================================================

fn map_send_error(context: &str, err: reqwest::Error) -> QuiverError {
    if err.is_timeout() {
        QuiverError::Timeout(context.to_string())
    } else {
        QuiverError::Index(format!("{context} request failed: {err}"))
    }
}

async fn check_status(context: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status.as_u16() {
        401 | 403 => QuiverError::Authentication(format!("{context}: {body}")),
        404 => QuiverError::NotFound(format!("{context}: {body}")),
        _ => QuiverError::Index(format!("{context}: HTTP {status}: {body}")),
    })
}

async fn parse_json<T: serde::de::DeserializeOwned>(
    context: &str,
    response: reqwest::Response,
) -> Result<T> {
    let body = response
        .text()
        .await
        .map_err(|e| QuiverError::Index(format!("{context}: failed to read body: {e}")))?;

    serde_json::from_str(&body).map_err(|_| QuiverError::MalformedResponse {
        context: context.to_string(),
        payload: body,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VectorIndex;

    // The store accepts unknown request fields without complaint, so a
    // wrong field name degrades silently instead of failing. These tests
    // pin the exact serialized shape.

    #[test]
    fn test_query_request_wire_shape() {
        let vector = vec![0.1_f32, 0.2];
        let request = QueryRequest {
            vector: &vector,
            top_k: 5,
            include_values: false,
            include_metadata: true,
            namespace: None,
        };

        let json = serde_json::to_value(&request).unwrap();
        let object = json.as_object().unwrap();

        assert!(object.contains_key("vector"));
        assert_eq!(json["topK"], 5);
        assert_eq!(json["includeMetadata"], true);
        assert_eq!(json["includeValues"], false);
        assert!(!object.contains_key("namespace"));
        // Exactly the documented fields, nothing snake_case.
        assert_eq!(object.len(), 4);
    }

    #[test]
    fn test_query_request_carries_namespace_when_set() {
        let vector = vec![0.1_f32];
        let request = QueryRequest {
            vector: &vector,
            top_k: 1,
            include_values: false,
            include_metadata: true,
            namespace: Some("shard-a"),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["namespace"], "shard-a");
    }

    #[test]
    fn test_upsert_request_wire_shape() {
        let records = vec![
            VectorRecord::with_content("prop_0", vec![1.0], "The sky is blue."),
            VectorRecord::bare("prop_1", vec![2.0]),
        ];
        let request = UpsertRequest {
            vectors: &records,
            namespace: Some("shard-a"),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["namespace"], "shard-a");
        assert_eq!(json["vectors"][0]["id"], "prop_0");
        assert_eq!(json["vectors"][0]["metadata"]["content"], "The sky is blue.");
        // A record without metadata serializes without the key at all;
        // that is exactly the destructive overwrite payload.
        assert!(json["vectors"][1].get("metadata").is_none());
    }

    #[test]
    fn test_upsert_response_parses_camel_case_count() {
        let response: UpsertResponse = serde_json::from_str(r#"{"upsertedCount": 42}"#).unwrap();
        assert_eq!(response.upserted_count, 42);
    }

    #[test]
    fn test_query_response_parses_matches() {
        let body = r#"{
            "matches": [
                {"id": "prop_0", "score": 0.93, "metadata": {"content": "The sky is blue."}},
                {"id": "prop_1", "score": 0.11}
            ],
            "namespace": ""
        }"#;
        let response: QueryResponse = serde_json::from_str(body).unwrap();

        assert_eq!(response.matches.len(), 2);
        assert_eq!(response.matches[0].id, "prop_0");
        assert!(response.matches[0].metadata.is_some());
        assert!(response.matches[1].metadata.is_none());
    }

    #[test]
    fn test_fetch_response_absent_ids_are_missing_not_errors() {
        let body = r#"{"vectors": {"prop_0": {"id": "prop_0", "values": [1.0, 2.0]}}}"#;
        let response: FetchResponse = serde_json::from_str(body).unwrap();

        assert!(response.vectors.contains_key("prop_0"));
        assert!(!response.vectors.contains_key("prop_9"));
    }

    #[tokio::test]
    async fn test_dimension_checked_before_any_network_call() {
        // Unroutable host: if validation did not run first, this would
        // surface a connection error instead of a dimension mismatch.
        let index = PineconeIndex::new("http://127.0.0.1:1", "test-key", 384, 1).unwrap();

        let records = vec![VectorRecord::with_content("prop_0", vec![0.0; 128], "x")];
        let err = index.upsert(&records, None).await.unwrap_err();
        match err {
            QuiverError::DimensionMismatch { id, expected, got } => {
                assert_eq!(id, "prop_0");
                assert_eq!(expected, 384);
                assert_eq!(got, 128);
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = index.query(&[0.0; 100], 1, None, true).await.unwrap_err();
        assert!(matches!(err, QuiverError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    #[ignore = "requires a live index; set QUIVER_INDEX_HOST and QUIVER_API_KEY"]
    async fn test_live_round_trip() {
        let host = std::env::var("QUIVER_INDEX_HOST").unwrap();
        let key = std::env::var("QUIVER_API_KEY").unwrap();
        let index = PineconeIndex::new(host, key, 384, 30).unwrap();

        index.check_dimension().await.unwrap();

        let record = VectorRecord::with_content("it_round_trip", vec![0.01; 384], "round trip");
        index.upsert(std::slice::from_ref(&record), None).await.unwrap();

        let fetched = index
            .fetch(&["it_round_trip".to_string()], None)
            .await
            .unwrap();
        assert_eq!(fetched["it_round_trip"].content(), Some("round trip"));
    }
}
