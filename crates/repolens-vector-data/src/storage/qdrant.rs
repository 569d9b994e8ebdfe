//! Qdrant implementation of the vector storage trait
//!
//! Points are keyed by the deterministic record ID, so re-upserting the
//! same `(source_id, unit_path)` replaces the existing point instead of
//! accumulating stale copies.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qdrant_client::qdrant::{
    CollectionExistsRequest, Condition, CountPoints, CreateCollection, DeleteCollection,
    DeletePoints, Distance, Filter, GetPoints, PointId, PointStruct, PointsIdsList,
    PointsSelector, SearchPoints, UpsertPoints, Value, VectorParams,
    points_selector::PointsSelectorOneOf,
};
use qdrant_client::{Payload, Qdrant};
use repolens_common::CorrelationId;
use repolens_config::VectorStorageConfig;
use repolens_meta_data::{EmbeddingRecord, ScoredRecord};
use std::collections::HashMap;
use uuid::Uuid;

use crate::storage::VectorStorage;
use crate::{VectorDataError, VectorDataResult};

/// Vector engine client backed by Qdrant
#[derive(Clone)]
pub struct QdrantStorage {
    client: Qdrant,
    collection_name: String,
    dimension: usize,
}

impl QdrantStorage {
    /// Connect to Qdrant and ensure the collection exists.
    ///
    /// # Errors
    ///
    /// Returns `VectorDataError::Storage` if the server is unreachable or
    /// collection creation fails.
    pub async fn new(config: &VectorStorageConfig) -> VectorDataResult<Self> {
        let mut builder = Qdrant::from_url(&config.url);
        if let Ok(api_key) = std::env::var("QDRANT_API_KEY") {
            builder = builder.api_key(api_key);
        }

        let client = builder.build().map_err(|e| {
            VectorDataError::Storage(format!("Failed to create Qdrant client: {e}"))
        })?;

        let storage = Self {
            client,
            collection_name: config.collection_name.clone(),
            dimension: config.dimension,
        };
        storage.ensure_collection().await?;
        Ok(storage)
    }

    fn source_filter(source_id: &str) -> Filter {
        Filter::must([Condition::matches("source_id", source_id.to_string())])
    }
}

fn record_from_payload(
    id: Uuid,
    payload: &HashMap<String, Value>,
) -> EmbeddingRecord {
    let text = |key: &str| -> String {
        payload
            .get(key)
            .and_then(|v| v.as_str())
            .map(ToString::to_string)
            .unwrap_or_default()
    };
    let updated_at = payload
        .get("updated_at")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map_or_else(Utc::now, |t| t.with_timezone(&Utc));

    EmbeddingRecord {
        id,
        source_id: text("source_id"),
        unit_path: text("unit_path"),
        content: text("content"),
        language: payload
            .get("language")
            .and_then(|v| v.as_str())
            .map(ToString::to_string),
        revision: text("revision"),
        // Vectors are not returned from search to keep responses small.
        vector: Vec::new(),
        updated_at,
    }
}

#[async_trait]
impl VectorStorage for QdrantStorage {
    async fn collection_exists(&self) -> VectorDataResult<bool> {
        let request = CollectionExistsRequest {
            collection_name: self.collection_name.clone(),
        };
        self.client.collection_exists(request).await.map_err(|e| {
            VectorDataError::Storage(format!("Failed to check collection exists: {e}"))
        })
    }

    async fn ensure_collection(&self) -> VectorDataResult<()> {
        if self.collection_exists().await? {
            return Ok(());
        }

        let request = CreateCollection {
            collection_name: self.collection_name.clone(),
            vectors_config: Some(
                VectorParams {
                    size: self.dimension as u64,
                    distance: Distance::Cosine as i32,
                    ..Default::default()
                }
                .into(),
            ),
            ..Default::default()
        };

        match self.client.create_collection(request).await {
            Ok(_) => Ok(()),
            Err(e) => {
                // Another process may have created it between the check and
                // the create.
                if e.to_string().contains("already exists") {
                    Ok(())
                } else {
                    Err(VectorDataError::Storage(format!(
                        "Failed to create collection '{}': {e}",
                        self.collection_name
                    )))
                }
            }
        }
    }

    async fn drop_collection(&self) -> VectorDataResult<bool> {
        if !self.collection_exists().await? {
            return Ok(false);
        }

        let request = DeleteCollection {
            collection_name: self.collection_name.clone(),
            ..Default::default()
        };
        self.client.delete_collection(request).await.map_err(|e| {
            VectorDataError::Storage(format!(
                "Failed to drop collection '{}': {e}",
                self.collection_name
            ))
        })?;
        Ok(true)
    }

    #[tracing::instrument(skip(self, records), fields(record_count = records.len()))]
    async fn upsert_records(
        &self,
        records: &[EmbeddingRecord],
        correlation_id: &CorrelationId,
    ) -> VectorDataResult<()> {
        let points: Vec<PointStruct> = records
            .iter()
            .filter(|r| !r.vector.is_empty())
            .map(|record| {
                let mut payload = HashMap::new();
                payload.insert(
                    "source_id".to_string(),
                    Value::from(record.source_id.clone()),
                );
                payload.insert(
                    "unit_path".to_string(),
                    Value::from(record.unit_path.clone()),
                );
                payload.insert("content".to_string(), Value::from(record.content.clone()));
                payload.insert("revision".to_string(), Value::from(record.revision.clone()));
                payload.insert(
                    "updated_at".to_string(),
                    Value::from(record.updated_at.to_rfc3339()),
                );
                if let Some(ref language) = record.language {
                    payload.insert("language".to_string(), Value::from(language.clone()));
                }

                PointStruct::new(
                    record.id.to_string(),
                    record.vector.clone(),
                    Payload::from(payload),
                )
            })
            .collect();

        if points.is_empty() {
            return Ok(());
        }

        tracing::debug!(
            correlation_id = %correlation_id,
            collection = %self.collection_name,
            point_count = points.len(),
            "Upserting points"
        );

        let request = UpsertPoints {
            collection_name: self.collection_name.clone(),
            points,
            ..Default::default()
        };
        self.client
            .upsert_points(request)
            .await
            .map_err(|e| VectorDataError::Storage(format!("Failed to upsert points: {e}")))?;
        Ok(())
    }

    #[tracing::instrument(skip(self, query), fields(query_dim = query.len(), limit))]
    async fn search(
        &self,
        query: Vec<f32>,
        source_id: Option<&str>,
        limit: usize,
        correlation_id: &CorrelationId,
    ) -> VectorDataResult<Vec<ScoredRecord>> {
        tracing::debug!(
            correlation_id = %correlation_id,
            collection = %self.collection_name,
            "Performing vector search"
        );

        let request = SearchPoints {
            collection_name: self.collection_name.clone(),
            vector: query,
            limit: limit as u64,
            with_payload: Some(true.into()),
            filter: source_id.map(Self::source_filter),
            ..Default::default()
        };

        let response = self
            .client
            .search_points(request)
            .await
            .map_err(|e| VectorDataError::Storage(format!("Search failed: {e}")))?;

        let results = response
            .result
            .into_iter()
            .map(|scored| {
                let id = scored
                    .id
                    .as_ref()
                    .and_then(|p| match &p.point_id_options {
                        Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(s)) => {
                            Uuid::parse_str(s).ok()
                        }
                        _ => None,
                    })
                    .unwrap_or_else(Uuid::nil);
                ScoredRecord {
                    record: record_from_payload(id, &scored.payload),
                    score: scored.score,
                }
            })
            .collect();
        Ok(results)
    }

    async fn existing_ids(&self, record_ids: &[Uuid]) -> VectorDataResult<Vec<Uuid>> {
        if record_ids.is_empty() {
            return Ok(Vec::new());
        }

        let request = GetPoints {
            collection_name: self.collection_name.clone(),
            ids: record_ids
                .iter()
                .map(|id| PointId::from(id.to_string()))
                .collect(),
            with_payload: Some(false.into()),
            with_vectors: Some(false.into()),
            ..Default::default()
        };
        let response = self
            .client
            .get_points(request)
            .await
            .map_err(|e| VectorDataError::Storage(format!("Failed to get points: {e}")))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|point| {
                point.id.and_then(|p| match p.point_id_options {
                    Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(s)) => {
                        Uuid::parse_str(&s).ok()
                    }
                    _ => None,
                })
            })
            .collect())
    }

    async fn delete_records(&self, record_ids: &[Uuid]) -> VectorDataResult<()> {
        if record_ids.is_empty() {
            return Ok(());
        }

        let ids: Vec<PointId> = record_ids
            .iter()
            .map(|id| PointId::from(id.to_string()))
            .collect();
        let request = DeletePoints {
            collection_name: self.collection_name.clone(),
            points: Some(PointsSelector {
                points_selector_one_of: Some(PointsSelectorOneOf::Points(PointsIdsList { ids })),
            }),
            ..Default::default()
        };
        self.client
            .delete_points(request)
            .await
            .map_err(|e| VectorDataError::Storage(format!("Failed to delete points: {e}")))?;
        Ok(())
    }

    async fn delete_source(&self, source_id: &str) -> VectorDataResult<()> {
        let request = DeletePoints {
            collection_name: self.collection_name.clone(),
            points: Some(PointsSelector {
                points_selector_one_of: Some(PointsSelectorOneOf::Filter(Self::source_filter(
                    source_id,
                ))),
            }),
            ..Default::default()
        };
        self.client
            .delete_points(request)
            .await
            .map_err(|e| {
                VectorDataError::Storage(format!(
                    "Failed to delete points for source '{source_id}': {e}"
                ))
            })?;
        Ok(())
    }

    async fn count(&self) -> VectorDataResult<u64> {
        let request = CountPoints {
            collection_name: self.collection_name.clone(),
            exact: Some(true),
            ..Default::default()
        };
        let response = self
            .client
            .count(request)
            .await
            .map_err(|e| VectorDataError::Storage(format!("Failed to count points: {e}")))?;
        Ok(response.result.map_or(0, |r| r.count))
    }

    async fn count_source(&self, source_id: &str) -> VectorDataResult<u64> {
        let request = CountPoints {
            collection_name: self.collection_name.clone(),
            filter: Some(Self::source_filter(source_id)),
            exact: Some(true),
            ..Default::default()
        };
        let response = self
            .client
            .count(request)
            .await
            .map_err(|e| VectorDataError::Storage(format!("Failed to count points: {e}")))?;
        Ok(response.result.map_or(0, |r| r.count))
    }
}
