//! Qdrant vector store backend.
//!
//! Provides [`QdrantVectorStore`] which implements [`VectorStore`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//!
//! Qdrant has no named search indexes: the HNSW index is part of the
//! collection. A store is therefore bound to one [`IndexDefinition`] and the
//! index lifecycle is read from the collection status (grey → creating,
//! yellow → building, green → ready, red → failed).
//!
//! # Example
//!
//! ```rust,ignore
//! use ragkit::qdrant::QdrantVectorStore;
//!
//! let definition = IndexDefinition::new("docs", 384);
//! let store = QdrantVectorStore::new("http://localhost:6334", "docs", definition)?;
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_output::VectorsOptions;
use qdrant_client::qdrant::{
    CollectionStatus, Condition, CreateCollectionBuilder, Distance, Filter, PointStruct, Range,
    ScoredPoint, SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue,
    VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::document::{Chunk, EmbeddedChunk, ScoredRecord};
use crate::error::{RagError, Result};
use crate::filter::MetadataFilter;
use crate::index::{IndexDefinition, IndexState, IndexStatus};
use crate::similarity::SimilarityMetric;
use crate::vectorstore::{VectorQuery, VectorStore};

const BACKEND: &str = "qdrant";

/// A [`VectorStore`] backed by one [Qdrant](https://qdrant.tech/) collection.
///
/// Chunk text, provenance, and metadata are stored as point payload; point
/// IDs are the record UUIDs.
pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
    definition: IndexDefinition,
}

impl QdrantVectorStore {
    /// Connect to the given URL and bind to `collection`.
    pub fn new(
        url: &str,
        collection: impl Into<String>,
        definition: IndexDefinition,
    ) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(map_err)?;
        Ok(Self::from_client(client, collection, definition))
    }

    /// Wrap an existing client.
    pub fn from_client(
        client: Qdrant,
        collection: impl Into<String>,
        definition: IndexDefinition,
    ) -> Self {
        Self { client, collection: collection.into(), definition }
    }

    fn distance(metric: SimilarityMetric) -> Distance {
        match metric {
            SimilarityMetric::Cosine => Distance::Cosine,
            SimilarityMetric::DotProduct => Distance::Dot,
            SimilarityMetric::Euclidean => Distance::Euclid,
        }
    }

    async fn create_collection(&self, definition: &IndexDefinition) -> Result<()> {
        let vectors = VectorParamsBuilder::new(
            definition.dimension as u64,
            Self::distance(definition.similarity),
        );
        let request = CreateCollectionBuilder::new(&self.collection).vectors_config(vectors);
        self.client.create_collection(request).await.map_err(map_err)?;
        debug!(
            collection = %self.collection,
            dimension = definition.dimension,
            "created qdrant collection"
        );
        Ok(())
    }

    fn to_point(&self, record: &EmbeddedChunk) -> Result<PointStruct> {
        let chunk = &record.chunk;
        let mut payload = Map::new();
        payload.insert(self.definition.text_field.clone(), Value::String(chunk.text.clone()));
        payload.insert("document_id".into(), Value::String(chunk.document_id.clone()));
        payload.insert("chunk_index".into(), json!(chunk.index));
        payload.insert(
            "source_offset".into(),
            json!({ "start": chunk.source_offset.start, "end": chunk.source_offset.end }),
        );
        payload.insert(
            "metadata".into(),
            Value::Object(chunk.metadata.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        );
        let payload = Payload::try_from(Value::Object(payload)).map_err(map_err)?;
        Ok(PointStruct::new(record.id.clone(), record.vector.clone(), payload))
    }

    fn from_point(&self, point: ScoredPoint) -> ScoredRecord {
        let id = point
            .id
            .as_ref()
            .and_then(|pid| match &pid.point_id_options {
                Some(PointIdOptions::Uuid(s)) => Some(s.clone()),
                Some(PointIdOptions::Num(n)) => Some(n.to_string()),
                None => None,
            })
            .unwrap_or_default();

        let payload: HashMap<String, Value> =
            point.payload.iter().map(|(k, v)| (k.clone(), to_json(v))).collect();
        let str_field =
            |key: &str| payload.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
        let offset = payload.get("source_offset");
        let offset_field = |key: &str| {
            offset.and_then(|o| o.get(key)).and_then(Value::as_u64).unwrap_or_default() as usize
        };
        let metadata = match payload.get("metadata") {
            Some(Value::Object(m)) => m.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            _ => HashMap::new(),
        };
        let vector = match point.vectors.and_then(|v| v.vectors_options) {
            Some(VectorsOptions::Vector(v)) => v.data,
            _ => Vec::new(),
        };

        ScoredRecord {
            record: EmbeddedChunk {
                id,
                chunk: Chunk {
                    text: str_field(&self.definition.text_field),
                    source_offset: offset_field("start")..offset_field("end"),
                    metadata,
                    document_id: str_field("document_id"),
                    index: payload.get("chunk_index").and_then(Value::as_u64).unwrap_or_default()
                        as usize,
                },
                vector,
            },
            score: point.score,
        }
    }
}

fn map_err(e: qdrant_client::QdrantError) -> RagError {
    RagError::VectorStoreError { backend: BACKEND.to_string(), message: e.to_string() }
}

fn unsupported(message: String) -> RagError {
    RagError::VectorStoreError { backend: BACKEND.to_string(), message }
}

/// Convert a Qdrant payload value to JSON.
fn to_json(value: &QdrantValue) -> Value {
    match &value.kind {
        Some(Kind::BoolValue(b)) => Value::Bool(*b),
        Some(Kind::IntegerValue(n)) => json!(n),
        Some(Kind::DoubleValue(n)) => json!(n),
        Some(Kind::StringValue(s)) => Value::String(s.clone()),
        Some(Kind::ListValue(list)) => Value::Array(list.values.iter().map(to_json).collect()),
        Some(Kind::StructValue(s)) => {
            Value::Object(s.fields.iter().map(|(k, v)| (k.clone(), to_json(v))).collect())
        }
        Some(Kind::NullValue(_)) | None => Value::Null,
    }
}

fn match_condition(path: &str, value: &Value) -> Result<Condition> {
    match value {
        Value::String(s) => Ok(Condition::matches(path, s.clone())),
        Value::Bool(b) => Ok(Condition::matches(path, *b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Condition::matches(path, i)),
            None => {
                let x = n.as_f64().unwrap_or_default();
                let exact = Range { gte: Some(x), lte: Some(x), ..Default::default() };
                Ok(Condition::range(path, exact))
            }
        },
        other => Err(unsupported(format!("cannot match '{path}' against {other}"))),
    }
}

fn range_condition(path: &str, value: &Value, build: fn(f64) -> Range) -> Result<Condition> {
    let x = value.as_f64().ok_or_else(|| {
        unsupported(format!("range filter on '{path}' needs a number, got {value}"))
    })?;
    Ok(Condition::range(path, build(x)))
}

/// Translate a metadata predicate into a Qdrant filter over `metadata.*`.
pub fn to_filter(filter: &MetadataFilter) -> Result<Filter> {
    let path = |field: &str| format!("metadata.{field}");
    let nested = |filters: &[MetadataFilter]| -> Result<Vec<Condition>> {
        filters.iter().map(|f| to_filter(f).map(Condition::from)).collect()
    };
    let bounded = |field: &str, value: &Value, build: fn(f64) -> Range| -> Result<Filter> {
        Ok(Filter::must([range_condition(&path(field), value, build)?]))
    };

    Ok(match filter {
        MetadataFilter::Eq { field, value } => {
            Filter::must([match_condition(&path(field), value)?])
        }
        // A missing field never matches, so exclude empty fields too.
        MetadataFilter::Ne { field, value } => Filter::must_not([
            Condition::is_empty(path(field)),
            match_condition(&path(field), value)?,
        ]),
        MetadataFilter::Gt { field, value } => {
            bounded(field, value, |x| Range { gt: Some(x), ..Default::default() })?
        }
        MetadataFilter::Gte { field, value } => {
            bounded(field, value, |x| Range { gte: Some(x), ..Default::default() })?
        }
        MetadataFilter::Lt { field, value } => {
            bounded(field, value, |x| Range { lt: Some(x), ..Default::default() })?
        }
        MetadataFilter::Lte { field, value } => {
            bounded(field, value, |x| Range { lte: Some(x), ..Default::default() })?
        }
        MetadataFilter::In { field, values } => Filter::should(
            values.iter().map(|v| match_condition(&path(field), v)).collect::<Result<Vec<_>>>()?,
        ),
        MetadataFilter::And { filters } => Filter::must(nested(filters)?),
        MetadataFilter::Or { filters } => Filter::should(nested(filters)?),
    })
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    fn backend_name(&self) -> &str {
        BACKEND
    }

    fn collection(&self) -> &str {
        &self.collection
    }

    async fn insert_all(&self, records: &[EmbeddedChunk]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        // Points need a collection; create it from the bound definition on first insert.
        if !self.client.collection_exists(&self.collection).await.map_err(map_err)? {
            self.create_collection(&self.definition).await?;
        }

        let points = records.iter().map(|r| self.to_point(r)).collect::<Result<Vec<_>>>()?;
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .map_err(map_err)?;

        debug!(collection = %self.collection, count = records.len(), "upserted records to qdrant");
        Ok(())
    }

    async fn create_index(&self, definition: &IndexDefinition) -> Result<()> {
        if definition.name != self.definition.name {
            return Err(unsupported(format!(
                "collection '{}' is bound to index '{}', cannot declare '{}'",
                self.collection, self.definition.name, definition.name
            )));
        }
        if self.client.collection_exists(&self.collection).await.map_err(map_err)? {
            return Err(RagError::IndexAlreadyExists {
                collection: self.collection.clone(),
                index: definition.name.clone(),
            });
        }
        self.create_collection(definition).await
    }

    async fn index_status(&self, name: &str) -> Result<Option<IndexStatus>> {
        if name != self.definition.name
            || !self.client.collection_exists(&self.collection).await.map_err(map_err)?
        {
            return Ok(None);
        }
        let info = self.client.collection_info(&self.collection).await.map_err(map_err)?;
        let Some(info) = info.result else {
            return Ok(None);
        };

        let status = match info.status() {
            CollectionStatus::Green => IndexStatus::new(IndexState::Ready),
            CollectionStatus::Grey => IndexStatus::new(IndexState::Creating),
            CollectionStatus::Red => IndexStatus::failed("collection status is red"),
            CollectionStatus::Yellow | CollectionStatus::UnknownCollectionStatus => {
                IndexStatus::new(IndexState::Building)
            }
        };
        debug!(
            collection = %self.collection,
            state = %status.state,
            "polled qdrant collection status"
        );
        Ok(Some(status))
    }

    async fn search(&self, query: VectorQuery<'_>) -> Result<Vec<ScoredRecord>> {
        if query.index != self.definition.name {
            return Err(unsupported(format!(
                "index '{}' does not exist on '{}'",
                query.index, self.collection
            )));
        }

        let mut request =
            SearchPointsBuilder::new(&self.collection, query.vector.to_vec(), query.limit as u64)
                .with_payload(true)
                .with_vectors(true);
        if let Some(filter) = query.filter {
            request = request.filter(to_filter(filter)?);
        }

        let response = self.client.search_points(request).await.map_err(map_err)?;
        Ok(response.result.into_iter().map(|p| self.from_point(p)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_values_convert_to_json() {
        let payload = Payload::try_from(json!({ "a": [1, "x", true], "b": { "c": 2.5 } })).unwrap();
        let map: HashMap<String, QdrantValue> = payload.into();
        assert_eq!(to_json(&map["a"]), json!([1, "x", true]));
        assert_eq!(to_json(&map["b"]), json!({ "c": 2.5 }));
    }

    #[test]
    fn string_range_is_rejected() {
        let err = to_filter(&MetadataFilter::gt("title", "b")).unwrap_err();
        assert!(matches!(err, RagError::VectorStoreError { .. }));
        assert!(to_filter(&MetadataFilter::gte("page", 3)).is_ok());
    }
}
