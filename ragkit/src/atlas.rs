//! MongoDB Atlas Vector Search backend.
//!
//! Provides [`AtlasVectorStore`], which implements [`VectorStore`] over a
//! single Atlas collection using the official [mongodb](https://docs.rs/mongodb)
//! driver. Index declaration maps to `createSearchIndexes` with a
//! `vectorSearch` definition, status polling maps to `$listSearchIndexes`, and
//! queries run a `$vectorSearch` aggregation stage.
//!
//! This module is only available when the `atlas` feature is enabled.
//!
//! # Stored document layout
//!
//! ```json
//! {
//!   "_id": "<uuid>",
//!   "<text_field>": "chunk text",
//!   "<vector_field>": [0.1, 0.2, ...],
//!   "metadata": { ... },
//!   "document_id": "...",
//!   "chunk_index": 0,
//!   "source_offset": { "start": 0, "end": 200 }
//! }
//! ```
//!
//! Filterable metadata fields are declared on the index as `metadata.<field>`.

use futures::TryStreamExt;
use mongodb::bson::{self, Bson, Document, doc};
use mongodb::error::ErrorKind;
use mongodb::{Client, Collection, SearchIndexModel, SearchIndexType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::document::{Chunk, EmbeddedChunk, Metadata, ScoredRecord};
use crate::error::{RagError, Result};
use crate::filter::MetadataFilter;
use crate::index::{IndexDefinition, IndexState, IndexStatus};
use crate::vectorstore::{VectorQuery, VectorStore};

const BACKEND: &str = "MongoDBAtlas";
const METADATA_FIELD: &str = "metadata";
const SCORE_FIELD: &str = "_score";
/// Server error code for a duplicate index name.
const INDEX_ALREADY_EXISTS: i32 = 68;
/// `numCandidates` is this multiple of `limit`, capped by the server maximum.
const CANDIDATE_MULTIPLIER: usize = 10;
const MAX_CANDIDATES: usize = 10_000;

/// Connection settings for an Atlas cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtlasConfig {
    /// `mongodb+srv://` connection string.
    #[serde(default, skip_serializing)]
    pub uri: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_database() -> String {
    "langchain_db".to_string()
}

fn default_collection() -> String {
    "test".to_string()
}

impl AtlasConfig {
    /// Use the default `langchain_db.test` namespace.
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into(), database: default_database(), collection: default_collection() }
    }

    /// Read the connection string from `ATLAS_CONNECTION_STRING`.
    pub fn from_env() -> Result<Self> {
        let uri = std::env::var("ATLAS_CONNECTION_STRING").map_err(|_| {
            RagError::InvalidConfig("ATLAS_CONNECTION_STRING environment variable not set".into())
        })?;
        Ok(Self::new(uri))
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }
}

/// A [`VectorStore`] backed by a MongoDB Atlas collection.
///
/// The field names used for text and vectors come from the
/// [`IndexDefinition`] passed at connection time, so they must match the
/// index later declared with [`create_index`](VectorStore::create_index).
///
/// # Example
///
/// ```rust,ignore
/// use ragkit::atlas::{AtlasConfig, AtlasVectorStore};
///
/// let definition = IndexDefinition::default();
/// let store = AtlasVectorStore::connect(AtlasConfig::from_env()?, &definition).await?;
/// ```
pub struct AtlasVectorStore {
    client: Client,
    collection: Collection<Document>,
    namespace: String,
    text_field: String,
    vector_field: String,
    filter_fields: Vec<String>,
}

impl AtlasVectorStore {
    /// Connect to the cluster and bind to the configured collection.
    pub async fn connect(config: AtlasConfig, fields: &IndexDefinition) -> Result<Self> {
        if config.uri.is_empty() {
            return Err(RagError::InvalidConfig("Atlas connection string must not be empty".into()));
        }
        let client = Client::with_uri_str(&config.uri).await.map_err(map_err)?;
        let collection =
            client.database(&config.database).collection::<Document>(&config.collection);
        info!(database = %config.database, collection = %config.collection, "connected to Atlas");
        Ok(Self {
            client,
            collection,
            namespace: format!("{}.{}", config.database, config.collection),
            text_field: fields.text_field.clone(),
            vector_field: fields.vector_field.clone(),
            filter_fields: fields.filter_fields.clone(),
        })
    }

    fn to_document(&self, record: &EmbeddedChunk) -> Result<Document> {
        let chunk = &record.chunk;
        let metadata = bson::to_document(&chunk.metadata).map_err(|e| store_error(e.to_string()))?;
        let vector: Vec<Bson> = record.vector.iter().map(|x| Bson::Double(f64::from(*x))).collect();
        let (index, start, end) =
            (chunk.index as i64, chunk.source_offset.start as i64, chunk.source_offset.end as i64);
        let mut document = doc! {
            "_id": &record.id,
            "document_id": &chunk.document_id,
            "chunk_index": index,
            "source_offset": { "start": start, "end": end },
            METADATA_FIELD: metadata,
        };
        document.insert(self.text_field.as_str(), chunk.text.as_str());
        document.insert(self.vector_field.as_str(), vector);
        Ok(document)
    }

    fn from_document(&self, document: &Document) -> Result<ScoredRecord> {
        let text = document
            .get_str(&self.text_field)
            .map_err(|e| store_error(format!("missing '{}': {e}", self.text_field)))?;
        let vector = document
            .get_array(&self.vector_field)
            .map_err(|e| store_error(format!("missing '{}': {e}", self.vector_field)))?
            .iter()
            .filter_map(|v| v.as_f64().map(|x| x as f32))
            .collect();
        let metadata: Metadata = match document.get_document(METADATA_FIELD) {
            Ok(m) => bson::from_document(m.clone()).map_err(|e| store_error(e.to_string()))?,
            Err(_) => Metadata::new(),
        };
        let offset = document.get_document("source_offset").ok();
        let read_usize = |doc: Option<&Document>, key: &str| {
            doc.and_then(|d| d.get(key)).and_then(bson_to_usize).unwrap_or_default()
        };
        let id = match document.get("_id") {
            Some(Bson::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let score = document.get_f64(SCORE_FIELD).unwrap_or_default() as f32;

        Ok(ScoredRecord {
            record: EmbeddedChunk {
                id,
                chunk: Chunk {
                    text: text.to_string(),
                    source_offset: read_usize(offset, "start")..read_usize(offset, "end"),
                    metadata,
                    document_id: document.get_str("document_id").unwrap_or_default().to_string(),
                    index: read_usize(Some(document), "chunk_index"),
                },
                vector,
            },
            score,
        })
    }
}

fn bson_to_usize(value: &Bson) -> Option<usize> {
    match value {
        Bson::Int32(n) => usize::try_from(*n).ok(),
        Bson::Int64(n) => usize::try_from(*n).ok(),
        Bson::Double(n) if *n >= 0.0 => Some(*n as usize),
        _ => None,
    }
}

fn store_error(message: String) -> RagError {
    RagError::VectorStoreError { backend: BACKEND.to_string(), message }
}

fn map_err(e: mongodb::error::Error) -> RagError {
    store_error(e.to_string())
}

fn is_duplicate_index(e: &mongodb::error::Error) -> bool {
    matches!(*e.kind, ErrorKind::Command(ref c) if c.code == INDEX_ALREADY_EXISTS)
}

/// Build the body of an Atlas `vectorSearch` index definition.
pub fn index_definition(definition: &IndexDefinition) -> Document {
    let dimension = definition.dimension as i64;
    let mut fields = vec![Bson::Document(doc! {
        "type": "vector",
        "path": &definition.vector_field,
        "numDimensions": dimension,
        "similarity": definition.similarity.as_str(),
    })];
    fields.extend(definition.filter_fields.iter().map(|field| {
        Bson::Document(doc! { "type": "filter", "path": format!("{METADATA_FIELD}.{field}") })
    }));
    doc! { "fields": fields }
}

/// Translate a metadata predicate into an MQL pre-filter over `metadata.*`.
pub fn filter_document(filter: &MetadataFilter) -> Result<Document> {
    let to_bson = |value: &Value| bson::to_bson(value).map_err(|e| store_error(e.to_string()));
    let path = |field: &str| format!("{METADATA_FIELD}.{field}");
    let compare = |field: &str, op: &str, value: &Value| -> Result<Document> {
        let mut condition = Document::new();
        condition.insert(op, to_bson(value)?);
        let mut document = Document::new();
        document.insert(path(field), condition);
        Ok(document)
    };
    let combine = |op: &str, filters: &[MetadataFilter]| -> Result<Document> {
        let clauses = filters
            .iter()
            .map(|f| filter_document(f).map(Bson::Document))
            .collect::<Result<Vec<_>>>()?;
        let mut document = Document::new();
        document.insert(op, clauses);
        Ok(document)
    };

    match filter {
        MetadataFilter::Eq { field, value } => compare(field, "$eq", value),
        MetadataFilter::Ne { field, value } => compare(field, "$ne", value),
        MetadataFilter::Gt { field, value } => compare(field, "$gt", value),
        MetadataFilter::Gte { field, value } => compare(field, "$gte", value),
        MetadataFilter::Lt { field, value } => compare(field, "$lt", value),
        MetadataFilter::Lte { field, value } => compare(field, "$lte", value),
        MetadataFilter::In { field, values } => {
            compare(field, "$in", &Value::Array(values.clone()))
        }
        MetadataFilter::And { filters } => combine("$and", filters),
        MetadataFilter::Or { filters } => combine("$or", filters),
    }
}

#[async_trait::async_trait]
impl VectorStore for AtlasVectorStore {
    fn backend_name(&self) -> &str {
        BACKEND
    }

    fn collection(&self) -> &str {
        &self.namespace
    }

    async fn insert_all(&self, records: &[EmbeddedChunk]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let documents = records.iter().map(|r| self.to_document(r)).collect::<Result<Vec<_>>>()?;
        let result = self.collection.insert_many(documents).await.map_err(map_err)?;
        debug!(
            namespace = %self.namespace,
            count = result.inserted_ids.len(),
            "inserted records into Atlas"
        );
        Ok(())
    }

    async fn create_index(&self, definition: &IndexDefinition) -> Result<()> {
        if self.index_status(&definition.name).await?.is_some() {
            return Err(RagError::IndexAlreadyExists {
                collection: self.namespace.clone(),
                index: definition.name.clone(),
            });
        }

        let model = SearchIndexModel::builder()
            .definition(index_definition(definition))
            .name(definition.name.clone())
            .index_type(SearchIndexType::VectorSearch)
            .build();

        match self.collection.create_search_index(model).await {
            Ok(name) => {
                info!(namespace = %self.namespace, index = %name, "starting index build");
                Ok(())
            }
            Err(e) if is_duplicate_index(&e) => Err(RagError::IndexAlreadyExists {
                collection: self.namespace.clone(),
                index: definition.name.clone(),
            }),
            Err(e) => Err(map_err(e)),
        }
    }

    async fn index_status(&self, name: &str) -> Result<Option<IndexStatus>> {
        let mut cursor = self.collection.list_search_indexes().name(name).await.map_err(map_err)?;
        let Some(index) = cursor.try_next().await.map_err(map_err)? else {
            return Ok(None);
        };

        let status = index.get_str("status").unwrap_or("PENDING");
        let state = IndexState::from_backend(status);
        let detail = index.get_str("message").ok().map(str::to_string);
        debug!(namespace = %self.namespace, index = name, status, "polled Atlas index status");
        Ok(Some(IndexStatus { state, detail }))
    }

    async fn search(&self, query: VectorQuery<'_>) -> Result<Vec<ScoredRecord>> {
        let vector: Vec<Bson> = query.vector.iter().map(|x| Bson::Double(f64::from(*x))).collect();
        let num_candidates = candidate_count(query.limit)?;
        let limit = query.limit as i64;

        let mut stage = doc! {
            "index": query.index,
            "path": &self.vector_field,
            "queryVector": vector,
            "numCandidates": num_candidates,
            "limit": limit,
        };
        if let Some(filter) = query.filter {
            check_filter_fields(filter, &self.filter_fields)?;
            stage.insert("filter", filter_document(filter)?);
        }
        let pipeline = [
            doc! { "$vectorSearch": stage },
            doc! { "$set": { SCORE_FIELD: { "$meta": "vectorSearchScore" } } },
        ];

        let documents: Vec<Document> = self
            .collection
            .aggregate(pipeline)
            .await
            .map_err(map_err)?
            .try_collect()
            .await
            .map_err(map_err)?;
        documents.iter().map(|d| self.from_document(d)).collect()
    }

    async fn close(&self) -> Result<()> {
        self.client.clone().shutdown().await;
        info!(namespace = %self.namespace, "closed Atlas connection");
        Ok(())
    }
}

/// `numCandidates` for a query returning `limit` results.
///
/// The server requires `limit <= numCandidates <= 10_000`.
fn candidate_count(limit: usize) -> Result<i64> {
    if limit > MAX_CANDIDATES {
        return Err(RagError::InvalidConfig(format!(
            "Atlas returns at most {MAX_CANDIDATES} results per query, got limit {limit}"
        )));
    }
    Ok(limit.saturating_mul(CANDIDATE_MULTIPLIER).clamp(limit, MAX_CANDIDATES) as i64)
}

/// Atlas only pre-filters on paths declared as `filter` fields of the index.
fn check_filter_fields(filter: &MetadataFilter, declared: &[String]) -> Result<()> {
    match filter.fields().into_iter().find(|f| !declared.iter().any(|d| d == f)) {
        Some(field) => Err(RagError::InvalidConfig(format!(
            "metadata field '{field}' is not declared as a filter field of the index"
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::SimilarityMetric;

    #[test]
    fn index_definition_matches_atlas_shape() {
        let definition = IndexDefinition::new("vector_index", 1536)
            .with_similarity(SimilarityMetric::Cosine)
            .with_filter_field("page");
        let body = index_definition(&definition);
        assert_eq!(
            body,
            doc! {
                "fields": [
                    {
                        "type": "vector",
                        "path": "embedding",
                        "numDimensions": 1536_i64,
                        "similarity": "cosine",
                    },
                    { "type": "filter", "path": "metadata.page" },
                ]
            }
        );
    }

    #[test]
    fn filters_translate_to_mql() {
        let filter = MetadataFilter::and(vec![
            MetadataFilter::eq("topic", "rust"),
            MetadataFilter::gte("page", 3),
        ]);
        let mql = filter_document(&filter).unwrap();
        assert_eq!(
            mql,
            doc! { "$and": [
                { "metadata.topic": { "$eq": "rust" } },
                { "metadata.page": { "$gte": 3_i64 } },
            ] }
        );
    }

    #[test]
    fn candidate_count_stays_within_server_bounds() {
        assert_eq!(candidate_count(3).unwrap(), 30);
        assert_eq!(candidate_count(2_000).unwrap(), 10_000);
        assert_eq!(candidate_count(10_000).unwrap(), 10_000);
        assert!(matches!(candidate_count(20_000), Err(RagError::InvalidConfig(_))));
        assert!(matches!(candidate_count(usize::MAX), Err(RagError::InvalidConfig(_))));
    }

    #[test]
    fn undeclared_filter_fields_are_rejected() {
        let declared = vec!["page".to_string()];
        assert!(check_filter_fields(&MetadataFilter::gte("page", 2), &declared).is_ok());
        let filter = MetadataFilter::and(vec![
            MetadataFilter::gte("page", 2),
            MetadataFilter::eq("topic", "rust"),
        ]);
        let err = check_filter_fields(&filter, &declared).unwrap_err();
        assert!(matches!(err, RagError::InvalidConfig(ref m) if m.contains("'topic'")));
    }

    #[tokio::test]
    async fn oversized_search_fails_before_contacting_the_server() {
        let config = AtlasConfig::new("mongodb://127.0.0.1:1");
        let definition = IndexDefinition::new("vector_index", 2);
        let store = AtlasVectorStore::connect(config, &definition).await.unwrap();

        let vector = [1.0f32, 0.0];
        let query =
            VectorQuery { index: "vector_index", vector: &vector, limit: 20_000, filter: None };
        let err = store.search(query).await.unwrap_err();
        assert!(matches!(err, RagError::InvalidConfig(_)));
    }
}
