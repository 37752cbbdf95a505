//! MongoDB client and collection wrapper
//!
//! Typed collection adapter used by every feature module: create, lookup,
//! equality-filtered listing, single-field range queries, offset pagination,
//! merge updates, and hard deletion. Soft deletion is a domain concern
//! (entities carry an `is_active` flag); the store never filters on it.

use bson::{doc, oid::ObjectId, Bson, DateTime, Document};
use mongodb::{
    options::{FindOptions, IndexOptions, UpdateModifications},
    results::{DeleteResult, UpdateResult},
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, info};

use crate::db::schemas::Metadata;
use crate::types::FarmgateError;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// Sort direction for paginated listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    fn as_bson(self) -> Bson {
        match self {
            SortDirection::Ascending => Bson::Int32(1),
            SortDirection::Descending => Bson::Int32(-1),
        }
    }
}

/// One page of results plus the total matching count.
///
/// The count is a second full-filter pass; there is no streaming cursor.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: u64,
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Create a new MongoDB client
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, FarmgateError> {
        info!("Connecting to MongoDB at {}", uri);

        // Use serverSelectionTimeoutMS to avoid hanging on unreachable MongoDB
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| FarmgateError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        // Verify connection with timeout
        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| FarmgateError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, FarmgateError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    /// Get the raw MongoDB client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the database name
    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
{
    /// Create a new collection and apply indexes
    pub async fn new(
        client: &Client,
        db_name: &str,
        collection_name: &str,
    ) -> Result<Self, FarmgateError> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        // Apply indexes
        mongo_collection.apply_indexes().await?;

        Ok(mongo_collection)
    }

    /// Apply schema-defined indexes
    async fn apply_indexes(&self) -> Result<(), FarmgateError> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| FarmgateError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Insert a document, stamping metadata timestamps
    pub async fn insert_one(&self, mut item: T) -> Result<ObjectId, FarmgateError> {
        let metadata = item.mut_metadata();
        metadata.created_at = Some(DateTime::now());
        metadata.updated_at = Some(DateTime::now());

        let result = self
            .inner
            .insert_one(item)
            .await
            .map_err(|e| FarmgateError::Database(format!("Insert failed: {}", e)))?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| FarmgateError::Database("Failed to get inserted ID".into()))
    }

    /// Find a document by its object id
    pub async fn find_by_id(&self, id: &ObjectId) -> Result<Option<T>, FarmgateError> {
        self.find_one(doc! { "_id": id }).await
    }

    /// Find one document by filter
    pub async fn find_one(&self, filter: Document) -> Result<Option<T>, FarmgateError> {
        self.inner
            .find_one(filter)
            .await
            .map_err(|e| FarmgateError::Database(format!("Find failed: {}", e)))
    }

    /// Find many documents by AND-ed equality filter
    pub async fn find_many(&self, filter: Document) -> Result<Vec<T>, FarmgateError> {
        self.collect_cursor(
            self.inner
                .find(filter)
                .await
                .map_err(|e| FarmgateError::Database(format!("Find failed: {}", e)))?,
        )
        .await
    }

    /// Range query on a single field, with optional bounds, plus equality filters.
    ///
    /// Used exclusively for date-bounded listings; date fields are ISO
    /// `YYYY-MM-DD` strings so lexicographic $gte/$lte is chronological.
    pub async fn range_query(
        &self,
        field: &str,
        lower: Option<&str>,
        upper: Option<&str>,
        mut equality: Document,
    ) -> Result<Vec<T>, FarmgateError> {
        let mut range = Document::new();
        if let Some(lo) = lower {
            range.insert("$gte", lo);
        }
        if let Some(hi) = upper {
            range.insert("$lte", hi);
        }
        if !range.is_empty() {
            equality.insert(field, range);
        }

        self.find_many(equality).await
    }

    /// Offset-based pagination: 1-indexed page, separate count pass
    pub async fn paginate(
        &self,
        filter: Document,
        page: i64,
        page_size: i64,
        sort_field: &str,
        direction: SortDirection,
    ) -> Result<Page<T>, FarmgateError> {
        let page = page.max(1);
        let skip = ((page - 1) * page_size) as u64;

        let mut sort = Document::new();
        sort.insert(sort_field, direction.as_bson());

        let options = FindOptions::builder()
            .sort(sort)
            .skip(skip)
            .limit(page_size)
            .build();

        let cursor = self
            .inner
            .find(filter.clone())
            .with_options(options)
            .await
            .map_err(|e| FarmgateError::Database(format!("Find failed: {}", e)))?;

        let items = self.collect_cursor(cursor).await?;

        let total_count = self
            .inner
            .count_documents(filter)
            .await
            .map_err(|e| FarmgateError::Database(format!("Count failed: {}", e)))?;

        Ok(Page { items, total_count })
    }

    /// Update one document with $set merge semantics, bumping `updated_at`
    pub async fn update_one(
        &self,
        filter: Document,
        mut set_fields: Document,
    ) -> Result<UpdateResult, FarmgateError> {
        set_fields.insert("metadata.updated_at", DateTime::now());
        let update = UpdateModifications::Document(doc! { "$set": set_fields });

        self.inner
            .update_one(filter, update)
            .await
            .map_err(|e| FarmgateError::Database(format!("Update failed: {}", e)))
    }

    /// Hard delete one document. Rarely used: production/audit records and
    /// user deprovisioning only. Livestock entities are soft-deleted via
    /// `is_active` instead.
    pub async fn delete_one(&self, filter: Document) -> Result<DeleteResult, FarmgateError> {
        self.inner
            .delete_one(filter)
            .await
            .map_err(|e| FarmgateError::Database(format!("Delete failed: {}", e)))
    }

    /// Count documents matching a filter
    pub async fn count(&self, filter: Document) -> Result<u64, FarmgateError> {
        self.inner
            .count_documents(filter)
            .await
            .map_err(|e| FarmgateError::Database(format!("Count failed: {}", e)))
    }

    async fn collect_cursor(
        &self,
        cursor: mongodb::Cursor<T>,
    ) -> Result<Vec<T>, FarmgateError> {
        use futures_util::StreamExt;

        let results: Vec<T> = cursor
            .filter_map(|item| async {
                match item {
                    Ok(d) => Some(d),
                    Err(e) => {
                        error!("Error reading document: {}", e);
                        None
                    }
                }
            })
            .collect()
            .await;

        Ok(results)
    }

    /// Get the underlying collection for advanced operations
    pub fn inner(&self) -> &Collection<T> {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    // Store operations are exercised against a running MongoDB instance;
    // see docker-compose.dev.yml for local testing.
}
