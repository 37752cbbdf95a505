//! Chicken batch and count-change audit schemas

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for chicken batches
pub const CHICKEN_BATCH_COLLECTION: &str = "chicken_batches";

/// Collection name for the append-only count-change audit log
pub const COUNT_CHANGE_COLLECTION: &str = "chicken_count_changes";

/// Default days until a batch starts laying
pub const DEFAULT_EGG_PRODUCTION_AGE_DAYS: i64 = 150;

/// Default expected batch lifespan in days
pub const DEFAULT_BATCH_LIFESPAN_DAYS: i64 = 365;

/// Feed consumption cache, recomputed after every chicken-feed write
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct FeedConsumption {
    #[serde(default)]
    pub total_quantity: f64,
    #[serde(default)]
    pub average_per_day: f64,
}

/// Egg production cache. `started_laying_date` is latched on the first egg
/// record and never cleared afterwards.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProductionStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_laying_date: Option<String>,
    #[serde(default)]
    pub average_eggs_per_day: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChickenBatchDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Unique business key (e.g. CHICK_X7F2_A1)
    pub batch_id: String,

    pub initial_count: i64,

    /// Mutated only through audited count-change operations
    pub current_count: i64,

    /// ISO YYYY-MM-DD
    pub date_acquired: String,

    pub farm_location: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breed: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default = "default_production_age")]
    pub expected_egg_production_age: i64,

    #[serde(default = "default_lifespan")]
    pub expected_lifespan: i64,

    #[serde(default)]
    pub total_eggs_produced: f64,

    #[serde(default)]
    pub total_deaths: i64,

    #[serde(default)]
    pub total_hatched: i64,

    #[serde(default)]
    pub feed_consumption: FeedConsumption,

    #[serde(default)]
    pub production_stats: ProductionStats,

    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

fn default_production_age() -> i64 {
    DEFAULT_EGG_PRODUCTION_AGE_DAYS
}

fn default_lifespan() -> i64 {
    DEFAULT_BATCH_LIFESPAN_DAYS
}

impl IntoIndexes for ChickenBatchDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "batchId": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("batch_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "farmLocation": 1 },
                Some(
                    IndexOptions::builder()
                        .name("batch_farm_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ChickenBatchDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

/// Append-only audit record written alongside every batch count mutation
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CountChangeDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Hex object id of the batch document
    pub batch_ref: String,

    /// "decrease" (deaths) or "increase" (hatched)
    pub operation: String,

    pub count: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// ISO YYYY-MM-DD
    pub date: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    pub previous_count: i64,

    pub new_count: i64,

    pub recorded_by: String,
}

impl IntoIndexes for CountChangeDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "batchRef": 1 },
            Some(
                IndexOptions::builder()
                    .name("count_change_batch_index".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for CountChangeDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
