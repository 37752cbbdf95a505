//! Production record schemas: milk, eggs, feed, milk sales
//!
//! Parent fields (cow name, ear tag, farm location, batch name) are
//! snapshot-copied onto child records at write time. There is no live
//! binding: a later rename of the parent does not rewrite history.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

pub const MILK_RECORD_COLLECTION: &str = "milk_records";
pub const EGG_RECORD_COLLECTION: &str = "egg_records";
pub const FEED_RECORD_COLLECTION: &str = "feed_records";
pub const CHICKEN_FEED_RECORD_COLLECTION: &str = "chicken_feed_records";
pub const MILK_SALE_COLLECTION: &str = "milk_sales";

/// One milking session entry. At most one record may exist per
/// (cowId, date, session); enforced by a pre-insert existence check.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MilkRecordDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Hex object id of the cow
    pub cow_id: String,

    /// Snapshot of the cow's name at write time
    pub cow_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ear_tag_number: Option<String>,

    pub farm_location: String,

    /// Litres
    pub quantity: f64,

    /// morning | afternoon | evening
    pub session: String,

    /// ISO YYYY-MM-DD
    pub date: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    pub recorded_by: String,
}

impl IntoIndexes for MilkRecordDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Lookup index for the duplicate check; uniqueness is enforced
            // by the pre-insert existence check, not the index
            (
                doc! { "cowId": 1, "date": 1, "session": 1 },
                Some(
                    IndexOptions::builder()
                        .name("milk_cow_date_session_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "farmLocation": 1, "date": 1 },
                Some(
                    IndexOptions::builder()
                        .name("milk_farm_date_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for MilkRecordDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

/// One day's egg collection for a batch. At most one per (batchId, date).
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EggRecordDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Hex object id of the batch document
    pub batch_id: String,

    /// Snapshot of the batch's business key
    pub batch_name: String,

    pub farm_location: String,

    pub quantity: f64,

    /// ISO YYYY-MM-DD
    pub date: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    pub recorded_by: String,
}

impl IntoIndexes for EggRecordDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "batchId": 1, "date": 1 },
                Some(
                    IndexOptions::builder()
                        .name("egg_batch_date_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "farmLocation": 1, "date": 1 },
                Some(
                    IndexOptions::builder()
                        .name("egg_farm_date_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for EggRecordDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

/// Cattle feed consumption entry
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FeedRecordDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub cow_id: String,

    pub cow_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ear_tag_number: Option<String>,

    pub farm_location: String,

    pub feed_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,

    pub quantity: f64,

    #[serde(default = "default_unit")]
    pub unit: String,

    /// ISO YYYY-MM-DD
    pub date: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    pub recorded_by: String,

    /// Shared id marking records created by one bulk entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bulk_entry_id: Option<String>,
}

fn default_unit() -> String {
    "kg".to_string()
}

impl IntoIndexes for FeedRecordDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "cowId": 1 },
                Some(
                    IndexOptions::builder()
                        .name("feed_cow_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "farmLocation": 1, "date": 1 },
                Some(
                    IndexOptions::builder()
                        .name("feed_farm_date_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for FeedRecordDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

/// Poultry feed consumption entry
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChickenFeedRecordDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub batch_id: String,

    pub batch_name: String,

    pub farm_location: String,

    pub feed_type: String,

    pub quantity: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,

    /// ISO YYYY-MM-DD
    pub date: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    pub recorded_by: String,
}

impl IntoIndexes for ChickenFeedRecordDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "batchId": 1 },
            Some(
                IndexOptions::builder()
                    .name("chicken_feed_batch_index".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for ChickenFeedRecordDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

/// Milk revenue record, independent of production records
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MilkSaleDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub farm_location: String,

    pub quantity: f64,

    pub price_per_litre: f64,

    pub total_amount: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer: Option<String>,

    /// ISO YYYY-MM-DD
    pub date: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    pub recorded_by: String,
}

impl IntoIndexes for MilkSaleDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "farmLocation": 1, "date": 1 },
            Some(
                IndexOptions::builder()
                    .name("sale_farm_date_index".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for MilkSaleDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
