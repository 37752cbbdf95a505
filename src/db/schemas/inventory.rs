//! Feed inventory schema

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

pub const FEED_INVENTORY_COLLECTION: &str = "feed_inventory";

/// A feed purchase held in stock. `needs_restock` is an operator flag,
/// settable independently of the stock level.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FeedInventoryDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub farm_location: String,

    pub feed_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,

    pub quantity: f64,

    #[serde(default = "default_unit")]
    pub unit: String,

    /// ISO YYYY-MM-DD
    pub purchase_date: String,

    pub purchase_price: f64,

    #[serde(default)]
    pub transport_cost: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    pub current_stock: f64,

    #[serde(default)]
    pub needs_restock: bool,

    #[serde(default = "default_true")]
    pub is_active: bool,

    pub recorded_by: String,
}

fn default_unit() -> String {
    "kg".to_string()
}

fn default_true() -> bool {
    true
}

impl IntoIndexes for FeedInventoryDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "farmLocation": 1 },
            Some(
                IndexOptions::builder()
                    .name("inventory_farm_index".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for FeedInventoryDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
