//! Cow document schema

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for cows
pub const COW_COLLECTION: &str = "cows";

/// Pregnancy tracking, updated as a whole by the pregnancy endpoint
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct PregnancyStatus {
    #[serde(default)]
    pub is_pregnant: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_ai: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_calving_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_calving_date: Option<String>,
}

/// Derived health snapshot, recomputed after every health-record write or
/// delete. Latest unresolved record wins; none unresolved means healthy.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub current_condition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_illness: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checkup: Option<String>,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            current_condition: "healthy".to_string(),
            current_illness: None,
            last_checkup: None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CowDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub name: String,

    pub breed: String,

    /// ISO YYYY-MM-DD
    pub date_of_birth: String,

    pub farm_location: String,

    /// Dam reference; calves are resolved by querying this field, the mother
    /// document is never mutated when a calf is created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mother_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub father_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ear_tag_number: Option<String>,

    #[serde(default = "default_stage")]
    pub current_stage: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_price: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,

    #[serde(default)]
    pub pregnancy_status: PregnancyStatus,

    #[serde(default)]
    pub health_status: HealthStatus,

    // Running totals; a cache recomputed in full after every milk write
    #[serde(default)]
    pub total_milk_produced: f64,

    #[serde(default)]
    pub average_daily_milk: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_milking_date: Option<String>,

    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

fn default_stage() -> String {
    "active".to_string()
}

impl IntoIndexes for CowDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "farmLocation": 1 },
                Some(
                    IndexOptions::builder()
                        .name("cow_farm_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "motherId": 1 },
                Some(
                    IndexOptions::builder()
                        .name("cow_mother_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for CowDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
