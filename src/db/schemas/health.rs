//! Veterinary health record schema

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

pub const HEALTH_RECORD_COLLECTION: &str = "health_records";

/// One illness/treatment case. Writing or deleting a record triggers a full
/// recompute of the parent cow's health status.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecordDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub cow_id: String,

    pub cow_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ear_tag_number: Option<String>,

    pub farm_location: String,

    /// ISO YYYY-MM-DD
    pub date_of_illness: String,

    pub disease: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symptoms: Option<String>,

    pub treatment: String,

    pub medicine_used: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dosage: Option<String>,

    pub cost: f64,

    pub vet_name: String,

    pub vet_contact: String,

    /// ISO YYYY-MM-DD
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_treatment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_notes: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(default)]
    pub is_resolved: bool,

    pub recorded_by: String,
}

impl IntoIndexes for HealthRecordDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "cowId": 1, "isResolved": 1 },
                Some(
                    IndexOptions::builder()
                        .name("health_cow_resolved_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "farmLocation": 1, "dateOfIllness": 1 },
                Some(
                    IndexOptions::builder()
                        .name("health_farm_date_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for HealthRecordDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
