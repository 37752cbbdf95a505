//! Farm document schema

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for farms
pub const FARM_COLLECTION: &str = "farms";

/// Farm document. `location` is the business key every livestock and
/// production record denormalizes as `farmLocation`; it never changes after
/// creation.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FarmDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub name: String,

    /// Unique location key, immutable after creation
    pub location: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Established date as ISO YYYY-MM-DD
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub established_date: Option<String>,

    /// Size in acres
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,

    #[serde(default)]
    pub specialization: Vec<String>,

    /// Free-form settings map; merged on update, seeded by the initialize
    /// operation
    #[serde(default)]
    pub settings: Document,

    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl FarmDoc {
    /// Default settings applied at creation
    pub fn default_settings() -> Document {
        doc! {
            "milkingSessions": ["morning", "afternoon", "evening"],
            "milkingTimes": {
                "morning": "06:00",
                "afternoon": "13:00",
                "evening": "18:00",
            },
            "defaultCurrency": "KES",
            "workingDays": [
                "monday", "tuesday", "wednesday", "thursday",
                "friday", "saturday", "sunday",
            ],
        }
    }

    /// Full settings seeded by POST /:location/initialize
    pub fn initialized_settings() -> Document {
        let mut settings = Self::default_settings();
        settings.insert(
            "feedTypes",
            doc! {
                "concentrates": ["dairy_meal", "maize_jam"],
                "minerals": ["maclic_supa", "maclic_plus"],
                "roughage": ["napier", "hay", "silage"],
            },
        );
        settings.insert(
            "chickenSettings",
            doc! {
                "defaultLifespan": 365,
                "eggProductionAge": 150,
                "defaultBatchSize": 100,
            },
        );
        settings.insert(
            "notifications",
            doc! {
                "lowMilkProduction": true,
                "healthIssues": true,
                "feedRestock": true,
                "chickenAging": true,
            },
        );
        settings.insert("initialized", true);
        settings
    }
}

impl IntoIndexes for FarmDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "location": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("location_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for FarmDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
