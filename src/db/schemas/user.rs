//! User profile document schema
//!
//! Profiles carry role and farm assignment; credential material lives with
//! the identity provider (`credentials` collection), not here.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::auth::access::Role;
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for user profiles
pub const USER_COLLECTION: &str = "users";

/// User profile stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Identity provider subject id; the bearer token's `sub` claim
    pub subject_id: String,

    /// Email address (unique)
    pub email: String,

    pub first_name: String,

    pub last_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    /// Role determines the static capability set; never stored per-user
    pub role: Role,

    /// Farm this user is scoped to; None for unassigned (admins)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_farm: Option<String>,

    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl UserDoc {
    pub fn new(
        subject_id: String,
        email: String,
        first_name: String,
        last_name: String,
        phone: Option<String>,
        role: Role,
        assigned_farm: Option<String>,
    ) -> Self {
        Self {
            id: None,
            metadata: Metadata::new(),
            subject_id,
            email,
            first_name,
            last_name,
            phone,
            role,
            assigned_farm,
            is_active: true,
        }
    }
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "subjectId": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("subject_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "email": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("email_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "assignedFarm": 1 },
                Some(
                    IndexOptions::builder()
                        .name("assigned_farm_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for UserDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
