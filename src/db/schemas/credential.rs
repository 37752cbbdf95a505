//! Credential document schema for the local identity provider
//!
//! Kept apart from user profiles so profile reads never touch password
//! hashes, and so deprovisioning can tolerate one side failing.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for identity credentials
pub const CREDENTIAL_COLLECTION: &str = "credentials";

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CredentialDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Subject id issued at identity creation; shared with the user profile
    pub subject_id: String,

    pub email: String,

    /// Argon2 password hash (PHC string)
    pub password_hash: String,

    /// Bumped to invalidate all outstanding tokens for this subject
    #[serde(default = "default_token_version")]
    pub token_version: i32,
}

fn default_token_version() -> i32 {
    1
}

impl CredentialDoc {
    pub fn new(subject_id: String, email: String, password_hash: String) -> Self {
        Self {
            id: None,
            metadata: Metadata::new(),
            subject_id,
            email,
            password_hash,
            token_version: 1,
        }
    }
}

impl IntoIndexes for CredentialDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "subjectId": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("credential_subject_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "email": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("credential_email_unique".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for CredentialDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
