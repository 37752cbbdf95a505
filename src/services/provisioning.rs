//! User deprovisioning
//!
//! Removing a user is a dual write with no transactional guarantee: the
//! store-side profile goes first, then the identity-provider credentials.
//! Identity failure is tolerated and logged so an orphaned credential never
//! blocks profile removal.

use bson::{doc, oid::ObjectId};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::IdentityProvider;
use crate::db::schemas::{UserDoc, USER_COLLECTION};
use crate::db::MongoClient;
use crate::types::{FarmgateError, Result};

/// Remove a user profile and their identity credentials as one named
/// operation. Returns the removed profile.
pub async fn deprovision_user(
    mongo: &MongoClient,
    identity: &Arc<dyn IdentityProvider>,
    user_id: &ObjectId,
) -> Result<UserDoc> {
    let users = mongo.collection::<UserDoc>(USER_COLLECTION).await?;

    let user = users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("User not found".into()))?;

    users.delete_one(doc! { "_id": *user_id }).await?;

    // Best-effort: the profile is already gone, a credential left behind is
    // unreachable and harmless
    if let Err(e) = identity.delete_identity(&user.subject_id).await {
        warn!(
            subject = %user.subject_id,
            "Identity deletion failed during deprovision (continuing): {}", e
        );
    } else {
        info!(subject = %user.subject_id, "User deprovisioned");
    }

    Ok(user)
}
