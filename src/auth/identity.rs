//! Identity provider
//!
//! Issues and verifies bearer tokens and owns credential storage. The rest
//! of the system only sees subject ids; password hashes never leave this
//! module. Behind a trait so the store-facing modules stay decoupled from
//! the token mechanics.

use async_trait::async_trait;
use bson::doc;
use uuid::Uuid;

use crate::auth::jwt::JwtValidator;
use crate::auth::password::{hash_password, verify_password};
use crate::db::schemas::{CredentialDoc, CREDENTIAL_COLLECTION};
use crate::db::MongoClient;
use crate::types::{FarmgateError, Result};

/// A freshly issued bearer token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub subject_id: String,
    /// Unix seconds
    pub expires_at: u64,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify a bearer token, returning the subject id
    async fn verify(&self, bearer_token: &str) -> Result<String>;

    /// Create credentials for a new identity, returning the subject id
    async fn create_identity(&self, email: &str, secret: &str) -> Result<String>;

    /// Remove an identity's credentials
    async fn delete_identity(&self, subject_id: &str) -> Result<()>;

    /// Check email/secret and issue a token
    async fn authenticate(&self, email: &str, secret: &str) -> Result<IssuedToken>;

    /// Rotate the secret; outstanding tokens become invalid
    async fn change_secret(&self, subject_id: &str, current: &str, new: &str) -> Result<()>;
}

/// MongoDB-backed identity provider signing JWTs with a shared secret
pub struct LocalIdentityProvider {
    mongo: MongoClient,
    jwt: JwtValidator,
}

impl LocalIdentityProvider {
    pub fn new(mongo: MongoClient, jwt: JwtValidator) -> Self {
        Self { mongo, jwt }
    }

    async fn credentials(&self) -> Result<crate::db::MongoCollection<CredentialDoc>> {
        self.mongo.collection::<CredentialDoc>(CREDENTIAL_COLLECTION).await
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn verify(&self, bearer_token: &str) -> Result<String> {
        let claims = self.jwt.verify(bearer_token)?;

        let credential = self
            .credentials()
            .await?
            .find_one(doc! { "subjectId": claims.sub.as_str() })
            .await?
            .ok_or_else(|| FarmgateError::Unauthenticated("Unknown identity".into()))?;

        if claims.token_version != credential.token_version {
            return Err(FarmgateError::Unauthenticated("Token has been revoked".into()));
        }

        Ok(claims.sub)
    }

    async fn create_identity(&self, email: &str, secret: &str) -> Result<String> {
        let credentials = self.credentials().await?;

        if credentials
            .find_one(doc! { "email": email })
            .await?
            .is_some()
        {
            return Err(FarmgateError::Conflict("Email already exists".into()));
        }

        let subject_id = Uuid::new_v4().to_string();
        let password_hash = hash_password(secret)?;

        credentials
            .insert_one(CredentialDoc::new(
                subject_id.clone(),
                email.to_string(),
                password_hash,
            ))
            .await?;

        Ok(subject_id)
    }

    async fn delete_identity(&self, subject_id: &str) -> Result<()> {
        let result = self
            .credentials()
            .await?
            .delete_one(doc! { "subjectId": subject_id })
            .await?;

        if result.deleted_count == 0 {
            return Err(FarmgateError::NotFound("Identity not found".into()));
        }

        Ok(())
    }

    async fn authenticate(&self, email: &str, secret: &str) -> Result<IssuedToken> {
        let credential = self
            .credentials()
            .await?
            .find_one(doc! { "email": email })
            .await?
            .ok_or_else(|| FarmgateError::Unauthenticated("Invalid credentials".into()))?;

        if !verify_password(secret, &credential.password_hash)? {
            return Err(FarmgateError::Unauthenticated("Invalid credentials".into()));
        }

        let (token, expires_at) =
            self.jwt
                .generate(&credential.subject_id, &credential.email, credential.token_version)?;

        Ok(IssuedToken {
            token,
            subject_id: credential.subject_id,
            expires_at,
        })
    }

    async fn change_secret(&self, subject_id: &str, current: &str, new: &str) -> Result<()> {
        let credentials = self.credentials().await?;

        let credential = credentials
            .find_one(doc! { "subjectId": subject_id })
            .await?
            .ok_or_else(|| FarmgateError::NotFound("Identity not found".into()))?;

        if !verify_password(current, &credential.password_hash)? {
            return Err(FarmgateError::Unauthenticated("Current password is incorrect".into()));
        }

        let password_hash = hash_password(new)?;

        credentials
            .update_one(
                doc! { "subjectId": subject_id },
                doc! {
                    "passwordHash": password_hash,
                    "tokenVersion": credential.token_version + 1,
                },
            )
            .await?;

        Ok(())
    }
}
