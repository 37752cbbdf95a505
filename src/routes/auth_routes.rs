//! HTTP routes for authentication
//!
//! - POST /auth/login           - Authenticate and get a JWT
//! - POST /auth/register        - Create an account (bootstrap/self-service)
//! - GET  /auth/verify          - Validate the token, return the profile
//! - POST /auth/logout          - Client-side token discard acknowledgement
//! - PUT  /auth/change-password - Rotate the secret, revoking old tokens
//! - PUT  /auth/profile         - Update own profile fields

use bson::doc;
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::auth::access::Role;
use crate::db::schemas::{UserDoc, USER_COLLECTION};
use crate::routes::helpers::{
    created, doc_to_json, error_response, ok_data, ok_message, ok_with_message, parse_json_body,
    resolve_access, sanitize, BoxBody,
};
use crate::server::AppState;
use crate::types::{FarmgateError, Result};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    #[serde(default)]
    pub assigned_farm: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Route /auth/* requests. Returns None for unknown subpaths.
pub async fn handle_auth_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path().to_string();
    let method = req.method().clone();
    let dev_mode = state.args.dev_mode;

    let result = match (method, path.as_str()) {
        (Method::POST, "/auth/login") => handle_login(req, &state).await,
        (Method::POST, "/auth/register") => handle_register(req, &state).await,
        (Method::GET, "/auth/verify") => handle_verify(req, &state).await,
        (Method::POST, "/auth/logout") => handle_logout(req, &state).await,
        (Method::PUT, "/auth/change-password") => handle_change_password(req, &state).await,
        (Method::PUT, "/auth/profile") => handle_update_profile(req, &state).await,
        _ => return None,
    };

    Some(result.unwrap_or_else(|e| error_response(&e, dev_mode)))
}

async fn handle_login(req: Request<Incoming>, state: &Arc<AppState>) -> Result<Response<BoxBody>> {
    let body: LoginRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    if body.email.is_empty() || body.password.is_empty() {
        return Err(FarmgateError::Validation(
            "Missing required fields: email, password".into(),
        ));
    }

    let issued = state
        .identity
        .authenticate(&body.email.to_lowercase(), &body.password)
        .await?;

    let user = state
        .mongo
        .collection::<UserDoc>(USER_COLLECTION)
        .await?
        .find_one(doc! { "subjectId": issued.subject_id.as_str() })
        .await?
        .ok_or_else(|| FarmgateError::NotFound("User profile not found".into()))?;

    if !user.is_active {
        return Err(FarmgateError::Forbidden("Account is disabled".into()));
    }

    info!("Login: {}", user.email);

    Ok(ok_with_message(
        json!({
            "token": issued.token,
            "expiresAt": issued.expires_at,
            "user": doc_to_json(&user),
        }),
        "Login successful",
    ))
}

async fn handle_register(
    req: Request<Incoming>,
    state: &Arc<AppState>,
) -> Result<Response<BoxBody>> {
    let body: RegisterRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    if body.email.is_empty() || body.password.is_empty() {
        return Err(FarmgateError::Validation(
            "Missing required fields: email, password".into(),
        ));
    }
    if !body.email.contains('@') {
        return Err(FarmgateError::Validation("Invalid email address".into()));
    }
    if body.password.len() < 6 {
        return Err(FarmgateError::Validation(
            "Password must be at least 6 characters".into(),
        ));
    }

    let role = Role::parse(&body.role)?;
    let email = sanitize(&body.email.to_lowercase());

    let users = state.mongo.collection::<UserDoc>(USER_COLLECTION).await?;
    if users.find_one(doc! { "email": email.as_str() }).await?.is_some() {
        return Err(FarmgateError::Conflict("Email already exists".into()));
    }

    // Identity first; a failure here leaves no orphaned profile
    let subject_id = state.identity.create_identity(&email, &body.password).await?;

    let mut user = UserDoc::new(
        subject_id,
        email.clone(),
        sanitize(&body.first_name),
        sanitize(&body.last_name),
        body.phone.as_deref().map(sanitize),
        role,
        body.assigned_farm.as_deref().map(sanitize),
    );
    user.id = Some(users.insert_one(user.clone()).await?);

    info!("Registered user: {} ({})", email, role);

    Ok(created(
        json!({ "user": doc_to_json(&user) }),
        "User created successfully",
    ))
}

async fn handle_verify(req: Request<Incoming>, state: &Arc<AppState>) -> Result<Response<BoxBody>> {
    let ctx = resolve_access(state, &req).await?;

    let user = state
        .mongo
        .collection::<UserDoc>(USER_COLLECTION)
        .await?
        .find_one(doc! { "subjectId": ctx.subject_id.as_str() })
        .await?
        .ok_or_else(|| FarmgateError::NotFound("User profile not found".into()))?;

    Ok(ok_data(json!({
        "user": doc_to_json(&user),
        "isAuthenticated": true,
    })))
}

async fn handle_logout(req: Request<Incoming>, state: &Arc<AppState>) -> Result<Response<BoxBody>> {
    // Tokens are stateless; logout is a client-side discard
    resolve_access(state, &req).await?;
    Ok(ok_message("Logout successful"))
}

async fn handle_change_password(
    req: Request<Incoming>,
    state: &Arc<AppState>,
) -> Result<Response<BoxBody>> {
    let ctx = resolve_access(state, &req).await?;
    let body: ChangePasswordRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    if body.new_password.len() < 6 {
        return Err(FarmgateError::Validation(
            "Password must be at least 6 characters".into(),
        ));
    }

    state
        .identity
        .change_secret(&ctx.subject_id, &body.current_password, &body.new_password)
        .await?;

    Ok(ok_message("Password updated successfully"))
}

async fn handle_update_profile(
    req: Request<Incoming>,
    state: &Arc<AppState>,
) -> Result<Response<BoxBody>> {
    let ctx = resolve_access(state, &req).await?;
    let body: UpdateProfileRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    let mut set_fields = doc! {};
    if let Some(first_name) = &body.first_name {
        set_fields.insert("firstName", sanitize(first_name));
    }
    if let Some(last_name) = &body.last_name {
        set_fields.insert("lastName", sanitize(last_name));
    }
    if let Some(phone) = &body.phone {
        set_fields.insert("phone", sanitize(phone));
    }

    if set_fields.is_empty() {
        return Err(FarmgateError::Validation("No fields to update".into()));
    }

    let users = state.mongo.collection::<UserDoc>(USER_COLLECTION).await?;
    users
        .update_one(doc! { "subjectId": ctx.subject_id.as_str() }, set_fields)
        .await?;

    let user = users
        .find_one(doc! { "subjectId": ctx.subject_id.as_str() })
        .await?
        .ok_or_else(|| FarmgateError::NotFound("User profile not found".into()))?;

    Ok(ok_with_message(
        json!({ "user": doc_to_json(&user) }),
        "Profile updated successfully",
    ))
}
