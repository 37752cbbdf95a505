//! User management routes (admin only)
//!
//! GET    /api/users                 - paginated listing (farm/role filters)
//! POST   /api/users                 - create user + identity
//! GET    /api/users/:id
//! PUT    /api/users/:id
//! DELETE /api/users/:id             - deprovision (profile + identity)
//! GET    /api/users/farm/:location

use bson::doc;
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::auth::access::Role;
use crate::db::schemas::{UserDoc, USER_COLLECTION};
use crate::db::SortDirection;
use crate::routes::helpers::{
    created, doc_to_json, docs_to_json, error_response, ok_data, ok_message, ok_with_message,
    pagination_meta, parse_json_body, parse_object_id, query_params, resolve_access, sanitize,
    BoxBody,
};
use crate::server::AppState;
use crate::services;
use crate::types::{FarmgateError, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
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
pub struct UpdateUserRequest {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub assigned_farm: Option<Option<String>>,
    #[serde(default)]
    pub phone: Option<Option<String>>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Route /api/users/* requests
pub async fn handle_user_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let dev_mode = state.args.dev_mode;
    dispatch(req, state).await.unwrap_or_else(|e| error_response(&e, dev_mode))
}

async fn dispatch(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let ctx = resolve_access(&state, &req).await?;
    // The whole module is admin-only
    ctx.require_admin()?;

    let path = req.uri().path().trim_start_matches("/api/users").to_string();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let method = req.method().clone();

    match (method, segments.as_slice()) {
        (Method::GET, []) => list_users(req, &state).await,
        (Method::POST, []) => create_user(req, &state).await,
        (Method::GET, ["farm", location]) => {
            let location = location.to_string();
            users_by_farm(req, &state, &location).await
        }
        (Method::GET, [id]) => {
            let id = id.to_string();
            get_user(&state, &id).await
        }
        (Method::PUT, [id]) => {
            let id = id.to_string();
            update_user(req, &state, &id).await
        }
        (Method::DELETE, [id]) => {
            let id = id.to_string();
            delete_user(&state, &id).await
        }
        _ => Err(FarmgateError::NotFound(format!(
            "Route not found: /api/users{}",
            path
        ))),
    }
}

async fn list_users(req: Request<Incoming>, state: &Arc<AppState>) -> Result<Response<BoxBody>> {
    let params = query_params(&req);
    let page: i64 = params.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let limit = state
        .args
        .clamp_page_size(params.get("limit").and_then(|l| l.parse().ok()));

    let mut filter = doc! {};
    if let Some(farm) = params.get("farm") {
        filter.insert("assignedFarm", farm.as_str());
    }
    if let Some(role) = params.get("role") {
        Role::parse(role)?;
        filter.insert("role", role.as_str());
    }

    let page_result = state
        .mongo
        .collection::<UserDoc>(USER_COLLECTION)
        .await?
        .paginate(filter, page, limit, "metadata.created_at", SortDirection::Descending)
        .await?;

    Ok(ok_data(json!({
        "users": docs_to_json(&page_result.items),
        "pagination": pagination_meta(page, limit, page_result.total_count),
    })))
}

async fn create_user(req: Request<Incoming>, state: &Arc<AppState>) -> Result<Response<BoxBody>> {
    let body: CreateUserRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    if body.email.is_empty() || !body.email.contains('@') {
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

    let subject_id = state.identity.create_identity(&email, &body.password).await?;

    let mut user = UserDoc::new(
        subject_id,
        email,
        sanitize(&body.first_name),
        sanitize(&body.last_name),
        body.phone.as_deref().map(sanitize),
        role,
        body.assigned_farm.as_deref().map(sanitize),
    );
    user.id = Some(users.insert_one(user.clone()).await?);

    Ok(created(
        json!({ "user": doc_to_json(&user) }),
        "User created successfully",
    ))
}

async fn get_user(state: &Arc<AppState>, id: &str) -> Result<Response<BoxBody>> {
    let oid = parse_object_id(id)?;

    let user = state
        .mongo
        .collection::<UserDoc>(USER_COLLECTION)
        .await?
        .find_by_id(&oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("User not found".into()))?;

    Ok(ok_data(json!({ "user": doc_to_json(&user) })))
}

async fn update_user(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    id: &str,
) -> Result<Response<BoxBody>> {
    let oid = parse_object_id(id)?;
    let body: UpdateUserRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    let mut set_fields = doc! {};
    if let Some(first_name) = &body.first_name {
        set_fields.insert("firstName", sanitize(first_name));
    }
    if let Some(last_name) = &body.last_name {
        set_fields.insert("lastName", sanitize(last_name));
    }
    if let Some(role) = &body.role {
        Role::parse(role)?;
        set_fields.insert("role", role.as_str());
    }
    if let Some(assigned_farm) = &body.assigned_farm {
        match assigned_farm {
            Some(farm) => set_fields.insert("assignedFarm", sanitize(farm)),
            None => set_fields.insert("assignedFarm", bson::Bson::Null),
        };
    }
    if let Some(phone) = &body.phone {
        match phone {
            Some(p) => set_fields.insert("phone", sanitize(p)),
            None => set_fields.insert("phone", bson::Bson::Null),
        };
    }
    if let Some(is_active) = body.is_active {
        set_fields.insert("isActive", is_active);
    }

    if set_fields.is_empty() {
        return Err(FarmgateError::Validation("No fields to update".into()));
    }

    let users = state.mongo.collection::<UserDoc>(USER_COLLECTION).await?;
    let result = users.update_one(doc! { "_id": oid }, set_fields).await?;
    if result.matched_count == 0 {
        return Err(FarmgateError::NotFound("User not found".into()));
    }

    let user = users
        .find_by_id(&oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("User not found".into()))?;

    Ok(ok_with_message(
        json!({ "user": doc_to_json(&user) }),
        "User updated successfully",
    ))
}

async fn delete_user(state: &Arc<AppState>, id: &str) -> Result<Response<BoxBody>> {
    let oid = parse_object_id(id)?;

    services::deprovision_user(&state.mongo, &state.identity, &oid).await?;

    Ok(ok_message("User deleted successfully"))
}

async fn users_by_farm(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    location: &str,
) -> Result<Response<BoxBody>> {
    let params = query_params(&req);

    let mut filter = doc! { "assignedFarm": location };
    if let Some(role) = params.get("role") {
        Role::parse(role)?;
        filter.insert("role", role.as_str());
    }

    let users = state
        .mongo
        .collection::<UserDoc>(USER_COLLECTION)
        .await?
        .find_many(filter)
        .await?;

    Ok(ok_data(json!({ "users": docs_to_json(&users) })))
}
