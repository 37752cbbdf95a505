//! Shared route plumbing
//!
//! Response envelope, JSON body parsing, query-string handling, pagination
//! metadata, and per-request access resolution. Every handler goes through
//! these helpers so the envelope and status mapping stay uniform.

use bson::oid::ObjectId;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::auth::{extract_token_from_header, AccessContext};
use crate::db::schemas::{UserDoc, USER_COLLECTION};
use crate::server::AppState;
use crate::types::{FarmgateError, Result};

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .body(full_body(json))
        .unwrap()
}

pub fn cors_preflight() -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, DELETE, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .header("Access-Control-Max-Age", "86400")
        .body(empty_body())
        .unwrap()
}

/// 200 with `{success: true, data}`
pub fn ok_data(data: Value) -> Response<BoxBody> {
    json_response(StatusCode::OK, &json!({ "success": true, "data": data }))
}

/// 200 with data and a human message
pub fn ok_with_message(data: Value, message: &str) -> Response<BoxBody> {
    json_response(
        StatusCode::OK,
        &json!({ "success": true, "data": data, "message": message }),
    )
}

/// 200 with a message only
pub fn ok_message(message: &str) -> Response<BoxBody> {
    json_response(
        StatusCode::OK,
        &json!({ "success": true, "message": message }),
    )
}

/// 201 with data and a message
pub fn created(data: Value, message: &str) -> Response<BoxBody> {
    json_response(
        StatusCode::CREATED,
        &json!({ "success": true, "data": data, "message": message }),
    )
}

/// Error envelope with the taxonomy's status mapping
pub fn error_response(err: &FarmgateError, dev_mode: bool) -> Response<BoxBody> {
    json_response(
        err.status_code(),
        &json!({ "success": false, "error": err.client_message(dev_mode) }),
    )
}

pub fn not_found_response(path: &str) -> Response<BoxBody> {
    json_response(
        StatusCode::NOT_FOUND,
        &json!({ "success": false, "error": format!("Route not found: {}", path) }),
    )
}

/// Parse a JSON request body with a size cap
pub async fn parse_json_body<T: for<'de> Deserialize<'de>>(
    req: Request<Incoming>,
    max_bytes: usize,
) -> Result<T> {
    let body = req
        .collect()
        .await
        .map_err(|e| FarmgateError::Http(format!("Failed to read body: {}", e)))?;

    let bytes = body.to_bytes();
    if bytes.len() > max_bytes {
        return Err(FarmgateError::Http("Request body too large".into()));
    }

    serde_json::from_slice(&bytes)
        .map_err(|e| FarmgateError::Validation(format!("Invalid JSON body: {}", e)))
}

/// Decode the query string into a map. Later duplicates win.
pub fn query_params(req: &Request<Incoming>) -> HashMap<String, String> {
    let mut params = HashMap::new();

    if let Some(query) = req.uri().query() {
        for pair in query.split('&') {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next().unwrap_or("");
            let value = parts.next().unwrap_or("");
            if key.is_empty() {
                continue;
            }
            let key = urlencoding::decode(key).map(|c| c.into_owned()).unwrap_or_default();
            let value = urlencoding::decode(value)
                .map(|c| c.into_owned())
                .unwrap_or_default();
            params.insert(key, value);
        }
    }

    params
}

/// Parse a path segment as an object id
pub fn parse_object_id(segment: &str) -> Result<ObjectId> {
    ObjectId::parse_str(segment)
        .map_err(|_| FarmgateError::Validation(format!("Invalid id: {}", segment)))
}

/// Strip angle brackets, the one sanitization the wire format applies
pub fn sanitize(input: &str) -> String {
    input.trim().replace(['<', '>'], "")
}

/// Offset-pagination metadata included alongside paginated listings
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub current_page: i64,
    pub total_pages: i64,
    pub total_items: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

pub fn pagination_meta(page: i64, page_size: i64, total_items: u64) -> PaginationMeta {
    let total_pages = if page_size > 0 {
        (total_items as i64 + page_size - 1) / page_size
    } else {
        0
    };

    PaginationMeta {
        current_page: page,
        total_pages,
        total_items,
        has_next: page * page_size < total_items as i64,
        has_prev: page > 1,
    }
}

/// Serialize a document for the wire: `_id` becomes a hex `id`, metadata
/// timestamps surface as RFC3339 `createdAt`/`updatedAt`.
pub fn doc_to_json<T: Serialize>(doc: &T) -> Value {
    let mut value = serde_json::to_value(doc).unwrap_or(Value::Null);

    if let Value::Object(map) = &mut value {
        if let Some(id) = map.remove("_id") {
            if let Some(hex) = id.get("$oid").and_then(|v| v.as_str()) {
                map.insert("id".to_string(), Value::String(hex.to_string()));
            }
        }

        if let Some(metadata) = map.remove("metadata") {
            if let Some(created) = extract_datetime(&metadata, "created_at") {
                map.insert("createdAt".to_string(), Value::String(created));
            }
            if let Some(updated) = extract_datetime(&metadata, "updated_at") {
                map.insert("updatedAt".to_string(), Value::String(updated));
            }
        }
    }

    value
}

pub fn docs_to_json<T: Serialize>(docs: &[T]) -> Vec<Value> {
    docs.iter().map(doc_to_json).collect()
}

fn extract_datetime(metadata: &Value, field: &str) -> Option<String> {
    let millis = metadata
        .get(field)?
        .get("$date")?
        .get("$numberLong")?
        .as_str()?
        .parse::<i64>()
        .ok()?;

    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(millis).map(|dt| dt.to_rfc3339())
}

/// Validate an ISO YYYY-MM-DD date string
pub fn require_date(value: &str, field: &str) -> Result<String> {
    chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|_| value.to_string())
        .map_err(|_| {
            FarmgateError::Validation(format!("{} must be an ISO date (YYYY-MM-DD)", field))
        })
}

/// Resolve the caller's access context from the bearer token.
///
/// The identity provider verifies the token; the matching user profile
/// supplies role and farm. A verified token with no profile is an
/// authorization failure (`NotFound`), not an authentication failure.
pub async fn resolve_access(
    state: &Arc<AppState>,
    req: &Request<Incoming>,
) -> Result<AccessContext> {
    let header = req
        .headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let token = extract_token_from_header(header)
        .ok_or_else(|| FarmgateError::Unauthenticated("Missing bearer token".into()))?;

    let subject_id = state.identity.verify(token).await?;

    let user = state
        .mongo
        .collection::<UserDoc>(USER_COLLECTION)
        .await?
        .find_one(bson::doc! { "subjectId": subject_id.as_str() })
        .await?
        .ok_or_else(|| FarmgateError::NotFound("User profile not found".into()))?;

    if !user.is_active {
        return Err(FarmgateError::Forbidden("Account is disabled".into()));
    }

    Ok(AccessContext {
        subject_id,
        email: user.email,
        role: user.role,
        assigned_farm: user.assigned_farm,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_meta() {
        let meta = pagination_meta(2, 10, 35);
        assert_eq!(meta.current_page, 2);
        assert_eq!(meta.total_pages, 4);
        assert_eq!(meta.total_items, 35);
        assert!(meta.has_next);
        assert!(meta.has_prev);

        let first = pagination_meta(1, 10, 5);
        assert_eq!(first.total_pages, 1);
        assert!(!first.has_next);
        assert!(!first.has_prev);

        let empty = pagination_meta(1, 10, 0);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next);
    }

    #[test]
    fn test_sanitize_strips_angle_brackets() {
        assert_eq!(sanitize("  Wanjiru  "), "Wanjiru");
        assert_eq!(sanitize("<script>x</script>"), "scriptx/script");
    }

    #[test]
    fn test_require_date() {
        assert!(require_date("2024-02-29", "date").is_ok());
        assert!(require_date("2024-13-01", "date").is_err());
        assert!(require_date("yesterday", "date").is_err());
    }

    #[test]
    fn test_doc_to_json_lifts_id() {
        #[derive(Serialize)]
        struct Sample {
            #[serde(rename = "_id")]
            id: Option<bson::oid::ObjectId>,
            name: String,
        }

        let oid = bson::oid::ObjectId::new();
        let value = doc_to_json(&Sample {
            id: Some(oid),
            name: "Wanjiru".into(),
        });

        assert_eq!(value["id"], Value::String(oid.to_hex()));
        assert!(value.get("_id").is_none());
        assert_eq!(value["name"], "Wanjiru");
    }
}
