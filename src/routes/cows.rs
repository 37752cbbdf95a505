//! Cattle routes
//!
//! GET    /api/cows                    - paginated listing (farm/breed/stage)
//! POST   /api/cows
//! GET    /api/cows/:id                - with derived age, record counts, calves
//! PUT    /api/cows/:id
//! DELETE /api/cows/:id                - soft delete (isActive = false)
//! PUT    /api/cows/:id/pregnancy
//! GET    /api/cows/farm/:location

use bson::doc;
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::{AccessContext, Capability};
use crate::db::schemas::{
    CowDoc, FeedRecordDoc, HealthRecordDoc, Metadata, MilkRecordDoc, COW_COLLECTION,
    FEED_RECORD_COLLECTION, HEALTH_RECORD_COLLECTION, MILK_RECORD_COLLECTION,
};
use crate::db::SortDirection;
use crate::routes::helpers::{
    created, doc_to_json, error_response, ok_data, ok_message, ok_with_message,
    pagination_meta, parse_json_body, parse_object_id, query_params, require_date,
    resolve_access, sanitize, BoxBody,
};
use crate::server::AppState;
use crate::stats::dates::{age_in_years, days_since};
use crate::types::{FarmgateError, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCowRequest {
    pub name: String,
    pub breed: String,
    pub date_of_birth: String,
    pub farm_location: String,
    #[serde(default)]
    pub mother_id: Option<String>,
    #[serde(default)]
    pub father_id: Option<String>,
    #[serde(default)]
    pub ear_tag_number: Option<String>,
    #[serde(default)]
    pub current_stage: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub purchase_date: Option<String>,
    #[serde(default)]
    pub purchase_price: Option<f64>,
    #[serde(default)]
    pub vendor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCowRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub breed: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub farm_location: Option<String>,
    #[serde(default)]
    pub ear_tag_number: Option<String>,
    #[serde(default)]
    pub current_stage: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub purchase_date: Option<String>,
    #[serde(default)]
    pub purchase_price: Option<f64>,
    #[serde(default)]
    pub vendor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PregnancyRequest {
    pub is_pregnant: bool,
    #[serde(default)]
    pub date_of_ai: Option<String>,
    #[serde(default)]
    pub expected_calving_date: Option<String>,
    #[serde(default)]
    pub actual_calving_date: Option<String>,
}

/// Cow JSON with derived age fields appended
fn cow_json(cow: &CowDoc) -> Value {
    let mut value = doc_to_json(cow);
    if let Value::Object(map) = &mut value {
        map.insert("age".into(), json!(age_in_years(&cow.date_of_birth)));
        map.insert("ageInDays".into(), json!(days_since(&cow.date_of_birth)));
    }
    value
}

/// Route /api/cows/* requests
pub async fn handle_cow_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let dev_mode = state.args.dev_mode;
    dispatch(req, state).await.unwrap_or_else(|e| error_response(&e, dev_mode))
}

async fn dispatch(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let ctx = resolve_access(&state, &req).await?;

    let path = req.uri().path().trim_start_matches("/api/cows").to_string();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let method = req.method().clone();

    match (method, segments.as_slice()) {
        (Method::GET, []) => {
            ctx.require(Capability::ViewCows)?;
            list_cows(req, &state, &ctx).await
        }
        (Method::POST, []) => {
            ctx.require(Capability::ManageCows)?;
            create_cow(req, &state, &ctx).await
        }
        (Method::GET, ["farm", location]) => {
            ctx.require(Capability::ViewCows)?;
            let location = location.to_string();
            cows_by_farm(req, &state, &ctx, &location).await
        }
        (Method::GET, [id]) => {
            ctx.require(Capability::ViewCows)?;
            let id = id.to_string();
            get_cow(&state, &ctx, &id).await
        }
        (Method::PUT, [id, "pregnancy"]) => {
            ctx.require(Capability::ManageCows)?;
            let id = id.to_string();
            update_pregnancy(req, &state, &id).await
        }
        (Method::PUT, [id]) => {
            ctx.require(Capability::ManageCows)?;
            let id = id.to_string();
            update_cow(req, &state, &id).await
        }
        (Method::DELETE, [id]) => {
            ctx.require(Capability::ManageCows)?;
            let id = id.to_string();
            delete_cow(&state, &id).await
        }
        _ => Err(FarmgateError::NotFound(format!(
            "Route not found: /api/cows{}",
            path
        ))),
    }
}

async fn list_cows(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    ctx: &AccessContext,
) -> Result<Response<BoxBody>> {
    let params = query_params(&req);
    let page: i64 = params.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let limit = state
        .args
        .clamp_page_size(params.get("limit").and_then(|l| l.parse().ok()));

    let mut filter = doc! {};
    if let Some(farm) = ctx.farm_scope(params.get("farm").map(|s| s.as_str())) {
        filter.insert("farmLocation", farm);
    }
    if let Some(breed) = params.get("breed") {
        filter.insert("breed", breed.as_str());
    }
    if let Some(stage) = params.get("stage") {
        filter.insert("currentStage", stage.as_str());
    }

    let page_result = state
        .mongo
        .collection::<CowDoc>(COW_COLLECTION)
        .await?
        .paginate(filter, page, limit, "metadata.created_at", SortDirection::Descending)
        .await?;

    let cows: Vec<Value> = page_result.items.iter().map(cow_json).collect();

    Ok(ok_data(json!({
        "cows": cows,
        "pagination": pagination_meta(page, limit, page_result.total_count),
    })))
}

async fn create_cow(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    ctx: &AccessContext,
) -> Result<Response<BoxBody>> {
    let body: CreateCowRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    if body.name.is_empty() || body.breed.is_empty() || body.farm_location.is_empty() {
        return Err(FarmgateError::Validation(
            "Missing required fields: name, breed, farmLocation".into(),
        ));
    }
    let date_of_birth = require_date(&body.date_of_birth, "dateOfBirth")?;

    let cows = state.mongo.collection::<CowDoc>(COW_COLLECTION).await?;

    // Verify the dam exists when given; the backlink itself is derived by
    // querying motherId, so nothing is written to the mother
    if let Some(mother_id) = &body.mother_id {
        let mother_oid = parse_object_id(mother_id)?;
        if cows.find_by_id(&mother_oid).await?.is_none() {
            return Err(FarmgateError::Validation("Mother cow not found".into()));
        }
    }

    let mut cow = CowDoc {
        id: None,
        metadata: Metadata::new(),
        name: sanitize(&body.name),
        breed: sanitize(&body.breed),
        date_of_birth,
        farm_location: sanitize(&body.farm_location),
        mother_id: body.mother_id.as_deref().map(sanitize),
        father_id: body.father_id.as_deref().map(sanitize),
        ear_tag_number: body.ear_tag_number.as_deref().map(sanitize),
        current_stage: body
            .current_stage
            .as_deref()
            .map(sanitize)
            .unwrap_or_else(|| "active".to_string()),
        description: body.description.as_deref().map(sanitize),
        image_url: body.image_url.as_deref().map(sanitize),
        purchase_date: match &body.purchase_date {
            Some(d) => Some(require_date(d, "purchaseDate")?),
            None => None,
        },
        purchase_price: body.purchase_price,
        vendor: body.vendor.as_deref().map(sanitize),
        pregnancy_status: Default::default(),
        health_status: Default::default(),
        total_milk_produced: 0.0,
        average_daily_milk: 0.0,
        last_milking_date: None,
        is_active: true,
    };

    ctx.check_farm_access(&cow.farm_location)?;

    cow.id = Some(cows.insert_one(cow.clone()).await?);

    Ok(created(
        json!({ "cow": cow_json(&cow) }),
        "Cow created successfully",
    ))
}

async fn get_cow(
    state: &Arc<AppState>,
    ctx: &AccessContext,
    id: &str,
) -> Result<Response<BoxBody>> {
    let oid = parse_object_id(id)?;

    let cow = state
        .mongo
        .collection::<CowDoc>(COW_COLLECTION)
        .await?
        .find_by_id(&oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Cow not found".into()))?;

    ctx.check_farm_access(&cow.farm_location)?;

    let cow_hex = oid.to_hex();

    // Independent lookups resolved concurrently; relations are id references,
    // never joins
    let (milk_records, feed_records, health_records, calves) = tokio::try_join!(
        async {
            state
                .mongo
                .collection::<MilkRecordDoc>(MILK_RECORD_COLLECTION)
                .await?
                .find_many(doc! { "cowId": cow_hex.as_str() })
                .await
        },
        async {
            state
                .mongo
                .collection::<FeedRecordDoc>(FEED_RECORD_COLLECTION)
                .await?
                .find_many(doc! { "cowId": cow_hex.as_str() })
                .await
        },
        async {
            state
                .mongo
                .collection::<HealthRecordDoc>(HEALTH_RECORD_COLLECTION)
                .await?
                .find_many(doc! { "cowId": cow_hex.as_str() })
                .await
        },
        async {
            state
                .mongo
                .collection::<CowDoc>(COW_COLLECTION)
                .await?
                .find_many(doc! { "motherId": cow_hex.as_str() })
                .await
        },
    )?;

    let mut value = cow_json(&cow);
    if let Value::Object(map) = &mut value {
        map.insert("totalMilkRecords".into(), json!(milk_records.len()));
        map.insert("totalFeedRecords".into(), json!(feed_records.len()));
        map.insert("totalHealthRecords".into(), json!(health_records.len()));
        map.insert("totalCalves".into(), json!(calves.len()));
        map.insert(
            "calves".into(),
            Value::Array(calves.iter().map(cow_json).collect()),
        );
    }

    Ok(ok_data(json!({ "cow": value })))
}

async fn update_cow(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    id: &str,
) -> Result<Response<BoxBody>> {
    let oid = parse_object_id(id)?;
    let body: UpdateCowRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    // Running totals are recompute-owned and not client-writable
    let mut set_fields = doc! {};
    if let Some(name) = &body.name {
        set_fields.insert("name", sanitize(name));
    }
    if let Some(breed) = &body.breed {
        set_fields.insert("breed", sanitize(breed));
    }
    if let Some(date_of_birth) = &body.date_of_birth {
        set_fields.insert("dateOfBirth", require_date(date_of_birth, "dateOfBirth")?);
    }
    if let Some(farm_location) = &body.farm_location {
        set_fields.insert("farmLocation", sanitize(farm_location));
    }
    if let Some(ear_tag_number) = &body.ear_tag_number {
        set_fields.insert("earTagNumber", sanitize(ear_tag_number));
    }
    if let Some(current_stage) = &body.current_stage {
        set_fields.insert("currentStage", sanitize(current_stage));
    }
    if let Some(description) = &body.description {
        set_fields.insert("description", sanitize(description));
    }
    if let Some(image_url) = &body.image_url {
        set_fields.insert("imageUrl", sanitize(image_url));
    }
    if let Some(purchase_date) = &body.purchase_date {
        set_fields.insert("purchaseDate", require_date(purchase_date, "purchaseDate")?);
    }
    if let Some(purchase_price) = body.purchase_price {
        set_fields.insert("purchasePrice", purchase_price);
    }
    if let Some(vendor) = &body.vendor {
        set_fields.insert("vendor", sanitize(vendor));
    }

    if set_fields.is_empty() {
        return Err(FarmgateError::Validation("No fields to update".into()));
    }

    let cows = state.mongo.collection::<CowDoc>(COW_COLLECTION).await?;
    let result = cows.update_one(doc! { "_id": oid }, set_fields).await?;
    if result.matched_count == 0 {
        return Err(FarmgateError::NotFound("Cow not found".into()));
    }

    let cow = cows
        .find_by_id(&oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Cow not found".into()))?;

    Ok(ok_with_message(
        json!({ "cow": cow_json(&cow) }),
        "Cow updated successfully",
    ))
}

async fn delete_cow(state: &Arc<AppState>, id: &str) -> Result<Response<BoxBody>> {
    let oid = parse_object_id(id)?;

    let cows = state.mongo.collection::<CowDoc>(COW_COLLECTION).await?;
    cows.find_by_id(&oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Cow not found".into()))?;

    // Soft delete preserves production history
    cows.update_one(doc! { "_id": oid }, doc! { "isActive": false })
        .await?;

    Ok(ok_message("Cow deleted successfully"))
}

async fn update_pregnancy(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    id: &str,
) -> Result<Response<BoxBody>> {
    let oid = parse_object_id(id)?;
    let body: PregnancyRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    let mut pregnancy = doc! { "isPregnant": body.is_pregnant };
    pregnancy.insert(
        "dateOfAi",
        match &body.date_of_ai {
            Some(d) => bson::Bson::String(require_date(d, "dateOfAI")?),
            None => bson::Bson::Null,
        },
    );
    pregnancy.insert(
        "expectedCalvingDate",
        match &body.expected_calving_date {
            Some(d) => bson::Bson::String(require_date(d, "expectedCalvingDate")?),
            None => bson::Bson::Null,
        },
    );
    pregnancy.insert(
        "actualCalvingDate",
        match &body.actual_calving_date {
            Some(d) => bson::Bson::String(require_date(d, "actualCalvingDate")?),
            None => bson::Bson::Null,
        },
    );

    let cows = state.mongo.collection::<CowDoc>(COW_COLLECTION).await?;
    let result = cows
        .update_one(doc! { "_id": oid }, doc! { "pregnancyStatus": pregnancy })
        .await?;
    if result.matched_count == 0 {
        return Err(FarmgateError::NotFound("Cow not found".into()));
    }

    let cow = cows
        .find_by_id(&oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Cow not found".into()))?;

    Ok(ok_with_message(
        json!({ "cow": cow_json(&cow) }),
        "Pregnancy status updated successfully",
    ))
}

async fn cows_by_farm(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    ctx: &AccessContext,
    location: &str,
) -> Result<Response<BoxBody>> {
    ctx.check_farm_access(location)?;

    let params = query_params(&req);

    let mut filter = doc! { "farmLocation": location, "isActive": true };
    if let Some(stage) = params.get("stage") {
        filter.insert("currentStage", stage.as_str());
    }
    if let Some(breed) = params.get("breed") {
        filter.insert("breed", breed.as_str());
    }

    let cows = state
        .mongo
        .collection::<CowDoc>(COW_COLLECTION)
        .await?
        .find_many(filter)
        .await?;

    let cows: Vec<Value> = cows.iter().map(cow_json).collect();

    Ok(ok_data(json!({ "cows": cows })))
}
