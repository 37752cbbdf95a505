//! Poultry routes: batches, audited count changes, egg records, batch feed
//!
//! GET    /api/chicken/batches
//! POST   /api/chicken/batches
//! GET    /api/chicken/batches/:id          - with derived production info
//! PUT    /api/chicken/batches/:id
//! DELETE /api/chicken/batches/:id          - soft delete
//! PUT    /api/chicken/batches/:id/count    - audited increase/decrease
//! GET    /api/chicken/eggs
//! POST   /api/chicken/eggs                 - one record per batch/date
//! PUT    /api/chicken/eggs/:id
//! DELETE /api/chicken/eggs/:id
//! GET    /api/chicken/eggs/stats
//! GET    /api/chicken/feeds
//! POST   /api/chicken/feeds

use bson::doc;
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{AccessContext, Capability};
use crate::db::schemas::{
    ChickenBatchDoc, ChickenFeedRecordDoc, CountChangeDoc, EggRecordDoc, FeedConsumption,
    Metadata, ProductionStats, CHICKEN_BATCH_COLLECTION, CHICKEN_FEED_RECORD_COLLECTION,
    COUNT_CHANGE_COLLECTION, DEFAULT_BATCH_LIFESPAN_DAYS, DEFAULT_EGG_PRODUCTION_AGE_DAYS,
    EGG_RECORD_COLLECTION,
};
use crate::db::SortDirection;
use crate::routes::helpers::{
    created, doc_to_json, docs_to_json, error_response, ok_data, ok_message, ok_with_message,
    pagination_meta, parse_json_body, parse_object_id, query_params, require_date,
    resolve_access, sanitize, BoxBody,
};
use crate::server::AppState;
use crate::services;
use crate::stats::dates::{days_since, period_range, today};
use crate::stats::engine::{breakdown_by_key, daily_totals, period_summary, round2};
use crate::types::{FarmgateError, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBatchRequest {
    #[serde(default)]
    pub batch_id: Option<String>,
    pub initial_count: i64,
    pub date_acquired: String,
    pub farm_location: String,
    #[serde(default)]
    pub breed: Option<String>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub supplier: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub expected_egg_production_age: Option<i64>,
    #[serde(default)]
    pub expected_lifespan: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBatchRequest {
    #[serde(default)]
    pub batch_id: Option<String>,
    #[serde(default)]
    pub initial_count: Option<i64>,
    #[serde(default)]
    pub date_acquired: Option<String>,
    #[serde(default)]
    pub farm_location: Option<String>,
    #[serde(default)]
    pub breed: Option<String>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub supplier: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub expected_egg_production_age: Option<i64>,
    #[serde(default)]
    pub expected_lifespan: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountChangeRequest {
    /// "decrease" (deaths) or "increase" (hatched)
    pub operation: String,
    pub count: i64,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEggRecordRequest {
    pub batch_id: String,
    pub quantity: f64,
    pub date: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEggRecordRequest {
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChickenFeedRequest {
    pub batch_id: String,
    pub quantity: f64,
    #[serde(default)]
    pub feed_type: Option<String>,
    #[serde(default)]
    pub cost: Option<f64>,
    pub date: String,
    #[serde(default)]
    pub supplier: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Outcome of applying a count change to a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountChange {
    pub new_count: i64,
    pub deaths_delta: i64,
    pub hatched_delta: i64,
}

/// Apply an increase/decrease to the current count. Decreases floor at
/// zero; the recorded delta still carries the requested count so the audit
/// trail reflects what was reported.
pub fn apply_count_change(current: i64, operation: &str, count: i64) -> Result<CountChange> {
    if count <= 0 {
        return Err(FarmgateError::Validation("Count must be positive".into()));
    }

    match operation {
        "decrease" => Ok(CountChange {
            new_count: (current - count).max(0),
            deaths_delta: count,
            hatched_delta: 0,
        }),
        "increase" => Ok(CountChange {
            new_count: current + count,
            deaths_delta: 0,
            hatched_delta: count,
        }),
        _ => Err(FarmgateError::Validation(
            "Invalid operation. Must be \"decrease\" or \"increase\"".into(),
        )),
    }
}

fn generate_batch_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("CHICK_{}", suffix[..8].to_uppercase())
}

/// Route /api/chicken/* requests
pub async fn handle_chicken_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let dev_mode = state.args.dev_mode;
    dispatch(req, state).await.unwrap_or_else(|e| error_response(&e, dev_mode))
}

async fn dispatch(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let ctx = resolve_access(&state, &req).await?;

    let path = req
        .uri()
        .path()
        .trim_start_matches("/api/chicken")
        .to_string();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let method = req.method().clone();

    match (method, segments.as_slice()) {
        (Method::GET, ["batches"]) => {
            ctx.require(Capability::ViewChicken)?;
            list_batches(req, &state, &ctx).await
        }
        (Method::POST, ["batches"]) => {
            ctx.require(Capability::ManageChicken)?;
            create_batch(req, &state, &ctx).await
        }
        (Method::GET, ["batches", id]) => {
            ctx.require(Capability::ViewChicken)?;
            let id = id.to_string();
            get_batch(&state, &ctx, &id).await
        }
        (Method::PUT, ["batches", id, "count"]) => {
            ctx.require(Capability::ManageChicken)?;
            let id = id.to_string();
            update_count(req, &state, &ctx, &id).await
        }
        (Method::PUT, ["batches", id]) => {
            ctx.require(Capability::ManageChicken)?;
            let id = id.to_string();
            update_batch(req, &state, &id).await
        }
        (Method::DELETE, ["batches", id]) => {
            ctx.require(Capability::ManageChicken)?;
            let id = id.to_string();
            delete_batch(&state, &id).await
        }
        (Method::GET, ["eggs", "stats"]) => {
            ctx.require(Capability::ViewStats)?;
            egg_stats(req, &state, &ctx).await
        }
        (Method::GET, ["eggs"]) => {
            ctx.require(Capability::ViewChicken)?;
            list_eggs(req, &state, &ctx).await
        }
        (Method::POST, ["eggs"]) => {
            ctx.require(Capability::ViewChicken)?;
            create_egg(req, &state, &ctx).await
        }
        (Method::PUT, ["eggs", id]) => {
            ctx.require(Capability::ManageChicken)?;
            let id = id.to_string();
            update_egg(req, &state, &id).await
        }
        (Method::DELETE, ["eggs", id]) => {
            ctx.require(Capability::ManageChicken)?;
            let id = id.to_string();
            delete_egg(&state, &id).await
        }
        (Method::GET, ["feeds"]) => {
            ctx.require(Capability::ViewChicken)?;
            list_chicken_feeds(req, &state).await
        }
        (Method::POST, ["feeds"]) => {
            ctx.require(Capability::AddFeedRecords)?;
            create_chicken_feed(req, &state, &ctx).await
        }
        _ => Err(FarmgateError::NotFound(format!(
            "Route not found: /api/chicken{}",
            path
        ))),
    }
}

async fn list_batches(
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
    if let Some(farm) = ctx.farm_scope(params.get("farmLocation").map(|s| s.as_str())) {
        filter.insert("farmLocation", farm);
    }
    if let Some(is_active) = params.get("isActive") {
        filter.insert("isActive", is_active == "true");
    }

    let page_result = state
        .mongo
        .collection::<ChickenBatchDoc>(CHICKEN_BATCH_COLLECTION)
        .await?
        .paginate(filter, page, limit, "dateAcquired", SortDirection::Descending)
        .await?;

    Ok(ok_data(json!({
        "batches": docs_to_json(&page_result.items),
        "pagination": pagination_meta(page, limit, page_result.total_count),
    })))
}

async fn create_batch(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    ctx: &AccessContext,
) -> Result<Response<BoxBody>> {
    let body: CreateBatchRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    if body.initial_count <= 0 {
        return Err(FarmgateError::Validation(
            "Initial count must be positive".into(),
        ));
    }
    let date_acquired = require_date(&body.date_acquired, "dateAcquired")?;

    let batches = state
        .mongo
        .collection::<ChickenBatchDoc>(CHICKEN_BATCH_COLLECTION)
        .await?;

    let batch_id = match &body.batch_id {
        Some(id) if !id.is_empty() => sanitize(id),
        _ => generate_batch_id(),
    };

    if batches
        .find_one(doc! { "batchId": batch_id.as_str() })
        .await?
        .is_some()
    {
        return Err(FarmgateError::Conflict("Batch ID already exists".into()));
    }

    let mut batch = ChickenBatchDoc {
        id: None,
        metadata: Metadata::new(),
        batch_id,
        initial_count: body.initial_count,
        current_count: body.initial_count,
        date_acquired,
        farm_location: sanitize(&body.farm_location),
        breed: body.breed.as_deref().map(sanitize),
        cost: body.cost,
        supplier: body.supplier.as_deref().map(sanitize),
        description: body.description.as_deref().map(sanitize),
        expected_egg_production_age: body
            .expected_egg_production_age
            .unwrap_or(DEFAULT_EGG_PRODUCTION_AGE_DAYS),
        expected_lifespan: body.expected_lifespan.unwrap_or(DEFAULT_BATCH_LIFESPAN_DAYS),
        total_eggs_produced: 0.0,
        total_deaths: 0,
        total_hatched: 0,
        feed_consumption: FeedConsumption::default(),
        production_stats: ProductionStats::default(),
        is_active: true,
    };

    ctx.check_farm_access(&batch.farm_location)?;

    batch.id = Some(batches.insert_one(batch.clone()).await?);

    Ok(created(
        json!({ "batch": doc_to_json(&batch) }),
        "Chicken batch created successfully",
    ))
}

async fn get_batch(
    state: &Arc<AppState>,
    ctx: &AccessContext,
    id: &str,
) -> Result<Response<BoxBody>> {
    let oid = parse_object_id(id)?;

    let batch = state
        .mongo
        .collection::<ChickenBatchDoc>(CHICKEN_BATCH_COLLECTION)
        .await?
        .find_by_id(&oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Chicken batch not found".into()))?;

    ctx.check_farm_access(&batch.farm_location)?;

    let batch_hex = oid.to_hex();

    let (egg_records, feed_records) = tokio::try_join!(
        async {
            state
                .mongo
                .collection::<EggRecordDoc>(EGG_RECORD_COLLECTION)
                .await?
                .find_many(doc! { "batchId": batch_hex.as_str() })
                .await
        },
        async {
            state
                .mongo
                .collection::<ChickenFeedRecordDoc>(CHICKEN_FEED_RECORD_COLLECTION)
                .await?
                .find_many(doc! { "batchId": batch_hex.as_str() })
                .await
        },
    )?;

    let total_eggs: f64 = egg_records.iter().map(|r| r.quantity).sum();
    let days_active = days_since(&batch.date_acquired);

    let mut value = doc_to_json(&batch);
    if let Value::Object(map) = &mut value {
        map.insert("totalEggRecords".into(), json!(egg_records.len()));
        map.insert("totalFeedRecords".into(), json!(feed_records.len()));
        map.insert("totalEggsProduced".into(), json!(total_eggs));
        map.insert(
            "averageEggsPerDay".into(),
            json!(round2(total_eggs / days_active as f64)),
        );
        map.insert("daysActive".into(), json!(days_active));
    }

    Ok(ok_data(json!({ "batch": value })))
}

async fn update_batch(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    id: &str,
) -> Result<Response<BoxBody>> {
    let oid = parse_object_id(id)?;
    let body: UpdateBatchRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    // Totals and currentCount are owned by recomputes and the audited count
    // path; neither is client-writable here
    let mut set_fields = doc! {};
    if let Some(batch_id) = &body.batch_id {
        set_fields.insert("batchId", sanitize(batch_id));
    }
    if let Some(initial_count) = body.initial_count {
        set_fields.insert("initialCount", initial_count);
    }
    if let Some(date_acquired) = &body.date_acquired {
        set_fields.insert("dateAcquired", require_date(date_acquired, "dateAcquired")?);
    }
    if let Some(farm_location) = &body.farm_location {
        set_fields.insert("farmLocation", sanitize(farm_location));
    }
    if let Some(breed) = &body.breed {
        set_fields.insert("breed", sanitize(breed));
    }
    if let Some(cost) = body.cost {
        set_fields.insert("cost", cost);
    }
    if let Some(supplier) = &body.supplier {
        set_fields.insert("supplier", sanitize(supplier));
    }
    if let Some(description) = &body.description {
        set_fields.insert("description", sanitize(description));
    }
    if let Some(age) = body.expected_egg_production_age {
        set_fields.insert("expectedEggProductionAge", age);
    }
    if let Some(lifespan) = body.expected_lifespan {
        set_fields.insert("expectedLifespan", lifespan);
    }

    if set_fields.is_empty() {
        return Err(FarmgateError::Validation("No fields to update".into()));
    }

    let batches = state
        .mongo
        .collection::<ChickenBatchDoc>(CHICKEN_BATCH_COLLECTION)
        .await?;

    let result = batches.update_one(doc! { "_id": oid }, set_fields).await?;
    if result.matched_count == 0 {
        return Err(FarmgateError::NotFound("Chicken batch not found".into()));
    }

    let batch = batches
        .find_by_id(&oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Chicken batch not found".into()))?;

    Ok(ok_with_message(
        json!({ "batch": doc_to_json(&batch) }),
        "Chicken batch updated successfully",
    ))
}

async fn delete_batch(state: &Arc<AppState>, id: &str) -> Result<Response<BoxBody>> {
    let oid = parse_object_id(id)?;

    let batches = state
        .mongo
        .collection::<ChickenBatchDoc>(CHICKEN_BATCH_COLLECTION)
        .await?;

    batches
        .find_by_id(&oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Chicken batch not found".into()))?;

    batches
        .update_one(doc! { "_id": oid }, doc! { "isActive": false })
        .await?;

    Ok(ok_message("Chicken batch deleted successfully"))
}

async fn update_count(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    ctx: &AccessContext,
    id: &str,
) -> Result<Response<BoxBody>> {
    let oid = parse_object_id(id)?;
    let body: CountChangeRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    let batches = state
        .mongo
        .collection::<ChickenBatchDoc>(CHICKEN_BATCH_COLLECTION)
        .await?;

    let batch = batches
        .find_by_id(&oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Chicken batch not found".into()))?;

    let change = apply_count_change(batch.current_count, &body.operation, body.count)?;

    let date = match &body.date {
        Some(d) => require_date(d, "date")?,
        None => today().format("%Y-%m-%d").to_string(),
    };

    // Audit record first; the count mutation never happens without one
    let mut audit = CountChangeDoc {
        id: None,
        metadata: Metadata::new(),
        batch_ref: oid.to_hex(),
        operation: body.operation.clone(),
        count: body.count,
        reason: body.reason.as_deref().map(sanitize),
        date,
        notes: body.notes.as_deref().map(sanitize),
        previous_count: batch.current_count,
        new_count: change.new_count,
        recorded_by: ctx.subject_id.clone(),
    };

    let audits = state
        .mongo
        .collection::<CountChangeDoc>(COUNT_CHANGE_COLLECTION)
        .await?;
    audit.id = Some(audits.insert_one(audit.clone()).await?);

    let mut set_fields = doc! { "currentCount": change.new_count };
    if change.deaths_delta > 0 {
        set_fields.insert("totalDeaths", batch.total_deaths + change.deaths_delta);
    }
    if change.hatched_delta > 0 {
        set_fields.insert("totalHatched", batch.total_hatched + change.hatched_delta);
    }

    batches.update_one(doc! { "_id": oid }, set_fields).await?;

    let batch = batches
        .find_by_id(&oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Chicken batch not found".into()))?;

    Ok(ok_with_message(
        json!({
            "batch": doc_to_json(&batch),
            "change": doc_to_json(&audit),
        }),
        &format!("Chicken count {}d successfully", body.operation),
    ))
}

async fn list_eggs(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    ctx: &AccessContext,
) -> Result<Response<BoxBody>> {
    let params = query_params(&req);

    let mut filter = doc! {};
    if let Some(farm) = ctx.farm_scope(params.get("farmLocation").map(|s| s.as_str())) {
        filter.insert("farmLocation", farm);
    }
    if let Some(batch_id) = params.get("batchId") {
        filter.insert("batchId", batch_id.as_str());
    }

    let records = state
        .mongo
        .collection::<EggRecordDoc>(EGG_RECORD_COLLECTION)
        .await?;

    if let Some(date) = params.get("date") {
        let date = require_date(date, "date")?;
        let items = records
            .range_query("date", Some(&date), Some(&date), filter)
            .await?;
        return Ok(ok_data(json!({ "eggRecords": docs_to_json(&items) })));
    }

    let page: i64 = params.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let limit = state
        .args
        .clamp_page_size(params.get("limit").and_then(|l| l.parse().ok()));

    let page_result = records
        .paginate(filter, page, limit, "date", SortDirection::Descending)
        .await?;

    Ok(ok_data(json!({
        "eggRecords": docs_to_json(&page_result.items),
        "pagination": pagination_meta(page, limit, page_result.total_count),
    })))
}

async fn create_egg(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    ctx: &AccessContext,
) -> Result<Response<BoxBody>> {
    let body: CreateEggRecordRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    if body.quantity < 0.0 {
        return Err(FarmgateError::Validation(
            "Quantity must not be negative".into(),
        ));
    }
    let date = require_date(&body.date, "date")?;

    let batch_oid = parse_object_id(&body.batch_id)?;
    let batch = state
        .mongo
        .collection::<ChickenBatchDoc>(CHICKEN_BATCH_COLLECTION)
        .await?
        .find_by_id(&batch_oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Chicken batch not found".into()))?;

    ctx.check_farm_access(&batch.farm_location)?;

    let records = state
        .mongo
        .collection::<EggRecordDoc>(EGG_RECORD_COLLECTION)
        .await?;

    // One record per batch and date
    let existing = records
        .find_one(doc! { "batchId": batch_oid.to_hex(), "date": date.as_str() })
        .await?;
    if existing.is_some() {
        return Err(FarmgateError::Conflict(
            "Egg record already exists for this batch and date".into(),
        ));
    }

    let mut record = EggRecordDoc {
        id: None,
        metadata: Metadata::new(),
        batch_id: batch_oid.to_hex(),
        batch_name: batch.batch_id.clone(),
        farm_location: batch.farm_location.clone(),
        quantity: body.quantity,
        date,
        notes: body.notes.as_deref().map(sanitize),
        recorded_by: ctx.subject_id.clone(),
    };
    record.id = Some(records.insert_one(record.clone()).await?);

    services::update_batch_egg_stats(&state.mongo, &batch_oid).await;

    Ok(created(
        json!({ "eggRecord": doc_to_json(&record) }),
        "Egg record created successfully",
    ))
}

async fn update_egg(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    id: &str,
) -> Result<Response<BoxBody>> {
    let oid = parse_object_id(id)?;
    let body: UpdateEggRecordRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    let mut set_fields = doc! {};
    if let Some(quantity) = body.quantity {
        if quantity < 0.0 {
            return Err(FarmgateError::Validation(
                "Quantity must not be negative".into(),
            ));
        }
        set_fields.insert("quantity", quantity);
    }
    if let Some(date) = &body.date {
        set_fields.insert("date", require_date(date, "date")?);
    }
    if let Some(notes) = &body.notes {
        set_fields.insert("notes", sanitize(notes));
    }

    if set_fields.is_empty() {
        return Err(FarmgateError::Validation("No fields to update".into()));
    }

    let records = state
        .mongo
        .collection::<EggRecordDoc>(EGG_RECORD_COLLECTION)
        .await?;

    let result = records.update_one(doc! { "_id": oid }, set_fields).await?;
    if result.matched_count == 0 {
        return Err(FarmgateError::NotFound("Egg record not found".into()));
    }

    let record = records
        .find_by_id(&oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Egg record not found".into()))?;

    if let Ok(batch_oid) = parse_object_id(&record.batch_id) {
        services::update_batch_egg_stats(&state.mongo, &batch_oid).await;
    }

    Ok(ok_with_message(
        json!({ "eggRecord": doc_to_json(&record) }),
        "Egg record updated successfully",
    ))
}

async fn delete_egg(state: &Arc<AppState>, id: &str) -> Result<Response<BoxBody>> {
    let oid = parse_object_id(id)?;

    let records = state
        .mongo
        .collection::<EggRecordDoc>(EGG_RECORD_COLLECTION)
        .await?;

    let record = records
        .find_by_id(&oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Egg record not found".into()))?;

    records.delete_one(doc! { "_id": oid }).await?;

    if let Ok(batch_oid) = parse_object_id(&record.batch_id) {
        services::update_batch_egg_stats(&state.mongo, &batch_oid).await;
    }

    Ok(ok_message("Egg record deleted successfully"))
}

async fn egg_stats(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    ctx: &AccessContext,
) -> Result<Response<BoxBody>> {
    let params = query_params(&req);

    let mut filter = doc! {};
    if let Some(farm) = ctx.farm_scope(params.get("farmLocation").map(|s| s.as_str())) {
        filter.insert("farmLocation", farm);
    }
    if let Some(batch_id) = params.get("batchId") {
        filter.insert("batchId", batch_id.as_str());
    }

    let range = match (params.get("startDate"), params.get("endDate")) {
        (Some(start), Some(end)) => crate::stats::DateRange {
            start: require_date(start, "startDate")?,
            end: require_date(end, "endDate")?,
        },
        _ => period_range(params.get("period").map(|s| s.as_str()).unwrap_or("daily"), today()),
    };

    let records = state
        .mongo
        .collection::<EggRecordDoc>(EGG_RECORD_COLLECTION)
        .await?
        .range_query("date", Some(&range.start), Some(&range.end), filter)
        .await?;

    Ok(ok_data(json!({ "stats": build_egg_stats(&records) })))
}

/// Egg stats payload: totals, daily and batch breakdowns, period summary
pub fn build_egg_stats(records: &[EggRecordDoc]) -> Value {
    let total_quantity: f64 = records.iter().map(|r| r.quantity).sum();
    let daily = daily_totals(records, |r| r.date.as_str(), |r| r.quantity);

    let batch_breakdown = breakdown_by_key(
        records,
        |r| Some(format!("{} ({})", r.batch_name, r.batch_id)),
        |r| r.quantity,
    );

    let average_per_record = if records.is_empty() {
        0.0
    } else {
        round2(total_quantity / records.len() as f64)
    };

    json!({
        "totalQuantity": total_quantity,
        "totalRecords": records.len(),
        "averagePerRecord": average_per_record,
        "dailyBreakdown": daily,
        "batchBreakdown": batch_breakdown,
        "periodSummary": period_summary(&daily),
    })
}

async fn list_chicken_feeds(
    req: Request<Incoming>,
    state: &Arc<AppState>,
) -> Result<Response<BoxBody>> {
    let params = query_params(&req);

    let batch_id = params
        .get("batchId")
        .ok_or_else(|| FarmgateError::Validation("Batch ID is required".into()))?;

    let mut items = state
        .mongo
        .collection::<ChickenFeedRecordDoc>(CHICKEN_FEED_RECORD_COLLECTION)
        .await?
        .range_query(
            "date",
            params.get("startDate").map(|s| s.as_str()),
            params.get("endDate").map(|s| s.as_str()),
            doc! { "batchId": batch_id.as_str() },
        )
        .await?;

    items.sort_by(|a, b| b.date.cmp(&a.date));

    Ok(ok_data(json!({ "feedRecords": docs_to_json(&items) })))
}

async fn create_chicken_feed(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    ctx: &AccessContext,
) -> Result<Response<BoxBody>> {
    let body: CreateChickenFeedRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    if body.quantity <= 0.0 {
        return Err(FarmgateError::Validation("Quantity must be positive".into()));
    }
    let date = require_date(&body.date, "date")?;

    let batch_oid = parse_object_id(&body.batch_id)?;
    let batch = state
        .mongo
        .collection::<ChickenBatchDoc>(CHICKEN_BATCH_COLLECTION)
        .await?
        .find_by_id(&batch_oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Chicken batch not found".into()))?;

    ctx.check_farm_access(&batch.farm_location)?;

    let mut record = ChickenFeedRecordDoc {
        id: None,
        metadata: Metadata::new(),
        batch_id: batch_oid.to_hex(),
        batch_name: batch.batch_id.clone(),
        farm_location: batch.farm_location.clone(),
        feed_type: body
            .feed_type
            .as_deref()
            .map(sanitize)
            .unwrap_or_else(|| "chicken_feed".to_string()),
        quantity: body.quantity,
        cost: body.cost,
        date,
        supplier: body.supplier.as_deref().map(sanitize),
        notes: body.notes.as_deref().map(sanitize),
        recorded_by: ctx.subject_id.clone(),
    };

    let records = state
        .mongo
        .collection::<ChickenFeedRecordDoc>(CHICKEN_FEED_RECORD_COLLECTION)
        .await?;
    record.id = Some(records.insert_one(record.clone()).await?);

    services::update_batch_feed_stats(&state.mongo, &batch_oid).await;

    Ok(created(
        json!({ "feedRecord": doc_to_json(&record) }),
        "Chicken feed record created successfully",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decrease_records_deaths() {
        // The audit scenario: 100 birds, decrease 5
        let change = apply_count_change(100, "decrease", 5).unwrap();
        assert_eq!(change.new_count, 95);
        assert_eq!(change.deaths_delta, 5);
        assert_eq!(change.hatched_delta, 0);
    }

    #[test]
    fn test_increase_records_hatched() {
        let change = apply_count_change(95, "increase", 10).unwrap();
        assert_eq!(change.new_count, 105);
        assert_eq!(change.hatched_delta, 10);
        assert_eq!(change.deaths_delta, 0);
    }

    #[test]
    fn test_decrease_floors_at_zero() {
        let change = apply_count_change(3, "decrease", 10).unwrap();
        assert_eq!(change.new_count, 0);
        // The audit delta still carries the reported count
        assert_eq!(change.deaths_delta, 10);
    }

    #[test]
    fn test_invalid_operation_rejected() {
        assert!(apply_count_change(100, "reset", 5).is_err());
        assert!(apply_count_change(100, "decrease", 0).is_err());
        assert!(apply_count_change(100, "increase", -5).is_err());
    }
}
