//! Feed consumption and inventory routes
//!
//! GET    /api/feeds                     - paginated listing, or a day via ?date=
//! POST   /api/feeds
//! POST   /api/feeds/bulk                - one entry fanned out to N cows
//! GET    /api/feeds/stats
//! GET    /api/feeds/inventory           - admin only
//! POST   /api/feeds/inventory           - admin only
//! PUT    /api/feeds/inventory/:id       - admin only
//! PUT    /api/feeds/inventory/:id/restock - admin only
//! GET    /api/feeds/cow/:cowId
//! PUT    /api/feeds/:id
//! DELETE /api/feeds/:id

use bson::doc;
use futures_util::future::join_all;
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{AccessContext, Capability};
use crate::db::schemas::{
    CowDoc, FeedInventoryDoc, FeedRecordDoc, Metadata, COW_COLLECTION, FEED_INVENTORY_COLLECTION,
    FEED_RECORD_COLLECTION,
};
use crate::db::SortDirection;
use crate::routes::helpers::{
    created, doc_to_json, docs_to_json, error_response, ok_data, ok_message, ok_with_message,
    pagination_meta, parse_json_body, parse_object_id, query_params, require_date,
    resolve_access, sanitize, BoxBody,
};
use crate::server::AppState;
use crate::stats::dates::{period_range, today};
use crate::stats::engine::{breakdown_by_key, daily_totals, period_summary, round2};
use crate::types::{FarmgateError, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFeedRecordRequest {
    pub cow_id: String,
    pub feed_type: String,
    #[serde(default)]
    pub sub_type: Option<String>,
    pub quantity: f64,
    #[serde(default)]
    pub unit: Option<String>,
    pub date: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkFeedRequest {
    pub cow_ids: Vec<String>,
    pub feed_type: String,
    #[serde(default)]
    pub sub_type: Option<String>,
    pub quantity: f64,
    #[serde(default)]
    pub unit: Option<String>,
    pub date: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFeedRecordRequest {
    #[serde(default)]
    pub feed_type: Option<String>,
    #[serde(default)]
    pub sub_type: Option<String>,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInventoryRequest {
    pub farm_location: String,
    pub feed_type: String,
    #[serde(default)]
    pub sub_type: Option<String>,
    pub quantity: f64,
    #[serde(default)]
    pub unit: Option<String>,
    pub purchase_date: String,
    pub purchase_price: f64,
    #[serde(default)]
    pub transport_cost: Option<f64>,
    #[serde(default)]
    pub supplier: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInventoryRequest {
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub purchase_price: Option<f64>,
    #[serde(default)]
    pub transport_cost: Option<f64>,
    #[serde(default)]
    pub supplier: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub needs_restock: Option<bool>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Route /api/feeds/* requests
pub async fn handle_feed_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let dev_mode = state.args.dev_mode;
    dispatch(req, state).await.unwrap_or_else(|e| error_response(&e, dev_mode))
}

async fn dispatch(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let ctx = resolve_access(&state, &req).await?;

    let path = req.uri().path().trim_start_matches("/api/feeds").to_string();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let method = req.method().clone();

    match (method, segments.as_slice()) {
        (Method::GET, []) => {
            ctx.require(Capability::ViewFeedRecords)?;
            list_records(req, &state, &ctx).await
        }
        (Method::POST, []) => {
            ctx.require(Capability::AddFeedRecords)?;
            create_record(req, &state, &ctx).await
        }
        (Method::POST, ["bulk"]) => {
            ctx.require(Capability::AddFeedRecords)?;
            create_bulk(req, &state, &ctx).await
        }
        (Method::GET, ["stats"]) => {
            ctx.require(Capability::ViewStats)?;
            feed_stats(req, &state, &ctx).await
        }
        (Method::GET, ["inventory"]) => {
            ctx.require(Capability::ManageInventory)?;
            list_inventory(req, &state).await
        }
        (Method::POST, ["inventory"]) => {
            ctx.require(Capability::ManageInventory)?;
            create_inventory(req, &state, &ctx).await
        }
        (Method::PUT, ["inventory", id, "restock"]) => {
            ctx.require(Capability::ManageInventory)?;
            let id = id.to_string();
            mark_restock(&state, &id).await
        }
        (Method::PUT, ["inventory", id]) => {
            ctx.require(Capability::ManageInventory)?;
            let id = id.to_string();
            update_inventory(req, &state, &id).await
        }
        (Method::GET, ["cow", cow_id]) => {
            ctx.require(Capability::ViewFeedRecords)?;
            let cow_id = cow_id.to_string();
            records_by_cow(req, &state, &cow_id).await
        }
        (Method::PUT, [id]) => {
            ctx.require(Capability::EditFeedRecords)?;
            let id = id.to_string();
            update_record(req, &state, &id).await
        }
        (Method::DELETE, [id]) => {
            ctx.require(Capability::EditFeedRecords)?;
            let id = id.to_string();
            delete_record(&state, &id).await
        }
        _ => Err(FarmgateError::NotFound(format!(
            "Route not found: /api/feeds{}",
            path
        ))),
    }
}

async fn list_records(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    ctx: &AccessContext,
) -> Result<Response<BoxBody>> {
    let params = query_params(&req);

    let mut filter = doc! {};
    if let Some(farm) = ctx.farm_scope(params.get("farmLocation").map(|s| s.as_str())) {
        filter.insert("farmLocation", farm);
    }
    if let Some(cow_id) = params.get("cowId") {
        filter.insert("cowId", cow_id.as_str());
    }
    if let Some(feed_type) = params.get("feedType") {
        filter.insert("feedType", feed_type.as_str());
    }

    let records = state
        .mongo
        .collection::<FeedRecordDoc>(FEED_RECORD_COLLECTION)
        .await?;

    if let Some(date) = params.get("date") {
        let date = require_date(date, "date")?;
        let items = records
            .range_query("date", Some(&date), Some(&date), filter)
            .await?;
        return Ok(ok_data(json!({ "feedRecords": docs_to_json(&items) })));
    }

    let page: i64 = params.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let limit = state
        .args
        .clamp_page_size(params.get("limit").and_then(|l| l.parse().ok()));

    let page_result = records
        .paginate(filter, page, limit, "date", SortDirection::Descending)
        .await?;

    Ok(ok_data(json!({
        "feedRecords": docs_to_json(&page_result.items),
        "pagination": pagination_meta(page, limit, page_result.total_count),
    })))
}

fn feed_record_from(
    cow: &CowDoc,
    cow_hex: String,
    feed_type: &str,
    sub_type: Option<&str>,
    quantity: f64,
    unit: Option<&str>,
    date: String,
    notes: Option<&str>,
    recorded_by: &str,
    bulk_entry_id: Option<String>,
) -> FeedRecordDoc {
    FeedRecordDoc {
        id: None,
        metadata: Metadata::new(),
        cow_id: cow_hex,
        cow_name: cow.name.clone(),
        ear_tag_number: cow.ear_tag_number.clone(),
        farm_location: cow.farm_location.clone(),
        feed_type: sanitize(feed_type),
        sub_type: sub_type.map(sanitize),
        quantity,
        unit: unit.map(sanitize).unwrap_or_else(|| "kg".to_string()),
        date,
        notes: notes.map(sanitize),
        recorded_by: recorded_by.to_string(),
        bulk_entry_id,
    }
}

async fn create_record(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    ctx: &AccessContext,
) -> Result<Response<BoxBody>> {
    let body: CreateFeedRecordRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    if body.quantity <= 0.0 {
        return Err(FarmgateError::Validation("Quantity must be positive".into()));
    }
    let date = require_date(&body.date, "date")?;

    let cow_oid = parse_object_id(&body.cow_id)?;
    let cow = state
        .mongo
        .collection::<CowDoc>(COW_COLLECTION)
        .await?
        .find_by_id(&cow_oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Cow not found".into()))?;

    ctx.check_farm_access(&cow.farm_location)?;

    let mut record = feed_record_from(
        &cow,
        cow_oid.to_hex(),
        &body.feed_type,
        body.sub_type.as_deref(),
        body.quantity,
        body.unit.as_deref(),
        date,
        body.notes.as_deref(),
        &ctx.subject_id,
        None,
    );

    let records = state
        .mongo
        .collection::<FeedRecordDoc>(FEED_RECORD_COLLECTION)
        .await?;
    record.id = Some(records.insert_one(record.clone()).await?);

    Ok(created(
        json!({ "feedRecord": doc_to_json(&record) }),
        "Feed record created successfully",
    ))
}

async fn create_bulk(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    ctx: &AccessContext,
) -> Result<Response<BoxBody>> {
    let body: BulkFeedRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    if body.cow_ids.is_empty() {
        return Err(FarmgateError::Validation("Cow IDs array is required".into()));
    }
    if body.quantity <= 0.0 {
        return Err(FarmgateError::Validation("Quantity must be positive".into()));
    }
    let date = require_date(&body.date, "date")?;

    let cows_collection = state.mongo.collection::<CowDoc>(COW_COLLECTION).await?;

    // All cows must resolve before any record is written
    let mut cows = Vec::with_capacity(body.cow_ids.len());
    for cow_id in &body.cow_ids {
        let oid = parse_object_id(cow_id)?;
        let cow = cows_collection
            .find_by_id(&oid)
            .await?
            .ok_or_else(|| FarmgateError::Validation("Some cows were not found".into()))?;
        ctx.check_farm_access(&cow.farm_location)?;
        cows.push((oid, cow));
    }

    let bulk_entry_id = Uuid::new_v4().to_string();
    let records_collection = state
        .mongo
        .collection::<FeedRecordDoc>(FEED_RECORD_COLLECTION)
        .await?;

    // Fan-out, wait-all. Any failure fails the whole batch; partial writes
    // are reported as complete failure, not partial success.
    let inserts = cows.iter().map(|(oid, cow)| {
        let mut record = feed_record_from(
            cow,
            oid.to_hex(),
            &body.feed_type,
            body.sub_type.as_deref(),
            body.quantity,
            body.unit.as_deref(),
            date.clone(),
            body.notes.as_deref(),
            &ctx.subject_id,
            Some(bulk_entry_id.clone()),
        );
        let records_collection = records_collection.clone();
        async move {
            record.id = Some(records_collection.insert_one(record.clone()).await?);
            Ok::<FeedRecordDoc, FarmgateError>(record)
        }
    });

    let results = join_all(inserts).await;
    let mut records = Vec::with_capacity(results.len());
    for result in results {
        records.push(result?);
    }

    Ok(created(
        json!({ "feedRecords": docs_to_json(&records) }),
        &format!("{} feed records created successfully", records.len()),
    ))
}

async fn update_record(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    id: &str,
) -> Result<Response<BoxBody>> {
    let oid = parse_object_id(id)?;
    let body: UpdateFeedRecordRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    let mut set_fields = doc! {};
    if let Some(feed_type) = &body.feed_type {
        set_fields.insert("feedType", sanitize(feed_type));
    }
    if let Some(sub_type) = &body.sub_type {
        set_fields.insert("subType", sanitize(sub_type));
    }
    if let Some(quantity) = body.quantity {
        if quantity <= 0.0 {
            return Err(FarmgateError::Validation("Quantity must be positive".into()));
        }
        set_fields.insert("quantity", quantity);
    }
    if let Some(unit) = &body.unit {
        set_fields.insert("unit", sanitize(unit));
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
        .collection::<FeedRecordDoc>(FEED_RECORD_COLLECTION)
        .await?;

    let result = records.update_one(doc! { "_id": oid }, set_fields).await?;
    if result.matched_count == 0 {
        return Err(FarmgateError::NotFound("Feed record not found".into()));
    }

    let record = records
        .find_by_id(&oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Feed record not found".into()))?;

    Ok(ok_with_message(
        json!({ "feedRecord": doc_to_json(&record) }),
        "Feed record updated successfully",
    ))
}

async fn delete_record(state: &Arc<AppState>, id: &str) -> Result<Response<BoxBody>> {
    let oid = parse_object_id(id)?;

    let records = state
        .mongo
        .collection::<FeedRecordDoc>(FEED_RECORD_COLLECTION)
        .await?;

    records
        .find_by_id(&oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Feed record not found".into()))?;

    records.delete_one(doc! { "_id": oid }).await?;

    Ok(ok_message("Feed record deleted successfully"))
}

async fn records_by_cow(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    cow_id: &str,
) -> Result<Response<BoxBody>> {
    let params = query_params(&req);

    let mut filter = doc! { "cowId": cow_id };
    if let Some(feed_type) = params.get("feedType") {
        filter.insert("feedType", feed_type.as_str());
    }

    let mut items = state
        .mongo
        .collection::<FeedRecordDoc>(FEED_RECORD_COLLECTION)
        .await?
        .range_query(
            "date",
            params.get("startDate").map(|s| s.as_str()),
            params.get("endDate").map(|s| s.as_str()),
            filter,
        )
        .await?;

    items.sort_by(|a, b| b.date.cmp(&a.date));

    Ok(ok_data(json!({ "feedRecords": docs_to_json(&items) })))
}

async fn feed_stats(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    ctx: &AccessContext,
) -> Result<Response<BoxBody>> {
    let params = query_params(&req);

    let mut filter = doc! {};
    if let Some(farm) = ctx.farm_scope(params.get("farmLocation").map(|s| s.as_str())) {
        filter.insert("farmLocation", farm);
    }
    if let Some(feed_type) = params.get("feedType") {
        filter.insert("feedType", feed_type.as_str());
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
        .collection::<FeedRecordDoc>(FEED_RECORD_COLLECTION)
        .await?
        .range_query("date", Some(&range.start), Some(&range.end), filter)
        .await?;

    let total_quantity: f64 = records.iter().map(|r| r.quantity).sum();
    let daily = daily_totals(&records, |r| r.date.as_str(), |r| r.quantity);

    // Feed type and sub type combine into one breakdown key
    let feed_type_breakdown = breakdown_by_key(
        &records,
        |r| {
            Some(match &r.sub_type {
                Some(sub) => format!("{}_{}", r.feed_type, sub),
                None => r.feed_type.clone(),
            })
        },
        |r| r.quantity,
    );

    let cow_breakdown = breakdown_by_key(
        &records,
        |r| Some(format!("{} ({})", r.cow_name, r.cow_id)),
        |r| r.quantity,
    );

    let distinct_cows: std::collections::BTreeSet<&str> =
        records.iter().map(|r| r.cow_id.as_str()).collect();
    let average_per_cow = if distinct_cows.is_empty() {
        0.0
    } else {
        round2(total_quantity / distinct_cows.len() as f64)
    };

    Ok(ok_data(json!({ "stats": {
        "totalQuantity": total_quantity,
        "totalRecords": records.len(),
        "feedTypeBreakdown": feed_type_breakdown,
        "cowBreakdown": cow_breakdown,
        "dailyBreakdown": daily,
        "averagePerCow": average_per_cow,
        "totalCows": distinct_cows.len(),
        "periodSummary": period_summary(&daily),
    }})))
}

async fn list_inventory(req: Request<Incoming>, state: &Arc<AppState>) -> Result<Response<BoxBody>> {
    let params = query_params(&req);

    let mut filter = doc! {};
    if let Some(farm) = params.get("farmLocation") {
        filter.insert("farmLocation", farm.as_str());
    }

    let inventory = state
        .mongo
        .collection::<FeedInventoryDoc>(FEED_INVENTORY_COLLECTION)
        .await?
        .find_many(filter)
        .await?;

    Ok(ok_data(json!({ "inventory": docs_to_json(&inventory) })))
}

async fn create_inventory(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    ctx: &AccessContext,
) -> Result<Response<BoxBody>> {
    let body: CreateInventoryRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    if body.quantity <= 0.0 || body.purchase_price < 0.0 {
        return Err(FarmgateError::Validation(
            "Quantity and purchase price must be positive".into(),
        ));
    }
    let purchase_date = require_date(&body.purchase_date, "purchaseDate")?;

    let mut item = FeedInventoryDoc {
        id: None,
        metadata: Metadata::new(),
        farm_location: sanitize(&body.farm_location),
        feed_type: sanitize(&body.feed_type),
        sub_type: body.sub_type.as_deref().map(sanitize),
        quantity: body.quantity,
        unit: body
            .unit
            .as_deref()
            .map(sanitize)
            .unwrap_or_else(|| "kg".to_string()),
        purchase_date,
        purchase_price: body.purchase_price,
        transport_cost: body.transport_cost.unwrap_or(0.0),
        supplier: body.supplier.as_deref().map(sanitize),
        expiry_date: match &body.expiry_date {
            Some(d) => Some(require_date(d, "expiryDate")?),
            None => None,
        },
        notes: body.notes.as_deref().map(sanitize),
        current_stock: body.quantity,
        needs_restock: false,
        is_active: true,
        recorded_by: ctx.subject_id.clone(),
    };

    let inventory = state
        .mongo
        .collection::<FeedInventoryDoc>(FEED_INVENTORY_COLLECTION)
        .await?;
    item.id = Some(inventory.insert_one(item.clone()).await?);

    Ok(created(
        json!({ "inventory": doc_to_json(&item) }),
        "Feed inventory created successfully",
    ))
}

async fn update_inventory(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    id: &str,
) -> Result<Response<BoxBody>> {
    let oid = parse_object_id(id)?;
    let body: UpdateInventoryRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    let mut set_fields = doc! {};
    if let Some(quantity) = body.quantity {
        set_fields.insert("quantity", quantity);
        set_fields.insert("currentStock", quantity);
    }
    if let Some(purchase_price) = body.purchase_price {
        set_fields.insert("purchasePrice", purchase_price);
    }
    if let Some(transport_cost) = body.transport_cost {
        set_fields.insert("transportCost", transport_cost);
    }
    if let Some(supplier) = &body.supplier {
        set_fields.insert("supplier", sanitize(supplier));
    }
    if let Some(expiry_date) = &body.expiry_date {
        set_fields.insert("expiryDate", require_date(expiry_date, "expiryDate")?);
    }
    if let Some(notes) = &body.notes {
        set_fields.insert("notes", sanitize(notes));
    }
    if let Some(needs_restock) = body.needs_restock {
        set_fields.insert("needsRestock", needs_restock);
    }
    if let Some(is_active) = body.is_active {
        set_fields.insert("isActive", is_active);
    }

    if set_fields.is_empty() {
        return Err(FarmgateError::Validation("No fields to update".into()));
    }

    let inventory = state
        .mongo
        .collection::<FeedInventoryDoc>(FEED_INVENTORY_COLLECTION)
        .await?;

    let result = inventory.update_one(doc! { "_id": oid }, set_fields).await?;
    if result.matched_count == 0 {
        return Err(FarmgateError::NotFound("Feed inventory not found".into()));
    }

    let item = inventory
        .find_by_id(&oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Feed inventory not found".into()))?;

    Ok(ok_with_message(
        json!({ "inventory": doc_to_json(&item) }),
        "Feed inventory updated successfully",
    ))
}

async fn mark_restock(state: &Arc<AppState>, id: &str) -> Result<Response<BoxBody>> {
    let oid = parse_object_id(id)?;

    let inventory = state
        .mongo
        .collection::<FeedInventoryDoc>(FEED_INVENTORY_COLLECTION)
        .await?;

    let result = inventory
        .update_one(doc! { "_id": oid }, doc! { "needsRestock": true })
        .await?;
    if result.matched_count == 0 {
        return Err(FarmgateError::NotFound("Feed inventory not found".into()));
    }

    let item = inventory
        .find_by_id(&oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Feed inventory not found".into()))?;

    Ok(ok_with_message(
        json!({ "inventory": doc_to_json(&item) }),
        "Feed marked for restock successfully",
    ))
}
