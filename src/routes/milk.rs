//! Milk production and sales routes
//!
//! GET    /api/milk              - paginated listing, or a single day via ?date=
//! POST   /api/milk              - create (duplicate-checked per cow/date/session)
//! GET    /api/milk/stats
//! GET    /api/milk/sales        - admin only
//! POST   /api/milk/sales        - admin only
//! GET    /api/milk/cow/:cowId
//! GET    /api/milk/:id
//! PUT    /api/milk/:id
//! DELETE /api/milk/:id
//!
//! Every write triggers a full recompute of the parent cow's running totals.

use bson::doc;
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::{AccessContext, Capability};
use crate::db::schemas::{
    CowDoc, Metadata, MilkRecordDoc, MilkSaleDoc, COW_COLLECTION, MILK_RECORD_COLLECTION,
    MILK_SALE_COLLECTION,
};
use crate::db::SortDirection;
use crate::routes::helpers::{
    created, doc_to_json, docs_to_json, error_response, ok_data, ok_message, ok_with_message,
    pagination_meta, parse_json_body, parse_object_id, query_params, require_date,
    resolve_access, sanitize, BoxBody,
};
use crate::server::AppState;
use crate::services;
use crate::stats::dates::{period_range, today};
use crate::stats::engine::{breakdown_by_key, daily_totals, period_summary, round2};
use crate::types::{FarmgateError, Result};

const SESSIONS: [&str; 3] = ["morning", "afternoon", "evening"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMilkRecordRequest {
    pub cow_id: String,
    pub quantity: f64,
    pub session: String,
    pub date: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMilkRecordRequest {
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMilkSaleRequest {
    pub farm_location: String,
    pub quantity: f64,
    pub price_per_litre: f64,
    pub total_amount: f64,
    pub date: String,
    #[serde(default)]
    pub buyer: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Route /api/milk/* requests
pub async fn handle_milk_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let dev_mode = state.args.dev_mode;
    dispatch(req, state).await.unwrap_or_else(|e| error_response(&e, dev_mode))
}

async fn dispatch(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let ctx = resolve_access(&state, &req).await?;

    let path = req.uri().path().trim_start_matches("/api/milk").to_string();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let method = req.method().clone();

    match (method, segments.as_slice()) {
        (Method::GET, []) => {
            ctx.require(Capability::ViewMilkRecords)?;
            list_records(req, &state, &ctx).await
        }
        (Method::POST, []) => {
            ctx.require(Capability::AddMilkRecords)?;
            create_record(req, &state, &ctx).await
        }
        (Method::GET, ["stats"]) => {
            ctx.require(Capability::ViewStats)?;
            milk_stats(req, &state, &ctx).await
        }
        (Method::GET, ["sales"]) => {
            ctx.require(Capability::ViewSalesData)?;
            list_sales(req, &state).await
        }
        (Method::POST, ["sales"]) => {
            ctx.require(Capability::EditSalesData)?;
            create_sale(req, &state, &ctx).await
        }
        (Method::GET, ["cow", cow_id]) => {
            ctx.require(Capability::ViewMilkRecords)?;
            let cow_id = cow_id.to_string();
            records_by_cow(req, &state, &cow_id).await
        }
        (Method::GET, [id]) => {
            ctx.require(Capability::ViewMilkRecords)?;
            let id = id.to_string();
            get_record(&state, &id).await
        }
        (Method::PUT, [id]) => {
            ctx.require(Capability::EditMilkRecords)?;
            let id = id.to_string();
            update_record(req, &state, &ctx, &id).await
        }
        (Method::DELETE, [id]) => {
            ctx.require(Capability::EditMilkRecords)?;
            let id = id.to_string();
            delete_record(&state, &id).await
        }
        _ => Err(FarmgateError::NotFound(format!(
            "Route not found: /api/milk{}",
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
    if let Some(session) = params.get("session") {
        filter.insert("session", session.as_str());
    }

    let records = state
        .mongo
        .collection::<MilkRecordDoc>(MILK_RECORD_COLLECTION)
        .await?;

    // A specific day bypasses pagination
    if let Some(date) = params.get("date") {
        let date = require_date(date, "date")?;
        let items = records
            .range_query("date", Some(&date), Some(&date), filter)
            .await?;
        return Ok(ok_data(json!({ "milkRecords": docs_to_json(&items) })));
    }

    let page: i64 = params.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let limit = state
        .args
        .clamp_page_size(params.get("limit").and_then(|l| l.parse().ok()));

    let page_result = records
        .paginate(filter, page, limit, "date", SortDirection::Descending)
        .await?;

    Ok(ok_data(json!({
        "milkRecords": docs_to_json(&page_result.items),
        "pagination": pagination_meta(page, limit, page_result.total_count),
    })))
}

async fn create_record(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    ctx: &AccessContext,
) -> Result<Response<BoxBody>> {
    let body: CreateMilkRecordRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    if body.quantity <= 0.0 {
        return Err(FarmgateError::Validation("Quantity must be positive".into()));
    }
    if !SESSIONS.contains(&body.session.as_str()) {
        return Err(FarmgateError::Validation(
            "Session must be morning, afternoon or evening".into(),
        ));
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

    let records = state
        .mongo
        .collection::<MilkRecordDoc>(MILK_RECORD_COLLECTION)
        .await?;

    // One record per cow/date/session; checked before insert
    let existing = records
        .find_one(doc! {
            "cowId": cow_oid.to_hex(),
            "date": date.as_str(),
            "session": body.session.as_str(),
        })
        .await?;
    if existing.is_some() {
        return Err(FarmgateError::Conflict(
            "Milk record already exists for this cow, date, and session".into(),
        ));
    }

    let mut record = MilkRecordDoc {
        id: None,
        metadata: Metadata::new(),
        cow_id: cow_oid.to_hex(),
        // Snapshot copies of the parent; no live binding
        cow_name: cow.name.clone(),
        ear_tag_number: cow.ear_tag_number.clone(),
        farm_location: cow.farm_location.clone(),
        quantity: body.quantity,
        session: body.session.clone(),
        date,
        notes: body.notes.as_deref().map(sanitize),
        recorded_by: ctx.subject_id.clone(),
    };
    record.id = Some(records.insert_one(record.clone()).await?);

    // Cache refresh; the write above already succeeded
    services::update_cow_milk_stats(&state.mongo, &cow_oid).await;

    Ok(created(
        json!({ "milkRecord": doc_to_json(&record) }),
        "Milk record created successfully",
    ))
}

async fn get_record(state: &Arc<AppState>, id: &str) -> Result<Response<BoxBody>> {
    let oid = parse_object_id(id)?;

    let record = state
        .mongo
        .collection::<MilkRecordDoc>(MILK_RECORD_COLLECTION)
        .await?
        .find_by_id(&oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Milk record not found".into()))?;

    let cow = match parse_object_id(&record.cow_id) {
        Ok(cow_oid) => {
            state
                .mongo
                .collection::<CowDoc>(COW_COLLECTION)
                .await?
                .find_by_id(&cow_oid)
                .await?
        }
        Err(_) => None,
    };

    let mut value = doc_to_json(&record);
    if let Value::Object(map) = &mut value {
        map.insert(
            "cow".into(),
            match cow {
                Some(c) => json!({
                    "id": record.cow_id,
                    "name": c.name,
                    "earTagNumber": c.ear_tag_number,
                }),
                None => Value::Null,
            },
        );
    }

    Ok(ok_data(json!({ "milkRecord": value })))
}

async fn update_record(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    _ctx: &AccessContext,
    id: &str,
) -> Result<Response<BoxBody>> {
    let oid = parse_object_id(id)?;
    let body: UpdateMilkRecordRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    let mut set_fields = doc! {};
    if let Some(quantity) = body.quantity {
        if quantity <= 0.0 {
            return Err(FarmgateError::Validation("Quantity must be positive".into()));
        }
        set_fields.insert("quantity", quantity);
    }
    if let Some(session) = &body.session {
        if !SESSIONS.contains(&session.as_str()) {
            return Err(FarmgateError::Validation(
                "Session must be morning, afternoon or evening".into(),
            ));
        }
        set_fields.insert("session", session.as_str());
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
        .collection::<MilkRecordDoc>(MILK_RECORD_COLLECTION)
        .await?;

    let result = records.update_one(doc! { "_id": oid }, set_fields).await?;
    if result.matched_count == 0 {
        return Err(FarmgateError::NotFound("Milk record not found".into()));
    }

    let record = records
        .find_by_id(&oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Milk record not found".into()))?;

    if let Ok(cow_oid) = parse_object_id(&record.cow_id) {
        services::update_cow_milk_stats(&state.mongo, &cow_oid).await;
    }

    Ok(ok_with_message(
        json!({ "milkRecord": doc_to_json(&record) }),
        "Milk record updated successfully",
    ))
}

async fn delete_record(state: &Arc<AppState>, id: &str) -> Result<Response<BoxBody>> {
    let oid = parse_object_id(id)?;

    let records = state
        .mongo
        .collection::<MilkRecordDoc>(MILK_RECORD_COLLECTION)
        .await?;

    let record = records
        .find_by_id(&oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Milk record not found".into()))?;

    records.delete_one(doc! { "_id": oid }).await?;

    if let Ok(cow_oid) = parse_object_id(&record.cow_id) {
        services::update_cow_milk_stats(&state.mongo, &cow_oid).await;
    }

    Ok(ok_message("Milk record deleted successfully"))
}

async fn records_by_cow(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    cow_id: &str,
) -> Result<Response<BoxBody>> {
    let params = query_params(&req);

    let mut filter = doc! { "cowId": cow_id };
    if let Some(session) = params.get("session") {
        filter.insert("session", session.as_str());
    }

    let records = state
        .mongo
        .collection::<MilkRecordDoc>(MILK_RECORD_COLLECTION)
        .await?;

    let mut items = records
        .range_query(
            "date",
            params.get("startDate").map(|s| s.as_str()),
            params.get("endDate").map(|s| s.as_str()),
            filter,
        )
        .await?;

    items.sort_by(|a, b| b.date.cmp(&a.date));

    Ok(ok_data(json!({ "milkRecords": docs_to_json(&items) })))
}

async fn milk_stats(
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

    let range = match (params.get("startDate"), params.get("endDate")) {
        (Some(start), Some(end)) => crate::stats::DateRange {
            start: require_date(start, "startDate")?,
            end: require_date(end, "endDate")?,
        },
        _ => period_range(params.get("period").map(|s| s.as_str()).unwrap_or("daily"), today()),
    };

    let records = state
        .mongo
        .collection::<MilkRecordDoc>(MILK_RECORD_COLLECTION)
        .await?
        .range_query("date", Some(&range.start), Some(&range.end), filter)
        .await?;

    Ok(ok_data(json!({ "stats": build_milk_stats(&records) })))
}

/// Full stats payload for a milk record set: totals, daily/session/cow
/// breakdowns, and the period summary
pub fn build_milk_stats(records: &[MilkRecordDoc]) -> Value {
    let total_quantity: f64 = records.iter().map(|r| r.quantity).sum();
    let daily = daily_totals(records, |r| r.date.as_str(), |r| r.quantity);

    let mut session_breakdown =
        serde_json::Map::from_iter(SESSIONS.iter().map(|s| (s.to_string(), json!(0.0))));
    for record in records {
        if let Some(entry) = session_breakdown.get_mut(&record.session) {
            let current = entry.as_f64().unwrap_or(0.0);
            *entry = json!(current + record.quantity);
        }
    }

    let cow_breakdown = breakdown_by_key(
        records,
        |r| Some(format!("{} ({})", r.cow_name, r.cow_id)),
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
        "sessionBreakdown": session_breakdown,
        "cowBreakdown": cow_breakdown,
        "periodSummary": period_summary(&daily),
    })
}

async fn list_sales(req: Request<Incoming>, state: &Arc<AppState>) -> Result<Response<BoxBody>> {
    let params = query_params(&req);

    let mut filter = doc! {};
    if let Some(farm) = params.get("farmLocation") {
        filter.insert("farmLocation", farm.as_str());
    }

    let mut sales = state
        .mongo
        .collection::<MilkSaleDoc>(MILK_SALE_COLLECTION)
        .await?
        .range_query(
            "date",
            params.get("startDate").map(|s| s.as_str()),
            params.get("endDate").map(|s| s.as_str()),
            filter,
        )
        .await?;

    sales.sort_by(|a, b| b.date.cmp(&a.date));

    Ok(ok_data(json!({ "salesRecords": docs_to_json(&sales) })))
}

async fn create_sale(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    ctx: &AccessContext,
) -> Result<Response<BoxBody>> {
    let body: CreateMilkSaleRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    if body.quantity <= 0.0 || body.price_per_litre < 0.0 || body.total_amount < 0.0 {
        return Err(FarmgateError::Validation(
            "Quantity, price and amount must be positive".into(),
        ));
    }
    let date = require_date(&body.date, "date")?;

    let mut sale = MilkSaleDoc {
        id: None,
        metadata: Metadata::new(),
        farm_location: sanitize(&body.farm_location),
        quantity: body.quantity,
        price_per_litre: body.price_per_litre,
        total_amount: body.total_amount,
        buyer: body.buyer.as_deref().map(sanitize),
        date,
        notes: body.notes.as_deref().map(sanitize),
        recorded_by: ctx.subject_id.clone(),
    };

    let sales = state
        .mongo
        .collection::<MilkSaleDoc>(MILK_SALE_COLLECTION)
        .await?;
    sale.id = Some(sales.insert_one(sale.clone()).await?);

    Ok(created(
        json!({ "sale": doc_to_json(&sale) }),
        "Milk sale recorded successfully",
    ))
}
