//! Farm routes
//!
//! GET    /api/farms
//! POST   /api/farms                        - unique location key
//! GET    /api/farms/:id                    - with livestock/staff statistics
//! PUT    /api/farms/:id                    - location is immutable
//! DELETE /api/farms/:id                    - only when unreferenced
//! GET    /api/farms/:location/settings
//! PUT    /api/farms/:location/settings     - merge semantics
//! GET    /api/farms/:location/summary      - full fan-in report
//! POST   /api/farms/:location/initialize   - seed default settings

use bson::{doc, Document};
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::{AccessContext, Capability};
use crate::db::schemas::{
    ChickenBatchDoc, CowDoc, EggRecordDoc, FarmDoc, FeedRecordDoc, HealthRecordDoc, Metadata,
    MilkRecordDoc, UserDoc, CHICKEN_BATCH_COLLECTION, COW_COLLECTION, EGG_RECORD_COLLECTION,
    FARM_COLLECTION, FEED_RECORD_COLLECTION, HEALTH_RECORD_COLLECTION, MILK_RECORD_COLLECTION,
    USER_COLLECTION,
};
use crate::routes::helpers::{
    created, doc_to_json, docs_to_json, error_response, ok_data, ok_message, ok_with_message,
    parse_json_body, parse_object_id, query_params, require_date, resolve_access, sanitize,
    BoxBody,
};
use crate::server::AppState;
use crate::stats::dates::{age_in_years, period_range, today};
use crate::stats::engine::{count_by_key, round2};
use crate::types::{FarmgateError, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFarmRequest {
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub manager: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub established_date: Option<String>,
    #[serde(default)]
    pub size: Option<f64>,
    #[serde(default)]
    pub specialization: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFarmRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub manager: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub established_date: Option<String>,
    #[serde(default)]
    pub size: Option<f64>,
    #[serde(default)]
    pub specialization: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub settings: serde_json::Map<String, Value>,
}

/// Route /api/farms/* requests
pub async fn handle_farm_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let dev_mode = state.args.dev_mode;
    dispatch(req, state).await.unwrap_or_else(|e| error_response(&e, dev_mode))
}

async fn dispatch(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let ctx = resolve_access(&state, &req).await?;

    let path = req.uri().path().trim_start_matches("/api/farms").to_string();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let method = req.method().clone();

    match (method, segments.as_slice()) {
        (Method::GET, []) => list_farms(&state).await,
        (Method::POST, []) => {
            ctx.require(Capability::ManageFarms)?;
            create_farm(req, &state).await
        }
        (Method::GET, [location, "settings"]) => {
            let location = location.to_string();
            get_settings(&state, &location).await
        }
        (Method::PUT, [location, "settings"]) => {
            ctx.require(Capability::ManageFarms)?;
            let location = location.to_string();
            update_settings(req, &state, &location).await
        }
        (Method::GET, [location, "summary"]) => {
            ctx.check_farm_access(location)?;
            let location = location.to_string();
            farm_summary(req, &state, &location).await
        }
        (Method::POST, [location, "initialize"]) => {
            ctx.require(Capability::ManageFarms)?;
            let location = location.to_string();
            initialize_farm(&state, &location).await
        }
        (Method::GET, [id]) => {
            let id = id.to_string();
            get_farm(&state, &id).await
        }
        (Method::PUT, [id]) => {
            ctx.require(Capability::ManageFarms)?;
            let id = id.to_string();
            update_farm(req, &state, &id).await
        }
        (Method::DELETE, [id]) => {
            ctx.require(Capability::ManageFarms)?;
            let id = id.to_string();
            delete_farm(&state, &id).await
        }
        _ => Err(FarmgateError::NotFound(format!(
            "Route not found: /api/farms{}",
            path
        ))),
    }
}

async fn find_farm_by_location(state: &Arc<AppState>, location: &str) -> Result<FarmDoc> {
    state
        .mongo
        .collection::<FarmDoc>(FARM_COLLECTION)
        .await?
        .find_one(doc! { "location": location })
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Farm not found".into()))
}

async fn list_farms(state: &Arc<AppState>) -> Result<Response<BoxBody>> {
    let farms = state
        .mongo
        .collection::<FarmDoc>(FARM_COLLECTION)
        .await?
        .find_many(doc! {})
        .await?;

    Ok(ok_data(json!({ "farms": docs_to_json(&farms) })))
}

async fn create_farm(req: Request<Incoming>, state: &Arc<AppState>) -> Result<Response<BoxBody>> {
    let body: CreateFarmRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    if body.name.is_empty() || body.location.is_empty() {
        return Err(FarmgateError::Validation(
            "Missing required fields: name, location".into(),
        ));
    }

    let farms = state.mongo.collection::<FarmDoc>(FARM_COLLECTION).await?;

    let location = sanitize(&body.location);
    if farms
        .find_one(doc! { "location": location.as_str() })
        .await?
        .is_some()
    {
        return Err(FarmgateError::Conflict(
            "Farm with this location already exists".into(),
        ));
    }

    let mut farm = FarmDoc {
        id: None,
        metadata: Metadata::new(),
        name: sanitize(&body.name),
        location,
        address: body.address.as_deref().map(sanitize),
        contact_phone: body.contact_phone.as_deref().map(sanitize),
        contact_email: body.contact_email.as_deref().map(sanitize),
        manager: body.manager.as_deref().map(sanitize),
        description: body.description.as_deref().map(sanitize),
        established_date: match &body.established_date {
            Some(d) => Some(require_date(d, "establishedDate")?),
            None => None,
        },
        size: body.size,
        specialization: body.specialization.iter().map(|s| sanitize(s)).collect(),
        settings: FarmDoc::default_settings(),
        is_active: true,
    };
    farm.id = Some(farms.insert_one(farm.clone()).await?);

    Ok(created(
        json!({ "farm": doc_to_json(&farm) }),
        "Farm created successfully",
    ))
}

async fn get_farm(state: &Arc<AppState>, id: &str) -> Result<Response<BoxBody>> {
    let oid = parse_object_id(id)?;

    let farm = state
        .mongo
        .collection::<FarmDoc>(FARM_COLLECTION)
        .await?
        .find_by_id(&oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Farm not found".into()))?;

    let (cows, batches, users) = tokio::try_join!(
        async {
            state
                .mongo
                .collection::<CowDoc>(COW_COLLECTION)
                .await?
                .find_many(doc! { "farmLocation": farm.location.as_str(), "isActive": true })
                .await
        },
        async {
            state
                .mongo
                .collection::<ChickenBatchDoc>(CHICKEN_BATCH_COLLECTION)
                .await?
                .find_many(doc! { "farmLocation": farm.location.as_str(), "isActive": true })
                .await
        },
        async {
            state
                .mongo
                .collection::<UserDoc>(USER_COLLECTION)
                .await?
                .find_many(doc! { "assignedFarm": farm.location.as_str() })
                .await
        },
    )?;

    let total_chickens: i64 = batches.iter().map(|b| b.current_count).sum();
    let farmers = users
        .iter()
        .filter(|u| u.role == crate::auth::access::Role::Farmer)
        .count();

    let mut value = doc_to_json(&farm);
    if let Value::Object(map) = &mut value {
        map.insert(
            "statistics".into(),
            json!({
                "totalCows": cows.len(),
                "totalChickenBatches": batches.len(),
                "totalChickens": total_chickens,
                "totalUsers": users.len(),
                "farmers": farmers,
                "admins": users.len() - farmers,
            }),
        );
    }

    Ok(ok_data(json!({ "farm": value })))
}

async fn update_farm(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    id: &str,
) -> Result<Response<BoxBody>> {
    let oid = parse_object_id(id)?;
    let body: UpdateFarmRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    // The location key is immutable once records reference it
    let mut set_fields = doc! {};
    if let Some(name) = &body.name {
        set_fields.insert("name", sanitize(name));
    }
    if let Some(address) = &body.address {
        set_fields.insert("address", sanitize(address));
    }
    if let Some(contact_phone) = &body.contact_phone {
        set_fields.insert("contactPhone", sanitize(contact_phone));
    }
    if let Some(contact_email) = &body.contact_email {
        set_fields.insert("contactEmail", sanitize(contact_email));
    }
    if let Some(manager) = &body.manager {
        set_fields.insert("manager", sanitize(manager));
    }
    if let Some(description) = &body.description {
        set_fields.insert("description", sanitize(description));
    }
    if let Some(established_date) = &body.established_date {
        set_fields.insert(
            "establishedDate",
            require_date(established_date, "establishedDate")?,
        );
    }
    if let Some(size) = body.size {
        set_fields.insert("size", size);
    }
    if let Some(specialization) = &body.specialization {
        let cleaned: Vec<String> = specialization.iter().map(|s| sanitize(s)).collect();
        set_fields.insert("specialization", cleaned);
    }

    if set_fields.is_empty() {
        return Err(FarmgateError::Validation("No fields to update".into()));
    }

    let farms = state.mongo.collection::<FarmDoc>(FARM_COLLECTION).await?;
    let result = farms.update_one(doc! { "_id": oid }, set_fields).await?;
    if result.matched_count == 0 {
        return Err(FarmgateError::NotFound("Farm not found".into()));
    }

    let farm = farms
        .find_by_id(&oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Farm not found".into()))?;

    Ok(ok_with_message(
        json!({ "farm": doc_to_json(&farm) }),
        "Farm updated successfully",
    ))
}

async fn delete_farm(state: &Arc<AppState>, id: &str) -> Result<Response<BoxBody>> {
    let oid = parse_object_id(id)?;

    let farms = state.mongo.collection::<FarmDoc>(FARM_COLLECTION).await?;
    let farm = farms
        .find_by_id(&oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Farm not found".into()))?;

    let (cow_count, batch_count, user_count) = tokio::try_join!(
        async {
            state
                .mongo
                .collection::<CowDoc>(COW_COLLECTION)
                .await?
                .count(doc! { "farmLocation": farm.location.as_str() })
                .await
        },
        async {
            state
                .mongo
                .collection::<ChickenBatchDoc>(CHICKEN_BATCH_COLLECTION)
                .await?
                .count(doc! { "farmLocation": farm.location.as_str() })
                .await
        },
        async {
            state
                .mongo
                .collection::<UserDoc>(USER_COLLECTION)
                .await?
                .count(doc! { "assignedFarm": farm.location.as_str() })
                .await
        },
    )?;

    if cow_count > 0 || batch_count > 0 || user_count > 0 {
        return Err(FarmgateError::Validation(
            "Cannot delete farm with associated data. Please reassign or remove all cows, chickens, and users first."
                .into(),
        ));
    }

    farms
        .update_one(doc! { "_id": oid }, doc! { "isActive": false })
        .await?;

    Ok(ok_message("Farm deleted successfully"))
}

async fn get_settings(state: &Arc<AppState>, location: &str) -> Result<Response<BoxBody>> {
    let farm = find_farm_by_location(state, location).await?;

    Ok(ok_data(json!({
        "settings": farm.settings,
        "farmInfo": {
            "name": farm.name,
            "location": farm.location,
            "manager": farm.manager,
        },
    })))
}

async fn update_settings(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    location: &str,
) -> Result<Response<BoxBody>> {
    let body: UpdateSettingsRequest = parse_json_body(req, state.args.max_body_bytes).await?;
    let farm = find_farm_by_location(state, location).await?;

    // Merge: incoming keys override, everything else is preserved
    let mut settings = farm.settings.clone();
    for (key, value) in body.settings {
        let bson_value = bson::to_bson(&value)
            .map_err(|e| FarmgateError::Validation(format!("Invalid settings value: {}", e)))?;
        settings.insert(key, bson_value);
    }

    let farms = state.mongo.collection::<FarmDoc>(FARM_COLLECTION).await?;
    farms
        .update_one(
            doc! { "location": location },
            doc! { "settings": settings.clone() },
        )
        .await?;

    Ok(ok_with_message(
        json!({ "settings": settings_json(&settings) }),
        "Farm settings updated successfully",
    ))
}

fn settings_json(settings: &Document) -> Value {
    serde_json::to_value(settings).unwrap_or(Value::Null)
}

async fn initialize_farm(state: &Arc<AppState>, location: &str) -> Result<Response<BoxBody>> {
    let farm = find_farm_by_location(state, location).await?;

    // Seed the full defaults on top of anything already configured
    let mut settings = farm.settings.clone();
    for (key, value) in FarmDoc::initialized_settings() {
        settings.insert(key, value);
    }

    let farms = state.mongo.collection::<FarmDoc>(FARM_COLLECTION).await?;
    farms
        .update_one(
            doc! { "location": location },
            doc! { "settings": settings.clone() },
        )
        .await?;

    let farm = find_farm_by_location(state, location).await?;

    Ok(ok_with_message(
        json!({ "farm": doc_to_json(&farm) }),
        "Farm data initialized successfully",
    ))
}

async fn farm_summary(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    location: &str,
) -> Result<Response<BoxBody>> {
    let params = query_params(&req);
    let period = params.get("period").map(|s| s.as_str()).unwrap_or("monthly");

    let farm = find_farm_by_location(state, location).await?;
    let range = period_range(period, today());

    let farm_filter = doc! { "farmLocation": location };

    let (cows, batches, milk_records, egg_records, feed_records, health_records, users) =
        tokio::try_join!(
            async {
                state
                    .mongo
                    .collection::<CowDoc>(COW_COLLECTION)
                    .await?
                    .find_many(doc! { "farmLocation": location, "isActive": true })
                    .await
            },
            async {
                state
                    .mongo
                    .collection::<ChickenBatchDoc>(CHICKEN_BATCH_COLLECTION)
                    .await?
                    .find_many(doc! { "farmLocation": location, "isActive": true })
                    .await
            },
            async {
                state
                    .mongo
                    .collection::<MilkRecordDoc>(MILK_RECORD_COLLECTION)
                    .await?
                    .range_query("date", Some(&range.start), Some(&range.end), farm_filter.clone())
                    .await
            },
            async {
                state
                    .mongo
                    .collection::<EggRecordDoc>(EGG_RECORD_COLLECTION)
                    .await?
                    .range_query("date", Some(&range.start), Some(&range.end), farm_filter.clone())
                    .await
            },
            async {
                state
                    .mongo
                    .collection::<FeedRecordDoc>(FEED_RECORD_COLLECTION)
                    .await?
                    .range_query("date", Some(&range.start), Some(&range.end), farm_filter.clone())
                    .await
            },
            async {
                state
                    .mongo
                    .collection::<HealthRecordDoc>(HEALTH_RECORD_COLLECTION)
                    .await?
                    .range_query(
                        "dateOfIllness",
                        Some(&range.start),
                        Some(&range.end),
                        farm_filter.clone(),
                    )
                    .await
            },
            async {
                state
                    .mongo
                    .collection::<UserDoc>(USER_COLLECTION)
                    .await?
                    .find_many(doc! { "assignedFarm": location })
                    .await
            },
        )?;

    let total_birds: i64 = batches.iter().map(|b| b.current_count).sum();
    let total_milk: f64 = milk_records.iter().map(|r| r.quantity).sum();
    let total_eggs: f64 = egg_records.iter().map(|r| r.quantity).sum();
    let total_feed: f64 = feed_records.iter().map(|r| r.quantity).sum();
    let health_cost: f64 = health_records.iter().map(|r| r.cost).sum();
    let resolved = health_records.iter().filter(|r| r.is_resolved).count();
    let farmers = users
        .iter()
        .filter(|u| u.role == crate::auth::access::Role::Farmer)
        .count();

    let average_age = if cows.is_empty() {
        0.0
    } else {
        let total_age: i64 = cows.iter().map(|c| age_in_years(&c.date_of_birth)).sum();
        (total_age as f64 / cows.len() as f64 * 10.0).round() / 10.0
    };

    let summary = json!({
        "farmInfo": {
            "name": farm.name,
            "location": farm.location,
            "manager": farm.manager,
            "establishedDate": farm.established_date,
            "size": farm.size,
            "specialization": farm.specialization,
        },
        "livestock": {
            "cows": {
                "total": cows.len(),
                "breeds": count_by_key(&cows, |c| Some(c.breed.clone())),
                "averageAge": average_age,
            },
            "chickens": {
                "totalBatches": batches.len(),
                "totalBirds": total_birds,
                "breeds": count_by_key(&batches, |b| b.breed.clone()),
                "averageBatchSize": if batches.is_empty() { 0 } else { total_birds / batches.len() as i64 },
            },
        },
        "production": {
            "milk": {
                "total": total_milk,
                "average": if milk_records.is_empty() { 0.0 } else { round2(total_milk / milk_records.len() as f64) },
                "sessions": count_by_key(&milk_records, |r| Some(r.session.clone())),
            },
            "eggs": {
                "total": total_eggs,
                "average": if egg_records.is_empty() { 0.0 } else { round2(total_eggs / egg_records.len() as f64) },
                "batches": count_by_key(&egg_records, |r| Some(r.batch_name.clone())),
            },
        },
        "health": {
            "totalRecords": health_records.len(),
            "resolved": resolved,
            "unresolved": health_records.len() - resolved,
            "totalCost": health_cost,
            "commonDiseases": count_by_key(&health_records, |r| Some(r.disease.clone())),
        },
        "feed": {
            "totalRecords": feed_records.len(),
            "totalQuantity": total_feed,
            "feedTypes": count_by_key(&feed_records, |r| Some(r.feed_type.clone())),
        },
        "staff": {
            "total": users.len(),
            "farmers": farmers,
            "admins": users.len() - farmers,
            "active": users.iter().filter(|u| u.is_active).count(),
        },
        "period": {
            "start": range.start,
            "end": range.end,
            "type": period,
        },
    });

    Ok(ok_data(json!({ "farmSummary": summary })))
}
