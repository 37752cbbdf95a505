//! Statistics endpoints
//!
//! GET  /api/stats/dashboard     - full fan-in summary with trends + alerts
//! GET  /api/stats/production    - milk/egg stats over an explicit range
//! GET  /api/stats/financial     - admin only
//! GET  /api/stats/performance   - rankings and productivity
//! GET  /api/stats/comparison    - two explicit periods compared
//! POST /api/stats/custom-report - caller-selected sections
//!
//! Handlers fetch via range/equality queries and feed the in-memory
//! aggregation engine; no aggregation happens in the store.

use bson::{doc, Document};
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::alerts;
use crate::auth::{AccessContext, Capability};
use crate::db::schemas::{
    ChickenBatchDoc, CowDoc, EggRecordDoc, FeedInventoryDoc, FeedRecordDoc, HealthRecordDoc,
    MilkRecordDoc, MilkSaleDoc, CHICKEN_BATCH_COLLECTION, COW_COLLECTION, EGG_RECORD_COLLECTION,
    FEED_INVENTORY_COLLECTION, FEED_RECORD_COLLECTION, HEALTH_RECORD_COLLECTION,
    MILK_RECORD_COLLECTION, MILK_SALE_COLLECTION,
};
use crate::routes::chicken::build_egg_stats;
use crate::routes::health_records::build_health_stats;
use crate::routes::helpers::{
    error_response, ok_data, parse_json_body, query_params, require_date, resolve_access,
    BoxBody,
};
use crate::routes::milk::build_milk_stats;
use crate::server::AppState;
use crate::stats::dates::{period_range, today, DateRange};
use crate::stats::engine::{
    breakdown_by_key, change_percent, count_by_key, production_summary, round2, top_n, trend,
    weekly_totals,
};
use crate::stats::financial_rollup;
use crate::types::{FarmgateError, Result};

const TOP_PERFORMER_LIMIT: usize = 5;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomReportRequest {
    #[serde(default)]
    pub farm_location: Option<String>,
    pub start_date: String,
    pub end_date: String,
    pub include_types: Vec<String>,
}

/// Route /api/stats/* requests
pub async fn handle_stats_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let dev_mode = state.args.dev_mode;
    dispatch(req, state).await.unwrap_or_else(|e| error_response(&e, dev_mode))
}

async fn dispatch(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let ctx = resolve_access(&state, &req).await?;

    let path = req.uri().path().trim_start_matches("/api/stats").to_string();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let method = req.method().clone();

    match (method, segments.as_slice()) {
        (Method::GET, ["dashboard"]) => {
            ctx.require(Capability::ViewStats)?;
            dashboard(req, &state, &ctx).await
        }
        (Method::GET, ["production"]) => {
            ctx.require(Capability::ViewStats)?;
            production(req, &state, &ctx).await
        }
        (Method::GET, ["financial"]) => {
            // Financial reports are admin-only outright
            ctx.require_admin()?;
            financial(req, &state).await
        }
        (Method::GET, ["performance"]) => {
            ctx.require(Capability::ViewStats)?;
            performance(req, &state, &ctx).await
        }
        (Method::GET, ["comparison"]) => {
            ctx.require(Capability::ViewStats)?;
            comparison(req, &state, &ctx).await
        }
        (Method::POST, ["custom-report"]) => {
            ctx.require(Capability::ViewStats)?;
            custom_report(req, &state, &ctx).await
        }
        _ => Err(FarmgateError::NotFound(format!(
            "Route not found: /api/stats{}",
            path
        ))),
    }
}

fn scope_filter(farm: &Option<String>) -> Document {
    match farm {
        Some(location) => doc! { "farmLocation": location.as_str() },
        None => Document::new(),
    }
}

async fn fetch_milk(
    state: &Arc<AppState>,
    range: &DateRange,
    filter: Document,
) -> Result<Vec<MilkRecordDoc>> {
    state
        .mongo
        .collection::<MilkRecordDoc>(MILK_RECORD_COLLECTION)
        .await?
        .range_query("date", Some(&range.start), Some(&range.end), filter)
        .await
}

async fn fetch_eggs(
    state: &Arc<AppState>,
    range: &DateRange,
    filter: Document,
) -> Result<Vec<EggRecordDoc>> {
    state
        .mongo
        .collection::<EggRecordDoc>(EGG_RECORD_COLLECTION)
        .await?
        .range_query("date", Some(&range.start), Some(&range.end), filter)
        .await
}

async fn dashboard(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    ctx: &AccessContext,
) -> Result<Response<BoxBody>> {
    let params = query_params(&req);
    let period = params.get("period").map(|s| s.as_str()).unwrap_or("monthly");
    let farm = ctx.farm_scope(params.get("farmLocation").map(|s| s.as_str()));
    let range = period_range(period, today());

    let (cows, batches, milk_records, egg_records, feed_records) = tokio::try_join!(
        async {
            let mut filter = scope_filter(&farm);
            filter.insert("isActive", true);
            state
                .mongo
                .collection::<CowDoc>(COW_COLLECTION)
                .await?
                .find_many(filter)
                .await
        },
        async {
            let mut filter = scope_filter(&farm);
            filter.insert("isActive", true);
            state
                .mongo
                .collection::<ChickenBatchDoc>(CHICKEN_BATCH_COLLECTION)
                .await?
                .find_many(filter)
                .await
        },
        fetch_milk(state, &range, scope_filter(&farm)),
        fetch_eggs(state, &range, scope_filter(&farm)),
        async {
            state
                .mongo
                .collection::<FeedRecordDoc>(FEED_RECORD_COLLECTION)
                .await?
                .range_query(
                    "date",
                    Some(&range.start),
                    Some(&range.end),
                    scope_filter(&farm),
                )
                .await
        },
    )?;

    // Health stats are admin-only; farmers see null
    let health = if ctx.is_admin() {
        let records = state
            .mongo
            .collection::<HealthRecordDoc>(HEALTH_RECORD_COLLECTION)
            .await?
            .range_query(
                "dateOfIllness",
                Some(&range.start),
                Some(&range.end),
                scope_filter(&farm),
            )
            .await?;
        build_health_stats(&records)
    } else {
        Value::Null
    };

    let total_chickens: i64 = batches.iter().map(|b| b.current_count).sum();
    let total_feed: f64 = feed_records.iter().map(|r| r.quantity).sum();

    let alerts = alerts::generate_alerts(&state.mongo, farm.as_deref(), ctx.is_admin()).await;

    let dashboard_stats = json!({
        "livestock": {
            "totalCows": cows.len(),
            "activeCows": cows.iter().filter(|c| c.is_active).count(),
            "totalChickenBatches": batches.len(),
            "totalChickens": total_chickens,
        },
        "production": {
            "milk": production_summary(&milk_records, |r| r.date.as_str(), |r| r.quantity),
            "eggs": production_summary(&egg_records, |r| r.date.as_str(), |r| r.quantity),
        },
        "feed": {
            "totalQuantity": total_feed,
            "totalRecords": feed_records.len(),
            "feedTypeBreakdown": breakdown_by_key(
                &feed_records,
                |r| Some(r.feed_type.clone()),
                |r| r.quantity,
            ),
        },
        "health": health,
        "trends": {
            "milkTrend": trend(&milk_records, |r| r.date.as_str(), |r| r.quantity),
            "eggTrend": trend(&egg_records, |r| r.date.as_str(), |r| r.quantity),
        },
        "alerts": alerts,
        "period": { "start": range.start, "end": range.end, "type": period },
    });

    Ok(ok_data(json!({ "dashboardStats": dashboard_stats })))
}

async fn production(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    ctx: &AccessContext,
) -> Result<Response<BoxBody>> {
    let params = query_params(&req);
    let farm = ctx.farm_scope(params.get("farmLocation").map(|s| s.as_str()));

    let range = explicit_range(&params)?;
    let report_type = params.get("type").map(|s| s.as_str());

    let mut stats = serde_json::Map::new();

    if report_type.is_none() || report_type == Some("milk") {
        let records = fetch_milk(state, &range, scope_filter(&farm)).await?;
        let mut milk = build_milk_stats(&records);
        if let Value::Object(map) = &mut milk {
            map.insert(
                "weeklyTrend".into(),
                json!(weekly_totals(&records, |r| r.date.as_str(), |r| r.quantity)),
            );
        }
        stats.insert("milk".into(), milk);
    }

    if report_type.is_none() || report_type == Some("eggs") {
        let records = fetch_eggs(state, &range, scope_filter(&farm)).await?;
        let mut eggs = build_egg_stats(&records);
        if let Value::Object(map) = &mut eggs {
            map.insert(
                "weeklyTrend".into(),
                json!(weekly_totals(&records, |r| r.date.as_str(), |r| r.quantity)),
            );
        }
        stats.insert("eggs".into(), eggs);
    }

    Ok(ok_data(json!({ "productionStats": stats })))
}

async fn financial(req: Request<Incoming>, state: &Arc<AppState>) -> Result<Response<BoxBody>> {
    let params = query_params(&req);
    // Admin scope: the requested farm verbatim, all farms when omitted
    let farm = params.get("farmLocation").cloned();
    let range = explicit_range(&params)?;

    let (sales, inventory, health_records) = tokio::try_join!(
        async {
            state
                .mongo
                .collection::<MilkSaleDoc>(MILK_SALE_COLLECTION)
                .await?
                .range_query("date", Some(&range.start), Some(&range.end), scope_filter(&farm))
                .await
        },
        async {
            state
                .mongo
                .collection::<FeedInventoryDoc>(FEED_INVENTORY_COLLECTION)
                .await?
                .find_many(scope_filter(&farm))
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
                    scope_filter(&farm),
                )
                .await
        },
    )?;

    let stats = financial_rollup(&sales, &inventory, &health_records);

    Ok(ok_data(json!({ "financialStats": stats })))
}

async fn performance(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    ctx: &AccessContext,
) -> Result<Response<BoxBody>> {
    let params = query_params(&req);
    let period = params.get("period").map(|s| s.as_str()).unwrap_or("monthly");
    let farm = ctx.farm_scope(params.get("farmLocation").map(|s| s.as_str()));
    let range = period_range(period, today());

    let (cows, batches, milk_records, egg_records) = tokio::try_join!(
        async {
            let mut filter = scope_filter(&farm);
            filter.insert("isActive", true);
            state
                .mongo
                .collection::<CowDoc>(COW_COLLECTION)
                .await?
                .find_many(filter)
                .await
        },
        async {
            let mut filter = scope_filter(&farm);
            filter.insert("isActive", true);
            state
                .mongo
                .collection::<ChickenBatchDoc>(CHICKEN_BATCH_COLLECTION)
                .await?
                .find_many(filter)
                .await
        },
        fetch_milk(state, &range, scope_filter(&farm)),
        fetch_eggs(state, &range, scope_filter(&farm)),
    )?;

    let cow_performance = cow_performance(&cows, &milk_records);
    let batch_performance = batch_performance(&batches, &egg_records);

    let total_milk: f64 = milk_records.iter().map(|r| r.quantity).sum();
    let total_eggs: f64 = egg_records.iter().map(|r| r.quantity).sum();

    let performance_stats = json!({
        "cowPerformance": cow_performance,
        "chickenPerformance": batch_performance,
        "topPerformers": {
            "cows": top_n(cow_performance.clone(), metric_total_milk, TOP_PERFORMER_LIMIT),
            "chickenBatches": top_n(batch_performance.clone(), metric_total_eggs, TOP_PERFORMER_LIMIT),
        },
        "productivity": {
            "milkProductivityPerCow": if cows.is_empty() { 0.0 } else { round2(total_milk / cows.len() as f64) },
            "eggProductivityPerBatch": if batches.is_empty() { 0.0 } else { round2(total_eggs / batches.len() as f64) },
        },
    });

    Ok(ok_data(json!({ "performanceStats": performance_stats })))
}

fn metric_total_milk(entry: &Value) -> f64 {
    entry["totalMilk"].as_f64().unwrap_or(0.0)
}

fn metric_total_eggs(entry: &Value) -> f64 {
    entry["totalEggs"].as_f64().unwrap_or(0.0)
}

/// Per-cow totals over the fetched window, ranked by total milk
fn cow_performance(cows: &[CowDoc], milk_records: &[MilkRecordDoc]) -> Vec<Value> {
    let by_cow = breakdown_by_key(milk_records, |r| Some(r.cow_id.clone()), |r| r.quantity);

    let entries: Vec<Value> = cows
        .iter()
        .map(|cow| {
            let cow_hex = cow.id.map(|oid| oid.to_hex()).unwrap_or_default();
            let totals = by_cow.get(&cow_hex);
            json!({
                "cowId": cow_hex,
                "cowName": cow.name,
                "totalMilk": totals.map(|t| t.quantity).unwrap_or(0.0),
                "averageDaily": cow.average_daily_milk,
                "recordCount": totals.map(|t| t.records).unwrap_or(0),
            })
        })
        .collect();

    top_n(entries, metric_total_milk, usize::MAX)
}

/// Per-batch totals over the fetched window, ranked by total eggs
fn batch_performance(batches: &[ChickenBatchDoc], egg_records: &[EggRecordDoc]) -> Vec<Value> {
    let by_batch = breakdown_by_key(egg_records, |r| Some(r.batch_id.clone()), |r| r.quantity);

    let entries: Vec<Value> = batches
        .iter()
        .map(|batch| {
            let batch_hex = batch.id.map(|oid| oid.to_hex()).unwrap_or_default();
            let totals = by_batch.get(&batch_hex);
            json!({
                "batchId": batch_hex,
                "batchName": batch.batch_id,
                "totalEggs": totals.map(|t| t.quantity).unwrap_or(0.0),
                "averageDaily": batch.production_stats.average_eggs_per_day,
                "recordCount": totals.map(|t| t.records).unwrap_or(0),
            })
        })
        .collect();

    top_n(entries, metric_total_eggs, usize::MAX)
}

async fn comparison(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    ctx: &AccessContext,
) -> Result<Response<BoxBody>> {
    let params = query_params(&req);
    let farm = ctx.farm_scope(params.get("farmLocation").map(|s| s.as_str()));

    let period1 = DateRange {
        start: required_date_param(&params, "period1Start")?,
        end: required_date_param(&params, "period1End")?,
    };
    let period2 = DateRange {
        start: required_date_param(&params, "period2Start")?,
        end: required_date_param(&params, "period2End")?,
    };

    let (p1_milk, p1_eggs, p2_milk, p2_eggs) = tokio::try_join!(
        fetch_milk(state, &period1, scope_filter(&farm)),
        fetch_eggs(state, &period1, scope_filter(&farm)),
        fetch_milk(state, &period2, scope_filter(&farm)),
        fetch_eggs(state, &period2, scope_filter(&farm)),
    )?;

    let p1_milk_total: f64 = p1_milk.iter().map(|r| r.quantity).sum();
    let p2_milk_total: f64 = p2_milk.iter().map(|r| r.quantity).sum();
    let p1_egg_total: f64 = p1_eggs.iter().map(|r| r.quantity).sum();
    let p2_egg_total: f64 = p2_eggs.iter().map(|r| r.quantity).sum();

    let comparison_stats = json!({
        "milk": {
            "period1": production_summary(&p1_milk, |r| r.date.as_str(), |r| r.quantity),
            "period2": production_summary(&p2_milk, |r| r.date.as_str(), |r| r.quantity),
            "change": change_percent(p1_milk_total, p2_milk_total),
        },
        "eggs": {
            "period1": production_summary(&p1_eggs, |r| r.date.as_str(), |r| r.quantity),
            "period2": production_summary(&p2_eggs, |r| r.date.as_str(), |r| r.quantity),
            "change": change_percent(p1_egg_total, p2_egg_total),
        },
    });

    Ok(ok_data(json!({ "comparisonStats": comparison_stats })))
}

async fn custom_report(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    ctx: &AccessContext,
) -> Result<Response<BoxBody>> {
    let body: CustomReportRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    if body.include_types.is_empty() {
        return Err(FarmgateError::Validation("includeTypes is required".into()));
    }

    let farm = ctx.farm_scope(body.farm_location.as_deref());
    let range = DateRange {
        start: require_date(&body.start_date, "startDate")?,
        end: require_date(&body.end_date, "endDate")?,
    };

    let mut report = serde_json::Map::new();
    report.insert(
        "reportGenerated".into(),
        json!(chrono::Utc::now().to_rfc3339()),
    );
    report.insert(
        "period".into(),
        json!({ "startDate": range.start, "endDate": range.end }),
    );
    report.insert(
        "farmLocation".into(),
        json!(farm.clone().unwrap_or_else(|| "All Farms".to_string())),
    );

    let includes = |section: &str| body.include_types.iter().any(|t| t == section);

    if includes("livestock") {
        let (cows, batches) = tokio::try_join!(
            async {
                state
                    .mongo
                    .collection::<CowDoc>(COW_COLLECTION)
                    .await?
                    .find_many(scope_filter(&farm))
                    .await
            },
            async {
                state
                    .mongo
                    .collection::<ChickenBatchDoc>(CHICKEN_BATCH_COLLECTION)
                    .await?
                    .find_many(scope_filter(&farm))
                    .await
            },
        )?;

        let total_chickens: i64 = batches.iter().map(|b| b.current_count).sum();
        report.insert(
            "livestock".into(),
            json!({
                "cows": cows.len(),
                "activeCows": cows.iter().filter(|c| c.is_active).count(),
                "chickenBatches": batches.len(),
                "totalChickens": total_chickens,
                "cowBreeds": count_by_key(&cows, |c| Some(c.breed.clone())),
                "chickenBreeds": count_by_key(&batches, |b| b.breed.clone()),
            }),
        );
    }

    if includes("production") {
        let (milk_records, egg_records) = tokio::try_join!(
            fetch_milk(state, &range, scope_filter(&farm)),
            fetch_eggs(state, &range, scope_filter(&farm)),
        )?;

        report.insert(
            "production".into(),
            json!({
                "milk": build_milk_stats(&milk_records),
                "eggs": build_egg_stats(&egg_records),
            }),
        );
    }

    // Health data never leaks into a farmer's report
    if includes("health") && ctx.is_admin() {
        let records = state
            .mongo
            .collection::<HealthRecordDoc>(HEALTH_RECORD_COLLECTION)
            .await?
            .range_query(
                "dateOfIllness",
                Some(&range.start),
                Some(&range.end),
                scope_filter(&farm),
            )
            .await?;

        report.insert("health".into(), build_health_stats(&records));
    }

    if includes("feed") {
        let records = state
            .mongo
            .collection::<FeedRecordDoc>(FEED_RECORD_COLLECTION)
            .await?
            .range_query("date", Some(&range.start), Some(&range.end), scope_filter(&farm))
            .await?;

        let total: f64 = records.iter().map(|r| r.quantity).sum();
        report.insert(
            "feed".into(),
            json!({
                "totalQuantity": total,
                "totalRecords": records.len(),
                "feedTypeBreakdown": breakdown_by_key(
                    &records,
                    |r| Some(r.feed_type.clone()),
                    |r| r.quantity,
                ),
            }),
        );
    }

    Ok(ok_data(json!({ "customReport": report })))
}

fn explicit_range(params: &std::collections::HashMap<String, String>) -> Result<DateRange> {
    Ok(DateRange {
        start: required_date_param(params, "startDate")?,
        end: required_date_param(params, "endDate")?,
    })
}

fn required_date_param(
    params: &std::collections::HashMap<String, String>,
    name: &str,
) -> Result<String> {
    let value = params
        .get(name)
        .ok_or_else(|| FarmgateError::Validation(format!("{} is required", name)))?;
    require_date(value, name)
}
