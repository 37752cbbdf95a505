//! Veterinary health record routes (admin only)
//!
//! GET    /api/health-records                - paginated listing
//! POST   /api/health-records
//! GET    /api/health-records/stats
//! GET    /api/health-records/vets           - per-veterinarian stats
//! GET    /api/health-records/cow/:cowId
//! GET    /api/health-records/:id
//! PUT    /api/health-records/:id
//! DELETE /api/health-records/:id
//! PUT    /api/health-records/:id/follow-up
//!
//! Writes and deletes trigger a full recompute of the parent cow's derived
//! health status.

use bson::doc;
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::db::schemas::{
    CowDoc, HealthRecordDoc, Metadata, COW_COLLECTION, HEALTH_RECORD_COLLECTION,
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
use crate::stats::engine::{monthly_totals, round2, round_percent};
use crate::types::{FarmgateError, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateHealthRecordRequest {
    pub cow_id: String,
    pub date_of_illness: String,
    pub disease: String,
    #[serde(default)]
    pub symptoms: Option<String>,
    pub treatment: String,
    pub medicine_used: String,
    #[serde(default)]
    pub dosage: Option<String>,
    pub cost: f64,
    pub vet_name: String,
    pub vet_contact: String,
    #[serde(default)]
    pub date_of_treatment: Option<String>,
    #[serde(default)]
    pub follow_up_date: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub is_resolved: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateHealthRecordRequest {
    #[serde(default)]
    pub disease: Option<String>,
    #[serde(default)]
    pub symptoms: Option<String>,
    #[serde(default)]
    pub treatment: Option<String>,
    #[serde(default)]
    pub medicine_used: Option<String>,
    #[serde(default)]
    pub dosage: Option<String>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub vet_name: Option<String>,
    #[serde(default)]
    pub vet_contact: Option<String>,
    #[serde(default)]
    pub date_of_treatment: Option<String>,
    #[serde(default)]
    pub follow_up_date: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub is_resolved: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpRequest {
    pub follow_up_date: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Route /api/health-records/* requests
pub async fn handle_health_record_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let dev_mode = state.args.dev_mode;
    dispatch(req, state).await.unwrap_or_else(|e| error_response(&e, dev_mode))
}

async fn dispatch(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let ctx = resolve_access(&state, &req).await?;
    // The whole module is admin-only; a farmer fails before any data access
    ctx.require_admin()?;

    let path = req
        .uri()
        .path()
        .trim_start_matches("/api/health-records")
        .to_string();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let method = req.method().clone();

    match (method, segments.as_slice()) {
        (Method::GET, []) => list_records(req, &state).await,
        (Method::POST, []) => create_record(req, &state, &ctx).await,
        (Method::GET, ["stats"]) => health_stats(req, &state).await,
        (Method::GET, ["vets"]) => vet_stats(req, &state).await,
        (Method::GET, ["cow", cow_id]) => {
            let cow_id = cow_id.to_string();
            records_by_cow(req, &state, &cow_id).await
        }
        (Method::PUT, [id, "follow-up"]) => {
            let id = id.to_string();
            schedule_follow_up(req, &state, &id).await
        }
        (Method::GET, [id]) => {
            let id = id.to_string();
            get_record(&state, &id).await
        }
        (Method::PUT, [id]) => {
            let id = id.to_string();
            update_record(req, &state, &id).await
        }
        (Method::DELETE, [id]) => {
            let id = id.to_string();
            delete_record(&state, &id).await
        }
        _ => Err(FarmgateError::NotFound(format!(
            "Route not found: /api/health-records{}",
            path
        ))),
    }
}

async fn list_records(req: Request<Incoming>, state: &Arc<AppState>) -> Result<Response<BoxBody>> {
    let params = query_params(&req);
    let page: i64 = params.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let limit = state
        .args
        .clamp_page_size(params.get("limit").and_then(|l| l.parse().ok()));

    let mut filter = doc! {};
    if let Some(farm) = params.get("farmLocation") {
        filter.insert("farmLocation", farm.as_str());
    }
    if let Some(cow_id) = params.get("cowId") {
        filter.insert("cowId", cow_id.as_str());
    }
    if let Some(disease) = params.get("disease") {
        filter.insert("disease", disease.as_str());
    }
    if let Some(vet_name) = params.get("vetName") {
        filter.insert("vetName", vet_name.as_str());
    }

    let page_result = state
        .mongo
        .collection::<HealthRecordDoc>(HEALTH_RECORD_COLLECTION)
        .await?
        .paginate(filter, page, limit, "dateOfIllness", SortDirection::Descending)
        .await?;

    Ok(ok_data(json!({
        "healthRecords": docs_to_json(&page_result.items),
        "pagination": pagination_meta(page, limit, page_result.total_count),
    })))
}

async fn create_record(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    ctx: &crate::auth::AccessContext,
) -> Result<Response<BoxBody>> {
    let body: CreateHealthRecordRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    if body.disease.is_empty() || body.treatment.is_empty() || body.medicine_used.is_empty() {
        return Err(FarmgateError::Validation(
            "Missing required fields: disease, treatment, medicineUsed".into(),
        ));
    }
    if body.cost < 0.0 {
        return Err(FarmgateError::Validation("Cost must not be negative".into()));
    }
    let date_of_illness = require_date(&body.date_of_illness, "dateOfIllness")?;

    let cow_oid = parse_object_id(&body.cow_id)?;
    let cow = state
        .mongo
        .collection::<CowDoc>(COW_COLLECTION)
        .await?
        .find_by_id(&cow_oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Cow not found".into()))?;

    let mut record = HealthRecordDoc {
        id: None,
        metadata: Metadata::new(),
        cow_id: cow_oid.to_hex(),
        cow_name: cow.name.clone(),
        ear_tag_number: cow.ear_tag_number.clone(),
        farm_location: cow.farm_location.clone(),
        date_of_illness,
        disease: sanitize(&body.disease),
        symptoms: body.symptoms.as_deref().map(sanitize),
        treatment: sanitize(&body.treatment),
        medicine_used: sanitize(&body.medicine_used),
        dosage: body.dosage.as_deref().map(sanitize),
        cost: body.cost,
        vet_name: sanitize(&body.vet_name),
        vet_contact: sanitize(&body.vet_contact),
        date_of_treatment: match &body.date_of_treatment {
            Some(d) => Some(require_date(d, "dateOfTreatment")?),
            None => Some(today().format("%Y-%m-%d").to_string()),
        },
        follow_up_date: match &body.follow_up_date {
            Some(d) => Some(require_date(d, "followUpDate")?),
            None => None,
        },
        follow_up_notes: None,
        notes: body.notes.as_deref().map(sanitize),
        is_resolved: body.is_resolved,
        recorded_by: ctx.subject_id.clone(),
    };

    let records = state
        .mongo
        .collection::<HealthRecordDoc>(HEALTH_RECORD_COLLECTION)
        .await?;
    record.id = Some(records.insert_one(record.clone()).await?);

    services::update_cow_health_status(&state.mongo, &cow_oid).await;

    Ok(created(
        json!({ "healthRecord": doc_to_json(&record) }),
        "Health record created successfully",
    ))
}

async fn get_record(state: &Arc<AppState>, id: &str) -> Result<Response<BoxBody>> {
    let oid = parse_object_id(id)?;

    let record = state
        .mongo
        .collection::<HealthRecordDoc>(HEALTH_RECORD_COLLECTION)
        .await?
        .find_by_id(&oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Health record not found".into()))?;

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

    Ok(ok_data(json!({ "healthRecord": value })))
}

async fn update_record(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    id: &str,
) -> Result<Response<BoxBody>> {
    let oid = parse_object_id(id)?;
    let body: UpdateHealthRecordRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    let mut set_fields = doc! {};
    if let Some(disease) = &body.disease {
        set_fields.insert("disease", sanitize(disease));
    }
    if let Some(symptoms) = &body.symptoms {
        set_fields.insert("symptoms", sanitize(symptoms));
    }
    if let Some(treatment) = &body.treatment {
        set_fields.insert("treatment", sanitize(treatment));
    }
    if let Some(medicine_used) = &body.medicine_used {
        set_fields.insert("medicineUsed", sanitize(medicine_used));
    }
    if let Some(dosage) = &body.dosage {
        set_fields.insert("dosage", sanitize(dosage));
    }
    if let Some(cost) = body.cost {
        if cost < 0.0 {
            return Err(FarmgateError::Validation("Cost must not be negative".into()));
        }
        set_fields.insert("cost", cost);
    }
    if let Some(vet_name) = &body.vet_name {
        set_fields.insert("vetName", sanitize(vet_name));
    }
    if let Some(vet_contact) = &body.vet_contact {
        set_fields.insert("vetContact", sanitize(vet_contact));
    }
    if let Some(date_of_treatment) = &body.date_of_treatment {
        set_fields.insert(
            "dateOfTreatment",
            require_date(date_of_treatment, "dateOfTreatment")?,
        );
    }
    if let Some(follow_up_date) = &body.follow_up_date {
        set_fields.insert("followUpDate", require_date(follow_up_date, "followUpDate")?);
    }
    if let Some(notes) = &body.notes {
        set_fields.insert("notes", sanitize(notes));
    }
    if let Some(is_resolved) = body.is_resolved {
        set_fields.insert("isResolved", is_resolved);
    }

    if set_fields.is_empty() {
        return Err(FarmgateError::Validation("No fields to update".into()));
    }

    let records = state
        .mongo
        .collection::<HealthRecordDoc>(HEALTH_RECORD_COLLECTION)
        .await?;

    let result = records.update_one(doc! { "_id": oid }, set_fields).await?;
    if result.matched_count == 0 {
        return Err(FarmgateError::NotFound("Health record not found".into()));
    }

    let record = records
        .find_by_id(&oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Health record not found".into()))?;

    if let Ok(cow_oid) = parse_object_id(&record.cow_id) {
        services::update_cow_health_status(&state.mongo, &cow_oid).await;
    }

    Ok(ok_with_message(
        json!({ "healthRecord": doc_to_json(&record) }),
        "Health record updated successfully",
    ))
}

async fn delete_record(state: &Arc<AppState>, id: &str) -> Result<Response<BoxBody>> {
    let oid = parse_object_id(id)?;

    let records = state
        .mongo
        .collection::<HealthRecordDoc>(HEALTH_RECORD_COLLECTION)
        .await?;

    let record = records
        .find_by_id(&oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Health record not found".into()))?;

    records.delete_one(doc! { "_id": oid }).await?;

    // The deleted record may have been the one keeping the cow marked sick
    if let Ok(cow_oid) = parse_object_id(&record.cow_id) {
        services::update_cow_health_status(&state.mongo, &cow_oid).await;
    }

    Ok(ok_message("Health record deleted successfully"))
}

async fn records_by_cow(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    cow_id: &str,
) -> Result<Response<BoxBody>> {
    let params = query_params(&req);

    let mut filter = doc! { "cowId": cow_id };
    if let Some(is_resolved) = params.get("isResolved") {
        filter.insert("isResolved", is_resolved == "true");
    }

    let mut items = state
        .mongo
        .collection::<HealthRecordDoc>(HEALTH_RECORD_COLLECTION)
        .await?
        .range_query(
            "dateOfIllness",
            params.get("startDate").map(|s| s.as_str()),
            params.get("endDate").map(|s| s.as_str()),
            filter,
        )
        .await?;

    items.sort_by(|a, b| b.date_of_illness.cmp(&a.date_of_illness));

    Ok(ok_data(json!({ "healthRecords": docs_to_json(&items) })))
}

async fn schedule_follow_up(
    req: Request<Incoming>,
    state: &Arc<AppState>,
    id: &str,
) -> Result<Response<BoxBody>> {
    let oid = parse_object_id(id)?;
    let body: FollowUpRequest = parse_json_body(req, state.args.max_body_bytes).await?;

    let mut set_fields = doc! {
        "followUpDate": require_date(&body.follow_up_date, "followUpDate")?,
    };
    if let Some(notes) = &body.notes {
        set_fields.insert("followUpNotes", sanitize(notes));
    }

    let records = state
        .mongo
        .collection::<HealthRecordDoc>(HEALTH_RECORD_COLLECTION)
        .await?;

    let result = records.update_one(doc! { "_id": oid }, set_fields).await?;
    if result.matched_count == 0 {
        return Err(FarmgateError::NotFound("Health record not found".into()));
    }

    let record = records
        .find_by_id(&oid)
        .await?
        .ok_or_else(|| FarmgateError::NotFound("Health record not found".into()))?;

    Ok(ok_with_message(
        json!({ "healthRecord": doc_to_json(&record) }),
        "Follow-up scheduled successfully",
    ))
}

async fn health_stats(req: Request<Incoming>, state: &Arc<AppState>) -> Result<Response<BoxBody>> {
    let params = query_params(&req);

    let mut filter = doc! {};
    if let Some(farm) = params.get("farmLocation") {
        filter.insert("farmLocation", farm.as_str());
    }

    let range = match (params.get("startDate"), params.get("endDate")) {
        (Some(start), Some(end)) => crate::stats::DateRange {
            start: require_date(start, "startDate")?,
            end: require_date(end, "endDate")?,
        },
        _ => period_range(
            params.get("period").map(|s| s.as_str()).unwrap_or("monthly"),
            today(),
        ),
    };

    let records = state
        .mongo
        .collection::<HealthRecordDoc>(HEALTH_RECORD_COLLECTION)
        .await?
        .range_query("dateOfIllness", Some(&range.start), Some(&range.end), filter)
        .await?;

    Ok(ok_data(json!({ "stats": build_health_stats(&records) })))
}

/// Case/cost roll-up with disease, medicine, vet, and monthly breakdowns
pub fn build_health_stats(records: &[HealthRecordDoc]) -> Value {
    let resolved = records.iter().filter(|r| r.is_resolved).count();
    let total_cost: f64 = records.iter().map(|r| r.cost).sum();

    #[derive(Default, serde::Serialize)]
    struct CaseTotals {
        count: u64,
        cost: f64,
        resolved: u64,
    }

    let mut disease_breakdown: BTreeMap<String, CaseTotals> = BTreeMap::new();
    let mut medicine_breakdown: BTreeMap<String, CaseTotals> = BTreeMap::new();
    let mut vet_breakdown: BTreeMap<String, CaseTotals> = BTreeMap::new();

    for record in records {
        for (map, key) in [
            (&mut disease_breakdown, record.disease.clone()),
            (&mut medicine_breakdown, record.medicine_used.clone()),
            (&mut vet_breakdown, record.vet_name.clone()),
        ] {
            let key = if key.is_empty() { "Unknown".to_string() } else { key };
            let entry = map.entry(key).or_default();
            entry.count += 1;
            entry.cost += record.cost;
            if record.is_resolved {
                entry.resolved += 1;
            }
        }
    }

    let monthly_costs = monthly_totals(records, |r| r.date_of_illness.as_str(), |r| r.cost);

    let average_cost = if records.is_empty() {
        0.0
    } else {
        round2(total_cost / records.len() as f64)
    };
    let resolution_rate = if records.is_empty() {
        0.0
    } else {
        round_percent(resolved as f64 / records.len() as f64 * 100.0)
    };

    json!({
        "totalRecords": records.len(),
        "resolvedCases": resolved,
        "unresolvedCases": records.len() - resolved,
        "totalCost": total_cost,
        "diseaseBreakdown": disease_breakdown,
        "medicineBreakdown": medicine_breakdown,
        "vetBreakdown": vet_breakdown,
        "monthlyBreakdown": monthly_costs,
        "averageCostPerCase": average_cost,
        "resolutionRate": resolution_rate,
    })
}

async fn vet_stats(req: Request<Incoming>, state: &Arc<AppState>) -> Result<Response<BoxBody>> {
    let params = query_params(&req);

    let mut filter = doc! {};
    if let Some(farm) = params.get("farmLocation") {
        filter.insert("farmLocation", farm.as_str());
    }

    let records = state
        .mongo
        .collection::<HealthRecordDoc>(HEALTH_RECORD_COLLECTION)
        .await?
        .range_query(
            "dateOfIllness",
            params.get("startDate").map(|s| s.as_str()),
            params.get("endDate").map(|s| s.as_str()),
            filter,
        )
        .await?;

    Ok(ok_data(json!({
        "veterinarianStats": build_vet_stats(&records)
    })))
}

/// Per-veterinarian aggregate: case counts, costs, diseases handled,
/// resolution rate, last visit
pub fn build_vet_stats(records: &[HealthRecordDoc]) -> Vec<Value> {
    struct VetAccum {
        contact: String,
        total_cases: u64,
        resolved_cases: u64,
        total_cost: f64,
        diseases: std::collections::BTreeSet<String>,
        last_visit: String,
    }

    let mut vets: BTreeMap<String, VetAccum> = BTreeMap::new();

    for record in records {
        let entry = vets.entry(record.vet_name.clone()).or_insert_with(|| VetAccum {
            contact: record.vet_contact.clone(),
            total_cases: 0,
            resolved_cases: 0,
            total_cost: 0.0,
            diseases: Default::default(),
            last_visit: record.date_of_illness.clone(),
        });

        entry.total_cases += 1;
        if record.is_resolved {
            entry.resolved_cases += 1;
        }
        entry.total_cost += record.cost;
        entry.diseases.insert(record.disease.clone());
        if record.date_of_illness > entry.last_visit {
            entry.last_visit = record.date_of_illness.clone();
        }
    }

    vets.into_iter()
        .map(|(name, vet)| {
            let average = round2(vet.total_cost / vet.total_cases as f64);
            let rate = round_percent(vet.resolved_cases as f64 / vet.total_cases as f64 * 100.0);
            json!({
                "name": name,
                "contact": vet.contact,
                "totalCases": vet.total_cases,
                "resolvedCases": vet.resolved_cases,
                "totalCost": vet.total_cost,
                "diseasesHandled": vet.diseases,
                "averageCostPerCase": average,
                "resolutionRate": rate,
                "lastVisit": vet.last_visit,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(vet: &str, disease: &str, date: &str, cost: f64, resolved: bool) -> HealthRecordDoc {
        HealthRecordDoc {
            id: None,
            metadata: Metadata::default(),
            cow_id: "c1".into(),
            cow_name: "Wanjiru".into(),
            ear_tag_number: None,
            farm_location: "nakuru".into(),
            date_of_illness: date.into(),
            disease: disease.into(),
            symptoms: None,
            treatment: "treatment".into(),
            medicine_used: "penstrep".into(),
            dosage: None,
            cost,
            vet_name: vet.into(),
            vet_contact: "0712000000".into(),
            date_of_treatment: None,
            follow_up_date: None,
            follow_up_notes: None,
            notes: None,
            is_resolved: resolved,
            recorded_by: "tester".into(),
        }
    }

    #[test]
    fn test_health_stats_roll_up() {
        let records = vec![
            case("Dr. Otieno", "mastitis", "2024-01-10", 1000.0, true),
            case("Dr. Otieno", "foot rot", "2024-01-20", 500.0, false),
            case("Dr. Achieng", "mastitis", "2024-02-05", 1500.0, true),
        ];

        let stats = build_health_stats(&records);
        assert_eq!(stats["totalRecords"], 3);
        assert_eq!(stats["resolvedCases"], 2);
        assert_eq!(stats["unresolvedCases"], 1);
        assert_eq!(stats["totalCost"], 3000.0);
        assert_eq!(stats["averageCostPerCase"], 1000.0);
        // 2/3 resolved -> whole-percent 67
        assert_eq!(stats["resolutionRate"], 67.0);
        assert_eq!(stats["diseaseBreakdown"]["mastitis"]["count"], 2);
        assert_eq!(stats["monthlyBreakdown"]["2024-01"], 1500.0);
    }

    #[test]
    fn test_vet_stats() {
        let records = vec![
            case("Dr. Otieno", "mastitis", "2024-01-10", 1000.0, true),
            case("Dr. Otieno", "foot rot", "2024-03-01", 500.0, false),
        ];

        let vets = build_vet_stats(&records);
        assert_eq!(vets.len(), 1);
        let vet = &vets[0];
        assert_eq!(vet["name"], "Dr. Otieno");
        assert_eq!(vet["totalCases"], 2);
        assert_eq!(vet["resolvedCases"], 1);
        assert_eq!(vet["resolutionRate"], 50.0);
        assert_eq!(vet["lastVisit"], "2024-03-01");
        assert_eq!(vet["averageCostPerCase"], 750.0);
    }

    #[test]
    fn test_empty_records_no_division_error() {
        let stats = build_health_stats(&[]);
        assert_eq!(stats["averageCostPerCase"], 0.0);
        assert_eq!(stats["resolutionRate"], 0.0);
        assert!(build_vet_stats(&[]).is_empty());
    }
}
