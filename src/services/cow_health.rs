//! Cow health status derivation
//!
//! The cow's health snapshot is recomputed from its full unresolved-record
//! set after every health-record write or delete. Latest unresolved record
//! wins; no unresolved records means healthy.

use bson::{doc, oid::ObjectId, Bson};
use tracing::warn;

use crate::db::schemas::{
    CowDoc, HealthRecordDoc, HealthStatus, COW_COLLECTION, HEALTH_RECORD_COLLECTION,
};
use crate::db::MongoClient;
use crate::stats::dates::today;
use crate::types::Result;

/// Derive the status from the unresolved records alone
pub fn derive_health_status(unresolved: &[HealthRecordDoc]) -> HealthStatus {
    let latest = unresolved
        .iter()
        .max_by(|a, b| a.date_of_illness.cmp(&b.date_of_illness));

    match latest {
        Some(record) => HealthStatus {
            current_condition: "sick".to_string(),
            current_illness: Some(record.disease.clone()),
            last_checkup: Some(today().format("%Y-%m-%d").to_string()),
        },
        None => HealthStatus {
            current_condition: "healthy".to_string(),
            current_illness: None,
            last_checkup: Some(today().format("%Y-%m-%d").to_string()),
        },
    }
}

async fn recompute(mongo: &MongoClient, cow_id: &ObjectId) -> Result<()> {
    let unresolved = mongo
        .collection::<HealthRecordDoc>(HEALTH_RECORD_COLLECTION)
        .await?
        .find_many(doc! { "cowId": cow_id.to_hex(), "isResolved": false })
        .await?;

    let status = derive_health_status(&unresolved);

    mongo
        .collection::<CowDoc>(COW_COLLECTION)
        .await?
        .update_one(
            doc! { "_id": *cow_id },
            doc! {
                "healthStatus": {
                    "currentCondition": &status.current_condition,
                    "currentIllness": status
                        .current_illness
                        .as_deref()
                        .map(|s| Bson::String(s.to_string()))
                        .unwrap_or(Bson::Null),
                    "lastCheckup": status
                        .last_checkup
                        .as_deref()
                        .map(|s| Bson::String(s.to_string()))
                        .unwrap_or(Bson::Null),
                },
            },
        )
        .await?;

    Ok(())
}

/// Refresh a cow's derived health status, swallowing failures
pub async fn update_cow_health_status(mongo: &MongoClient, cow_id: &ObjectId) {
    if let Err(e) = recompute(mongo, cow_id).await {
        warn!(cow = %cow_id, "Failed to update cow health status: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::Metadata;

    fn case(date: &str, disease: &str) -> HealthRecordDoc {
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
            treatment: "antibiotics".into(),
            medicine_used: "penstrep".into(),
            dosage: None,
            cost: 1000.0,
            vet_name: "Dr. Otieno".into(),
            vet_contact: "0712000000".into(),
            date_of_treatment: None,
            follow_up_date: None,
            follow_up_notes: None,
            notes: None,
            is_resolved: false,
            recorded_by: "tester".into(),
        }
    }

    #[test]
    fn test_latest_unresolved_wins() {
        let records = vec![
            case("2024-01-05", "foot rot"),
            case("2024-02-01", "mastitis"),
            case("2024-01-20", "east coast fever"),
        ];

        let status = derive_health_status(&records);
        assert_eq!(status.current_condition, "sick");
        assert_eq!(status.current_illness.as_deref(), Some("mastitis"));
    }

    #[test]
    fn test_no_unresolved_means_healthy() {
        let status = derive_health_status(&[]);
        assert_eq!(status.current_condition, "healthy");
        assert!(status.current_illness.is_none());
        assert!(status.last_checkup.is_some());
    }
}
