//! Advisory alert generation
//!
//! Scans current state within the requester's farm scope and emits one
//! notice per triggered condition. Zero-count conditions stay silent. A
//! failing check is logged and skipped; the remaining checks still run.
//! Order is fixed: low milk, unresolved health (admin), restock (admin),
//! aging batches.

use bson::{doc, Document};
use serde::Serialize;
use tracing::warn;

use crate::db::schemas::{
    ChickenBatchDoc, CowDoc, FeedInventoryDoc, HealthRecordDoc, CHICKEN_BATCH_COLLECTION,
    COW_COLLECTION, FEED_INVENTORY_COLLECTION, HEALTH_RECORD_COLLECTION,
};
use crate::db::MongoClient;
use crate::stats::dates::days_since;
use crate::types::Result;

/// Daily-average threshold below which a cow counts as a low producer
pub const LOW_MILK_ALERT_LITRES: f64 = 5.0;

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub title: String,
    pub message: String,
    pub count: u64,
}

fn scope_filter(farm: Option<&str>) -> Document {
    match farm {
        Some(location) => doc! { "farmLocation": location },
        None => Document::new(),
    }
}

/// Run all applicable checks. Admin-only checks (unresolved health, feed
/// restock) are skipped entirely for farmers.
pub async fn generate_alerts(mongo: &MongoClient, farm: Option<&str>, is_admin: bool) -> Vec<Alert> {
    let mut alerts = Vec::new();

    match check_low_producers(mongo, farm).await {
        Ok(Some(alert)) => alerts.push(alert),
        Ok(None) => {}
        Err(e) => warn!("Low-producer alert check failed: {}", e),
    }

    if is_admin {
        match check_unresolved_health(mongo, farm).await {
            Ok(Some(alert)) => alerts.push(alert),
            Ok(None) => {}
            Err(e) => warn!("Unresolved-health alert check failed: {}", e),
        }

        match check_restock(mongo, farm).await {
            Ok(Some(alert)) => alerts.push(alert),
            Ok(None) => {}
            Err(e) => warn!("Restock alert check failed: {}", e),
        }
    }

    match check_aging_batches(mongo, farm).await {
        Ok(Some(alert)) => alerts.push(alert),
        Ok(None) => {}
        Err(e) => warn!("Aging-batch alert check failed: {}", e),
    }

    alerts
}

async fn check_low_producers(mongo: &MongoClient, farm: Option<&str>) -> Result<Option<Alert>> {
    let mut filter = scope_filter(farm);
    filter.insert("isActive", true);

    let cows = mongo
        .collection::<CowDoc>(COW_COLLECTION)
        .await?
        .find_many(filter)
        .await?;

    Ok(low_producer_alert(&cows))
}

async fn check_unresolved_health(mongo: &MongoClient, farm: Option<&str>) -> Result<Option<Alert>> {
    let mut filter = scope_filter(farm);
    filter.insert("isResolved", false);

    let count = mongo
        .collection::<HealthRecordDoc>(HEALTH_RECORD_COLLECTION)
        .await?
        .count(filter)
        .await?;

    Ok(unresolved_health_alert(count))
}

async fn check_restock(mongo: &MongoClient, farm: Option<&str>) -> Result<Option<Alert>> {
    let mut filter = scope_filter(farm);
    filter.insert("needsRestock", true);

    let count = mongo
        .collection::<FeedInventoryDoc>(FEED_INVENTORY_COLLECTION)
        .await?
        .count(filter)
        .await?;

    Ok(restock_alert(count))
}

async fn check_aging_batches(mongo: &MongoClient, farm: Option<&str>) -> Result<Option<Alert>> {
    let mut filter = scope_filter(farm);
    filter.insert("isActive", true);

    let batches = mongo
        .collection::<ChickenBatchDoc>(CHICKEN_BATCH_COLLECTION)
        .await?
        .find_many(filter)
        .await?;

    Ok(aging_batch_alert(&batches))
}

// Pure classifiers, separated from the fetches so the policies are testable
// without a store.

fn low_producer_alert(cows: &[CowDoc]) -> Option<Alert> {
    let count = cows
        .iter()
        .filter(|c| c.average_daily_milk < LOW_MILK_ALERT_LITRES)
        .count() as u64;

    (count > 0).then(|| Alert {
        alert_type: AlertType::Warning,
        title: "Low Milk Production".to_string(),
        message: format!(
            "{} cows are producing less than {}L milk per day",
            count, LOW_MILK_ALERT_LITRES
        ),
        count,
    })
}

fn unresolved_health_alert(count: u64) -> Option<Alert> {
    (count > 0).then(|| Alert {
        alert_type: AlertType::Error,
        title: "Unresolved Health Issues".to_string(),
        message: format!("{} health issues need attention", count),
        count,
    })
}

fn restock_alert(count: u64) -> Option<Alert> {
    (count > 0).then(|| Alert {
        alert_type: AlertType::Warning,
        title: "Feed Restock Needed".to_string(),
        message: format!("{} feed items need restocking", count),
        count,
    })
}

fn aging_batch_alert(batches: &[ChickenBatchDoc]) -> Option<Alert> {
    let count = batches
        .iter()
        .filter(|b| days_since(&b.date_acquired) > b.expected_lifespan)
        .count() as u64;

    (count > 0).then(|| Alert {
        alert_type: AlertType::Info,
        title: "Aging Chicken Batches".to_string(),
        message: format!("{} chicken batches are past expected lifespan", count),
        count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{FeedConsumption, Metadata, ProductionStats};

    fn cow(average_daily_milk: f64) -> CowDoc {
        CowDoc {
            id: None,
            metadata: Metadata::default(),
            name: "Wanjiru".into(),
            breed: "Friesian".into(),
            date_of_birth: "2020-01-01".into(),
            farm_location: "nakuru".into(),
            mother_id: None,
            father_id: None,
            ear_tag_number: None,
            current_stage: "lactating".into(),
            description: None,
            image_url: None,
            purchase_date: None,
            purchase_price: None,
            vendor: None,
            pregnancy_status: Default::default(),
            health_status: Default::default(),
            total_milk_produced: 0.0,
            average_daily_milk,
            last_milking_date: None,
            is_active: true,
        }
    }

    fn batch(date_acquired: &str, expected_lifespan: i64) -> ChickenBatchDoc {
        ChickenBatchDoc {
            id: None,
            metadata: Metadata::default(),
            batch_id: "CHICK_1".into(),
            initial_count: 100,
            current_count: 100,
            date_acquired: date_acquired.into(),
            farm_location: "nakuru".into(),
            breed: None,
            cost: None,
            supplier: None,
            description: None,
            expected_egg_production_age: 150,
            expected_lifespan,
            total_eggs_produced: 0.0,
            total_deaths: 0,
            total_hatched: 0,
            feed_consumption: FeedConsumption::default(),
            production_stats: ProductionStats::default(),
            is_active: true,
        }
    }

    #[test]
    fn test_low_producer_threshold() {
        let cows = vec![cow(4.9), cow(5.0), cow(12.0)];
        let alert = low_producer_alert(&cows).unwrap();
        assert_eq!(alert.count, 1);
        assert_eq!(alert.alert_type, AlertType::Warning);

        // No cows under the threshold, no alert
        assert!(low_producer_alert(&[cow(5.0), cow(8.0)]).is_none());
    }

    #[test]
    fn test_zero_count_conditions_stay_silent() {
        assert!(unresolved_health_alert(0).is_none());
        assert!(restock_alert(0).is_none());
        assert!(low_producer_alert(&[]).is_none());
        assert!(aging_batch_alert(&[]).is_none());
    }

    #[test]
    fn test_unresolved_health_severity() {
        let alert = unresolved_health_alert(3).unwrap();
        assert_eq!(alert.alert_type, AlertType::Error);
        assert_eq!(alert.count, 3);
        assert!(alert.message.contains('3'));
    }

    #[test]
    fn test_aging_batch_uses_lifespan() {
        // Acquired long ago with default lifespan: past it
        let old = batch("2020-01-01", 365);
        // Same acquisition date but a very long lifespan: still fine
        let long_lived = batch("2020-01-01", 36500);

        let alert = aging_batch_alert(&[old, long_lived]).unwrap();
        assert_eq!(alert.count, 1);
        assert_eq!(alert.alert_type, AlertType::Info);
    }
}
