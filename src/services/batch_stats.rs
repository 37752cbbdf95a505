//! Chicken batch derived stats
//!
//! Egg totals, feed consumption, and the started-laying latch, recomputed
//! in full after each egg or feed write. Failures are logged, never
//! propagated.

use bson::{doc, oid::ObjectId};
use tracing::warn;

use crate::db::schemas::{
    ChickenBatchDoc, ChickenFeedRecordDoc, EggRecordDoc, CHICKEN_BATCH_COLLECTION,
    CHICKEN_FEED_RECORD_COLLECTION, EGG_RECORD_COLLECTION,
};
use crate::db::MongoClient;
use crate::stats::dates::days_since;
use crate::stats::engine::round2;
use crate::types::Result;

/// Average per day since acquisition, 2 decimals, at least one day elapsed
pub fn average_per_day_since(total: f64, date_acquired: &str) -> f64 {
    round2(total / days_since(date_acquired) as f64)
}

/// The started-laying date is the earliest egg record, latched once:
/// an existing value always wins.
pub fn started_laying_date(
    existing: Option<&str>,
    egg_records: &[EggRecordDoc],
) -> Option<String> {
    if let Some(date) = existing {
        return Some(date.to_string());
    }
    egg_records.iter().map(|r| r.date.clone()).min()
}

async fn recompute_eggs(mongo: &MongoClient, batch_id: &ObjectId) -> Result<()> {
    let batches = mongo
        .collection::<ChickenBatchDoc>(CHICKEN_BATCH_COLLECTION)
        .await?;

    let Some(batch) = batches.find_by_id(batch_id).await? else {
        return Ok(());
    };

    let egg_records = mongo
        .collection::<EggRecordDoc>(EGG_RECORD_COLLECTION)
        .await?
        .find_many(doc! { "batchId": batch_id.to_hex() })
        .await?;

    let total_eggs: f64 = egg_records.iter().map(|r| r.quantity).sum();
    let average = average_per_day_since(total_eggs, &batch.date_acquired);
    let started = started_laying_date(
        batch.production_stats.started_laying_date.as_deref(),
        &egg_records,
    );

    let mut production_stats = doc! { "averageEggsPerDay": average };
    if let Some(date) = started {
        production_stats.insert("startedLayingDate", date);
    }

    batches
        .update_one(
            doc! { "_id": *batch_id },
            doc! {
                "totalEggsProduced": total_eggs,
                "productionStats": production_stats,
            },
        )
        .await?;

    Ok(())
}

async fn recompute_feed(mongo: &MongoClient, batch_id: &ObjectId) -> Result<()> {
    let batches = mongo
        .collection::<ChickenBatchDoc>(CHICKEN_BATCH_COLLECTION)
        .await?;

    let Some(batch) = batches.find_by_id(batch_id).await? else {
        return Ok(());
    };

    let feed_records = mongo
        .collection::<ChickenFeedRecordDoc>(CHICKEN_FEED_RECORD_COLLECTION)
        .await?
        .find_many(doc! { "batchId": batch_id.to_hex() })
        .await?;

    let total: f64 = feed_records.iter().map(|r| r.quantity).sum();
    let average = average_per_day_since(total, &batch.date_acquired);

    batches
        .update_one(
            doc! { "_id": *batch_id },
            doc! {
                "feedConsumption": {
                    "totalQuantity": total,
                    "averagePerDay": average,
                },
            },
        )
        .await?;

    Ok(())
}

/// Refresh a batch's egg production stats, swallowing failures
pub async fn update_batch_egg_stats(mongo: &MongoClient, batch_id: &ObjectId) {
    if let Err(e) = recompute_eggs(mongo, batch_id).await {
        warn!(batch = %batch_id, "Failed to update batch egg stats: {}", e);
    }
}

/// Refresh a batch's feed consumption stats, swallowing failures
pub async fn update_batch_feed_stats(mongo: &MongoClient, batch_id: &ObjectId) {
    if let Err(e) = recompute_feed(mongo, batch_id).await {
        warn!(batch = %batch_id, "Failed to update batch feed stats: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::Metadata;

    fn egg(date: &str) -> EggRecordDoc {
        EggRecordDoc {
            id: None,
            metadata: Metadata::default(),
            batch_id: "b1".into(),
            batch_name: "CHICK_1".into(),
            farm_location: "nakuru".into(),
            quantity: 40.0,
            date: date.into(),
            notes: None,
            recorded_by: "tester".into(),
        }
    }

    #[test]
    fn test_started_laying_latches_first_value() {
        let records = vec![egg("2024-02-10"), egg("2024-02-01"), egg("2024-02-05")];

        // No existing value: earliest record wins
        assert_eq!(
            started_laying_date(None, &records).as_deref(),
            Some("2024-02-01")
        );

        // Existing value is never replaced, even by an earlier record
        assert_eq!(
            started_laying_date(Some("2024-03-01"), &records).as_deref(),
            Some("2024-03-01")
        );

        assert!(started_laying_date(None, &[]).is_none());
    }

    #[test]
    fn test_average_per_day_floors_at_one_day() {
        // Acquired today: divide by 1, not 0
        let today = crate::stats::dates::today().format("%Y-%m-%d").to_string();
        assert_eq!(average_per_day_since(40.0, &today), 40.0);
    }
}
