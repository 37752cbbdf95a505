//! Cow milk running totals
//!
//! Recomputed in full from the cow's milk records after every write or
//! delete. The totals are a cache: a failure here is logged and never
//! surfaced to the caller of the triggering write.

use bson::{doc, oid::ObjectId, Bson};
use tracing::warn;

use crate::db::schemas::{CowDoc, MilkRecordDoc, COW_COLLECTION, MILK_RECORD_COLLECTION};
use crate::db::MongoClient;
use crate::stats::engine::{daily_totals, round2};
use crate::types::Result;

/// Totals derived from a cow's full milk history
#[derive(Debug, Clone, PartialEq)]
pub struct MilkTotals {
    pub total_produced: f64,
    pub average_daily: f64,
    pub last_milking_date: Option<String>,
}

/// Derive totals from records: grand total, total divided by the number of
/// distinct calendar days (2 decimals), and the latest date seen.
pub fn compute_milk_totals(records: &[MilkRecordDoc]) -> MilkTotals {
    if records.is_empty() {
        return MilkTotals {
            total_produced: 0.0,
            average_daily: 0.0,
            last_milking_date: None,
        };
    }

    let total: f64 = records.iter().map(|r| r.quantity).sum();
    let daily = daily_totals(records, |r| r.date.as_str(), |r| r.quantity);
    let average_daily = round2(total / daily.len() as f64);
    let last_milking_date = records.iter().map(|r| r.date.clone()).max();

    MilkTotals {
        total_produced: total,
        average_daily,
        last_milking_date,
    }
}

async fn recompute(mongo: &MongoClient, cow_id: &ObjectId) -> Result<()> {
    let records = mongo
        .collection::<MilkRecordDoc>(MILK_RECORD_COLLECTION)
        .await?
        .find_many(doc! { "cowId": cow_id.to_hex() })
        .await?;

    let totals = compute_milk_totals(&records);

    mongo
        .collection::<CowDoc>(COW_COLLECTION)
        .await?
        .update_one(
            doc! { "_id": *cow_id },
            doc! {
                "totalMilkProduced": totals.total_produced,
                "averageDailyMilk": totals.average_daily,
                "lastMilkingDate": totals
                    .last_milking_date
                    .map(Bson::String)
                    .unwrap_or(Bson::Null),
            },
        )
        .await?;

    Ok(())
}

/// Refresh a cow's milk totals, swallowing failures
pub async fn update_cow_milk_stats(mongo: &MongoClient, cow_id: &ObjectId) {
    if let Err(e) = recompute(mongo, cow_id).await {
        warn!(cow = %cow_id, "Failed to update cow milk stats: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::Metadata;

    fn record(date: &str, session: &str, quantity: f64) -> MilkRecordDoc {
        MilkRecordDoc {
            id: None,
            metadata: Metadata::default(),
            cow_id: "c1".into(),
            cow_name: "Wanjiru".into(),
            ear_tag_number: None,
            farm_location: "nakuru".into(),
            quantity,
            session: session.into(),
            date: date.into(),
            notes: None,
            recorded_by: "tester".into(),
        }
    }

    #[test]
    fn test_average_over_distinct_days() {
        // Five records across three days: average divides by 3, not 5
        let records = vec![
            record("2024-01-01", "morning", 6.0),
            record("2024-01-01", "evening", 4.0),
            record("2024-01-02", "morning", 7.0),
            record("2024-01-02", "evening", 5.0),
            record("2024-01-03", "morning", 11.0),
        ];

        let totals = compute_milk_totals(&records);
        assert_eq!(totals.total_produced, 33.0);
        assert_eq!(totals.average_daily, 11.0);
        assert_eq!(totals.last_milking_date.as_deref(), Some("2024-01-03"));
    }

    #[test]
    fn test_rounding_to_two_decimals() {
        let records = vec![
            record("2024-01-01", "morning", 10.0),
            record("2024-01-02", "morning", 10.0),
            record("2024-01-03", "morning", 11.0),
        ];

        // 31 / 3 = 10.333... -> 10.33
        let totals = compute_milk_totals(&records);
        assert_eq!(totals.average_daily, 10.33);
    }

    #[test]
    fn test_empty_history_zeroes_out() {
        let totals = compute_milk_totals(&[]);
        assert_eq!(totals.total_produced, 0.0);
        assert_eq!(totals.average_daily, 0.0);
        assert!(totals.last_milking_date.is_none());
    }
}
