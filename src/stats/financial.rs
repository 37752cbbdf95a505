//! Financial roll-up
//!
//! Revenue from milk sales; expenses from feed purchases (inventory price
//! plus transport at purchase, not consumption-weighted) and health-record
//! costs. Margin is reported as a whole percent and forced to 0 when
//! revenue is 0.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::db::schemas::{FeedInventoryDoc, HealthRecordDoc, MilkSaleDoc};
use crate::stats::engine::{monthly_totals, round_percent};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Revenue {
    pub milk_sales: f64,
    pub total_transactions: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Expenses {
    pub feed_costs: f64,
    pub health_costs: f64,
    pub total_feed_items: u64,
    pub total_health_records: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profitability {
    pub gross_revenue: f64,
    pub total_expenses: f64,
    pub net_profit: f64,
    pub profit_margin: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialBreakdown {
    pub milk_sales_by_month: BTreeMap<String, f64>,
    pub feed_costs_by_month: BTreeMap<String, f64>,
    pub health_costs_by_month: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialStats {
    pub revenue: Revenue,
    pub expenses: Expenses,
    pub profitability: Profitability,
    pub breakdown: FinancialBreakdown,
}

/// Compute the full financial picture from already-fetched records
pub fn financial_rollup(
    sales: &[MilkSaleDoc],
    inventory: &[FeedInventoryDoc],
    health_records: &[HealthRecordDoc],
) -> FinancialStats {
    let gross_revenue: f64 = sales.iter().map(|s| s.total_amount).sum();
    let feed_costs: f64 = inventory
        .iter()
        .map(|i| i.purchase_price + i.transport_cost)
        .sum();
    let health_costs: f64 = health_records.iter().map(|h| h.cost).sum();

    let total_expenses = feed_costs + health_costs;
    let net_profit = gross_revenue - total_expenses;
    let profit_margin = if gross_revenue > 0.0 {
        round_percent((net_profit / gross_revenue) * 100.0)
    } else {
        0.0
    };

    FinancialStats {
        revenue: Revenue {
            milk_sales: gross_revenue,
            total_transactions: sales.len() as u64,
        },
        expenses: Expenses {
            feed_costs,
            health_costs,
            total_feed_items: inventory.len() as u64,
            total_health_records: health_records.len() as u64,
        },
        profitability: Profitability {
            gross_revenue,
            total_expenses,
            net_profit,
            profit_margin,
        },
        breakdown: FinancialBreakdown {
            milk_sales_by_month: monthly_totals(sales, |s| s.date.as_str(), |s| s.total_amount),
            feed_costs_by_month: monthly_totals(
                inventory,
                |i| i.purchase_date.as_str(),
                |i| i.purchase_price + i.transport_cost,
            ),
            health_costs_by_month: monthly_totals(
                health_records,
                |h| h.date_of_illness.as_str(),
                |h| h.cost,
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::Metadata;

    fn sale(date: &str, amount: f64) -> MilkSaleDoc {
        MilkSaleDoc {
            id: None,
            metadata: Metadata::default(),
            farm_location: "nakuru".into(),
            quantity: amount / 50.0,
            price_per_litre: 50.0,
            total_amount: amount,
            buyer: None,
            date: date.into(),
            notes: None,
            recorded_by: "tester".into(),
        }
    }

    fn inventory_item(date: &str, price: f64, transport: f64) -> FeedInventoryDoc {
        FeedInventoryDoc {
            id: None,
            metadata: Metadata::default(),
            farm_location: "nakuru".into(),
            feed_type: "dairy_meal".into(),
            sub_type: None,
            quantity: 100.0,
            unit: "kg".into(),
            purchase_date: date.into(),
            purchase_price: price,
            transport_cost: transport,
            supplier: None,
            expiry_date: None,
            notes: None,
            current_stock: 100.0,
            needs_restock: false,
            is_active: true,
            recorded_by: "tester".into(),
        }
    }

    fn health_case(date: &str, cost: f64) -> HealthRecordDoc {
        HealthRecordDoc {
            id: None,
            metadata: Metadata::default(),
            cow_id: "c1".into(),
            cow_name: "Wanjiru".into(),
            ear_tag_number: None,
            farm_location: "nakuru".into(),
            date_of_illness: date.into(),
            disease: "mastitis".into(),
            symptoms: None,
            treatment: "antibiotics".into(),
            medicine_used: "penstrep".into(),
            dosage: None,
            cost,
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
    fn test_rollup_scenario() {
        // Feed 5000, health 1200, sales 9000 -> profit 2800, margin 31
        let sales = vec![sale("2024-01-10", 4000.0), sale("2024-02-10", 5000.0)];
        let inventory = vec![inventory_item("2024-01-05", 4500.0, 500.0)];
        let health = vec![health_case("2024-01-20", 1200.0)];

        let stats = financial_rollup(&sales, &inventory, &health);
        assert_eq!(stats.profitability.gross_revenue, 9000.0);
        assert_eq!(stats.profitability.total_expenses, 6200.0);
        assert_eq!(stats.profitability.net_profit, 2800.0);
        assert_eq!(stats.profitability.profit_margin, 31.0);

        assert_eq!(stats.revenue.total_transactions, 2);
        assert_eq!(stats.expenses.total_feed_items, 1);
        assert_eq!(stats.breakdown.milk_sales_by_month["2024-01"], 4000.0);
        assert_eq!(stats.breakdown.milk_sales_by_month["2024-02"], 5000.0);
    }

    #[test]
    fn test_zero_revenue_margin_is_zero() {
        let stats = financial_rollup(&[], &[inventory_item("2024-01-05", 100.0, 0.0)], &[]);
        assert_eq!(stats.profitability.gross_revenue, 0.0);
        assert_eq!(stats.profitability.net_profit, -100.0);
        assert_eq!(stats.profitability.profit_margin, 0.0);
    }
}
