//! Statistics subsystem
//!
//! Pure, synchronous aggregation over records the route layer has already
//! fetched. The engine never touches the store.

pub mod dates;
pub mod engine;
pub mod financial;

pub use dates::{period_range, DateRange};
pub use engine::{
    breakdown_by_key, change_percent, count_by_key, daily_totals, monthly_totals,
    period_summary, production_summary, top_n, trend, weekly_totals, GroupTotals,
    PeriodSummary, ProductionSummary, Trend, TREND_THRESHOLD_PERCENT,
};
pub use financial::{financial_rollup, FinancialStats};
