//! Derived-stat recompute hooks and cross-store operations
//!
//! Every function here is fired synchronously after a primary write and
//! swallows its own failures: derived fields are caches, staleness is
//! acceptable, failing the triggering write is not.

pub mod batch_stats;
pub mod cow_health;
pub mod cow_stats;
pub mod provisioning;

pub use batch_stats::{update_batch_egg_stats, update_batch_feed_stats};
pub use cow_health::update_cow_health_status;
pub use cow_stats::update_cow_milk_stats;
pub use provisioning::deprovision_user;
