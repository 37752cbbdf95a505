//! Database schemas for Farmgate
//!
//! MongoDB document structures for users, farms, livestock, production
//! records, health logs, and feed inventory.

mod chicken;
mod cow;
mod credential;
mod farm;
mod health;
mod inventory;
mod metadata;
mod production;
mod user;

pub use chicken::{
    ChickenBatchDoc, CountChangeDoc, FeedConsumption, ProductionStats,
    CHICKEN_BATCH_COLLECTION, COUNT_CHANGE_COLLECTION, DEFAULT_BATCH_LIFESPAN_DAYS,
    DEFAULT_EGG_PRODUCTION_AGE_DAYS,
};
pub use cow::{CowDoc, HealthStatus, PregnancyStatus, COW_COLLECTION};
pub use credential::{CredentialDoc, CREDENTIAL_COLLECTION};
pub use farm::{FarmDoc, FARM_COLLECTION};
pub use health::{HealthRecordDoc, HEALTH_RECORD_COLLECTION};
pub use inventory::{FeedInventoryDoc, FEED_INVENTORY_COLLECTION};
pub use metadata::Metadata;
pub use production::{
    ChickenFeedRecordDoc, EggRecordDoc, FeedRecordDoc, MilkRecordDoc, MilkSaleDoc,
    CHICKEN_FEED_RECORD_COLLECTION, EGG_RECORD_COLLECTION, FEED_RECORD_COLLECTION,
    MILK_RECORD_COLLECTION, MILK_SALE_COLLECTION,
};
pub use user::{UserDoc, USER_COLLECTION};
