//! Farmgate - HTTP record-keeping gateway for mixed dairy/poultry farms
//!
//! A thin, role-scoped layer over MongoDB: CRUD for livestock and
//! production records, an in-memory statistics engine, and advisory
//! alerts, fronted by a JSON HTTP API.
//!
//! ## Subsystems
//!
//! - **Auth**: JWT bearer tokens, argon2 credentials, role/farm scoping
//! - **Store**: typed MongoDB collections with index bootstrap
//! - **Stats**: pure aggregation over already-fetched record sets
//! - **Alerts**: advisory scans of current state
//! - **Services**: derived-stat recompute hooks fired after writes

pub mod alerts;
pub mod auth;
pub mod config;
pub mod db;
pub mod routes;
pub mod server;
pub mod services;
pub mod stats;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{FarmgateError, Result};
