//! Roles, capabilities, and the per-request access context
//!
//! Roles form a closed set mapped to a static capability table; user
//! documents never store per-field permission flags. The farm-scoping
//! policy lives here too: a farmer's listing scope is always forced to
//! their assigned farm, an admin's requested farm is honored verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{FarmgateError, Result};

/// User roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Farmer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Farmer => write!(f, "farmer"),
        }
    }
}

impl Role {
    pub fn parse(s: &str) -> Result<Role> {
        match s {
            "admin" => Ok(Role::Admin),
            "farmer" => Ok(Role::Farmer),
            other => Err(FarmgateError::Validation(format!(
                "Unknown role '{}', expected 'admin' or 'farmer'",
                other
            ))),
        }
    }
}

/// Named capabilities gating each operation group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ViewCows,
    ManageCows,
    ViewMilkRecords,
    AddMilkRecords,
    EditMilkRecords,
    ViewFeedRecords,
    AddFeedRecords,
    EditFeedRecords,
    ViewChicken,
    ManageChicken,
    ViewStats,
    ViewHealthRecords,
    ManageHealthRecords,
    ViewSalesData,
    EditSalesData,
    ManageInventory,
    ManageFarms,
    ManageUsers,
}

impl Role {
    /// Static capability table. Admins hold everything; farmers hold the
    /// day-to-day recording subset.
    pub fn grants(self, capability: Capability) -> bool {
        match self {
            Role::Admin => true,
            Role::Farmer => matches!(
                capability,
                Capability::ViewCows
                    | Capability::ViewMilkRecords
                    | Capability::AddMilkRecords
                    | Capability::ViewFeedRecords
                    | Capability::AddFeedRecords
                    | Capability::ViewChicken
                    | Capability::ViewStats
            ),
        }
    }
}

/// Resolved per-request access context: who is calling, with what role,
/// scoped to which farm.
#[derive(Debug, Clone)]
pub struct AccessContext {
    /// Identity provider subject id
    pub subject_id: String,
    pub email: String,
    pub role: Role,
    /// Farm this user is pinned to; None for unassigned users (admins)
    pub assigned_farm: Option<String>,
}

impl AccessContext {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Effective farm filter for a listing operation.
    ///
    /// Farmers are always pinned to their assigned farm; the client-supplied
    /// parameter never widens their scope. Admins get the requested farm
    /// verbatim, or all farms when omitted.
    pub fn farm_scope(&self, requested: Option<&str>) -> Option<String> {
        match self.role {
            Role::Farmer => self.assigned_farm.clone(),
            Role::Admin => requested.map(|s| s.to_string()),
        }
    }

    /// Reject unless the role grants the capability
    pub fn require(&self, capability: Capability) -> Result<()> {
        if self.role.grants(capability) {
            Ok(())
        } else {
            Err(FarmgateError::Forbidden("Insufficient permissions".into()))
        }
    }

    /// Reject non-admin callers outright (health records, financial
    /// reports, inventory, user management)
    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(FarmgateError::Forbidden("Insufficient permissions".into()))
        }
    }

    /// Reject a farmer reading a single record outside their farm
    pub fn check_farm_access(&self, record_farm: &str) -> Result<()> {
        match self.role {
            Role::Admin => Ok(()),
            Role::Farmer => {
                if self.assigned_farm.as_deref() == Some(record_farm) {
                    Ok(())
                } else {
                    Err(FarmgateError::Forbidden("Insufficient permissions".into()))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn farmer_at(farm: &str) -> AccessContext {
        AccessContext {
            subject_id: "subj-1".into(),
            email: "farmer@example.com".into(),
            role: Role::Farmer,
            assigned_farm: Some(farm.to_string()),
        }
    }

    fn admin() -> AccessContext {
        AccessContext {
            subject_id: "subj-2".into(),
            email: "admin@example.com".into(),
            role: Role::Admin,
            assigned_farm: None,
        }
    }

    #[test]
    fn test_farmer_scope_ignores_requested_farm() {
        let ctx = farmer_at("nakuru");
        assert_eq!(ctx.farm_scope(None), Some("nakuru".to_string()));
        assert_eq!(ctx.farm_scope(Some("kisii")), Some("nakuru".to_string()));
    }

    #[test]
    fn test_admin_scope_honors_requested_farm() {
        let ctx = admin();
        assert_eq!(ctx.farm_scope(Some("kisii")), Some("kisii".to_string()));
        assert_eq!(ctx.farm_scope(None), None);
    }

    #[test]
    fn test_admin_holds_every_capability() {
        for cap in [
            Capability::ManageUsers,
            Capability::ViewHealthRecords,
            Capability::ManageInventory,
            Capability::ViewSalesData,
            Capability::ManageCows,
        ] {
            assert!(Role::Admin.grants(cap));
        }
    }

    #[test]
    fn test_farmer_capability_subset() {
        assert!(Role::Farmer.grants(Capability::ViewCows));
        assert!(Role::Farmer.grants(Capability::AddMilkRecords));
        assert!(Role::Farmer.grants(Capability::ViewStats));

        assert!(!Role::Farmer.grants(Capability::ViewHealthRecords));
        assert!(!Role::Farmer.grants(Capability::ManageInventory));
        assert!(!Role::Farmer.grants(Capability::ManageUsers));
        assert!(!Role::Farmer.grants(Capability::ViewSalesData));
        assert!(!Role::Farmer.grants(Capability::ManageCows));
    }

    #[test]
    fn test_farm_access_check() {
        let ctx = farmer_at("nakuru");
        assert!(ctx.check_farm_access("nakuru").is_ok());
        assert!(ctx.check_farm_access("kisii").is_err());
        assert!(admin().check_farm_access("kisii").is_ok());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("admin").unwrap(), Role::Admin);
        assert_eq!(Role::parse("farmer").unwrap(), Role::Farmer);
        assert!(Role::parse("manager").is_err());
    }
}
