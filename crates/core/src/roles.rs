//! Operator role names carried in access-token claims.

/// Full operator access: alerts, pools, raffle status, manual transfers.
pub const ROLE_ADMIN: &str = "admin";

/// Read-only support staff.
pub const ROLE_SUPPORT: &str = "support";
