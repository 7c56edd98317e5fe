/// Admin Override Layer
///
/// Privileged mutations of balances, trust scores, roles and activation.
/// Every override carries a justification and lands in the audit log in the
/// same database transaction as the change itself.

mod audit;
mod overrides;

pub use audit::AuditLog;
pub use overrides::AdminOverrides;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit log action names
pub mod actions {
    pub const CREDIT_GRANT: &str = "credit_grant";
    pub const CREDIT_DEDUCT: &str = "credit_deduct";
    pub const TRUST_SCORE_UPDATE: &str = "trust_score_update";
    pub const USER_ROLE_UPDATE: &str = "user_role_update";
    pub const USER_ACTIVATION_TOGGLE: &str = "user_activation_toggle";
}

/// Admin action audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub admin_id: String,
    pub action: String,
    pub subject_id: Option<String>,
    /// JSON document describing the change
    pub details: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}
