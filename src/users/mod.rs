/// Users and caller identity
///
/// Every operation takes an explicit `ActorContext` describing who is
/// acting; nothing reads ambient session state.

pub(crate) mod directory;

pub use directory::UserDirectory;

use crate::error::{MarketError, MarketResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marketplace role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Independent field inspection representative
    FieldRep,
    /// Company hiring field reps
    Vendor,
    /// Platform staff
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::FieldRep => "field_rep",
            Role::Vendor => "vendor",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> MarketResult<Self> {
        match s.to_lowercase().as_str() {
            "field_rep" => Ok(Role::FieldRep),
            "vendor" => Ok(Role::Vendor),
            "admin" => Ok(Role::Admin),
            _ => Err(MarketError::Validation(format!("Invalid role: {}", s))),
        }
    }
}

/// The caller of an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    pub user_id: String,
    pub role: Role,
}

impl ActorContext {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Fail with `Unauthorized` unless the actor is an admin
    pub fn require_admin(&self) -> MarketResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(MarketError::Unauthorized(format!(
                "User {} is not an admin",
                self.user_id
            )))
        }
    }
}

impl From<&User> for ActorContext {
    fn from(user: &User) -> Self {
        ActorContext::new(user.id.clone(), user.role)
    }
}

/// User record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub role: Role,
    pub trust_score: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_str() {
        assert_eq!(Role::from_str("field_rep").unwrap(), Role::FieldRep);
        assert_eq!(Role::from_str("VENDOR").unwrap(), Role::Vendor);
        assert_eq!(Role::from_str("admin").unwrap(), Role::Admin);
        assert!(Role::from_str("inspector").is_err());
    }

    #[test]
    fn test_require_admin() {
        assert!(ActorContext::new("a1", Role::Admin).require_admin().is_ok());
        assert!(matches!(
            ActorContext::new("v1", Role::Vendor).require_admin(),
            Err(MarketError::Unauthorized(_))
        ));
    }
}
