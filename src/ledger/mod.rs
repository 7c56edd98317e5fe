/// Credit Ledger
///
/// Per-user credit balances backed by an append-only transaction log.
/// Every balance change goes through `CreditLedger::apply_transaction`
/// (or `apply_in` when composed into a larger database transaction), so
/// the sum of a user's transactions always equals their balance.

mod manager;

pub use manager::CreditLedger;

use crate::error::{MarketError, MarketResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Origin or purpose of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Reward for platform activity (reviews, referrals, milestones)
    Earned,
    /// Bought through billing
    Purchased,
    /// Consumed by the account owner
    Spent,
    /// Direct admin adjustment, exempt from the balance floor
    AdminOverride,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Earned => "earned",
            TransactionKind::Purchased => "purchased",
            TransactionKind::Spent => "spent",
            TransactionKind::AdminOverride => "admin_override",
        }
    }

    pub fn from_str(s: &str) -> MarketResult<Self> {
        match s {
            "earned" => Ok(TransactionKind::Earned),
            "purchased" => Ok(TransactionKind::Purchased),
            "spent" => Ok(TransactionKind::Spent),
            "admin_override" => Ok(TransactionKind::AdminOverride),
            _ => Err(MarketError::Internal(format!("Unknown transaction kind: {}", s))),
        }
    }
}

/// What a transaction pays for or rewards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReference {
    pub reference_type: String,
    pub reference_id: String,
}

impl TransactionReference {
    pub fn new(reference_type: impl Into<String>, reference_id: impl Into<String>) -> Self {
        Self {
            reference_type: reference_type.into(),
            reference_id: reference_id.into(),
        }
    }
}

/// Audit metadata attached to a transaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    pub reason: Option<String>,
    pub admin_id: Option<String>,
}

/// A requested balance change
#[derive(Debug, Clone)]
pub struct TransactionRequest {
    pub user_id: String,
    pub amount: i64,
    pub kind: TransactionKind,
    pub reference: Option<TransactionReference>,
    pub metadata: TransactionMetadata,
}

impl TransactionRequest {
    pub fn earned(user_id: &str, amount: i64, reference: TransactionReference) -> Self {
        Self {
            user_id: user_id.to_string(),
            amount,
            kind: TransactionKind::Earned,
            reference: Some(reference),
            metadata: TransactionMetadata::default(),
        }
    }

    pub fn purchased(user_id: &str, amount: i64, reference: TransactionReference) -> Self {
        Self {
            user_id: user_id.to_string(),
            amount,
            kind: TransactionKind::Purchased,
            reference: Some(reference),
            metadata: TransactionMetadata::default(),
        }
    }

    /// A spend of `amount` credits; stored as a negative entry
    pub fn spent(user_id: &str, amount: i64, reference: TransactionReference) -> Self {
        Self {
            user_id: user_id.to_string(),
            amount: -amount,
            kind: TransactionKind::Spent,
            reference: Some(reference),
            metadata: TransactionMetadata::default(),
        }
    }

    /// Signed admin adjustment
    pub fn admin_override(user_id: &str, amount: i64, admin_id: &str, reason: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            amount,
            kind: TransactionKind::AdminOverride,
            reference: Some(TransactionReference::new("admin_override", admin_id)),
            metadata: TransactionMetadata {
                reason: Some(reason.to_string()),
                admin_id: Some(admin_id.to_string()),
            },
        }
    }

    /// Check sign rules and required metadata for the kind
    pub fn validate(&self) -> MarketResult<()> {
        match self.kind {
            TransactionKind::Earned | TransactionKind::Purchased if self.amount <= 0 => {
                Err(MarketError::Validation(format!(
                    "{} credits must be positive",
                    self.kind.as_str()
                )))
            }
            TransactionKind::Spent if self.amount >= 0 => Err(MarketError::Validation(
                "Spend amount must be positive".to_string(),
            )),
            TransactionKind::AdminOverride => {
                if self.amount == 0 {
                    return Err(MarketError::Validation(
                        "Admin override amount cannot be zero".to_string(),
                    ));
                }
                let has_reason = self
                    .metadata
                    .reason
                    .as_deref()
                    .map_or(false, |r| !r.trim().is_empty());
                if !has_reason {
                    return Err(MarketError::Validation(
                        "Admin override requires a reason".to_string(),
                    ));
                }
                let has_admin = self
                    .metadata
                    .admin_id
                    .as_deref()
                    .map_or(false, |a| !a.trim().is_empty());
                if !has_admin {
                    return Err(MarketError::Validation(
                        "Admin override requires an admin id".to_string(),
                    ));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Credit account state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditAccount {
    pub user_id: String,
    pub current_balance: i64,
    /// Lifetime earned credits
    pub earned_credits: i64,
    /// Lifetime purchased credits
    pub purchased_credits: i64,
    pub updated_at: DateTime<Utc>,
}

/// Immutable ledger entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: String,
    pub user_id: String,
    pub amount: i64,
    pub kind: TransactionKind,
    pub reference: Option<TransactionReference>,
    pub metadata: TransactionMetadata,
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

/// Result of comparing a balance against its ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAudit {
    pub user_id: String,
    pub balance: i64,
    pub ledger_sum: i64,
}

impl LedgerAudit {
    pub fn is_consistent(&self) -> bool {
        self.balance == self.ledger_sum
    }

    pub fn drift(&self) -> i64 {
        self.balance - self.ledger_sum
    }
}
