/// Connection requests and vendor referrals
///
/// Both are small state machines whose transitions are guarded by
/// conditional updates on the current status.

mod connections;
mod referrals;

pub use connections::ConnectionRequests;
pub use referrals::Referrals;

use crate::error::{MarketError, MarketResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest personal message accepted with a connection request
pub const MAX_PERSONAL_MESSAGE_LEN: usize = 1000;

/// Connection request status.
///
/// `Expired` is never stored; it is derived from a pending request whose
/// `expires_at` has passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
    Expired,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Pending => "pending",
            ConnectionStatus::Accepted => "accepted",
            ConnectionStatus::Rejected => "rejected",
            ConnectionStatus::Cancelled => "cancelled",
            ConnectionStatus::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> MarketResult<Self> {
        match s {
            "pending" => Ok(ConnectionStatus::Pending),
            "accepted" => Ok(ConnectionStatus::Accepted),
            "rejected" => Ok(ConnectionStatus::Rejected),
            "cancelled" => Ok(ConnectionStatus::Cancelled),
            "expired" => Ok(ConnectionStatus::Expired),
            _ => Err(MarketError::Internal(format!("Unknown connection status: {}", s))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConnectionStatus::Pending)
    }
}

/// Connection request record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRequest {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    /// Status as stored
    pub status: ConnectionStatus,
    pub personal_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ConnectionRequest {
    /// Status as observed at `now`
    pub fn effective_status(&self, now: DateTime<Utc>) -> ConnectionStatus {
        if self.status == ConnectionStatus::Pending && now >= self.expires_at {
            ConnectionStatus::Expired
        } else {
            self.status
        }
    }

    pub fn view(&self, now: DateTime<Utc>) -> ConnectionRequestView {
        ConnectionRequestView {
            status: self.effective_status(now),
            request: self.clone(),
        }
    }
}

/// Connection request with its status resolved for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRequestView {
    #[serde(flatten)]
    pub request: ConnectionRequest,
    #[serde(rename = "effective_status")]
    pub status: ConnectionStatus,
}

/// Referral status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferralStatus {
    Pending,
    SignedUp,
    Confirmed,
    Declined,
}

impl ReferralStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferralStatus::Pending => "pending",
            ReferralStatus::SignedUp => "signed_up",
            ReferralStatus::Confirmed => "confirmed",
            ReferralStatus::Declined => "declined",
        }
    }

    pub fn from_str(s: &str) -> MarketResult<Self> {
        match s {
            "pending" => Ok(ReferralStatus::Pending),
            "signed_up" => Ok(ReferralStatus::SignedUp),
            "confirmed" => Ok(ReferralStatus::Confirmed),
            "declined" => Ok(ReferralStatus::Declined),
            _ => Err(MarketError::Internal(format!("Unknown referral status: {}", s))),
        }
    }
}

/// Vendor referral of a prospective field rep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Referral {
    pub id: String,
    pub referrer_id: String,
    pub rep_name: String,
    pub rep_initials: String,
    pub status: ReferralStatus,
    pub credit_earned: bool,
    pub date_referred: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn request(status: ConnectionStatus, expires_in: Duration) -> ConnectionRequest {
        let now = Utc::now();
        ConnectionRequest {
            id: "c1".into(),
            sender_id: "a".into(),
            recipient_id: "b".into(),
            status,
            personal_message: None,
            created_at: now,
            updated_at: now,
            expires_at: now + expires_in,
        }
    }

    #[test]
    fn test_pending_request_expires_lazily() {
        let req = request(ConnectionStatus::Pending, Duration::days(14));
        let now = Utc::now();

        assert_eq!(req.effective_status(now), ConnectionStatus::Pending);
        assert_eq!(
            req.effective_status(now + Duration::days(15)),
            ConnectionStatus::Expired
        );
    }

    #[test]
    fn test_terminal_states_never_expire() {
        let req = request(ConnectionStatus::Accepted, Duration::days(-1));
        assert_eq!(req.effective_status(Utc::now()), ConnectionStatus::Accepted);
        assert!(ConnectionStatus::Cancelled.is_terminal());
        assert!(!ConnectionStatus::Pending.is_terminal());
    }

    #[test]
    fn test_view_serializes_effective_status() {
        let req = request(ConnectionStatus::Pending, Duration::days(-1));
        let json = serde_json::to_value(req.view(Utc::now())).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["effective_status"], "expired");
    }

    #[test]
    fn test_referral_status_roundtrip() {
        for status in [
            ReferralStatus::Pending,
            ReferralStatus::SignedUp,
            ReferralStatus::Confirmed,
            ReferralStatus::Declined,
        ] {
            assert_eq!(ReferralStatus::from_str(status.as_str()).unwrap(), status);
        }
    }
}
