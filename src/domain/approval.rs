//! Approval entities
//!
//! Roles, the transaction request payload an approval carries, and the
//! approval request record with its Pending -> Approved | Rejected state
//! machine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Staff role, ordered by authority: Teller < Manager < Administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Teller,
    Manager,
    Administrator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Teller => "teller",
            Role::Manager => "manager",
            Role::Administrator => "administrator",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Approval request status. Transitions only Pending -> Approved or
/// Pending -> Rejected, never reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// The operation an approval request asks to execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransactionRequest {
    Deposit {
        account_number: String,
        amount: Decimal,
        description: String,
    },
    Withdrawal {
        account_number: String,
        amount: Decimal,
        description: String,
    },
    Transfer {
        from_account_number: String,
        to_account_number: String,
        amount: Decimal,
        description: String,
    },
}

impl TransactionRequest {
    /// The (positive) amount of money this request moves.
    pub fn amount(&self) -> Decimal {
        match self {
            TransactionRequest::Deposit { amount, .. }
            | TransactionRequest::Withdrawal { amount, .. }
            | TransactionRequest::Transfer { amount, .. } => *amount,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            TransactionRequest::Deposit { description, .. }
            | TransactionRequest::Withdrawal { description, .. }
            | TransactionRequest::Transfer { description, .. } => description,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            TransactionRequest::Deposit { .. } => "deposit",
            TransactionRequest::Withdrawal { .. } => "withdrawal",
            TransactionRequest::Transfer { .. } => "transfer",
        }
    }
}

/// A transaction awaiting (or past) authorization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: i64,
    pub request: TransactionRequest,
    pub requester_id: i64,
    pub requester_role: Role,
    pub status: ApprovalStatus,
    /// Set when resolved
    pub approver_id: Option<i64>,
    /// Approval comments or rejection reason
    pub comments: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Ids of the transaction records executed for this request
    /// (one for deposit/withdrawal, two for a transfer pair)
    pub executed_transaction_ids: Vec<i64>,
}

impl ApprovalRequest {
    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    pub fn amount(&self) -> Decimal {
        self.request.amount()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_ordering() {
        assert!(Role::Teller < Role::Manager);
        assert!(Role::Manager < Role::Administrator);
    }

    #[test]
    fn test_request_amount() {
        let request = TransactionRequest::Transfer {
            from_account_number: "1".to_string(),
            to_account_number: "2".to_string(),
            amount: Decimal::new(500, 0),
            description: "rent".to_string(),
        };
        assert_eq!(request.amount(), Decimal::new(500, 0));
        assert_eq!(request.kind_name(), "transfer");
    }
}
