//! Transaction entity
//!
//! An immutable record of one money movement. Amounts are stored signed:
//! credits (Deposit, TransferIn, Interest) are positive, debits (Withdrawal,
//! TransferOut, Fee) negative, and a Reversal carries the negation of the
//! record it compensates. Direction is derived from the sign; the kind is
//! descriptive only.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Kind of money movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    TransferIn,
    TransferOut,
    Fee,
    Interest,
    Reversal,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::TransferIn => "transfer_in",
            TransactionKind::TransferOut => "transfer_out",
            TransactionKind::Fee => "fee",
            TransactionKind::Interest => "interest",
            TransactionKind::Reversal => "reversal",
        }
    }

    /// Kinds that count toward the per-day withdrawal limit
    pub fn counts_toward_daily_limit(&self) -> bool {
        matches!(self, TransactionKind::Withdrawal | TransactionKind::TransferOut)
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transaction record status.
///
/// Completed records are immutable except for cancellation; Cancelled is
/// terminal and excludes the record from balance derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Pending,
    Completed,
    Cancelled,
}

/// One recorded money movement on a single account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    /// Account this record belongs to
    pub account_id: i64,
    pub kind: TransactionKind,
    /// Signed effect on the account balance
    pub amount: Decimal,
    /// Balance snapshot immediately after this record applied
    pub balance_after: Decimal,
    pub description: String,
    /// Globally unique, externally quotable reference
    pub reference: String,
    pub status: TransactionStatus,
    /// For transfer legs, the account on the other side
    pub counterpart_account_id: Option<i64>,
    /// User that created the record
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Whether this record still blocks deletion of itself or its account:
    /// Pending, or Completed within the last 24 hours.
    pub fn is_active_obligation(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            TransactionStatus::Pending => true,
            TransactionStatus::Completed => now - self.created_at < Duration::hours(24),
            TransactionStatus::Cancelled => false,
        }
    }

    /// For a transfer leg, the reference of the other leg of the pair.
    /// `None` for every other kind.
    pub fn counterpart_reference(&self) -> Option<String> {
        match self.kind {
            TransactionKind::TransferOut => self
                .reference
                .strip_suffix("-OUT")
                .map(|p| format!("{p}-IN")),
            TransactionKind::TransferIn => self
                .reference
                .strip_suffix("-IN")
                .map(|p| format!("{p}-OUT")),
            _ => None,
        }
    }

    /// Signed effect this record contributes to its account balance.
    /// Cancelled records contribute nothing.
    pub fn effect(&self) -> Decimal {
        match self.status {
            TransactionStatus::Completed => self.amount,
            TransactionStatus::Pending | TransactionStatus::Cancelled => Decimal::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: TransactionStatus, age_hours: i64) -> Transaction {
        Transaction {
            id: 1,
            account_id: 1,
            kind: TransactionKind::Deposit,
            amount: Decimal::new(100, 0),
            balance_after: Decimal::new(100, 0),
            description: "test".to_string(),
            reference: "TXN-TEST".to_string(),
            status,
            counterpart_account_id: None,
            created_by: 1,
            created_at: Utc::now() - Duration::hours(age_hours),
        }
    }

    #[test]
    fn test_recent_completed_is_obligation() {
        let now = Utc::now();
        assert!(record(TransactionStatus::Completed, 1).is_active_obligation(now));
        assert!(!record(TransactionStatus::Completed, 25).is_active_obligation(now));
    }

    #[test]
    fn test_pending_is_always_obligation() {
        let now = Utc::now();
        assert!(record(TransactionStatus::Pending, 100).is_active_obligation(now));
    }

    #[test]
    fn test_cancelled_has_no_effect() {
        let txn = record(TransactionStatus::Cancelled, 1);
        assert_eq!(txn.effect(), Decimal::ZERO);
        assert!(!txn.is_active_obligation(Utc::now()));
    }

    #[test]
    fn test_counterpart_reference_swaps_suffix() {
        let mut txn = record(TransactionStatus::Completed, 1);
        txn.kind = TransactionKind::TransferOut;
        txn.reference = "TXN-ABC123-OUT".to_string();
        assert_eq!(txn.counterpart_reference(), Some("TXN-ABC123-IN".to_string()));

        txn.kind = TransactionKind::TransferIn;
        txn.reference = "TXN-ABC123-IN".to_string();
        assert_eq!(txn.counterpart_reference(), Some("TXN-ABC123-OUT".to_string()));

        txn.kind = TransactionKind::Deposit;
        assert_eq!(txn.counterpart_reference(), None);
    }

    #[test]
    fn test_daily_limit_kinds() {
        assert!(TransactionKind::Withdrawal.counts_toward_daily_limit());
        assert!(TransactionKind::TransferOut.counts_toward_daily_limit());
        assert!(!TransactionKind::Deposit.counts_toward_daily_limit());
        assert!(!TransactionKind::Fee.counts_toward_daily_limit());
    }
}
