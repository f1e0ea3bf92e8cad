//! Account entity
//!
//! A single deposit account: identity, owning customer, variant capabilities,
//! current balance and lifecycle status. Accounts are records owned by the
//! entity store; every balance change goes through the ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::VariantParams;

/// Account lifecycle status.
///
/// Transitions are one-directional except Active <-> Deleted (soft delete is
/// reversible) and Active <-> Suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Active,
    Closed,
    Suspended,
    Deleted,
}

impl Default for AccountStatus {
    fn default() -> Self {
        Self::Active
    }
}

/// The three supported account variant kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariantKind {
    Savings,
    Checking,
    Business,
}

impl VariantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantKind::Savings => "savings",
            VariantKind::Checking => "checking",
            VariantKind::Business => "business",
        }
    }
}

impl std::fmt::Display for VariantKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Account variant: a kind tag plus its capability parameters.
///
/// Behavior differences between Savings/Checking/Business are entirely
/// data-driven through the parameter set; there is no per-variant code path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountVariant {
    pub kind: VariantKind,
    pub params: VariantParams,
}

impl AccountVariant {
    pub fn new(kind: VariantKind, params: VariantParams) -> Self {
        Self { kind, params }
    }

    /// Balance floor a debit may never cross
    pub fn minimum_balance(&self) -> Decimal {
        self.params.minimum_balance
    }

    /// Annual interest rate as a fraction
    pub fn interest_rate(&self) -> Decimal {
        self.params.interest_rate
    }

    /// Maximum cumulative withdrawal per calendar day
    pub fn daily_withdrawal_limit(&self) -> Decimal {
        self.params.daily_withdrawal_limit
    }

    /// Allowed range for the opening deposit
    pub fn opening_bounds(&self) -> (Decimal, Decimal) {
        (self.params.min_opening_deposit, self.params.max_opening_deposit)
    }
}

/// A deposit account record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Store-assigned id, immutable once assigned
    pub id: i64,
    /// External lookup key, globally unique, immutable
    pub account_number: String,
    /// Owning customer id
    pub customer_id: i64,
    pub variant: AccountVariant,
    /// Current balance; equals the sum of all completed transaction effects
    pub balance: Decimal,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    pub fn is_deleted(&self) -> bool {
        self.status == AccountStatus::Deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;

    fn savings_variant() -> AccountVariant {
        let config = CoreConfig::default();
        AccountVariant::new(VariantKind::Savings, config.savings.clone())
    }

    #[test]
    fn test_variant_capabilities() {
        let variant = savings_variant();
        assert_eq!(variant.minimum_balance(), Decimal::new(100, 0));
        assert_eq!(variant.daily_withdrawal_limit(), Decimal::new(2_000, 0));
        let (min, max) = variant.opening_bounds();
        assert!(min < max);
    }

    #[test]
    fn test_status_default() {
        assert_eq!(AccountStatus::default(), AccountStatus::Active);
    }

    #[test]
    fn test_variant_kind_display() {
        assert_eq!(VariantKind::Business.to_string(), "business");
    }
}
