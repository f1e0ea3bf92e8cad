//! Error types
//!
//! Centralized error taxonomy for the back-office core. These represent
//! business rule violations and lookup failures; all of them are locally
//! recoverable by the caller except `TransferRolledBack`, which signals
//! ledger corruption.

use rust_decimal::Decimal;
use thiserror::Error;

/// Core-wide Result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors surfaced by the ledger, processor, approval workflow and
/// lifecycle manager.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    /// Customer id does not resolve
    #[error("Customer not found: {0}")]
    CustomerNotFound(i64),

    /// Account id or number does not resolve
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Transaction id or reference does not resolve
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Approval request id does not resolve
    #[error("Approval request not found: {0}")]
    ApprovalNotFound(i64),

    /// Amount is outside configured bounds or has the wrong precision
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Debit would push the balance below the variant's minimum
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    /// Withdrawal would exceed the variant's daily limit
    #[error("Daily withdrawal limit exceeded: limit {limit}, attempted total {attempted}")]
    DailyLimitExceeded { limit: Decimal, attempted: Decimal },

    /// Transfer source and destination are the same account
    #[error("Cannot transfer to the same account")]
    SameAccount,

    /// Request was already approved, rejected or otherwise finalized
    #[error("Request {0} is already resolved")]
    AlreadyResolved(i64),

    /// Caller's role does not cover the requested action/amount
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// Entity still has non-terminal transactions and cannot be deleted
    #[error("Entity {0} has active obligations that block deletion")]
    HasActiveObligations(i64),

    /// Rejection requires a non-blank reason
    #[error("A rejection reason is required")]
    ReasonRequired,

    /// Generated or supplied account number collides with an existing one
    #[error("Duplicate account number: {0}")]
    DuplicateAccountNumber(String),

    /// Operation requires an Active account
    #[error("Account is not active: {0}")]
    AccountNotActive(String),

    /// A transfer's compensating debit-reversal failed after the credit
    /// step failed. The ledger may be inconsistent; must not be swallowed.
    #[error("Transfer rolled back with errors: {0}")]
    TransferRolledBack(String),
}

impl CoreError {
    /// Create an insufficient funds error
    pub fn insufficient_funds(required: Decimal, available: Decimal) -> Self {
        Self::InsufficientFunds {
            required,
            available,
        }
    }

    /// Check if this is a client error (correctable input, retry allowed)
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::TransferRolledBack(_))
    }

    /// Check if this error indicates possible ledger corruption
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::TransferRolledBack(_))
    }
}
