//! Domain module
//!
//! Core entity types and domain primitives.

pub mod account;
pub mod amount;
pub mod approval;
pub mod customer;
pub mod transaction;

pub use account::{Account, AccountStatus, AccountVariant, VariantKind};
pub use amount::{Amount, AmountError};
pub use approval::{ApprovalRequest, ApprovalStatus, Role, TransactionRequest};
pub use customer::Customer;
pub use transaction::{Transaction, TransactionKind, TransactionStatus};
