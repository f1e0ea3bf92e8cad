//! bankcore
//!
//! In-memory banking back-office core: a concurrent entity store, an account
//! ledger with balance and daily-limit enforcement, a transaction processor
//! with compensating-action transfers, a threshold-driven approval workflow
//! and a lifecycle/compliance manager.
//!
//! The store is volatile and process-lifetime only; presentation, persistence
//! and reporting are external collaborators that consume these operations.

pub mod approval;
pub mod audit;
pub mod config;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod processor;
pub mod store;

pub use approval::{authorize, ApprovalWorkflow, AuthorizedAction, Classification, SubmitOutcome};
pub use audit::{AuditAction, AuditEntry, AuditTrail};
pub use config::{ConfigError, CoreConfig, RoleLimits, VariantParams};
pub use domain::{
    Account, AccountStatus, AccountVariant, Amount, AmountError, ApprovalRequest, ApprovalStatus,
    Customer, Role, Transaction, TransactionKind, TransactionRequest, TransactionStatus,
    VariantKind,
};
pub use error::{CoreError, CoreResult};
pub use ledger::AccountLedger;
pub use lifecycle::{
    AccountFilter, ConsistencyIssue, LifecycleManager, PurgeReport, ReportFigures,
    TransactionFilter,
};
pub use processor::TransactionProcessor;
pub use store::EntityStore;
