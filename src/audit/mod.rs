//! Audit trail
//!
//! Append-only, in-memory record of every state-changing operation, kept for
//! the lifetime of the process. Entries are sequenced and also emitted as
//! `tracing` events so an external collaborator can ship them elsewhere.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Audited action types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    AccountOpened,
    AccountClosed,
    AccountSuspended,
    AccountReactivated,
    AccountSoftDeleted,
    AccountRestored,
    AccountPurged,
    DepositPosted,
    WithdrawalPosted,
    TransferExecuted,
    TransferRolledBack,
    FeeCharged,
    InterestAccrued,
    TransactionReversed,
    TransactionCancelled,
    TransactionPurged,
    ApprovalRequested,
    SelfApproved,
    ApprovalGranted,
    ApprovalRejected,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::AccountOpened => "account.opened",
            AuditAction::AccountClosed => "account.closed",
            AuditAction::AccountSuspended => "account.suspended",
            AuditAction::AccountReactivated => "account.reactivated",
            AuditAction::AccountSoftDeleted => "account.soft_deleted",
            AuditAction::AccountRestored => "account.restored",
            AuditAction::AccountPurged => "account.purged",
            AuditAction::DepositPosted => "transaction.deposit",
            AuditAction::WithdrawalPosted => "transaction.withdrawal",
            AuditAction::TransferExecuted => "transaction.transfer",
            AuditAction::TransferRolledBack => "transaction.transfer_rolled_back",
            AuditAction::FeeCharged => "transaction.fee",
            AuditAction::InterestAccrued => "transaction.interest",
            AuditAction::TransactionReversed => "transaction.reversed",
            AuditAction::TransactionCancelled => "transaction.cancelled",
            AuditAction::TransactionPurged => "transaction.purged",
            AuditAction::ApprovalRequested => "approval.requested",
            AuditAction::SelfApproved => "approval.self_approved",
            AuditAction::ApprovalGranted => "approval.granted",
            AuditAction::ApprovalRejected => "approval.rejected",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One audit record
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub seq: i64,
    pub action: AuditAction,
    /// User that performed the operation
    pub actor: i64,
    pub resource_kind: &'static str,
    pub resource_id: i64,
    pub detail: serde_json::Value,
    pub at: DateTime<Utc>,
}

/// Process-lifetime audit log
#[derive(Debug, Default)]
pub struct AuditTrail {
    entries: DashMap<i64, AuditEntry>,
    next_seq: AtomicI64,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_seq: AtomicI64::new(1),
        }
    }

    /// Append an entry and emit a matching tracing event.
    pub fn record(
        &self,
        action: AuditAction,
        actor: i64,
        resource_kind: &'static str,
        resource_id: i64,
        detail: serde_json::Value,
    ) -> i64 {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let entry = AuditEntry {
            seq,
            action,
            actor,
            resource_kind,
            resource_id,
            detail,
            at: Utc::now(),
        };

        tracing::info!(
            seq,
            action = %action,
            actor,
            resource_kind,
            resource_id,
            "audit"
        );
        self.entries.insert(seq, entry);
        seq
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in sequence order.
    pub fn entries(&self) -> Vec<AuditEntry> {
        let mut all: Vec<AuditEntry> = self.entries.iter().map(|e| e.clone()).collect();
        all.sort_by_key(|e| e.seq);
        all
    }

    /// Entries recorded for one action type, in sequence order.
    pub fn entries_for_action(&self, action: AuditAction) -> Vec<AuditEntry> {
        let mut matching: Vec<AuditEntry> = self
            .entries
            .iter()
            .filter(|e| e.action == action)
            .map(|e| e.clone())
            .collect();
        matching.sort_by_key(|e| e.seq);
        matching
    }
}
