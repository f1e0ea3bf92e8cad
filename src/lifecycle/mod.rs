//! Lifecycle / Compliance Manager
//!
//! Soft delete, restore and permanent delete for accounts and transactions,
//! bulk criteria-based purges, and a read-only consistency validator.
//!
//! Deletion policy: an account with any active obligation (a Pending
//! transaction, or a Completed one from the last 24 hours) cannot be
//! deleted; a transaction can be permanently deleted unless it is Completed
//! and less than 24 hours old. Bulk operations recover per candidate and
//! report counts, never aborting the batch.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::audit::{AuditAction, AuditTrail};
use crate::domain::{
    Account, AccountStatus, Transaction, TransactionKind, TransactionStatus, VariantKind,
};
use crate::error::{CoreError, CoreResult};
use crate::ledger::AccountLedger;
use crate::store::EntityStore;

/// Criteria for bulk account purges. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AccountFilter {
    pub status: Option<AccountStatus>,
    pub kind: Option<VariantKind>,
    pub min_balance: Option<Decimal>,
    pub max_balance: Option<Decimal>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl AccountFilter {
    fn matches(&self, account: &Account) -> bool {
        self.status.map_or(true, |s| account.status == s)
            && self.kind.map_or(true, |k| account.variant.kind == k)
            && self.min_balance.map_or(true, |m| account.balance >= m)
            && self.max_balance.map_or(true, |m| account.balance <= m)
            && self.created_after.map_or(true, |t| account.created_at >= t)
            && self.created_before.map_or(true, |t| account.created_at <= t)
    }
}

/// Criteria for bulk transaction purges.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub status: Option<TransactionStatus>,
    pub kind: Option<TransactionKind>,
    pub account_id: Option<i64>,
    pub created_before: Option<DateTime<Utc>>,
}

impl TransactionFilter {
    fn matches(&self, transaction: &Transaction) -> bool {
        self.status.map_or(true, |s| transaction.status == s)
            && self.kind.map_or(true, |k| transaction.kind == k)
            && self.account_id.map_or(true, |id| transaction.account_id == id)
            && self
                .created_before
                .map_or(true, |t| transaction.created_at <= t)
    }
}

/// Outcome of a bulk purge: per-candidate failures are skipped, not fatal.
#[derive(Debug, Clone, Default)]
pub struct PurgeReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub skipped: Vec<(i64, CoreError)>,
}

/// A drift finding from the read-only validator. Findings are reported,
/// never auto-corrected.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsistencyIssue {
    /// Stored balance disagrees with the sum of completed effects
    BalanceMismatch {
        account_id: i64,
        recorded: Decimal,
        computed: Decimal,
    },
    /// Transaction points at an account that no longer exists
    DanglingTransaction { transaction_id: i64, account_id: i64 },
    /// Transfer leg whose counterpart record is missing
    MissingCounterpart {
        transaction_id: i64,
        reference: String,
    },
    /// Cached reporting figure disagrees with the recomputed one
    ReportMismatch {
        account_id: i64,
        field: &'static str,
        cached: Decimal,
        computed: Decimal,
    },
}

/// Derived reporting figures for one account, recomputed from the
/// transaction set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportFigures {
    pub total_deposits: Decimal,
    pub total_withdrawals: Decimal,
    pub transaction_count: u64,
}

/// Manager over the ledger and shared store.
#[derive(Clone)]
pub struct LifecycleManager {
    ledger: AccountLedger,
    audit: Arc<AuditTrail>,
}

impl LifecycleManager {
    pub fn new(ledger: AccountLedger, audit: Arc<AuditTrail>) -> Self {
        Self { ledger, audit }
    }

    fn store(&self) -> &Arc<EntityStore> {
        self.ledger.store()
    }

    // =========================================================================
    // Account deletion
    // =========================================================================

    fn has_active_obligations(&self, account_id: i64) -> bool {
        let now = Utc::now();
        self.store()
            .transactions_for_account(account_id)
            .iter()
            .any(|t| t.is_active_obligation(now))
    }

    /// Zero balance and no active obligations.
    pub fn can_delete_account(&self, account_id: i64) -> CoreResult<bool> {
        let account = self
            .store()
            .account(account_id)
            .ok_or_else(|| CoreError::AccountNotFound(account_id.to_string()))?;
        Ok(account.balance.is_zero() && !self.has_active_obligations(account_id))
    }

    /// Reversible soft delete: Active -> Deleted, data preserved.
    pub fn soft_delete_account(&self, account_id: i64, user_id: i64) -> CoreResult<Account> {
        if self.has_active_obligations(account_id) {
            return Err(CoreError::HasActiveObligations(account_id));
        }

        let updated = self.store().try_update_account_with(account_id, |account| {
            if !account.is_active() {
                return Err(CoreError::AccountNotActive(account.account_number.clone()));
            }
            account.status = AccountStatus::Deleted;
            account.updated_at = Utc::now();
            Ok(())
        })?;

        self.audit.record(
            AuditAction::AccountSoftDeleted,
            user_id,
            "account",
            account_id,
            json!({ "account_number": updated.account_number }),
        );
        Ok(updated)
    }

    /// Undo a soft delete: Deleted -> Active with balance and history
    /// untouched. Restoring an account that is not Deleted is a no-op, so
    /// the operation is idempotent.
    pub fn restore_account(&self, account_id: i64, user_id: i64) -> CoreResult<Account> {
        let mut restored = false;
        let updated = self.store().update_account_with(account_id, |account| {
            if account.is_deleted() {
                account.status = AccountStatus::Active;
                account.updated_at = Utc::now();
                restored = true;
            }
        })?;

        if restored {
            self.audit.record(
                AuditAction::AccountRestored,
                user_id,
                "account",
                account_id,
                json!({ "account_number": updated.account_number }),
            );
        }
        Ok(updated)
    }

    /// Irreversible removal of the account and all of its transactions.
    pub fn permanent_delete_account(&self, account_id: i64, user_id: i64) -> CoreResult<Account> {
        if self.store().account(account_id).is_none() {
            return Err(CoreError::AccountNotFound(account_id.to_string()));
        }
        if self.has_active_obligations(account_id) {
            return Err(CoreError::HasActiveObligations(account_id));
        }

        let cascade: Vec<i64> = self
            .store()
            .transactions_for_account(account_id)
            .iter()
            .map(|t| t.id)
            .collect();
        for id in &cascade {
            self.store().remove_transaction(*id);
        }
        let removed = self
            .store()
            .remove_account(account_id)
            .ok_or_else(|| CoreError::AccountNotFound(account_id.to_string()))?;

        self.audit.record(
            AuditAction::AccountPurged,
            user_id,
            "account",
            account_id,
            json!({
                "account_number": removed.account_number,
                "cascaded_transactions": cascade.len(),
            }),
        );
        tracing::info!(account_id, cascaded = cascade.len(), "account permanently deleted");
        Ok(removed)
    }

    // =========================================================================
    // Transaction deletion
    // =========================================================================

    /// A transaction may be permanently deleted unless it is Completed and
    /// less than 24 hours old.
    pub fn can_delete_transaction(&self, transaction_id: i64) -> CoreResult<bool> {
        let transaction = self
            .store()
            .transaction(transaction_id)
            .ok_or_else(|| CoreError::TransactionNotFound(transaction_id.to_string()))?;
        Ok(!(transaction.status == TransactionStatus::Completed
            && transaction.is_active_obligation(Utc::now())))
    }

    /// Back a Completed record's balance effect out through the ledger.
    fn reverse_effect(&self, transaction: &Transaction) -> CoreResult<()> {
        self.ledger
            .adjust_balance(transaction.account_id, -transaction.amount)?;
        if transaction.kind.counts_toward_daily_limit() {
            self.ledger.unrecord_withdrawal(
                transaction.account_id,
                transaction.amount.abs(),
                transaction.created_at.date_naive(),
            );
        }
        Ok(())
    }

    /// Undo [`reverse_effect`](Self::reverse_effect) when a later step of a
    /// pair cancellation fails.
    fn reapply_effect(&self, transaction: &Transaction) -> CoreResult<()> {
        self.ledger
            .adjust_balance(transaction.account_id, transaction.amount)?;
        if transaction.kind.counts_toward_daily_limit() {
            self.ledger.record_withdrawal(
                transaction.account_id,
                transaction.amount.abs(),
                transaction.created_at.date_naive(),
            );
        }
        Ok(())
    }

    /// Soft delete: mark Cancelled and reverse the balance effect through
    /// the ledger. A transfer leg never stands alone: cancelling either leg
    /// cancels the pair and reverses both balance effects, so no money is
    /// created or destroyed. Cancelling an already-Cancelled record fails.
    pub fn cancel_transaction(&self, transaction_id: i64, user_id: i64) -> CoreResult<Transaction> {
        let transaction = self
            .store()
            .transaction(transaction_id)
            .ok_or_else(|| CoreError::TransactionNotFound(transaction_id.to_string()))?;

        if transaction.status == TransactionStatus::Cancelled {
            return Err(CoreError::AlreadyResolved(transaction_id));
        }

        let counterpart = transaction
            .counterpart_reference()
            .and_then(|r| self.store().transaction_by_reference(&r))
            .filter(|c| c.status != TransactionStatus::Cancelled);

        // Completed records carried a balance effect that must come back out
        if transaction.status == TransactionStatus::Completed {
            self.reverse_effect(&transaction)?;
        }
        if let Some(leg) = counterpart
            .as_ref()
            .filter(|c| c.status == TransactionStatus::Completed)
        {
            if let Err(counterpart_err) = self.reverse_effect(leg) {
                // A half-cancelled pair must never persist: undo the first
                // reversal and surface the counterpart's failure
                if transaction.status == TransactionStatus::Completed {
                    if let Err(reapply_err) = self.reapply_effect(&transaction) {
                        tracing::error!(
                            transaction_id,
                            counterpart_id = leg.id,
                            %counterpart_err,
                            %reapply_err,
                            "pair cancellation compensation failed, ledger may be inconsistent"
                        );
                        return Err(CoreError::TransferRolledBack(format!(
                            "counterpart reversal failed ({counterpart_err}); \
                             reapplying the first leg also failed ({reapply_err})"
                        )));
                    }
                }
                return Err(counterpart_err);
            }
        }

        let updated = self.store().update_transaction_with(transaction_id, |t| {
            t.status = TransactionStatus::Cancelled;
        })?;
        if let Some(leg) = &counterpart {
            self.store().update_transaction_with(leg.id, |t| {
                t.status = TransactionStatus::Cancelled;
            })?;
        }

        self.audit.record(
            AuditAction::TransactionCancelled,
            user_id,
            "transaction",
            transaction_id,
            json!({
                "reference": updated.reference,
                "counterpart_id": counterpart.as_ref().map(|c| c.id),
            }),
        );
        Ok(updated)
    }

    /// Irreversible removal of a single transaction record.
    pub fn permanent_delete_transaction(
        &self,
        transaction_id: i64,
        user_id: i64,
    ) -> CoreResult<Transaction> {
        if !self.can_delete_transaction(transaction_id)? {
            return Err(CoreError::HasActiveObligations(transaction_id));
        }

        let removed = self
            .store()
            .remove_transaction(transaction_id)
            .ok_or_else(|| CoreError::TransactionNotFound(transaction_id.to_string()))?;

        self.audit.record(
            AuditAction::TransactionPurged,
            user_id,
            "transaction",
            transaction_id,
            json!({ "reference": removed.reference }),
        );
        Ok(removed)
    }

    // =========================================================================
    // Bulk purges
    // =========================================================================

    /// Permanently delete every account matching the filter. Candidates are
    /// processed independently; a failure is logged and skipped.
    pub fn purge_accounts(&self, filter: &AccountFilter, user_id: i64) -> PurgeReport {
        let candidates: Vec<Account> = self
            .store()
            .accounts()
            .into_iter()
            .filter(|a| filter.matches(a))
            .collect();

        let mut report = PurgeReport {
            attempted: candidates.len(),
            ..Default::default()
        };
        for account in candidates {
            match self.permanent_delete_account(account.id, user_id) {
                Ok(_) => report.succeeded += 1,
                Err(e) => {
                    tracing::warn!(account_id = account.id, error = %e, "purge skipped account");
                    report.skipped.push((account.id, e));
                }
            }
        }
        report
    }

    /// Permanently delete every transaction matching the filter.
    pub fn purge_transactions(&self, filter: &TransactionFilter, user_id: i64) -> PurgeReport {
        let candidates: Vec<Transaction> = self
            .store()
            .transactions()
            .into_iter()
            .filter(|t| filter.matches(t))
            .collect();

        let mut report = PurgeReport {
            attempted: candidates.len(),
            ..Default::default()
        };
        for transaction in candidates {
            match self.permanent_delete_transaction(transaction.id, user_id) {
                Ok(_) => report.succeeded += 1,
                Err(e) => {
                    tracing::warn!(
                        transaction_id = transaction.id,
                        error = %e,
                        "purge skipped transaction"
                    );
                    report.skipped.push((transaction.id, e));
                }
            }
        }
        report
    }

    /// Permanently remove resolved (Approved or Rejected) approval requests
    /// resolved before the cutoff. Pending requests are never purged.
    pub fn purge_resolved_approvals(&self, before: DateTime<Utc>, user_id: i64) -> usize {
        let candidates: Vec<i64> = self
            .store()
            .approvals()
            .into_iter()
            .filter(|a| !a.is_pending())
            .filter(|a| a.resolved_at.map_or(false, |t| t < before))
            .map(|a| a.id)
            .collect();

        let mut purged = 0;
        for id in candidates {
            if self.store().remove_approval(id).is_some() {
                purged += 1;
            }
        }
        if purged > 0 {
            tracing::info!(purged, actor = user_id, "resolved approvals purged");
        }
        purged
    }

    // =========================================================================
    // Consistency validation
    // =========================================================================

    /// Recompute derived state from the transaction set and report every
    /// mismatch. Read-only: nothing is corrected.
    pub fn verify_consistency(&self) -> Vec<ConsistencyIssue> {
        let mut issues = Vec::new();

        for account in self.store().accounts() {
            let computed: Decimal = self
                .store()
                .transactions_for_account(account.id)
                .iter()
                .map(|t| t.effect())
                .sum();
            if computed != account.balance {
                issues.push(ConsistencyIssue::BalanceMismatch {
                    account_id: account.id,
                    recorded: account.balance,
                    computed,
                });
            }
        }

        for transaction in self.store().transactions() {
            if self.store().account(transaction.account_id).is_none() {
                issues.push(ConsistencyIssue::DanglingTransaction {
                    transaction_id: transaction.id,
                    account_id: transaction.account_id,
                });
            }

            if let Some(reference) = transaction.counterpart_reference() {
                if !self.store().contains_reference(&reference) {
                    issues.push(ConsistencyIssue::MissingCounterpart {
                        transaction_id: transaction.id,
                        reference,
                    });
                }
            }
        }

        issues
    }

    /// Recompute the reporting figures for one account from its Completed
    /// transactions.
    pub fn report_figures(&self, account_id: i64) -> CoreResult<ReportFigures> {
        if self.store().account(account_id).is_none() {
            return Err(CoreError::AccountNotFound(account_id.to_string()));
        }

        let mut figures = ReportFigures {
            total_deposits: Decimal::ZERO,
            total_withdrawals: Decimal::ZERO,
            transaction_count: 0,
        };
        for transaction in self.store().transactions_for_account(account_id) {
            if transaction.status != TransactionStatus::Completed {
                continue;
            }
            figures.transaction_count += 1;
            if transaction.amount >= Decimal::ZERO {
                figures.total_deposits += transaction.amount;
            } else {
                figures.total_withdrawals += transaction.amount.abs();
            }
        }
        Ok(figures)
    }

    /// Compare previously cached reporting figures against recomputed ones.
    pub fn verify_report(
        &self,
        account_id: i64,
        cached: &ReportFigures,
    ) -> CoreResult<Vec<ConsistencyIssue>> {
        let computed = self.report_figures(account_id)?;
        let mut issues = Vec::new();

        if cached.total_deposits != computed.total_deposits {
            issues.push(ConsistencyIssue::ReportMismatch {
                account_id,
                field: "total_deposits",
                cached: cached.total_deposits,
                computed: computed.total_deposits,
            });
        }
        if cached.total_withdrawals != computed.total_withdrawals {
            issues.push(ConsistencyIssue::ReportMismatch {
                account_id,
                field: "total_withdrawals",
                cached: cached.total_withdrawals,
                computed: computed.total_withdrawals,
            });
        }
        if cached.transaction_count != computed.transaction_count {
            issues.push(ConsistencyIssue::ReportMismatch {
                account_id,
                field: "transaction_count",
                cached: Decimal::from(cached.transaction_count),
                computed: Decimal::from(computed.transaction_count),
            });
        }
        Ok(issues)
    }
}
