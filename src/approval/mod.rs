//! Approval Workflow
//!
//! Classifies transaction requests against role-based ceilings and manages
//! the approval request state machine. An amount at or below the requester's
//! auto-approval ceiling executes immediately; above it, a Pending request
//! is created for audit, which the requester may resolve themselves only
//! within their self-approval ceiling. A resolved request is never reopened,
//! and a request executes at most once.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;

use crate::audit::{AuditAction, AuditTrail};
use crate::config::CoreConfig;
use crate::domain::{
    Amount, ApprovalRequest, ApprovalStatus, Role, Transaction, TransactionRequest,
};
use crate::error::{CoreError, CoreResult};
use crate::processor::TransactionProcessor;
use crate::store::EntityStore;

/// How a request routes, given the requester's role and the amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    NoApprovalNeeded,
    SelfApprovable,
    RequiresExternalApproval,
}

/// Actions gated by role/amount, for the centralized permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizedAction {
    /// Execute a transaction with no approval record
    PostWithoutApproval,
    /// Approve one's own pending request
    SelfApprove,
    /// Approve another user's pending request
    ApproveForOthers,
}

/// Centralized permission check consumed by the workflow and by external
/// callers; pure over the configuration.
pub fn authorize(
    config: &CoreConfig,
    role: Role,
    action: AuthorizedAction,
    amount: Decimal,
) -> bool {
    let limits = config.limits_for(role);
    match action {
        AuthorizedAction::PostWithoutApproval => amount <= limits.auto_approval_ceiling,
        // A role's self-approval ceiling is its overall approval authority
        AuthorizedAction::SelfApprove | AuthorizedAction::ApproveForOthers => {
            amount <= limits.self_approval_ceiling
        }
    }
}

/// Outcome of submitting a transaction request through the workflow.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// Below the auto-approval ceiling; executed immediately, no record
    Executed(Vec<Transaction>),
    /// Above auto but within self-approval; recorded, self-approved, executed
    SelfApproved {
        approval: ApprovalRequest,
        transactions: Vec<Transaction>,
    },
    /// Awaiting an external decision; nothing executed
    Pending(ApprovalRequest),
}

/// Workflow over the processor and shared store.
#[derive(Clone)]
pub struct ApprovalWorkflow {
    processor: TransactionProcessor,
    config: Arc<CoreConfig>,
    audit: Arc<AuditTrail>,
}

impl ApprovalWorkflow {
    pub fn new(
        processor: TransactionProcessor,
        config: Arc<CoreConfig>,
        audit: Arc<AuditTrail>,
    ) -> Self {
        Self {
            processor,
            config,
            audit,
        }
    }

    fn store(&self) -> &Arc<EntityStore> {
        self.processor.ledger().store()
    }

    // =========================================================================
    // Classification
    // =========================================================================

    pub fn classify(&self, role: Role, amount: Decimal) -> Classification {
        let limits = self.config.limits_for(role);
        if amount <= limits.auto_approval_ceiling {
            Classification::NoApprovalNeeded
        } else if amount <= limits.self_approval_ceiling {
            Classification::SelfApprovable
        } else {
            Classification::RequiresExternalApproval
        }
    }

    pub fn requires_approval(&self, role: Role, amount: Decimal) -> bool {
        self.classify(role, amount) != Classification::NoApprovalNeeded
    }

    pub fn can_self_approve(&self, role: Role, amount: Decimal) -> bool {
        authorize(&self.config, role, AuthorizedAction::SelfApprove, amount)
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Route a transaction request: execute immediately, self-approve, or
    /// park it as Pending for an external decision.
    pub fn submit(
        &self,
        request: TransactionRequest,
        user_id: i64,
        role: Role,
    ) -> CoreResult<SubmitOutcome> {
        match self.classify(role, request.amount()) {
            Classification::NoApprovalNeeded => {
                let transactions = self.execute(&request, user_id)?;
                Ok(SubmitOutcome::Executed(transactions))
            }
            Classification::SelfApprovable => {
                // The Pending record is created even though it is resolved
                // immediately, so the audit history shows the self-approval.
                let approval = self.create_request(request, user_id, role)?;
                let approval = self.approve(approval.id, user_id, role, "Self-approved")?;
                let transactions = approval
                    .executed_transaction_ids
                    .iter()
                    .filter_map(|id| self.store().transaction(*id))
                    .collect();
                Ok(SubmitOutcome::SelfApproved {
                    approval,
                    transactions,
                })
            }
            Classification::RequiresExternalApproval => {
                let approval = self.create_request(request, user_id, role)?;
                Ok(SubmitOutcome::Pending(approval))
            }
        }
    }

    /// Create a Pending approval request.
    pub fn create_request(
        &self,
        request: TransactionRequest,
        user_id: i64,
        role: Role,
    ) -> CoreResult<ApprovalRequest> {
        Amount::new(request.amount()).map_err(|e| CoreError::InvalidAmount(e.to_string()))?;

        let approval = ApprovalRequest {
            id: self.store().next_approval_id(),
            request,
            requester_id: user_id,
            requester_role: role,
            status: ApprovalStatus::Pending,
            approver_id: None,
            comments: None,
            requested_at: Utc::now(),
            resolved_at: None,
            executed_transaction_ids: Vec::new(),
        };
        self.store().insert_approval(approval.clone());

        self.audit.record(
            AuditAction::ApprovalRequested,
            user_id,
            "approval",
            approval.id,
            json!({
                "kind": approval.request.kind_name(),
                "amount": approval.amount().to_string(),
                "role": role.as_str(),
            }),
        );
        tracing::info!(approval_id = approval.id, amount = %approval.amount(), "approval requested");

        Ok(approval)
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Approve a pending request and execute its transaction. If execution
    /// fails the request reverts to Pending and the error propagates, so a
    /// request is Approved if and only if its transaction committed.
    pub fn approve(
        &self,
        approval_id: i64,
        approver_id: i64,
        approver_role: Role,
        comments: &str,
    ) -> CoreResult<ApprovalRequest> {
        let approval = self
            .store()
            .approval(approval_id)
            .ok_or(CoreError::ApprovalNotFound(approval_id))?;

        self.check_resolution_authority(&approval, approver_id, approver_role)?;

        // Claim the request under its entry lock so two approvers cannot
        // both execute it.
        let mut claimed = false;
        self.store().update_approval_with(approval_id, |a| {
            if a.status == ApprovalStatus::Pending {
                a.status = ApprovalStatus::Approved;
                a.approver_id = Some(approver_id);
                claimed = true;
            }
        })?;
        if !claimed {
            return Err(CoreError::AlreadyResolved(approval_id));
        }

        let executed = match self.execute(&approval.request, approver_id) {
            Ok(transactions) => transactions,
            Err(e) => {
                // Release the claim; the request stays open for retry
                self.store().update_approval_with(approval_id, |a| {
                    a.status = ApprovalStatus::Pending;
                    a.approver_id = None;
                })?;
                return Err(e);
            }
        };

        let resolved = self.store().update_approval_with(approval_id, |a| {
            a.comments = if comments.trim().is_empty() {
                None
            } else {
                Some(comments.to_string())
            };
            a.resolved_at = Some(Utc::now());
            a.executed_transaction_ids = executed.iter().map(|t| t.id).collect();
        })?;

        let self_approved = approver_id == approval.requester_id;
        self.audit.record(
            if self_approved {
                AuditAction::SelfApproved
            } else {
                AuditAction::ApprovalGranted
            },
            approver_id,
            "approval",
            approval_id,
            json!({
                "amount": approval.amount().to_string(),
                "transactions": resolved.executed_transaction_ids,
            }),
        );
        tracing::info!(approval_id, approver_id, self_approved, "approval granted");

        Ok(resolved)
    }

    /// Reject a pending request. No transaction is ever executed for a
    /// rejected request.
    pub fn reject(
        &self,
        approval_id: i64,
        approver_id: i64,
        approver_role: Role,
        reason: &str,
    ) -> CoreResult<ApprovalRequest> {
        if reason.trim().is_empty() {
            return Err(CoreError::ReasonRequired);
        }

        let approval = self
            .store()
            .approval(approval_id)
            .ok_or(CoreError::ApprovalNotFound(approval_id))?;

        self.check_resolution_authority(&approval, approver_id, approver_role)?;

        let mut claimed = false;
        let resolved = self.store().update_approval_with(approval_id, |a| {
            if a.status == ApprovalStatus::Pending {
                a.status = ApprovalStatus::Rejected;
                a.approver_id = Some(approver_id);
                a.comments = Some(reason.to_string());
                a.resolved_at = Some(Utc::now());
                claimed = true;
            }
        })?;
        if !claimed {
            return Err(CoreError::AlreadyResolved(approval_id));
        }

        self.audit.record(
            AuditAction::ApprovalRejected,
            approver_id,
            "approval",
            approval_id,
            json!({ "amount": approval.amount().to_string(), "reason": reason }),
        );
        tracing::info!(approval_id, approver_id, "approval rejected");

        Ok(resolved)
    }

    fn check_resolution_authority(
        &self,
        approval: &ApprovalRequest,
        approver_id: i64,
        approver_role: Role,
    ) -> CoreResult<()> {
        let action = if approver_id == approval.requester_id {
            AuthorizedAction::SelfApprove
        } else {
            AuthorizedAction::ApproveForOthers
        };
        if !authorize(&self.config, approver_role, action, approval.amount()) {
            return Err(CoreError::NotAuthorized(format!(
                "{} may not resolve a {} request",
                approver_role,
                approval.amount()
            )));
        }
        Ok(())
    }

    fn execute(&self, request: &TransactionRequest, user_id: i64) -> CoreResult<Vec<Transaction>> {
        match request {
            TransactionRequest::Deposit {
                account_number,
                amount,
                description,
            } => {
                let txn = self
                    .processor
                    .deposit(account_number, *amount, description, user_id)?;
                Ok(vec![txn])
            }
            TransactionRequest::Withdrawal {
                account_number,
                amount,
                description,
            } => {
                let txn = self
                    .processor
                    .withdraw(account_number, *amount, description, user_id)?;
                Ok(vec![txn])
            }
            TransactionRequest::Transfer {
                from_account_number,
                to_account_number,
                amount,
                description,
            } => {
                let (out, incoming) = self.processor.transfer(
                    from_account_number,
                    to_account_number,
                    *amount,
                    description,
                    user_id,
                )?;
                Ok(vec![out, incoming])
            }
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn approval(&self, approval_id: i64) -> CoreResult<ApprovalRequest> {
        self.store()
            .approval(approval_id)
            .ok_or(CoreError::ApprovalNotFound(approval_id))
    }

    /// Pending requests the given user is authorized to resolve: their own
    /// self-approvable ones plus others' requests within their approval
    /// authority, oldest first.
    pub fn pending_for(&self, user_id: i64, role: Role) -> Vec<ApprovalRequest> {
        let mut pending: Vec<ApprovalRequest> = self
            .store()
            .approvals()
            .into_iter()
            .filter(|a| a.is_pending())
            .filter(|a| {
                let action = if a.requester_id == user_id {
                    AuthorizedAction::SelfApprove
                } else {
                    AuthorizedAction::ApproveForOthers
                };
                authorize(&self.config, role, action, a.amount())
            })
            .collect();
        pending.sort_by(|a, b| a.requested_at.cmp(&b.requested_at).then(a.id.cmp(&b.id)));
        pending
    }
}
