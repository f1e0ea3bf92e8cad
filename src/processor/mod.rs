//! Transaction Processor
//!
//! Executes deposits, withdrawals, transfers, fees and interest accrual as
//! ledger mutations plus transaction-record creation. Amounts are recorded
//! signed (credits positive, debits negative) and `balance_after` snapshots
//! the post-mutation balance.
//!
//! A transfer is two ordered single-account mutations, not a multi-account
//! atomic commit: the debit runs first, and if the credit then fails the
//! debit is reversed as a compensating action. A failed compensation is
//! escalated as `TransferRolledBack` and never swallowed.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;

use crate::audit::{AuditAction, AuditTrail};
use crate::domain::{Account, Amount, Transaction, TransactionKind, TransactionStatus};
use crate::error::{CoreError, CoreResult};
use crate::ledger::AccountLedger;
use crate::store::EntityStore;

/// Processor over the ledger and shared store.
#[derive(Clone)]
pub struct TransactionProcessor {
    ledger: AccountLedger,
    audit: Arc<AuditTrail>,
}

impl TransactionProcessor {
    pub fn new(ledger: AccountLedger, audit: Arc<AuditTrail>) -> Self {
        Self { ledger, audit }
    }

    pub fn ledger(&self) -> &AccountLedger {
        &self.ledger
    }

    fn store(&self) -> &Arc<EntityStore> {
        self.ledger.store()
    }

    // =========================================================================
    // Validation & resolution
    // =========================================================================

    fn validate_amount(&self, amount: Decimal) -> CoreResult<()> {
        Amount::new(amount).map_err(|e| CoreError::InvalidAmount(e.to_string()))?;

        let config = self.ledger.config();
        if amount < config.min_transaction_amount || amount > config.max_transaction_amount {
            return Err(CoreError::InvalidAmount(format!(
                "amount {amount} outside [{}, {}]",
                config.min_transaction_amount, config.max_transaction_amount
            )));
        }
        Ok(())
    }

    fn resolve(&self, account_number: &str) -> CoreResult<Account> {
        self.store()
            .account_by_number(account_number)
            .ok_or_else(|| CoreError::AccountNotFound(account_number.to_string()))
    }

    fn record(
        &self,
        account_id: i64,
        kind: TransactionKind,
        signed_amount: Decimal,
        balance_after: Decimal,
        description: String,
        reference: String,
        counterpart: Option<i64>,
        user_id: i64,
    ) -> Transaction {
        let transaction = Transaction {
            id: self.store().next_transaction_id(),
            account_id,
            kind,
            amount: signed_amount,
            balance_after,
            description,
            reference,
            status: TransactionStatus::Completed,
            counterpart_account_id: counterpart,
            created_by: user_id,
            created_at: Utc::now(),
        };
        self.store().insert_transaction(transaction.clone());
        transaction
    }

    // =========================================================================
    // Deposits & withdrawals
    // =========================================================================

    /// Credit an account and create the Completed Deposit record.
    pub fn deposit(
        &self,
        account_number: &str,
        amount: Decimal,
        description: &str,
        user_id: i64,
    ) -> CoreResult<Transaction> {
        self.validate_amount(amount)?;
        let account = self.resolve(account_number)?;

        let balance_after = self.ledger.adjust_balance(account.id, amount)?;
        let transaction = self.record(
            account.id,
            TransactionKind::Deposit,
            amount,
            balance_after,
            description.to_string(),
            self.store().generate_reference(),
            None,
            user_id,
        );

        self.audit.record(
            AuditAction::DepositPosted,
            user_id,
            "transaction",
            transaction.id,
            json!({ "account_number": account_number, "amount": amount.to_string() }),
        );
        tracing::info!(account_id = account.id, %amount, "deposit posted");

        Ok(transaction)
    }

    /// Debit an account, subject to the daily withdrawal limit and the
    /// variant's minimum balance, and create the Completed Withdrawal record.
    pub fn withdraw(
        &self,
        account_number: &str,
        amount: Decimal,
        description: &str,
        user_id: i64,
    ) -> CoreResult<Transaction> {
        self.validate_amount(amount)?;
        let account = self.resolve(account_number)?;
        let today = Utc::now().date_naive();

        // Headroom is reserved atomically before the debit and released
        // again if the debit fails.
        self.ledger.reserve_withdrawal(account.id, amount, today)?;
        let balance_after = match self.ledger.adjust_balance(account.id, -amount) {
            Ok(balance) => balance,
            Err(e) => {
                self.ledger.unrecord_withdrawal(account.id, amount, today);
                return Err(e);
            }
        };

        let transaction = self.record(
            account.id,
            TransactionKind::Withdrawal,
            -amount,
            balance_after,
            description.to_string(),
            self.store().generate_reference(),
            None,
            user_id,
        );

        self.audit.record(
            AuditAction::WithdrawalPosted,
            user_id,
            "transaction",
            transaction.id,
            json!({ "account_number": account_number, "amount": amount.to_string() }),
        );
        tracing::info!(account_id = account.id, %amount, "withdrawal posted");

        Ok(transaction)
    }

    // =========================================================================
    // Transfers
    // =========================================================================

    /// Move money between two accounts. Returns the (TransferOut, TransferIn)
    /// record pair; each leg carries the counterpart account id and the legs
    /// share a reference prefix.
    pub fn transfer(
        &self,
        from_account_number: &str,
        to_account_number: &str,
        amount: Decimal,
        description: &str,
        user_id: i64,
    ) -> CoreResult<(Transaction, Transaction)> {
        if from_account_number == to_account_number {
            return Err(CoreError::SameAccount);
        }

        self.validate_amount(amount)?;
        let from = self.resolve(from_account_number)?;
        let to = self.resolve(to_account_number)?;
        let today = Utc::now().date_naive();

        self.ledger.reserve_withdrawal(from.id, amount, today)?;

        // Debit first; on credit failure the debit is compensated.
        let from_balance = match self.ledger.adjust_balance(from.id, -amount) {
            Ok(balance) => balance,
            Err(e) => {
                self.ledger.unrecord_withdrawal(from.id, amount, today);
                return Err(e);
            }
        };
        let to_balance = match self.ledger.adjust_balance(to.id, amount) {
            Ok(balance) => balance,
            Err(credit_err) => {
                if let Err(reversal_err) = self.ledger.adjust_balance(from.id, amount) {
                    self.audit.record(
                        AuditAction::TransferRolledBack,
                        user_id,
                        "account",
                        from.id,
                        json!({
                            "credit_error": credit_err.to_string(),
                            "reversal_error": reversal_err.to_string(),
                        }),
                    );
                    tracing::error!(
                        from_account_id = from.id,
                        to_account_id = to.id,
                        %credit_err,
                        %reversal_err,
                        "transfer compensation failed, ledger may be inconsistent"
                    );
                    return Err(CoreError::TransferRolledBack(format!(
                        "credit failed ({credit_err}); debit reversal also failed ({reversal_err})"
                    )));
                }
                // Debit compensated, so the reservation is released too
                self.ledger.unrecord_withdrawal(from.id, amount, today);
                tracing::warn!(
                    from_account_id = from.id,
                    to_account_id = to.id,
                    %credit_err,
                    "transfer credit failed, debit compensated"
                );
                return Err(credit_err);
            }
        };

        let prefix = self.store().generate_reference();
        let out = self.record(
            from.id,
            TransactionKind::TransferOut,
            -amount,
            from_balance,
            description.to_string(),
            format!("{prefix}-OUT"),
            Some(to.id),
            user_id,
        );
        let incoming = self.record(
            to.id,
            TransactionKind::TransferIn,
            amount,
            to_balance,
            description.to_string(),
            format!("{prefix}-IN"),
            Some(from.id),
            user_id,
        );

        self.audit.record(
            AuditAction::TransferExecuted,
            user_id,
            "transaction",
            out.id,
            json!({
                "from": from_account_number,
                "to": to_account_number,
                "amount": amount.to_string(),
                "reference_prefix": prefix,
            }),
        );
        tracing::info!(
            from_account_id = from.id,
            to_account_id = to.id,
            %amount,
            "transfer executed"
        );

        Ok((out, incoming))
    }

    // =========================================================================
    // Fees & interest
    // =========================================================================

    /// Charge a fee. Fees respect the minimum-balance floor but do not count
    /// toward the daily withdrawal limit.
    pub fn charge_fee(
        &self,
        account_number: &str,
        amount: Decimal,
        description: &str,
        user_id: i64,
    ) -> CoreResult<Transaction> {
        self.validate_amount(amount)?;
        let account = self.resolve(account_number)?;

        let balance_after = self.ledger.adjust_balance(account.id, -amount)?;
        let transaction = self.record(
            account.id,
            TransactionKind::Fee,
            -amount,
            balance_after,
            description.to_string(),
            self.store().generate_reference(),
            None,
            user_id,
        );

        self.audit.record(
            AuditAction::FeeCharged,
            user_id,
            "transaction",
            transaction.id,
            json!({ "account_number": account_number, "amount": amount.to_string() }),
        );

        Ok(transaction)
    }

    /// Accrue one day of interest at the variant's annual rate. Returns
    /// `None` when the variant carries no interest or the rounded accrual
    /// is zero.
    pub fn accrue_interest(
        &self,
        account_number: &str,
        user_id: i64,
    ) -> CoreResult<Option<Transaction>> {
        let account = self.resolve(account_number)?;

        let rate = account.variant.interest_rate();
        if rate.is_zero() {
            return Ok(None);
        }

        let daily = (account.balance * rate / Decimal::from(365)).round_dp(2);
        if daily <= Decimal::ZERO {
            return Ok(None);
        }

        let balance_after = self.ledger.adjust_balance(account.id, daily)?;
        let transaction = self.record(
            account.id,
            TransactionKind::Interest,
            daily,
            balance_after,
            format!("Daily interest at {rate}"),
            self.store().generate_reference(),
            None,
            user_id,
        );

        self.audit.record(
            AuditAction::InterestAccrued,
            user_id,
            "transaction",
            transaction.id,
            json!({ "account_number": account_number, "amount": daily.to_string() }),
        );

        Ok(Some(transaction))
    }

    // =========================================================================
    // Reversal
    // =========================================================================

    /// Post a compensating Reversal for a Completed transaction. The original
    /// record stays Completed; the reversal carries the negated amount, so
    /// the pair nets to zero. A transaction can be reversed at most once.
    pub fn reverse_transaction(&self, reference: &str, user_id: i64) -> CoreResult<Transaction> {
        let original = self
            .store()
            .transaction_by_reference(reference)
            .ok_or_else(|| CoreError::TransactionNotFound(reference.to_string()))?;

        if original.status != TransactionStatus::Completed {
            return Err(CoreError::AlreadyResolved(original.id));
        }
        let reversal_reference = format!("{reference}-REV");
        if self.store().contains_reference(&reversal_reference) {
            return Err(CoreError::AlreadyResolved(original.id));
        }

        let balance_after = self
            .ledger
            .adjust_balance(original.account_id, -original.amount)?;
        if original.kind.counts_toward_daily_limit() {
            self.ledger.unrecord_withdrawal(
                original.account_id,
                original.amount.abs(),
                original.created_at.date_naive(),
            );
        }

        let reversal = self.record(
            original.account_id,
            TransactionKind::Reversal,
            -original.amount,
            balance_after,
            format!("Reversal of {reference}"),
            reversal_reference,
            original.counterpart_account_id,
            user_id,
        );

        self.audit.record(
            AuditAction::TransactionReversed,
            user_id,
            "transaction",
            reversal.id,
            json!({ "reference": reference }),
        );

        Ok(reversal)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Transaction history for an account, newest first.
    pub fn transactions_for_account(&self, account_id: i64) -> Vec<Transaction> {
        let mut history = self.store().transactions_for_account(account_id);
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        history
    }

    pub fn transaction_by_reference(&self, reference: &str) -> CoreResult<Transaction> {
        self.store()
            .transaction_by_reference(reference)
            .ok_or_else(|| CoreError::TransactionNotFound(reference.to_string()))
    }

    pub fn daily_withdrawal_total(&self, account_id: i64, date: chrono::NaiveDate) -> Decimal {
        self.store().daily_withdrawal_total(account_id, date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::domain::{Customer, VariantKind};
    use rust_decimal_macros::dec;

    fn setup() -> (Arc<EntityStore>, TransactionProcessor) {
        let store = Arc::new(EntityStore::new());
        let audit = Arc::new(AuditTrail::new());
        let ledger = AccountLedger::new(
            Arc::clone(&store),
            Arc::new(CoreConfig::default()),
            Arc::clone(&audit),
        );
        let processor = TransactionProcessor::new(ledger, audit);
        store.insert_customer(Customer {
            id: store.next_customer_id(),
            name: "Ira Banks".to_string(),
            created_at: Utc::now(),
        });
        (store, processor)
    }

    fn open(processor: &TransactionProcessor, kind: VariantKind, deposit: Decimal) -> Account {
        processor.ledger().open_account(1, kind, deposit, 1).unwrap()
    }

    #[test]
    fn test_deposit_creates_completed_record() {
        let (_, processor) = setup();
        let account = open(&processor, VariantKind::Checking, dec!(100));

        let txn = processor
            .deposit(&account.account_number, dec!(250), "payroll", 7)
            .unwrap();

        assert_eq!(txn.kind, TransactionKind::Deposit);
        assert_eq!(txn.amount, dec!(250));
        assert_eq!(txn.balance_after, dec!(350));
        assert_eq!(txn.status, TransactionStatus::Completed);
        assert_eq!(txn.created_by, 7);
        assert!(txn.reference.starts_with("TXN-"));
    }

    #[test]
    fn test_deposit_unknown_account() {
        let (_, processor) = setup();
        let result = processor.deposit("0000000000", dec!(10), "x", 1);
        assert!(matches!(result, Err(CoreError::AccountNotFound(_))));
    }

    #[test]
    fn test_deposit_rejects_out_of_bounds_amount() {
        let (_, processor) = setup();
        let account = open(&processor, VariantKind::Checking, dec!(100));

        assert!(matches!(
            processor.deposit(&account.account_number, dec!(0), "zero", 1),
            Err(CoreError::InvalidAmount(_))
        ));
        assert!(matches!(
            processor.deposit(&account.account_number, dec!(2_000_000), "huge", 1),
            Err(CoreError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_withdraw_updates_daily_total() {
        let (store, processor) = setup();
        let account = open(&processor, VariantKind::Savings, dec!(5_000));
        let today = Utc::now().date_naive();

        let txn = processor
            .withdraw(&account.account_number, dec!(300), "cash", 1)
            .unwrap();
        assert_eq!(txn.amount, dec!(-300));
        assert_eq!(txn.balance_after, dec!(4_700));
        assert_eq!(store.daily_withdrawal_total(account.id, today), dec!(300));
    }

    #[test]
    fn test_withdraw_daily_limit() {
        let (_, processor) = setup();
        // Savings: daily limit 2000
        let account = open(&processor, VariantKind::Savings, dec!(10_000));

        processor
            .withdraw(&account.account_number, dec!(1200), "first", 1)
            .unwrap();
        let result = processor.withdraw(&account.account_number, dec!(900), "second", 1);
        assert!(matches!(result, Err(CoreError::DailyLimitExceeded { .. })));
    }

    #[test]
    fn test_withdraw_insufficient_funds_leaves_total() {
        let (store, processor) = setup();
        let account = open(&processor, VariantKind::Checking, dec!(100));
        let today = Utc::now().date_naive();

        let result = processor.withdraw(&account.account_number, dec!(500), "too much", 1);
        assert!(matches!(result, Err(CoreError::InsufficientFunds { .. })));
        // Failed withdrawal must not consume daily headroom
        assert_eq!(store.daily_withdrawal_total(account.id, today), dec!(0));
    }

    #[test]
    fn test_transfer_moves_balances_and_links_records() {
        let (store, processor) = setup();
        let from = open(&processor, VariantKind::Checking, dec!(1_000));
        let to = open(&processor, VariantKind::Checking, dec!(200));

        let (out, incoming) = processor
            .transfer(&from.account_number, &to.account_number, dec!(400), "rent", 1)
            .unwrap();

        assert_eq!(out.kind, TransactionKind::TransferOut);
        assert_eq!(out.amount, dec!(-400));
        assert_eq!(out.counterpart_account_id, Some(to.id));
        assert_eq!(incoming.kind, TransactionKind::TransferIn);
        assert_eq!(incoming.amount, dec!(400));
        assert_eq!(incoming.counterpart_account_id, Some(from.id));

        // Shared reference prefix, complementary suffixes
        assert!(out.reference.ends_with("-OUT"));
        assert!(incoming.reference.ends_with("-IN"));
        assert_eq!(
            out.reference.trim_end_matches("-OUT"),
            incoming.reference.trim_end_matches("-IN")
        );

        assert_eq!(store.account(from.id).unwrap().balance, dec!(600));
        assert_eq!(store.account(to.id).unwrap().balance, dec!(600));
    }

    #[test]
    fn test_transfer_same_account() {
        let (_, processor) = setup();
        let account = open(&processor, VariantKind::Checking, dec!(1_000));
        let result = processor.transfer(
            &account.account_number,
            &account.account_number,
            dec!(10),
            "loop",
            1,
        );
        assert_eq!(result, Err(CoreError::SameAccount));
    }

    #[test]
    fn test_transfer_credit_failure_compensates_debit() {
        let (store, processor) = setup();
        let from = open(&processor, VariantKind::Checking, dec!(1_000));
        let to = open(&processor, VariantKind::Checking, dec!(200));

        // Suspend the destination so the credit step fails after the debit
        processor.ledger().suspend_account(to.id, 1).unwrap();

        let result = processor.transfer(
            &from.account_number,
            &to.account_number,
            dec!(400),
            "doomed",
            1,
        );
        assert!(matches!(result, Err(CoreError::AccountNotActive(_))));

        // Debit was reversed; no transfer records persisted
        assert_eq!(store.account(from.id).unwrap().balance, dec!(1_000));
        assert_eq!(store.account(to.id).unwrap().balance, dec!(200));
        let records = store.transactions_for_account(from.id);
        assert!(records.iter().all(|t| t.kind != TransactionKind::TransferOut));
        // And no daily-limit headroom was consumed
        let today = Utc::now().date_naive();
        assert_eq!(store.daily_withdrawal_total(from.id, today), dec!(0));
    }

    #[test]
    fn test_transfer_counts_toward_daily_limit() {
        let (_, processor) = setup();
        let from = open(&processor, VariantKind::Savings, dec!(10_000));
        let to = open(&processor, VariantKind::Checking, dec!(100));

        processor
            .transfer(&from.account_number, &to.account_number, dec!(1_500), "a", 1)
            .unwrap();
        // 1500 + 800 > 2000
        let result = processor.withdraw(&from.account_number, dec!(800), "b", 1);
        assert!(matches!(result, Err(CoreError::DailyLimitExceeded { .. })));
    }

    #[test]
    fn test_fee_skips_daily_limit() {
        let (store, processor) = setup();
        let account = open(&processor, VariantKind::Savings, dec!(10_000));
        let today = Utc::now().date_naive();

        let txn = processor
            .charge_fee(&account.account_number, dec!(25), "maintenance", 1)
            .unwrap();
        assert_eq!(txn.kind, TransactionKind::Fee);
        assert_eq!(txn.amount, dec!(-25));
        assert_eq!(store.daily_withdrawal_total(account.id, today), dec!(0));
    }

    #[test]
    fn test_interest_accrual() {
        let (_, processor) = setup();
        let savings = open(&processor, VariantKind::Savings, dec!(10_000));
        let checking = open(&processor, VariantKind::Checking, dec!(10_000));

        // 10000 * 0.045 / 365 = 1.2328... -> 1.23
        let txn = processor
            .accrue_interest(&savings.account_number, 1)
            .unwrap()
            .unwrap();
        assert_eq!(txn.kind, TransactionKind::Interest);
        assert_eq!(txn.amount, dec!(1.23));

        // Checking carries no interest
        assert!(processor
            .accrue_interest(&checking.account_number, 1)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_reverse_transaction_once() {
        let (store, processor) = setup();
        let account = open(&processor, VariantKind::Checking, dec!(1_000));

        let deposit = processor
            .deposit(&account.account_number, dec!(200), "dup posting", 1)
            .unwrap();
        let reversal = processor.reverse_transaction(&deposit.reference, 2).unwrap();

        assert_eq!(reversal.kind, TransactionKind::Reversal);
        assert_eq!(reversal.amount, dec!(-200));
        assert_eq!(store.account(account.id).unwrap().balance, dec!(1_000));

        // Second reversal of the same record is refused
        let again = processor.reverse_transaction(&deposit.reference, 2);
        assert!(matches!(again, Err(CoreError::AlreadyResolved(_))));
    }

    #[test]
    fn test_history_is_newest_first() {
        let (_, processor) = setup();
        let account = open(&processor, VariantKind::Checking, dec!(1_000));

        processor.deposit(&account.account_number, dec!(10), "a", 1).unwrap();
        processor.deposit(&account.account_number, dec!(20), "b", 1).unwrap();

        let history = processor.transactions_for_account(account.id);
        assert_eq!(history.len(), 3); // opening deposit + two
        assert_eq!(history[0].description, "b");
        assert_eq!(history[1].description, "a");
    }
}
