//! Account Ledger
//!
//! Owns the account lifecycle and every balance mutation. `adjust_balance`
//! is the single choke point through which all balance changes pass; the
//! transaction processor never touches a balance directly.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;

use crate::audit::{AuditAction, AuditTrail};
use crate::config::CoreConfig;
use crate::domain::{
    Account, AccountStatus, AccountVariant, Amount, Transaction, TransactionKind,
    TransactionStatus, VariantKind,
};
use crate::error::{CoreError, CoreResult};
use crate::store::EntityStore;

/// Ledger over the shared entity store.
#[derive(Clone)]
pub struct AccountLedger {
    store: Arc<EntityStore>,
    config: Arc<CoreConfig>,
    audit: Arc<AuditTrail>,
}

impl AccountLedger {
    pub fn new(store: Arc<EntityStore>, config: Arc<CoreConfig>, audit: Arc<AuditTrail>) -> Self {
        Self {
            store,
            config,
            audit,
        }
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    // =========================================================================
    // Account opening
    // =========================================================================

    /// Open a new account with an initial deposit.
    ///
    /// The opening deposit is posted as a Completed Deposit transaction so
    /// that balance conservation holds from the moment of creation.
    pub fn open_account(
        &self,
        customer_id: i64,
        kind: VariantKind,
        initial_deposit: Decimal,
        user_id: i64,
    ) -> CoreResult<Account> {
        if self.store.customer(customer_id).is_none() {
            return Err(CoreError::CustomerNotFound(customer_id));
        }

        Amount::new(initial_deposit).map_err(|e| CoreError::InvalidAmount(e.to_string()))?;

        let variant = AccountVariant::new(kind, self.config.params_for(kind).clone());
        let (min_open, max_open) = variant.opening_bounds();
        if initial_deposit < min_open || initial_deposit > max_open {
            return Err(CoreError::InvalidAmount(format!(
                "opening deposit {initial_deposit} outside [{min_open}, {max_open}] for {kind}"
            )));
        }

        let now = Utc::now();
        let account = Account {
            id: self.store.next_account_id(),
            account_number: self.store.generate_account_number(),
            customer_id,
            variant,
            balance: initial_deposit,
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        };
        // generate_account_number checked the index; a concurrent insert of
        // the same number still surfaces here as DuplicateAccountNumber
        self.store.insert_account(account.clone())?;

        let opening = Transaction {
            id: self.store.next_transaction_id(),
            account_id: account.id,
            kind: TransactionKind::Deposit,
            amount: initial_deposit,
            balance_after: initial_deposit,
            description: "Opening deposit".to_string(),
            reference: self.store.generate_reference(),
            status: TransactionStatus::Completed,
            counterpart_account_id: None,
            created_by: user_id,
            created_at: now,
        };
        self.store.insert_transaction(opening);

        self.audit.record(
            AuditAction::AccountOpened,
            user_id,
            "account",
            account.id,
            json!({
                "account_number": account.account_number,
                "variant": kind.as_str(),
                "initial_deposit": initial_deposit.to_string(),
            }),
        );
        tracing::info!(account_id = account.id, %kind, "account opened");

        Ok(account)
    }

    // =========================================================================
    // Balance mutation
    // =========================================================================

    /// Apply a signed delta to an account balance and return the new balance.
    ///
    /// The status check, floor check and mutation run atomically under the
    /// account's entry lock.
    pub fn adjust_balance(&self, account_id: i64, delta: Decimal) -> CoreResult<Decimal> {
        let updated = self.store.try_update_account_with(account_id, |account| {
            if !account.is_active() {
                return Err(CoreError::AccountNotActive(account.account_number.clone()));
            }

            let new_balance = account.balance + delta;
            if delta < Decimal::ZERO && new_balance < account.variant.minimum_balance() {
                // Clamped: an account already below its floor has no headroom,
                // not negative headroom
                return Err(CoreError::insufficient_funds(
                    -delta,
                    (account.balance - account.variant.minimum_balance()).max(Decimal::ZERO),
                ));
            }

            account.balance = new_balance;
            account.updated_at = Utc::now();
            Ok(())
        })?;

        Ok(updated.balance)
    }

    // =========================================================================
    // Daily withdrawal limit
    // =========================================================================

    /// Reserve daily-limit headroom for a withdrawal before the debit runs.
    /// The limit check and the running-total increment are a single atomic
    /// store operation, so two concurrent withdrawals cannot both slip
    /// under the limit. Release with
    /// [`unrecord_withdrawal`](Self::unrecord_withdrawal) if the debit
    /// then fails.
    pub fn reserve_withdrawal(
        &self,
        account_id: i64,
        amount: Decimal,
        date: NaiveDate,
    ) -> CoreResult<()> {
        let account = self
            .store
            .account(account_id)
            .ok_or_else(|| CoreError::AccountNotFound(account_id.to_string()))?;

        self.store.try_record_daily_withdrawal(
            account_id,
            date,
            amount,
            account.variant.daily_withdrawal_limit(),
        )
    }

    /// Add a withdrawal back to the day's running total without a limit
    /// check (undo of a cancellation compensation).
    pub fn record_withdrawal(&self, account_id: i64, amount: Decimal, date: NaiveDate) {
        self.store.record_daily_withdrawal(account_id, date, amount);
    }

    /// Back a withdrawal out of the day's running total (cancellation,
    /// reversal, rollback).
    pub fn unrecord_withdrawal(&self, account_id: i64, amount: Decimal, date: NaiveDate) {
        self.store.unrecord_daily_withdrawal(account_id, date, amount);
    }

    // =========================================================================
    // Status transitions
    // =========================================================================

    /// Close an account. One-way: a closed account is never reopened.
    pub fn close_account(&self, account_id: i64, user_id: i64) -> CoreResult<Account> {
        let updated = self.store.try_update_account_with(account_id, |account| {
            if !account.is_active() {
                return Err(CoreError::AccountNotActive(account.account_number.clone()));
            }
            account.status = AccountStatus::Closed;
            account.updated_at = Utc::now();
            Ok(())
        })?;

        self.audit.record(
            AuditAction::AccountClosed,
            user_id,
            "account",
            account_id,
            json!({ "account_number": updated.account_number }),
        );
        Ok(updated)
    }

    /// Suspend an active account; balances are retained and no transaction
    /// may touch the account until it is reactivated.
    pub fn suspend_account(&self, account_id: i64, user_id: i64) -> CoreResult<Account> {
        let updated = self.store.try_update_account_with(account_id, |account| {
            if !account.is_active() {
                return Err(CoreError::AccountNotActive(account.account_number.clone()));
            }
            account.status = AccountStatus::Suspended;
            account.updated_at = Utc::now();
            Ok(())
        })?;

        self.audit.record(
            AuditAction::AccountSuspended,
            user_id,
            "account",
            account_id,
            json!({ "account_number": updated.account_number }),
        );
        Ok(updated)
    }

    /// Lift a suspension.
    pub fn reactivate_account(&self, account_id: i64, user_id: i64) -> CoreResult<Account> {
        let updated = self.store.try_update_account_with(account_id, |account| {
            if account.status != AccountStatus::Suspended {
                return Err(CoreError::AccountNotActive(account.account_number.clone()));
            }
            account.status = AccountStatus::Active;
            account.updated_at = Utc::now();
            Ok(())
        })?;

        self.audit.record(
            AuditAction::AccountReactivated,
            user_id,
            "account",
            account_id,
            json!({ "account_number": updated.account_number }),
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Customer;
    use rust_decimal_macros::dec;

    fn setup() -> (Arc<EntityStore>, AccountLedger) {
        let store = Arc::new(EntityStore::new());
        let ledger = AccountLedger::new(
            Arc::clone(&store),
            Arc::new(CoreConfig::default()),
            Arc::new(AuditTrail::new()),
        );
        let customer = Customer {
            id: store.next_customer_id(),
            name: "Dana Fields".to_string(),
            created_at: Utc::now(),
        };
        store.insert_customer(customer);
        (store, ledger)
    }

    #[test]
    fn test_open_account_posts_opening_deposit() {
        let (store, ledger) = setup();
        let account = ledger
            .open_account(1, VariantKind::Checking, dec!(500), 1)
            .unwrap();

        assert_eq!(account.balance, dec!(500));
        assert_eq!(account.status, AccountStatus::Active);
        assert_eq!(account.account_number.len(), 10);

        let history = store.transactions_for_account(account.id);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, TransactionKind::Deposit);
        assert_eq!(history[0].amount, dec!(500));
        assert_eq!(history[0].balance_after, dec!(500));
    }

    #[test]
    fn test_open_account_unknown_customer() {
        let (_, ledger) = setup();
        let result = ledger.open_account(999, VariantKind::Checking, dec!(500), 1);
        assert_eq!(result, Err(CoreError::CustomerNotFound(999)));
    }

    #[test]
    fn test_open_account_deposit_out_of_bounds() {
        let (_, ledger) = setup();
        // Savings requires at least 100
        let result = ledger.open_account(1, VariantKind::Savings, dec!(50), 1);
        assert!(matches!(result, Err(CoreError::InvalidAmount(_))));
    }

    #[test]
    fn test_adjust_balance_respects_minimum() {
        let (_, ledger) = setup();
        let account = ledger
            .open_account(1, VariantKind::Savings, dec!(500), 1)
            .unwrap();

        // Floor for savings is 100: 500 - 430 = 70 < 100
        let result = ledger.adjust_balance(account.id, dec!(-430));
        assert!(matches!(result, Err(CoreError::InsufficientFunds { .. })));

        // 500 - 400 = 100 is exactly at the floor
        let balance = ledger.adjust_balance(account.id, dec!(-400)).unwrap();
        assert_eq!(balance, dec!(100));
    }

    #[test]
    fn test_adjust_balance_requires_active() {
        let (_, ledger) = setup();
        let account = ledger
            .open_account(1, VariantKind::Checking, dec!(500), 1)
            .unwrap();
        ledger.suspend_account(account.id, 1).unwrap();

        let result = ledger.adjust_balance(account.id, dec!(10));
        assert!(matches!(result, Err(CoreError::AccountNotActive(_))));

        ledger.reactivate_account(account.id, 1).unwrap();
        assert_eq!(ledger.adjust_balance(account.id, dec!(10)).unwrap(), dec!(510));
    }

    #[test]
    fn test_daily_limit_reservation() {
        let (store, ledger) = setup();
        let account = ledger
            .open_account(1, VariantKind::Savings, dec!(10_000), 1)
            .unwrap();
        let today = Utc::now().date_naive();

        // Savings daily limit is 2000
        ledger.reserve_withdrawal(account.id, dec!(1200), today).unwrap();

        let result = ledger.reserve_withdrawal(account.id, dec!(900), today);
        assert!(matches!(result, Err(CoreError::DailyLimitExceeded { .. })));
        // A rejected reservation leaves the total untouched
        assert_eq!(store.daily_withdrawal_total(account.id, today), dec!(1200));

        // A different day starts fresh
        let tomorrow = today.succ_opt().unwrap();
        ledger
            .reserve_withdrawal(account.id, dec!(900), tomorrow)
            .unwrap();
    }

    #[test]
    fn test_insufficient_funds_headroom_never_negative() {
        let (store, ledger) = setup();
        let account = ledger
            .open_account(1, VariantKind::Savings, dec!(500), 1)
            .unwrap();

        // Force the balance below the floor behind the ledger's back
        store
            .update_account_with(account.id, |a| a.balance = dec!(40))
            .unwrap();

        let result = ledger.adjust_balance(account.id, dec!(-10));
        assert_eq!(
            result,
            Err(CoreError::InsufficientFunds {
                required: dec!(10),
                available: dec!(0),
            })
        );
    }

    #[test]
    fn test_close_is_one_way() {
        let (_, ledger) = setup();
        let account = ledger
            .open_account(1, VariantKind::Checking, dec!(500), 1)
            .unwrap();

        ledger.close_account(account.id, 1).unwrap();
        assert!(ledger.close_account(account.id, 1).is_err());
        assert!(ledger.reactivate_account(account.id, 1).is_err());
    }
}
