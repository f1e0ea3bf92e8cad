//! Entity Store
//!
//! Concurrent in-memory maps for customers, accounts, transactions and
//! approval requests, each with its own monotonic id generator. Secondary
//! indexes (account-by-number, transaction-by-reference) are maintained
//! together with the primary map. The store holds no business logic;
//! cross-entity invariants are the calling component's job.
//!
//! Every operation is a single atomic map access, safe for concurrent
//! callers; no lock is held across operations. Accessors clone records out
//! so callers never keep a private window into store state.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::NaiveDate;
use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::domain::{Account, ApprovalRequest, Customer, Transaction};
use crate::error::{CoreError, CoreResult};

/// The single owned store; components receive it as `Arc<EntityStore>`.
#[derive(Debug, Default)]
pub struct EntityStore {
    customers: DashMap<i64, Customer>,
    accounts: DashMap<i64, Account>,
    transactions: DashMap<i64, Transaction>,
    approvals: DashMap<i64, ApprovalRequest>,

    /// account number -> account id
    account_numbers: DashMap<String, i64>,
    /// reference number -> transaction id
    transaction_refs: DashMap<String, i64>,

    /// Incrementally maintained per-account-per-day withdrawal totals,
    /// so the daily-limit check is a lookup rather than a history scan.
    daily_withdrawals: DashMap<(i64, NaiveDate), Decimal>,

    next_customer_id: AtomicI64,
    next_account_id: AtomicI64,
    next_transaction_id: AtomicI64,
    next_approval_id: AtomicI64,
}

impl EntityStore {
    pub fn new() -> Self {
        Self {
            next_customer_id: AtomicI64::new(1),
            next_account_id: AtomicI64::new(1),
            next_transaction_id: AtomicI64::new(1),
            next_approval_id: AtomicI64::new(1),
            ..Default::default()
        }
    }

    // =========================================================================
    // Id generation — monotonic, never reused even after deletion
    // =========================================================================

    pub fn next_customer_id(&self) -> i64 {
        self.next_customer_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn next_account_id(&self) -> i64 {
        self.next_account_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn next_transaction_id(&self) -> i64 {
        self.next_transaction_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn next_approval_id(&self) -> i64 {
        self.next_approval_id.fetch_add(1, Ordering::SeqCst)
    }

    // =========================================================================
    // Customers
    // =========================================================================

    pub fn insert_customer(&self, customer: Customer) {
        self.customers.insert(customer.id, customer);
    }

    pub fn customer(&self, id: i64) -> Option<Customer> {
        self.customers.get(&id).map(|c| c.clone())
    }

    pub fn customers(&self) -> Vec<Customer> {
        self.customers.iter().map(|c| c.clone()).collect()
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    /// Insert a new account, registering its number in the secondary index.
    /// The index entry and the primary record commit together or not at all.
    pub fn insert_account(&self, account: Account) -> CoreResult<()> {
        use dashmap::mapref::entry::Entry;

        match self.account_numbers.entry(account.account_number.clone()) {
            Entry::Occupied(_) => {
                Err(CoreError::DuplicateAccountNumber(account.account_number))
            }
            Entry::Vacant(slot) => {
                slot.insert(account.id);
                self.accounts.insert(account.id, account);
                Ok(())
            }
        }
    }

    pub fn account(&self, id: i64) -> Option<Account> {
        self.accounts.get(&id).map(|a| a.clone())
    }

    pub fn account_by_number(&self, number: &str) -> Option<Account> {
        let id = *self.account_numbers.get(number)?;
        self.account(id)
    }

    pub fn contains_account_number(&self, number: &str) -> bool {
        self.account_numbers.contains_key(number)
    }

    /// Snapshot of all accounts; iteration order is not meaningful.
    pub fn accounts(&self) -> Vec<Account> {
        self.accounts.iter().map(|a| a.clone()).collect()
    }

    pub fn accounts_for_customer(&self, customer_id: i64) -> Vec<Account> {
        self.accounts
            .iter()
            .filter(|a| a.customer_id == customer_id)
            .map(|a| a.clone())
            .collect()
    }

    /// Atomically mutate a single account under its entry lock and return
    /// the updated record.
    pub fn update_account_with<F>(&self, id: i64, f: F) -> CoreResult<Account>
    where
        F: FnOnce(&mut Account),
    {
        let mut entry = self
            .accounts
            .get_mut(&id)
            .ok_or_else(|| CoreError::AccountNotFound(id.to_string()))?;
        f(&mut entry);
        Ok(entry.clone())
    }

    /// Like [`update_account_with`](Self::update_account_with), but the
    /// closure may reject the mutation; the record is left untouched on
    /// error. The validate-and-apply runs under the entry lock, so
    /// concurrent debits cannot both pass the same balance check.
    pub fn try_update_account_with<F>(&self, id: i64, f: F) -> CoreResult<Account>
    where
        F: FnOnce(&mut Account) -> CoreResult<()>,
    {
        let mut entry = self
            .accounts
            .get_mut(&id)
            .ok_or_else(|| CoreError::AccountNotFound(id.to_string()))?;
        let mut candidate = entry.clone();
        f(&mut candidate)?;
        *entry = candidate;
        Ok(entry.clone())
    }

    // =========================================================================
    // Number generation — collision-checked against the secondary indexes
    // =========================================================================

    /// Generate a fresh 10-digit account number not present in the index.
    pub fn generate_account_number(&self) -> String {
        use rand::Rng;

        let mut rng = rand::thread_rng();
        loop {
            let number: String = (0..10).map(|_| rng.gen_range(0..10).to_string()).collect();
            // Leading zero is fine; a duplicate is retried
            if !self.contains_account_number(&number) {
                return number;
            }
        }
    }

    /// Generate a fresh `TXN-` reference not present in the index.
    pub fn generate_reference(&self) -> String {
        use rand::distributions::Alphanumeric;
        use rand::Rng;

        let mut rng = rand::thread_rng();
        loop {
            let suffix: String = (&mut rng)
                .sample_iter(Alphanumeric)
                .take(12)
                .map(|c| (c as char).to_ascii_uppercase())
                .collect();
            let reference = format!("TXN-{suffix}");
            if !self.contains_reference(&reference) {
                return reference;
            }
        }
    }

    /// Hard-delete an account, dropping its number index entry and any
    /// daily withdrawal totals.
    pub fn remove_account(&self, id: i64) -> Option<Account> {
        let (_, account) = self.accounts.remove(&id)?;
        self.account_numbers.remove(&account.account_number);
        self.daily_withdrawals.retain(|(acct, _), _| *acct != id);
        Some(account)
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    pub fn insert_transaction(&self, transaction: Transaction) {
        self.transaction_refs
            .insert(transaction.reference.clone(), transaction.id);
        self.transactions.insert(transaction.id, transaction);
    }

    pub fn transaction(&self, id: i64) -> Option<Transaction> {
        self.transactions.get(&id).map(|t| t.clone())
    }

    pub fn transaction_by_reference(&self, reference: &str) -> Option<Transaction> {
        let id = *self.transaction_refs.get(reference)?;
        self.transaction(id)
    }

    pub fn contains_reference(&self, reference: &str) -> bool {
        self.transaction_refs.contains_key(reference)
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.transactions.iter().map(|t| t.clone()).collect()
    }

    pub fn transactions_for_account(&self, account_id: i64) -> Vec<Transaction> {
        self.transactions
            .iter()
            .filter(|t| t.account_id == account_id)
            .map(|t| t.clone())
            .collect()
    }

    pub fn update_transaction_with<F>(&self, id: i64, f: F) -> CoreResult<Transaction>
    where
        F: FnOnce(&mut Transaction),
    {
        let mut entry = self
            .transactions
            .get_mut(&id)
            .ok_or_else(|| CoreError::TransactionNotFound(id.to_string()))?;
        f(&mut entry);
        Ok(entry.clone())
    }

    pub fn remove_transaction(&self, id: i64) -> Option<Transaction> {
        let (_, transaction) = self.transactions.remove(&id)?;
        self.transaction_refs.remove(&transaction.reference);
        Some(transaction)
    }

    // =========================================================================
    // Approval requests
    // =========================================================================

    pub fn insert_approval(&self, approval: ApprovalRequest) {
        self.approvals.insert(approval.id, approval);
    }

    pub fn approval(&self, id: i64) -> Option<ApprovalRequest> {
        self.approvals.get(&id).map(|a| a.clone())
    }

    pub fn approvals(&self) -> Vec<ApprovalRequest> {
        self.approvals.iter().map(|a| a.clone()).collect()
    }

    pub fn update_approval_with<F>(&self, id: i64, f: F) -> CoreResult<ApprovalRequest>
    where
        F: FnOnce(&mut ApprovalRequest),
    {
        let mut entry = self
            .approvals
            .get_mut(&id)
            .ok_or(CoreError::ApprovalNotFound(id))?;
        f(&mut entry);
        Ok(entry.clone())
    }

    pub fn remove_approval(&self, id: i64) -> Option<ApprovalRequest> {
        self.approvals.remove(&id).map(|(_, a)| a)
    }

    // =========================================================================
    // Daily withdrawal totals
    // =========================================================================

    pub fn daily_withdrawal_total(&self, account_id: i64, date: NaiveDate) -> Decimal {
        self.daily_withdrawals
            .get(&(account_id, date))
            .map(|t| *t)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn record_daily_withdrawal(&self, account_id: i64, date: NaiveDate, amount: Decimal) {
        *self
            .daily_withdrawals
            .entry((account_id, date))
            .or_insert(Decimal::ZERO) += amount;
    }

    /// Check-and-reserve: add `amount` to the day's running total only if
    /// the result stays within `limit`. The check and the increment run
    /// under the day entry's lock, so two concurrent reservations cannot
    /// both slip under the limit.
    pub fn try_record_daily_withdrawal(
        &self,
        account_id: i64,
        date: NaiveDate,
        amount: Decimal,
        limit: Decimal,
    ) -> CoreResult<()> {
        let mut total = self
            .daily_withdrawals
            .entry((account_id, date))
            .or_insert(Decimal::ZERO);
        let attempted = *total + amount;
        if attempted > limit {
            return Err(CoreError::DailyLimitExceeded { limit, attempted });
        }
        *total = attempted;
        Ok(())
    }

    /// Back out a previously recorded withdrawal (cancellation, reversal).
    /// Clamped at zero so a stray unrecord cannot manufacture headroom.
    pub fn unrecord_daily_withdrawal(&self, account_id: i64, date: NaiveDate, amount: Decimal) {
        if let Some(mut total) = self.daily_withdrawals.get_mut(&(account_id, date)) {
            *total = (*total - amount).max(Decimal::ZERO);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccountStatus, AccountVariant, VariantKind};
    use chrono::Utc;

    fn test_account(store: &EntityStore, number: &str) -> Account {
        let config = crate::config::CoreConfig::default();
        Account {
            id: store.next_account_id(),
            account_number: number.to_string(),
            customer_id: 1,
            variant: AccountVariant::new(VariantKind::Checking, config.checking.clone()),
            balance: Decimal::ZERO,
            status: AccountStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_ids_are_monotonic() {
        let store = EntityStore::new();
        let a = store.next_account_id();
        let b = store.next_account_id();
        assert_eq!(b, a + 1);
    }

    #[test]
    fn test_account_secondary_index() {
        let store = EntityStore::new();
        let account = test_account(&store, "1234567890");
        let id = account.id;
        store.insert_account(account).unwrap();

        let found = store.account_by_number("1234567890").unwrap();
        assert_eq!(found.id, id);

        // Duplicate number is rejected and leaves both maps untouched
        let dup = test_account(&store, "1234567890");
        assert!(matches!(
            store.insert_account(dup),
            Err(CoreError::DuplicateAccountNumber(_))
        ));
        assert_eq!(store.accounts().len(), 1);
    }

    #[test]
    fn test_remove_account_clears_index() {
        let store = EntityStore::new();
        let account = test_account(&store, "1234567890");
        let id = account.id;
        store.insert_account(account).unwrap();

        store.remove_account(id).unwrap();
        assert!(store.account_by_number("1234567890").is_none());
        assert!(!store.contains_account_number("1234567890"));
    }

    #[test]
    fn test_daily_withdrawal_totals() {
        let store = EntityStore::new();
        let date = Utc::now().date_naive();

        assert_eq!(store.daily_withdrawal_total(7, date), Decimal::ZERO);
        store.record_daily_withdrawal(7, date, Decimal::new(1200, 0));
        store.record_daily_withdrawal(7, date, Decimal::new(300, 0));
        assert_eq!(store.daily_withdrawal_total(7, date), Decimal::new(1500, 0));

        store.unrecord_daily_withdrawal(7, date, Decimal::new(300, 0));
        assert_eq!(store.daily_withdrawal_total(7, date), Decimal::new(1200, 0));

        // Clamped at zero
        store.unrecord_daily_withdrawal(7, date, Decimal::new(9999, 0));
        assert_eq!(store.daily_withdrawal_total(7, date), Decimal::ZERO);
    }

    #[test]
    fn test_try_record_daily_withdrawal_reserves_atomically() {
        let store = EntityStore::new();
        let date = Utc::now().date_naive();
        let limit = Decimal::new(2000, 0);

        store
            .try_record_daily_withdrawal(7, date, Decimal::new(1200, 0), limit)
            .unwrap();
        // 1200 + 900 > 2000: rejected, and the total is left untouched
        let result = store.try_record_daily_withdrawal(7, date, Decimal::new(900, 0), limit);
        assert!(matches!(result, Err(CoreError::DailyLimitExceeded { .. })));
        assert_eq!(store.daily_withdrawal_total(7, date), Decimal::new(1200, 0));

        // Exactly at the limit is allowed
        store
            .try_record_daily_withdrawal(7, date, Decimal::new(800, 0), limit)
            .unwrap();
        assert_eq!(store.daily_withdrawal_total(7, date), limit);
    }

    #[test]
    fn test_concurrent_id_generation() {
        use std::sync::Arc;

        let store = Arc::new(EntityStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                (0..100).map(|_| store.next_transaction_id()).collect::<Vec<_>>()
            }));
        }

        let mut all: Vec<i64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 800, "ids must never repeat across threads");
    }
}
