//! Common test utilities

use std::sync::Arc;

use bankcore::{
    AccountLedger, ApprovalWorkflow, AuditTrail, CoreConfig, Customer, EntityStore,
    LifecycleManager, TransactionProcessor, VariantKind,
};
use chrono::Utc;
use rust_decimal::Decimal;

/// All core components wired over one shared store.
pub struct Fixture {
    pub store: Arc<EntityStore>,
    pub audit: Arc<AuditTrail>,
    pub ledger: AccountLedger,
    pub processor: TransactionProcessor,
    pub workflow: ApprovalWorkflow,
    pub lifecycle: LifecycleManager,
    pub customer_id: i64,
}

impl Fixture {
    pub fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("warn")
            .with_test_writer()
            .try_init();

        let store = Arc::new(EntityStore::new());
        let audit = Arc::new(AuditTrail::new());
        let config = Arc::new(CoreConfig::default());
        let ledger = AccountLedger::new(Arc::clone(&store), Arc::clone(&config), Arc::clone(&audit));
        let processor = TransactionProcessor::new(ledger.clone(), Arc::clone(&audit));
        let workflow =
            ApprovalWorkflow::new(processor.clone(), Arc::clone(&config), Arc::clone(&audit));
        let lifecycle = LifecycleManager::new(ledger.clone(), Arc::clone(&audit));

        let customer_id = store.next_customer_id();
        store.insert_customer(Customer {
            id: customer_id,
            name: "Avery Stone".to_string(),
            created_at: Utc::now(),
        });

        Self {
            store,
            audit,
            ledger,
            processor,
            workflow,
            lifecycle,
            customer_id,
        }
    }

    /// Open a funded account and return its number.
    pub fn open_account(&self, kind: VariantKind, deposit: Decimal) -> String {
        self.ledger
            .open_account(self.customer_id, kind, deposit, 1)
            .expect("failed to open account")
            .account_number
    }

    pub fn balance_of(&self, account_number: &str) -> Decimal {
        self.store
            .account_by_number(account_number)
            .expect("account missing")
            .balance
    }

    /// Push every transaction on an account past the 24h obligation window.
    pub fn age_history(&self, account_number: &str) {
        let account = self
            .store
            .account_by_number(account_number)
            .expect("account missing");
        for t in self.store.transactions_for_account(account.id) {
            self.store
                .update_transaction_with(t.id, |t| {
                    t.created_at = t.created_at - chrono::Duration::hours(25);
                })
                .unwrap();
        }
    }
}
