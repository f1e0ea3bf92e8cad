//! Customer entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bank customer. Accounts reference customers by id; the store enforces
/// nothing beyond identity, the ledger checks the reference on account
/// opening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}
