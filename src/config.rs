//! Configuration module
//!
//! Thresholds and limits for the core: per-variant capability parameters,
//! transaction bounds, and role-based approval ceilings. Values load from
//! environment variables with sensible defaults.

use std::env;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Role, VariantKind};

/// Parameters for a single account variant (the capability table as data)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantParams {
    /// Balance floor a debit may never cross
    pub minimum_balance: Decimal,
    /// Annual interest rate (fraction, e.g. 0.045)
    pub interest_rate: Decimal,
    /// Maximum cumulative withdrawal per account per calendar day
    pub daily_withdrawal_limit: Decimal,
    /// Minimum opening deposit
    pub min_opening_deposit: Decimal,
    /// Maximum opening deposit
    pub max_opening_deposit: Decimal,
}

/// Per-role approval ceilings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoleLimits {
    /// Amounts at or below this require no approval at all
    pub auto_approval_ceiling: Decimal,
    /// Amounts at or below this may be approved by the requester themselves
    pub self_approval_ceiling: Decimal,
}

/// Core configuration
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub savings: VariantParams,
    pub checking: VariantParams,
    pub business: VariantParams,

    /// Smallest amount a single transaction may carry
    pub min_transaction_amount: Decimal,
    /// Largest amount a single transaction may carry
    pub max_transaction_amount: Decimal,

    pub teller_limits: RoleLimits,
    pub manager_limits: RoleLimits,
    pub admin_limits: RoleLimits,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            savings: VariantParams {
                minimum_balance: Decimal::new(100, 0),
                interest_rate: Decimal::new(45, 3), // 4.5%
                daily_withdrawal_limit: Decimal::new(2_000, 0),
                min_opening_deposit: Decimal::new(100, 0),
                max_opening_deposit: Decimal::new(1_000_000, 0),
            },
            checking: VariantParams {
                minimum_balance: Decimal::new(25, 0),
                interest_rate: Decimal::ZERO,
                daily_withdrawal_limit: Decimal::new(5_000, 0),
                min_opening_deposit: Decimal::new(25, 0),
                max_opening_deposit: Decimal::new(1_000_000, 0),
            },
            business: VariantParams {
                minimum_balance: Decimal::new(500, 0),
                interest_rate: Decimal::new(25, 3), // 2.5%
                daily_withdrawal_limit: Decimal::new(25_000, 0),
                min_opening_deposit: Decimal::new(500, 0),
                max_opening_deposit: Decimal::new(10_000_000, 0),
            },
            min_transaction_amount: Decimal::new(1, 2), // 0.01
            max_transaction_amount: Decimal::new(1_000_000, 0),
            teller_limits: RoleLimits {
                auto_approval_ceiling: Decimal::new(1_000, 0),
                self_approval_ceiling: Decimal::new(1_000, 0),
            },
            manager_limits: RoleLimits {
                auto_approval_ceiling: Decimal::new(5_000, 0),
                self_approval_ceiling: Decimal::new(10_000, 0),
            },
            admin_limits: RoleLimits {
                auto_approval_ceiling: Decimal::new(50_000, 0),
                self_approval_ceiling: Decimal::new(100_000, 0),
            },
        }
    }
}

impl CoreConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = read_decimal("BANKCORE_MAX_TRANSACTION_AMOUNT")? {
            config.max_transaction_amount = v;
        }
        if let Some(v) = read_decimal("BANKCORE_TELLER_AUTO_CEILING")? {
            config.teller_limits.auto_approval_ceiling = v;
        }
        if let Some(v) = read_decimal("BANKCORE_TELLER_SELF_CEILING")? {
            config.teller_limits.self_approval_ceiling = v;
        }
        if let Some(v) = read_decimal("BANKCORE_MANAGER_AUTO_CEILING")? {
            config.manager_limits.auto_approval_ceiling = v;
        }
        if let Some(v) = read_decimal("BANKCORE_MANAGER_SELF_CEILING")? {
            config.manager_limits.self_approval_ceiling = v;
        }
        if let Some(v) = read_decimal("BANKCORE_ADMIN_AUTO_CEILING")? {
            config.admin_limits.auto_approval_ceiling = v;
        }
        if let Some(v) = read_decimal("BANKCORE_ADMIN_SELF_CEILING")? {
            config.admin_limits.self_approval_ceiling = v;
        }

        Ok(config)
    }

    /// Approval ceilings for a role
    pub fn limits_for(&self, role: Role) -> RoleLimits {
        match role {
            Role::Teller => self.teller_limits,
            Role::Manager => self.manager_limits,
            Role::Administrator => self.admin_limits,
        }
    }

    /// Capability parameters for an account variant kind
    pub fn params_for(&self, kind: VariantKind) -> &VariantParams {
        match kind {
            VariantKind::Savings => &self.savings,
            VariantKind::Checking => &self.checking,
            VariantKind::Business => &self.business,
        }
    }
}

fn read_decimal(key: &'static str) -> Result<Option<Decimal>, ConfigError> {
    match env::var(key) {
        Ok(raw) => {
            let value =
                Decimal::from_str(&raw).map_err(|_| ConfigError::InvalidValue(key))?;
            Ok(Some(value))
        }
        Err(_) => Ok(None),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoreConfig::default();
        assert_eq!(config.savings.daily_withdrawal_limit, Decimal::new(2_000, 0));
        assert_eq!(config.checking.interest_rate, Decimal::ZERO);
        assert!(config.teller_limits.auto_approval_ceiling < config.manager_limits.auto_approval_ceiling);
        assert!(config.manager_limits.auto_approval_ceiling < config.admin_limits.auto_approval_ceiling);
    }

    #[test]
    fn test_limits_for_role() {
        let config = CoreConfig::default();
        assert_eq!(
            config.limits_for(Role::Manager).self_approval_ceiling,
            Decimal::new(10_000, 0)
        );
    }
}
