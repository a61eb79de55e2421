//! Engine configuration loaded from the process environment.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use stockrecon_ledger::NegativeBalancePolicy;

use crate::store::DEFAULT_LOCK_TIMEOUT;

pub const USE_PERSISTENT_STORES: &str = "USE_PERSISTENT_STORES";
pub const DATABASE_URL: &str = "DATABASE_URL";
pub const NEGATIVE_STOCK: &str = "STOCKRECON_NEGATIVE_STOCK";
pub const LOCK_TIMEOUT_MS: &str = "STOCKRECON_LOCK_TIMEOUT_MS";
pub const BIND_ADDR: &str = "BIND_ADDR";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set when USE_PERSISTENT_STORES=true")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(name: &'static str, reason: impl ToString) -> Self {
        Self::Invalid {
            name,
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    InMemory,
    Postgres { database_url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub store: StoreBackend,
    pub negative_balance: NegativeBalancePolicy,
    pub lock_timeout: Duration,
    pub bind_addr: SocketAddr,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Unset and blank are the same.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let persistent = match get(USE_PERSISTENT_STORES) {
            Some(raw) => raw
                .to_ascii_lowercase()
                .parse::<bool>()
                .map_err(|e| ConfigError::invalid(USE_PERSISTENT_STORES, e))?,
            None => false,
        };

        let store = if persistent {
            let database_url = get(DATABASE_URL).ok_or(ConfigError::Missing(DATABASE_URL))?;
            StoreBackend::Postgres { database_url }
        } else {
            StoreBackend::InMemory
        };

        let negative_balance = match get(NEGATIVE_STOCK) {
            Some(raw) => raw
                .parse::<NegativeBalancePolicy>()
                .map_err(|e| ConfigError::invalid(NEGATIVE_STOCK, e))?,
            None => NegativeBalancePolicy::default(),
        };

        let lock_timeout = match get(LOCK_TIMEOUT_MS) {
            Some(raw) => {
                let ms = raw
                    .parse::<u64>()
                    .map_err(|e| ConfigError::invalid(LOCK_TIMEOUT_MS, e))?;
                if ms == 0 {
                    return Err(ConfigError::invalid(LOCK_TIMEOUT_MS, "must be positive"));
                }
                Duration::from_millis(ms)
            }
            None => DEFAULT_LOCK_TIMEOUT,
        };

        let bind_addr = get(BIND_ADDR)
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::invalid(BIND_ADDR, e))?;

        Ok(Self {
            store,
            negative_balance,
            lock_timeout,
            bind_addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<EngineConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_to_in_memory_reject_policy() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.store, StoreBackend::InMemory);
        assert_eq!(cfg.negative_balance, NegativeBalancePolicy::Reject);
        assert_eq!(cfg.lock_timeout, Duration::from_secs(5));
        assert_eq!(cfg.bind_addr.port(), 8080);
    }

    #[test]
    fn persistent_requires_database_url() {
        assert_eq!(
            config(&[(USE_PERSISTENT_STORES, "true")]),
            Err(ConfigError::Missing(DATABASE_URL))
        );

        let cfg = config(&[
            (USE_PERSISTENT_STORES, "TRUE"),
            (DATABASE_URL, "postgres://localhost/stock"),
        ])
        .unwrap();
        assert_eq!(
            cfg.store,
            StoreBackend::Postgres {
                database_url: "postgres://localhost/stock".to_string()
            }
        );
    }

    #[test]
    fn reads_policy_and_timeout() {
        let cfg = config(&[(NEGATIVE_STOCK, "backorder"), (LOCK_TIMEOUT_MS, "250")]).unwrap();
        assert_eq!(cfg.negative_balance, NegativeBalancePolicy::AllowBackorder);
        assert_eq!(cfg.lock_timeout, Duration::from_millis(250));
    }

    #[test]
    fn malformed_values_are_errors() {
        assert!(matches!(
            config(&[(NEGATIVE_STOCK, "sometimes")]),
            Err(ConfigError::Invalid { name: NEGATIVE_STOCK, .. })
        ));
        assert!(matches!(
            config(&[(LOCK_TIMEOUT_MS, "0")]),
            Err(ConfigError::Invalid { name: LOCK_TIMEOUT_MS, .. })
        ));
        assert!(matches!(
            config(&[(USE_PERSISTENT_STORES, "yes")]),
            Err(ConfigError::Invalid { name: USE_PERSISTENT_STORES, .. })
        ));
        assert!(matches!(
            config(&[(BIND_ADDR, "localhost")]),
            Err(ConfigError::Invalid { name: BIND_ADDR, .. })
        ));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let cfg = config(&[(NEGATIVE_STOCK, "  "), (BIND_ADDR, "")]).unwrap();
        assert_eq!(cfg.negative_balance, NegativeBalancePolicy::Reject);
        assert_eq!(cfg.bind_addr.port(), 8080);
    }
}
