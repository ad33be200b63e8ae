use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{CommissionRate, UserId};

/// Runtime settings for the ledger. The composing application owns the
/// resulting store handle; nothing here is process-global.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoinConfig {
    /// Path of the SQLite database file
    pub database_path: String,
    pub max_connections: u32,
    /// How long a writer waits for another writer's lock before failing
    pub busy_timeout_ms: u64,
    /// Policy default used when a caller does not choose a rate
    pub default_commission_rate: CommissionRate,
    /// Owner of the platform revenue wallet that collects commissions
    pub platform_user_id: UserId,
}

impl Default for CoinConfig {
    fn default() -> Self {
        Self {
            database_path: "coinvault.db".to_string(),
            max_connections: 5,
            busy_timeout_ms: 5_000,
            default_commission_rate: CommissionRate::DEFAULT,
            platform_user_id: Uuid::nil(),
        }
    }
}

impl CoinConfig {
    pub fn new(database_path: impl Into<String>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Default::default()
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_commission_rate(mut self, rate: CommissionRate) -> Self {
        self.default_commission_rate = rate;
        self
    }

    pub fn with_platform_user(mut self, user_id: UserId) -> Self {
        self.platform_user_id = user_id;
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoinConfig::default();
        assert_eq!(config.default_commission_rate.percent(), 30);
        assert_eq!(config.platform_user_id, Uuid::nil());
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: CoinConfig =
            serde_json::from_str(r#"{"database_path": "/tmp/x.db", "default_commission_rate": 20}"#)
                .unwrap();
        assert_eq!(config.database_path, "/tmp/x.db");
        assert_eq!(config.default_commission_rate.percent(), 20);
        assert_eq!(config.max_connections, 5);
    }

    #[test]
    fn test_max_connections_is_at_least_one() {
        assert_eq!(CoinConfig::default().with_max_connections(0).max_connections, 1);
    }
}
