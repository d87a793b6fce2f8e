use crate::error::{LedgerError, LedgerResult};
use serde::{Deserialize, Serialize};

/// Runtime knobs for the ledger and its sweep scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// SQLite path or URI. `:memory:` becomes a shared-cache in-memory URI
    /// in the runner so the scheduler's connection sees the same data.
    pub database_path: String,
    /// New settlements fall due this many days after creation.
    pub settlement_due_days: i64,
    /// Seconds between two scheduler polls.
    pub sweep_poll_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_path: ":memory:".into(),
            settlement_due_days: 7,
            sweep_poll_secs: 60,
        }
    }
}

impl LedgerConfig {
    /// Load from a JSON file. Missing keys take their defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: LedgerConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LedgerResult<()> {
        if self.settlement_due_days <= 0 {
            return Err(LedgerError::validation(format!(
                "settlement_due_days must be positive, got {}",
                self.settlement_due_days
            )));
        }
        if self.sweep_poll_secs == 0 {
            return Err(LedgerError::validation("sweep_poll_secs must be positive"));
        }
        Ok(())
    }

    pub fn due_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.settlement_due_days)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_poll_secs)
    }
}
