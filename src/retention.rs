//! Retention sweeper: deletes call records older than the configured period

use crate::config::RetentionPeriod;
use crate::storage::CallStore;
use chrono::Utc;
use std::sync::Arc;

pub struct RetentionSweeper {
    store: Arc<dyn CallStore>,
    period: RetentionPeriod,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn CallStore>, period: RetentionPeriod) -> Self {
        Self { store, period }
    }

    pub fn period(&self) -> RetentionPeriod {
        self.period
    }

    /// Sweep relative to the current wall clock
    pub async fn sweep(&self) -> anyhow::Result<u64> {
        self.sweep_at(Utc::now().timestamp_millis()).await
    }

    /// Delete records whose request timestamp is before `now_ms - period`.
    /// Returns the number of deleted records; `Forever` deletes nothing.
    pub async fn sweep_at(&self, now_ms: i64) -> anyhow::Result<u64> {
        let Some(threshold) = threshold_ms(self.period, now_ms) else {
            return Ok(0);
        };

        let deleted = self.store.delete_older_than(threshold).await?;
        if deleted > 0 {
            tracing::info!(
                "Pruned {} calls older than {:?} (threshold {})",
                deleted,
                self.period,
                threshold
            );
        }
        Ok(deleted)
    }
}

/// Cutoff timestamp for `period`, or `None` when nothing expires
pub fn threshold_ms(period: RetentionPeriod, now_ms: i64) -> Option<i64> {
    let age = period.duration()?;
    let age_ms = i64::try_from(age.as_millis()).unwrap_or(i64::MAX);
    Some(now_ms.saturating_sub(age_ms))
}
