use std::{sync::Arc, time::Duration};

use time::{OffsetDateTime, UtcOffset};
use uuid::Uuid;

use super::repo::ScanLedger;
use crate::{config::QuotaConfig, deadline::within, time_window::day_window};

/// Remaining daily scan allowance, derived from the scan ledger.
#[derive(Clone)]
pub struct QuotaTracker {
    ledger: Arc<dyn ScanLedger>,
    allowance: i64,
    day_offset: UtcOffset,
    db_timeout: Duration,
}

impl QuotaTracker {
    pub fn new(ledger: Arc<dyn ScanLedger>, cfg: &QuotaConfig, db_timeout: Duration) -> Self {
        Self {
            ledger,
            allowance: cfg.daily_allowance,
            day_offset: cfg.day_offset,
            db_timeout,
        }
    }

    /// `allowance - scans today`. Can go negative when concurrent scans
    /// slipped past the check; callers refuse to scan at `<= 0`.
    pub async fn remaining(&self, user_id: Uuid, now: OffsetDateTime) -> anyhow::Result<i64> {
        let (start, end) = day_window(now, self.day_offset);
        let used = within(
            self.db_timeout,
            "count scans",
            self.ledger.count_between(user_id, start, end),
        )
        .await?;
        Ok(self.allowance - used)
    }
}

/// Value shown to users: never below zero.
pub fn displayed(remaining: i64) -> i64 {
    remaining.max(0)
}
