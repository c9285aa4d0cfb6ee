//! Quota check, analysis call and scan bookkeeping for a single image.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};
use uuid::Uuid;

use super::{quota::QuotaTracker, repo::ScanLedger};
use crate::{
    analysis::{AnalysisClient, NutritionEstimate},
    config::Timeouts,
    deadline::within,
    error::{AppError, AppResult},
};

/// Per-user locks serializing admission when strict quota is enabled.
pub type AdmissionLocks = Arc<DashMap<Uuid, Arc<Mutex<()>>>>;

/// Held for the duration of a strict scan. Removes the user's lock from the
/// map on drop unless another scan of the same user is waiting on it.
struct Admission {
    locks: AdmissionLocks,
    user_id: Uuid,
    _held: OwnedMutexGuard<()>,
}

impl Drop for Admission {
    fn drop(&mut self) {
        // One reference in the map, one in `_held`; waiters hold their own.
        self.locks
            .remove_if(&self.user_id, |_, lock| Arc::strong_count(lock) == 2);
    }
}

pub struct AnalysisOrchestrator {
    quota: QuotaTracker,
    ledger: Arc<dyn ScanLedger>,
    analyzer: Arc<dyn AnalysisClient>,
    timeouts: Timeouts,
    admission: Option<AdmissionLocks>,
}

impl AnalysisOrchestrator {
    pub fn new(
        quota: QuotaTracker,
        ledger: Arc<dyn ScanLedger>,
        analyzer: Arc<dyn AnalysisClient>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            quota,
            ledger,
            analyzer,
            timeouts,
            admission: None,
        }
    }

    /// Holds a per-user lock from the quota check until the scan is
    /// recorded, turning the soft daily cap into a hard one.
    pub fn with_strict_admission(mut self) -> Self {
        self.admission = Some(Arc::new(DashMap::new()));
        self
    }

    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    pub async fn analyze(
        &self,
        user_id: Uuid,
        image: Bytes,
        content_type: &str,
    ) -> AppResult<NutritionEstimate> {
        self.analyze_at(user_id, image, content_type, OffsetDateTime::now_utc())
            .await
    }

    pub(crate) async fn analyze_at(
        &self,
        user_id: Uuid,
        image: Bytes,
        content_type: &str,
        now: OffsetDateTime,
    ) -> AppResult<NutritionEstimate> {
        if image.is_empty() {
            return Err(AppError::ValidationFailed("image is empty".into()));
        }

        let _admitted = match &self.admission {
            Some(locks) => {
                let lock = locks
                    .entry(user_id)
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone();
                Some(Admission {
                    locks: locks.clone(),
                    user_id,
                    _held: lock.lock_owned().await,
                })
            }
            None => None,
        };

        let remaining = self
            .quota
            .remaining(user_id, now)
            .await
            .map_err(AppError::persistence)?;
        if remaining <= 0 {
            info!(%user_id, remaining, "scan refused, daily quota exhausted");
            return Err(AppError::QuotaExceeded);
        }

        let estimate = within(
            self.timeouts.analysis,
            "analysis call",
            self.analyzer.analyze(image, content_type),
        )
        .await
        .map_err(|e| {
            warn!(error = %e, %user_id, "analysis failed");
            AppError::AnalysisFailed(format!("{:#}", e))
        })?;

        // The analysis already happened; a lost ledger row only under-counts.
        if let Err(e) = within(
            self.timeouts.db,
            "record scan",
            self.ledger.record_scan(user_id, now),
        )
        .await
        {
            warn!(
                error = %e,
                %user_id,
                event = "scan_history_append_failed",
                "scan not recorded, quota will under-report by one"
            );
        }

        info!(%user_id, remaining = remaining - 1, "scan completed");
        Ok(estimate)
    }
}
