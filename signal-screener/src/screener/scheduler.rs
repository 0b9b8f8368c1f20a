//! Recommendation refresh scheduling.
//!
//! On a cron schedule (after the US close by default) the scheduler runs the
//! recommendations job, which warms the screening cache with the all-universe
//! scan and records a dated top-N snapshot in [`RecommendationHistory`].

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::Result;

use super::engine::{ScreenEntry, ScreenResult};

// ============================================================================
// Recommendation History
// ============================================================================

/// Top-N recommendations for one trading date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSnapshot {
    pub date: NaiveDate,
    pub entries: Vec<ScreenEntry>,
    pub recorded_at: DateTime<Utc>,
}

/// Dated recommendation snapshots, newest first, capped at `limit`.
pub struct RecommendationHistory {
    limit: usize,
    snapshots: RwLock<VecDeque<RecommendationSnapshot>>,
}

impl RecommendationHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            snapshots: RwLock::new(VecDeque::new()),
        }
    }

    /// Record the entries for `date`, replacing an existing snapshot for
    /// the same date.
    pub async fn record(&self, date: NaiveDate, entries: Vec<ScreenEntry>) {
        let mut snapshots = self.snapshots.write().await;
        snapshots.retain(|s| s.date != date);
        let position = snapshots
            .iter()
            .position(|s| s.date < date)
            .unwrap_or(snapshots.len());
        snapshots.insert(
            position,
            RecommendationSnapshot {
                date,
                entries,
                recorded_at: Utc::now(),
            },
        );
        snapshots.truncate(self.limit);
    }

    pub async fn list(&self) -> Vec<RecommendationSnapshot> {
        self.snapshots.read().await.iter().cloned().collect()
    }

    pub async fn contains(&self, date: NaiveDate) -> bool {
        self.snapshots.read().await.iter().any(|s| s.date == date)
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Work run on every scheduled tick.
#[async_trait]
pub trait RefreshJob: Send + Sync {
    async fn refresh(&self) -> Result<ScreenResult>;
}

/// Scheduler status information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub runs: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_scan_id: Option<String>,
    pub last_entry_count: Option<usize>,
    pub last_error: Option<String>,
}

/// Cron-driven recommendations refresh.
pub struct RecommendationScheduler {
    schedule: Schedule,
    job: Arc<dyn RefreshJob>,
    status: RwLock<SchedulerStatus>,
}

impl RecommendationScheduler {
    pub fn new(cron_expression: &str, job: Arc<dyn RefreshJob>) -> anyhow::Result<Self> {
        let schedule = Schedule::from_str(cron_expression)
            .with_context(|| format!("Invalid refresh cron expression: {}", cron_expression))?;
        Ok(Self {
            schedule,
            job,
            status: RwLock::new(SchedulerStatus::default()),
        })
    }

    pub fn next_run(&self) -> Option<DateTime<Utc>> {
        self.schedule.upcoming(Utc).next()
    }

    pub async fn status(&self) -> SchedulerStatus {
        self.status.read().await.clone()
    }

    /// Run the job once and record the outcome.
    pub async fn run_once(&self) -> Result<ScreenResult> {
        let outcome = self.job.refresh().await;

        let mut status = self.status.write().await;
        status.runs += 1;
        status.last_run_at = Some(Utc::now());
        match &outcome {
            Ok(result) => {
                status.last_scan_id = Some(result.scan_id.clone());
                status.last_entry_count = Some(result.entries.len());
                status.last_error = None;
            }
            Err(e) => status.last_error = Some(e.to_string()),
        }
        outcome
    }

    /// Sleep until each upcoming tick and run the job.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let Some(next) = self.next_run() else {
                    warn!("Refresh schedule has no upcoming runs, stopping");
                    return;
                };
                info!(next_run = %next, "Next recommendations refresh scheduled");
                let wait = (next - Utc::now()).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;

                match self.run_once().await {
                    Ok(result) => info!(
                        scan_id = %result.scan_id,
                        entries = result.entries.len(),
                        served_from_cache = result.served_from_cache,
                        "Recommendations refreshed"
                    ),
                    Err(e) => warn!(error = %e, "Recommendations refresh failed"),
                }
            }
        })
    }
}
