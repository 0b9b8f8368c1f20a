//! In-process plan store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{Result, ScreenerError};

use super::TradingPlan;

/// Listing view of a stored plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub positions: usize,
    pub allocated: f64,
    pub total_risk_pct: f64,
}

impl From<&TradingPlan> for PlanSummary {
    fn from(plan: &TradingPlan) -> Self {
        Self {
            id: plan.id.clone(),
            name: plan.name.clone(),
            created_at: plan.created_at,
            positions: plan.positions.len(),
            allocated: plan.capital.allocated,
            total_risk_pct: plan.total_risk_pct,
        }
    }
}

#[derive(Default)]
pub struct PlanStore {
    plans: RwLock<HashMap<String, TradingPlan>>,
}

impl PlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, plan: TradingPlan) {
        self.plans.write().await.insert(plan.id.clone(), plan);
    }

    pub async fn get(&self, id: &str) -> Result<TradingPlan> {
        self.plans
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ScreenerError::NotFound(format!("plan {}", id)))
    }

    /// Newest first.
    pub async fn list(&self) -> Vec<PlanSummary> {
        let plans = self.plans.read().await;
        let mut summaries: Vec<PlanSummary> = plans.values().map(PlanSummary::from).collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        summaries
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.plans
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ScreenerError::NotFound(format!("plan {}", id)))
    }

    pub async fn len(&self) -> usize {
        self.plans.read().await.len()
    }
}
