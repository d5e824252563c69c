//! Customer hot score: a 0-10 engagement metric, tiered cold/warm/hot.
//!
//! The raw engagement value is 0-100:
//!
//! | component | points |
//! |-----------|--------|
//! | recency   | up to 40, decaying linearly to 0 over 30 days since the last event |
//! | clicks    | `min(clicks, 20)` |
//! | leads     | `min(leads, 5) * 4` |
//! | monetary  | 10 for any sale, plus 1 per 100 major currency units of revenue, up to 10 |
//!
//! The stored score is `raw / 10` rounded. Tiers are taken from the raw
//! value: `cold < 34 <= warm < 67 <= hot`.
//!
//! Recompute is idempotent, so it is safe to enqueue redundantly.
//! Conversion events always recompute; on-demand reads are throttled to once
//! per 24 hours per customer.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::db::DbError;
use crate::jobs::Job;
use crate::pipeline::Pipeline;
use crate::store::{StoreError, keys};
use crate::types::{Customer, CustomerId, WorkspaceId};

pub const ON_DEMAND_THROTTLE: Duration = Duration::from_secs(24 * 60 * 60);

const RECENCY_MAX: f64 = 40.0;
const RECENCY_DECAY_DAYS: f64 = 30.0;
const WARM_THRESHOLD: u8 = 34;
const HOT_THRESHOLD: u8 = 67;

#[derive(Debug, Error)]
pub enum HotScoreError {
    #[error("customer {0} not found in workspace")]
    CustomerNotFound(CustomerId),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Cold,
    Warm,
    Hot,
}

impl Tier {
    pub fn from_raw(raw: u8) -> Tier {
        if raw < WARM_THRESHOLD {
            Tier::Cold
        } else if raw < HOT_THRESHOLD {
            Tier::Warm
        } else {
            Tier::Hot
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HotScore {
    /// 0-100 engagement.
    pub raw: u8,
    /// 0-10, as stored on the customer.
    pub score: u8,
    pub tier: Tier,
}

impl HotScore {
    fn from_raw(raw: u8) -> HotScore {
        HotScore {
            raw,
            score: ((raw as f64) / 10.0).round() as u8,
            tier: Tier::from_raw(raw),
        }
    }
}

/// Scores a customer as of `now`.
pub fn compute(customer: &Customer, now: DateTime<Utc>) -> HotScore {
    let recency = customer.last_event_at.map_or(0.0, |last| {
        let days = (now - last).num_seconds().max(0) as f64 / 86_400.0;
        RECENCY_MAX * (1.0 - days / RECENCY_DECAY_DAYS).max(0.0)
    });
    let clicks = customer.total_clicks.min(20) as f64;
    let leads = (customer.leads.min(5) * 4) as f64;
    let monetary = if customer.sales > 0 {
        // Minor units to major units, then one point per 100.
        let revenue_points = (customer.sale_amount.max(0) / 100 / 100).min(10);
        10.0 + revenue_points as f64
    } else {
        0.0
    };
    let raw = (recency + clicks + leads + monetary).round().clamp(0.0, 100.0) as u8;
    HotScore::from_raw(raw)
}

async fn load(
    pipeline: &Pipeline,
    workspace_id: &WorkspaceId,
    customer_id: &CustomerId,
) -> Result<Customer, HotScoreError> {
    pipeline
        .db
        .get_customer(customer_id)
        .await?
        .filter(|c| &c.workspace_id == workspace_id)
        .ok_or_else(|| HotScoreError::CustomerNotFound(customer_id.clone()))
}

/// Recomputes and stores the score unconditionally.
pub async fn recompute(
    pipeline: &Pipeline,
    workspace_id: &WorkspaceId,
    customer_id: &CustomerId,
) -> Result<HotScore, HotScoreError> {
    let customer = load(pipeline, workspace_id, customer_id).await?;
    let now = pipeline.clock.now();
    let score = compute(&customer, now);
    pipeline.db.set_hot_score(customer_id, score.score, score.raw, now).await?;
    debug!(
        workspace_id = %workspace_id,
        customer_id = %customer_id,
        score = score.score,
        tier = ?score.tier,
        "Hot score recomputed"
    );
    Ok(score)
}

/// Result of an on-demand read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnDemandScore {
    pub score: u8,
    pub tier: Tier,
    pub recomputed: bool,
    pub computed_at: Option<DateTime<Utc>>,
}

/// Recomputes at most once per [`ON_DEMAND_THROTTLE`]; otherwise returns the
/// stored score, tiered from the stored raw value.
pub async fn recompute_on_demand(
    pipeline: &Pipeline,
    workspace_id: &WorkspaceId,
    customer_id: &CustomerId,
) -> Result<OnDemandScore, HotScoreError> {
    let customer = load(pipeline, workspace_id, customer_id).await?;
    let key = keys::hot_score_throttle(workspace_id, customer_id);
    let now = pipeline.clock.now();
    if pipeline
        .store
        .set_if_absent(&key, &now.to_rfc3339(), Some(ON_DEMAND_THROTTLE))
        .await?
    {
        let score = recompute(pipeline, workspace_id, customer_id).await?;
        return Ok(OnDemandScore {
            score: score.score,
            tier: score.tier,
            recomputed: true,
            computed_at: Some(now),
        });
    }
    Ok(OnDemandScore {
        score: customer.hot_score,
        tier: Tier::from_raw(customer.hot_score_raw),
        recomputed: false,
        computed_at: customer.last_hot_score_at,
    })
}

/// Queues a recompute; used after every conversion event.
pub fn enqueue(pipeline: &Pipeline, workspace_id: &WorkspaceId, customer_id: &CustomerId) {
    pipeline.jobs.submit(Job::RecomputeHotScore {
        workspace_id: workspace_id.clone(),
        customer_id: customer_id.clone(),
    });
}
