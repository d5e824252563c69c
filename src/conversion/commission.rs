//! Partner commissions.
//!
//! Commission calculation belongs to the partner program service. The
//! pipeline only reports qualifying events for links that carry a partner.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::pipeline::Pipeline;
use crate::types::{Currency, CustomerId, Link, LinkId, WorkspaceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionKind {
    Lead,
    Sale,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionEvent {
    pub kind: CommissionKind,
    pub workspace_id: WorkspaceId,
    pub partner_id: String,
    pub program_id: Option<String>,
    pub link_id: LinkId,
    pub customer_id: CustomerId,
    pub event_id: String,
    pub quantity: u64,
    /// Minor units; zero for leads.
    pub amount: i64,
    pub currency: Option<Currency>,
}

#[derive(Debug, Error)]
#[error("commission service error: {0}")]
pub struct CommissionError(pub String);

#[async_trait]
pub trait CommissionService: Send + Sync {
    async fn record(&self, event: &CommissionEvent) -> Result<(), CommissionError>;
}

/// Logs commission events; for deployments without a partner program service.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingCommissions;

#[async_trait]
impl CommissionService for LoggingCommissions {
    async fn record(&self, event: &CommissionEvent) -> Result<(), CommissionError> {
        info!(
            kind = ?event.kind,
            partner_id = %event.partner_id,
            link_id = %event.link_id,
            amount = event.amount,
            "Commission event"
        );
        Ok(())
    }
}

/// What a link's partner earned on. Returns `None` for non-partner links.
pub(crate) fn commission_for(
    link: &Link,
    kind: CommissionKind,
    customer_id: &CustomerId,
    event_id: &str,
    quantity: u64,
    amount: i64,
    currency: Option<&Currency>,
) -> Option<CommissionEvent> {
    let partner_id = link.partner_id.clone()?;
    Some(CommissionEvent {
        kind,
        workspace_id: link.workspace_id.clone(),
        partner_id,
        program_id: link.program_id.clone(),
        link_id: link.id.clone(),
        customer_id: customer_id.clone(),
        event_id: event_id.to_string(),
        quantity,
        amount,
        currency: currency.cloned(),
    })
}

/// Reports a commission event; failures are logged and skipped.
pub(crate) async fn award(pipeline: &Pipeline, event: Option<CommissionEvent>) {
    let Some(event) = event else {
        return;
    };
    if let Err(e) = pipeline.commissions.record(&event).await {
        warn!(
            partner_id = %event.partner_id,
            link_id = %event.link_id,
            error = %e,
            "Commission skipped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_link;

    #[test]
    fn only_partner_links_earn() {
        let plain = sample_link("link_1", "ws_1");
        assert!(commission_for(&plain, CommissionKind::Lead, &"cus_1".into(), "e1", 1, 0, None).is_none());

        let mut partnered = plain.clone();
        partnered.partner_id = Some("pn_1".into());
        partnered.program_id = Some("prog_1".into());
        let event = commission_for(
            &partnered,
            CommissionKind::Sale,
            &"cus_1".into(),
            "e2",
            1,
            4900,
            Some(&Currency::usd()),
        )
        .unwrap();
        assert_eq!(event.partner_id, "pn_1");
        assert_eq!(event.program_id.as_deref(), Some("prog_1"));
        assert_eq!(event.amount, 4900);
    }
}
