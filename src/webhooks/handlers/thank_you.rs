//! Thank-you page hits.
//!
//! A visitor landing on the post-checkout page is the other half of a
//! reconciliation: if a provider webhook without a click is pending, this
//! visitor's click claims it and the conversion runs now. Otherwise the
//! visitor waits for a webhook.

use serde::Deserialize;
use tracing::{debug, error};

use super::{ProviderWebhookError, WebhookOutcome, process_event};
use crate::click;
use crate::pipeline::Pipeline;
use crate::reconcile::{self, MatchedWebhook, ReconcileError, VisitorReconciliation};
use crate::types::{AnonymousId, ClickId, WorkspaceId};
use crate::webhooks::events::Provider;
use crate::webhooks::parser::{ParseError, parse_provider_event};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThankYouRequest {
    #[serde(default)]
    pub click_id: Option<ClickId>,
    pub anonymous_id: AnonymousId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ThankYouOutcome {
    /// A pending webhook was claimed and converted.
    Converted(WebhookOutcome),
    /// No pending webhook; the visitor waits for one.
    Queued { entry_id: String },
}

pub async fn handle_thank_you(
    pipeline: &Pipeline,
    workspace_id: &WorkspaceId,
    request: ThankYouRequest,
) -> Result<ThankYouOutcome, ProviderWebhookError> {
    let (click_id, link_id) = match &request.click_id {
        Some(click_id) => {
            let click = click::find_click(pipeline, click_id)
                .await
                .filter(|c| &c.workspace_id == workspace_id)
                .ok_or(ProviderWebhookError::NoClick)?;
            (click.click_id, click.link_id)
        }
        None => {
            let last = click::last_click(pipeline, workspace_id, &request.anonymous_id)
                .await
                .map_err(ReconcileError::from)?
                .ok_or(ProviderWebhookError::NoClick)?;
            (last.click_id, last.link_id)
        }
    };

    match reconcile::record_visitor_hit(
        pipeline,
        workspace_id,
        &click_id,
        &link_id,
        &request.anonymous_id,
    )
    .await?
    {
        VisitorReconciliation::Matched(matched) => {
            match convert_claimed(pipeline, workspace_id, &matched, click_id).await {
                Ok(outcome) => Ok(ThankYouOutcome::Converted(outcome)),
                Err(e) => {
                    // The claim removed the webhook from its queue; keep it for review.
                    let entry_id = matched.entry_id.clone();
                    if let Err(log_err) =
                        reconcile::record_failed_claim(pipeline, workspace_id, matched, &e.to_string())
                            .await
                    {
                        error!(
                            workspace_id = %workspace_id,
                            entry_id = %entry_id,
                            error = %log_err,
                            "Failed to record unconverted webhook"
                        );
                    }
                    Err(e)
                }
            }
        }
        VisitorReconciliation::Queued { entry_id } => Ok(ThankYouOutcome::Queued { entry_id }),
    }
}

async fn convert_claimed(
    pipeline: &Pipeline,
    workspace_id: &WorkspaceId,
    matched: &MatchedWebhook,
    click_id: ClickId,
) -> Result<WebhookOutcome, ProviderWebhookError> {
    let provider = Provider::parse(&matched.provider)
        .ok_or_else(|| ProviderWebhookError::UnknownProvider(matched.provider.clone()))?;
    let body = serde_json::to_vec(&matched.payload).map_err(ParseError::from)?;
    let Some(event) = parse_provider_event(provider, &body)? else {
        debug!(workspace_id = %workspace_id, provider = %provider, "Claimed webhook has no conversion");
        return Ok(WebhookOutcome::Ignored);
    };
    Ok(process_event(pipeline, workspace_id, event, click_id).await?)
}
