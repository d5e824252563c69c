//! The lead path: a click becomes an identified customer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::commission::{self, CommissionKind};
use super::{ConversionError, normalize_event_name, release_key};
use crate::click;
use crate::db::CounterDelta;
use crate::dispatch::{self, payload};
use crate::hotscore;
use crate::jobs::Job;
use crate::pipeline::Pipeline;
use crate::store::{self, keys};
use crate::types::click::UNKNOWN;
use crate::types::conversion::new_event_id;
use crate::types::{
    ClickEvent, ClickId, Customer, CustomerActivity, ExternalId, LeadEvent, NewCustomer,
    WebhookTrigger, WorkspaceId,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadMode {
    /// Respond immediately; commit in the background.
    #[default]
    Async,
    /// Commit before responding.
    Sync,
}

fn one() -> u64 {
    1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackLeadRequest {
    pub click_id: ClickId,
    pub event_name: String,
    pub external_id: ExternalId,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_avatar: Option<String>,
    #[serde(default = "one")]
    pub event_quantity: u64,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub mode: LeadMode,
}

impl TrackLeadRequest {
    fn validate(&self) -> Result<(), ConversionError> {
        if self.click_id.as_str().trim().is_empty() {
            return Err(ConversionError::Invalid("clickId is required".into()));
        }
        if normalize_event_name(&self.event_name).is_empty() {
            return Err(ConversionError::Invalid("eventName is required".into()));
        }
        if self.external_id.as_str().trim().is_empty() {
            return Err(ConversionError::Invalid("externalId is required".into()));
        }
        if self.event_quantity == 0 {
            return Err(ConversionError::Invalid("eventQuantity must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClickRef {
    pub id: ClickId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRef {
    pub name: String,
    pub email: Option<String>,
    pub external_id: ExternalId,
}

/// Built from the request alone so a deduplicated repeat answers the same.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeadResponse {
    pub click: ClickRef,
    pub customer: CustomerRef,
}

impl LeadResponse {
    fn for_request(request: &TrackLeadRequest) -> Self {
        LeadResponse {
            click: ClickRef {
                id: request.click_id.clone(),
            },
            customer: CustomerRef {
                name: request
                    .customer_name
                    .clone()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| display_name(&request.external_id)),
                email: request.customer_email.clone(),
                external_id: request.external_id.clone(),
            },
        }
    }
}

/// Everything needed to commit a lead once its click is resolved.
#[derive(Debug, Clone)]
pub struct LeadCommit {
    pub workspace_id: WorkspaceId,
    pub click: ClickEvent,
    pub event_name: String,
    pub external_id: ExternalId,
    pub name: String,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub quantity: u64,
    pub metadata: Value,
    /// Released if the commit fails.
    pub dedup_key: String,
    pub received_at: DateTime<Utc>,
}

const ADJECTIVES: &[&str] = &[
    "Amber", "Brisk", "Calm", "Dapper", "Eager", "Fuzzy", "Gentle", "Hazel", "Ivory", "Jolly",
    "Keen", "Lucky", "Mellow", "Nimble", "Olive", "Plucky",
];
const ANIMALS: &[&str] = &[
    "Otter", "Badger", "Falcon", "Heron", "Lynx", "Marten", "Newt", "Ocelot", "Puffin", "Quail",
    "Raven", "Stoat", "Tapir", "Urchin", "Vole", "Wombat",
];

/// A stable placeholder name for customers created without one.
pub fn display_name(external_id: &ExternalId) -> String {
    let digest = Sha256::digest(external_id.as_str().as_bytes());
    let adjective = ADJECTIVES[digest[0] as usize % ADJECTIVES.len()];
    let animal = ANIMALS[digest[1] as usize % ANIMALS.len()];
    format!("{adjective} {animal}")
}

/// Tracks a lead for `workspace_id`.
///
/// A repeat `(externalId, eventName)` answers with the same response and does
/// nothing. An unknown click is [`ConversionError::ClickNotFound`] and
/// releases the dedup key.
pub async fn track_lead(
    pipeline: &Pipeline,
    workspace_id: &WorkspaceId,
    request: TrackLeadRequest,
) -> Result<LeadResponse, ConversionError> {
    request.validate()?;
    let response = LeadResponse::for_request(&request);
    let event_name = normalize_event_name(&request.event_name);
    let dedup_key = keys::lead_dedup(workspace_id, &request.external_id, &event_name);

    if !pipeline
        .store
        .set_if_absent(&dedup_key, request.click_id.as_str(), None)
        .await?
    {
        debug!(
            workspace_id = %workspace_id,
            external_id = %request.external_id,
            event_name = %event_name,
            "Duplicate lead ignored"
        );
        return Ok(response);
    }

    let click = match click::find_click(pipeline, &request.click_id).await {
        Some(click) if &click.workspace_id == workspace_id => click,
        _ => {
            release_key(pipeline, &dedup_key).await;
            return Err(ConversionError::ClickNotFound(request.click_id));
        }
    };

    let commit = LeadCommit {
        workspace_id: workspace_id.clone(),
        click,
        event_name: request.event_name.trim().to_string(),
        external_id: request.external_id,
        name: response.customer.name.clone(),
        email: request.customer_email,
        avatar: request.customer_avatar,
        quantity: request.event_quantity,
        metadata: request.metadata,
        dedup_key,
        received_at: pipeline.clock.now(),
    };

    match request.mode {
        LeadMode::Sync => {
            commit_lead(pipeline, commit).await?;
        }
        LeadMode::Async => {
            pipeline.jobs.submit(Job::LeadFollowUp(Box::new(commit)));
        }
    }
    Ok(response)
}

/// Creates the customer for `external_id` from `click`, or returns the
/// existing row untouched.
pub async fn ensure_customer(
    pipeline: &Pipeline,
    click: &ClickEvent,
    external_id: &ExternalId,
    name: String,
    email: Option<String>,
    avatar: Option<String>,
) -> Result<Customer, ConversionError> {
    let country = Some(click.geo.country.clone()).filter(|c| c != UNKNOWN);
    let (customer, created) = pipeline
        .db
        .upsert_customer(NewCustomer {
            workspace_id: click.workspace_id.clone(),
            external_id: external_id.clone(),
            name,
            email,
            avatar,
            country,
            click_id: Some(click.click_id.clone()),
            link_id: Some(click.link_id.clone()),
            created_at: pipeline.clock.now(),
        })
        .await?;
    if created {
        info!(
            workspace_id = %customer.workspace_id,
            customer_id = %customer.id,
            click_id = %click.click_id,
            "Customer created"
        );
    }
    Ok(customer)
}

/// Commits a resolved lead: customer upsert and lead append on the critical
/// path, then counters, caches, commission, webhook, and hot score best-effort.
pub async fn commit_lead(pipeline: &Pipeline, commit: LeadCommit) -> Result<Customer, ConversionError> {
    match commit_critical(pipeline, &commit).await {
        Ok((customer, lead)) => {
            follow_up(pipeline, &commit, &customer, &lead).await;
            Ok(customer)
        }
        Err(e) => {
            release_key(pipeline, &commit.dedup_key).await;
            Err(e)
        }
    }
}

async fn commit_critical(
    pipeline: &Pipeline,
    commit: &LeadCommit,
) -> Result<(Customer, LeadEvent), ConversionError> {
    let customer = ensure_customer(
        pipeline,
        &commit.click,
        &commit.external_id,
        commit.name.clone(),
        commit.email.clone(),
        commit.avatar.clone(),
    )
    .await?;

    let lead = LeadEvent {
        timestamp: commit.received_at,
        event_id: new_event_id(),
        event_name: commit.event_name.clone(),
        workspace_id: commit.workspace_id.clone(),
        customer_id: customer.id.clone(),
        click_id: commit.click.click_id.clone(),
        link_id: commit.click.link_id.clone(),
        quantity: commit.quantity,
        metadata: commit.metadata.clone(),
    };
    pipeline.events.record_lead(&lead).await?;
    Ok((customer, lead))
}

async fn follow_up(pipeline: &Pipeline, commit: &LeadCommit, customer: &Customer, lead: &LeadEvent) {
    if let Err(e) = store::set_json(
        pipeline.store.as_ref(),
        &keys::lead_cache(&customer.id),
        lead,
        Some(pipeline.settings.conversion.lead_cache_ttl),
    )
    .await
    {
        warn!(customer_id = %customer.id, error = %e, "Failed to cache lead");
    }

    let delta = CounterDelta::leads(lead.quantity);
    if let Err(e) = pipeline.db.increment_link_counters(&lead.link_id, delta).await {
        warn!(link_id = %lead.link_id, error = %e, "Failed to count lead on link");
    }
    if let Err(e) = pipeline
        .db
        .increment_workspace_usage(&lead.workspace_id, delta)
        .await
    {
        warn!(workspace_id = %lead.workspace_id, error = %e, "Failed to count lead on workspace");
    }
    if let Err(e) = pipeline
        .db
        .record_customer_activity(&customer.id, CustomerActivity::lead(lead.timestamp, lead.quantity))
        .await
    {
        warn!(customer_id = %customer.id, error = %e, "Failed to record lead activity");
    }

    let link = match pipeline.db.get_link(&lead.link_id).await {
        Ok(link) => link,
        Err(e) => {
            warn!(link_id = %lead.link_id, error = %e, "Link lookup failed");
            None
        }
    };
    if let Some(link) = &link {
        commission::award(
            pipeline,
            commission::commission_for(
                link,
                CommissionKind::Lead,
                &customer.id,
                &lead.event_id,
                lead.quantity,
                0,
                None,
            ),
        )
        .await;
    }

    dispatch::dispatch_webhook(
        pipeline,
        &lead.workspace_id,
        WebhookTrigger::LeadCreated,
        None,
        payload::lead_created(&lead.event_name, customer, &lead.click_id, link.as_ref()),
    )
    .await;
    hotscore::enqueue(pipeline, &lead.workspace_id, &customer.id);

    info!(
        workspace_id = %lead.workspace_id,
        customer_id = %customer.id,
        click_id = %lead.click_id,
        event_name = %lead.event_name,
        external_id = %commit.external_id,
        "Lead recorded"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::events::EventStore;
    use crate::test_utils::{TestPipeline, sample_click, sample_webhook};
    use proptest::prelude::*;

    fn request(click_id: &str, event_name: &str, external_id: &str, mode: LeadMode) -> TrackLeadRequest {
        TrackLeadRequest {
            click_id: click_id.into(),
            event_name: event_name.into(),
            external_id: external_id.into(),
            customer_name: None,
            customer_email: Some("u1@example.com".into()),
            customer_avatar: None,
            event_quantity: 1,
            metadata: Value::Null,
            mode,
        }
    }

    async fn harness_with_click() -> TestPipeline {
        let h = TestPipeline::new();
        h.events
            .record_click(&sample_click("clk_1", "link_1", "ws_1"))
            .await
            .unwrap();
        h
    }

    // ─── Unit Tests ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn sync_lead_creates_customer_with_acquisition_click() {
        let mut h = harness_with_click().await;
        let ws = WorkspaceId::new("ws_1");

        let response = track_lead(&h.pipeline, &ws, request("clk_1", "Signup", "u1", LeadMode::Sync))
            .await
            .unwrap();
        assert_eq!(response.click.id, ClickId::new("clk_1"));
        assert_eq!(response.customer.external_id, ExternalId::new("u1"));

        let customer = h.db.find_customer(&ws, &"u1".into()).await.unwrap().unwrap();
        assert_eq!(customer.click_id, Some(ClickId::new("clk_1")));
        assert_eq!(customer.leads, 1);
        assert_eq!(h.events.leads().len(), 1);

        let link = h.db.get_link(&"link_1".into()).await.unwrap().unwrap();
        assert_eq!(link.leads, 1);
        assert!(
            h.jobs
                .drain()
                .iter()
                .any(|j| matches!(j.job, Job::RecomputeHotScore { .. }))
        );
    }

    #[tokio::test]
    async fn repeat_lead_is_noop_with_same_response() {
        let h = harness_with_click().await;
        let ws = WorkspaceId::new("ws_1");

        let first = track_lead(&h.pipeline, &ws, request("clk_1", "Signup", "u1", LeadMode::Sync))
            .await
            .unwrap();
        let second = track_lead(&h.pipeline, &ws, request("clk_1", " signup ", "u1", LeadMode::Sync))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(h.events.leads().len(), 1);
        assert_eq!(h.db.customer_count(&ws), 1);
    }

    #[tokio::test]
    async fn later_lead_keeps_first_click() {
        let h = harness_with_click().await;
        h.events
            .record_click(&sample_click("clk_2", "link_1", "ws_1"))
            .await
            .unwrap();
        let ws = WorkspaceId::new("ws_1");

        track_lead(&h.pipeline, &ws, request("clk_1", "Signup", "u1", LeadMode::Sync))
            .await
            .unwrap();
        track_lead(&h.pipeline, &ws, request("clk_2", "Activated", "u1", LeadMode::Sync))
            .await
            .unwrap();

        let customer = h.db.find_customer(&ws, &"u1".into()).await.unwrap().unwrap();
        assert_eq!(customer.click_id, Some(ClickId::new("clk_1")));
        assert_eq!(customer.leads, 2);
        assert_eq!(h.db.customer_count(&ws), 1);
    }

    #[tokio::test]
    async fn unknown_click_fails_and_releases_key() {
        let h = TestPipeline::new();
        let ws = WorkspaceId::new("ws_1");
        let err = track_lead(&h.pipeline, &ws, request("clk_1", "Signup", "u1", LeadMode::Sync))
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::ClickNotFound(_)));

        h.events
            .record_click(&sample_click("clk_1", "link_1", "ws_1"))
            .await
            .unwrap();
        track_lead(&h.pipeline, &ws, request("clk_1", "Signup", "u1", LeadMode::Sync))
            .await
            .unwrap();
        assert_eq!(h.events.leads().len(), 1);
    }

    #[tokio::test]
    async fn click_from_other_workspace_is_not_found() {
        let h = harness_with_click().await;
        let err = track_lead(
            &h.pipeline,
            &"ws_2".into(),
            request("clk_1", "Signup", "u1", LeadMode::Sync),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConversionError::ClickNotFound(_)));
    }

    #[tokio::test]
    async fn click_cache_covers_ingestion_lag() {
        let h = TestPipeline::new();
        let click = sample_click("clk_1", "link_1", "ws_1");
        h.events.set_hide_reads(true);
        store::set_json(h.store.as_ref(), &keys::click_cache(&click.click_id), &click, None)
            .await
            .unwrap();

        track_lead(&h.pipeline, &"ws_1".into(), request("clk_1", "Signup", "u1", LeadMode::Sync))
            .await
            .unwrap();
        assert_eq!(h.events.leads().len(), 1);
    }

    #[tokio::test]
    async fn async_lead_commits_in_background() {
        let mut h = harness_with_click().await;
        let ws = WorkspaceId::new("ws_1");
        track_lead(&h.pipeline, &ws, request("clk_1", "Signup", "u1", LeadMode::Async))
            .await
            .unwrap();
        assert!(h.events.leads().is_empty());

        h.run_immediate_jobs().await;
        assert_eq!(h.events.leads().len(), 1);
        assert!(h.db.find_customer(&ws, &"u1".into()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn lead_webhook_and_cache() {
        let mut h = harness_with_click().await;
        h.db.insert_webhook(sample_webhook("wh_1", "ws_1", vec![WebhookTrigger::LeadCreated]));
        let ws = WorkspaceId::new("ws_1");

        track_lead(&h.pipeline, &ws, request("clk_1", "Signup", "u1", LeadMode::Sync))
            .await
            .unwrap();
        h.run_immediate_jobs().await;

        let sent = h.transport.sent();
        assert_eq!(sent.len(), 1);
        let body: Value = serde_json::from_slice(&sent[0].body).unwrap();
        assert_eq!(body["trigger"], "lead.created");
        assert_eq!(body["data"]["click"]["id"], "clk_1");

        let customer = h.db.find_customer(&ws, &"u1".into()).await.unwrap().unwrap();
        let cached: Option<LeadEvent> =
            store::get_json(h.store.as_ref(), &keys::lead_cache(&customer.id))
                .await
                .unwrap();
        assert_eq!(cached.unwrap().event_name, "Signup");
    }

    #[tokio::test]
    async fn partner_links_report_commission() {
        let h = harness_with_click().await;
        let mut link = h.db.get_link(&"link_1".into()).await.unwrap().unwrap();
        link.partner_id = Some("pn_1".into());
        h.db.insert_link(link);

        track_lead(&h.pipeline, &"ws_1".into(), request("clk_1", "Signup", "u1", LeadMode::Sync))
            .await
            .unwrap();
        let events = h.commissions.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, CommissionKind::Lead);
    }

    #[tokio::test]
    async fn validation_rejects_without_side_effects() {
        let h = harness_with_click().await;
        let mut bad = request("clk_1", "  ", "u1", LeadMode::Sync);
        assert!(matches!(
            track_lead(&h.pipeline, &"ws_1".into(), bad.clone()).await,
            Err(ConversionError::Invalid(_))
        ));
        bad.event_name = "Signup".into();
        bad.event_quantity = 0;
        assert!(matches!(
            track_lead(&h.pipeline, &"ws_1".into(), bad).await,
            Err(ConversionError::Invalid(_))
        ));
        assert!(h.store.is_empty());
    }

    #[test]
    fn request_defaults() {
        let req: TrackLeadRequest = serde_json::from_str(
            r#"{"clickId":"clk_1","eventName":"Signup","externalId":"u1"}"#,
        )
        .unwrap();
        assert_eq!(req.mode, LeadMode::Async);
        assert_eq!(req.event_quantity, 1);
    }

    // ─── Property Tests ───────────────────────────────────────────────────────

    proptest! {
        #[test]
        fn display_name_is_deterministic(id in "[a-z0-9_]{1,24}") {
            let ext = ExternalId::new(id);
            let name = display_name(&ext);
            prop_assert_eq!(&name, &display_name(&ext));
            prop_assert_eq!(name.split(' ').count(), 2);
        }
    }
}
