use serde_json::json;
use tracing::{debug, info, warn};

use super::{ClickRequest, LastClick, RequestContext, agent};
use crate::db::CounterDelta;
use crate::dispatch::{self, payload};
use crate::hotscore;
use crate::pipeline::Pipeline;
use crate::store::{self, keys};
use crate::types::{
    AnonymousId, ClickEvent, ClickId, CustomerActivity, LinkId, WebhookTrigger, WorkspaceId,
};

/// Records a click.
///
/// Returns `None` without side effects for no-track requests and bots, and
/// `None` for a repeat `(domain, key, ip)` inside the dedup window (after
/// moving the last-click pointer). Downstream write failures are logged and
/// never returned.
pub async fn record_click(
    pipeline: &Pipeline,
    ctx: &RequestContext,
    request: ClickRequest,
) -> Option<ClickEvent> {
    let link = &request.link;
    if ctx.no_track {
        debug!(link_id = %link.id, "Click skipped: no-track");
        return None;
    }
    if agent::is_bot(ctx.user_agent.as_deref()) {
        debug!(link_id = %link.id, user_agent = ?ctx.user_agent, "Click skipped: bot");
        return None;
    }

    let settings = &pipeline.settings.recorder;
    let click_id = request.click_id.clone().unwrap_or_else(ClickId::generate);
    let dedup_key = keys::click_dedup(&link.domain, &link.key, &ctx.ip);

    let fresh = match pipeline
        .store
        .set_if_absent(&dedup_key, click_id.as_str(), Some(settings.dedup_ttl))
        .await
    {
        Ok(fresh) => fresh,
        Err(e) => {
            warn!(link_id = %link.id, error = %e, "Click dedup check failed, recording anyway");
            true
        }
    };

    if !fresh {
        let original = match pipeline.store.get(&dedup_key).await {
            Ok(Some(id)) => ClickId::new(id),
            Ok(None) => click_id,
            Err(e) => {
                warn!(link_id = %link.id, error = %e, "Could not read deduplicated click id");
                click_id
            }
        };
        debug!(link_id = %link.id, click_id = %original, "Click deduplicated");
        if let Some(anonymous_id) = &request.anonymous_id {
            update_last_click(pipeline, &link.workspace_id, anonymous_id, &original, &link.id).await;
        }
        return None;
    }

    let now = pipeline.clock.now();
    let user_agent = ctx.user_agent.as_deref().unwrap_or_default();
    let click = ClickEvent {
        timestamp: now,
        click_id,
        link_id: link.id.clone(),
        workspace_id: link.workspace_id.clone(),
        identity_hash: ctx.identity_hash(),
        geo: ctx.geo.clone(),
        device: agent::device(user_agent),
        browser: agent::browser(user_agent).to_string(),
        os: agent::os(user_agent).to_string(),
        referrer: ctx.referrer_host(),
        url: request.url.clone().unwrap_or_else(|| link.url.clone()),
        bot: false,
    };

    if let Err(e) = pipeline.events.record_click(&click).await {
        warn!(click_id = %click.click_id, error = %e, "Failed to append click to event store");
    }
    if let Err(e) = store::set_json(
        pipeline.store.as_ref(),
        &keys::click_cache(&click.click_id),
        &click,
        Some(settings.click_cache_ttl),
    )
    .await
    {
        warn!(click_id = %click.click_id, error = %e, "Failed to cache click");
    }
    if let Some(anonymous_id) = &request.anonymous_id {
        update_last_click(pipeline, &link.workspace_id, anonymous_id, &click.click_id, &link.id)
            .await;
    }

    apply_counters(pipeline, &request, &click).await;
    push_recent_activity(pipeline, &click).await;

    if !request.skip_webhooks {
        match pipeline.db.get_workspace(&link.workspace_id).await {
            Ok(Some(ws)) if ws.usage_exceeded() => {
                debug!(workspace_id = %ws.id, "Usage exceeded, skipping link.clicked webhooks");
            }
            Ok(Some(_)) => {
                dispatch::dispatch_webhook(
                    pipeline,
                    &link.workspace_id,
                    WebhookTrigger::LinkClicked,
                    Some(&link.id),
                    payload::link_clicked(&click, link),
                )
                .await;
            }
            Ok(None) => warn!(workspace_id = %link.workspace_id, "Workspace missing for link"),
            Err(e) => warn!(workspace_id = %link.workspace_id, error = %e, "Workspace lookup failed"),
        }
    }

    if let Some(customer_id) = &request.customer_id {
        hotscore::enqueue(pipeline, &link.workspace_id, customer_id);
    }

    info!(
        click_id = %click.click_id,
        link_id = %click.link_id,
        workspace_id = %click.workspace_id,
        country = %click.geo.country,
        "Click recorded"
    );
    Some(click)
}

async fn update_last_click(
    pipeline: &Pipeline,
    workspace_id: &WorkspaceId,
    anonymous_id: &AnonymousId,
    click_id: &ClickId,
    link_id: &LinkId,
) {
    let pointer = LastClick {
        click_id: click_id.clone(),
        link_id: link_id.clone(),
        at: pipeline.clock.now(),
    };
    if let Err(e) = store::set_json(
        pipeline.store.as_ref(),
        &keys::last_click(workspace_id, anonymous_id),
        &pointer,
        Some(pipeline.settings.recorder.last_click_ttl),
    )
    .await
    {
        warn!(workspace_id = %workspace_id, error = %e, "Failed to update last-click pointer");
    }
}

async fn apply_counters(pipeline: &Pipeline, request: &ClickRequest, click: &ClickEvent) {
    let delta = CounterDelta::clicks(1);
    if let Err(e) = pipeline.db.increment_link_counters(&click.link_id, delta).await {
        warn!(link_id = %click.link_id, error = %e, "Failed to count click on link");
    }
    if let Err(e) = pipeline
        .db
        .increment_workspace_usage(&click.workspace_id, delta)
        .await
    {
        warn!(workspace_id = %click.workspace_id, error = %e, "Failed to count click on workspace");
    }
    if let Some(customer_id) = &request.customer_id
        && let Err(e) = pipeline
            .db
            .record_customer_activity(customer_id, CustomerActivity::click(click.timestamp))
            .await
    {
        warn!(customer_id = %customer_id, error = %e, "Failed to count click on customer");
    }
}

async fn push_recent_activity(pipeline: &Pipeline, click: &ClickEvent) {
    let key = keys::recent_activity(&click.workspace_id);
    let entry = json!({
        "type": "click",
        "clickId": click.click_id,
        "linkId": click.link_id,
        "country": click.geo.country,
        "timestamp": click.timestamp,
    })
    .to_string();
    let result = async {
        pipeline.store.push_front(&key, &entry).await?;
        pipeline
            .store
            .trim(&key, pipeline.settings.recorder.recent_activity_len)
            .await
    }
    .await;
    if let Err(e) = result {
        warn!(workspace_id = %click.workspace_id, error = %e, "Failed to update recent activity");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::click::last_click;
    use crate::db::Database;
    use crate::jobs::Job;
    use crate::store::KeyedStore;
    use crate::test_utils::{TestPipeline, sample_link, sample_webhook};
    use axum::http::{HeaderMap, HeaderValue};

    const BROWSER: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15";

    fn ctx(ip: &str) -> RequestContext {
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_static(BROWSER));
        headers.insert("x-vercel-ip-country", HeaderValue::from_static("NL"));
        RequestContext::from_headers(&headers, false, Some(ip.to_string()))
    }

    fn request(anonymous_id: Option<&str>) -> ClickRequest {
        ClickRequest {
            anonymous_id: anonymous_id.map(AnonymousId::new),
            ..ClickRequest::new(sample_link("link_1", "ws_1"))
        }
    }

    #[tokio::test]
    async fn records_and_enriches_click() {
        let h = TestPipeline::new();
        let click = record_click(&h.pipeline, &ctx("1.2.3.4"), request(None))
            .await
            .unwrap();

        assert_eq!(click.link_id, LinkId::new("link_1"));
        assert_eq!(click.geo.country, "NL");
        assert_eq!(click.browser, "Safari");
        assert_eq!(click.os, "Mac OS");
        assert_eq!(click.url, sample_link("link_1", "ws_1").url);
        assert_eq!(h.events.clicks(), vec![click.clone()]);

        let link = h.db.get_link(&"link_1".into()).await.unwrap().unwrap();
        assert_eq!(link.clicks, 1);
        let ws = h.db.get_workspace(&"ws_1".into()).await.unwrap().unwrap();
        assert_eq!(ws.usage, 1);
        let cached: Option<ClickEvent> =
            store::get_json(h.store.as_ref(), &keys::click_cache(&click.click_id))
                .await
                .unwrap();
        assert_eq!(cached, Some(click));
    }

    #[tokio::test]
    async fn bots_and_no_track_have_no_side_effects() {
        let h = TestPipeline::new();
        let bot = RequestContext::from_headers(&HeaderMap::new(), false, Some("1.1.1.1".into()));
        assert!(record_click(&h.pipeline, &bot, request(Some("a1"))).await.is_none());

        let mut no_track = ctx("1.1.1.1");
        no_track.no_track = true;
        assert!(record_click(&h.pipeline, &no_track, request(Some("a1"))).await.is_none());

        assert!(h.events.clicks().is_empty());
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn duplicate_within_window_moves_pointer_only() {
        let h = TestPipeline::new();
        let first = record_click(&h.pipeline, &ctx("9.9.9.9"), request(Some("a1")))
            .await
            .unwrap();

        h.clock.advance(std::time::Duration::from_secs(60));
        let repeat = record_click(&h.pipeline, &ctx("9.9.9.9"), request(Some("a2"))).await;
        assert!(repeat.is_none());
        assert_eq!(h.events.clicks().len(), 1);

        let pointer = last_click(&h.pipeline, &"ws_1".into(), &"a2".into())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pointer.click_id, first.click_id);
        assert_eq!(pointer.at, h.now());

        let link = h.db.get_link(&"link_1".into()).await.unwrap().unwrap();
        assert_eq!(link.clicks, 1);
    }

    #[tokio::test]
    async fn dedup_window_expires() {
        let h = TestPipeline::new();
        record_click(&h.pipeline, &ctx("9.9.9.9"), request(None)).await.unwrap();
        h.clock.advance(h.pipeline.settings.recorder.dedup_ttl);
        assert!(record_click(&h.pipeline, &ctx("9.9.9.9"), request(None)).await.is_some());
        assert_eq!(h.events.clicks().len(), 2);
    }

    #[tokio::test]
    async fn different_ips_are_distinct_clicks() {
        let h = TestPipeline::new();
        record_click(&h.pipeline, &ctx("1.1.1.1"), request(None)).await.unwrap();
        record_click(&h.pipeline, &ctx("2.2.2.2"), request(None)).await.unwrap();
        assert_eq!(h.events.clicks().len(), 2);
    }

    #[tokio::test]
    async fn recent_activity_is_bounded() {
        let h = TestPipeline::new();
        for i in 0..105 {
            let ip = format!("10.0.0.{i}");
            record_click(&h.pipeline, &ctx(&ip), request(None)).await.unwrap();
        }
        let recent = h
            .store
            .list_recent(&keys::recent_activity(&"ws_1".into()), 1000)
            .await
            .unwrap();
        assert_eq!(recent.len(), 100);
    }

    #[tokio::test]
    async fn link_clicked_webhook_respects_usage_quota() {
        let mut h = TestPipeline::new();
        let mut hook = sample_webhook("wh_1", "ws_1", vec![WebhookTrigger::LinkClicked]);
        hook.link_ids = vec!["link_1".into()];
        h.db.insert_webhook(hook);

        record_click(&h.pipeline, &ctx("1.1.1.1"), request(None)).await.unwrap();
        let jobs = h.jobs.drain();
        assert_eq!(jobs.len(), 1);
        assert!(matches!(jobs[0].job, Job::DispatchWebhook(_)));

        let mut ws = h.db.get_workspace(&"ws_1".into()).await.unwrap().unwrap();
        ws.usage_limit = 0;
        h.db.insert_workspace(ws);
        record_click(&h.pipeline, &ctx("2.2.2.2"), request(None)).await.unwrap();
        assert!(h.jobs.drain().is_empty());
    }

    #[tokio::test]
    async fn skip_webhooks_flag() {
        let mut h = TestPipeline::new();
        let mut hook = sample_webhook("wh_1", "ws_1", vec![WebhookTrigger::LinkClicked]);
        hook.link_ids = vec!["link_1".into()];
        h.db.insert_webhook(hook);

        let mut req = request(None);
        req.skip_webhooks = true;
        record_click(&h.pipeline, &ctx("1.1.1.1"), req).await.unwrap();
        assert!(h.jobs.drain().is_empty());
    }

    #[tokio::test]
    async fn known_customer_gets_click_and_hot_score() {
        let mut h = TestPipeline::new();
        let customer = h.seed_customer("ws_1", "u1").await;
        let mut req = request(None);
        req.customer_id = Some(customer.id.clone());

        record_click(&h.pipeline, &ctx("1.1.1.1"), req).await.unwrap();

        let stored = h.db.get_customer(&customer.id).await.unwrap().unwrap();
        assert_eq!(stored.total_clicks, 1);
        assert!(
            h.jobs
                .drain()
                .iter()
                .any(|j| matches!(j.job, Job::RecomputeHotScore { .. }))
        );
    }
}
