//! In-memory implementation of [`Database`].
//!
//! Each table sits behind its own mutex; every trait method takes exactly one
//! lock and never awaits while holding it, so each call is atomic.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{CounterDelta, Database, DbError, Result};
use crate::types::{
    Customer, CustomerActivity, CustomerId, ExternalId, Link, LinkId, NewCustomer, WebhookConfig,
    WebhookId, Workspace, WorkspaceId,
};

#[derive(Default)]
struct Customers {
    by_id: HashMap<CustomerId, Customer>,
    by_external: HashMap<(WorkspaceId, ExternalId), CustomerId>,
}

#[derive(Default)]
pub struct MemoryDatabase {
    links: Mutex<HashMap<LinkId, Link>>,
    workspaces: Mutex<HashMap<WorkspaceId, Workspace>>,
    api_keys: Mutex<HashMap<String, WorkspaceId>>,
    customers: Mutex<Customers>,
    webhooks: Mutex<HashMap<WebhookId, WebhookConfig>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_link(&self, link: Link) {
        lock(&self.links).insert(link.id.clone(), link);
    }

    pub fn insert_workspace(&self, workspace: Workspace) {
        lock(&self.workspaces).insert(workspace.id.clone(), workspace);
    }

    pub fn insert_api_key(&self, api_key: impl Into<String>, workspace: WorkspaceId) {
        lock(&self.api_keys).insert(api_key.into(), workspace);
    }

    pub fn insert_webhook(&self, webhook: WebhookConfig) {
        lock(&self.webhooks).insert(webhook.id.clone(), webhook);
    }

    pub fn remove_webhook(&self, id: &WebhookId) -> Option<WebhookConfig> {
        lock(&self.webhooks).remove(id)
    }

    pub fn customer_count(&self, workspace: &WorkspaceId) -> usize {
        lock(&self.customers)
            .by_id
            .values()
            .filter(|c| &c.workspace_id == workspace)
            .count()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn get_link(&self, id: &LinkId) -> Result<Option<Link>> {
        Ok(lock(&self.links).get(id).cloned())
    }

    async fn find_link(&self, domain: &str, key: &str) -> Result<Option<Link>> {
        Ok(lock(&self.links)
            .values()
            .find(|l| l.domain.eq_ignore_ascii_case(domain) && l.key == key)
            .cloned())
    }

    async fn get_workspace(&self, id: &WorkspaceId) -> Result<Option<Workspace>> {
        Ok(lock(&self.workspaces).get(id).cloned())
    }

    async fn workspace_for_api_key(&self, api_key: &str) -> Result<Option<WorkspaceId>> {
        Ok(lock(&self.api_keys).get(api_key).cloned())
    }

    async fn upsert_customer(&self, customer: NewCustomer) -> Result<(Customer, bool)> {
        let mut customers = lock(&self.customers);
        let unique = (customer.workspace_id.clone(), customer.external_id.clone());
        if let Some(existing) = customers
            .by_external
            .get(&unique)
            .and_then(|id| customers.by_id.get(id))
        {
            return Ok((existing.clone(), false));
        }
        let row = customer.into_customer();
        customers.by_external.insert(unique, row.id.clone());
        customers.by_id.insert(row.id.clone(), row.clone());
        Ok((row, true))
    }

    async fn find_customer(
        &self,
        workspace_id: &WorkspaceId,
        external_id: &ExternalId,
    ) -> Result<Option<Customer>> {
        let customers = lock(&self.customers);
        Ok(customers
            .by_external
            .get(&(workspace_id.clone(), external_id.clone()))
            .and_then(|id| customers.by_id.get(id))
            .cloned())
    }

    async fn get_customer(&self, id: &CustomerId) -> Result<Option<Customer>> {
        Ok(lock(&self.customers).by_id.get(id).cloned())
    }

    async fn record_customer_activity(
        &self,
        id: &CustomerId,
        activity: CustomerActivity,
    ) -> Result<()> {
        let mut customers = lock(&self.customers);
        let customer = customers.by_id.get_mut(id).ok_or_else(|| DbError::NotFound {
            entity: "customer",
            id: id.to_string(),
        })?;
        customer.total_clicks += activity.clicks;
        customer.leads += activity.leads;
        customer.sales += activity.sales;
        customer.sale_amount += activity.sale_amount;
        // Out-of-order arrival must not move the activity marker backwards.
        if customer.last_event_at.is_none_or(|last| activity.at >= last) {
            customer.last_event_at = Some(activity.at);
            customer.last_activity_type = Some(activity.activity);
        }
        Ok(())
    }

    async fn set_hot_score(
        &self,
        id: &CustomerId,
        score: u8,
        raw: u8,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut customers = lock(&self.customers);
        let customer = customers.by_id.get_mut(id).ok_or_else(|| DbError::NotFound {
            entity: "customer",
            id: id.to_string(),
        })?;
        customer.hot_score = score;
        customer.hot_score_raw = raw;
        customer.last_hot_score_at = Some(at);
        Ok(())
    }

    async fn increment_link_counters(&self, id: &LinkId, delta: CounterDelta) -> Result<()> {
        let mut links = lock(&self.links);
        let link = links.get_mut(id).ok_or_else(|| DbError::NotFound {
            entity: "link",
            id: id.to_string(),
        })?;
        link.clicks += delta.clicks;
        link.leads += delta.leads;
        link.sales += delta.sales;
        link.sale_amount += delta.sale_amount;
        Ok(())
    }

    async fn increment_workspace_usage(
        &self,
        id: &WorkspaceId,
        delta: CounterDelta,
    ) -> Result<()> {
        let mut workspaces = lock(&self.workspaces);
        let ws = workspaces.get_mut(id).ok_or_else(|| DbError::NotFound {
            entity: "workspace",
            id: id.to_string(),
        })?;
        ws.usage += delta.usage();
        ws.total_clicks += delta.clicks;
        ws.total_leads += delta.leads;
        ws.total_sales += delta.sales;
        ws.total_sale_amount += delta.sale_amount;
        Ok(())
    }

    async fn list_webhooks(&self, workspace_id: &WorkspaceId) -> Result<Vec<WebhookConfig>> {
        let mut hooks: Vec<_> = lock(&self.webhooks)
            .values()
            .filter(|w| &w.workspace_id == workspace_id)
            .cloned()
            .collect();
        hooks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(hooks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{sample_link, sample_workspace};
    use crate::types::ActivityType;
    use std::sync::Arc;

    fn new_customer(ws: &str, ext: &str, click: &str) -> NewCustomer {
        NewCustomer {
            workspace_id: WorkspaceId::new(ws),
            external_id: ExternalId::new(ext),
            name: "Ada".to_string(),
            email: None,
            avatar: None,
            country: None,
            click_id: Some(click.into()),
            link_id: Some("link_1".into()),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_creates_once_and_keeps_first_click() {
        let db = MemoryDatabase::new();
        let (first, created) = db.upsert_customer(new_customer("ws", "u1", "clk_1")).await.unwrap();
        assert!(created);
        let (second, created) = db.upsert_customer(new_customer("ws", "u1", "clk_2")).await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(second.click_id.unwrap().as_str(), "clk_1");
        assert_eq!(db.customer_count(&WorkspaceId::new("ws")), 1);
    }

    #[tokio::test]
    async fn same_external_id_in_other_workspace_is_distinct() {
        let db = MemoryDatabase::new();
        db.upsert_customer(new_customer("ws_a", "u1", "clk_1")).await.unwrap();
        let (_, created) = db.upsert_customer(new_customer("ws_b", "u1", "clk_1")).await.unwrap();
        assert!(created);
    }

    #[tokio::test]
    async fn concurrent_upserts_create_one_row() {
        let db = Arc::new(MemoryDatabase::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                db.upsert_customer(new_customer("ws", "u1", &format!("clk_{i}")))
                    .await
                    .unwrap()
                    .1
            }));
        }
        let mut created = 0;
        for h in handles {
            if h.await.unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(db.customer_count(&WorkspaceId::new("ws")), 1);
    }

    #[tokio::test]
    async fn activity_does_not_move_backwards() {
        let db = MemoryDatabase::new();
        let (c, _) = db.upsert_customer(new_customer("ws", "u1", "clk_1")).await.unwrap();
        let now = Utc::now();
        db.record_customer_activity(&c.id, CustomerActivity::sale(now, 500))
            .await
            .unwrap();
        db.record_customer_activity(
            &c.id,
            CustomerActivity::lead(now - chrono::TimeDelta::minutes(5), 1),
        )
        .await
        .unwrap();
        let c = db.get_customer(&c.id).await.unwrap().unwrap();
        assert_eq!(c.last_activity_type, Some(ActivityType::Sale));
        assert_eq!(c.last_event_at, Some(now));
        assert_eq!((c.leads, c.sales, c.sale_amount), (1, 1, 500));
    }

    #[tokio::test]
    async fn counters_accumulate() {
        let db = MemoryDatabase::new();
        db.insert_link(sample_link("link_1", "ws_1"));
        db.insert_workspace(sample_workspace("ws_1"));
        db.increment_link_counters(&"link_1".into(), CounterDelta::clicks(1))
            .await
            .unwrap();
        db.increment_link_counters(&"link_1".into(), CounterDelta::sale(1200))
            .await
            .unwrap();
        db.increment_workspace_usage(&"ws_1".into(), CounterDelta::sale(1200))
            .await
            .unwrap();

        let link = db.get_link(&"link_1".into()).await.unwrap().unwrap();
        assert_eq!((link.clicks, link.sales, link.sale_amount), (1, 1, 1200));
        let ws = db.get_workspace(&"ws_1".into()).await.unwrap().unwrap();
        assert_eq!((ws.usage, ws.total_sale_amount), (1, 1200));
    }

    #[tokio::test]
    async fn counters_on_missing_link_fail() {
        let db = MemoryDatabase::new();
        let err = db
            .increment_link_counters(&"nope".into(), CounterDelta::clicks(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { entity: "link", .. }));
    }
}
