//! Outbound webhook payloads.
//!
//! Every delivery has the envelope `{id, trigger, workspaceId, createdAt, data}`
//! where `data` is a trigger-specific view of the underlying event plus its
//! link and customer context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::types::{ClickEvent, ClickId, Customer, Link, SaleEvent, WebhookTrigger, WorkspaceId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    /// Unique per event; consumers deduplicate on it.
    pub id: String,
    pub trigger: WebhookTrigger,
    pub workspace_id: WorkspaceId,
    pub created_at: DateTime<Utc>,
    pub data: Value,
}

impl WebhookPayload {
    pub fn new(
        trigger: WebhookTrigger,
        workspace_id: WorkspaceId,
        created_at: DateTime<Utc>,
        data: Value,
    ) -> Self {
        WebhookPayload {
            id: format!("evt_{}", uuid::Uuid::new_v4().simple()),
            trigger,
            workspace_id,
            created_at,
            data,
        }
    }
}

fn link_view(link: &Link) -> Value {
    json!({
        "id": link.id,
        "domain": link.domain,
        "key": link.key,
        "shortLink": link.short_link(),
        "url": link.url,
        "partnerId": link.partner_id,
        "programId": link.program_id,
    })
}

fn customer_view(customer: &Customer) -> Value {
    json!({
        "id": customer.id,
        "externalId": customer.external_id,
        "name": customer.name,
        "email": customer.email,
        "avatar": customer.avatar,
        "country": customer.country,
        "createdAt": customer.created_at,
    })
}

pub fn link_clicked(click: &ClickEvent, link: &Link) -> Value {
    json!({
        "click": {
            "id": click.click_id,
            "timestamp": click.timestamp,
            "url": click.url,
            "country": click.geo.country,
            "city": click.geo.city,
            "region": click.geo.region,
            "continent": click.geo.continent,
            "device": click.device.kind,
            "browser": click.browser,
            "os": click.os,
            "referer": click.referrer,
        },
        "link": link_view(link),
    })
}

pub fn lead_created(
    event_name: &str,
    customer: &Customer,
    click_id: &ClickId,
    link: Option<&Link>,
) -> Value {
    json!({
        "eventName": event_name,
        "customer": customer_view(customer),
        "click": { "id": click_id },
        "link": link.map(link_view),
    })
}

pub fn sale_created(sale: &SaleEvent, customer: &Customer, link: Option<&Link>) -> Value {
    json!({
        "eventName": sale.event_name,
        "customer": customer_view(customer),
        "click": { "id": sale.click_id },
        "link": link.map(link_view),
        "sale": {
            "amount": sale.amount,
            "currency": sale.currency,
            "invoiceId": sale.invoice_id,
            "paymentProcessor": sale.payment_processor,
        },
    })
}
