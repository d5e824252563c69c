//! The sale path: a payment attributed to a known customer's lead.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::commission::{self, CommissionKind};
use super::{ConversionError, fx, release_key};
use crate::db::CounterDelta;
use crate::dispatch::{self, payload};
use crate::hotscore;
use crate::pipeline::Pipeline;
use crate::store::{self, keys};
use crate::types::conversion::new_event_id;
use crate::types::{
    ClickId, Currency, Customer, CustomerActivity, CustomerId, ExternalId, InvoiceId, LeadEvent,
    LinkId, SaleEvent, WebhookTrigger, WorkspaceId,
};

const DEFAULT_SALE_EVENT: &str = "Purchase";
const DEFAULT_LEAD_EVENT: &str = "Sign up";

fn default_event_name() -> String {
    DEFAULT_SALE_EVENT.to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSaleRequest {
    pub external_id: ExternalId,
    #[serde(default)]
    pub invoice_id: Option<InvoiceId>,
    /// Minor units of `currency`.
    pub amount: i64,
    #[serde(default = "Currency::usd")]
    pub currency: Currency,
    pub payment_processor: String,
    #[serde(default = "default_event_name")]
    pub event_name: String,
    /// Restricts attribution to the customer's latest lead with this name.
    #[serde(default)]
    pub lead_event_name: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

impl TrackSaleRequest {
    fn validate(&self) -> Result<(), ConversionError> {
        if self.external_id.as_str().trim().is_empty() {
            return Err(ConversionError::Invalid("externalId is required".into()));
        }
        if self.amount < 0 {
            return Err(ConversionError::Invalid("amount must not be negative".into()));
        }
        if self.payment_processor.trim().is_empty() {
            return Err(ConversionError::Invalid("paymentProcessor is required".into()));
        }
        if self.invoice_id.as_ref().is_some_and(|i| i.as_str().trim().is_empty()) {
            return Err(ConversionError::Invalid("invoiceId must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSummary {
    pub id: CustomerId,
    pub name: String,
    pub email: Option<String>,
    pub external_id: ExternalId,
}

impl From<&Customer> for CustomerSummary {
    fn from(c: &Customer) -> Self {
        CustomerSummary {
            id: c.id.clone(),
            name: c.name.clone(),
            email: c.email.clone(),
            external_id: c.external_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleSummary {
    pub amount: i64,
    pub currency: Currency,
    pub invoice_id: Option<InvoiceId>,
    pub payment_processor: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleResponse {
    pub event_name: String,
    pub customer: Option<CustomerSummary>,
    pub sale: Option<SaleSummary>,
}

impl SaleResponse {
    fn empty(event_name: &str) -> Self {
        SaleResponse {
            event_name: event_name.to_string(),
            customer: None,
            sale: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaleOutcome {
    Recorded(SaleResponse),
    /// The invoice was already processed; nothing changed.
    AlreadyProcessed { invoice_id: InvoiceId },
    /// No customer with that external id; nothing recorded.
    NoCustomer(SaleResponse),
}

/// Where the sale is attributed.
struct Attribution {
    click_id: ClickId,
    link_id: LinkId,
    lead_event_name: Option<String>,
}

/// Tracks a sale for `workspace_id`.
pub async fn track_sale(
    pipeline: &Pipeline,
    workspace_id: &WorkspaceId,
    request: TrackSaleRequest,
) -> Result<SaleOutcome, ConversionError> {
    request.validate()?;

    let dedup_key = request
        .invoice_id
        .as_ref()
        .map(|invoice| keys::sale_dedup(workspace_id, invoice));
    if let (Some(key), Some(invoice_id)) = (&dedup_key, &request.invoice_id) {
        let now = pipeline.clock.now().to_rfc3339();
        let fresh = pipeline
            .store
            .set_if_absent(key, &now, Some(pipeline.settings.conversion.sale_dedup_ttl))
            .await?;
        if !fresh {
            info!(workspace_id = %workspace_id, invoice_id = %invoice_id, "Invoice already processed");
            return Ok(SaleOutcome::AlreadyProcessed {
                invoice_id: invoice_id.clone(),
            });
        }
    }

    let result = record(pipeline, workspace_id, &request).await;
    if let Some(key) = &dedup_key
        && !matches!(result, Ok(SaleOutcome::Recorded(_)))
    {
        release_key(pipeline, key).await;
    }
    result
}

async fn record(
    pipeline: &Pipeline,
    workspace_id: &WorkspaceId,
    request: &TrackSaleRequest,
) -> Result<SaleOutcome, ConversionError> {
    let Some(customer) = pipeline
        .db
        .find_customer(workspace_id, &request.external_id)
        .await?
    else {
        info!(
            workspace_id = %workspace_id,
            external_id = %request.external_id,
            "Sale for unknown customer ignored"
        );
        return Ok(SaleOutcome::NoCustomer(SaleResponse::empty(&request.event_name)));
    };

    let attribution = attribute(pipeline, &customer, request.lead_event_name.as_deref())
        .await
        .ok_or_else(|| ConversionError::LeadNotFound(request.external_id.clone()))?;

    let workspace = pipeline
        .db
        .get_workspace(workspace_id)
        .await?
        .ok_or_else(|| ConversionError::WorkspaceNotFound(workspace_id.clone()))?;
    let amount = fx::convert(
        pipeline.fx.as_ref(),
        request.amount,
        &request.currency,
        &workspace.reporting_currency,
    )
    .await?;

    let first_conversion = customer.has_no_conversions();
    let now = pipeline.clock.now();
    let sale = SaleEvent {
        timestamp: now,
        event_id: new_event_id(),
        event_name: request.event_name.trim().to_string(),
        workspace_id: workspace_id.clone(),
        customer_id: customer.id.clone(),
        click_id: attribution.click_id.clone(),
        link_id: attribution.link_id.clone(),
        amount,
        currency: workspace.reporting_currency.clone(),
        original_amount: request.amount,
        original_currency: request.currency.clone(),
        invoice_id: request.invoice_id.clone(),
        payment_processor: request.payment_processor.clone(),
        metadata: request.metadata.clone(),
    };
    pipeline.events.record_sale(&sale).await?;

    follow_up(pipeline, &customer, &sale, &attribution, first_conversion).await;

    Ok(SaleOutcome::Recorded(SaleResponse {
        event_name: sale.event_name.clone(),
        customer: Some(CustomerSummary::from(&customer)),
        sale: Some(SaleSummary {
            amount: sale.amount,
            currency: sale.currency.clone(),
            invoice_id: sale.invoice_id.clone(),
            payment_processor: sale.payment_processor.clone(),
        }),
    }))
}

/// The customer's lead from the event store, then the lead cache, then the
/// customer's own acquisition click.
async fn attribute(
    pipeline: &Pipeline,
    customer: &Customer,
    lead_event_name: Option<&str>,
) -> Option<Attribution> {
    let from_lead = |lead: LeadEvent| Attribution {
        click_id: lead.click_id,
        link_id: lead.link_id,
        lead_event_name: Some(lead.event_name),
    };

    match pipeline.events.get_latest_lead(&customer.id, lead_event_name).await {
        Ok(Some(lead)) => return Some(from_lead(lead)),
        Ok(None) => {}
        Err(e) => warn!(customer_id = %customer.id, error = %e, "Event store lead lookup failed"),
    }

    match store::get_json::<LeadEvent>(pipeline.store.as_ref(), &keys::lead_cache(&customer.id)).await {
        Ok(Some(lead)) if lead_event_name.is_none_or(|n| lead.event_name == n) => {
            debug!(customer_id = %customer.id, "Sale attributed from lead cache");
            return Some(from_lead(lead));
        }
        Ok(_) => {}
        Err(e) => warn!(customer_id = %customer.id, error = %e, "Lead cache lookup failed"),
    }

    match (&customer.click_id, &customer.link_id) {
        (Some(click_id), Some(link_id)) => Some(Attribution {
            click_id: click_id.clone(),
            link_id: link_id.clone(),
            lead_event_name: None,
        }),
        _ => None,
    }
}

async fn follow_up(
    pipeline: &Pipeline,
    customer: &Customer,
    sale: &SaleEvent,
    attribution: &Attribution,
    first_conversion: bool,
) {
    let delta = CounterDelta::sale(sale.amount);
    if let Err(e) = pipeline.db.increment_link_counters(&sale.link_id, delta).await {
        warn!(link_id = %sale.link_id, error = %e, "Failed to count sale on link");
    }
    if let Err(e) = pipeline
        .db
        .increment_workspace_usage(&sale.workspace_id, delta)
        .await
    {
        warn!(workspace_id = %sale.workspace_id, error = %e, "Failed to count sale on workspace");
    }
    if let Err(e) = pipeline
        .db
        .record_customer_activity(&customer.id, CustomerActivity::sale(sale.timestamp, sale.amount))
        .await
    {
        warn!(customer_id = %customer.id, error = %e, "Failed to record sale activity");
    }

    let link = match pipeline.db.get_link(&sale.link_id).await {
        Ok(link) => link,
        Err(e) => {
            warn!(link_id = %sale.link_id, error = %e, "Link lookup failed");
            None
        }
    };
    if let Some(link) = &link {
        commission::award(
            pipeline,
            commission::commission_for(
                link,
                CommissionKind::Sale,
                &customer.id,
                &sale.event_id,
                1,
                sale.amount,
                Some(&sale.currency),
            ),
        )
        .await;
    }

    if first_conversion {
        let lead_name = attribution
            .lead_event_name
            .as_deref()
            .unwrap_or(DEFAULT_LEAD_EVENT);
        dispatch::dispatch_webhook(
            pipeline,
            &sale.workspace_id,
            WebhookTrigger::LeadCreated,
            None,
            payload::lead_created(lead_name, customer, &sale.click_id, link.as_ref()),
        )
        .await;
    }
    dispatch::dispatch_webhook(
        pipeline,
        &sale.workspace_id,
        WebhookTrigger::SaleCreated,
        None,
        payload::sale_created(sale, customer, link.as_ref()),
    )
    .await;
    hotscore::enqueue(pipeline, &sale.workspace_id, &customer.id);

    info!(
        workspace_id = %sale.workspace_id,
        customer_id = %customer.id,
        click_id = %sale.click_id,
        amount = sale.amount,
        currency = %sale.currency,
        invoice_id = ?sale.invoice_id,
        "Sale recorded"
    );
}
