//! In-memory event store for tests and single-node development.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{EventStore, Result};
use crate::types::{ClickEvent, ClickId, CustomerId, LeadEvent, SaleEvent};

#[derive(Debug, Default)]
struct Tables {
    clicks: Vec<ClickEvent>,
    leads: Vec<LeadEvent>,
    sales: Vec<SaleEvent>,
}

/// Append-only vectors behind a mutex.
///
/// Setting `hide_reads` simulates ingestion lag: writes are accepted but
/// lookups return nothing, forcing callers onto their cache fallbacks.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    tables: Mutex<Tables>,
    hide_reads: std::sync::atomic::AtomicBool,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_hide_reads(&self, hide: bool) {
        self.hide_reads
            .store(hide, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn clicks(&self) -> Vec<ClickEvent> {
        self.lock().clicks.clone()
    }

    pub fn leads(&self) -> Vec<LeadEvent> {
        self.lock().leads.clone()
    }

    pub fn sales(&self) -> Vec<SaleEvent> {
        self.lock().sales.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn reads_hidden(&self) -> bool {
        self.hide_reads.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn record_click(&self, click: &ClickEvent) -> Result<()> {
        self.lock().clicks.push(click.clone());
        Ok(())
    }

    async fn get_click(&self, click_id: &ClickId) -> Result<Option<ClickEvent>> {
        if self.reads_hidden() {
            return Ok(None);
        }
        Ok(self
            .lock()
            .clicks
            .iter()
            .find(|c| &c.click_id == click_id)
            .cloned())
    }

    async fn record_lead(&self, lead: &LeadEvent) -> Result<()> {
        self.lock().leads.push(lead.clone());
        Ok(())
    }

    async fn get_latest_lead(
        &self,
        customer_id: &CustomerId,
        event_name: Option<&str>,
    ) -> Result<Option<LeadEvent>> {
        if self.reads_hidden() {
            return Ok(None);
        }
        Ok(self
            .lock()
            .leads
            .iter()
            .rev()
            .find(|l| {
                &l.customer_id == customer_id && event_name.is_none_or(|n| l.event_name == n)
            })
            .cloned())
    }

    async fn record_sale(&self, sale: &SaleEvent) -> Result<()> {
        self.lock().sales.push(sale.clone());
        Ok(())
    }
}
