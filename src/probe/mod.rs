//! Redirect chain probing for destination URLs.
//!
//! Before a destination is attached to a short link, its redirect chain is
//! followed hop by hop with header-only requests. The result tells the caller
//! whether the chain silently crosses into an unrelated apex domain, which is
//! the abuse signal consumers act on.
//!
//! # State machine
//!
//! ```text
//! Following --3xx + Location--> Following (next hop)
//!     |--other status---------> Terminal
//!     |--network/timeout------> Error (partial or failed, see fail_closed)
//!     |--second apex seen-----> done, has_multiple_apex_domains
//!     '--hop budget exhausted-> too_many_redirects (failure)
//! ```

pub mod apex;
pub mod http;

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

pub use apex::apex_domain;
pub use http::HttpHeadProbe;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("hop to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {reason}")]
    Network { url: String, reason: String },
}

/// What a single header-only request observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HopResponse {
    /// A 3xx with a `Location` header.
    Redirect { status: u16, location: String },
    /// Anything else, including a 3xx without `Location`.
    Final { status: u16 },
}

/// One header-only request with redirects disabled.
#[async_trait]
pub trait HeadProbe: Send + Sync {
    async fn head(&self, url: &Url, timeout: Duration) -> Result<HopResponse, ProbeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeConfig {
    pub max_hops: usize,
    pub hop_timeout: Duration,
    /// Report network errors as failures instead of partial successes.
    pub fail_closed: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig {
            max_hops: 5,
            hop_timeout: Duration::from_millis(3000),
            fail_closed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub success: bool,
    /// Every URL visited, starting with the input.
    pub chain: Vec<String>,
    pub final_url: String,
    pub final_status: Option<u16>,
    pub apex_domains: Vec<String>,
    pub has_multiple_apex_domains: bool,
    pub too_many_redirects: bool,
    /// The chain was cut short by an error but reported as success.
    pub incomplete: bool,
    pub error: Option<String>,
    /// Number of requests issued.
    pub hops: usize,
}

struct ChainState {
    chain: Vec<String>,
    apexes: BTreeSet<String>,
    hops: usize,
}

impl ChainState {
    fn report(self, success: bool) -> ProbeReport {
        let final_url = self.chain.last().cloned().unwrap_or_default();
        ProbeReport {
            success,
            has_multiple_apex_domains: self.apexes.len() > 1,
            apex_domains: self.apexes.into_iter().collect(),
            final_url,
            chain: self.chain,
            final_status: None,
            too_many_redirects: false,
            incomplete: false,
            error: None,
            hops: self.hops,
        }
    }
}

fn host_apex(url: &Url) -> Option<String> {
    url.host_str().map(apex_domain)
}

/// Follows the redirect chain starting at `raw_url`.
///
/// Returns as soon as a second distinct apex domain appears, without
/// requesting the new destination.
pub async fn probe_redirect_chain(
    prober: &dyn HeadProbe,
    raw_url: &str,
    config: &ProbeConfig,
) -> ProbeReport {
    let mut current = match Url::parse(raw_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => url,
        Ok(url) => {
            return invalid(raw_url, format!("unsupported scheme {}", url.scheme()));
        }
        Err(e) => return invalid(raw_url, e.to_string()),
    };

    let mut state = ChainState {
        chain: vec![current.to_string()],
        apexes: host_apex(&current).into_iter().collect(),
        hops: 0,
    };

    while state.hops < config.max_hops {
        state.hops += 1;
        let response = match prober.head(&current, config.hop_timeout).await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %current, hop = state.hops, error = %e, "Redirect probe hop failed");
                let fail_closed = config.fail_closed;
                let mut report = state.report(!fail_closed);
                report.incomplete = !fail_closed;
                report.error = fail_closed.then(|| e.to_string());
                return report;
            }
        };

        match response {
            HopResponse::Final { status } => {
                debug!(url = %current, status, hops = state.hops, "Redirect chain terminated");
                let mut report = state.report(true);
                report.final_status = Some(status);
                return report;
            }
            HopResponse::Redirect { status, location } => {
                let next = match current.join(&location) {
                    Ok(next) => next,
                    Err(e) => {
                        // An unparsable Location ends the chain at the current hop.
                        debug!(url = %current, location = %location, error = %e, "Bad Location header");
                        let mut report = state.report(true);
                        report.final_status = Some(status);
                        return report;
                    }
                };
                state.chain.push(next.to_string());
                if let Some(apex) = host_apex(&next)
                    && state.apexes.insert(apex)
                    && state.apexes.len() > 1
                {
                    debug!(
                        start = %raw_url,
                        crossed_into = %next,
                        hops = state.hops,
                        "Redirect chain crosses apex domains"
                    );
                    return state.report(true);
                }
                current = next;
            }
        }
    }

    let mut report = state.report(false);
    report.too_many_redirects = true;
    report.error = Some(format!("more than {} redirects", config.max_hops));
    report
}

fn invalid(raw_url: &str, reason: String) -> ProbeReport {
    let err = ProbeError::InvalidUrl {
        url: raw_url.to_string(),
        reason,
    };
    ProbeReport {
        success: false,
        chain: vec![raw_url.to_string()],
        final_url: raw_url.to_string(),
        final_status: None,
        apex_domains: Vec::new(),
        has_multiple_apex_domains: false,
        too_many_redirects: false,
        incomplete: false,
        error: Some(err.to_string()),
        hops: 0,
    }
}
