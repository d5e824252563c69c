//! Linktrack - click attribution and conversion tracking for short links.
//!
//! This library provides the attribution pipeline: click recording, lead and
//! sale conversion, provider webhook reconciliation, outbound webhooks,
//! redirect chain probing, and customer hot scores.

pub mod click;
pub mod clock;
pub mod config;
pub mod conversion;
pub mod db;
pub mod dispatch;
pub mod events;
pub mod hotscore;
pub mod jobs;
pub mod persistence;
pub mod pipeline;
pub mod probe;
pub mod reconcile;
pub mod server;
pub mod store;
pub mod types;
pub mod webhooks;

#[cfg(test)]
mod test_utils;
