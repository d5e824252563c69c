//! Click facts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ClickId, LinkId, WorkspaceId};

/// Placeholder for enrichment fields that could not be determined.
pub const UNKNOWN: &str = "Unknown";

/// Geographic enrichment derived from edge headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geo {
    pub country: String,
    pub region: String,
    pub city: String,
    pub continent: String,
}

impl Default for Geo {
    fn default() -> Self {
        Geo {
            country: UNKNOWN.to_string(),
            region: UNKNOWN.to_string(),
            city: UNKNOWN.to_string(),
            continent: UNKNOWN.to_string(),
        }
    }
}

/// Device classification derived from the user agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    #[serde(rename = "type")]
    pub kind: DeviceKind,
    pub vendor: String,
    pub model: String,
}

impl Default for Device {
    fn default() -> Self {
        Device {
            kind: DeviceKind::Desktop,
            vendor: UNKNOWN.to_string(),
            model: UNKNOWN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Desktop,
    Mobile,
    Tablet,
}

/// An immutable click fact, created exactly once per qualifying click.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickEvent {
    pub timestamp: DateTime<Utc>,
    pub click_id: ClickId,
    pub link_id: LinkId,
    pub workspace_id: WorkspaceId,
    /// Hex SHA-256 of the visitor's ip and user agent.
    pub identity_hash: String,
    pub geo: Geo,
    pub device: Device,
    pub browser: String,
    pub os: String,
    pub referrer: String,
    pub url: String,
    pub bot: bool,
}
