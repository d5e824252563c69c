//! What the recorder needs from the inbound HTTP request.

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

use crate::types::Geo;
use crate::types::click::UNKNOWN;

pub const NO_TRACK_HEADER: &str = "dub-no-track";

/// Request metadata, extracted once at the edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub ip: String,
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
    pub no_track: bool,
    pub geo: Geo,
}

impl RequestContext {
    /// Builds the context from request headers.
    ///
    /// `query_no_track` carries the `dub-no-track=1` query parameter;
    /// `peer_ip` is the socket address, used when no forwarding header is set.
    pub fn from_headers(headers: &HeaderMap, query_no_track: bool, peer_ip: Option<String>) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let ip = header("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
            .or_else(|| header("x-real-ip"))
            .or(peer_ip)
            .unwrap_or_else(|| "0.0.0.0".to_string());

        let no_track = query_no_track || header(NO_TRACK_HEADER).as_deref() == Some("1");

        RequestContext {
            ip,
            user_agent: header("user-agent"),
            referrer: header("referer"),
            no_track,
            geo: geo_from_headers(headers),
        }
    }

    /// Hex SHA-256 of ip and user agent; identifies a visitor without storing
    /// either.
    pub fn identity_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.ip.as_bytes());
        hasher.update(self.user_agent.as_deref().unwrap_or_default().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// The referring host, or `"(direct)"`.
    pub fn referrer_host(&self) -> String {
        self.referrer
            .as_deref()
            .and_then(|r| url::Url::parse(r).ok())
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "(direct)".to_string())
    }
}

/// Edge geo headers, percent-decoded. Country falls back to `cf-ipcountry`.
pub fn geo_from_headers(headers: &HeaderMap) -> Geo {
    let decoded = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .and_then(|v| {
                url::form_urlencoded::parse(v.as_bytes())
                    .next()
                    .map(|(k, _)| k.into_owned())
            })
    };
    let or_unknown = |v: Option<String>| v.unwrap_or_else(|| UNKNOWN.to_string());

    Geo {
        country: or_unknown(
            decoded("x-vercel-ip-country")
                .or_else(|| decoded("cf-ipcountry"))
                .filter(|c| c != "XX"),
        ),
        region: or_unknown(decoded("x-vercel-ip-country-region")),
        city: or_unknown(decoded("x-vercel-ip-city")),
        continent: or_unknown(decoded("x-vercel-ip-continent")),
    }
}
