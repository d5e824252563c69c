//! [`HeadProbe`] over reqwest with automatic redirects disabled.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::LOCATION;
use url::Url;

use super::{HeadProbe, HopResponse, ProbeError};

const USER_AGENT: &str = "linktrack-redirect-probe/1";

pub struct HttpHeadProbe {
    client: reqwest::Client,
}

impl HttpHeadProbe {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(USER_AGENT)
            .build()?;
        Ok(HttpHeadProbe { client })
    }
}

#[async_trait]
impl HeadProbe for HttpHeadProbe {
    async fn head(&self, url: &Url, timeout: Duration) -> Result<HopResponse, ProbeError> {
        let response = self
            .client
            .head(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Timeout {
                        url: url.to_string(),
                    }
                } else {
                    ProbeError::Network {
                        url: url.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(match location {
            Some(location) if status.is_redirection() => HopResponse::Redirect {
                status: status.as_u16(),
                location,
            },
            _ => HopResponse::Final {
                status: status.as_u16(),
            },
        })
    }
}
