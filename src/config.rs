//! Service configuration from `LINKTRACK_*` environment variables.
//!
//! | variable | default |
//! |----------|---------|
//! | `LINKTRACK_BIND_ADDR` | `0.0.0.0:3000` |
//! | `LINKTRACK_WEBHOOK_MASTER_SECRET` | required |
//! | `LINKTRACK_ERROR_LOG_DIR` | `./data/webhook-errors` |
//! | `LINKTRACK_EVENT_STORE_URL` | unset (in-memory event store) |
//! | `LINKTRACK_EVENT_STORE_TOKEN` | unset |
//! | `LINKTRACK_FX_URL` | unset (reporting currency only) |
//! | `LINKTRACK_RECONCILE_WINDOW_SECS` | 600 |
//! | `LINKTRACK_CLICK_DEDUP_SECS` | 3600 |
//! | `LINKTRACK_PROBE_MAX_HOPS` | 5 |
//! | `LINKTRACK_PROBE_TIMEOUT_MS` | 3000 |
//! | `LINKTRACK_SEED_FILE` | unset |

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::click::RecorderConfig;
use crate::conversion::ConversionConfig;
use crate::dispatch::RetryConfig;
use crate::pipeline::Settings;
use crate::probe::ProbeConfig;
use crate::reconcile::ReconcileConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Root secret for per-workspace provider webhook secrets.
    pub webhook_master_secret: String,
    pub error_log_dir: PathBuf,
    pub event_store_url: Option<String>,
    pub event_store_token: Option<String>,
    pub fx_url: Option<String>,
    pub reconcile_window: Duration,
    pub click_dedup_ttl: Duration,
    pub probe_max_hops: usize,
    pub probe_timeout: Duration,
    pub seed_file: Option<PathBuf>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_addr", &self.bind_addr)
            .field("error_log_dir", &self.error_log_dir)
            .field("event_store_url", &self.event_store_url)
            .field("fx_url", &self.fx_url)
            .field("reconcile_window", &self.reconcile_window)
            .field("click_dedup_ttl", &self.click_dedup_ttl)
            .field("probe_max_hops", &self.probe_max_hops)
            .field("probe_timeout", &self.probe_timeout)
            .field("seed_file", &self.seed_file)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| {
            lookup(name).and_then(|v| {
                let trimmed = v.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
        };
        let get_u64 = |name: &'static str| -> Result<Option<u64>> {
            get(name)
                .map(|v| {
                    v.parse::<u64>().map_err(|e| ConfigError::Invalid {
                        name,
                        reason: format!("must be a non-negative integer: {e}"),
                    })
                })
                .transpose()
        };

        let bind_addr = match get("LINKTRACK_BIND_ADDR") {
            Some(v) => v.parse().map_err(|e| ConfigError::Invalid {
                name: "LINKTRACK_BIND_ADDR",
                reason: format!("{e}"),
            })?,
            None => SocketAddr::from(([0, 0, 0, 0], 3000)),
        };

        let webhook_master_secret = get("LINKTRACK_WEBHOOK_MASTER_SECRET")
            .ok_or(ConfigError::Missing("LINKTRACK_WEBHOOK_MASTER_SECRET"))?;

        let reconcile_window =
            Duration::from_secs(get_u64("LINKTRACK_RECONCILE_WINDOW_SECS")?.unwrap_or(600));
        if reconcile_window.is_zero() {
            return Err(ConfigError::Invalid {
                name: "LINKTRACK_RECONCILE_WINDOW_SECS",
                reason: "must be positive".to_string(),
            });
        }

        let probe_max_hops = get_u64("LINKTRACK_PROBE_MAX_HOPS")?.unwrap_or(5) as usize;
        if probe_max_hops == 0 {
            return Err(ConfigError::Invalid {
                name: "LINKTRACK_PROBE_MAX_HOPS",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Config {
            bind_addr,
            webhook_master_secret,
            error_log_dir: get("LINKTRACK_ERROR_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/webhook-errors")),
            event_store_url: get("LINKTRACK_EVENT_STORE_URL"),
            event_store_token: get("LINKTRACK_EVENT_STORE_TOKEN"),
            fx_url: get("LINKTRACK_FX_URL"),
            reconcile_window,
            click_dedup_ttl: Duration::from_secs(
                get_u64("LINKTRACK_CLICK_DEDUP_SECS")?.unwrap_or(3600),
            ),
            probe_max_hops,
            probe_timeout: Duration::from_millis(
                get_u64("LINKTRACK_PROBE_TIMEOUT_MS")?.unwrap_or(3000),
            ),
            seed_file: get("LINKTRACK_SEED_FILE").map(PathBuf::from),
        })
    }

    /// Component tunables derived from this config.
    pub fn settings(&self) -> Settings {
        Settings {
            recorder: RecorderConfig {
                dedup_ttl: self.click_dedup_ttl,
                ..RecorderConfig::default()
            },
            conversion: ConversionConfig::default(),
            reconcile: ReconcileConfig {
                window: self.reconcile_window,
                ..ReconcileConfig::default()
            },
            retry: RetryConfig::DEFAULT,
        }
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            max_hops: self.probe_max_hops,
            hop_timeout: self.probe_timeout,
            fail_closed: false,
        }
    }
}
