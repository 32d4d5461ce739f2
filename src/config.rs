use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::filters::{default_filters, Filter, FilterKind};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_true")]
    pub filtering_enabled: bool,
    /// 0 disables scheduled refresh.
    #[serde(default = "default_update_interval")]
    pub update_interval_hours: u32,
    #[serde(default)]
    pub user_rules: Vec<String>,
    /// Blocklists. Falls back to the built-in defaults when empty.
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
    #[serde(default)]
    pub allowlist_filters: Vec<FilterConfig>,
    pub http: HttpConfig,
}

/// The authored part of a filter; cache fields are never persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub url: String,
    #[serde(default)]
    pub name: String,
    /// 0 means "assign one on load".
    #[serde(default)]
    pub id: i64,
}

impl FilterConfig {
    fn into_filter(self, kind: FilterKind) -> Filter {
        Filter::new(kind, self.url, self.name, self.enabled).with_id(self.id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_true() -> bool { true }
fn default_data_dir() -> PathBuf { PathBuf::from("./data") }
fn default_update_interval() -> u32 { 24 }
fn default_timeout_secs() -> u64 { 30 }
fn default_user_agent() -> String { format!("filter-sync/{}", env!("CARGO_PKG_VERSION")) }

const MAX_UPDATE_INTERVAL_HOURS: u32 = 365 * 24;

impl Config {
    /// Every configured filter with its sequence membership, blocklists first.
    pub fn all_filters(&self) -> Vec<Filter> {
        let blocklists = if self.filters.is_empty() {
            default_filters()
        } else {
            self.filters
                .iter()
                .cloned()
                .map(|f| f.into_filter(FilterKind::Blocklist))
                .collect()
        };

        blocklists
            .into_iter()
            .chain(
                self.allowlist_filters
                    .iter()
                    .cloned()
                    .map(|f| f.into_filter(FilterKind::Allowlist)),
            )
            .collect()
    }
}

pub fn validate(cfg: &Config) -> Result<()> {
    if cfg.data_dir.as_os_str().is_empty() {
        anyhow::bail!("CONFIG ERROR: data_dir must not be empty");
    }

    if cfg.http.timeout_secs == 0 {
        anyhow::bail!("CONFIG ERROR: http.timeout_secs must be greater than 0");
    }

    if cfg.update_interval_hours > MAX_UPDATE_INTERVAL_HOURS {
        anyhow::bail!(
            "CONFIG ERROR: update_interval_hours must be at most {} (current: {})",
            MAX_UPDATE_INTERVAL_HOURS,
            cfg.update_interval_hours
        );
    }

    tracing::info!("Configuration validation passed");
    Ok(())
}

fn build(file: &str) -> Result<Config> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file).required(false))
        .add_source(config::Environment::with_prefix("FILTER_SYNC").separator("__"))
        .set_default("data_dir", "./data")?
        .set_default("filtering_enabled", true)?
        .set_default("update_interval_hours", 24)?
        .set_default("http.timeout_secs", 30)?
        .set_default("http.user_agent", default_user_agent())?
        .build()?
        .try_deserialize()?;

    validate(&cfg)?;

    Ok(cfg)
}

pub fn load() -> Result<Config> {
    build("filter-sync")
}
