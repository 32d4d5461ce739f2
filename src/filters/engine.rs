//! Hand-off point to the rule-matching engine.
//!
//! The engine itself lives elsewhere; it only ever sees immutable lists of
//! `(ID, path)` pairs plus the inline user rules.

use std::path::PathBuf;

use super::USER_RULES_FILTER_ID;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterData {
    /// Rules are read from a committed filter file.
    File(PathBuf),
    /// Rules are passed inline.
    Inline(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFilter {
    pub id: i64,
    pub data: FilterData,
}

impl EngineFilter {
    pub fn file(id: i64, path: PathBuf) -> Self {
        Self {
            id,
            data: FilterData::File(path),
        }
    }

    /// The pseudo-filter built from free-text user rules.
    pub fn user_rules(lines: &[String]) -> Self {
        Self {
            id: USER_RULES_FILTER_ID,
            data: FilterData::Inline(lines.join("\n").into_bytes()),
        }
    }
}

/// Everything the engine needs to rebuild its rule set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSet {
    pub user_rules: EngineFilter,
    pub blocklists: Vec<EngineFilter>,
    pub allowlists: Vec<EngineFilter>,
}

pub trait RuleEngine: Send + Sync {
    /// Replace the active filters. With `apply_async` the engine may rebuild in
    /// the background and return immediately.
    fn set_filters(&self, filters: FilterSet, apply_async: bool) -> anyhow::Result<()>;

    /// Turn filtering on or off globally.
    fn set_enabled(&self, enabled: bool);
}

/// Engine stand-in that only reports what it was given.
#[derive(Debug, Default)]
pub struct LoggingEngine;

impl RuleEngine for LoggingEngine {
    fn set_filters(&self, filters: FilterSet, apply_async: bool) -> anyhow::Result<()> {
        tracing::info!(
            "Rule engine armed: {} blocklists, {} allowlists (async: {})",
            filters.blocklists.len(),
            filters.allowlists.len(),
            apply_async,
        );
        Ok(())
    }

    fn set_enabled(&self, enabled: bool) {
        tracing::info!("Filtering {}", if enabled { "enabled" } else { "disabled" });
    }
}
