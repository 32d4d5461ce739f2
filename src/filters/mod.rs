use chrono::{DateTime, Utc};

pub mod engine;
pub mod fetch;
pub mod parser;
pub mod registry;
pub mod scheduler;
pub mod store;
pub mod updater;
pub mod validator;

/// Reserved ID of the pseudo-filter assembled from user rules.
pub const USER_RULES_FILTER_ID: i64 = 0;

/// Which of the two sequences a filter lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Blocklist,
    Allowlist,
}

impl std::fmt::Display for FilterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterKind::Blocklist => f.write_str("blocklist"),
            FilterKind::Allowlist => f.write_str("allowlist"),
        }
    }
}

/// One filter list subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub id: i64,
    /// Remote URL or absolute path of a local file.
    pub url: String,
    pub name: String,
    pub enabled: bool,
    pub kind: FilterKind,

    // Derived from the stored content; never authored.
    pub rules_count: u64,
    pub checksum: u32,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Filter {
    pub fn new(kind: FilterKind, url: impl Into<String>, name: impl Into<String>, enabled: bool) -> Self {
        Self {
            id: 0,
            url: url.into(),
            name: name.into(),
            enabled,
            kind,
            rules_count: 0,
            checksum: 0,
            last_updated: None,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    /// Forget cached rules metadata. The stored file is left alone.
    pub fn unload(&mut self) {
        self.rules_count = 0;
        self.checksum = 0;
    }

    /// Forget everything derived from the content, forcing a re-fetch.
    pub fn invalidate(&mut self) {
        self.unload();
        self.last_updated = None;
    }

    pub fn is_local(&self) -> bool {
        std::path::Path::new(&self.url).is_absolute()
    }
}

/// Lists shipped with a fresh install.
pub fn default_filters() -> Vec<Filter> {
    vec![
        Filter::new(
            FilterKind::Blocklist,
            "https://adguardteam.github.io/AdGuardSDNSFilter/Filters/filter.txt",
            "AdGuard DNS filter",
            true,
        )
        .with_id(1),
        Filter::new(
            FilterKind::Blocklist,
            "https://adaway.org/hosts.txt",
            "AdAway Default Blocklist",
            false,
        )
        .with_id(2),
    ]
}
