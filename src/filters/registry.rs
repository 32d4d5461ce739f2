//! The set of configured filters.
//!
//! Both sequences, the user rules and the ID counter sit behind one
//! `RwLock`. Callers only ever get copies out; nothing hands out references
//! into the live state.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use tokio::io::BufReader;
use tokio::sync::RwLock;
use tracing::{debug, error, info, trace, warn};

use super::engine::{EngineFilter, FilterSet};
use super::parser::parse_filter;
use super::store::ContentStore;
use super::updater::{FilterUpdate, UpdateOutcome};
use super::{Filter, FilterKind};
use crate::error::{FilterError, FilterResult};

/// Result flags of [`FilterRegistry::set_properties`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropertiesStatus {
    pub found: bool,
    pub enabled_changed: bool,
    pub url_changed: bool,
    pub url_exists: bool,
    pub update_required: bool,
}

/// User-editable properties of a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterProps {
    pub url: String,
    pub name: String,
    pub enabled: bool,
}

/// The part of a filter the update pipeline works on outside the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSnapshot {
    pub id: i64,
    pub url: String,
    pub name: String,
    pub checksum: u32,
    pub kind: FilterKind,
}

impl From<&Filter> for FilterSnapshot {
    fn from(f: &Filter) -> Self {
        Self {
            id: f.id,
            url: f.url.clone(),
            name: f.name.clone(),
            checksum: f.checksum,
            kind: f.kind,
        }
    }
}

#[derive(Debug)]
struct RegistryState {
    blocklists: Vec<Filter>,
    allowlists: Vec<Filter>,
    user_rules: Vec<String>,
    /// Always greater than every ID seen so far.
    next_id: i64,
}

impl RegistryState {
    fn list(&self, kind: FilterKind) -> &Vec<Filter> {
        match kind {
            FilterKind::Blocklist => &self.blocklists,
            FilterKind::Allowlist => &self.allowlists,
        }
    }

    fn list_mut(&mut self, kind: FilterKind) -> &mut Vec<Filter> {
        match kind {
            FilterKind::Blocklist => &mut self.blocklists,
            FilterKind::Allowlist => &mut self.allowlists,
        }
    }

    fn exists(&self, url: &str) -> bool {
        self.blocklists.iter().chain(&self.allowlists).any(|f| f.url == url)
    }

    fn id_taken(&self, id: i64) -> bool {
        self.blocklists.iter().chain(&self.allowlists).any(|f| f.id == id)
    }

    fn observe(&mut self, id: i64) {
        if id >= self.next_id {
            self.next_id = id + 1;
        }
    }

    fn assign_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Keep only the first blocklist entry for each URL.
    fn deduplicate(&mut self) -> usize {
        let before = self.blocklists.len();
        let mut seen = HashSet::new();
        self.blocklists.retain(|f| seen.insert(f.url.clone()));
        before - self.blocklists.len()
    }
}

pub struct FilterRegistry {
    state: RwLock<RegistryState>,
    store: ContentStore,
}

impl FilterRegistry {
    /// Empty registry whose ID counter is seeded from the wall clock, so IDs
    /// handed out by different runs do not collide.
    pub fn new(store: ContentStore) -> Self {
        Self::with_seed(store, Utc::now().timestamp())
    }

    pub fn with_seed(store: ContentStore, seed: i64) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                blocklists: Vec::new(),
                allowlists: Vec::new(),
                user_rules: Vec::new(),
                next_id: seed + 1,
            }),
            store,
        }
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    /// Install the configured filters.
    ///
    /// Zero IDs get fresh ones, enabled filters have their cached metadata
    /// loaded from disk and duplicate blocklist URLs are dropped.
    pub async fn bootstrap(&self, filters: Vec<Filter>, user_rules: Vec<String>) -> FilterResult<()> {
        self.store.ensure_dir().await?;

        let mut state = self.state.write().await;
        for f in &filters {
            state.observe(f.id);
        }

        for mut filter in filters {
            if filter.id == 0 {
                filter.id = state.assign_id();
            } else if state.id_taken(filter.id) {
                let id = state.assign_id();
                warn!("Filter ID {} is used twice, {} gets ID {}", filter.id, filter.url, id);
                filter.id = id;
            }
            if filter.enabled {
                if let Err(e) = load(&self.store, &mut filter).await {
                    error!("Couldn't load filter {} contents due to {}", filter.id, e);
                }
            }
            state.list_mut(filter.kind).push(filter);
        }

        let removed = state.deduplicate();
        if removed > 0 {
            info!("Removed {} duplicate blocklist entries", removed);
        }
        state.user_rules = user_rules;

        info!(
            "Filter registry loaded: {} blocklists, {} allowlists, {} user rules",
            state.blocklists.len(),
            state.allowlists.len(),
            state.user_rules.len(),
        );
        Ok(())
    }

    /// Append a filter to the sequence matching its kind. A zero ID, or one
    /// already held by another filter, is replaced with a fresh one. Returns
    /// the filter's ID.
    pub async fn add(&self, mut filter: Filter) -> FilterResult<i64> {
        let mut state = self.state.write().await;

        if state.exists(&filter.url) {
            return Err(FilterError::DuplicateUrl(filter.url));
        }

        if filter.id == 0 || state.id_taken(filter.id) {
            filter.id = state.assign_id();
        } else {
            state.observe(filter.id);
        }

        let id = filter.id;
        debug!("Adding {} #{}: {}", filter.kind, id, filter.url);
        state.list_mut(filter.kind).push(filter);
        Ok(id)
    }

    pub async fn exists(&self, url: &str) -> bool {
        self.state.read().await.exists(url)
    }

    /// Copy of the filter with this URL, from either sequence.
    pub async fn find(&self, url: &str) -> Option<Filter> {
        let state = self.state.read().await;
        state
            .blocklists
            .iter()
            .chain(&state.allowlists)
            .find(|f| f.url == url)
            .cloned()
    }

    pub async fn filters(&self, kind: FilterKind) -> Vec<Filter> {
        self.state.read().await.list(kind).clone()
    }

    pub async fn remove(&self, url: &str, kind: FilterKind) -> Option<Filter> {
        let mut state = self.state.write().await;
        let list = state.list_mut(kind);
        let pos = list.iter().position(|f| f.url == url)?;
        Some(list.remove(pos))
    }

    pub async fn user_rules(&self) -> Vec<String> {
        self.state.read().await.user_rules.clone()
    }

    pub async fn set_user_rules(&self, rules: Vec<String>) {
        self.state.write().await.user_rules = rules;
    }

    /// Update name, URL and enabled state of the filter at `url`.
    ///
    /// A URL change drops all cached metadata so the next refresh re-fetches.
    /// Enabling reloads metadata from the stored file right away; if that
    /// fails the filter is flagged as needing an update.
    pub async fn set_properties(
        &self,
        url: &str,
        props: FilterProps,
        kind: FilterKind,
    ) -> FilterResult<PropertiesStatus> {
        let mut state = self.state.write().await;

        let idx = state
            .list(kind)
            .iter()
            .position(|f| f.url == url)
            .ok_or_else(|| FilterError::NotFound(url.to_string()))?;

        let mut status = PropertiesStatus {
            found: true,
            ..Default::default()
        };

        let url_changing = props.url != url;
        if url_changing && state.exists(&props.url) {
            status.url_exists = true;
            return Ok(status);
        }

        let filt = &mut state.list_mut(kind)[idx];
        debug!(
            "filter: set properties: {}: {{{} {} {}}}",
            filt.url, props.name, props.url, props.enabled
        );
        filt.name = props.name;

        if url_changing {
            status.url_changed = true;
            status.update_required = true;
            filt.url = props.url;
            filt.invalidate();
        }

        if filt.enabled != props.enabled {
            status.enabled_changed = true;
            filt.enabled = props.enabled;

            if filt.enabled {
                if !status.url_changed {
                    if let Err(e) = load(&self.store, filt).await {
                        // The file may have been removed from disk; not fatal.
                        debug!("Failed to load filter {}: {}", filt.id, e);
                        filt.invalidate();
                        status.update_required = true;
                    }
                }
            } else {
                filt.unload();
            }
        }

        Ok(status)
    }

    /// Drop repeated blocklist URLs, keeping the first occurrence of each.
    pub async fn deduplicate(&self) -> usize {
        self.state.write().await.deduplicate()
    }

    /// Hand out the next unique filter ID.
    pub async fn assign_id(&self) -> i64 {
        self.state.write().await.assign_id()
    }

    /// Snapshots of the enabled filters of `kind` that are stale at `now`, or
    /// all enabled ones when `force` is set.
    pub async fn due(
        &self,
        kind: FilterKind,
        force: bool,
        interval: Duration,
        now: DateTime<Utc>,
    ) -> Vec<FilterSnapshot> {
        let state = self.state.read().await;
        state
            .list(kind)
            .iter()
            .filter(|f| f.enabled)
            .filter(|f| {
                force
                    || f
                        .last_updated
                        .map_or(true, |last| now >= last + interval)
            })
            .map(FilterSnapshot::from)
            .collect()
    }

    /// Write pipeline results back. Entries whose ID and URL no longer match
    /// anything (deleted or re-pointed meanwhile) are skipped. Returns the
    /// number of filters whose content changed.
    pub async fn merge(&self, updates: &[FilterUpdate]) -> usize {
        let mut state = self.state.write().await;
        let mut changed = 0;

        for update in updates {
            let snap = &update.snapshot;
            let Some(f) = state
                .list_mut(snap.kind)
                .iter_mut()
                .find(|f| f.id == snap.id && f.url == snap.url)
            else {
                trace!("filter #{} ({}) is gone, skipping merge", snap.id, snap.url);
                continue;
            };

            f.last_updated = Some(update.checked_at);
            match &update.outcome {
                UpdateOutcome::Changed(parsed) => {
                    info!(
                        "Updated filter #{}.  Rules: {} -> {}",
                        f.id, f.rules_count, parsed.rules_count
                    );
                    if f.name.is_empty() {
                        if let Some(title) = &parsed.title {
                            f.name = title.clone();
                        }
                    }
                    f.rules_count = parsed.rules_count;
                    f.checksum = parsed.checksum;
                    changed += 1;
                }
                UpdateOutcome::Unchanged => {}
                UpdateOutcome::Failed(_) => f.unload(),
            }
        }

        changed
    }

    /// What the rule engine should run with right now.
    pub async fn enabled_set(&self) -> FilterSet {
        let state = self.state.read().await;

        let files = |list: &[Filter]| -> Vec<EngineFilter> {
            list.iter()
                .filter(|f| f.enabled)
                .map(|f| EngineFilter::file(f.id, self.store.path(f.id)))
                .collect()
        };

        FilterSet {
            user_rules: EngineFilter::user_rules(&state.user_rules),
            blocklists: files(&state.blocklists[..]),
            allowlists: files(&state.allowlists[..]),
        }
    }
}

/// Refresh a filter's cached metadata from its stored file. A missing file
/// leaves the filter untouched.
async fn load(store: &ContentStore, filter: &mut Filter) -> FilterResult<()> {
    trace!(
        "filtering: loading filter {} contents from: {}",
        filter.id,
        store.path(filter.id).display()
    );

    let Some(file) = store.open(filter.id).await? else {
        return Ok(());
    };
    let meta = file.metadata().await?;
    let modified = meta.modified()?;
    trace!("filtering: id {}, length {}", filter.id, meta.len());

    let parsed = parse_filter(&mut BufReader::new(file)).await?;

    filter.rules_count = parsed.rules_count;
    filter.checksum = parsed.checksum;
    filter.last_updated = Some(DateTime::<Utc>::from(modified));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::parser::ParsedFilter;
    use tempfile::TempDir;

    const SEED: i64 = 1_000;

    fn registry() -> (TempDir, FilterRegistry) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let registry = FilterRegistry::with_seed(ContentStore::new(dir.path()), SEED);
        (dir, registry)
    }

    fn block(url: &str) -> Filter {
        Filter::new(FilterKind::Blocklist, url, "", true)
    }

    fn allow(url: &str) -> Filter {
        Filter::new(FilterKind::Allowlist, url, "", true)
    }

    fn props(url: &str, name: &str, enabled: bool) -> FilterProps {
        FilterProps {
            url: url.to_string(),
            name: name.to_string(),
            enabled,
        }
    }

    #[tokio::test]
    async fn test_add_rejects_duplicate_url_across_sequences() {
        let (_dir, reg) = registry();
        reg.add(block("https://a.example/list.txt")).await.unwrap();

        let err = reg.add(allow("https://a.example/list.txt")).await.unwrap_err();
        assert!(matches!(err, FilterError::DuplicateUrl(_)));
        let err = reg.add(block("https://a.example/list.txt")).await.unwrap_err();
        assert!(matches!(err, FilterError::DuplicateUrl(_)));

        assert_eq!(reg.filters(FilterKind::Blocklist).await.len(), 1);
        assert!(reg.filters(FilterKind::Allowlist).await.is_empty());
    }

    #[tokio::test]
    async fn test_add_routes_by_kind_and_assigns_ids() {
        let (_dir, reg) = registry();
        let a = reg.add(block("https://a.example/")).await.unwrap();
        let b = reg.add(allow("https://b.example/")).await.unwrap();
        assert!(a > SEED);
        assert!(b > a);
        assert_eq!(reg.filters(FilterKind::Allowlist).await[0].id, b);
        assert!(reg.exists("https://b.example/").await);
        assert_eq!(reg.find("https://a.example/").await.unwrap().id, a);
    }

    #[tokio::test]
    async fn test_add_replaces_taken_id() {
        let (_dir, reg) = registry();
        let a = reg.add(block("https://a.example/").with_id(5)).await.unwrap();
        let b = reg.add(allow("https://b.example/").with_id(5)).await.unwrap();

        assert_eq!(a, 5);
        assert_ne!(b, 5);
        assert!(b > SEED);
        assert_eq!(reg.find("https://b.example/").await.unwrap().id, b);
    }

    #[tokio::test]
    async fn test_bootstrap_replaces_repeated_ids() {
        let (_dir, reg) = registry();
        let filters = vec![
            block("u1").with_id(7),
            block("u2").with_id(7),
            allow("u3").with_id(7),
        ];
        reg.bootstrap(filters, vec![]).await.unwrap();

        let mut ids: Vec<i64> = reg
            .filters(FilterKind::Blocklist)
            .await
            .iter()
            .chain(reg.filters(FilterKind::Allowlist).await.iter())
            .map(|f| f.id)
            .collect();
        assert_eq!(reg.find("u1").await.unwrap().id, 7);
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn test_deduplicate_keeps_first_in_order() {
        let (_dir, reg) = registry();
        {
            let mut state = reg.state.write().await;
            for (id, url) in [(1, "u1"), (2, "u2"), (3, "u1"), (4, "u3"), (5, "u2")] {
                state.blocklists.push(block(url).with_id(id));
            }
        }

        assert_eq!(reg.deduplicate().await, 2);

        let ids: Vec<i64> = reg.filters(FilterKind::Blocklist).await.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![1, 2, 4]);
    }

    #[tokio::test]
    async fn test_bootstrap_ids_exceed_seed_and_existing() {
        let (_dir, reg) = registry();
        let filters = vec![
            block("u1"),
            block("u2").with_id(SEED + 5),
            allow("u3"),
            block("u4").with_id(3),
        ];
        reg.bootstrap(filters, vec![]).await.unwrap();

        let mut ids: Vec<i64> = reg
            .filters(FilterKind::Blocklist)
            .await
            .iter()
            .chain(reg.filters(FilterKind::Allowlist).await.iter())
            .map(|f| f.id)
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![3, SEED + 5, SEED + 6, SEED + 7]);
        assert!(reg.assign_id().await > SEED + 7);
    }

    #[tokio::test]
    async fn test_bootstrap_loads_enabled_from_disk_and_dedupes() {
        let (_dir, reg) = registry();
        reg.store().ensure_dir().await.unwrap();
        let content = "! Title: On Disk\n||a.example^\n||b.example^\n";
        std::fs::write(reg.store().path(7), content).unwrap();
        std::fs::write(reg.store().path(8), content).unwrap();

        reg.bootstrap(
            vec![
                block("u1").with_id(7),
                Filter::new(FilterKind::Blocklist, "u2", "", false).with_id(8),
                block("u1").with_id(9),
            ],
            vec!["||user.example^".to_string()],
        )
        .await
        .unwrap();

        let list = reg.filters(FilterKind::Blocklist).await;
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].rules_count, 2);
        assert_eq!(list[0].checksum, crc32fast::hash(content.as_bytes()));
        assert!(list[0].last_updated.is_some());
        // Disabled filters are not loaded, and the title is not applied on load.
        assert_eq!(list[1].rules_count, 0);
        assert_eq!(list[0].name, "");
        assert_eq!(reg.user_rules().await, vec!["||user.example^".to_string()]);
    }

    #[tokio::test]
    async fn test_set_properties_unknown_url() {
        let (_dir, reg) = registry();
        let err = reg
            .set_properties("nope", props("nope", "", true), FilterKind::Blocklist)
            .await
            .unwrap_err();
        assert!(matches!(err, FilterError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_set_properties_url_change_clears_cache() {
        let (_dir, reg) = registry();
        reg.add(block("old")).await.unwrap();
        {
            let mut state = reg.state.write().await;
            let f = &mut state.blocklists[0];
            f.rules_count = 10;
            f.checksum = 42;
            f.last_updated = Some(Utc::now());
        }

        let status = reg
            .set_properties("old", props("new", "Renamed", true), FilterKind::Blocklist)
            .await
            .unwrap();
        assert!(status.found && status.url_changed && status.update_required);
        assert!(!status.enabled_changed);

        let f = reg.find("new").await.unwrap();
        assert_eq!(f.name, "Renamed");
        assert_eq!((f.rules_count, f.checksum, f.last_updated), (0, 0, None));
        assert!(reg.find("old").await.is_none());
    }

    #[tokio::test]
    async fn test_set_properties_url_collision_is_rejected() {
        let (_dir, reg) = registry();
        reg.add(block("a")).await.unwrap();
        reg.add(allow("b")).await.unwrap();

        let status = reg
            .set_properties("a", props("b", "Changed", true), FilterKind::Blocklist)
            .await
            .unwrap();
        assert!(status.url_exists);
        assert!(!status.url_changed);

        let f = reg.find("a").await.unwrap();
        assert_eq!(f.name, "");
    }

    #[tokio::test]
    async fn test_set_properties_looks_in_designated_sequence() {
        let (_dir, reg) = registry();
        reg.add(allow("a")).await.unwrap();
        let err = reg
            .set_properties("a", props("a", "", false), FilterKind::Blocklist)
            .await
            .unwrap_err();
        assert!(matches!(err, FilterError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_set_properties_enable_loads_from_disk() {
        let (_dir, reg) = registry();
        reg.store().ensure_dir().await.unwrap();
        let id = reg
            .add(Filter::new(FilterKind::Blocklist, "a", "", false))
            .await
            .unwrap();
        std::fs::write(reg.store().path(id), "r1\nr2\nr3\n").unwrap();

        let status = reg
            .set_properties("a", props("a", "", true), FilterKind::Blocklist)
            .await
            .unwrap();
        assert!(status.enabled_changed);
        assert!(!status.update_required);
        assert_eq!(reg.find("a").await.unwrap().rules_count, 3);

        let status = reg
            .set_properties("a", props("a", "", false), FilterKind::Blocklist)
            .await
            .unwrap();
        assert!(status.enabled_changed);
        let f = reg.find("a").await.unwrap();
        assert_eq!((f.rules_count, f.checksum), (0, 0));
        // Disabling never touches the stored file.
        assert!(reg.store().path(id).exists());
    }

    #[tokio::test]
    async fn test_set_properties_enable_with_unreadable_file() {
        let (_dir, reg) = registry();
        reg.store().ensure_dir().await.unwrap();
        let id = reg
            .add(Filter::new(FilterKind::Blocklist, "a", "", false))
            .await
            .unwrap();
        // A directory in place of the list makes the read fail.
        std::fs::create_dir(reg.store().path(id)).unwrap();

        let status = reg
            .set_properties("a", props("a", "", true), FilterKind::Blocklist)
            .await
            .unwrap();
        assert!(status.enabled_changed && status.update_required);
        assert_eq!(reg.find("a").await.unwrap().last_updated, None);
    }

    #[tokio::test]
    async fn test_due_selection() {
        let (_dir, reg) = registry();
        let now = Utc::now();
        let hour = Duration::hours(1);
        {
            let mut state = reg.state.write().await;
            let mut fresh = block("fresh").with_id(1);
            fresh.last_updated = Some(now - Duration::minutes(10));
            let mut stale = block("stale").with_id(2);
            stale.last_updated = Some(now - Duration::hours(2));
            let never = block("never").with_id(3);
            let off = Filter::new(FilterKind::Blocklist, "off", "", false).with_id(4);
            state.blocklists.extend([fresh, stale, never, off]);
        }

        let urls = |v: Vec<FilterSnapshot>| v.into_iter().map(|s| s.url).collect::<Vec<_>>();
        assert_eq!(
            urls(reg.due(FilterKind::Blocklist, false, hour, now).await),
            vec!["stale", "never"]
        );
        assert_eq!(
            urls(reg.due(FilterKind::Blocklist, true, hour, now).await),
            vec!["fresh", "stale", "never"]
        );
        assert!(reg.due(FilterKind::Allowlist, true, hour, now).await.is_empty());
    }

    #[tokio::test]
    async fn test_merge_applies_outcomes() {
        let (_dir, reg) = registry();
        let named = reg.add(Filter::new(FilterKind::Blocklist, "named", "Mine", true)).await.unwrap();
        let unnamed = reg.add(block("unnamed")).await.unwrap();
        let failing = reg.add(block("failing")).await.unwrap();
        {
            let mut state = reg.state.write().await;
            state.blocklists[2].rules_count = 5;
            state.blocklists[2].checksum = 9;
        }

        let snap = |url: &str, id: i64| FilterSnapshot {
            id,
            url: url.to_string(),
            name: String::new(),
            checksum: 0,
            kind: FilterKind::Blocklist,
        };
        let parsed = ParsedFilter {
            rules_count: 2,
            checksum: 77,
            title: Some("Declared".to_string()),
            bytes: 10,
        };
        let at = Utc::now();
        let updates = vec![
            FilterUpdate { snapshot: snap("named", named), checked_at: at, outcome: UpdateOutcome::Changed(parsed.clone()) },
            FilterUpdate { snapshot: snap("unnamed", unnamed), checked_at: at, outcome: UpdateOutcome::Changed(parsed) },
            FilterUpdate { snapshot: snap("failing", failing), checked_at: at, outcome: UpdateOutcome::Failed(FilterError::HttpStatus(500)) },
            FilterUpdate { snapshot: snap("gone", 12345), checked_at: at, outcome: UpdateOutcome::Unchanged },
        ];

        assert_eq!(reg.merge(&updates).await, 2);

        let list = reg.filters(FilterKind::Blocklist).await;
        assert_eq!(list[0].name, "Mine");
        assert_eq!(list[1].name, "Declared");
        assert_eq!((list[1].rules_count, list[1].checksum), (2, 77));
        assert_eq!((list[2].rules_count, list[2].checksum), (0, 0));
        assert!(list.iter().all(|f| f.last_updated == Some(at)));
    }

    #[tokio::test]
    async fn test_merge_skips_repointed_filter() {
        let (_dir, reg) = registry();
        let id = reg.add(block("before")).await.unwrap();
        let snapshot = reg.due(FilterKind::Blocklist, true, Duration::hours(1), Utc::now()).await.remove(0);

        reg.set_properties("before", props("after", "", true), FilterKind::Blocklist)
            .await
            .unwrap();

        let update = FilterUpdate {
            snapshot,
            checked_at: Utc::now(),
            outcome: UpdateOutcome::Unchanged,
        };
        assert_eq!(reg.merge(&[update]).await, 0);
        let f = reg.find("after").await.unwrap();
        assert_eq!((f.id, f.last_updated), (id, None));
    }

    #[tokio::test]
    async fn test_merge_skips_removed_filter() {
        let (_dir, reg) = registry();
        reg.add(block("kept")).await.unwrap();
        reg.add(allow("dropped")).await.unwrap();
        let mut snapshots = reg.due(FilterKind::Blocklist, true, Duration::hours(1), Utc::now()).await;
        snapshots.extend(reg.due(FilterKind::Allowlist, true, Duration::hours(1), Utc::now()).await);

        // Removal looks only in the named sequence.
        assert!(reg.remove("dropped", FilterKind::Blocklist).await.is_none());
        let removed = reg.remove("dropped", FilterKind::Allowlist).await.unwrap();
        assert_eq!(removed.url, "dropped");
        assert!(!reg.exists("dropped").await);

        let parsed = ParsedFilter {
            rules_count: 1,
            checksum: 3,
            title: None,
            bytes: 4,
        };
        let at = Utc::now();
        let updates: Vec<FilterUpdate> = snapshots
            .into_iter()
            .map(|snapshot| FilterUpdate {
                snapshot,
                checked_at: at,
                outcome: UpdateOutcome::Changed(parsed.clone()),
            })
            .collect();

        assert_eq!(reg.merge(&updates).await, 1);
        assert!(reg.filters(FilterKind::Allowlist).await.is_empty());
        assert_eq!(reg.find("kept").await.unwrap().rules_count, 1);
    }

    #[tokio::test]
    async fn test_enabled_set() {
        let (_dir, reg) = registry();
        reg.set_user_rules(vec!["||a^".to_string(), "||b^".to_string()]).await;
        let b = reg.add(block("b")).await.unwrap();
        reg.add(Filter::new(FilterKind::Blocklist, "off", "", false)).await.unwrap();
        let w = reg.add(allow("w")).await.unwrap();

        let set = reg.enabled_set().await;
        assert_eq!(set.user_rules, EngineFilter::user_rules(&["||a^".to_string(), "||b^".to_string()]));
        assert_eq!(set.blocklists, vec![EngineFilter::file(b, reg.store().path(b))]);
        assert_eq!(set.allowlists, vec![EngineFilter::file(w, reg.store().path(w))]);
    }
}
