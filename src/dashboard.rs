//! Read-only view over every persisted collection.
//!
//! A [`Session`] holds the read-set and favourites for one sitting; they are
//! loaded once when the session opens and mutated only through it.
//! [`load_all`] reads the collections, [`build`] sorts them into tabs
//! according to a [`View`], and [`render_text`] prints the listing with the
//! keys a user passes back to `read mark` or `fav add`.
//!
//! Favourites are pulled out of the main tabs into a tab of their own,
//! where they stay visible whether read or not.

use clap::ValueEnum;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::cmp::{Ordering, Reverse};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{info, instrument, warn};

use crate::error::PersistenceError;
use crate::models::{
    CanonicalRecord, DigestRecord, NewsRecord, PostRecord, SourceKind, TimeWindow,
};
use crate::read_tracker::{Favorites, ReadTracker};
use crate::store::{Store, load_collection};
use crate::utils::truncate_for_log;

/// Rows shown per tab unless configured otherwise.
pub const DEFAULT_ROW_LIMIT: usize = 50;

/// Read state and favourites for one sitting.
#[derive(Debug)]
pub struct Session {
    pub read: ReadTracker,
    pub favorites: Favorites,
}

impl Session {
    #[instrument(level = "info", skip_all, fields(root = %store.root().display()))]
    pub fn open(store: &Store) -> Result<Self, PersistenceError> {
        let session = Self {
            read: ReadTracker::load(&store.read_set_path())?,
            favorites: Favorites::load(&store.favorites_path())?,
        };
        info!(read = session.read.len(), "Session opened");
        Ok(session)
    }
}

/// Dashboard tabs, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    Monthly,
    Yearly,
    News,
    Digest,
    Favorites,
}

impl Tab {
    pub const ALL: [Tab; 5] = [Tab::Monthly, Tab::Yearly, Tab::News, Tab::Digest, Tab::Favorites];
    /// Tabs fed straight from the collections.
    pub const MAIN: [Tab; 4] = [Tab::Monthly, Tab::Yearly, Tab::News, Tab::Digest];

    pub fn title(self) -> &'static str {
        match self {
            Tab::Monthly => "Top of the Month",
            Tab::Yearly => "Top of the Year",
            Tab::News => "News",
            Tab::Digest => "Reading List",
            Tab::Favorites => "Favorites",
        }
    }
}

/// Order of the social tabs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum SocialSort {
    #[default]
    Score,
    Comments,
}

/// Order of the news and reading-list tabs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum DateOrder {
    #[default]
    Newest,
    Oldest,
}

/// What to show and how.
#[derive(Debug, Clone)]
pub struct View {
    pub show_read: bool,
    /// Social tabs only show this community (case-insensitive).
    pub source: Option<String>,
    /// News tab only shows this category (case-insensitive).
    pub category: Option<String>,
    pub sort: SocialSort,
    pub order: DateOrder,
    pub row_limit: usize,
}

impl Default for View {
    fn default() -> Self {
        Self {
            show_read: false,
            source: None,
            category: None,
            sort: SocialSort::default(),
            order: DateOrder::default(),
            row_limit: DEFAULT_ROW_LIMIT,
        }
    }
}

/// Every collection as canonical records, plus what could not be read.
#[derive(Debug, Default)]
pub struct Collections {
    pub monthly: Vec<CanonicalRecord>,
    pub yearly: Vec<CanonicalRecord>,
    pub news: Vec<CanonicalRecord>,
    pub digest: Vec<CanonicalRecord>,
    pub warnings: Vec<String>,
}

fn load_into<T>(path: &Path, out: &mut Vec<CanonicalRecord>, warnings: &mut Vec<String>)
where
    T: DeserializeOwned + Into<CanonicalRecord>,
{
    match load_collection::<T>(path) {
        Ok(rows) => out.extend(rows.into_iter().map(Into::into)),
        Err(e) => {
            warn!(error = %e, "Skipping unreadable collection");
            warnings.push(e.to_string());
        }
    }
}

/// Load every collection under the store root. Never fails: a missing
/// file is empty and an unreadable one becomes a warning.
#[instrument(level = "info", skip_all, fields(root = %store.root().display()))]
pub fn load_all(store: &Store) -> Collections {
    let mut c = Collections::default();
    match store.social_partitions() {
        Ok(parts) => {
            for part in parts {
                let target = match part.window {
                    TimeWindow::Month => &mut c.monthly,
                    TimeWindow::Year => &mut c.yearly,
                };
                load_into::<PostRecord>(&part.path, target, &mut c.warnings);
            }
        }
        Err(e) => {
            warn!(error = %e, "Could not list social collections");
            c.warnings.push(e.to_string());
        }
    }
    load_into::<NewsRecord>(&store.news_path(), &mut c.news, &mut c.warnings);
    load_into::<DigestRecord>(&store.digest_path(), &mut c.digest, &mut c.warnings);
    info!(
        monthly = c.monthly.len(),
        yearly = c.yearly.len(),
        news = c.news.len(),
        digest = c.digest.len(),
        warnings = c.warnings.len(),
        "Loaded collections"
    );
    c
}

/// One displayed record with its session state.
#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    #[serde(flatten)]
    pub record: CanonicalRecord,
    pub read_key: String,
    pub is_read: bool,
    pub is_favorite: bool,
}

#[derive(Debug)]
pub struct Dashboard {
    pub monthly: Vec<Entry>,
    pub yearly: Vec<Entry>,
    pub news: Vec<Entry>,
    pub digest: Vec<Entry>,
    pub favorites: Vec<Entry>,
    /// Read records left out because `show_read` was off.
    pub hidden_read: usize,
    /// Every record loaded, before any filtering.
    pub total: usize,
    /// Rows per tab in every rendering.
    pub row_limit: usize,
    pub warnings: Vec<String>,
}

impl Default for Dashboard {
    fn default() -> Self {
        Self {
            monthly: Vec::new(),
            yearly: Vec::new(),
            news: Vec::new(),
            digest: Vec::new(),
            favorites: Vec::new(),
            hidden_read: 0,
            total: 0,
            row_limit: DEFAULT_ROW_LIMIT,
            warnings: Vec::new(),
        }
    }
}

impl Dashboard {
    /// Every row of `tab`.
    pub fn tab(&self, tab: Tab) -> &[Entry] {
        match tab {
            Tab::Monthly => &self.monthly,
            Tab::Yearly => &self.yearly,
            Tab::News => &self.news,
            Tab::Digest => &self.digest,
            Tab::Favorites => &self.favorites,
        }
    }

    /// The rows of `tab` that get rendered.
    pub fn shown(&self, tab: Tab) -> &[Entry] {
        let rows = self.tab(tab);
        &rows[..rows.len().min(self.row_limit)]
    }

    /// Unread rows across the main tabs.
    pub fn unread_total(&self) -> usize {
        Tab::MAIN
            .iter()
            .flat_map(|t| self.tab(*t))
            .filter(|e| !e.is_read)
            .count()
    }

    /// One line with the per-tab counts, the unread total and the total.
    pub fn summary(&self) -> String {
        let tabs = Tab::ALL
            .iter()
            .map(|t| format!("{} {}", t.title(), self.tab(*t).len()))
            .collect::<Vec<_>>()
            .join(" | ");
        format!(
            "{tabs} | unread {} | hidden read {} | total {}",
            self.unread_total(),
            self.hidden_read,
            self.total
        )
    }
}

/// Routes records to a main tab, the favourites tab, or nowhere.
struct Router<'a> {
    session: &'a Session,
    show_read: bool,
    favorites: Vec<Entry>,
    favorite_keys: HashSet<String>,
    hidden_read: usize,
    total: usize,
}

impl Router<'_> {
    fn route(&mut self, records: Vec<CanonicalRecord>) -> Vec<Entry> {
        let mut main = Vec::new();
        for record in records {
            self.total += 1;
            let read_key = record.read_key();
            let entry = Entry {
                is_read: self.session.read.contains(&read_key),
                is_favorite: self.session.favorites.contains(&read_key),
                read_key,
                record,
            };
            if entry.is_favorite {
                // a post ranked in both windows is starred once
                if self.favorite_keys.insert(entry.read_key.clone()) {
                    self.favorites.push(entry);
                }
            } else if entry.is_read && !self.show_read {
                self.hidden_read += 1;
            } else {
                main.push(entry);
            }
        }
        main
    }
}

fn sort_social(entries: &mut [Entry], sort: SocialSort) {
    match sort {
        SocialSort::Score => entries.sort_by_key(|e| Reverse(e.record.engagement_score)),
        SocialSort::Comments => entries.sort_by_key(|e| Reverse(e.record.comment_count)),
    }
}

/// Unparseable dates sink to the bottom in stored order.
fn sort_dated(entries: &mut [Entry], order: DateOrder) {
    entries.sort_by(|a, b| {
        match (a.record.published_at.as_datetime(), b.record.published_at.as_datetime()) {
            (Some(x), Some(y)) => match order {
                DateOrder::Newest => y.cmp(&x),
                DateOrder::Oldest => x.cmp(&y),
            },
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
}

fn matches_filter(value: Option<&str>, wanted: Option<&str>) -> bool {
    match wanted {
        Some(w) => value.is_some_and(|v| v.eq_ignore_ascii_case(w)),
        None => true,
    }
}

/// Split records into tabs, filter and order them.
pub fn build(collections: Collections, session: &Session, view: &View) -> Dashboard {
    let mut router = Router {
        session,
        show_read: view.show_read,
        favorites: Vec::new(),
        favorite_keys: HashSet::new(),
        hidden_read: 0,
        total: 0,
    };
    let mut monthly = router.route(collections.monthly);
    let mut yearly = router.route(collections.yearly);
    let mut news = router.route(collections.news);
    let mut digest = router.route(collections.digest);

    for rows in [&mut monthly, &mut yearly] {
        rows.retain(|e| matches_filter(Some(e.record.origin.as_str()), view.source.as_deref()));
        sort_social(rows, view.sort);
    }
    news.retain(|e| matches_filter(e.record.category.as_deref(), view.category.as_deref()));
    sort_dated(&mut news, view.order);
    sort_dated(&mut digest, view.order);

    Dashboard {
        monthly,
        yearly,
        news,
        digest,
        favorites: router.favorites,
        hidden_read: router.hidden_read,
        total: router.total,
        row_limit: view.row_limit,
        warnings: collections.warnings,
    }
}

/// Short per-record detail, by source family.
pub fn detail(r: &CanonicalRecord) -> String {
    match r.source {
        SourceKind::Social => format!(
            "{} pts, {} comments, r/{}",
            r.engagement_score, r.comment_count, r.origin
        ),
        SourceKind::News => format!(
            "{}, {}",
            r.category.as_deref().unwrap_or_default(),
            r.published_at
        ),
        SourceKind::BlogDigest => r.author.clone(),
    }
}

/// Plain-text listing for the terminal.
pub fn render_text(dash: &Dashboard) -> String {
    let mut out = String::new();
    for warning in &dash.warnings {
        let _ = writeln!(out, "! {warning}");
    }
    for tab in Tab::ALL {
        let rows = dash.tab(tab);
        let shown = dash.shown(tab);
        let _ = writeln!(out, "\n== {} ({}) ==", tab.title(), rows.len());
        for e in shown {
            let marker = match (e.is_read, e.is_favorite) {
                (_, true) => '*',
                (true, false) => '.',
                (false, false) => ' ',
            };
            let r = &e.record;
            let _ = writeln!(
                out,
                "{marker} [{}] {} ({})\n    {}",
                e.read_key,
                truncate_for_log(&r.title, 120),
                detail(r),
                r.url
            );
        }
        if shown.len() < rows.len() {
            let _ = writeln!(out, "  ... showing {} of {}", shown.len(), rows.len());
        }
    }
    let _ = writeln!(out, "\n{}", dash.summary());
    out
}
