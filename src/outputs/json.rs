//! JSON snapshot of the dashboard.
//!
//! # Output Structure
//!
//! ```text
//! {
//!   "generated_at": "2024-05-06T08:00:00+00:00",
//!   "summary": "...",
//!   "badges":  { "Good News": "news-cat-goodnews", ... },
//!   "monthly": [ ... ],
//!   "yearly":  [ ... ],
//!   "news":    [ ... ],
//!   "digest":  [ ... ],
//!   "favorites": [ ... ]
//! }
//! ```
//!
//! Each tab is capped at the dashboard's row limit.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, instrument};

use crate::config::Category;
use crate::dashboard::{Dashboard, Entry, Tab};
use crate::error::PersistenceError;
use crate::models::Timestamp;
use crate::store::write_json_atomic;

#[derive(Debug, Serialize)]
pub struct Snapshot<'a> {
    pub generated_at: Timestamp,
    pub summary: String,
    /// Style tag per news category, for renderers.
    pub badges: BTreeMap<&'a str, &'a str>,
    pub monthly: &'a [Entry],
    pub yearly: &'a [Entry],
    pub news: &'a [Entry],
    pub digest: &'a [Entry],
    pub favorites: &'a [Entry],
}

impl<'a> Snapshot<'a> {
    pub fn new(
        dash: &'a Dashboard,
        categories: &'a [Category],
        generated_at: Timestamp,
    ) -> Self {
        Self {
            generated_at,
            summary: dash.summary(),
            badges: categories
                .iter()
                .map(|c| (c.name.as_str(), c.badge_class.as_str()))
                .collect(),
            monthly: dash.shown(Tab::Monthly),
            yearly: dash.shown(Tab::Yearly),
            news: dash.shown(Tab::News),
            digest: dash.shown(Tab::Digest),
            favorites: dash.shown(Tab::Favorites),
        }
    }
}

/// Write the snapshot to `path`, replacing any previous one.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub fn write_snapshot(
    dash: &Dashboard,
    categories: &[Category],
    path: &Path,
) -> Result<(), PersistenceError> {
    let snapshot = Snapshot::new(dash, categories, Timestamp::now());
    write_json_atomic(path, &snapshot)?;
    info!("Wrote dashboard snapshot");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CanonicalRecord, SourceKind};
    use serde_json::Value;

    fn entry(id: &str) -> Entry {
        Entry {
            record: CanonicalRecord {
                id: id.into(),
                source: SourceKind::News,
                category: Some("Good News".into()),
                title: format!("t{id}"),
                author: "Unknown".into(),
                url: format!("https://news.test/{id}"),
                body_preview: String::new(),
                published_at: Timestamp::Raw("x".into()),
                engagement_score: 0,
                comment_count: 0,
                scraped_at: None,
                origin: "news/rss.xml".into(),
                time_window: None,
            },
            read_key: format!("dsr_{id}"),
            is_read: false,
            is_favorite: false,
        }
    }

    #[test]
    fn tabs_are_capped_and_flattened() {
        let dash = Dashboard {
            news: (0..5).map(|i| entry(&i.to_string())).collect(),
            row_limit: 3,
            ..Dashboard::default()
        };
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("snapshot.json");
        let categories = crate::config::NewsSettings::default().categories;
        write_snapshot(&dash, &categories, &path).unwrap();

        let v: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["news"].as_array().unwrap().len(), 3);
        assert_eq!(v["monthly"].as_array().unwrap().len(), 0);
        assert_eq!(v["favorites"].as_array().unwrap().len(), 0);
        assert_eq!(v["news"][0]["read_key"], "dsr_0");
        assert_eq!(v["news"][0]["source"], "news");
        assert_eq!(v["news"][0]["title"], "t0");
        assert!(v["generated_at"].is_string());
        assert_eq!(v["badges"]["Good News"], "news-cat-goodnews");
    }
}
