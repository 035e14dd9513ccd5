//! Persisted sets of item keys: what has been read, and what was starred.
//!
//! A key is the item id with its source prefix (see
//! [`SourceKind::read_key`](crate::models::SourceKind::read_key)). Social ids
//! stay bare; news and digest ids carry `dsr_` and `rth_`. Since social ids
//! are alphanumeric they can never collide with a prefixed key.
//!
//! Every mutation rewrites the whole file atomically as a sorted JSON array.
//! The file is read once per session; the in-memory set is authoritative
//! until the next load.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

use crate::error::PersistenceError;
use crate::store::{load_collection, write_json_atomic};

/// Window suffixes older versions appended to read-set entries.
const LEGACY_SUFFIXES: [&str; 2] = ["_month", "_year"];

/// Normalize one persisted read-set entry to its current form.
pub fn migrate_legacy_key(key: &str) -> &str {
    LEGACY_SUFFIXES
        .iter()
        .find_map(|suffix| key.strip_suffix(suffix))
        .filter(|bare| !bare.is_empty())
        .unwrap_or(key)
}

#[derive(Debug, Clone)]
struct KeyFile {
    path: PathBuf,
    keys: BTreeSet<String>,
}

impl KeyFile {
    fn load(path: &Path) -> Result<Self, PersistenceError> {
        let entries: Vec<String> = load_collection(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            keys: entries.into_iter().collect(),
        })
    }

    /// Write `next` and adopt it only once it is on disk, so a failed
    /// write leaves memory matching the file.
    fn commit(&mut self, next: BTreeSet<String>) -> Result<(), PersistenceError> {
        write_json_atomic(&self.path, &next)?;
        self.keys = next;
        debug!(path = %self.path.display(), count = self.keys.len(), "Persisted key set");
        Ok(())
    }

    fn insert(&mut self, key: &str) -> Result<bool, PersistenceError> {
        let mut next = self.keys.clone();
        let changed = next.insert(key.to_string());
        self.commit(next)?;
        Ok(changed)
    }

    fn remove(&mut self, key: &str) -> Result<bool, PersistenceError> {
        let mut next = self.keys.clone();
        let changed = next.remove(key);
        self.commit(next)?;
        Ok(changed)
    }

    fn clear(&mut self) -> Result<usize, PersistenceError> {
        let dropped = self.keys.len();
        self.commit(BTreeSet::new())?;
        Ok(dropped)
    }
}

/// The set of read items.
#[derive(Debug, Clone)]
pub struct ReadTracker {
    file: KeyFile,
}

impl ReadTracker {
    /// Load the read set, normalizing entries written in the legacy
    /// suffixed format. The migration happens in memory only; the file is
    /// rewritten in the current form on the next mutation.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        let mut file = KeyFile::load(path)?;
        let before = file.keys.len();
        let legacy = file
            .keys
            .iter()
            .filter(|k| migrate_legacy_key(k) != k.as_str())
            .count();
        if legacy > 0 {
            file.keys = file
                .keys
                .iter()
                .map(|k| migrate_legacy_key(k).to_string())
                .collect();
            info!(legacy, before, after = file.keys.len(), "Migrated legacy read-set entries");
        }
        Ok(Self { file })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.file.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.file.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file.keys.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.file.keys.iter().map(String::as_str)
    }

    /// Add `key` and rewrite the file.
    ///
    /// # Arguments
    ///
    /// * `key` - A read key as produced by [`SourceKind::read_key`](crate::models::SourceKind::read_key)
    ///
    /// # Returns
    ///
    /// Whether the set changed. The file is rewritten either way; on a
    /// write error the in-memory set is left as it was.
    pub fn mark_read(&mut self, key: &str) -> Result<bool, PersistenceError> {
        self.file.insert(key)
    }

    /// Remove `key` and rewrite the file. Returns whether the set changed.
    pub fn mark_unread(&mut self, key: &str) -> Result<bool, PersistenceError> {
        self.file.remove(key)
    }

    /// Empty the set and rewrite the file. Returns how many keys were dropped.
    pub fn clear_all(&mut self) -> Result<usize, PersistenceError> {
        let dropped = self.file.clear()?;
        info!(dropped, "Cleared read set");
        Ok(dropped)
    }
}

/// The set of starred items.
#[derive(Debug, Clone)]
pub struct Favorites {
    file: KeyFile,
}

impl Favorites {
    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        Ok(Self {
            file: KeyFile::load(path)?,
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.file.keys.contains(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.file.keys.iter().map(String::as_str)
    }

    pub fn add(&mut self, key: &str) -> Result<bool, PersistenceError> {
        self.file.insert(key)
    }

    pub fn remove(&mut self, key: &str) -> Result<bool, PersistenceError> {
        self.file.remove(key)
    }

    pub fn clear_all(&mut self) -> Result<usize, PersistenceError> {
        self.file.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceKind;
    use crate::normalize::news_article_id;
    use rand::distr::Alphanumeric;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::fs;

    fn read_file(path: &Path) -> Vec<String> {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn legacy_suffixes_are_stripped_on_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("read_posts.json");
        fs::write(&path, r#"["abc123_month", "xyz789"]"#).unwrap();

        let tracker = ReadTracker::load(&path).unwrap();
        let keys: Vec<&str> = tracker.keys().collect();
        assert_eq!(keys, vec!["abc123", "xyz789"]);

        // load never writes
        assert_eq!(read_file(&path), vec!["abc123_month", "xyz789"]);
    }

    #[test]
    fn migration_is_idempotent_and_merges_duplicates() {
        assert_eq!(migrate_legacy_key("abc_year"), "abc");
        assert_eq!(migrate_legacy_key("abc"), "abc");
        assert_eq!(migrate_legacy_key("dsr_1001"), "dsr_1001");
        assert_eq!(migrate_legacy_key("_month"), "_month");
        assert_eq!(migrate_legacy_key(migrate_legacy_key("k1_month")), "k1");

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("read_posts.json");
        fs::write(&path, r#"["k1_month", "k1_year", "k1"]"#).unwrap();
        assert_eq!(ReadTracker::load(&path).unwrap().len(), 1);
    }

    #[test]
    fn mark_then_unmark_restores_the_set() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("read_posts.json");
        let mut tracker = ReadTracker::load(&path).unwrap();
        tracker.mark_read("keep1").unwrap();
        let before = read_file(&path);

        assert!(tracker.mark_read("dsr_42").unwrap());
        assert!(tracker.contains("dsr_42"));
        assert!(!tracker.mark_read("dsr_42").unwrap());
        assert!(tracker.mark_unread("dsr_42").unwrap());
        assert!(!tracker.contains("dsr_42"));

        assert_eq!(read_file(&path), before);
    }

    #[test]
    fn every_mutation_rewrites_the_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("read_posts.json");
        fs::write(&path, r#"["old_month"]"#).unwrap();

        let mut tracker = ReadTracker::load(&path).unwrap();
        tracker.mark_read("rth_a1b2c3").unwrap();
        assert_eq!(read_file(&path), vec!["old", "rth_a1b2c3"]);

        assert_eq!(tracker.clear_all().unwrap(), 2);
        assert!(read_file(&path).is_empty());
        assert!(ReadTracker::load(&path).unwrap().is_empty());
    }

    #[test]
    fn corrupt_read_set_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("read_posts.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            ReadTracker::load(&path),
            Err(PersistenceError::Decode { .. })
        ));
    }

    #[test]
    fn social_and_news_keys_never_collide() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..10_000 {
            let len = rng.random_range(1..=10);
            let social_id: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(len)
                .map(char::from)
                .collect();
            let guid = rng.random_range(0..1_000_000u32).to_string();
            let news_id = if rng.random_bool(0.5) {
                news_article_id(Some(&guid), "https://news.test/x")
            } else {
                news_article_id(None, &format!("https://news.test/{social_id}"))
            };

            let social_key = SourceKind::Social.read_key(&social_id);
            let news_key = SourceKind::News.read_key(&news_id);
            assert_ne!(social_key, news_key);
            assert!(!social_key.starts_with(SourceKind::News.read_prefix()));
            assert!(!social_key.starts_with(SourceKind::BlogDigest.read_prefix()));
            assert_eq!(migrate_legacy_key(&social_key), social_key);
        }
    }

    /// Replace the directory holding `path` with a plain file so the next
    /// atomic write cannot create its temporary.
    fn block_writes(path: &Path) {
        let dir = path.parent().unwrap();
        fs::remove_dir_all(dir).unwrap();
        fs::write(dir, "not a directory").unwrap();
    }

    #[test]
    fn failed_write_leaves_memory_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state").join("read_posts.json");
        let mut tracker = ReadTracker::load(&path).unwrap();
        tracker.mark_read("kept").unwrap();
        block_writes(&path);

        assert!(matches!(tracker.mark_read("abc"), Err(PersistenceError::Io { .. })));
        assert!(!tracker.contains("abc"));
        assert!(tracker.mark_unread("kept").is_err());
        assert!(tracker.contains("kept"));
        assert!(tracker.clear_all().is_err());
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn failed_favorite_write_leaves_memory_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state").join("favorite_posts.json");
        let mut favs = Favorites::load(&path).unwrap();
        favs.add("dsr_7").unwrap();
        block_writes(&path);

        assert!(favs.add("abc").is_err());
        assert!(!favs.contains("abc"));
        assert!(favs.remove("dsr_7").is_err());
        assert!(favs.clear_all().is_err());
        assert!(favs.contains("dsr_7"));
    }

    #[test]
    fn favorites_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("favorite_posts.json");
        let mut favs = Favorites::load(&path).unwrap();
        assert!(favs.add("abc").unwrap());
        assert!(favs.add("dsr_7").unwrap());
        assert!(favs.remove("abc").unwrap());
        let reloaded = Favorites::load(&path).unwrap();
        assert!(reloaded.contains("dsr_7"));
        assert!(!reloaded.contains("abc"));
        assert_eq!(reloaded.keys().count(), 1);

        let mut favs = reloaded;
        assert_eq!(favs.clear_all().unwrap(), 1);
        assert!(Favorites::load(&path).unwrap().keys().next().is_none());
    }
}
